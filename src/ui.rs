use crate::app::{
    App, DialogChoice, InputMode, InstallStatus, LogLevel, PathBrowser, PathBrowserEntryKind,
    PathBrowserFocus, ToastLevel,
};
use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    prelude::*,
    text::{Line, Span},
    widgets::{
        Block, BorderType, Borders, Clear, Gauge, List, ListItem, ListState, Padding, Paragraph,
        Wrap,
    },
};
use std::{io, time::Duration};

#[derive(Clone)]
struct Theme {
    accent: Color,
    accent_soft: Color,
    border: Color,
    text: Color,
    muted: Color,
    success: Color,
    warning: Color,
    error: Color,
    header_bg: Color,
    log_bg: Color,
}

impl Theme {
    fn new() -> Self {
        Self {
            accent: Color::Rgb(120, 190, 255),
            accent_soft: Color::Rgb(70, 110, 160),
            border: Color::Rgb(65, 75, 90),
            text: Color::Rgb(220, 230, 240),
            muted: Color::Rgb(135, 145, 155),
            success: Color::Rgb(120, 220, 140),
            warning: Color::Rgb(230, 200, 120),
            error: Color::Rgb(235, 100, 95),
            header_bg: Color::Rgb(22, 28, 36),
            log_bg: Color::Rgb(16, 20, 26),
        }
    }

    fn block(&self, title: &'static str) -> Block<'static> {
        Block::default()
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .border_style(Style::default().fg(self.border))
            .title(Span::styled(
                title,
                Style::default()
                    .fg(self.accent)
                    .add_modifier(Modifier::BOLD),
            ))
    }

    fn panel(&self, title: &'static str) -> Block<'static> {
        self.block(title).padding(Padding {
            left: 1,
            right: 1,
            top: 0,
            bottom: 0,
        })
    }
}

pub fn run(app: &mut App) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = ratatui::backend::CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_loop(&mut terminal, app);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

fn run_loop(terminal: &mut Terminal<impl Backend>, app: &mut App) -> Result<()> {
    loop {
        app.tick();
        terminal.draw(|frame| draw(frame, app))?;

        if app.should_quit {
            break;
        }

        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    handle_key(app, key);
                }
            }
        }
    }

    Ok(())
}

fn handle_key(app: &mut App, key: KeyEvent) {
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return;
    }
    if app.dialog.is_some() {
        handle_dialog_mode(app, key);
        return;
    }
    match &app.input_mode {
        InputMode::Normal => handle_normal_mode(app, key),
        InputMode::Browsing(browser) => {
            let focus = browser.focus;
            handle_browser_mode(app, key, focus);
        }
    }
}

fn handle_dialog_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Left | KeyCode::Char('h') | KeyCode::Char('H') => {
            app.dialog_choice_left();
        }
        KeyCode::Right | KeyCode::Char('l') | KeyCode::Char('L') | KeyCode::Tab => {
            app.dialog_choice_right();
        }
        KeyCode::Char('y') | KeyCode::Char('Y') => {
            app.dialog_set_choice(DialogChoice::Yes);
        }
        KeyCode::Char('n') | KeyCode::Char('N') => {
            app.dialog_set_choice(DialogChoice::No);
        }
        KeyCode::Enter | KeyCode::Char(' ') => {
            app.dialog_confirm();
        }
        KeyCode::Esc => {
            app.dialog_cancel();
        }
        _ => {}
    }
}

fn handle_normal_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') | KeyCode::Char('Q') => app.should_quit = true,
        KeyCode::Char('f') | KeyCode::Char('F') => app.open_folder_browser(),
        KeyCode::Char('i') | KeyCode::Char('I') | KeyCode::Enter => app.request_install(),
        KeyCode::PageUp => app.scroll_log_up(5),
        KeyCode::PageDown => app.scroll_log_down(5),
        KeyCode::Up | KeyCode::Char('k') => app.scroll_log_up(1),
        KeyCode::Down | KeyCode::Char('j') => app.scroll_log_down(1),
        _ => {}
    }
}

fn handle_browser_mode(app: &mut App, key: KeyEvent, focus: PathBrowserFocus) {
    match (focus, key.code) {
        (_, KeyCode::Esc) => app.close_browser(),
        (_, KeyCode::Tab) => app.browser_toggle_focus(),
        (_, KeyCode::Enter) => app.browser_activate(),
        (PathBrowserFocus::List, KeyCode::Up | KeyCode::Char('k')) => app.browser_move(-1),
        (PathBrowserFocus::List, KeyCode::Down | KeyCode::Char('j')) => app.browser_move(1),
        (PathBrowserFocus::List, KeyCode::PageUp) => app.browser_move(-10),
        (PathBrowserFocus::List, KeyCode::PageDown) => app.browser_move(10),
        (PathBrowserFocus::List, KeyCode::Backspace | KeyCode::Left) => app.browser_parent(),
        (PathBrowserFocus::PathInput, KeyCode::Backspace) => app.browser_input_pop(),
        (PathBrowserFocus::PathInput, KeyCode::Char(ch)) => app.browser_input_push(ch),
        _ => {}
    }
}

fn draw(frame: &mut Frame<'_>, app: &App) {
    let area = frame.size();
    let theme = Theme::new();
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(4),
            Constraint::Length(3),
            Constraint::Min(5),
            Constraint::Length(1),
        ])
        .split(area);

    let header = Paragraph::new(vec![
        Line::from(Span::styled(
            "ModSync",
            Style::default()
                .fg(theme.accent)
                .add_modifier(Modifier::BOLD),
        )),
        Line::from(Span::styled(
            "Keep your server mods folder in sync",
            Style::default().fg(theme.muted),
        )),
    ])
    .style(Style::default().bg(theme.header_bg))
    .alignment(Alignment::Center);
    frame.render_widget(header, chunks[0]);

    let folder_style = if app.config.last_folder.is_some() {
        Style::default().fg(theme.text)
    } else {
        Style::default().fg(theme.warning)
    };
    let folder = Paragraph::new(vec![
        Line::from(vec![
            Span::styled("Folder: ", Style::default().fg(theme.muted)),
            Span::styled(app.folder_label(), folder_style),
        ]),
        Line::from(vec![
            Span::styled("Source: ", Style::default().fg(theme.muted)),
            Span::styled(app.config.manifest_url.clone(), Style::default().fg(theme.muted)),
        ]),
    ])
    .block(theme.panel("Mods Folder"))
    .wrap(Wrap { trim: true });
    frame.render_widget(folder, chunks[1]);

    draw_progress(frame, app, &theme, chunks[2]);

    let log_height = chunks[3].height.saturating_sub(2) as usize;
    let log = Paragraph::new(build_log_lines(app, &theme, log_height))
        .block(theme.panel("Log"))
        .style(Style::default().bg(theme.log_bg));
    frame.render_widget(log, chunks[3]);

    let status = Paragraph::new(status_bar_line(app, chunks[4].width))
        .style(Style::default().fg(theme.text).bg(theme.header_bg));
    frame.render_widget(status, chunks[4]);

    if let InputMode::Browsing(browser) = &app.input_mode {
        draw_browser(frame, browser, &theme);
    }
    draw_toast(frame, app, &theme, chunks[3]);
    draw_dialog(frame, app, &theme);
}

fn draw_progress(frame: &mut Frame<'_>, app: &App, theme: &Theme, area: Rect) {
    let (ratio, label, color) = match &app.install_status {
        InstallStatus::Idle => (0.0, "Idle".to_string(), theme.muted),
        InstallStatus::Fetching => {
            let secs = app.install_elapsed().map(|elapsed| elapsed.as_secs()).unwrap_or(0);
            (0.0, format!("Fetching mod list... {secs}s"), theme.accent)
        }
        InstallStatus::Syncing {
            processed,
            total,
            current,
        } => {
            let ratio = app.install_progress().unwrap_or(0.0);
            let label = match current {
                Some(name) => format!("{processed}/{total}  {name}"),
                None => format!("{processed}/{total}"),
            };
            (ratio, label, theme.accent)
        }
        InstallStatus::Done { summary } => {
            let label = summary.lines().next().unwrap_or("Done").to_string();
            (1.0, label, theme.success)
        }
        InstallStatus::Failed { error } => (0.0, format!("Failed: {error}"), theme.error),
    };
    let gauge = Gauge::default()
        .block(theme.block("Progress"))
        .gauge_style(Style::default().fg(color).bg(theme.header_bg))
        .ratio(ratio.clamp(0.0, 1.0))
        .label(label);
    frame.render_widget(gauge, area);
}

fn status_bar_line(app: &App, width: u16) -> String {
    let width = width as usize;
    let left = format!("Status: {}", app.status);
    let right = app.hint().to_string();

    if width == 0 {
        return String::new();
    }

    if left.len() + right.len() + 1 > width {
        let available = width.saturating_sub(left.len() + 1);
        let trimmed_right: String = right.chars().take(available).collect();
        return format!("{left} {trimmed_right}");
    }

    let spaces = width - left.len() - right.len();
    format!("{left}{}{}", " ".repeat(spaces), right)
}

fn build_log_lines(app: &App, theme: &Theme, height: usize) -> Vec<Line<'static>> {
    if height == 0 {
        return Vec::new();
    }

    if app.logs.is_empty() {
        return vec![Line::from(Span::styled(
            "No recent events.",
            Style::default().fg(theme.muted),
        ))];
    }

    // `log_scroll` counts entries hidden below the view.
    let skip = app.log_scroll.min(app.logs.len().saturating_sub(height));
    let mut visible: Vec<_> = app.logs.iter().rev().skip(skip).take(height).collect();
    visible.reverse();

    visible
        .into_iter()
        .map(|entry| {
            let (label, color) = match entry.level {
                LogLevel::Info => ("[i]", theme.accent),
                LogLevel::Warn => ("[!]", theme.warning),
                LogLevel::Error => ("[x]", theme.error),
            };
            Line::from(vec![
                Span::styled(label, Style::default().fg(color).add_modifier(Modifier::BOLD)),
                Span::raw(" "),
                Span::styled(entry.message.clone(), Style::default().fg(theme.text)),
            ])
        })
        .collect()
}

fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width.saturating_sub(2)).max(1);
    let height = height.min(area.height.saturating_sub(2)).max(1);
    let x = area.x + (area.width.saturating_sub(width)) / 2;
    let y = area.y + (area.height.saturating_sub(height)) / 2;
    Rect::new(x, y, width, height)
}

fn draw_browser(frame: &mut Frame<'_>, browser: &PathBrowser, theme: &Theme) {
    let area = frame.size();
    let popup = centered(
        area,
        area.width.saturating_mul(3) / 4,
        area.height.saturating_mul(3) / 4,
    );
    frame.render_widget(Clear, popup);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(3)])
        .split(popup);

    let input_style = if browser.focus == PathBrowserFocus::PathInput {
        Style::default().fg(theme.accent)
    } else {
        Style::default().fg(theme.muted)
    };
    let input = Paragraph::new(Line::from(vec![
        Span::styled(browser.path_input.clone(), input_style),
        if browser.focus == PathBrowserFocus::PathInput {
            Span::styled("_", Style::default().fg(theme.accent))
        } else {
            Span::raw("")
        },
    ]))
    .block(theme.block("Path"))
    .style(Style::default().bg(theme.header_bg));
    frame.render_widget(input, chunks[0]);

    let items: Vec<ListItem> = browser
        .entries
        .iter()
        .map(|entry| {
            let style = match entry.kind {
                PathBrowserEntryKind::Select => Style::default()
                    .fg(theme.success)
                    .add_modifier(Modifier::BOLD),
                PathBrowserEntryKind::Parent => Style::default().fg(theme.muted),
                PathBrowserEntryKind::Dir => Style::default().fg(theme.text),
            };
            ListItem::new(Line::from(Span::styled(entry.label.clone(), style)))
        })
        .collect();
    let list = List::new(items)
        .block(theme.block("Select mods folder"))
        .style(Style::default().bg(theme.header_bg))
        .highlight_style(
            Style::default()
                .fg(Color::Black)
                .bg(theme.accent)
                .add_modifier(Modifier::BOLD),
        );
    let mut state = ListState::default();
    if browser.focus == PathBrowserFocus::List {
        state.select(Some(browser.selected));
    }
    frame.render_stateful_widget(list, chunks[1], &mut state);
}

fn draw_dialog(frame: &mut Frame<'_>, app: &App, theme: &Theme) {
    let Some(dialog) = &app.dialog else {
        return;
    };

    let area = frame.size();
    let message_lines: Vec<Line> = dialog
        .message
        .lines()
        .map(|line| Line::from(line.to_string()))
        .collect();
    let content_height = message_lines.len().max(1) as u16;
    let height = (content_height + 6).max(7);
    let width = area.width.saturating_mul(2) / 3;
    let dialog_area = centered(area, width.max(34), height);

    let yes_selected = matches!(dialog.choice, DialogChoice::Yes);
    let yes_style = if yes_selected {
        Style::default()
            .fg(Color::Black)
            .bg(theme.accent)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(theme.text)
    };
    let no_style = if !yes_selected {
        Style::default()
            .fg(Color::Black)
            .bg(theme.warning)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(theme.text)
    };

    let mut buttons = vec![
        Span::raw(" "),
        Span::styled(format!(" {} ", dialog.yes_label), yes_style),
    ];
    if dialog.has_no_button() {
        buttons.push(Span::raw("   "));
        buttons.push(Span::styled(format!(" {} ", dialog.no_label), no_style));
    }

    let mut lines = Vec::new();
    lines.push(Line::from(Span::styled(
        dialog.title.clone(),
        Style::default().fg(theme.accent).add_modifier(Modifier::BOLD),
    )));
    lines.push(Line::from(""));
    lines.extend(message_lines);
    lines.push(Line::from(""));
    lines.push(Line::from(buttons));

    frame.render_widget(Clear, dialog_area);
    let dialog_block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(theme.accent_soft))
        .style(Style::default().bg(theme.header_bg));
    let dialog_widget = Paragraph::new(lines)
        .block(dialog_block)
        .style(Style::default().fg(theme.text))
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: false });
    frame.render_widget(dialog_widget, dialog_area);
}

fn draw_toast(frame: &mut Frame<'_>, app: &App, theme: &Theme, body_area: Rect) {
    let Some(toast) = &app.toast else {
        return;
    };
    let color = match toast.level {
        ToastLevel::Info => theme.accent,
        ToastLevel::Warn => theme.warning,
    };
    let width = (toast.message.chars().count() as u16 + 4).min(body_area.width);
    let area = Rect::new(
        body_area.x + body_area.width.saturating_sub(width + 1),
        body_area.y + 1,
        width,
        3.min(body_area.height),
    )
    .intersection(frame.size());
    if area.is_empty() {
        return;
    }
    frame.render_widget(Clear, area);
    let widget = Paragraph::new(Span::styled(
        toast.message.clone(),
        Style::default().fg(color).add_modifier(Modifier::BOLD),
    ))
    .alignment(Alignment::Center)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .border_style(Style::default().fg(color))
            .style(Style::default().bg(theme.header_bg)),
    );
    frame.render_widget(widget, area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::backend::TestBackend;

    fn test_app(dir: &std::path::Path) -> App {
        App::with_paths(dir.join("config.json"), dir.join("modsync.log")).unwrap()
    }

    #[test]
    fn status_bar_pads_to_width() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(dir.path());
        let line = status_bar_line(&app, 80);
        assert_eq!(line.len(), 80);
        assert!(line.starts_with("Status: Ready"));
    }

    #[test]
    fn q_quits_from_normal_mode() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = test_app(dir.path());
        handle_key(&mut app, KeyEvent::new(KeyCode::Char('q'), KeyModifiers::NONE));
        assert!(app.should_quit);
    }

    #[test]
    fn escape_closes_the_browser() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = test_app(dir.path());
        handle_key(&mut app, KeyEvent::new(KeyCode::Char('f'), KeyModifiers::NONE));
        assert!(matches!(app.input_mode, InputMode::Browsing(_)));
        handle_key(&mut app, KeyEvent::new(KeyCode::Esc, KeyModifiers::NONE));
        assert_eq!(app.input_mode, InputMode::Normal);
    }

    #[test]
    fn draws_without_panicking_on_small_terminals() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = test_app(dir.path());
        app.log_info("hello".to_string());
        app.open_folder_browser();
        for (width, height) in [(120, 40), (40, 12), (10, 5)] {
            let mut terminal = Terminal::new(TestBackend::new(width, height)).unwrap();
            terminal.draw(|frame| draw(frame, &app)).unwrap();
        }
    }

    #[test]
    fn toast_fits_inside_tiny_terminals() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = test_app(dir.path());
        app.set_toast(
            "Install already running",
            ToastLevel::Warn,
            std::time::Duration::from_secs(5),
        );
        for (width, height) in [(10, 3), (10, 2)] {
            let mut terminal = Terminal::new(TestBackend::new(width, height)).unwrap();
            terminal.draw(|frame| draw(frame, &app)).unwrap();
        }
    }

    #[test]
    fn log_view_shows_the_newest_entries_unless_scrolled() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = test_app(dir.path());
        for index in 0..5 {
            app.log_info(format!("entry {index}"));
        }
        let theme = Theme::new();
        let text = |lines: Vec<Line<'static>>| -> Vec<String> {
            lines
                .iter()
                .map(|line| line.spans.iter().map(|span| span.content.as_ref()).collect())
                .collect()
        };

        assert_eq!(
            text(build_log_lines(&app, &theme, 2)),
            vec!["[i] entry 3", "[i] entry 4"]
        );
        app.scroll_log_up(2);
        assert_eq!(
            text(build_log_lines(&app, &theme, 2)),
            vec!["[i] entry 1", "[i] entry 2"]
        );
        app.scroll_log_up(50);
        assert_eq!(
            text(build_log_lines(&app, &theme, 2)),
            vec!["[i] entry 0", "[i] entry 1"]
        );
    }
}
