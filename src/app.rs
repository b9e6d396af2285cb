use crate::{
    config::{self, AppConfig},
    error::InstallError,
    install::{self, InstallEvent, InstallOutcome},
    sync::{progress_fraction, SyncEvent, SyncFailure},
    transport::HttpTransport,
};
use anyhow::Result;
use directories::BaseDirs;
use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
    sync::mpsc::{self, Receiver, TryRecvError},
    thread,
    time::{Duration, Instant},
};

const LOG_CAPACITY: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathBrowserEntryKind {
    Select,
    Parent,
    Dir,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathBrowserFocus {
    List,
    PathInput,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathBrowserEntry {
    pub label: String,
    pub path: PathBuf,
    pub kind: PathBrowserEntryKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathBrowser {
    pub current: PathBuf,
    pub entries: Vec<PathBrowserEntry>,
    pub selected: usize,
    pub path_input: String,
    pub focus: PathBrowserFocus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Browsing(PathBrowser),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogChoice {
    Yes,
    No,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialogKind {
    /// Single-button message.
    Notice,
    ConfirmFolder { path: PathBuf },
}

#[derive(Debug, Clone)]
pub struct Dialog {
    pub title: String,
    pub message: String,
    pub yes_label: String,
    pub no_label: String,
    pub choice: DialogChoice,
    pub kind: DialogKind,
}

impl Dialog {
    fn notice(title: &str, message: String) -> Self {
        Self {
            title: title.to_string(),
            message,
            yes_label: "OK".to_string(),
            no_label: String::new(),
            choice: DialogChoice::Yes,
            kind: DialogKind::Notice,
        }
    }

    pub fn has_no_button(&self) -> bool {
        !matches!(self.kind, DialogKind::Notice)
    }
}

#[derive(Debug, Clone)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastLevel {
    Info,
    Warn,
}

#[derive(Debug, Clone)]
pub struct Toast {
    pub message: String,
    pub level: ToastLevel,
    pub expires_at: Instant,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InstallStatus {
    Idle,
    Fetching,
    Syncing {
        processed: usize,
        total: usize,
        current: Option<String>,
    },
    Done {
        summary: String,
    },
    Failed {
        error: String,
    },
}

pub enum InstallMessage {
    Event(InstallEvent),
    Completed(InstallOutcome),
    Failed(SyncFailure),
}

pub struct App {
    pub config: AppConfig,
    config_path: PathBuf,
    log_path: PathBuf,
    pub status: String,
    pub logs: Vec<LogEntry>,
    pub log_scroll: usize,
    pub dialog: Option<Dialog>,
    pub input_mode: InputMode,
    pub toast: Option<Toast>,
    pub should_quit: bool,
    pub install_status: InstallStatus,
    install_active: bool,
    install_started_at: Option<Instant>,
    /// Present while a worker owns the sending half.
    install_rx: Option<Receiver<InstallMessage>>,
}

impl App {
    pub fn initialize() -> Result<Self> {
        let mut app = Self::with_paths(config::config_path()?, config::log_path()?)?;
        match app.config.last_folder.clone() {
            Some(folder) if folder.is_dir() => {
                app.status = format!("Mods folder: {}", folder.display());
            }
            Some(folder) => {
                app.log_warn(format!("Saved mods folder is gone: {}", folder.display()));
                app.status = "Press f to choose your mods folder".to_string();
            }
            None => {
                app.status = "Press f to choose your mods folder".to_string();
            }
        }
        Ok(app)
    }

    pub fn with_paths(config_path: PathBuf, log_path: PathBuf) -> Result<Self> {
        let config = config::load(&config_path)?;
        Ok(Self {
            config,
            config_path,
            log_path,
            status: "Ready".to_string(),
            logs: Vec::new(),
            log_scroll: 0,
            dialog: None,
            input_mode: InputMode::Normal,
            toast: None,
            should_quit: false,
            install_status: InstallStatus::Idle,
            install_active: false,
            install_started_at: None,
            install_rx: None,
        })
    }

    pub fn tick(&mut self) {
        if let Some(toast) = &self.toast {
            if toast.expires_at <= Instant::now() {
                self.toast = None;
            }
        }
        self.poll_install();
    }

    pub fn set_toast(&mut self, message: &str, level: ToastLevel, duration: Duration) {
        self.toast = Some(Toast {
            message: message.to_string(),
            level,
            expires_at: Instant::now() + duration,
        });
    }

    pub fn is_busy(&self) -> bool {
        self.install_active
    }

    pub fn install_elapsed(&self) -> Option<Duration> {
        self.install_started_at.map(|started| started.elapsed())
    }

    pub fn install_progress(&self) -> Option<f64> {
        match &self.install_status {
            InstallStatus::Syncing {
                processed, total, ..
            } => Some(progress_fraction(*processed, *total)),
            _ => None,
        }
    }

    pub fn folder_label(&self) -> String {
        self.config
            .last_folder
            .as_ref()
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "(not selected)".to_string())
    }

    pub fn hint(&self) -> &'static str {
        match &self.input_mode {
            InputMode::Normal if self.is_busy() => "Installing... | q quit",
            InputMode::Normal => "f folder | i install | PgUp/PgDn log | q quit",
            InputMode::Browsing(browser) => match browser.focus {
                PathBrowserFocus::List => "Enter open/select | Tab edit path | Esc cancel",
                PathBrowserFocus::PathInput => "Enter go | Tab list | Esc cancel",
            },
        }
    }

    // Folder selection

    pub fn choose_folder(&mut self, path: PathBuf) {
        if !path.is_dir() {
            self.status = format!("Not a folder: {}", path.display());
            self.log_warn(format!("Folder selection rejected: {}", path.display()));
            return;
        }
        if !looks_like_mods_folder(&path) {
            self.open_dialog(Dialog {
                title: "Unusual mods folder".to_string(),
                message: format!(
                    "{}\ndoes not look like a mods folder.\nUse it anyway?",
                    path.display()
                ),
                yes_label: "Use folder".to_string(),
                no_label: "Choose again".to_string(),
                choice: DialogChoice::No,
                kind: DialogKind::ConfirmFolder { path },
            });
            return;
        }
        self.set_folder(path);
    }

    fn set_folder(&mut self, path: PathBuf) {
        self.config = self.config.clone().with_last_folder(path.clone());
        if let Err(err) = config::save(&self.config_path, &self.config) {
            self.log_error(format!("Could not save config: {err:#}"));
        }
        self.status = format!("Mods folder: {}", path.display());
        self.log_info(format!("Mods folder set to {}", path.display()));
        self.set_toast("Mods folder saved", ToastLevel::Info, Duration::from_secs(2));
    }

    pub fn open_folder_browser(&mut self) {
        if self.install_active {
            self.set_toast("Install in progress", ToastLevel::Warn, Duration::from_secs(2));
            return;
        }
        let current = self.browser_start();
        let entries = build_browser_entries(&current);
        self.input_mode = InputMode::Browsing(PathBrowser {
            path_input: current.display().to_string(),
            current,
            entries,
            selected: 0,
            focus: PathBrowserFocus::List,
        });
        self.status = "Select your mods folder".to_string();
    }

    fn browser_start(&self) -> PathBuf {
        let home = BaseDirs::new()
            .map(|base| base.home_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("/"));
        let mut candidates = Vec::new();
        if let Some(folder) = &self.config.last_folder {
            candidates.push(folder.clone());
            if let Some(parent) = folder.parent() {
                candidates.push(parent.to_path_buf());
            }
        }
        candidates.push(home.clone());
        candidates
            .into_iter()
            .find(|path| path.is_dir())
            .unwrap_or(home)
    }

    pub fn close_browser(&mut self) {
        self.input_mode = InputMode::Normal;
        self.status = "Folder selection cancelled".to_string();
    }

    pub fn browser_move(&mut self, delta: isize) {
        if let InputMode::Browsing(browser) = &mut self.input_mode {
            if browser.entries.is_empty() {
                return;
            }
            let last = browser.entries.len() - 1;
            browser.selected = if delta.is_negative() {
                browser.selected.saturating_sub(delta.unsigned_abs())
            } else {
                browser.selected.saturating_add(delta as usize).min(last)
            };
        }
    }

    pub fn browser_toggle_focus(&mut self) {
        if let InputMode::Browsing(browser) = &mut self.input_mode {
            browser.focus = match browser.focus {
                PathBrowserFocus::List => PathBrowserFocus::PathInput,
                PathBrowserFocus::PathInput => PathBrowserFocus::List,
            };
        }
    }

    pub fn browser_input_push(&mut self, ch: char) {
        if let InputMode::Browsing(browser) = &mut self.input_mode {
            browser.path_input.push(ch);
        }
    }

    pub fn browser_input_pop(&mut self) {
        if let InputMode::Browsing(browser) = &mut self.input_mode {
            browser.path_input.pop();
        }
    }

    pub fn browser_activate(&mut self) {
        let InputMode::Browsing(browser) = &self.input_mode else {
            return;
        };
        match browser.focus {
            PathBrowserFocus::PathInput => {
                let target = expand_tilde(browser.path_input.trim());
                if target.is_dir() {
                    self.browser_navigate(target);
                } else {
                    self.status = format!("No such folder: {}", target.display());
                }
            }
            PathBrowserFocus::List => {
                let Some(entry) = browser.entries.get(browser.selected).cloned() else {
                    return;
                };
                match entry.kind {
                    PathBrowserEntryKind::Select => {
                        self.input_mode = InputMode::Normal;
                        self.choose_folder(entry.path);
                    }
                    PathBrowserEntryKind::Parent | PathBrowserEntryKind::Dir => {
                        self.browser_navigate(entry.path);
                    }
                }
            }
        }
    }

    pub fn browser_parent(&mut self) {
        let parent = match &self.input_mode {
            InputMode::Browsing(browser) => browser.current.parent().map(Path::to_path_buf),
            InputMode::Normal => None,
        };
        if let Some(parent) = parent {
            self.browser_navigate(parent);
        }
    }

    fn browser_navigate(&mut self, path: PathBuf) {
        if let InputMode::Browsing(browser) = &mut self.input_mode {
            browser.entries = build_browser_entries(&path);
            browser.path_input = path.display().to_string();
            browser.current = path;
            browser.selected = 0;
            browser.focus = PathBrowserFocus::List;
        }
    }

    // Install

    pub fn request_install(&mut self) {
        if self.install_active {
            self.set_toast(
                "Install already running",
                ToastLevel::Warn,
                Duration::from_secs(2),
            );
            return;
        }
        let folder = match self.config.last_folder.clone() {
            Some(folder) if folder.is_dir() => folder,
            other => {
                let error = InstallError::InvalidTarget(other.unwrap_or_default());
                self.log_warn(error.to_string());
                self.open_dialog(Dialog::notice(
                    error.kind_label(),
                    "Please choose a valid mods folder first (press f).".to_string(),
                ));
                return;
            }
        };
        self.start_install(folder);
    }

    fn start_install(&mut self, folder: PathBuf) {
        let (tx, rx) = mpsc::channel();
        self.begin_install(rx);
        let manifest_url = self.config.manifest_url.clone();
        thread::spawn(move || {
            let transport = HttpTransport::new();
            let event_tx = tx.clone();
            let message = match install::run_install(&transport, &manifest_url, &folder, |event| {
                let _ = event_tx.send(InstallMessage::Event(event));
            }) {
                Ok(outcome) => InstallMessage::Completed(outcome),
                Err(failure) => InstallMessage::Failed(failure),
            };
            let _ = tx.send(message);
        });
    }

    fn begin_install(&mut self, rx: Receiver<InstallMessage>) {
        self.install_rx = Some(rx);
        self.install_active = true;
        self.install_started_at = Some(Instant::now());
        self.install_status = InstallStatus::Fetching;
        self.status = "Fetching mod list...".to_string();
    }

    pub fn poll_install(&mut self) {
        while let Some(rx) = &self.install_rx {
            match rx.try_recv() {
                Ok(message) => {
                    self.apply_install_message(message);
                    if !self.install_active {
                        self.install_rx = None;
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.install_rx = None;
                    if self.install_active {
                        self.install_worker_lost();
                    }
                }
            }
        }
    }

    /// The worker went away without reporting, which only happens on a panic.
    fn install_worker_lost(&mut self) {
        self.install_active = false;
        self.install_started_at = None;
        let error = "install stopped unexpectedly".to_string();
        self.status = format!("Install failed: {error}");
        self.log_error(format!("Install failed: {error}"));
        self.install_status = InstallStatus::Failed {
            error: error.clone(),
        };
        self.open_dialog(Dialog::notice("Install failed", error));
    }

    pub fn apply_install_message(&mut self, message: InstallMessage) {
        match message {
            InstallMessage::Event(event) => self.apply_install_event(event),
            InstallMessage::Completed(outcome) => {
                self.install_active = false;
                self.install_started_at = None;
                match outcome {
                    InstallOutcome::NoMods => {
                        self.install_status = InstallStatus::Done {
                            summary: "No mods found".to_string(),
                        };
                        self.status = "No mods found".to_string();
                        self.log_warn("No mods found in the mod list".to_string());
                        self.open_dialog(Dialog::notice(
                            "No mods found",
                            "The mod list did not contain any mods.".to_string(),
                        ));
                    }
                    InstallOutcome::Synced(result) => {
                        let summary = result.summary();
                        self.status = format!(
                            "Install complete: {} installed, {} downloaded",
                            result.installed.len(),
                            result.to_download.len()
                        );
                        for line in summary.lines() {
                            self.log_info(line.to_string());
                        }
                        self.install_status = InstallStatus::Done {
                            summary: summary.clone(),
                        };
                        self.open_dialog(Dialog::notice("Install result", summary));
                    }
                }
            }
            InstallMessage::Failed(failure) => {
                self.install_active = false;
                self.install_started_at = None;
                let error = failure.error.to_string();
                self.status = format!("{}: {error}", failure.error.kind_label());
                self.log_error(format!("Install failed: {error}"));
                let mut message = error.clone();
                if !failure.partial.is_empty() {
                    let partial = failure.partial.summary();
                    self.log_warn(format!("Partial install: {}", partial.replace('\n', "; ")));
                    message.push_str("\n\nBefore the failure:\n");
                    message.push_str(&partial);
                }
                self.install_status = InstallStatus::Failed { error };
                self.open_dialog(Dialog::notice(failure.error.kind_label(), message));
            }
        }
    }

    fn apply_install_event(&mut self, event: InstallEvent) {
        match event {
            InstallEvent::Fetching { url } => {
                self.install_status = InstallStatus::Fetching;
                self.log_info(format!("Fetching mod list from {url}"));
            }
            InstallEvent::SchemaWarning(warning) => {
                self.log_warn(format!("Mod list warning: {warning}"));
                self.set_toast(
                    "Mod list has unexpected format",
                    ToastLevel::Warn,
                    Duration::from_secs(3),
                );
            }
            InstallEvent::ManifestLoaded { count } => {
                self.install_status = InstallStatus::Syncing {
                    processed: 0,
                    total: count,
                    current: None,
                };
                self.status = format!("Mod list has {count} entries");
                self.log_info(format!("Mod list loaded: {count} entries"));
            }
            InstallEvent::Sync(event) => self.apply_sync_event(event),
        }
    }

    fn apply_sync_event(&mut self, event: SyncEvent) {
        match event {
            SyncEvent::Present { name } => {
                self.log_info(format!("Already installed: {name}"));
            }
            SyncEvent::Downloading { name, url } => {
                self.status = format!("Downloading {name}...");
                self.log_info(format!("Downloading {name} from {url}"));
                if let InstallStatus::Syncing { current, .. } = &mut self.install_status {
                    *current = Some(name);
                }
            }
            SyncEvent::Downloaded { name, bytes } => {
                self.log_info(format!("Downloaded {name} ({})", format_bytes(bytes)));
            }
            SyncEvent::Rejected { name } => {
                self.log_warn(format!("Skipped unsafe file name: {name}"));
            }
            SyncEvent::Progress { processed, total } => {
                if let InstallStatus::Syncing {
                    processed: done,
                    total: all,
                    ..
                } = &mut self.install_status
                {
                    *done = processed;
                    *all = total;
                } else {
                    self.install_status = InstallStatus::Syncing {
                        processed,
                        total,
                        current: None,
                    };
                }
            }
        }
    }

    // Dialogs

    fn open_dialog(&mut self, dialog: Dialog) {
        self.dialog = Some(dialog);
        self.input_mode = InputMode::Normal;
    }

    pub fn dialog_choice_left(&mut self) {
        if let Some(dialog) = &mut self.dialog {
            dialog.choice = DialogChoice::Yes;
        }
    }

    pub fn dialog_choice_right(&mut self) {
        if let Some(dialog) = &mut self.dialog {
            if dialog.has_no_button() {
                dialog.choice = DialogChoice::No;
            }
        }
    }

    pub fn dialog_set_choice(&mut self, choice: DialogChoice) {
        if let Some(dialog) = &mut self.dialog {
            if choice == DialogChoice::Yes || dialog.has_no_button() {
                dialog.choice = choice;
            }
        }
    }

    pub fn dialog_confirm(&mut self) {
        let Some(dialog) = self.dialog.take() else {
            return;
        };
        match dialog.kind {
            DialogKind::Notice => {}
            DialogKind::ConfirmFolder { path } => {
                if dialog.choice == DialogChoice::Yes {
                    self.set_folder(path);
                } else {
                    self.open_folder_browser();
                }
            }
        }
    }

    pub fn dialog_cancel(&mut self) {
        if let Some(dialog) = self.dialog.take() {
            if let DialogKind::ConfirmFolder { .. } = dialog.kind {
                self.status = "Folder selection cancelled".to_string();
            }
        }
    }

    // Log

    pub fn scroll_log_up(&mut self, lines: usize) {
        self.log_scroll = self.log_scroll.saturating_add(lines);
    }

    pub fn scroll_log_down(&mut self, lines: usize) {
        self.log_scroll = self.log_scroll.saturating_sub(lines);
    }

    pub fn log_info(&mut self, message: String) {
        self.push_log(LogLevel::Info, message);
    }

    pub fn log_warn(&mut self, message: String) {
        self.push_log(LogLevel::Warn, message);
    }

    pub fn log_error(&mut self, message: String) {
        self.push_log(LogLevel::Error, message);
    }

    fn push_log(&mut self, level: LogLevel, message: String) {
        // A scrolled-back view stays on the same entries.
        let pinned = self.log_scroll > 0;
        let _ = append_log_file(&self.log_path, level, &message);
        self.logs.push(LogEntry { level, message });
        if pinned {
            self.log_scroll += 1;
        }
        let excess = self.logs.len().saturating_sub(LOG_CAPACITY);
        if excess > 0 {
            self.logs.drain(..excess);
            self.log_scroll = self.log_scroll.saturating_sub(excess);
        }
    }
}

/// The folder or its parent should mention "mod" (`mods/`, `Mods/`, `server-mods/x`).
pub fn looks_like_mods_folder(path: &Path) -> bool {
    path.components()
        .rev()
        .take(2)
        .any(|component| {
            component
                .as_os_str()
                .to_string_lossy()
                .to_lowercase()
                .contains("mod")
        })
}

fn build_browser_entries(current: &Path) -> Vec<PathBrowserEntry> {
    let mut entries = vec![PathBrowserEntry {
        label: "[ Select this folder ]".to_string(),
        path: current.to_path_buf(),
        kind: PathBrowserEntryKind::Select,
    }];
    if let Some(parent) = current.parent() {
        entries.push(PathBrowserEntry {
            label: "..".to_string(),
            path: parent.to_path_buf(),
            kind: PathBrowserEntryKind::Parent,
        });
    }
    let mut dirs = Vec::new();
    if let Ok(read_dir) = fs::read_dir(current) {
        for entry in read_dir.flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let label = path
                .file_name()
                .and_then(|name| name.to_str())
                .map(|name| format!("{name}/"))
                .unwrap_or_else(|| path.display().to_string());
            dirs.push(PathBrowserEntry {
                label,
                path,
                kind: PathBrowserEntryKind::Dir,
            });
        }
    }
    dirs.sort_by(|a, b| a.label.to_lowercase().cmp(&b.label.to_lowercase()));
    entries.extend(dirs);
    entries
}

fn expand_tilde(raw: &str) -> PathBuf {
    if let Some(rest) = raw.strip_prefix('~') {
        if let Some(base) = BaseDirs::new() {
            return base.home_dir().join(rest.trim_start_matches('/'));
        }
    }
    PathBuf::from(raw)
}

pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

fn log_level_label(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Info => "INFO",
        LogLevel::Warn => "WARN",
        LogLevel::Error => "ERROR",
    }
}

fn append_log_file(path: &Path, level: LogLevel, message: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let stamp = time::OffsetDateTime::now_utc()
        .format(time::macros::format_description!(
            "[year]-[month]-[day] [hour]:[minute]:[second]"
        ))
        .unwrap_or_default();
    let label = log_level_label(level);
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    writeln!(file, "{stamp} [{label}] {message}")
}
