use crate::{
    app::{format_bytes, App},
    config::{self, AppConfig},
    install::{self, InstallEvent, InstallOutcome},
    manifest::{self, FetchedManifest},
    sync::{self, SyncEvent},
    transport::HttpTransport,
    ui,
};
use anyhow::{anyhow, bail, Context, Result};
use std::path::{Path, PathBuf};

#[derive(Debug, PartialEq, Eq)]
enum CliAction {
    Ui,
    Install { folder: Option<PathBuf>, quiet: bool },
    List,
    Folder(Option<PathBuf>),
    Help,
    Version,
}

pub fn run() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    match parse_args(&args)? {
        CliAction::Ui => {
            let mut app = App::initialize()?;
            ui::run(&mut app)
        }
        CliAction::Install { folder, quiet } => run_install(folder, quiet),
        CliAction::List => run_list(),
        CliAction::Folder(folder) => run_folder(folder),
        CliAction::Help => {
            print_help();
            Ok(())
        }
        CliAction::Version => {
            println!("ModSync v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn parse_args(args: &[String]) -> Result<CliAction> {
    let Some(first) = args.first() else {
        return Ok(CliAction::Ui);
    };

    match first.as_str() {
        "--help" | "-h" | "help" => Ok(CliAction::Help),
        "--version" | "-V" | "version" => Ok(CliAction::Version),
        "list" => Ok(CliAction::List),
        "folder" => Ok(CliAction::Folder(args.get(1).map(PathBuf::from))),
        "install" => {
            let mut folder = None;
            let mut quiet = false;
            let mut iter = args.iter().skip(1);
            while let Some(arg) = iter.next() {
                match arg.as_str() {
                    "--folder" | "-f" => {
                        let Some(path) = iter.next() else {
                            bail!("--folder requires a path");
                        };
                        folder = Some(PathBuf::from(path));
                    }
                    "-q" | "--quiet" => quiet = true,
                    other => bail!("unknown install option: {other}"),
                }
            }
            Ok(CliAction::Install { folder, quiet })
        }
        other => bail!("unknown command: {other} (try --help)"),
    }
}

fn load_config() -> Result<(PathBuf, AppConfig)> {
    let path = config::config_path()?;
    let config = config::load(&path)?;
    Ok((path, config))
}

/// Saves `folder` as the last folder, but only once it is a usable directory.
fn remember_folder(config_path: &Path, config: AppConfig, folder: PathBuf) -> Result<AppConfig> {
    sync::ensure_target(&folder).map_err(|err| anyhow!("{}: {err}", err.kind_label()))?;
    let config = config.with_last_folder(folder);
    config::save(config_path, &config)?;
    Ok(config)
}

fn run_install(folder: Option<PathBuf>, quiet: bool) -> Result<()> {
    let (config_path, mut config) = load_config()?;
    if let Some(folder) = folder {
        config = remember_folder(&config_path, config, folder)?;
    }
    let folder = config
        .last_folder
        .clone()
        .context("no mods folder saved; pass --folder <path>")?;

    let transport = HttpTransport::new();
    let outcome = install::run_install(&transport, &config.manifest_url, &folder, |event| {
        print_event(&event, quiet)
    });

    match outcome {
        Ok(InstallOutcome::NoMods) => {
            println!("No mods found.");
            Ok(())
        }
        Ok(InstallOutcome::Synced(result)) => {
            println!("{}", result.summary());
            if result.bytes_downloaded > 0 {
                println!("Fetched {}", format_bytes(result.bytes_downloaded));
            }
            Ok(())
        }
        Err(failure) => {
            if !failure.partial.is_empty() {
                eprintln!("Before the failure:\n{}", failure.partial.summary());
            }
            bail!("{}: {}", failure.error.kind_label(), failure.error)
        }
    }
}

fn print_event(event: &InstallEvent, quiet: bool) {
    match event {
        InstallEvent::SchemaWarning(warning) => eprintln!("Warning: {warning}"),
        InstallEvent::Sync(SyncEvent::Rejected { name }) => {
            eprintln!("Warning: skipped unsafe file name {name}")
        }
        _ if quiet => {}
        InstallEvent::Fetching { url } => println!("Fetching mod list from {url}"),
        InstallEvent::ManifestLoaded { count } => println!("Mod list has {count} entries"),
        InstallEvent::Sync(SyncEvent::Present { name }) => println!("  present     {name}"),
        InstallEvent::Sync(SyncEvent::Downloading { name, url }) => {
            println!("  downloading {name} <- {url}")
        }
        InstallEvent::Sync(SyncEvent::Downloaded { name, bytes }) => {
            println!("  downloaded  {name} ({})", format_bytes(*bytes))
        }
        InstallEvent::Sync(SyncEvent::Progress { .. }) => {}
    }
}

fn run_list() -> Result<()> {
    let (_, config) = load_config()?;
    let transport = HttpTransport::new();
    let fetched = manifest::fetch_manifest(&transport, &config.manifest_url)?;
    if let Some(warning) = &fetched.warning {
        eprintln!("Warning: {warning}");
    }
    for line in list_lines(&fetched) {
        println!("{line}");
    }
    Ok(())
}

fn list_lines(fetched: &FetchedManifest) -> Vec<String> {
    if fetched.is_empty() {
        return vec!["No mods found.".to_string()];
    }
    fetched
        .mods
        .iter()
        .map(|entry| match entry.usable() {
            Some((name, url)) => format!("{name}\t{url}"),
            None => "(incomplete entry skipped)".to_string(),
        })
        .collect()
}

fn run_folder(folder: Option<PathBuf>) -> Result<()> {
    let (config_path, config) = load_config()?;
    match folder {
        Some(folder) => {
            let config = remember_folder(&config_path, config, folder)?;
            if let Some(folder) = &config.last_folder {
                println!("Mods folder set to {}", folder.display());
            }
        }
        None => match config.last_folder {
            Some(folder) => println!("{}", folder.display()),
            None => println!("(not selected)"),
        },
    }
    Ok(())
}

fn print_help() {
    println!("ModSync v{}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Usage:");
    println!("  modsync                          Open the terminal UI");
    println!("  modsync install [--folder PATH]  Download missing mods into the folder");
    println!("                  [-q|--quiet]     Only print warnings and the summary");
    println!("  modsync list                     Print the remote mod list");
    println!("  modsync folder [PATH]            Show or set the saved mods folder");
    println!("  modsync --help | --version");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn no_args_opens_the_ui() {
        assert_eq!(parse_args(&[]).unwrap(), CliAction::Ui);
    }

    #[test]
    fn install_accepts_folder_and_quiet() {
        let action = parse_args(&args(&["install", "--folder", "/srv/mods", "-q"])).unwrap();
        assert_eq!(
            action,
            CliAction::Install {
                folder: Some(PathBuf::from("/srv/mods")),
                quiet: true,
            }
        );
    }

    #[test]
    fn install_folder_needs_a_value() {
        assert!(parse_args(&args(&["install", "--folder"])).is_err());
    }

    #[test]
    fn unknown_commands_are_errors() {
        assert!(parse_args(&args(&["sync-everything"])).is_err());
        assert!(parse_args(&args(&["install", "--force"])).is_err());
    }

    #[test]
    fn folder_without_path_shows_current() {
        assert_eq!(parse_args(&args(&["folder"])).unwrap(), CliAction::Folder(None));
    }

    #[test]
    fn mistyped_folder_keeps_the_saved_one() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.json");
        let mods = dir.path().join("mods");
        std::fs::create_dir(&mods).unwrap();

        let config = remember_folder(&config_path, AppConfig::default(), mods.clone()).unwrap();
        assert_eq!(config.last_folder.as_deref(), Some(mods.as_path()));

        let typo = dir.path().join("mdos");
        assert!(remember_folder(&config_path, config, typo).is_err());
        assert_eq!(config::load(&config_path).unwrap().last_folder, Some(mods));
    }

    #[test]
    fn list_prints_usable_entries_and_flags_the_rest() {
        let fetched = manifest::parse_mod_list(
            r#"{"mods":[{"name":"a.zip","download_url":"http://x/a.zip"},{"name":"b.zip"}]}"#,
        )
        .unwrap();
        assert_eq!(
            list_lines(&fetched),
            vec!["a.zip\thttp://x/a.zip", "(incomplete entry skipped)"]
        );

        let schemaless = manifest::parse_mod_list(r#"{"files":[]}"#).unwrap();
        assert!(schemaless.warning.is_some());
        assert_eq!(list_lines(&schemaless), vec!["No mods found."]);
    }
}
