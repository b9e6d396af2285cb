use crate::manifest::DEFAULT_MANIFEST_URL;
use anyhow::{Context, Result};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub last_folder: Option<PathBuf>,
    #[serde(default = "default_manifest_url")]
    pub manifest_url: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            last_folder: None,
            manifest_url: default_manifest_url(),
        }
    }
}

impl AppConfig {
    pub fn with_last_folder(self, folder: PathBuf) -> Self {
        Self {
            last_folder: Some(folder),
            ..self
        }
    }
}

/// Missing file yields defaults; a corrupt one is an error.
pub fn load(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let raw = fs::read_to_string(path).context("read app config")?;
    let mut config: AppConfig = serde_json::from_str(&raw).context("parse app config")?;
    if config.manifest_url.trim().is_empty() {
        config.manifest_url = default_manifest_url();
    }
    Ok(config)
}

pub fn save(path: &Path, config: &AppConfig) -> Result<()> {
    let parent = path.parent().context("config parent")?;
    fs::create_dir_all(parent).context("create app data dir")?;
    let raw = serde_json::to_string_pretty(config).context("serialize app config")?;
    let temp = path.with_extension("json.tmp");
    fs::write(&temp, raw).context("write app config")?;
    fs::rename(&temp, path).context("finalize app config")?;
    Ok(())
}

pub fn config_path() -> Result<PathBuf> {
    Ok(base_data_dir()?.join("config.json"))
}

pub fn log_path() -> Result<PathBuf> {
    Ok(base_data_dir()?.join("modsync.log"))
}

fn default_manifest_url() -> String {
    DEFAULT_MANIFEST_URL.to_string()
}

fn base_data_dir() -> Result<PathBuf> {
    let base = BaseDirs::new().context("resolve home dir")?;
    Ok(base.data_local_dir().join("modsync"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load(&dir.path().join("config.json")).unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.manifest_url, DEFAULT_MANIFEST_URL);
    }

    #[test]
    fn saved_folder_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = AppConfig::default().with_last_folder(PathBuf::from("/srv/game/mods"));

        save(&path, &config).unwrap();

        assert_eq!(load(&path).unwrap(), config);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn older_files_without_url_get_the_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"last_folder":"/srv/mods"}"#).unwrap();

        let config = load(&path).unwrap();

        assert_eq!(config.last_folder, Some(PathBuf::from("/srv/mods")));
        assert_eq!(config.manifest_url, DEFAULT_MANIFEST_URL);
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{not json").unwrap();
        assert!(load(&path).is_err());
    }
}
