use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InstallError {
    #[error("could not fetch mod list: {0}")]
    Network(#[from] TransportError),
    #[error("mod list is malformed: {0}")]
    Format(String),
    #[error("not a valid mods folder: {}", .0.display())]
    InvalidTarget(PathBuf),
    #[error("download of {name} from {url} failed: {reason}")]
    Download {
        name: String,
        url: String,
        reason: String,
    },
}

impl InstallError {
    /// Short label used for dialog titles and CLI prefixes.
    pub fn kind_label(&self) -> &'static str {
        match self {
            InstallError::Network(_) => "Network error",
            InstallError::Format(_) => "Bad mod list",
            InstallError::InvalidTarget(_) => "Invalid folder",
            InstallError::Download { .. } => "Download failed",
        }
    }
}

/// The manifest parsed but has no usable `mods` list. Reported, never fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("mod list has no `mods` array")]
pub struct SchemaError;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },
    #[error("request to {url} failed: {message}")]
    Io { url: String, message: String },
}
