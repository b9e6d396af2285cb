use crate::{
    error::{InstallError, SchemaError, TransportError},
    transport::Transport,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::Value;
use std::io::Read;

pub const DEFAULT_MANIFEST_URL: &str =
    "https://api.github.com/repos/chenxingpengs/shanhai-server/contents/mod_list.json";

/// One manifest entry. Both fields are optional on the wire; incomplete
/// entries are dropped by the synchronizer, not here.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModDescriptor {
    pub name: Option<String>,
    pub download_url: Option<String>,
    pub sha256: Option<String>,
}

impl ModDescriptor {
    #[cfg(test)]
    pub fn new(name: &str, download_url: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            download_url: Some(download_url.to_string()),
            sha256: None,
        }
    }

    /// `(name, url)` when both are present and non-empty.
    pub fn usable(&self) -> Option<(&str, &str)> {
        let name = self.name.as_deref().filter(|value| !value.is_empty())?;
        let url = self
            .download_url
            .as_deref()
            .filter(|value| !value.is_empty())?;
        Some((name, url))
    }

    /// Reads the string fields of one `mods` entry. Anything that is not a
    /// string, including a non-object entry, counts as absent.
    fn from_entry(entry: &Value) -> Self {
        let field = |key: &str| entry.get(key).and_then(Value::as_str).map(str::to_string);
        Self {
            name: field("name"),
            download_url: field("download_url"),
            sha256: field("sha256"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FetchedManifest {
    pub mods: Vec<ModDescriptor>,
    pub warning: Option<SchemaError>,
}

impl FetchedManifest {
    pub fn is_empty(&self) -> bool {
        self.mods.is_empty()
    }
}

pub fn fetch_manifest(
    transport: &dyn Transport,
    url: &str,
) -> Result<FetchedManifest, InstallError> {
    let mut body = transport.get(url)?;
    let mut raw = Vec::new();
    body.read_to_end(&mut raw)
        .map_err(|err| TransportError::Io {
            url: url.to_string(),
            message: format!("read response body: {err}"),
        })?;
    parse_envelope(&raw)
}

/// Decodes a contents-API envelope: `{ "content": "<base64>" }` wrapping
/// `{ "mods": [...] }`.
pub fn parse_envelope(raw: &[u8]) -> Result<FetchedManifest, InstallError> {
    let envelope: Value = serde_json::from_slice(raw)
        .map_err(|err| InstallError::Format(format!("response is not JSON: {err}")))?;
    let content = envelope
        .get("content")
        .and_then(Value::as_str)
        .ok_or_else(|| InstallError::Format("response has no `content` field".to_string()))?;

    // The contents API wraps base64 at 60 columns.
    let compact: String = content
        .chars()
        .filter(|ch| !ch.is_ascii_whitespace())
        .collect();
    let decoded = STANDARD
        .decode(compact.as_bytes())
        .map_err(|err| InstallError::Format(format!("content is not base64: {err}")))?;
    let text = String::from_utf8(decoded)
        .map_err(|err| InstallError::Format(format!("content is not UTF-8: {err}")))?;

    parse_mod_list(&text)
}

pub fn parse_mod_list(text: &str) -> Result<FetchedManifest, InstallError> {
    let document: Value = serde_json::from_str(text)
        .map_err(|err| InstallError::Format(format!("mod list is not JSON: {err}")))?;
    let Some(entries) = document.get("mods").and_then(Value::as_array) else {
        return Ok(FetchedManifest {
            mods: Vec::new(),
            warning: Some(SchemaError),
        });
    };

    let mods = entries.iter().map(ModDescriptor::from_entry).collect();
    Ok(FetchedManifest {
        mods,
        warning: None,
    })
}
