use crate::{
    error::{InstallError, SchemaError},
    manifest,
    sync::{self, SyncEvent, SyncFailure, SyncResult},
    transport::Transport,
};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallEvent {
    Fetching { url: String },
    ManifestLoaded { count: usize },
    SchemaWarning(SchemaError),
    Sync(SyncEvent),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    /// The manifest had nothing to install; no sync was attempted.
    NoMods,
    Synced(SyncResult),
}

/// Fetch the manifest and bring `target` in line with it. Independent of
/// any front-end; progress flows through `on_event`.
pub fn run_install(
    transport: &dyn Transport,
    manifest_url: &str,
    target: &Path,
    mut on_event: impl FnMut(InstallEvent),
) -> Result<InstallOutcome, SyncFailure> {
    sync::ensure_target(target).map_err(without_partial)?;

    on_event(InstallEvent::Fetching {
        url: manifest_url.to_string(),
    });
    let fetched = manifest::fetch_manifest(transport, manifest_url).map_err(without_partial)?;
    if let Some(warning) = fetched.warning.clone() {
        on_event(InstallEvent::SchemaWarning(warning));
    }
    if fetched.is_empty() {
        return Ok(InstallOutcome::NoMods);
    }
    on_event(InstallEvent::ManifestLoaded {
        count: fetched.mods.len(),
    });

    let result = sync::sync(transport, target, &fetched.mods, |event| {
        on_event(InstallEvent::Sync(event))
    })?;
    if result.is_empty() {
        return Ok(InstallOutcome::NoMods);
    }
    Ok(InstallOutcome::Synced(result))
}

fn without_partial(error: InstallError) -> SyncFailure {
    SyncFailure {
        error,
        partial: SyncResult::default(),
    }
}
