use crate::{error::InstallError, manifest::ModDescriptor, transport::Transport};
use sha2::{Digest, Sha256};
use std::{
    fs::{self, File},
    io::{Read, Write},
    path::{Component, Path, PathBuf},
};
use thiserror::Error;

const CHUNK_SIZE: usize = 8192;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncResult {
    /// Pre-existing and newly downloaded names, in manifest order.
    pub installed: Vec<String>,
    /// Names that needed a network fetch.
    pub to_download: Vec<String>,
    /// Names that would escape the target folder.
    pub rejected: Vec<String>,
    pub bytes_downloaded: u64,
}

impl SyncResult {
    pub fn is_empty(&self) -> bool {
        self.installed.is_empty() && self.to_download.is_empty()
    }

    pub fn summary(&self) -> String {
        let mut lines = vec![
            format!("Installed: {}", join_or_none(&self.installed)),
            format!("Downloaded: {}", join_or_none(&self.to_download)),
        ];
        if !self.rejected.is_empty() {
            lines.push(format!("Rejected: {}", self.rejected.join(", ")));
        }
        lines.join("\n")
    }
}

fn join_or_none(names: &[String]) -> String {
    if names.is_empty() {
        "none".to_string()
    } else {
        names.join(", ")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    Present { name: String },
    Downloading { name: String, url: String },
    Downloaded { name: String, bytes: u64 },
    Rejected { name: String },
    Progress { processed: usize, total: usize },
}

pub fn progress_fraction(processed: usize, total: usize) -> f64 {
    if total == 0 {
        return 1.0;
    }
    (processed as f64 / total as f64).clamp(0.0, 1.0)
}

/// A failed sync, with everything accumulated before the failing step.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct SyncFailure {
    #[source]
    pub error: InstallError,
    pub partial: SyncResult,
}

pub fn ensure_target(target: &Path) -> Result<(), InstallError> {
    if target.as_os_str().is_empty() || !target.is_dir() {
        return Err(InstallError::InvalidTarget(target.to_path_buf()));
    }
    Ok(())
}

pub fn sync(
    transport: &dyn Transport,
    target: &Path,
    descriptors: &[ModDescriptor],
    mut on_event: impl FnMut(SyncEvent),
) -> Result<SyncResult, SyncFailure> {
    let mut result = SyncResult::default();
    if let Err(error) = ensure_target(target) {
        return Err(SyncFailure {
            error,
            partial: result,
        });
    }

    let total = descriptors.len();
    let mut processed = 0;
    for descriptor in descriptors {
        let Some((name, url)) = descriptor.usable() else {
            continue;
        };

        if !is_plain_file_name(name) {
            result.rejected.push(name.to_string());
            on_event(SyncEvent::Rejected {
                name: name.to_string(),
            });
        } else if target.join(name).exists() {
            result.installed.push(name.to_string());
            on_event(SyncEvent::Present {
                name: name.to_string(),
            });
        } else {
            result.to_download.push(name.to_string());
            on_event(SyncEvent::Downloading {
                name: name.to_string(),
                url: url.to_string(),
            });
            match download(transport, url, target, name, descriptor.sha256.as_deref()) {
                Ok(bytes) => {
                    result.installed.push(name.to_string());
                    result.bytes_downloaded += bytes;
                    on_event(SyncEvent::Downloaded {
                        name: name.to_string(),
                        bytes,
                    });
                }
                Err(reason) => {
                    return Err(SyncFailure {
                        error: InstallError::Download {
                            name: name.to_string(),
                            url: url.to_string(),
                            reason,
                        },
                        partial: result,
                    });
                }
            }
        }

        processed += 1;
        on_event(SyncEvent::Progress { processed, total });
    }

    Ok(result)
}

fn is_plain_file_name(name: &str) -> bool {
    if name.contains('/') || name.contains('\\') {
        return false;
    }
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

fn part_path(target: &Path, name: &str) -> PathBuf {
    target.join(format!("{name}.part"))
}

/// Streams `url` into `<name>.part` and renames it into place. The part
/// file never outlives a failure.
fn download(
    transport: &dyn Transport,
    url: &str,
    target: &Path,
    name: &str,
    expected_sha256: Option<&str>,
) -> Result<u64, String> {
    let part = part_path(target, name);
    let written = stream_to(transport, url, &part, expected_sha256).and_then(|bytes| {
        fs::rename(&part, target.join(name))
            .map(|_| bytes)
            .map_err(|err| format!("finalize file: {err}"))
    });
    if written.is_err() {
        let _ = fs::remove_file(&part);
    }
    written
}

fn stream_to(
    transport: &dyn Transport,
    url: &str,
    path: &Path,
    expected_sha256: Option<&str>,
) -> Result<u64, String> {
    let mut reader = transport.get(url).map_err(|err| err.to_string())?;
    let mut file = File::create(path).map_err(|err| format!("create file: {err}"))?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; CHUNK_SIZE];
    let mut total = 0u64;
    loop {
        let read = reader
            .read(&mut buffer)
            .map_err(|err| format!("read response: {err}"))?;
        if read == 0 {
            break;
        }
        file.write_all(&buffer[..read])
            .map_err(|err| format!("write file: {err}"))?;
        hasher.update(&buffer[..read]);
        total += read as u64;
    }
    file.flush().map_err(|err| format!("write file: {err}"))?;

    if let Some(expected) = expected_sha256 {
        let actual = format!("{:x}", hasher.finalize());
        if !actual.eq_ignore_ascii_case(expected.trim()) {
            return Err(format!("checksum mismatch (expected {expected}, got {actual})"));
        }
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::testing::MemoryTransport;

    fn descriptor(name: &str) -> ModDescriptor {
        ModDescriptor::new(name, &format!("http://x/{name}"))
    }

    fn run(
        transport: &MemoryTransport,
        target: &Path,
        descriptors: &[ModDescriptor],
    ) -> (Result<SyncResult, SyncFailure>, Vec<SyncEvent>) {
        let mut events = Vec::new();
        let result = sync(transport, target, descriptors, |event| events.push(event));
        (result, events)
    }

    #[test]
    fn installs_only_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("foo.zip"), b"old").unwrap();
        let transport = MemoryTransport::new()
            .with_body("http://x/foo.zip", "new")
            .with_body("http://x/bar.zip", "bar-bytes");

        let (result, _) = run(
            &transport,
            dir.path(),
            &[descriptor("foo.zip"), descriptor("bar.zip")],
        );
        let result = result.unwrap();

        assert_eq!(result.installed, vec!["foo.zip", "bar.zip"]);
        assert_eq!(result.to_download, vec!["bar.zip"]);
        assert_eq!(transport.requests(), vec!["http://x/bar.zip"]);
        assert_eq!(fs::read(dir.path().join("bar.zip")).unwrap(), b"bar-bytes");
        assert_eq!(fs::read(dir.path().join("foo.zip")).unwrap(), b"old");
        assert_eq!(result.bytes_downloaded, 9);
    }

    #[test]
    fn everything_present_means_no_network() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["a.zip", "b.zip"] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }
        let transport = MemoryTransport::new();

        let descriptors = [descriptor("a.zip"), descriptor("b.zip")];
        let (result, _) = run(&transport, dir.path(), &descriptors);
        let result = result.unwrap();

        assert!(result.to_download.is_empty());
        assert!(transport.requests().is_empty());
    }

    #[test]
    fn downloads_each_missing_descriptor_once() {
        let dir = tempfile::tempdir().unwrap();
        let big = vec![7u8; CHUNK_SIZE * 3 + 11];
        let transport = MemoryTransport::new()
            .with_body("http://x/a.zip", big.clone())
            .with_body("http://x/b.zip", "b");

        let descriptors = [descriptor("a.zip"), descriptor("b.zip")];
        let (result, _) = run(&transport, dir.path(), &descriptors);

        assert_eq!(result.unwrap().to_download, vec!["a.zip", "b.zip"]);
        assert_eq!(transport.requests().len(), 2);
        assert_eq!(fs::read(dir.path().join("a.zip")).unwrap(), big);
        assert_eq!(fs::read(dir.path().join("b.zip")).unwrap(), b"b");
    }

    #[test]
    fn incomplete_descriptors_are_skipped_without_progress() {
        let dir = tempfile::tempdir().unwrap();
        let transport = MemoryTransport::new().with_body("http://x/ok.zip", "ok");
        let descriptors = vec![
            ModDescriptor {
                name: Some("no-url.zip".to_string()),
                ..ModDescriptor::default()
            },
            descriptor("ok.zip"),
            ModDescriptor {
                download_url: Some("http://x/anon".to_string()),
                ..ModDescriptor::default()
            },
        ];

        let (result, events) = run(&transport, dir.path(), &descriptors);
        let result = result.unwrap();

        assert_eq!(result.installed, vec!["ok.zip"]);
        assert_eq!(result.to_download, vec!["ok.zip"]);
        let progress: Vec<_> = events
            .iter()
            .filter_map(|event| match event {
                SyncEvent::Progress { processed, total } => Some((*processed, *total)),
                _ => None,
            })
            .collect();
        assert_eq!(progress, vec![(1, 3)]);
    }

    #[test]
    fn duplicate_names_are_each_processed() {
        let dir = tempfile::tempdir().unwrap();
        let transport = MemoryTransport::new().with_body("http://x/a.zip", "a");

        let descriptors = [descriptor("a.zip"), descriptor("a.zip")];
        let (result, _) = run(&transport, dir.path(), &descriptors);
        let result = result.unwrap();

        assert_eq!(result.installed, vec!["a.zip", "a.zip"]);
        assert_eq!(result.to_download, vec!["a.zip"]);
    }

    #[test]
    fn names_that_escape_the_folder_are_rejected() {
        let root = tempfile::tempdir().unwrap();
        let target = root.path().join("mods");
        fs::create_dir(&target).unwrap();
        let transport = MemoryTransport::new().with_body("http://x/evil", "evil");
        let descriptors = vec![
            ModDescriptor::new("../evil.zip", "http://x/evil"),
            ModDescriptor::new("..", "http://x/evil"),
        ];

        let (result, _) = run(&transport, &target, &descriptors);
        let result = result.unwrap();

        assert_eq!(result.rejected, vec!["../evil.zip", ".."]);
        assert!(result.installed.is_empty());
        assert!(transport.requests().is_empty());
        assert!(!root.path().join("evil.zip").exists());
    }

    #[test]
    fn missing_target_fails_before_any_request() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("does-not-exist");
        let transport = MemoryTransport::new();

        let (result, _) = run(&transport, &target, &[descriptor("a.zip")]);

        let failure = result.unwrap_err();
        assert!(matches!(failure.error, InstallError::InvalidTarget(_)));
        assert!(transport.requests().is_empty());
    }

    #[test]
    fn failed_download_keeps_earlier_files_and_reports_partial() {
        let dir = tempfile::tempdir().unwrap();
        let transport = MemoryTransport::new()
            .with_body("http://x/a.zip", "a")
            .with_broken_body("http://x/b.zip", "half")
            .with_body("http://x/c.zip", "c");

        let (result, _) = run(
            &transport,
            dir.path(),
            &[descriptor("a.zip"), descriptor("b.zip"), descriptor("c.zip")],
        );

        let failure = result.unwrap_err();
        match &failure.error {
            InstallError::Download { name, url, .. } => {
                assert_eq!(name, "b.zip");
                assert_eq!(url, "http://x/b.zip");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(failure.partial.installed, vec!["a.zip"]);
        assert_eq!(failure.partial.to_download, vec!["a.zip", "b.zip"]);
        assert!(dir.path().join("a.zip").exists());
        assert!(!dir.path().join("b.zip").exists());
        assert!(!dir.path().join("b.zip.part").exists());
        assert!(!dir.path().join("c.zip").exists());
        assert_eq!(transport.requests().len(), 2);
    }

    #[test]
    fn http_error_status_is_a_download_error() {
        let dir = tempfile::tempdir().unwrap();
        let transport = MemoryTransport::new().with_status("http://x/a.zip", 500);

        let (result, _) = run(&transport, dir.path(), &[descriptor("a.zip")]);

        let failure = result.unwrap_err();
        assert!(matches!(failure.error, InstallError::Download { .. }));
        assert!(!dir.path().join("a.zip.part").exists());
    }

    #[test]
    fn checksum_is_verified_when_present() {
        let dir = tempfile::tempdir().unwrap();
        let transport = MemoryTransport::new()
            .with_body("http://x/good.zip", "hello")
            .with_body("http://x/bad.zip", "tampered");
        let hello_sha = "2CF24DBA5FB0A30E26E83B2AC5B9E29E1B161E5C1FA7425E73043362938B9824";
        let mut good = descriptor("good.zip");
        good.sha256 = Some(hello_sha.to_string());
        let mut bad = descriptor("bad.zip");
        bad.sha256 = Some(hello_sha.to_string());

        let (result, _) = run(&transport, dir.path(), &[good, bad]);

        let failure = result.unwrap_err();
        assert!(matches!(
            &failure.error,
            InstallError::Download { name, .. } if name == "bad.zip"
        ));
        assert_eq!(failure.partial.installed, vec!["good.zip"]);
        assert!(!dir.path().join("bad.zip").exists());
    }

    #[test]
    fn progress_is_monotonic_over_the_full_count() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.zip"), b"x").unwrap();
        let transport = MemoryTransport::new().with_body("http://x/b.zip", "b");

        let descriptors = [descriptor("a.zip"), descriptor("b.zip")];
        let (_, events) = run(&transport, dir.path(), &descriptors);

        let fractions: Vec<f64> = events
            .iter()
            .filter_map(|event| match event {
                SyncEvent::Progress { processed, total } => {
                    Some(progress_fraction(*processed, *total))
                }
                _ => None,
            })
            .collect();
        assert_eq!(fractions, vec![0.5, 1.0]);
    }

    #[test]
    fn summary_uses_none_for_empty_lists() {
        let result = SyncResult {
            installed: vec!["a.zip".to_string()],
            ..SyncResult::default()
        };
        assert_eq!(result.summary(), "Installed: a.zip\nDownloaded: none");
    }
}
