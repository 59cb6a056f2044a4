use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Serialize;

use crate::time_utils::current_unix_timestamp_ms;

/// Sibling path a document is staged at before it replaces `path`.
fn staging_path(dir: &Path, path: &Path) -> PathBuf {
    let document = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("document");
    dir.join(format!(
        ".{document}.onair-staged-{}-{}",
        std::process::id(),
        current_unix_timestamp_ms()
    ))
}

/// Serializes `value` as pretty JSON and swaps it into place, so store
/// readers see either the previous document or the new one.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if path.as_os_str().is_empty() {
        bail!("document path cannot be empty");
    }
    if path.is_dir() {
        bail!("document path '{}' is a directory", path.display());
    }
    let mut payload = serde_json::to_vec_pretty(value)
        .with_context(|| format!("failed to serialize {}", path.display()))?;
    payload.push(b'\n');

    let dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;

    let staged = staging_path(dir, path);
    let written = File::create(&staged)
        .and_then(|mut file| {
            file.write_all(&payload)?;
            file.sync_all()
        })
        .with_context(|| format!("failed to stage {}", staged.display()))
        .and_then(|()| {
            std::fs::rename(&staged, path).with_context(|| {
                format!("failed to move {} into place", path.display())
            })
        });
    if written.is_err() {
        let _ = std::fs::remove_file(&staged);
    }
    written
}
