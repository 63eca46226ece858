//! Small persistence helpers shared by the counter service and other
//! durable state: atomic JSON writes and backup file naming.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::Result;

/// Serialize `value` and write it via temp-file-then-rename so readers
/// never observe a torn document.
pub fn atomic_write_json<T: Serialize>(
    path: &Path,
    value: &T,
) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    let tmp = tmp_sibling(path);
    fs::write(&tmp, json)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn tmp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Backup sibling for `path`, suffixed with an ISO-8601 timestamp whose
/// `:` and `.` are replaced by `-` to stay filename-safe everywhere.
pub fn backup_file_name(path: &Path, at: DateTime<Utc>) -> PathBuf {
    let stamp = at
        .to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
        .replace([':', '.'], "-");
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(format!(".backup-{stamp}"));
    path.with_file_name(name)
}
