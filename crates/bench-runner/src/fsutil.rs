use anyhow::{Context, Result};
use chrono::Utc;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

pub(crate) fn ensure_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).with_context(|| format!("creating {}", path.display()))
}

/// Hidden sibling of `target` that is unique to this process and instant.
fn staging_path(target: &Path) -> PathBuf {
    let stem = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "out".to_string());
    target.with_file_name(format!(
        ".{}.{}-{}.partial",
        stem,
        std::process::id(),
        Utc::now().timestamp_nanos_opt().unwrap_or_default()
    ))
}

/// Writes through a staging file and renames it over `path`, so readers
/// (and a resumed runner) see either the old content or the new one.
pub(crate) fn atomic_write_bytes(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    ensure_dir(dir)?;
    let staging = staging_path(path);
    let written = fs::File::create(&staging)
        .and_then(|mut f| f.write_all(bytes).and_then(|()| f.sync_all()))
        .and_then(|()| fs::rename(&staging, path));
    if let Err(err) = written {
        let _ = fs::remove_file(&staging);
        return Err(err).with_context(|| format!("writing {}", path.display()));
    }
    // The rename is only durable once the directory entry is flushed.
    if let Err(err) = fs::File::open(dir).and_then(|d| d.sync_all()) {
        debug!(dir = %dir.display(), error = %err, "directory fsync failed");
    }
    Ok(())
}

#[cfg(test)]
pub(crate) fn temp_root(label: &str) -> PathBuf {
    let root = std::env::temp_dir().join(format!(
        "bench_{}_test_{}_{}",
        label,
        std::process::id(),
        Utc::now().timestamp_micros()
    ));
    ensure_dir(&root).expect("temp root");
    root
}
