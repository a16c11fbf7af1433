use crate::catalogue::Case;
use crate::checkpoint::CheckpointStore;
use crate::stats::ARCHIVE_NAME;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Removes checkpoints, per-case results and the archive. Returns what was
/// removed.
pub fn clean(cases: &[Case], root: &Path) -> Result<Vec<PathBuf>> {
    let store = CheckpointStore;
    let mut removed = Vec::new();
    for case in cases {
        let marker = store.case_marker(case);
        if marker.exists() {
            fs::remove_file(&marker).with_context(|| format!("removing {}", marker.display()))?;
            removed.push(marker);
        }
        let results = case.results_dir();
        if results.exists() {
            fs::remove_dir_all(&results)
                .with_context(|| format!("removing {}", results.display()))?;
            removed.push(results);
        }
    }
    let archive = root.join(ARCHIVE_NAME);
    if archive.exists() {
        fs::remove_file(&archive).with_context(|| format!("removing {}", archive.display()))?;
        removed.push(archive);
    }
    info!(removed = removed.len(), "cleaned case root");
    Ok(removed)
}
