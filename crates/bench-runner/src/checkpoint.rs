use crate::catalogue::Case;
use crate::fsutil::ensure_dir;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

pub const MARKER: &str = ".done";

/// Existence-only completion markers for cases and their runs.
///
/// Markers are created empty and never read; their absence means "not done
/// yet, or failed".
#[derive(Debug, Clone, Copy, Default)]
pub struct CheckpointStore;

impl CheckpointStore {
    pub fn case_marker(&self, case: &Case) -> PathBuf {
        case.directory.join(MARKER)
    }

    pub fn run_marker(&self, case: &Case, run: u32) -> PathBuf {
        case.run_dir(run).join(MARKER)
    }

    pub fn case_done(&self, case: &Case) -> bool {
        self.case_marker(case).exists()
    }

    pub fn run_done(&self, case: &Case, run: u32) -> bool {
        self.run_marker(case, run).exists()
    }

    /// Case marker present and every run in `1..=runs` marked.
    pub fn fully_done(&self, case: &Case, runs: u32) -> bool {
        self.case_done(case) && (1..=runs).all(|run| self.run_done(case, run))
    }

    /// First run without a marker; `runs + 1` when all are marked.
    pub fn first_pending_run(&self, case: &Case, runs: u32) -> u32 {
        (1..=runs)
            .find(|run| !self.run_done(case, *run))
            .unwrap_or(runs + 1)
    }

    pub fn mark_run(&self, case: &Case, run: u32) -> Result<()> {
        let path = self.run_marker(case, run);
        touch(&path)
    }

    pub fn mark_case(&self, case: &Case) -> Result<()> {
        touch(&self.case_marker(case))
    }
}

fn touch(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    fs::File::create(path).with_context(|| format!("writing marker {}", path.display()))?;
    Ok(())
}
