use crate::catalogue::Case;
use crate::executor::Executor;
use crate::exit::Disposition;
use crate::failures::FailureAggregator;
use crate::fsutil::atomic_write_bytes;
use anyhow::{Context, Result};
use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};
use zip::write::FileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

pub const ARCHIVE_NAME: &str = "results.zip";
/// Per-case result files, in archive order. Any of them may be missing.
pub const RESULT_FILES: [&str; 3] = ["aggregated.csv", "summary.csv", "stats.csv"];
const MARKER_FILE: &str = RESULT_FILES[0];

/// Post-execution pass: aggregates every case once, then bundles the result
/// files into `<root>/results.zip`.
pub struct StatsAggregator<E, W> {
    executor: E,
    out: W,
    root: PathBuf,
}

impl<E: Executor, W: Write> StatsAggregator<E, W> {
    pub fn new(executor: E, out: W, root: PathBuf) -> Self {
        Self {
            executor,
            out,
            root,
        }
    }

    pub fn into_parts(self) -> (E, W) {
        (self.executor, self.out)
    }

    pub fn archive_path(&self) -> PathBuf {
        self.root.join(ARCHIVE_NAME)
    }

    pub fn generate(&mut self, cases: &[Case]) -> Result<Disposition> {
        if cases.is_empty() {
            error!("no cases discovered");
            return Ok(Disposition::NoCases);
        }
        let mut failures = FailureAggregator::new();
        for case in cases {
            if case.results_dir().join(MARKER_FILE).exists() {
                info!(case = %case.name, "already aggregated");
                writeln!(self.out, "\u{23ed}  {} (already aggregated)", case.name)?;
                continue;
            }
            match self.executor.stats(case) {
                Ok(true) => writeln!(self.out, "\u{2705} {}", case.name)?,
                Ok(false) => {
                    warn!(case = %case.name, "stats generation failed");
                    writeln!(self.out, "\u{274c} {}", case.name)?;
                    failures.record(&case.name);
                }
                Err(err) => {
                    let reason = format!("{:#}", err);
                    warn!(case = %case.name, error = %reason, "stats generation errored");
                    writeln!(self.out, "\u{274c} {}: {}", case.name, reason)?;
                    failures.record(&case.name);
                }
            }
        }

        if !failures.is_empty() {
            writeln!(self.out, "\u{274c} stats failed for {} case(s):", failures.len())?;
            write!(self.out, "{}", failures.render())?;
            return Ok(Disposition::Failed);
        }

        let archive = self.archive_path();
        let bytes = build_archive(&self.root, cases)?;
        atomic_write_bytes(&archive, &bytes)?;
        info!(archive = %archive.display(), "wrote results archive");
        writeln!(self.out, "archive: {}", archive.display())?;
        Ok(Disposition::Success)
    }
}

fn entry_prefix(root: &Path, case: &Case) -> String {
    match case.directory.strip_prefix(root) {
        Ok(rel) if !rel.as_os_str().is_empty() => rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/"),
        _ => case.name.clone(),
    }
}

/// Zip of every existing result file. Timestamps are pinned so identical
/// inputs give identical bytes.
fn build_archive(root: &Path, cases: &[Case]) -> Result<Vec<u8>> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::<u8>::new()));
    let options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default());
    for case in cases {
        let prefix = entry_prefix(root, case);
        for file in RESULT_FILES {
            let path = case.results_dir().join(file);
            if !path.is_file() {
                continue;
            }
            let data = fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
            writer.start_file(format!("{}/{}", prefix, file), options)?;
            writer.write_all(&data)?;
        }
    }
    Ok(writer.finish()?.into_inner())
}
