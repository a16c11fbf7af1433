use crate::catalogue::Case;
use crate::checkpoint::CheckpointStore;
use crate::executor::{Executor, RunOutcome};
use crate::exit::Disposition;
use crate::failures::FailureAggregator;
use crate::fsutil::ensure_dir;
use crate::interrupt::InterruptController;
use crate::progress::{format_elapsed, format_progress};
use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{error, info, warn};

/// Drives every case through its runs, resuming from checkpoints.
pub struct RunScheduler<E, W> {
    executor: E,
    out: W,
    interrupt: InterruptController,
    checkpoints: CheckpointStore,
    runs: u32,
    interval: f64,
    scratch_dir: PathBuf,
}

impl<E: Executor, W: Write> RunScheduler<E, W> {
    pub fn new(
        executor: E,
        out: W,
        interrupt: InterruptController,
        runs: u32,
        interval: f64,
        scratch_dir: PathBuf,
    ) -> Self {
        Self {
            executor,
            out,
            interrupt,
            checkpoints: CheckpointStore,
            runs,
            interval,
            scratch_dir,
        }
    }

    pub fn into_parts(self) -> (E, W) {
        (self.executor, self.out)
    }

    /// Runs all pending work of `cases`, in directory order.
    ///
    /// A fatal run outcome stops everything at once. A failed run abandons
    /// the rest of its case only; failures are reported once all cases were
    /// tried.
    pub fn execute(&mut self, cases: &[Case]) -> Result<Disposition> {
        if cases.is_empty() {
            error!("no cases discovered");
            return Ok(Disposition::NoCases);
        }
        let mut ordered: Vec<&Case> = cases.iter().collect();
        ordered.sort_by(|a, b| a.directory.cmp(&b.directory));

        let start = Instant::now();
        let total = ordered.len();
        let mut failures = FailureAggregator::new();

        for (idx, case) in ordered.into_iter().enumerate() {
            let progress = format_progress(idx + 1, total, start);
            if self.checkpoints.fully_done(case, self.runs) {
                info!(case = %case.name, "case already complete");
                writeln!(self.out, "{} \u{23ed}  {} (skipped, already done)", progress, case.name)?;
                continue;
            }
            writeln!(self.out, "{} \u{25b6}  {}", progress, case.name)?;
            for step in &case.steps {
                writeln!(self.out, "       - {}", step.name)?;
            }

            match self.execute_case(case, &mut failures)? {
                CaseResult::Completed => {
                    self.checkpoints.mark_case(case)?;
                    writeln!(self.out, "{} \u{2705} {}", progress, case.name)?;
                }
                CaseResult::Abandoned => {}
                CaseResult::Stop(disposition) => return Ok(disposition),
            }
        }

        if failures.is_empty() {
            writeln!(
                self.out,
                "\u{2705} all {} cases completed in {}",
                total,
                format_elapsed(start.elapsed())
            )?;
            Ok(Disposition::Success)
        } else {
            error!(failed = failures.len(), "some cases failed");
            writeln!(self.out, "\u{274c} {} case(s) failed:", failures.len())?;
            write!(self.out, "{}", failures.render())?;
            Ok(Disposition::Failed)
        }
    }

    fn execute_case(&mut self, case: &Case, failures: &mut FailureAggregator) -> Result<CaseResult> {
        let start_run = self.checkpoints.first_pending_run(case, self.runs);
        for run in start_run..=self.runs {
            clear_scratch(&self.scratch_dir)?;
            if self.checkpoints.run_done(case, run) {
                continue;
            }
            let last_run = run == self.runs;
            let outcome = self.executor.run(case, self.interval, run, last_run);
            let succeeded = match outcome {
                RunOutcome::Fatal(err) => {
                    let reason = format!("{:#}", err);
                    error!(case = %case.name, run, error = %reason, "run aborted");
                    writeln!(self.out, "       \u{274c} run {} aborted: {}", run, reason)?;
                    return Ok(CaseResult::Stop(Disposition::Failed));
                }
                RunOutcome::Success => {
                    self.checkpoints.mark_run(case, run)?;
                    writeln!(self.out, "       \u{2714} run {}/{}", run, self.runs)?;
                    true
                }
                RunOutcome::Failed => false,
            };
            if self.interrupt.stop_requested() {
                warn!(case = %case.name, run, "interrupted, stopping after current run");
                writeln!(self.out, "interrupted")?;
                return Ok(CaseResult::Stop(Disposition::Interrupted));
            }
            if !succeeded {
                warn!(case = %case.name, run, "run failed, skipping remaining runs");
                failures.record(&case.name);
                writeln!(
                    self.out,
                    "       \u{274c} run {}/{} failed, skipping remaining runs",
                    run, self.runs
                )?;
                return Ok(CaseResult::Abandoned);
            }
        }
        Ok(CaseResult::Completed)
    }
}

enum CaseResult {
    Completed,
    Abandoned,
    Stop(Disposition),
}

/// Empties the scratch location left behind by an earlier tool invocation.
fn clear_scratch(dir: &Path) -> Result<()> {
    if dir.is_dir() {
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            let removed = if path.is_dir() {
                fs::remove_dir_all(&path)
            } else {
                fs::remove_file(&path)
            };
            removed.with_context(|| format!("clearing {}", path.display()))?;
        }
    }
    ensure_dir(dir)
}
