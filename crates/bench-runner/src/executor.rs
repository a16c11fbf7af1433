use crate::catalogue::{Case, Step};
use crate::config::Settings;
use crate::fsutil::{atomic_write_bytes, ensure_dir};
use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub const METRICS_FILE: &str = "metrics.csv";
pub const EXECUTED_FILE: &str = "executed.json";

/// Result of one run at the executor boundary.
#[derive(Debug)]
pub enum RunOutcome {
    Success,
    /// The run finished but did not succeed; later cases may still run.
    Failed,
    /// Something went wrong outside the run itself; nothing further is
    /// attempted in this invocation.
    Fatal(anyhow::Error),
}

/// Invoked after each reported sub-step.
pub type StepHook = Box<dyn FnMut(&Case, &Step) + Send>;

/// The collaborator that actually executes cases and computes their
/// statistics.
pub trait Executor {
    fn run(&mut self, case: &Case, interval: f64, run: u32, last_run: bool) -> RunOutcome;

    /// `Ok(false)` when the case has nothing usable to aggregate.
    fn stats(&mut self, case: &Case) -> Result<bool>;
}

/// Runs case steps as child processes, either locally or in a container.
pub struct ProcessExecutor {
    docker_bin: String,
    step_timeout: Duration,
    on_step: Option<StepHook>,
}

impl std::fmt::Debug for ProcessExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessExecutor")
            .field("docker_bin", &self.docker_bin)
            .field("step_timeout", &self.step_timeout)
            .field("on_step", &self.on_step.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct MetricRow {
    run: u32,
    step: usize,
    name: String,
    started_at: String,
    duration_s: f64,
    exit_code: i32,
}

#[derive(Debug, Serialize)]
struct SummaryRow<'a> {
    step: usize,
    name: &'a str,
    runs: usize,
    median_duration_s: f64,
}

#[derive(Debug, Serialize)]
struct StatsRow<'a> {
    step: usize,
    name: &'a str,
    min_s: f64,
    max_s: f64,
    mean_s: f64,
}

impl ProcessExecutor {
    pub fn new(settings: &Settings) -> Self {
        Self {
            docker_bin: settings.docker_bin.clone(),
            step_timeout: settings.step_timeout,
            on_step: None,
        }
    }

    pub fn with_step_hook(mut self, hook: StepHook) -> Self {
        self.on_step = Some(hook);
        self
    }

    fn run_steps(&mut self, case: &Case, interval: f64, run: u32, last_run: bool) -> Result<bool> {
        let run_dir = case.run_dir(run);
        ensure_dir(&run_dir)?;
        let poll = Duration::try_from_secs_f64(interval.max(0.001))
            .map_err(|e| anyhow!("invalid sampling interval {}: {}", interval, e))?;
        let mut rows = Vec::with_capacity(case.steps.len());
        let mut success = true;

        for (idx, step) in case.steps.iter().enumerate() {
            let log_path = run_dir.join(format!("step_{}.log", idx + 1));
            let cmd = self.build_command(case, step, &log_path)?;
            let started_at = Utc::now().to_rfc3339();
            let started = Instant::now();
            let waited = wait_polling(cmd, poll, self.step_timeout)
                .with_context(|| format!("step '{}' of case '{}'", step.name, case.name))?;
            let (exit_code, ok) = match waited {
                StepExit::Exited(status) => (status.code().unwrap_or(-1), status.success()),
                StepExit::TimedOut => {
                    warn!(
                        case = %case.name,
                        run,
                        step = %step.name,
                        timeout_s = self.step_timeout.as_secs(),
                        "step timed out, killed"
                    );
                    (TIMED_OUT_EXIT, false)
                }
            };
            rows.push(MetricRow {
                run,
                step: idx + 1,
                name: step.name.clone(),
                started_at,
                duration_s: started.elapsed().as_secs_f64(),
                exit_code,
            });
            if !ok {
                warn!(case = %case.name, run, step = %step.name, exit_code, "step failed");
                success = false;
                break;
            }
            debug!(case = %case.name, run, step = %step.name, "step finished");
            if let Some(hook) = self.on_step.as_mut() {
                hook(case, step);
            }
        }

        atomic_write_bytes(&run_dir.join(METRICS_FILE), &to_csv(&rows)?)?;
        if success && last_run {
            let executed = json!({
                "case": case.name,
                "runs": run,
                "finished_at": Utc::now().to_rfc3339(),
            });
            atomic_write_bytes(
                &case.results_dir().join(EXECUTED_FILE),
                &serde_json::to_vec_pretty(&executed)?,
            )?;
        }
        Ok(success)
    }

    fn build_command(&self, case: &Case, step: &Step, log_path: &Path) -> Result<Command> {
        let (program, args) = step
            .command
            .split_first()
            .ok_or_else(|| anyhow!("step '{}' of case '{}' has no command", step.name, case.name))?;
        let mut cmd = if step.resource == "local" {
            let mut cmd = Command::new(program);
            cmd.args(args).current_dir(&case.directory);
            cmd
        } else {
            let data = fs::canonicalize(&case.directory)?.join("data");
            ensure_dir(&data)?;
            let mut cmd = Command::new(&self.docker_bin);
            cmd.arg("run").arg("--rm");
            cmd.args(["-v", &format!("{}:/data", data.display())]);
            cmd.args(["-w", "/data"]);
            cmd.arg(&step.resource);
            cmd.args(&step.command);
            cmd
        };
        // Own process group: a terminal Ctrl+C must reach only the runner,
        // which lets the step finish before stopping.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }
        let log = fs::File::create(log_path)
            .with_context(|| format!("creating {}", log_path.display()))?;
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::from(log.try_clone()?));
        cmd.stderr(Stdio::from(log));
        Ok(cmd)
    }
}

/// Exit code recorded for a step killed on timeout.
const TIMED_OUT_EXIT: i32 = -2;

enum StepExit {
    Exited(ExitStatus),
    TimedOut,
}

fn wait_polling(mut cmd: Command, poll: Duration, timeout: Duration) -> Result<StepExit> {
    let mut child = cmd.spawn()?;
    let started = Instant::now();
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(StepExit::Exited(status));
        }
        if started.elapsed() >= timeout {
            child.kill()?;
            child.wait()?;
            return Ok(StepExit::TimedOut);
        }
        let left = timeout.saturating_sub(started.elapsed());
        thread::sleep(poll.min(left).max(Duration::from_millis(1)));
    }
}

fn to_csv<T: Serialize>(rows: &[T]) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::<u8>::new());
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    writer.into_inner().map_err(|e| anyhow!(e.to_string()))
}

fn run_number(dir: &Path) -> Option<u32> {
    dir.file_name()?.to_str()?.strip_prefix("run_")?.parse().ok()
}

/// Metric rows of every run whose steps all exited cleanly, ordered by run.
fn completed_run_rows(results_dir: &Path) -> Result<Vec<Vec<MetricRow>>> {
    if !results_dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut run_dirs: Vec<(u32, PathBuf)> = fs::read_dir(results_dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .filter_map(|p| run_number(&p).map(|n| (n, p)))
        .collect();
    run_dirs.sort();

    let mut runs = Vec::new();
    for (_, dir) in run_dirs {
        let path = dir.join(METRICS_FILE);
        if !path.is_file() {
            continue;
        }
        let mut reader = csv::Reader::from_path(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        let rows = reader
            .deserialize::<MetricRow>()
            .collect::<std::result::Result<Vec<_>, _>>()
            .with_context(|| format!("parsing {}", path.display()))?;
        if !rows.is_empty() && rows.iter().all(|r| r.exit_code == 0) {
            runs.push(rows);
        }
    }
    Ok(runs)
}

fn median(values: &mut [f64]) -> f64 {
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        values[mid]
    } else {
        (values[mid - 1] + values[mid]) / 2.0
    }
}

impl Executor for ProcessExecutor {
    fn run(&mut self, case: &Case, interval: f64, run: u32, last_run: bool) -> RunOutcome {
        info!(case = %case.name, run, last_run, "starting run");
        match self.run_steps(case, interval, run, last_run) {
            Ok(true) => RunOutcome::Success,
            Ok(false) => RunOutcome::Failed,
            Err(err) => RunOutcome::Fatal(err),
        }
    }

    fn stats(&mut self, case: &Case) -> Result<bool> {
        let results_dir = case.results_dir();
        let runs = completed_run_rows(&results_dir)?;
        if runs.is_empty() {
            warn!(case = %case.name, "no completed runs to aggregate");
            return Ok(false);
        }

        let mut durations: BTreeMap<(usize, String), Vec<f64>> = BTreeMap::new();
        for row in runs.iter().flatten() {
            durations
                .entry((row.step, row.name.clone()))
                .or_default()
                .push(row.duration_s);
        }

        let mut summary = Vec::new();
        let mut spread = Vec::new();
        for ((step, name), values) in durations.iter_mut() {
            let count = values.len();
            let min = values.iter().copied().fold(f64::INFINITY, f64::min);
            let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let mean = values.iter().sum::<f64>() / count as f64;
            summary.push(SummaryRow {
                step: *step,
                name: name.as_str(),
                runs: count,
                median_duration_s: median(values),
            });
            spread.push(StatsRow {
                step: *step,
                name: name.as_str(),
                min_s: min,
                max_s: max,
                mean_s: mean,
            });
        }

        atomic_write_bytes(&results_dir.join("summary.csv"), &to_csv(&summary)?)?;
        if runs.len() >= 2 {
            atomic_write_bytes(&results_dir.join("stats.csv"), &to_csv(&spread)?)?;
        }
        // aggregated.csv marks the case as done for later passes, so it goes last.
        let all_rows: Vec<&MetricRow> = runs.iter().flatten().collect();
        atomic_write_bytes(&results_dir.join("aggregated.csv"), &to_csv(&all_rows)?)?;
        info!(case = %case.name, runs = runs.len(), "aggregated results");
        Ok(true)
    }
}

/// Fails fast on obviously unusable steps before any run starts. A case
/// without steps would be checkpointed as done yet have nothing to aggregate.
pub fn check_steps(case: &Case) -> Result<()> {
    if case.steps.is_empty() {
        bail!("case '{}' has no steps", case.name);
    }
    for step in &case.steps {
        if step.command.is_empty() {
            bail!("step '{}' of case '{}' has no command", step.name, case.name);
        }
    }
    Ok(())
}
