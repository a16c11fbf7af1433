mod signals;

use anyhow::Result;
use bench_runner::{
    check_security_mode, check_steps, clean, discover, Case, ExitCode, InterruptController,
    ProcessExecutor, RunScheduler, Settings, StatsAggregator, Step, StepHook,
};
use clap::error::{ContextKind, ContextValue, ErrorKind};
use clap::{Parser, Subcommand};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "bench", version = "0.3.0", about = "Checkpointed benchmark case runner")]
struct Cli {
    /// Directory containing the cases.
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,
    #[arg(long, global = true)]
    verbose: bool,
    /// Pause after every executed step until Enter is pressed.
    #[arg(long, global = true)]
    wait_for_user: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List discovered cases.
    List,
    /// Execute every case, resuming from existing checkpoints.
    Run {
        /// Runs per case [default: 3].
        #[arg(long)]
        runs: Option<u32>,
        /// Sampling interval in seconds [default: 0.1].
        #[arg(long)]
        interval: Option<f64>,
    },
    /// Remove checkpoints, results and the archive.
    Clean,
    /// Aggregate results per case and bundle them into results.zip.
    Stats,
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            if is_unknown_command(&err) {
                std::process::exit(ExitCode::UnknownCommand.code());
            }
            std::process::exit(err.exit_code());
        }
    };
    init_tracing(cli.verbose);
    let code = match run_command(cli) {
        Ok(code) => code,
        Err(err) => {
            let reason = format!("{:#}", err);
            error!(error = %reason, "command failed");
            eprintln!("error: {}", reason);
            ExitCode::Failed
        }
    };
    std::process::exit(code.code());
}

/// Unrecognised subcommands (not unknown flags) get their own exit code.
fn is_unknown_command(err: &clap::Error) -> bool {
    let offending = err
        .get(ContextKind::InvalidSubcommand)
        .or_else(|| err.get(ContextKind::InvalidArg));
    matches!(
        err.kind(),
        ErrorKind::InvalidSubcommand | ErrorKind::UnknownArgument
    ) && matches!(offending, Some(ContextValue::String(arg)) if !arg.starts_with('-'))
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

/// Discovered cases, or the exit code to stop with after a diagnostic.
fn load_cases(root: &Path) -> std::result::Result<Vec<Case>, ExitCode> {
    match discover(root) {
        Ok(cases) if cases.is_empty() => {
            error!(root = %root.display(), "no cases discovered");
            eprintln!("no cases discovered in {}", root.display());
            Err(ExitCode::NoCases)
        }
        Ok(cases) => Ok(cases),
        Err(err) => {
            eprintln!("error: {}", err);
            Err(ExitCode::Failed)
        }
    }
}

fn run_command(cli: Cli) -> Result<ExitCode> {
    let cases = match load_cases(&cli.root) {
        Ok(cases) => cases,
        Err(code) => return Ok(code),
    };

    match cli.command {
        Commands::List => {
            for (i, case) in cases.iter().enumerate() {
                println!("{}. {}", i + 1, case.name);
                if cli.verbose && !case.description.is_empty() {
                    println!("   {}", case.description);
                }
            }
            Ok(ExitCode::Success)
        }
        Commands::Run { runs, interval } => {
            let mut settings = Settings::load(&cli.root)?;
            if let Some(runs) = runs {
                settings.runs = runs;
            }
            if let Some(interval) = interval {
                settings.interval = interval;
            }
            if !settings.skip_security_check {
                if let Err(err) = check_security_mode() {
                    eprintln!("error: {:#}", err);
                    return Ok(ExitCode::SecurityMode);
                }
            }
            if let Err(err) = settings.validate() {
                eprintln!("error: {}", err);
                return Ok(ExitCode::InvalidRuns);
            }
            for case in &cases {
                check_steps(case)?;
            }

            let interrupt = InterruptController::new();
            signals::install_interrupt_handler(interrupt.clone())?;
            let mut executor = ProcessExecutor::new(&settings);
            if cli.wait_for_user {
                executor = executor.with_step_hook(pause_after_step());
            }
            let mut scheduler = RunScheduler::new(
                executor,
                io::stdout(),
                interrupt,
                settings.runs,
                settings.interval,
                settings.scratch_dir.clone(),
            );
            Ok(scheduler.execute(&cases)?.into())
        }
        Commands::Clean => {
            for path in clean(&cases, &cli.root)? {
                println!("removed: {}", path.display());
            }
            Ok(ExitCode::Success)
        }
        Commands::Stats => {
            let settings = Settings::load(&cli.root)?;
            let executor = ProcessExecutor::new(&settings);
            let mut stats = StatsAggregator::new(executor, io::stdout(), cli.root.clone());
            Ok(stats.generate(&cases)?.into())
        }
    }
}

fn pause_after_step() -> StepHook {
    Box::new(|case: &Case, step: &Step| {
        print!("{}: '{}' done, press Enter to continue...", case.name, step.name);
        let _ = io::stdout().flush();
        let mut line = String::new();
        let _ = io::stdin().read_line(&mut line);
    })
}
