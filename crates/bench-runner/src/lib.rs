//! Checkpointed benchmark runner.
//!
//! Runs every discovered case `N` times, resuming from the on-disk markers left
//! by earlier invocations, then aggregates per-case results into a single
//! archive.
//!
//! Only one process may operate on a given case root at a time. Markers are
//! plain files without any locking, so two concurrent invocations against the
//! same root can corrupt the resume state.

pub mod catalogue;
pub mod checkpoint;
pub mod clean;
pub mod config;
pub mod executor;
pub mod exit;
pub mod failures;
mod fsutil;
pub mod interrupt;
pub mod progress;
pub mod scheduler;
pub mod security;
pub mod stats;

pub use catalogue::{discover, Case, CatalogueError, Step};
pub use checkpoint::CheckpointStore;
pub use clean::clean;
pub use config::{ConfigError, Settings};
pub use executor::{check_steps, Executor, ProcessExecutor, RunOutcome, StepHook};
pub use exit::{Disposition, ExitCode};
pub use failures::FailureAggregator;
pub use interrupt::{InterruptController, SignalAction};
pub use progress::{format_progress, render_progress};
pub use scheduler::RunScheduler;
pub use security::check_security_mode;
pub use stats::{StatsAggregator, ARCHIVE_NAME, RESULT_FILES};
