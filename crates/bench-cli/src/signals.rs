use anyhow::Result;
use bench_runner::{ExitCode, InterruptController, SignalAction};
use std::thread;
use tracing::warn;

/// Listens for Ctrl+C on a dedicated thread. The first press asks the
/// scheduler to stop after the current run; the second exits immediately.
pub fn install_interrupt_handler(controller: InterruptController) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    thread::Builder::new()
        .name("bench-signals".to_string())
        .spawn(move || {
            runtime.block_on(async move {
                while tokio::signal::ctrl_c().await.is_ok() {
                    match controller.signal() {
                        SignalAction::RequestStop => {
                            warn!("interrupt received, stopping after the current run");
                            eprintln!(
                                "interrupt received: finishing the current run (Ctrl+C again to abort)"
                            );
                        }
                        SignalAction::ForceExit => {
                            eprintln!("second interrupt received: aborting");
                            std::process::exit(ExitCode::Interrupted.code());
                        }
                    }
                }
            });
        })?;
    Ok(())
}
