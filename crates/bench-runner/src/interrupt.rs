use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// What the signal path should do after an interruption was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalAction {
    /// First interruption: let the in-flight run finish, then stop.
    RequestStop,
    /// Interruption while a stop is already pending: terminate now.
    ForceExit,
}

/// Cooperative stop flag shared between the signal path (sole writer) and the
/// scheduler (sole reader, checked between runs only).
#[derive(Debug, Clone, Default)]
pub struct InterruptController {
    stop_requested: Arc<AtomicBool>,
}

impl InterruptController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one interruption signal.
    pub fn signal(&self) -> SignalAction {
        if self.stop_requested.swap(true, Ordering::SeqCst) {
            SignalAction::ForceExit
        } else {
            SignalAction::RequestStop
        }
    }

    pub fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_signal_requests_stop_second_forces_exit() {
        let controller = InterruptController::new();
        assert!(!controller.stop_requested());
        assert_eq!(controller.signal(), SignalAction::RequestStop);
        assert!(controller.stop_requested());
        assert_eq!(controller.signal(), SignalAction::ForceExit);
        assert_eq!(controller.signal(), SignalAction::ForceExit);
    }

    #[test]
    fn clones_share_state_across_threads() {
        let controller = InterruptController::new();
        let signal_side = controller.clone();
        std::thread::spawn(move || signal_side.signal())
            .join()
            .expect("signal thread");
        assert!(controller.stop_requested());
    }
}
