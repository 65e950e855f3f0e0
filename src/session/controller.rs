//! Desired-vs-actual connection state
//!
//! [`ConnectionIntent`] holds what the facade writes from any thread: the
//! desired connection state, MPN participation and the server endpoint.
//! [`ConnectionController`] adds the actual connection state, which only the
//! serializer touches, and decides the next step of the reconciliation loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use url::Url;

/// Written by the facade, read by the serializer
#[derive(Debug, Default)]
pub struct ConnectionIntent {
    desired_connected: AtomicBool,
    pm_enabled: AtomicBool,
    server_url: Mutex<Option<Url>>,
}

impl ConnectionIntent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flip desired to connected; true if it was disconnected before
    pub fn request_start(&self) -> bool {
        self.desired_connected
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Flip desired to disconnected; true if it was connected before
    pub fn request_stop(&self) -> bool {
        self.desired_connected
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn desired_connected(&self) -> bool {
        self.desired_connected.load(Ordering::SeqCst)
    }

    /// Set MPN participation, returning the previous value
    pub fn set_pm_enabled(&self, enabled: bool) -> bool {
        self.pm_enabled.swap(enabled, Ordering::SeqCst)
    }

    pub fn pm_enabled(&self) -> bool {
        self.pm_enabled.load(Ordering::SeqCst)
    }

    /// Endpoint used from the next open attempt on
    pub fn set_server_url(&self, url: Url) {
        *self.server_url.lock().unwrap_or_else(|e| e.into_inner()) = Some(url);
    }

    pub fn server_url(&self) -> Option<Url> {
        self.server_url
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

/// Next action of the reconciliation loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileStep {
    Open,
    Close,
    Idle,
}

impl ReconcileStep {
    pub fn decide(desired_connected: bool, actual_connected: bool) -> Self {
        match (desired_connected, actual_connected) {
            (true, false) => ReconcileStep::Open,
            (false, true) => ReconcileStep::Close,
            _ => ReconcileStep::Idle,
        }
    }
}

/// Serializer-side view of the connection
#[derive(Debug)]
pub struct ConnectionController {
    intent: Arc<ConnectionIntent>,
    actual_connected: bool,
}

impl ConnectionController {
    pub fn new(intent: Arc<ConnectionIntent>) -> Self {
        Self {
            intent,
            actual_connected: false,
        }
    }

    pub fn intent(&self) -> &ConnectionIntent {
        &self.intent
    }

    pub fn is_connected(&self) -> bool {
        self.actual_connected
    }

    pub fn set_connected(&mut self, connected: bool) {
        self.actual_connected = connected;
    }

    /// Desired and actual disagree; a reconciliation must be scheduled
    pub fn diverged(&self) -> bool {
        self.next_step() != ReconcileStep::Idle
    }

    pub fn next_step(&self) -> ReconcileStep {
        ReconcileStep::decide(self.intent.desired_connected(), self.actual_connected)
    }

    /// MPN requests may hit the server right now
    pub fn can_reach_mpn(&self, status_retrieved: bool) -> bool {
        self.actual_connected && self.intent.pm_enabled() && status_retrieved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_start_stop_transitions() {
        let intent = ConnectionIntent::new();
        assert!(!intent.desired_connected());

        assert!(intent.request_start());
        assert!(!intent.request_start(), "second start is not a transition");
        assert!(intent.desired_connected());

        assert!(intent.request_stop());
        assert!(!intent.request_stop(), "second stop is not a transition");
        assert!(!intent.desired_connected());
    }

    #[test]
    fn test_server_url_replaced() {
        let intent = ConnectionIntent::new();
        assert!(intent.server_url().is_none());

        intent.set_server_url(Url::parse("http://a.example.com").unwrap());
        intent.set_server_url(Url::parse("https://b.example.com").unwrap());

        assert_eq!(
            intent.server_url().map(|u| u.host_str().map(str::to_string)),
            Some(Some("b.example.com".to_string()))
        );
    }

    #[test]
    fn test_decide() {
        assert_eq!(ReconcileStep::decide(true, false), ReconcileStep::Open);
        assert_eq!(ReconcileStep::decide(false, true), ReconcileStep::Close);
        assert_eq!(ReconcileStep::decide(true, true), ReconcileStep::Idle);
        assert_eq!(ReconcileStep::decide(false, false), ReconcileStep::Idle);
    }

    #[test]
    fn test_controller_divergence() {
        let intent = Arc::new(ConnectionIntent::new());
        let mut controller = ConnectionController::new(Arc::clone(&intent));
        assert!(!controller.diverged());

        intent.request_start();
        assert!(controller.diverged());
        assert_eq!(controller.next_step(), ReconcileStep::Open);

        controller.set_connected(true);
        assert!(!controller.diverged());

        intent.request_stop();
        assert_eq!(controller.next_step(), ReconcileStep::Close);
    }

    #[test]
    fn test_mpn_reachability_needs_all_three() {
        let intent = Arc::new(ConnectionIntent::new());
        let mut controller = ConnectionController::new(Arc::clone(&intent));

        controller.set_connected(true);
        assert!(!controller.can_reach_mpn(true));

        intent.set_pm_enabled(true);
        assert!(!controller.can_reach_mpn(false));
        assert!(controller.can_reach_mpn(true));

        controller.set_connected(false);
        assert!(!controller.can_reach_mpn(true));
    }

    proptest! {
        #[test]
        fn prop_desired_tracks_last_call(calls in proptest::collection::vec(any::<bool>(), 0..64)) {
            let intent = ConnectionIntent::new();
            for &start in &calls {
                if start {
                    intent.request_start();
                } else {
                    intent.request_stop();
                }
            }
            let expected = calls.last().copied().unwrap_or(false);
            prop_assert_eq!(intent.desired_connected(), expected);
        }
    }
}
