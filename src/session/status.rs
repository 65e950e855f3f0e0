//! Status projection
//!
//! Turns controller decisions and transport callbacks into the public
//! [`ConnectionStatus`] stream. Each emission carries the epoch it originated
//! in and is delivered only if that epoch is still current. The epoch check,
//! the stored status and the listener call happen under one ordering lock,
//! and the epoch only advances under that same lock, so a stale emission can
//! never overtake the start of a newer attempt.
//!
//! The listener slot has its own lock, released before the listener runs.
//! A listener may therefore replace or clear itself, or call any facade
//! method, from inside its callback. It must not block.

use super::epoch::SessionEpoch;
use crate::protocol::{ConnectionStatus, StatusListener};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

pub struct StatusProjection {
    epoch: SessionEpoch,
    current: AtomicU8,
    order: Mutex<()>,
    listener: Mutex<Option<Arc<dyn StatusListener>>>,
}

impl StatusProjection {
    pub fn new() -> Self {
        Self {
            epoch: SessionEpoch::new(),
            current: AtomicU8::new(ConnectionStatus::Disconnected.code()),
            order: Mutex::new(()),
            listener: Mutex::new(None),
        }
    }

    fn ordered(&self) -> MutexGuard<'_, ()> {
        self.order.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn listener(&self) -> Option<Arc<dyn StatusListener>> {
        self.listener
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Replace the listener; it will not be replayed the current status
    pub fn set_listener(&self, listener: Option<Arc<dyn StatusListener>>) {
        *self.listener.lock().unwrap_or_else(|e| e.into_inner()) = listener;
    }

    /// Last delivered status
    pub fn status(&self) -> ConnectionStatus {
        ConnectionStatus::from_code(self.current.load(Ordering::SeqCst)).unwrap_or_default()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch.current()
    }

    pub fn is_current(&self, epoch: u64) -> bool {
        self.epoch.is_current(epoch)
    }

    /// Start a new open attempt: advance the epoch and emit `Connecting` for it
    pub fn begin_attempt(&self) -> u64 {
        let _order = self.ordered();
        let epoch = self.epoch.advance();
        self.deliver(ConnectionStatus::Connecting, epoch);
        epoch
    }

    /// Emit `status` on behalf of `epoch`; returns false if the epoch is stale
    pub fn emit(&self, status: ConnectionStatus, epoch: u64) -> bool {
        let _order = self.ordered();
        if !self.epoch.is_current(epoch) {
            debug!(
                epoch,
                current_epoch = self.epoch.current(),
                status = %status,
                "Dropping status from superseded session"
            );
            return false;
        }
        self.deliver(status, epoch);
        true
    }

    // Caller holds the ordering lock
    fn deliver(&self, status: ConnectionStatus, epoch: u64) {
        self.current.store(status.code(), Ordering::SeqCst);
        info!(epoch, status = %status, "Connection status changed");
        if let Some(listener) = self.listener() {
            listener.on_status_change(status);
        }
    }
}

impl Default for StatusProjection {
    fn default() -> Self {
        Self::new()
    }
}
