//! Epoch-tagged adapter between transport callbacks and the session core
//!
//! One adapter is created per open attempt. It projects status directly
//! (gated by its epoch) and posts a connection event to the serializer so the
//! controller can re-reconcile.

use super::serializer::EventSerializer;
use super::status::StatusProjection;
use super::worker::Command;
use crate::error::TransportError;
use crate::protocol::ConnectionStatus;
use crate::transport::ConnectionListener;
use std::sync::{Arc, Mutex};
use tracing::{debug, trace};

pub struct EpochListener {
    epoch: u64,
    projection: Arc<StatusProjection>,
    serializer: EventSerializer<Command>,
    /// Streaming or polling, restored when an activity warning clears
    baseline: Mutex<Option<ConnectionStatus>>,
}

impl EpochListener {
    pub fn new(
        epoch: u64,
        projection: Arc<StatusProjection>,
        serializer: EventSerializer<Command>,
    ) -> Self {
        Self {
            epoch,
            projection,
            serializer,
            baseline: Mutex::new(None),
        }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    fn baseline(&self) -> Option<ConnectionStatus> {
        *self.baseline.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn project(&self, status: ConnectionStatus, connected: bool) {
        self.projection.emit(status, self.epoch);
        self.serializer.post(Command::ConnectionChanged {
            epoch: self.epoch,
            connected,
        });
    }
}

impl ConnectionListener for EpochListener {
    fn on_session_started(&self, is_polling: bool) {
        debug!(epoch = self.epoch, is_polling, "Session started");
        let status = ConnectionStatus::for_session(is_polling);
        *self.baseline.lock().unwrap_or_else(|e| e.into_inner()) = Some(status);
        self.project(status, true);
    }

    fn on_activity_warning(&self, warning: bool) {
        debug!(epoch = self.epoch, warning, "Activity warning");
        if warning {
            self.project(ConnectionStatus::Stalled, true);
        } else if let Some(baseline) = self.baseline() {
            self.project(baseline, true);
        } else {
            debug!(epoch = self.epoch, "Activity restored before session start, ignoring");
        }
    }

    fn on_close(&self) {
        debug!(epoch = self.epoch, "Session closed by transport");
        self.project(ConnectionStatus::Disconnected, false);
    }

    fn on_connection_established(&self) {
        debug!(epoch = self.epoch, "Connection established");
    }

    fn on_new_bytes(&self, bytes: u64) {
        trace!(epoch = self.epoch, bytes, "Bytes received");
    }

    fn on_data_error(&self, error: &TransportError) {
        debug!(epoch = self.epoch, error = %error, "Data error");
    }

    fn on_end(&self, cause: i32) {
        debug!(epoch = self.epoch, cause, "Session ended by server");
    }

    fn on_failure(&self, error: &TransportError) {
        debug!(epoch = self.epoch, error = %error, "Session failure");
    }
}
