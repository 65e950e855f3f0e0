//! Public facade of the push session
//!
//! Every method either flips an intent flag and schedules reconciliation, or
//! wraps its argument in a [`Command`] for the session worker. Nothing here
//! waits for the worker except [`PushClient::shutdown`].

use crate::config::{parse_server_url, ClientConfig, SessionSettings};
use crate::error::{ClientError, ClientResult};
use crate::protocol::{ConnectionStatus, StatusListener, Subscription};
use crate::session::{Command, ConnectionIntent, EventSerializer, SessionCore, StatusProjection};
use crate::transport::Transport;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Upper bound on waiting for the worker during shutdown
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

pub struct PushClient {
    intent: Arc<ConnectionIntent>,
    projection: Arc<StatusProjection>,
    serializer: EventSerializer<Command>,
    shutdown_tx: watch::Sender<bool>,
    worker: Option<JoinHandle<()>>,
}

impl PushClient {
    /// Create a client and spawn its session worker
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(transport: Arc<dyn Transport>, settings: SessionSettings) -> Self {
        let intent = Arc::new(ConnectionIntent::new());
        let projection = Arc::new(StatusProjection::new());
        let (serializer, queue) = EventSerializer::channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let core = SessionCore::new(
            transport,
            settings,
            Arc::clone(&intent),
            Arc::clone(&projection),
            serializer.clone(),
            shutdown_rx,
        );
        let worker = queue.spawn(core);

        Self {
            intent,
            projection,
            serializer,
            shutdown_tx,
            worker: Some(worker),
        }
    }

    /// Create a client configured from a validated [`ClientConfig`]
    ///
    /// Sets the server URL and the initial MPN participation; does not start.
    pub fn from_config(transport: Arc<dyn Transport>, config: &ClientConfig) -> ClientResult<Self> {
        let url = config.server_url()?;
        let client = Self::new(transport, config.session_settings());
        client.intent.set_server_url(url);
        client.enable_pn(config.mpn.enabled);
        Ok(client)
    }

    fn post(&self, command: Command) {
        if !self.serializer.post(command) {
            warn!("Session worker has stopped, request dropped");
        }
    }

    /// Configure the push server; takes effect on the next open attempt
    pub fn set_server(&self, url: &str) -> ClientResult<()> {
        let url = parse_server_url(url).map_err(|_| ClientError::InvalidServerUrl(url.to_string()))?;
        debug!(server_url = %url, "Server configured");
        self.intent.set_server_url(url);
        Ok(())
    }

    /// Register the single status listener, replacing any previous one
    pub fn set_status_listener<L>(&self, listener: L)
    where
        L: StatusListener + 'static,
    {
        self.projection.set_listener(Some(Arc::new(listener)));
    }

    pub fn clear_status_listener(&self) {
        self.projection.set_listener(None);
    }

    pub fn start(&self) {
        if self.intent.request_start() {
            info!("Connection requested");
            self.post(Command::Reconcile { wait: false });
        }
    }

    /// Request disconnection; with `apply_pause` the worker waits before acting
    /// so a quick `start` cancels it
    pub fn stop(&self, apply_pause: bool) {
        if self.intent.request_stop() {
            info!(apply_pause, "Disconnection requested");
            self.post(Command::Reconcile { wait: apply_pause });
        }
    }

    /// Switch MPN participation on or off
    ///
    /// Enabling again while already enabled retries a failed status inquiry
    /// and drains intents still pending.
    pub fn enable_pn(&self, enabled: bool) {
        let previous = self.intent.set_pm_enabled(enabled);
        debug!(enabled, previous, "MPN participation changed");
        if enabled {
            self.post(Command::MpnEnabled);
        }
    }

    pub fn add_subscription(&self, subscription: &Arc<Subscription>) {
        self.post(Command::AddSubscription(Arc::clone(subscription)));
    }

    pub fn remove_subscription(&self, subscription: &Arc<Subscription>) {
        self.post(Command::RemoveSubscription(Arc::clone(subscription)));
    }

    /// Ask for the subscription's MPN to be active with its trigger
    pub fn activate_mpn(&self, subscription: &Arc<Subscription>) {
        self.post(Command::MpnIntent {
            subscription: Arc::clone(subscription),
            add: true,
        });
    }

    pub fn deactivate_mpn(&self, subscription: &Arc<Subscription>) {
        self.post(Command::MpnIntent {
            subscription: Arc::clone(subscription),
            add: false,
        });
    }

    /// Refresh the group's MPN state and report it to its listener
    ///
    /// While the server is unreachable (disconnected, MPN disabled, or the
    /// status inquiry not yet answered) the listener receives the locally
    /// cached state rather than a fresh server answer.
    pub fn retrieve_mpn_status(&self, subscription: &Arc<Subscription>) {
        self.post(Command::RetrieveMpnStatus(Arc::clone(subscription)));
    }

    /// Last status delivered to the listener
    pub fn status(&self) -> ConnectionStatus {
        self.projection.status()
    }

    pub fn is_connection_desired(&self) -> bool {
        self.intent.desired_connected()
    }

    pub fn is_pn_enabled(&self) -> bool {
        self.intent.pm_enabled()
    }

    fn signal_shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        self.serializer.post(Command::Shutdown);
    }

    /// Stop the worker: interrupt waits, run queued work, close the session
    pub async fn shutdown(mut self) -> ClientResult<()> {
        info!("Shutting down push client");
        self.signal_shutdown();

        let Some(worker) = self.worker.take() else {
            return Ok(());
        };
        match tokio::time::timeout(SHUTDOWN_TIMEOUT, worker).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                warn!(error = %e, "Session worker ended abnormally");
                Ok(())
            }
            Err(_) => Err(ClientError::ShutdownTimeout {
                secs: SHUTDOWN_TIMEOUT.as_secs(),
            }),
        }
    }
}

impl Drop for PushClient {
    fn drop(&mut self) {
        if self.worker.is_some() {
            self.signal_shutdown();
        }
    }
}

impl std::fmt::Debug for PushClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushClient")
            .field("status", &self.status())
            .field("desired_connected", &self.is_connection_desired())
            .field("pn_enabled", &self.is_pn_enabled())
            .finish()
    }
}
