//! Serializer-owned session state
//!
//! [`SessionCore`] is the only writer of the connection controller, the
//! subscription registry and the MPN reconciler. The facade and the transport
//! listeners talk to it exclusively through [`Command`]s.

use super::controller::{ConnectionController, ConnectionIntent, ReconcileStep};
use super::listener::EpochListener;
use super::mpn::MpnReconciler;
use super::registry::{log_request_failure, subscribe_one, unsubscribe_one, SubscriptionRegistry};
use super::serializer::{EventHandler, EventSerializer, Flow};
use super::status::StatusProjection;
use crate::config::SessionSettings;
use crate::protocol::{ConnectionStatus, Subscription};
use crate::transport::{ConnectionInfo, ConnectionListener, Transport};
use crate::{mpn_span, session_span};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn, Instrument};

/// Work items processed by the session worker
#[derive(Debug)]
pub enum Command {
    /// Drive actual connection state towards the desired one
    Reconcile { wait: bool },
    /// Posted by the listener of session `epoch`
    ConnectionChanged { epoch: u64, connected: bool },
    AddSubscription(Arc<Subscription>),
    RemoveSubscription(Arc<Subscription>),
    MpnIntent {
        subscription: Arc<Subscription>,
        add: bool,
    },
    RetrieveMpnStatus(Arc<Subscription>),
    /// MPN participation was switched on
    MpnEnabled,
    Shutdown,
}

pub struct SessionCore {
    transport: Arc<dyn Transport>,
    settings: SessionSettings,
    controller: ConnectionController,
    projection: Arc<StatusProjection>,
    serializer: EventSerializer<Command>,
    registry: SubscriptionRegistry,
    mpn: MpnReconciler,
    shutdown: watch::Receiver<bool>,
}

impl SessionCore {
    pub fn new(
        transport: Arc<dyn Transport>,
        settings: SessionSettings,
        intent: Arc<ConnectionIntent>,
        projection: Arc<StatusProjection>,
        serializer: EventSerializer<Command>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let mpn = MpnReconciler::new(settings.trigger_format.clone());
        Self {
            transport,
            settings,
            controller: ConnectionController::new(intent),
            projection,
            serializer,
            registry: SubscriptionRegistry::new(),
            mpn,
            shutdown,
        }
    }

    fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow() || self.shutdown.has_changed().is_err()
    }

    /// Sleep unless shutdown is requested first; false if interrupted
    async fn pause(&self, delay: Duration) -> bool {
        let mut shutdown = self.shutdown.clone();
        if self.is_shutting_down() {
            return false;
        }
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!("Shutdown requested during wait, stopping reconciliation");
                    return false;
                }
                true
            }
            _ = tokio::time::sleep(delay) => true,
        }
    }

    async fn reconcile(&mut self, wait: bool) {
        if wait && !self.pause(self.settings.stop_pause).await {
            return;
        }

        while !self.is_shutting_down() {
            match self.controller.next_step() {
                ReconcileStep::Idle => {
                    self.settle_disconnected();
                    return;
                }
                ReconcileStep::Open => {
                    if !self.open_session().await
                        && !self.pause(self.settings.reconnect_wait).await
                    {
                        return;
                    }
                }
                ReconcileStep::Close => self.close_session().await,
            }
        }
    }

    /// A stop that landed while waiting to retry leaves nothing to close
    fn settle_disconnected(&self) {
        let intent = self.controller.intent();
        if !intent.desired_connected()
            && !self.controller.is_connected()
            && self.projection.status() == ConnectionStatus::Waiting
        {
            self.projection
                .emit(ConnectionStatus::Disconnected, self.projection.epoch());
        }
    }

    /// One open attempt; false if it failed and a retry wait is due
    async fn open_session(&mut self) -> bool {
        let epoch = self.projection.begin_attempt();
        self.mpn.reset_retrieval();
        let span = session_span!(epoch);
        self.try_open(epoch).instrument(span).await
    }

    async fn try_open(&mut self, epoch: u64) -> bool {
        let Some(server_url) = self.controller.intent().server_url() else {
            error!("No server URL configured, set_server must be called before start");
            self.projection.emit(ConnectionStatus::Waiting, epoch);
            return false;
        };
        info!(server_url = %server_url, adapter = %self.settings.adapter, "Opening session");
        let mut connection = ConnectionInfo::new(self.settings.adapter.clone());
        connection.server_url = Some(server_url);

        let listener: Arc<dyn ConnectionListener> = Arc::new(EpochListener::new(
            epoch,
            Arc::clone(&self.projection),
            self.serializer.clone(),
        ));

        match self.transport.open(&connection, listener).await {
            Ok(()) => {
                info!("Session opened");
                self.controller.set_connected(true);
                self.registry
                    .resubscribe_all(&self.transport, self.settings.batch_timeout)
                    .await;
                self.retrieve_mpns().await;
                self.drain_pending().await;
                true
            }
            Err(e) => {
                warn!(
                    error = %e,
                    retry_in_ms = self.settings.reconnect_wait.as_millis() as u64,
                    "Failed to open session"
                );
                self.projection.emit(ConnectionStatus::Waiting, epoch);
                false
            }
        }
    }

    async fn close_session(&mut self) {
        let epoch = self.projection.epoch();
        info!(epoch, "Closing session");
        self.transport.close().await;
        self.projection.emit(ConnectionStatus::Disconnected, epoch);
        self.controller.set_connected(false);
        self.registry.clear_table_keys();
    }

    fn on_connection_changed(&mut self, epoch: u64, connected: bool) {
        if !self.projection.is_current(epoch) {
            debug!(
                epoch,
                current_epoch = self.projection.epoch(),
                connected,
                "Ignoring event from superseded session"
            );
            return;
        }

        if self.controller.is_connected() && !connected {
            info!(epoch, "Session lost");
            self.registry.clear_table_keys();
        }
        self.controller.set_connected(connected);

        if self.controller.diverged() {
            self.serializer.post(Command::Reconcile { wait: false });
        }
    }

    async fn add_subscription(&mut self, subscription: Arc<Subscription>) {
        if !self.registry.add(Arc::clone(&subscription)) {
            debug!(group = %subscription.group(), "Subscription already registered");
            return;
        }
        debug!(group = %subscription.group(), "Subscription added");
        if self.controller.is_connected() {
            // Failures are logged and retried on the next reconnect
            let _ = subscribe_one(self.transport.as_ref(), &subscription).await;
        }
    }

    async fn remove_subscription(&mut self, subscription: Arc<Subscription>) {
        if !self.registry.remove(&subscription) {
            debug!(group = %subscription.group(), "Subscription not registered");
            return;
        }
        debug!(group = %subscription.group(), "Subscription removed");
        if self.controller.is_connected() {
            let _ = unsubscribe_one(self.transport.as_ref(), &subscription).await;
        } else {
            subscription.set_table_key(None);
        }
    }

    fn can_reach_mpn(&self) -> bool {
        self.controller.can_reach_mpn(self.mpn.status_retrieved())
    }

    async fn mpn_intent(&mut self, subscription: Arc<Subscription>, add: bool) {
        let Some(group) = self.mpn.record_intent(&subscription, add) else {
            return;
        };
        if !self.can_reach_mpn() {
            debug!(group = %group, add, "MPN intent kept pending until the server is reachable");
            return;
        }

        let span = mpn_span!(group = %group, add);
        let outcome = self
            .mpn
            .handle_pending(self.transport.as_ref(), &group)
            .instrument(span)
            .await;
        match outcome {
            Ok(true) => self.mpn.notify(&group, &self.registry),
            Ok(false) => {}
            Err(e) => log_request_failure("mpn", &group, &e),
        }
    }

    /// Report the group's MPN state, refreshing it from the server when reachable.
    /// Otherwise the listener gets the cached local state.
    async fn retrieve_mpn_status(&mut self, subscription: Arc<Subscription>) {
        let group = subscription.group().to_string();
        if self.can_reach_mpn() {
            let span = mpn_span!(group = %group, op = "refresh");
            let refreshed = self
                .mpn
                .refresh_group(self.transport.as_ref(), &group)
                .instrument(span)
                .await;
            if let Err(e) = refreshed {
                log_request_failure("mpn refresh", &group, &e);
                return;
            }
        }
        self.mpn.notify(&group, &self.registry);
    }

    /// Inquire all server MPNs once per session, then tell every listener
    async fn retrieve_mpns(&mut self) {
        if !self.controller.is_connected()
            || !self.controller.intent().pm_enabled()
            || self.mpn.status_retrieved()
        {
            return;
        }

        let span = mpn_span!(op = "inquire_all");
        let retrieved = self
            .mpn
            .retrieve_all(self.transport.as_ref())
            .instrument(span)
            .await;
        match retrieved {
            Ok(()) => {
                for group in self.registry.mpn_groups() {
                    self.mpn.notify(&group, &self.registry);
                }
            }
            Err(e) => log_request_failure("mpn inquire all", "*", &e),
        }
    }

    async fn drain_pending(&mut self) {
        if self.mpn.pending_len() == 0 {
            return;
        }
        if !self.can_reach_mpn() {
            debug!(
                pending = self.mpn.pending_len(),
                "MPN server state unknown, keeping ops pending"
            );
            return;
        }
        let span = mpn_span!(op = "drain", pending = self.mpn.pending_len());
        self.mpn
            .drain(self.transport.as_ref(), &self.registry)
            .instrument(span)
            .await;
    }

    async fn on_mpn_enabled(&mut self) {
        self.retrieve_mpns().await;
        self.drain_pending().await;
    }

    async fn shutdown(&mut self) {
        if self.controller.is_connected() {
            self.close_session().await;
        }
        info!("Session worker shutting down");
    }
}

#[async_trait::async_trait]
impl EventHandler for SessionCore {
    type Event = Command;

    async fn handle(&mut self, command: Command) -> Flow {
        match command {
            Command::Reconcile { wait } => self.reconcile(wait).await,
            Command::ConnectionChanged { epoch, connected } => {
                self.on_connection_changed(epoch, connected)
            }
            Command::AddSubscription(subscription) => self.add_subscription(subscription).await,
            Command::RemoveSubscription(subscription) => {
                self.remove_subscription(subscription).await
            }
            Command::MpnIntent { subscription, add } => self.mpn_intent(subscription, add).await,
            Command::RetrieveMpnStatus(subscription) => {
                self.retrieve_mpn_status(subscription).await
            }
            Command::MpnEnabled => self.on_mpn_enabled().await,
            Command::Shutdown => {
                self.shutdown().await;
                return Flow::Stop;
            }
        }
        Flow::Continue
    }
}
