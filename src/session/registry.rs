//! Subscription registry
//!
//! Ordered set of the subscriptions the UI wants live, plus the MPN listener
//! registered for each group. Owned by the session core; every method runs on
//! the serializer.

use crate::error::{ErrorClass, TransportError};
use crate::protocol::{MpnStatusListener, Subscription};
use crate::transport::Transport;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

#[derive(Default)]
pub struct SubscriptionRegistry {
    subscriptions: Vec<Arc<Subscription>>,
    mpn_listeners: HashMap<String, Arc<dyn MpnStatusListener>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    pub fn contains(&self, subscription: &Arc<Subscription>) -> bool {
        self.position(subscription).is_some()
    }

    fn position(&self, subscription: &Arc<Subscription>) -> Option<usize> {
        self.subscriptions
            .iter()
            .position(|s| Arc::ptr_eq(s, subscription))
    }

    pub fn subscriptions(&self) -> &[Arc<Subscription>] {
        &self.subscriptions
    }

    /// Append a subscription; false if this very subscription is already present
    pub fn add(&mut self, subscription: Arc<Subscription>) -> bool {
        if self.contains(&subscription) {
            return false;
        }
        if let Some(listener) = subscription.mpn_listener() {
            self.mpn_listeners
                .insert(subscription.group().to_string(), listener);
        }
        self.subscriptions.push(subscription);
        true
    }

    /// Drop a subscription and its group's MPN listener; false if absent
    pub fn remove(&mut self, subscription: &Arc<Subscription>) -> bool {
        let Some(index) = self.position(subscription) else {
            return false;
        };
        let removed = self.subscriptions.remove(index);
        if removed.mpn_listener().is_some() {
            self.mpn_listeners.remove(removed.group());
        }
        true
    }

    pub fn mpn_listener(&self, group: &str) -> Option<Arc<dyn MpnStatusListener>> {
        self.mpn_listeners.get(group).cloned()
    }

    /// Groups with a registered MPN listener, in a stable order
    pub fn mpn_groups(&self) -> Vec<String> {
        let mut groups: Vec<String> = self.mpn_listeners.keys().cloned().collect();
        groups.sort();
        groups
    }

    /// Forget every server handle; they died with the session
    pub fn clear_table_keys(&self) {
        for subscription in &self.subscriptions {
            subscription.set_table_key(None);
        }
    }

    /// Re-apply every subscription inside one transport batch
    ///
    /// Subscribes run concurrently. The batch closes once every request has
    /// been issued to the transport. The whole wait is bounded by `timeout`;
    /// requests still in flight afterwards are detached and record their key
    /// whenever they complete.
    pub async fn resubscribe_all(&self, transport: &Arc<dyn Transport>, timeout: Duration) {
        if self.subscriptions.is_empty() {
            return;
        }

        let count = self.subscriptions.len();
        if let Err(e) = transport.batch_requests(count).await {
            log_request_failure("batch", "*", &e);
            return;
        }

        let deadline = Instant::now() + timeout;
        let dispatched = Arc::new(Semaphore::new(0));
        let mut batch = JoinSet::new();
        for subscription in &self.subscriptions {
            let transport = Arc::clone(transport);
            let subscription = Arc::clone(subscription);
            let dispatched = Arc::clone(&dispatched);
            batch.spawn(async move {
                let request = subscribe_one(transport.as_ref(), &subscription);
                tokio::pin!(request);
                // The first poll issues the request
                let finished = tokio::select! {
                    biased;
                    _ = &mut request => true,
                    _ = std::future::ready(()) => false,
                };
                dispatched.add_permits(1);
                if !finished {
                    // Failures are already logged by subscribe_one
                    let _ = request.await;
                }
            });
        }

        let permits = u32::try_from(count).unwrap_or(u32::MAX);
        if tokio::time::timeout_at(deadline, dispatched.acquire_many(permits))
            .await
            .is_err()
        {
            warn!(count, "Subscribe requests not all issued before the batch timeout");
        }
        transport.close_batch().await;

        let drained = tokio::time::timeout_at(deadline, async {
            while let Some(joined) = batch.join_next().await {
                if let Err(e) = joined {
                    error!(error = %e, "Subscribe task failed");
                }
            }
        })
        .await;

        match drained {
            Ok(()) => debug!(count, "Resubscribe batch completed"),
            Err(_) => {
                warn!(
                    count,
                    pending = batch.len(),
                    timeout_ms = timeout.as_millis() as u64,
                    "Resubscribe batch timed out, leaving remaining requests in flight"
                );
                batch.detach_all();
            }
        }
    }
}

/// Subscribe one table, recording the key the server assigns
pub async fn subscribe_one(
    transport: &dyn Transport,
    subscription: &Subscription,
) -> Result<(), TransportError> {
    let info = subscription.table_info();
    match transport
        .subscribe_table(info, subscription.table_listener(), info.snapshot)
        .await
    {
        Ok(key) => {
            debug!(group = %info.group, key = %key, "Subscribed");
            subscription.set_table_key(Some(key));
            Ok(())
        }
        Err(e) => {
            log_request_failure("subscribe", &info.group, &e);
            Err(e)
        }
    }
}

/// Unsubscribe one table; the key is cleared only once the server confirms
pub async fn unsubscribe_one(
    transport: &dyn Transport,
    subscription: &Subscription,
) -> Result<(), TransportError> {
    let Some(key) = subscription.table_key() else {
        return Ok(());
    };
    match transport.unsubscribe_table(key).await {
        Ok(()) => {
            debug!(group = %subscription.group(), key = %key, "Unsubscribed");
            subscription.set_table_key(None);
            Ok(())
        }
        Err(e) => {
            log_request_failure("unsubscribe", subscription.group(), &e);
            Err(e)
        }
    }
}

/// Log a failed request according to its class
pub fn log_request_failure(operation: &str, group: &str, error: &TransportError) {
    match error.class() {
        ErrorClass::ConnectionClosed => {
            info!(operation, group, error = %error, "Session closed during request, reconnection will recover");
        }
        ErrorClass::ServerRejected => {
            warn!(operation, group, error = %error, "Request rejected by server");
        }
        ErrorClass::UserRejected => {
            warn!(operation, group, error = %error, "Request refused");
        }
        ErrorClass::Transport => {
            error!(operation, group, error = %error, "Transport failure");
        }
    }
}
