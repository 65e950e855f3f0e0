//! MPN reconciler
//!
//! Keeps two maps keyed by subscription group: `mpns`, the belief about what
//! the server holds, and `pending`, the latest transition the UI asked for and
//! the server has not confirmed yet. Every pending op first re-reads server
//! truth for its group, so a half-applied op from an earlier failure heals on
//! the next attempt.

use super::registry::{log_request_failure, SubscriptionRegistry};
use crate::error::TransportError;
use crate::protocol::{MpnInfo, MpnKey, Subscription, TriggerFormat, NO_TRIGGER};
use crate::transport::Transport;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Desired MPN transition for one group
#[derive(Debug, Clone)]
pub struct PendingOp {
    pub subscription: Arc<Subscription>,
    pub add: bool,
}

#[derive(Debug)]
pub struct MpnReconciler {
    mpns: HashMap<String, MpnInfo>,
    pending: HashMap<String, PendingOp>,
    status_retrieved: bool,
    trigger_format: TriggerFormat,
}

impl MpnReconciler {
    pub fn new(trigger_format: TriggerFormat) -> Self {
        Self {
            mpns: HashMap::new(),
            pending: HashMap::new(),
            status_retrieved: false,
            trigger_format,
        }
    }

    pub fn status_retrieved(&self) -> bool {
        self.status_retrieved
    }

    /// Server state must be inquired again before any op runs
    pub fn reset_retrieval(&mut self) {
        self.status_retrieved = false;
    }

    pub fn active(&self, group: &str) -> Option<&MpnInfo> {
        self.mpns.get(group)
    }

    pub fn active_len(&self) -> usize {
        self.mpns.len()
    }

    /// Desired direction of the pending op for `group`, if any
    pub fn pending(&self, group: &str) -> Option<bool> {
        self.pending.get(group).map(|op| op.add)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Record the latest desired transition for the subscription's group
    ///
    /// Returns the group, or `None` when the subscription carries no MPN
    /// descriptor and nothing was recorded.
    pub fn record_intent(&mut self, subscription: &Arc<Subscription>, add: bool) -> Option<String> {
        if subscription.mpn_info().is_none() {
            debug!(group = %subscription.group(), "Subscription has no MPN descriptor, ignoring");
            return None;
        }
        let group = subscription.group().to_string();
        let previous = self.pending.insert(
            group.clone(),
            PendingOp {
                subscription: Arc::clone(subscription),
                add,
            },
        );
        debug!(
            group = %group,
            add,
            replaced = previous.is_some(),
            "MPN intent recorded"
        );
        Some(group)
    }

    /// Re-read the server state of `group`, if the group is believed active
    pub async fn refresh_group(
        &mut self,
        transport: &dyn Transport,
        group: &str,
    ) -> Result<(), TransportError> {
        let Some(key) = self.mpns.get(group).and_then(|info| info.key.clone()) else {
            return Ok(());
        };

        let status = match transport.inquire_mpn_status(&key).await {
            Ok(status) => status,
            Err(e) if e.is_mpn_gone() => {
                info!(group, key = %key, error = %e, "MPN no longer active on server");
                self.mpns.remove(group);
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        if status.is_spent() {
            debug!(group, key = %key, ?status, "Tearing down spent MPN");
            deactivate(transport, &key).await?;
            self.mpns.remove(group);
            return Ok(());
        }

        match transport.inquire_mpn(&key).await {
            Ok(info) => {
                let info = match info.key {
                    Some(_) => info,
                    None => info.with_key(key),
                };
                self.mpns.insert(group.to_string(), info);
                Ok(())
            }
            Err(e) if e.is_mpn_gone() => {
                info!(group, key = %key, error = %e, "MPN disappeared while refreshing");
                self.mpns.remove(group);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Bring the server in line with the pending op for `group`
    ///
    /// Returns true when the server state changed and the group's listener
    /// should hear about it. On error the op stays pending.
    pub async fn handle_pending(
        &mut self,
        transport: &dyn Transport,
        group: &str,
    ) -> Result<bool, TransportError> {
        let Some(op) = self.pending.get(group).cloned() else {
            return Ok(false);
        };

        self.refresh_group(transport, group).await?;

        let current = self.mpns.get(group).cloned();
        let changed = match (op.add, current) {
            (true, Some(current)) => {
                let desired = op.subscription.mpn_info();
                let desired_trigger = desired.and_then(|d| d.trigger_expression.as_deref());
                if current.trigger_expression.as_deref() == desired_trigger {
                    debug!(group, "MPN already active with the requested trigger");
                    false
                } else {
                    info!(
                        group,
                        from = current.trigger_expression.as_deref().unwrap_or(""),
                        to = desired_trigger.unwrap_or(""),
                        "Changing MPN trigger"
                    );
                    if let Some(key) = &current.key {
                        deactivate(transport, key).await?;
                    }
                    self.mpns.remove(group);
                    self.activate(transport, &op.subscription).await?;
                    true
                }
            }
            (true, None) => {
                self.activate(transport, &op.subscription).await?;
                true
            }
            (false, Some(current)) => {
                if let Some(key) = &current.key {
                    deactivate(transport, key).await?;
                }
                self.mpns.remove(group);
                info!(group, "MPN deactivated");
                true
            }
            (false, None) => {
                debug!(group, "MPN already inactive");
                false
            }
        };

        self.pending.remove(group);
        Ok(changed)
    }

    async fn activate(
        &mut self,
        transport: &dyn Transport,
        subscription: &Subscription,
    ) -> Result<(), TransportError> {
        let Some(desired) = subscription.mpn_info() else {
            return Ok(());
        };
        let key = transport.activate_mpn(desired).await?;
        info!(group = %desired.group(), key = %key, "MPN activated");
        self.mpns
            .insert(desired.group().to_string(), desired.with_key(key));
        Ok(())
    }

    /// Run every pending op, notifying listeners of groups whose state changed
    ///
    /// Stops early once the session is gone; remaining ops stay pending.
    pub async fn drain(&mut self, transport: &dyn Transport, registry: &SubscriptionRegistry) {
        let mut groups: Vec<String> = self.pending.keys().cloned().collect();
        groups.sort();

        for group in groups {
            match self.handle_pending(transport, &group).await {
                Ok(true) => self.notify(&group, registry),
                Ok(false) => {}
                Err(e) => {
                    log_request_failure("mpn", &group, &e);
                    if e.is_session_gone() {
                        break;
                    }
                }
            }
        }
    }

    /// Replace the local MPN map with what the server holds
    ///
    /// A "subsystem unavailable" refusal counts as an empty answer.
    pub async fn retrieve_all(&mut self, transport: &dyn Transport) -> Result<(), TransportError> {
        let entries = match transport.inquire_all_mpn().await {
            Ok(entries) => entries,
            Err(e) if e.is_mpn_unavailable() => {
                info!(error = %e, "MPN subsystem unavailable, assuming no active MPNs");
                self.mpns.clear();
                self.status_retrieved = true;
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        self.mpns.clear();
        for entry in entries {
            let group = entry.group().to_string();
            if self.mpns.insert(group.clone(), entry).is_some() {
                warn!(group = %group, "Server holds several MPNs for one group, keeping the last");
            }
        }

        let mut groups: Vec<String> = self.mpns.keys().cloned().collect();
        groups.sort();
        for group in groups {
            if let Err(e) = self.refresh_group(transport, &group).await {
                log_request_failure("mpn refresh", &group, &e);
                if e.is_session_gone() {
                    return Err(e);
                }
            }
        }

        self.status_retrieved = true;
        info!(active = self.mpns.len(), "MPN status retrieved");
        Ok(())
    }

    /// `(activated, trigger)` as reported to the group's listener
    pub fn notification(&self, group: &str) -> (bool, f64) {
        let Some(info) = self.mpns.get(group) else {
            return (false, NO_TRIGGER);
        };
        let trigger = match info.trigger_expression.as_deref() {
            Some(expression) => match self.trigger_format.parse_threshold(expression) {
                Ok(threshold) => threshold,
                Err(e) => {
                    error!(group, error = %e, "Unparseable MPN trigger");
                    NO_TRIGGER
                }
            },
            None => NO_TRIGGER,
        };
        (true, trigger)
    }

    /// Fire the listener registered for `group`, if any
    pub fn notify(&self, group: &str, registry: &SubscriptionRegistry) {
        let Some(listener) = registry.mpn_listener(group) else {
            return;
        };
        let (activated, trigger) = self.notification(group);
        debug!(group, activated, trigger, "Notifying MPN status");
        listener.on_mpn_status_changed(activated, trigger);
    }
}

/// Deactivate, treating an MPN the server already dropped as done
async fn deactivate(transport: &dyn Transport, key: &MpnKey) -> Result<(), TransportError> {
    match transport.deactivate_mpn(key).await {
        Ok(()) => Ok(()),
        Err(e) if e.is_mpn_gone() => {
            debug!(key = %key, "MPN already gone on server");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{MPN_NOT_ACTIVE_CODE, MPN_UNAVAILABLE_CODE};
    use crate::protocol::{LoggingTableListener, MpnStatus, SubscriptionMode, TableInfo};
    use crate::testing::{MockOp, MockTransport, TransportCall};
    use proptest::prelude::*;

    fn table(group: &str) -> TableInfo {
        TableInfo::new(group, "last_price", SubscriptionMode::Merge)
    }

    fn with_trigger(group: &str, trigger: &str) -> Arc<Subscription> {
        Arc::new(
            Subscription::new(table(group), Arc::new(LoggingTableListener)).with_mpn_trigger(trigger),
        )
    }

    async fn connected_mock() -> MockTransport {
        let mock = MockTransport::new();
        mock.open_session().await;
        mock
    }

    #[test]
    fn test_intent_without_descriptor_is_ignored() {
        let mut reconciler = MpnReconciler::new(TriggerFormat::default());
        let plain = Arc::new(Subscription::new(table("item1"), Arc::new(LoggingTableListener)));

        assert_eq!(reconciler.record_intent(&plain, true), None);
        assert_eq!(reconciler.pending_len(), 0);
    }

    #[test]
    fn test_latest_intent_wins() {
        let mut reconciler = MpnReconciler::new(TriggerFormat::default());
        let s = with_trigger("item1", "last_price>1.0");

        reconciler.record_intent(&s, true);
        reconciler.record_intent(&s, false);

        assert_eq!(reconciler.pending_len(), 1);
        assert_eq!(reconciler.pending("item1"), Some(false));
    }

    #[test]
    fn test_notification_for_unknown_group() {
        let reconciler = MpnReconciler::new(TriggerFormat::default());
        assert_eq!(reconciler.notification("item9"), (false, NO_TRIGGER));
    }

    #[tokio::test]
    async fn test_add_activates_and_reports_threshold() {
        let mock = connected_mock().await;
        let mut reconciler = MpnReconciler::new(TriggerFormat::default());
        let s = with_trigger("item2", "last_price>12.5");

        reconciler.record_intent(&s, true);
        let changed = reconciler.handle_pending(&mock, "item2").await.unwrap();

        assert!(changed);
        assert_eq!(reconciler.pending_len(), 0);
        assert!(reconciler.active("item2").and_then(|i| i.key.as_ref()).is_some());
        assert_eq!(reconciler.notification("item2"), (true, 12.5));
        assert_eq!(mock.get_server_mpns().await.len(), 1);
    }

    #[tokio::test]
    async fn test_same_trigger_is_a_no_op() {
        let mock = connected_mock().await;
        mock.seed_mpn(MpnInfo::new(table("item2"), Some("last_price>10.0".into())))
            .await;
        let mut reconciler = MpnReconciler::new(TriggerFormat::default());
        reconciler.retrieve_all(&mock).await.unwrap();
        mock.clear_calls().await;

        reconciler.record_intent(&with_trigger("item2", "last_price>10.0"), true);
        let changed = reconciler.handle_pending(&mock, "item2").await.unwrap();

        assert!(!changed);
        assert_eq!(reconciler.pending_len(), 0);
        assert_eq!(
            mock.count_calls(|c| matches!(c, TransportCall::ActivateMpn { .. })).await,
            0
        );
    }

    #[tokio::test]
    async fn test_trigger_change_deactivates_then_activates() {
        let mock = connected_mock().await;
        let old_key = mock
            .seed_mpn(MpnInfo::new(table("item2"), Some("last_price>10.0".into())))
            .await;
        let mut reconciler = MpnReconciler::new(TriggerFormat::default());
        reconciler.retrieve_all(&mock).await.unwrap();
        mock.clear_calls().await;

        reconciler.record_intent(&with_trigger("item2", "last_price>12.0"), true);
        assert!(reconciler.handle_pending(&mock, "item2").await.unwrap());

        let calls = mock.get_calls().await;
        let deactivate = calls
            .iter()
            .position(|c| *c == TransportCall::DeactivateMpn(old_key.clone()))
            .expect("old MPN deactivated");
        let activate = calls
            .iter()
            .position(|c| matches!(c, TransportCall::ActivateMpn { .. }))
            .expect("new MPN activated");
        assert!(deactivate < activate);
        assert_eq!(reconciler.notification("item2"), (true, 12.0));
    }

    #[tokio::test]
    async fn test_gone_mpn_is_dropped_on_refresh() {
        let mock = connected_mock().await;
        mock.seed_mpn(MpnInfo::new(table("item4"), Some("last_price>1.0".into())))
            .await;
        let mut reconciler = MpnReconciler::new(TriggerFormat::default());
        reconciler.retrieve_all(&mock).await.unwrap();

        mock.fail_next(
            MockOp::InquireMpnStatus,
            TransportError::user(MPN_NOT_ACTIVE_CODE, "not active"),
        )
        .await;
        reconciler.refresh_group(&mock, "item4").await.unwrap();

        assert!(reconciler.active("item4").is_none());
        assert_eq!(reconciler.notification("item4"), (false, NO_TRIGGER));
    }

    #[tokio::test]
    async fn test_triggered_mpn_is_torn_down() {
        let mock = connected_mock().await;
        let key = mock
            .seed_mpn(MpnInfo::new(table("item4"), Some("last_price>1.0".into())))
            .await;
        mock.set_mpn_status(&key, MpnStatus::Triggered).await;
        let mut reconciler = MpnReconciler::new(TriggerFormat::default());

        reconciler.retrieve_all(&mock).await.unwrap();

        assert!(reconciler.active("item4").is_none());
        assert!(mock.get_server_mpns().await.is_empty());
        assert!(reconciler.status_retrieved());
    }

    #[tokio::test]
    async fn test_unavailable_subsystem_counts_as_retrieved() {
        let mock = connected_mock().await;
        mock.fail_next(
            MockOp::InquireAllMpn,
            TransportError::user(MPN_UNAVAILABLE_CODE, "no mpn"),
        )
        .await;
        let mut reconciler = MpnReconciler::new(TriggerFormat::default());

        reconciler.retrieve_all(&mock).await.unwrap();

        assert!(reconciler.status_retrieved());
        assert_eq!(reconciler.active_len(), 0);
    }

    #[tokio::test]
    async fn test_failed_op_stays_pending() {
        let mock = connected_mock().await;
        mock.fail_next(MockOp::ActivateMpn, TransportError::server(32, "busy"))
            .await;
        let mut reconciler = MpnReconciler::new(TriggerFormat::default());
        reconciler.record_intent(&with_trigger("item1", "last_price>2.0"), true);

        assert!(reconciler.handle_pending(&mock, "item1").await.is_err());
        assert_eq!(reconciler.pending("item1"), Some(true));

        assert!(reconciler.handle_pending(&mock, "item1").await.unwrap());
        assert_eq!(reconciler.pending_len(), 0);
    }

    #[test]
    fn test_unparseable_trigger_reports_no_threshold() {
        let mut reconciler = MpnReconciler::new(TriggerFormat::default());
        reconciler.mpns.insert(
            "item1".to_string(),
            MpnInfo::new(table("item1"), Some("bid<3".into())).with_key(MpnKey::new("k")),
        );
        assert_eq!(reconciler.notification("item1"), (true, NO_TRIGGER));
    }

    proptest! {
        #[test]
        fn prop_one_pending_op_per_group(
            intents in proptest::collection::vec((0usize..4, any::<bool>()), 0..48)
        ) {
            let subs: Vec<_> = (0..4)
                .map(|i| with_trigger(&format!("item{i}"), "last_price>1.0"))
                .collect();
            let mut reconciler = MpnReconciler::new(TriggerFormat::default());
            let mut last: HashMap<usize, bool> = HashMap::new();

            for &(index, add) in &intents {
                reconciler.record_intent(&subs[index], add);
                last.insert(index, add);
                prop_assert!(reconciler.pending_len() <= subs.len());
            }

            prop_assert_eq!(reconciler.pending_len(), last.len());
            for (index, add) in last {
                prop_assert_eq!(reconciler.pending(&format!("item{index}")), Some(add));
            }
        }
    }
}
