//! Data subscriptions handed to the session by the UI layer
//!
//! A [`Subscription`] is shared as `Arc<Subscription>`; two handles denote the
//! same subscription only when they point at the same allocation.

use super::mpn::MpnInfo;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

/// Server-side subscription mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionMode {
    Merge,
    Distinct,
    Command,
    Raw,
}

impl Default for SubscriptionMode {
    fn default() -> Self {
        SubscriptionMode::Merge
    }
}

/// Table descriptor; `group` is the identity key for MPN reconciliation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableInfo {
    pub group: String,
    pub schema: String,
    #[serde(default)]
    pub mode: SubscriptionMode,
    #[serde(default)]
    pub data_adapter: Option<String>,
    #[serde(default)]
    pub snapshot: bool,
}

impl TableInfo {
    pub fn new(group: impl Into<String>, schema: impl Into<String>, mode: SubscriptionMode) -> Self {
        Self {
            group: group.into(),
            schema: schema.into(),
            mode,
            data_adapter: None,
            snapshot: false,
        }
    }

    pub fn with_data_adapter(mut self, adapter: impl Into<String>) -> Self {
        self.data_adapter = Some(adapter.into());
        self
    }

    pub fn with_snapshot(mut self, snapshot: bool) -> Self {
        self.snapshot = snapshot;
        self
    }
}

/// Server-assigned handle of a live table subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableKey(pub u64);

impl fmt::Display for TableKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "table#{}", self.0)
    }
}

/// Sink for data updates; forwarded to the transport untouched
pub trait TableListener: Send + Sync {
    fn on_update(&self, item_name: &str, fields: &HashMap<String, Option<String>>);

    fn on_snapshot_end(&self, _item_name: &str) {}

    fn on_unsubscribe(&self, _item_name: &str) {}
}

/// Table listener that only traces what it receives
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingTableListener;

impl TableListener for LoggingTableListener {
    fn on_update(&self, item_name: &str, fields: &HashMap<String, Option<String>>) {
        tracing::trace!(item = %item_name, fields = fields.len(), "Update received");
    }
}

/// Receives MPN state for one group
///
/// `trigger` is the threshold of the active trigger, or `-1.0` when inactive
/// or unparseable.
pub trait MpnStatusListener: Send + Sync {
    fn on_mpn_status_changed(&self, activated: bool, trigger: f64);
}

impl<F> MpnStatusListener for F
where
    F: Fn(bool, f64) + Send + Sync,
{
    fn on_mpn_status_changed(&self, activated: bool, trigger: f64) {
        self(activated, trigger)
    }
}

/// A logical data subscription multiplexed over the session
pub struct Subscription {
    table_info: TableInfo,
    table_listener: Arc<dyn TableListener>,
    table_key: Mutex<Option<TableKey>>,
    mpn_info: Option<MpnInfo>,
    mpn_listener: Option<Arc<dyn MpnStatusListener>>,
}

impl Subscription {
    pub fn new(table_info: TableInfo, table_listener: Arc<dyn TableListener>) -> Self {
        Self {
            table_info,
            table_listener,
            table_key: Mutex::new(None),
            mpn_info: None,
            mpn_listener: None,
        }
    }

    /// Attach the MPN descriptor requested for this subscription's group
    pub fn with_mpn_trigger(mut self, trigger_expression: impl Into<String>) -> Self {
        self.mpn_info = Some(MpnInfo::new(
            self.table_info.clone(),
            Some(trigger_expression.into()),
        ));
        self
    }

    pub fn with_mpn_listener(mut self, listener: Arc<dyn MpnStatusListener>) -> Self {
        self.mpn_listener = Some(listener);
        self
    }

    pub fn table_info(&self) -> &TableInfo {
        &self.table_info
    }

    pub fn group(&self) -> &str {
        &self.table_info.group
    }

    pub fn table_listener(&self) -> Arc<dyn TableListener> {
        Arc::clone(&self.table_listener)
    }

    pub fn mpn_info(&self) -> Option<&MpnInfo> {
        self.mpn_info.as_ref()
    }

    pub fn mpn_listener(&self) -> Option<Arc<dyn MpnStatusListener>> {
        self.mpn_listener.clone()
    }

    pub fn table_key(&self) -> Option<TableKey> {
        *self.table_key.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn set_table_key(&self, key: Option<TableKey>) {
        *self.table_key.lock().unwrap_or_else(|e| e.into_inner()) = key;
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("table_info", &self.table_info)
            .field("table_key", &self.table_key())
            .field("mpn_info", &self.mpn_info)
            .field("has_mpn_listener", &self.mpn_listener.is_some())
            .finish()
    }
}

impl fmt::Display for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.table_info.group, self.table_info.schema)
    }
}
