//! Mobile push notification descriptors exchanged with the transport

use super::subscription::TableInfo;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Server-assigned handle of an activated MPN subscription
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MpnKey(String);

impl MpnKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MpnKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Server-side state of an MPN subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MpnStatus {
    Active,
    Suspended,
    Triggered,
}

impl MpnStatus {
    /// Suspended and triggered subscriptions will not notify again and are torn down
    pub fn is_spent(self) -> bool {
        matches!(self, MpnStatus::Suspended | MpnStatus::Triggered)
    }
}

/// MPN subscription descriptor
///
/// `table_info.group` is the identity of the entry; `key` is only present once
/// the server has activated it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MpnInfo {
    pub table_info: TableInfo,
    pub trigger_expression: Option<String>,
    pub key: Option<MpnKey>,
}

impl MpnInfo {
    pub fn new(table_info: TableInfo, trigger_expression: Option<String>) -> Self {
        Self {
            table_info,
            trigger_expression,
            key: None,
        }
    }

    pub fn group(&self) -> &str {
        &self.table_info.group
    }

    /// Copy of this descriptor bound to the key the server assigned
    pub fn with_key(&self, key: MpnKey) -> Self {
        Self {
            key: Some(key),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::subscription::SubscriptionMode;

    #[test]
    fn test_spent_statuses() {
        assert!(!MpnStatus::Active.is_spent());
        assert!(MpnStatus::Suspended.is_spent());
        assert!(MpnStatus::Triggered.is_spent());
    }

    #[test]
    fn test_with_key_keeps_descriptor() {
        let info = MpnInfo::new(
            TableInfo::new("item2", "last_price", SubscriptionMode::Merge),
            Some("last_price>10.0".to_string()),
        );
        let bound = info.with_key(MpnKey::new("k-1"));

        assert_eq!(bound.group(), "item2");
        assert_eq!(bound.trigger_expression, info.trigger_expression);
        assert_eq!(bound.key, Some(MpnKey::new("k-1")));
        assert_eq!(info.key, None);
    }
}
