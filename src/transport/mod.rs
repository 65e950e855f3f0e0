//! Transport contract consumed by the session core
//!
//! The wire protocol (framing, streaming vs polling, bandwidth) lives behind
//! [`Transport`]. The core only relies on the request/response calls below and
//! on the asynchronous callbacks delivered through [`ConnectionListener`].

use crate::error::TransportError;
use crate::protocol::{MpnInfo, MpnKey, MpnStatus, TableInfo, TableKey, TableListener};
use std::sync::Arc;
use url::Url;

/// Parameters of a session open request
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionInfo {
    pub server_url: Option<Url>,
    pub adapter: String,
}

impl ConnectionInfo {
    pub fn new(adapter: impl Into<String>) -> Self {
        Self {
            server_url: None,
            adapter: adapter.into(),
        }
    }
}

/// Asynchronous session callbacks
///
/// Invoked from whatever context the transport runs its I/O on. Implementations
/// must not block.
pub trait ConnectionListener: Send + Sync {
    fn on_session_started(&self, is_polling: bool);

    fn on_activity_warning(&self, warning: bool);

    fn on_close(&self);

    fn on_connection_established(&self) {}

    fn on_new_bytes(&self, _bytes: u64) {}

    fn on_data_error(&self, _error: &TransportError) {}

    fn on_end(&self, _cause: i32) {}

    fn on_failure(&self, _error: &TransportError) {}
}

/// Push server client used sequentially by the session core
///
/// Every call completes (or fails) before the core issues the next one, except
/// for the resubscribe batch where `subscribe_table` calls run concurrently
/// between `batch_requests` and `close_batch`.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Open a session; callbacks for it go to `listener`
    async fn open(
        &self,
        info: &ConnectionInfo,
        listener: Arc<dyn ConnectionListener>,
    ) -> Result<(), TransportError>;

    /// Close the current session, if any
    async fn close(&self);

    /// Reserve a server-side window for `count` pipelined requests
    async fn batch_requests(&self, count: usize) -> Result<(), TransportError>;

    async fn close_batch(&self);

    async fn subscribe_table(
        &self,
        info: &TableInfo,
        listener: Arc<dyn TableListener>,
        snapshot: bool,
    ) -> Result<TableKey, TransportError>;

    async fn unsubscribe_table(&self, key: TableKey) -> Result<(), TransportError>;

    /// Activate an MPN subscription, returning the key the server assigned
    async fn activate_mpn(&self, info: &MpnInfo) -> Result<MpnKey, TransportError>;

    async fn deactivate_mpn(&self, key: &MpnKey) -> Result<(), TransportError>;

    async fn inquire_all_mpn(&self) -> Result<Vec<MpnInfo>, TransportError>;

    async fn inquire_mpn_status(&self, key: &MpnKey) -> Result<MpnStatus, TransportError>;

    async fn inquire_mpn(&self, key: &MpnKey) -> Result<MpnInfo, TransportError>;
}
