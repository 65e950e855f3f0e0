//! Mock implementations for testing
//!
//! [`MockTransport`] is an in-memory push server: it records every request,
//! keeps a server-side MPN table, and lets tests script failures and inject
//! session callbacks. The recording listeners capture what the session core
//! reports and let tests wait for it.

use crate::error::{TransportError, MPN_NOT_ACTIVE_CODE};
use crate::protocol::{
    ConnectionStatus, MpnInfo, MpnKey, MpnStatus, MpnStatusListener, StatusListener, TableInfo,
    TableKey, TableListener,
};
use crate::transport::{ConnectionInfo, ConnectionListener, Transport};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use url::Url;
use uuid::Uuid;

/// A request received by [`MockTransport`]
#[derive(Debug, Clone, PartialEq)]
pub enum TransportCall {
    Open {
        adapter: String,
        server_url: Option<Url>,
    },
    Close,
    BatchRequests(usize),
    CloseBatch,
    Subscribe {
        group: String,
    },
    Unsubscribe(TableKey),
    ActivateMpn {
        group: String,
        trigger: Option<String>,
    },
    DeactivateMpn(MpnKey),
    InquireAllMpn,
    InquireMpnStatus(MpnKey),
    InquireMpn(MpnKey),
}

/// Operations that can be scripted to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOp {
    Open,
    BatchRequests,
    Subscribe,
    Unsubscribe,
    ActivateMpn,
    DeactivateMpn,
    InquireAllMpn,
    InquireMpnStatus,
    InquireMpn,
}

#[derive(Debug, Clone)]
struct ServerMpn {
    info: MpnInfo,
    status: MpnStatus,
}

struct MockState {
    failures: HashMap<MockOp, VecDeque<TransportError>>,
    listeners: Vec<Arc<dyn ConnectionListener>>,
    mpns: Vec<ServerMpn>,
    session_open: bool,
    polling: bool,
    auto_start: bool,
    subscribe_delay: Option<Duration>,
    next_table_key: u64,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            failures: HashMap::new(),
            listeners: Vec::new(),
            mpns: Vec::new(),
            session_open: false,
            polling: false,
            auto_start: true,
            subscribe_delay: None,
            next_table_key: 0,
        }
    }
}

impl MockState {
    fn take_failure(&mut self, op: MockOp) -> Result<(), TransportError> {
        match self.failures.get_mut(&op).and_then(VecDeque::pop_front) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn require_session(&self) -> Result<(), TransportError> {
        if self.session_open {
            Ok(())
        } else {
            Err(TransportError::subscription_closed("no session"))
        }
    }

    fn find_mpn(&self, key: &MpnKey) -> Result<&ServerMpn, TransportError> {
        self.mpns
            .iter()
            .find(|m| m.info.key.as_ref() == Some(key))
            .ok_or_else(|| TransportError::user(MPN_NOT_ACTIVE_CODE, "MPN not active"))
    }
}

/// In-memory push server
pub struct MockTransport {
    calls: watch::Sender<Vec<TransportCall>>,
    state: Mutex<MockState>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    pub fn new() -> Self {
        let (calls, _) = watch::channel(Vec::new());
        Self {
            calls,
            state: Mutex::new(MockState::default()),
        }
    }

    fn record(&self, call: TransportCall) {
        self.calls.send_modify(|calls| calls.push(call));
    }

    /// Report polling instead of streaming when a session starts
    pub async fn set_polling(&self, polling: bool) {
        self.state.lock().await.polling = polling;
    }

    /// Whether `open` fires `on_session_started` by itself
    pub async fn set_auto_start(&self, auto_start: bool) {
        self.state.lock().await.auto_start = auto_start;
    }

    pub async fn set_subscribe_delay(&self, delay: Option<Duration>) {
        self.state.lock().await.subscribe_delay = delay;
    }

    /// Fail the next call of `op` with `error`
    pub async fn fail_next(&self, op: MockOp, error: TransportError) {
        self.state
            .lock()
            .await
            .failures
            .entry(op)
            .or_default()
            .push_back(error);
    }

    /// Fail the next `count` open attempts
    pub async fn fail_opens(&self, count: usize) {
        for attempt in 0..count {
            self.fail_next(
                MockOp::Open,
                TransportError::connection(format!("server unreachable (attempt {attempt})")),
            )
            .await;
        }
    }

    /// Mark a session as open without going through `open`
    pub async fn open_session(&self) {
        self.state.lock().await.session_open = true;
    }

    pub async fn is_session_open(&self) -> bool {
        self.state.lock().await.session_open
    }

    pub async fn get_calls(&self) -> Vec<TransportCall> {
        self.calls.borrow().clone()
    }

    pub async fn count_calls<F>(&self, predicate: F) -> usize
    where
        F: Fn(&TransportCall) -> bool,
    {
        self.calls.borrow().iter().filter(|c| predicate(*c)).count()
    }

    pub async fn clear_calls(&self) {
        self.calls.send_modify(Vec::clear);
    }

    /// Wait until at least `count` recorded calls match; false on timeout
    pub async fn wait_for_calls<F>(&self, count: usize, timeout: Duration, predicate: F) -> bool
    where
        F: Fn(&TransportCall) -> bool,
    {
        let mut rx = self.calls.subscribe();
        let matched = async {
            rx.wait_for(|calls| calls.iter().filter(|c| predicate(*c)).count() >= count)
                .await
                .is_ok()
        };
        tokio::time::timeout(timeout, matched)
            .await
            .unwrap_or(false)
    }

    pub async fn open_count(&self) -> usize {
        self.count_calls(|c| matches!(c, TransportCall::Open { .. }))
            .await
    }

    /// Listener handed over by the `attempt`-th open call, counting from 1
    pub async fn connection_listener(&self, attempt: usize) -> Option<Arc<dyn ConnectionListener>> {
        let state = self.state.lock().await;
        attempt
            .checked_sub(1)
            .and_then(|index| state.listeners.get(index).cloned())
    }

    pub async fn latest_listener(&self) -> Option<Arc<dyn ConnectionListener>> {
        self.state.lock().await.listeners.last().cloned()
    }

    /// The server drops the current session
    pub async fn server_close(&self) {
        let listener = {
            let mut state = self.state.lock().await;
            state.session_open = false;
            state.listeners.last().cloned()
        };
        if let Some(listener) = listener {
            listener.on_close();
        }
    }

    /// Install an active MPN on the server, returning its key
    pub async fn seed_mpn(&self, info: MpnInfo) -> MpnKey {
        let key = MpnKey::new(Uuid::new_v4().to_string());
        self.state.lock().await.mpns.push(ServerMpn {
            info: info.with_key(key.clone()),
            status: MpnStatus::Active,
        });
        key
    }

    pub async fn set_mpn_status(&self, key: &MpnKey, status: MpnStatus) {
        let mut state = self.state.lock().await;
        if let Some(mpn) = state
            .mpns
            .iter_mut()
            .find(|m| m.info.key.as_ref() == Some(key))
        {
            mpn.status = status;
        }
    }

    /// The server forgets an MPN without the client asking
    pub async fn drop_server_mpn(&self, key: &MpnKey) {
        self.state
            .lock()
            .await
            .mpns
            .retain(|m| m.info.key.as_ref() != Some(key));
    }

    pub async fn get_server_mpns(&self) -> Vec<MpnInfo> {
        self.state
            .lock()
            .await
            .mpns
            .iter()
            .map(|m| m.info.clone())
            .collect()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn open(
        &self,
        info: &ConnectionInfo,
        listener: Arc<dyn ConnectionListener>,
    ) -> Result<(), TransportError> {
        self.record(TransportCall::Open {
            adapter: info.adapter.clone(),
            server_url: info.server_url.clone(),
        });
        let (polling, auto_start) = {
            let mut state = self.state.lock().await;
            state.listeners.push(Arc::clone(&listener));
            state.take_failure(MockOp::Open)?;
            state.session_open = true;
            (state.polling, state.auto_start)
        };

        listener.on_connection_established();
        if auto_start {
            listener.on_session_started(polling);
        }
        Ok(())
    }

    async fn close(&self) {
        self.record(TransportCall::Close);
        self.state.lock().await.session_open = false;
    }

    async fn batch_requests(&self, count: usize) -> Result<(), TransportError> {
        self.record(TransportCall::BatchRequests(count));
        let mut state = self.state.lock().await;
        state.take_failure(MockOp::BatchRequests)?;
        state.require_session()
    }

    async fn close_batch(&self) {
        self.record(TransportCall::CloseBatch);
    }

    async fn subscribe_table(
        &self,
        info: &TableInfo,
        _listener: Arc<dyn TableListener>,
        _snapshot: bool,
    ) -> Result<TableKey, TransportError> {
        self.record(TransportCall::Subscribe {
            group: info.group.clone(),
        });
        let delay = {
            let mut state = self.state.lock().await;
            state.take_failure(MockOp::Subscribe)?;
            state.require_session()?;
            state.subscribe_delay
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().await;
        state.next_table_key += 1;
        Ok(TableKey(state.next_table_key))
    }

    async fn unsubscribe_table(&self, key: TableKey) -> Result<(), TransportError> {
        self.record(TransportCall::Unsubscribe(key));
        let mut state = self.state.lock().await;
        state.take_failure(MockOp::Unsubscribe)?;
        state.require_session()
    }

    async fn activate_mpn(&self, info: &MpnInfo) -> Result<MpnKey, TransportError> {
        self.record(TransportCall::ActivateMpn {
            group: info.group().to_string(),
            trigger: info.trigger_expression.clone(),
        });
        let mut state = self.state.lock().await;
        state.take_failure(MockOp::ActivateMpn)?;
        state.require_session()?;

        let key = MpnKey::new(Uuid::new_v4().to_string());
        state.mpns.push(ServerMpn {
            info: info.with_key(key.clone()),
            status: MpnStatus::Active,
        });
        Ok(key)
    }

    async fn deactivate_mpn(&self, key: &MpnKey) -> Result<(), TransportError> {
        self.record(TransportCall::DeactivateMpn(key.clone()));
        let mut state = self.state.lock().await;
        state.take_failure(MockOp::DeactivateMpn)?;
        state.require_session()?;

        state.find_mpn(key)?;
        state.mpns.retain(|m| m.info.key.as_ref() != Some(key));
        Ok(())
    }

    async fn inquire_all_mpn(&self) -> Result<Vec<MpnInfo>, TransportError> {
        self.record(TransportCall::InquireAllMpn);
        let mut state = self.state.lock().await;
        state.take_failure(MockOp::InquireAllMpn)?;
        state.require_session()?;
        Ok(state.mpns.iter().map(|m| m.info.clone()).collect())
    }

    async fn inquire_mpn_status(&self, key: &MpnKey) -> Result<MpnStatus, TransportError> {
        self.record(TransportCall::InquireMpnStatus(key.clone()));
        let mut state = self.state.lock().await;
        state.take_failure(MockOp::InquireMpnStatus)?;
        state.require_session()?;
        state.find_mpn(key).map(|m| m.status)
    }

    async fn inquire_mpn(&self, key: &MpnKey) -> Result<MpnInfo, TransportError> {
        self.record(TransportCall::InquireMpn(key.clone()));
        let mut state = self.state.lock().await;
        state.take_failure(MockOp::InquireMpn)?;
        state.require_session()?;
        state.find_mpn(key).map(|m| m.info.clone())
    }
}

/// Status listener that keeps the full history
#[derive(Clone)]
pub struct RecordingStatusListener {
    history: Arc<watch::Sender<Vec<ConnectionStatus>>>,
}

impl Default for RecordingStatusListener {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingStatusListener {
    pub fn new() -> Self {
        let (history, _) = watch::channel(Vec::new());
        Self {
            history: Arc::new(history),
        }
    }

    pub fn history(&self) -> Vec<ConnectionStatus> {
        self.history.borrow().clone()
    }

    pub fn last(&self) -> Option<ConnectionStatus> {
        self.history.borrow().last().copied()
    }

    pub fn count(&self, status: ConnectionStatus) -> usize {
        self.history.borrow().iter().filter(|s| **s == status).count()
    }

    pub fn clear(&self) {
        self.history.send_modify(Vec::clear);
    }

    /// Wait until the history satisfies `predicate`; false on timeout
    pub async fn wait_until<F>(&self, timeout: Duration, predicate: F) -> bool
    where
        F: Fn(&[ConnectionStatus]) -> bool,
    {
        let mut rx = self.history.subscribe();
        let matched = async { rx.wait_for(|history| predicate(history.as_slice())).await.is_ok() };
        tokio::time::timeout(timeout, matched)
            .await
            .unwrap_or(false)
    }

    /// Wait until `status` is the latest delivered status
    pub async fn wait_for(&self, status: ConnectionStatus, timeout: Duration) -> bool {
        self.wait_until(timeout, |history| history.last() == Some(&status))
            .await
    }
}

impl StatusListener for RecordingStatusListener {
    fn on_status_change(&self, status: ConnectionStatus) {
        self.history.send_modify(|history| history.push(status));
    }
}

/// MPN listener that keeps every `(activated, trigger)` notification
#[derive(Clone)]
pub struct RecordingMpnListener {
    notifications: Arc<watch::Sender<Vec<(bool, f64)>>>,
}

impl Default for RecordingMpnListener {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingMpnListener {
    pub fn new() -> Self {
        let (notifications, _) = watch::channel(Vec::new());
        Self {
            notifications: Arc::new(notifications),
        }
    }

    pub fn notifications(&self) -> Vec<(bool, f64)> {
        self.notifications.borrow().clone()
    }

    pub fn last(&self) -> Option<(bool, f64)> {
        self.notifications.borrow().last().copied()
    }

    /// Wait until at least `count` notifications arrived; false on timeout
    pub async fn wait_for_count(&self, count: usize, timeout: Duration) -> bool {
        let mut rx = self.notifications.subscribe();
        let matched = async { rx.wait_for(|n| n.len() >= count).await.is_ok() };
        tokio::time::timeout(timeout, matched)
            .await
            .unwrap_or(false)
    }
}

impl MpnStatusListener for RecordingMpnListener {
    fn on_mpn_status_changed(&self, activated: bool, trigger: f64) {
        self.notifications
            .send_modify(|n| n.push((activated, trigger)));
    }
}
