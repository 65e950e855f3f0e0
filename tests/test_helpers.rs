//! Test helpers and utilities for integration tests

use push_session::config::SessionSettings;
use push_session::protocol::{
    ConnectionStatus, LoggingTableListener, Subscription, SubscriptionMode, TableInfo,
    TriggerFormat,
};
use push_session::testing::{MockTransport, RecordingMpnListener, RecordingStatusListener};
use push_session::PushClient;
use std::sync::Arc;
use std::time::Duration;

/// Generous bound for waits; time is paused in these tests so it costs nothing
#[allow(dead_code)]
pub const WAIT: Duration = Duration::from_secs(60);

#[allow(dead_code)]
pub const SERVER_URL: &str = "http://push.example.com:8080";

/// A client over an in-memory server, with a recording status listener
#[allow(dead_code)]
pub struct Harness {
    pub client: PushClient,
    pub transport: Arc<MockTransport>,
    pub status: RecordingStatusListener,
}

#[allow(dead_code)]
impl Harness {
    /// Client with the server configured but not started
    pub fn new() -> Self {
        let harness = Self::without_server();
        harness
            .client
            .set_server(SERVER_URL)
            .expect("test server URL is valid");
        harness
    }

    pub fn without_server() -> Self {
        let transport = Arc::new(MockTransport::new());
        let client = PushClient::new(transport.clone(), SessionSettings::default());
        let status = RecordingStatusListener::new();
        client.set_status_listener(status.clone());
        Self {
            client,
            transport,
            status,
        }
    }

    /// Start and wait for the session to stream
    pub async fn start_streaming(&self) {
        self.client.start();
        assert!(
            self.status.wait_for(ConnectionStatus::Streaming, WAIT).await,
            "session never reached STREAMING: {:?}",
            self.status.history()
        );
        settle().await;
    }
}

/// Let the worker finish whatever it can do without the clock moving
#[allow(dead_code)]
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

#[allow(dead_code)]
pub fn table(group: &str) -> TableInfo {
    TableInfo::new(group, "last_price time", SubscriptionMode::Merge)
}

/// Plain data subscription
#[allow(dead_code)]
pub fn stock(group: &str) -> Arc<Subscription> {
    Arc::new(Subscription::new(table(group), Arc::new(LoggingTableListener)))
}

/// Subscription requesting an MPN when `last_price` exceeds `threshold`
#[allow(dead_code)]
pub fn stock_with_mpn(
    group: &str,
    threshold: f64,
    listener: &RecordingMpnListener,
) -> Arc<Subscription> {
    Arc::new(
        Subscription::new(table(group), Arc::new(LoggingTableListener))
            .with_mpn_trigger(trigger(threshold))
            .with_mpn_listener(Arc::new(listener.clone())),
    )
}

#[allow(dead_code)]
pub fn trigger(threshold: f64) -> String {
    TriggerFormat::default().greater_than(threshold)
}
