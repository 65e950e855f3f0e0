//! Push Session - client-side session coordinator for push servers
//!
//! Owns one long-lived session against a push server, multiplexes data
//! subscriptions over it, and keeps mobile push notification (MPN) state in
//! line with what the server holds across reconnects.
//!
//! # Overview
//!
//! - [`session`]: the single-worker core (reconnection loop, session epochs,
//!   subscription replay, MPN reconciliation)
//! - [`client::PushClient`]: non-blocking facade posting work to the core
//! - [`transport::Transport`]: the push server client the core drives
//! - [`protocol`]: statuses, subscriptions, MPN descriptors, trigger expressions
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use push_session::config::SessionSettings;
//! use push_session::protocol::{ConnectionStatus, LoggingTableListener, Subscription, SubscriptionMode, TableInfo};
//! use push_session::testing::MockTransport;
//! use push_session::PushClient;
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let client = PushClient::new(Arc::new(MockTransport::new()), SessionSettings::default());
//! client.set_server("http://push.example.com:8080")?;
//! client.set_status_listener(|status: ConnectionStatus| println!("status {}", status.code()));
//!
//! let stock = Arc::new(
//!     Subscription::new(
//!         TableInfo::new("item2", "last_price time", SubscriptionMode::Merge),
//!         Arc::new(LoggingTableListener),
//!     )
//!     .with_mpn_trigger("last_price>42.0"),
//! );
//! client.add_subscription(&stock);
//! client.enable_pn(true);
//! client.activate_mpn(&stock);
//! client.start();
//!
//! client.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod observability;
pub mod protocol;
pub mod session;
pub mod testing;
pub mod transport;

pub use client::PushClient;
pub use config::{ClientConfig, ConfigError, SessionSettings};
pub use error::{ClientError, ClientResult, ErrorClass, TransportError};
pub use protocol::*;
pub use transport::{ConnectionInfo, ConnectionListener, Transport};
