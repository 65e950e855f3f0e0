//! Session core
//!
//! Everything that mutates session state runs on one worker fed by the
//! [`serializer`]. The facade in [`crate::client`] only flips atomic intent
//! flags and posts [`Command`]s; transport callbacks are adapted per open
//! attempt by [`EpochListener`] so events from a superseded session are dropped.

pub mod controller;
pub mod epoch;
pub mod listener;
pub mod mpn;
pub mod registry;
pub mod serializer;
pub mod status;
pub mod worker;

pub use controller::{ConnectionController, ConnectionIntent, ReconcileStep};
pub use epoch::SessionEpoch;
pub use listener::EpochListener;
pub use mpn::{MpnReconciler, PendingOp};
pub use registry::SubscriptionRegistry;
pub use serializer::{EventHandler, EventQueue, EventSerializer, Flow};
pub use status::StatusProjection;
pub use worker::{Command, SessionCore};
