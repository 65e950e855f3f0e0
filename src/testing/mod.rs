//! Testing utilities and mock implementations
//!
//! An in-memory push server and recording listeners, so the session core can
//! be exercised without a real server.

pub mod mocks;

pub use mocks::*;
