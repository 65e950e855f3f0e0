//! Observability for the push session
//!
//! Structured logging setup and the span macros used around open attempts and
//! MPN operations.

pub mod logging;

pub use logging::{init_default_logging, init_logging, parse_level, LogFormat};

// Span macros for structured logging
pub use logging::{mpn_span, session_span};
