//! MPN trigger expressions of the form `HEAD + ">" + number`
//!
//! The server evaluates the expression; the client only needs to build it from
//! a threshold and recover the threshold when reporting MPN status.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Comparison operator used by every trigger this client produces
pub const TRIGGER_GT: &str = ">";

/// Default field the trigger is evaluated against
pub const DEFAULT_TRIGGER_HEAD: &str = "last_price";

/// Threshold reported when no trigger is active or it cannot be parsed
pub const NO_TRIGGER: f64 = -1.0;

#[derive(Debug, Error, PartialEq)]
pub enum TriggerParseError {
    #[error("trigger '{expression}' does not start with '{prefix}'")]
    UnexpectedPrefix { expression: String, prefix: String },
    #[error("trigger '{expression}' has a non-numeric threshold")]
    InvalidThreshold { expression: String },
}

/// Fixed `HEAD + OP` prefix shared by all trigger expressions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerFormat {
    head: String,
}

impl TriggerFormat {
    pub fn new(head: impl Into<String>) -> Self {
        Self { head: head.into() }
    }

    pub fn head(&self) -> &str {
        &self.head
    }

    /// `HEAD + OP`, e.g. `last_price>`
    pub fn prefix(&self) -> String {
        format!("{}{}", self.head, TRIGGER_GT)
    }

    /// Build the expression firing when the field exceeds `threshold`
    pub fn greater_than(&self, threshold: f64) -> String {
        format!("{}{:?}", self.prefix(), threshold)
    }

    /// Recover the numeric threshold from an expression built with this format
    pub fn parse_threshold(&self, expression: &str) -> Result<f64, TriggerParseError> {
        let prefix = self.prefix();
        let tail = expression
            .strip_prefix(&prefix)
            .ok_or_else(|| TriggerParseError::UnexpectedPrefix {
                expression: expression.to_string(),
                prefix: prefix.clone(),
            })?;

        tail.trim()
            .parse::<f64>()
            .map_err(|_| TriggerParseError::InvalidThreshold {
                expression: expression.to_string(),
            })
    }
}

impl Default for TriggerFormat {
    fn default() -> Self {
        Self::new(DEFAULT_TRIGGER_HEAD)
    }
}
