//! Panic payloads captured at unit boundaries.
//!
//! Background work (task-group units, worker iterations, delayed actions) runs
//! inside `catch_unwind`. The opaque `Box<dyn Any + Send>` produced by a panic
//! is reduced to a [`PanicPayload`] so it can be stored, cloned and reported
//! through the owning primitive's normal return path.

use core::fmt;
use std::any::Any;

/// Message recovered from a contained panic.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PanicPayload {
    message: String,
}

impl PanicPayload {
    /// Creates a new panic payload with the given message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Extracts a payload from the value returned by `catch_unwind`.
    ///
    /// `&str` and `String` panics keep their text; anything else becomes
    /// `"unknown panic"`.
    #[must_use]
    pub fn from_unwind(payload: &(dyn Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(ToString::to_string)
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        Self { message }
    }

    /// Returns the panic message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for PanicPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "panic: {}", self.message)
    }
}
