//! Crate-level error type.
//!
//! Each primitive reports failures through its own error type
//! ([`ThrottleError`], [`SupervisedFailure`], [`ConfigError`]). [`Error`]
//! aggregates them, together with background-thread spawn failures, so
//! callers composing several primitives can use a single `Result`.
//!
//! Blocking (lock contention, waiting on a barrier) is never an error.

use thiserror::Error;

use crate::combinator::ThrottleError;
use crate::config::ConfigError;
use crate::task::SupervisedFailure;

/// Convenience alias for results carrying [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Any failure produced by this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// A throttle rejected the call.
    #[error(transparent)]
    Throttle(#[from] ThrottleError),
    /// A supervised unit terminated abnormally.
    #[error(transparent)]
    Supervised(#[from] SupervisedFailure),
    /// Configuration could not be loaded or failed validation.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The operating system refused to start a background thread.
    #[error("failed to spawn background thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Window quota exhausted.
    Busy,
    /// The primitive was cancelled.
    Cancelled,
    /// A supervised unit failed.
    SupervisedFailure,
    /// Invalid configuration.
    Config,
    /// Thread creation failed.
    Spawn,
}

/// Whether retrying the same operation can succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Recoverability {
    /// Retrying later may succeed (e.g. next throttle window).
    Transient,
    /// The primitive instance will never accept the operation again.
    Permanent,
    /// The failure belongs to user work; the caller decides if it is fatal.
    CallerDecides,
}

impl Error {
    /// Returns the kind of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Throttle(ThrottleError::Busy) => ErrorKind::Busy,
            Self::Throttle(ThrottleError::Cancelled) => ErrorKind::Cancelled,
            Self::Supervised(_) => ErrorKind::SupervisedFailure,
            Self::Config(_) => ErrorKind::Config,
            Self::Spawn(_) => ErrorKind::Spawn,
        }
    }

    /// Returns how the caller may react to this error.
    #[must_use]
    pub fn recoverability(&self) -> Recoverability {
        match self.kind() {
            ErrorKind::Busy | ErrorKind::Spawn => Recoverability::Transient,
            ErrorKind::Cancelled | ErrorKind::Config => Recoverability::Permanent,
            ErrorKind::SupervisedFailure => Recoverability::CallerDecides,
        }
    }

    /// Returns true if retrying may succeed.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        self.recoverability() == Recoverability::Transient
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Spawn(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PanicPayload;

    #[test]
    fn busy_is_transient() {
        let err = Error::from(ThrottleError::Busy);
        assert_eq!(err.kind(), ErrorKind::Busy);
        assert!(err.is_recoverable());
        assert_eq!(err.to_string(), "busy");
    }

    #[test]
    fn cancelled_is_permanent() {
        let err = Error::from(ThrottleError::Cancelled);
        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert_eq!(err.recoverability(), Recoverability::Permanent);
        assert!(!err.is_recoverable());
    }

    #[test]
    fn supervised_failure_is_caller_decides() {
        let err = Error::from(SupervisedFailure::new(PanicPayload::new("oopsie"), 1));
        assert_eq!(err.kind(), ErrorKind::SupervisedFailure);
        assert_eq!(err.recoverability(), Recoverability::CallerDecides);
        assert!(err.to_string().contains("oopsie"));
    }

    #[test]
    fn spawn_error_wraps_io() {
        let err = Error::from(std::io::Error::other("no threads left"));
        assert_eq!(err.kind(), ErrorKind::Spawn);
        assert!(err.to_string().contains("no threads left"));
    }
}
