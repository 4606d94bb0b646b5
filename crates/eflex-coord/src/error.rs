//! Coordination error taxonomy.
//!
//! Setup failures (missing configuration, unreachable registry) are fatal
//! for the process they occur in; protocol failures carry enough context
//! to log and tear down cleanly.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoordError {
    /// A required configuration variable was absent; the worker must not
    /// run with undefined scope.
    #[error("missing required configuration: {var}")]
    ConfigurationMissing { var: &'static str },

    /// A configuration variable was present but unparseable.
    #[error("invalid configuration {var}: {reason}")]
    ConfigurationInvalid { var: &'static str, reason: String },

    /// A wire message did not match either message grammar.
    #[error("malformed message: {0:?}")]
    MalformedMessage(String),

    /// The peer closed the connection before the expected message arrived.
    #[error("connection closed during {phase}")]
    ConnectionClosed { phase: &'static str },

    /// The phone book did not arrive within the configured wait.
    #[error("timed out waiting for phone book after {seconds}s")]
    PhoneBookTimeout { seconds: u64 },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<CoordError> for eflex_core::EflexError {
    fn from(err: CoordError) -> Self {
        eflex_core::EflexError::Coordination(err.to_string())
    }
}
