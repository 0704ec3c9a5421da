//! Crowdgate error types.

use thiserror::Error;

/// Errors that can occur while reaching an admission decision.
///
/// The engine never decides fail-open or fail-closed on its own; these
/// variants are distinct so the host can apply its own policy
/// (see [`crate::FailurePolicy`]).
#[derive(Debug, Error)]
pub enum CrowdgateError {
    /// Configuration is invalid (missing key, bad exclusion pattern).
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A request to the queueing service timed out.
    #[error("Queue API request timed out: {0}")]
    Timeout(String),

    /// HTTP transport error communicating with the queueing service.
    #[error("Queue API transport error: {0}")]
    Transport(String),

    /// The queueing service answered with something we cannot use.
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// The visitor's cookie payload could not be decoded.
    #[error("Invalid cookie payload: {0}")]
    CookieInvalid(String),
}

impl CrowdgateError {
    /// Whether this is a fatal configuration error.
    ///
    /// Hosts must not mask these behind a fail-open policy.
    pub fn is_config(&self) -> bool {
        matches!(self, CrowdgateError::ConfigError(_))
    }

    /// Whether this error is worth retrying at the transport level.
    pub fn is_timeout(&self) -> bool {
        matches!(self, CrowdgateError::Timeout(_))
    }
}
