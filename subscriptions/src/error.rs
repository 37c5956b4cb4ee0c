//! Error types for subscription management.

use crate::registry::ListenerId;
use thiserror::Error;

/// Errors raised by the GENA client and the registry.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SubscriptionError {
    /// The request never got an HTTP response.
    #[error("network error: {0}")]
    Network(String),

    /// The device answered with a non-2xx status.
    #[error("{method} rejected with HTTP {status}")]
    Protocol { method: &'static str, status: u16 },

    /// A successful SUBSCRIBE response without a `SID` header.
    #[error("{0} response carried no SID header")]
    MissingSid(&'static str),

    #[error("invalid endpoint URL '{url}': {reason}")]
    InvalidEndpoint { url: String, reason: String },

    /// The listener was already removed, either explicitly or because its
    /// subscription failed.
    #[error("{0} is not registered")]
    UnknownRegistration(ListenerId),

    #[error("registry is shutting down")]
    ShuttingDown,
}

pub type Result<T> = std::result::Result<T, SubscriptionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        let err = SubscriptionError::Protocol {
            method: "SUBSCRIBE",
            status: 412,
        };
        assert_eq!(err.to_string(), "SUBSCRIBE rejected with HTTP 412");

        let err = SubscriptionError::UnknownRegistration(ListenerId(7));
        assert_eq!(err.to_string(), "listener-7 is not registered");

        let err = SubscriptionError::InvalidEndpoint {
            url: "nope".into(),
            reason: "relative URL without a base".into(),
        };
        assert!(err.to_string().contains("'nope'"));
    }
}
