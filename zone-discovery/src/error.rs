//! Error types for zone player discovery.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// Socket setup, SSDP send or an HTTP request failed.
    #[error("network error: {0}")]
    Network(String),

    /// A device description could not be parsed.
    #[error("parse error: {0}")]
    Parse(String),

    /// The device answered but is not a zone player.
    #[error("invalid device: {0}")]
    InvalidDevice(String),
}

pub type Result<T> = std::result::Result<T, DiscoveryError>;
