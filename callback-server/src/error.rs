use thiserror::Error;

/// Failures starting the callback listener.
#[derive(Debug, Error)]
pub enum CallbackError {
    #[error("no free port in range {start}-{end}")]
    NoAvailablePort { start: u16, end: u16 },

    #[error("could not determine a local IP address to advertise")]
    NoLocalIp,

    #[error("failed to bind port {port}: {reason}")]
    Bind { port: u16, reason: String },
}

pub type Result<T> = std::result::Result<T, CallbackError>;
