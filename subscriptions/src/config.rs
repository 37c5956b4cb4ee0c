//! Registry configuration.

use std::time::Duration;

/// Settings for a [`Registry`](crate::Registry).
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// URL sent in the `CALLBACK` header. Must reach the callback server.
    pub callback_url: String,

    /// Lease length requested in every SUBSCRIBE.
    ///
    /// Default: 20 seconds
    pub lease_duration: Duration,

    /// How long before expiry a lease is renewed.
    ///
    /// Default: 4 seconds
    pub renewal_margin: Duration,

    /// Keep routing events addressed to the identifier a renewal just
    /// replaced, until the following renewal.
    ///
    /// Default: true
    pub retain_previous_sid: bool,

    /// How long [`Registry::shutdown`](crate::Registry::shutdown) waits for
    /// renew loops to send their UNSUBSCRIBE.
    ///
    /// Default: 5 seconds
    pub shutdown_timeout: Duration,
}

impl RegistryConfig {
    pub fn new(callback_url: impl Into<String>) -> Self {
        Self {
            callback_url: callback_url.into(),
            ..Self::default()
        }
    }

    /// Delay between obtaining a lease of `granted` length and renewing it.
    /// Never shorter than one second, so a device granting tiny leases
    /// cannot spin the loop.
    pub fn renewal_delay(&self, granted: Duration) -> Duration {
        granted
            .saturating_sub(self.renewal_margin)
            .max(Duration::from_secs(1))
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            callback_url: "http://127.0.0.1:3001/notify".to_string(),
            lease_duration: Duration::from_secs(20),
            renewal_margin: Duration::from_secs(4),
            retain_previous_sid: true,
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}
