//! UPnP GENA subscription management.
//!
//! The [`Registry`] keeps one remote subscription per event endpoint and
//! multiplexes it over any number of local listeners:
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use subscriptions::{HttpGenaClient, Registry, RegistryConfig};
//!
//! let client = Arc::new(HttpGenaClient::new(Duration::from_secs(10))?);
//! let registry = Registry::new(client, RegistryConfig::new(callback_server.callback_url()));
//! tokio::spawn(Arc::clone(&registry).run_dispatcher(notifications));
//!
//! let mut sub = registry.subscribe("http://192.168.1.20:1400/MediaRenderer/AVTransport/Event")?;
//! while let Some(event) = sub.recv().await {
//!     // raw LastChange text, see event-parser for decoding
//! }
//! ```
//!
//! Leases are renewed [`RegistryConfig::renewal_margin`] before they expire.
//! A failed SUBSCRIBE or renewal is not retried: the endpoint's listeners see
//! their event stream end and must subscribe again.

pub mod client;
pub mod config;
pub mod error;
pub mod registry;
mod renewal;

pub use client::{parse_timeout, GenaClient, HttpGenaClient, Lease};
pub use config::RegistryConfig;
pub use error::{Result, SubscriptionError};
pub use registry::{
    EventPayload, ListenerId, Registry, Subscription, SubscriptionHandle, SubscriptionState,
};
