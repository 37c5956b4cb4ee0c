//! Music library browser with live Sonos room events.
//!
//! The `musicbox` binary wires these pieces together: the library index is
//! served read-only under `/api/music` and `/api/search`, discovered rooms
//! under `/api/sonos`, and each room's transport and volume changes as a
//! Server-Sent Events stream.

pub mod api;
pub mod config;
pub mod events;
pub mod logging;
pub mod zones;

pub use api::{routes, ApiError, AppState};
pub use config::{Args, Config};
pub use logging::{init_logging, LoggingError, LoggingMode};
pub use zones::{run_discovery, Zones};
