//! Zone player discovery.
//!
//! Finds UPnP zone players on the local network with an SSDP M-SEARCH and
//! reads each one's device description to learn its room name and event
//! subscription URLs.
//!
//! ```no_run
//! use zone_discovery::{discover_into, DiscoveryConfig};
//!
//! let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
//! let found = discover_into(&tx, &DiscoveryConfig::default())?;
//! while let Ok(player) = rx.try_recv() {
//!     println!("{} at {}", player.room_name, player.base_url);
//! }
//! # Ok::<(), zone_discovery::DiscoveryError>(())
//! ```
//!
//! Discovery is blocking; async callers run it on a blocking thread.

pub mod device;
mod discovery;
mod error;
mod ssdp;

pub use device::{parse_zone_player, ZonePlayer, DEFAULT_RENDERING_EVENTS, DEFAULT_TRANSPORT_EVENTS};
pub use discovery::{discover_into, fetch_zone_player, DiscoveryConfig, ZONE_PLAYER_TARGET};
pub use error::{DiscoveryError, Result};
