//! Room table filled by zone player discovery.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{info, warn};
use zone_discovery::{discover_into, DiscoveryConfig, ZonePlayer};

/// Zone players by room name.
#[derive(Debug, Default)]
pub struct Zones {
    rooms: DashMap<String, ZonePlayer>,
}

impl Zones {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `player` unless its room is already known. Bonded speakers
    /// report the same room; the first one answering represents it.
    pub fn insert(&self, player: ZonePlayer) -> bool {
        let mut added = false;
        self.rooms.entry(player.room_name.clone()).or_insert_with(|| {
            added = true;
            player
        });
        added
    }

    pub fn get(&self, room: &str) -> Option<ZonePlayer> {
        self.rooms.get(room).map(|entry| entry.value().clone())
    }

    /// Room names in alphabetical order.
    pub fn room_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.rooms.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}

/// Runs discovery passes until at least one zone player is known, pausing
/// `retry_interval` between passes.
pub async fn run_discovery(zones: Arc<Zones>, config: DiscoveryConfig) {
    let mut attempt = 1u32;
    loop {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let pass_config = config.clone();
        let pass = tokio::task::spawn_blocking(move || discover_into(&tx, &pass_config));

        // Ends when the pass returns and drops its sender.
        while let Some(player) = rx.recv().await {
            let room = player.room_name.clone();
            if zones.insert(player) {
                info!(%room, "room available");
            }
        }

        match pass.await {
            Ok(Ok(found)) => info!(attempt, found, rooms = zones.len(), "discovery pass complete"),
            Ok(Err(e)) => warn!(attempt, error = %e, "discovery pass failed"),
            Err(e) => warn!(attempt, error = %e, "discovery task failed"),
        }

        if !zones.is_empty() {
            return;
        }
        warn!(
            attempt,
            retry_in_secs = config.retry_interval.as_secs(),
            "no zone players found, retrying"
        );
        tokio::time::sleep(config.retry_interval).await;
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player(room: &str, host: &str) -> ZonePlayer {
        ZonePlayer {
            room_name: room.to_string(),
            udn: format!("uuid:RINCON_{host}"),
            model_name: "Sonos One".to_string(),
            base_url: format!("http://{host}:1400"),
            transport_events: format!("http://{host}:1400/MediaRenderer/AVTransport/Event"),
            rendering_events: format!("http://{host}:1400/MediaRenderer/RenderingControl/Event"),
        }
    }

    #[test]
    fn room_names_are_sorted() {
        let zones = Zones::new();
        zones.insert(player("Office", "10.0.0.3"));
        zones.insert(player("Kitchen", "10.0.0.1"));
        zones.insert(player("Den", "10.0.0.2"));
        assert_eq!(zones.room_names(), vec!["Den", "Kitchen", "Office"]);
    }

    #[test]
    fn first_player_in_a_room_wins() {
        let zones = Zones::new();
        assert!(zones.insert(player("Living Room", "10.0.0.1")));
        assert!(!zones.insert(player("Living Room", "10.0.0.2")));
        assert_eq!(zones.len(), 1);
        assert_eq!(zones.get("Living Room").unwrap().base_url, "http://10.0.0.1:1400");
    }

    #[test]
    fn unknown_room() {
        let zones = Zones::new();
        assert!(zones.is_empty());
        assert!(zones.get("Attic").is_none());
    }
}
