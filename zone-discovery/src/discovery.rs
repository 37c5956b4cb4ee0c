//! Discovery pass: M-SEARCH, then fetch each answering device's description.

use std::collections::HashSet;
use std::time::Duration;

use reqwest::blocking::Client;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info};

use crate::device::{base_url, parse_zone_player, ZonePlayer};
use crate::error::{DiscoveryError, Result};
use crate::ssdp::SsdpClient;

pub const ZONE_PLAYER_TARGET: &str = "urn:schemas-upnp-org:device:ZonePlayer:1";

#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// How long to collect M-SEARCH answers, and the per-request timeout for
    /// description fetches.
    pub timeout: Duration,
    /// Pause between passes while nothing has been found.
    pub retry_interval: Duration,
    pub search_target: String,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(3),
            retry_interval: Duration::from_secs(10),
            search_target: ZONE_PLAYER_TARGET.to_string(),
        }
    }
}

/// Runs one discovery pass and sends every zone player to `sender` as soon
/// as its description has been read. Devices answering more than once are
/// reported once. Returns how many players were delivered.
///
/// Blocking. Fails only when the search itself cannot be sent; devices
/// whose description cannot be fetched are skipped.
pub fn discover_into(sender: &UnboundedSender<ZonePlayer>, config: &DiscoveryConfig) -> Result<usize> {
    let ssdp = SsdpClient::new(config.timeout)?;
    let http = Client::builder()
        .timeout(config.timeout)
        .build()
        .map_err(|e| DiscoveryError::Network(format!("failed to create HTTP client: {e}")))?;

    let answers = ssdp.search(&config.search_target)?;
    debug!(answers = answers.len(), "SSDP search complete");

    let mut seen = HashSet::new();
    let mut delivered = 0;
    for answer in answers.into_iter().filter(|a| a.is_zone_player()) {
        let Ok(base) = base_url(&answer.location) else {
            debug!(location = %answer.location, "ignoring answer with bad LOCATION");
            continue;
        };
        if !seen.insert(base) {
            continue;
        }

        let player = match fetch_zone_player(&http, &answer.location) {
            Ok(player) => player,
            Err(e) => {
                debug!(location = %answer.location, error = %e, "skipping device");
                continue;
            }
        };
        info!(room = %player.room_name, base_url = %player.base_url, "found zone player");
        if sender.send(player).is_err() {
            break;
        }
        delivered += 1;
    }
    Ok(delivered)
}

/// Fetches and parses the description at `location`.
pub fn fetch_zone_player(http: &Client, location: &str) -> Result<ZonePlayer> {
    let response = http
        .get(location)
        .send()
        .map_err(|e| DiscoveryError::Network(format!("failed to fetch device description: {e}")))?;
    if !response.status().is_success() {
        return Err(DiscoveryError::Network(format!(
            "device description returned HTTP {}",
            response.status()
        )));
    }
    let xml = response
        .text()
        .map_err(|e| DiscoveryError::Network(format!("failed to read device description: {e}")))?;
    parse_zone_player(location, &xml)
}
