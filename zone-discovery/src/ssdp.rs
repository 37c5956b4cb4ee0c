//! SSDP M-SEARCH client.

use std::io::ErrorKind;
use std::net::UdpSocket;
use std::time::{Duration, Instant};

use tracing::trace;

use crate::error::{DiscoveryError, Result};

pub(crate) const MULTICAST_ADDR: &str = "239.255.255.250:1900";

/// The headers of one M-SEARCH answer that discovery cares about.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SsdpResponse {
    pub location: String,
    pub search_target: String,
    pub usn: String,
    pub server: Option<String>,
}

impl SsdpResponse {
    /// Cheap pre-filter before fetching the device description.
    pub fn is_zone_player(&self) -> bool {
        self.search_target.contains("ZonePlayer")
            || self.usn.contains("RINCON")
            || self
                .server
                .as_deref()
                .map(|s| s.to_ascii_lowercase().contains("sonos"))
                .unwrap_or(false)
    }
}

pub(crate) struct SsdpClient {
    socket: UdpSocket,
    timeout: Duration,
}

impl SsdpClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0")
            .map_err(|e| DiscoveryError::Network(format!("failed to bind UDP socket: {e}")))?;
        socket
            .set_multicast_loop_v4(true)
            .map_err(|e| DiscoveryError::Network(format!("failed to set multicast loop: {e}")))?;
        Ok(Self { socket, timeout })
    }

    /// Sends one M-SEARCH and collects every parseable answer that arrives
    /// before the timeout.
    pub fn search(&self, search_target: &str) -> Result<Vec<SsdpResponse>> {
        let request = format!(
            "M-SEARCH * HTTP/1.1\r\n\
             HOST: {MULTICAST_ADDR}\r\n\
             MAN: \"ssdp:discover\"\r\n\
             MX: 2\r\n\
             ST: {search_target}\r\n\
             USER-AGENT: musicbox/{} UPnP/1.0\r\n\
             \r\n",
            env!("CARGO_PKG_VERSION")
        );
        self.socket
            .send_to(request.as_bytes(), MULTICAST_ADDR)
            .map_err(|e| DiscoveryError::Network(format!("failed to send M-SEARCH: {e}")))?;

        let deadline = Instant::now() + self.timeout;
        let mut buffer = [0u8; 2048];
        let mut responses = Vec::new();
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            self.socket
                .set_read_timeout(Some(remaining))
                .map_err(|e| DiscoveryError::Network(format!("failed to set read timeout: {e}")))?;

            match self.socket.recv_from(&mut buffer) {
                Ok((size, from)) => {
                    let parsed = std::str::from_utf8(&buffer[..size])
                        .ok()
                        .and_then(parse_response);
                    match parsed {
                        Some(response) => responses.push(response),
                        None => trace!(%from, "ignoring unparseable SSDP answer"),
                    }
                }
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => break,
                Err(e) => return Err(DiscoveryError::Network(format!("socket error: {e}"))),
            }
        }
        Ok(responses)
    }
}

pub(crate) fn parse_response(text: &str) -> Option<SsdpResponse> {
    let mut location = None;
    let mut search_target = None;
    let mut usn = None;
    let mut server = None;

    for line in text.lines() {
        let line = line.trim();
        if let Some(value) = header_value(line, "LOCATION:") {
            location = Some(value);
        } else if let Some(value) = header_value(line, "ST:") {
            search_target = Some(value);
        } else if let Some(value) = header_value(line, "USN:") {
            usn = Some(value);
        } else if let Some(value) = header_value(line, "SERVER:") {
            server = Some(value);
        }
    }

    Some(SsdpResponse {
        location: location?,
        search_target: search_target?,
        usn: usn?,
        server,
    })
}

fn header_value(line: &str, header: &str) -> Option<String> {
    let prefix = line.get(..header.len())?;
    (line.len() > header.len() && prefix.eq_ignore_ascii_case(header))
        .then(|| line[header.len()..].trim().to_string())
}
