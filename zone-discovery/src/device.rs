//! Zone player device descriptions.
//!
//! A zone player's description nests its renderer as an embedded device, so
//! the event URLs are found by walking the device tree for the AVTransport
//! and RenderingControl services.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{DiscoveryError, Result};

pub const DEFAULT_TRANSPORT_EVENTS: &str = "/MediaRenderer/AVTransport/Event";
pub const DEFAULT_RENDERING_EVENTS: &str = "/MediaRenderer/RenderingControl/Event";

/// A discovered renderer and the endpoints needed to follow its state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ZonePlayer {
    pub room_name: String,
    /// Unique device name, e.g. `uuid:RINCON_000E58A0123456`.
    pub udn: String,
    pub model_name: String,
    /// `http://host:port` of the device.
    pub base_url: String,
    pub transport_events: String,
    pub rendering_events: String,
}

#[derive(Debug, Deserialize)]
struct Root {
    device: DeviceDescription,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeviceDescription {
    #[serde(default)]
    device_type: String,
    #[serde(default)]
    friendly_name: String,
    #[serde(default)]
    manufacturer: String,
    #[serde(default)]
    model_name: String,
    #[serde(rename = "UDN", default)]
    udn: String,
    room_name: Option<String>,
    #[serde(default)]
    service_list: ServiceList,
    #[serde(default)]
    device_list: DeviceList,
}

#[derive(Debug, Default, Deserialize)]
struct ServiceList {
    #[serde(default)]
    service: Vec<Service>,
}

#[derive(Debug, Default, Deserialize)]
struct DeviceList {
    #[serde(default)]
    device: Vec<DeviceDescription>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Service {
    #[serde(default)]
    service_type: String,
    #[serde(rename = "eventSubURL")]
    event_sub_url: Option<String>,
}

impl DeviceDescription {
    fn is_zone_player(&self) -> bool {
        self.manufacturer.to_ascii_lowercase().contains("sonos")
            || self.device_type.contains("ZonePlayer")
    }

    /// Depth-first search for the event URL of a service type.
    fn event_path(&self, service: &str) -> Option<&str> {
        let needle = format!(":{service}:");
        self.service_list
            .service
            .iter()
            .find(|s| s.service_type.contains(&needle))
            .and_then(|s| s.event_sub_url.as_deref())
            .or_else(|| {
                self.device_list
                    .device
                    .iter()
                    .find_map(|device| device.event_path(service))
            })
    }
}

/// `scheme://host:port` of a description URL.
pub fn base_url(location: &str) -> Result<String> {
    let url = Url::parse(location)
        .map_err(|e| DiscoveryError::Parse(format!("bad LOCATION '{location}': {e}")))?;
    let host = url
        .host_str()
        .ok_or_else(|| DiscoveryError::Parse(format!("LOCATION '{location}' has no host")))?;
    Ok(match url.port_or_known_default() {
        Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
        None => format!("{}://{}", url.scheme(), host),
    })
}

fn join(base: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        path.to_string()
    } else if path.starts_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    }
}

/// Builds a [`ZonePlayer`] from the description XML served at `location`.
pub fn parse_zone_player(location: &str, xml: &str) -> Result<ZonePlayer> {
    let root: Root = quick_xml::de::from_str(xml)
        .map_err(|e| DiscoveryError::Parse(format!("failed to parse device description: {e}")))?;
    let device = root.device;
    if !device.is_zone_player() {
        return Err(DiscoveryError::InvalidDevice(format!(
            "{} ({}) is not a zone player",
            device.friendly_name, device.device_type
        )));
    }

    let base = base_url(location)?;
    let transport = device
        .event_path("AVTransport")
        .unwrap_or(DEFAULT_TRANSPORT_EVENTS);
    let rendering = device
        .event_path("RenderingControl")
        .unwrap_or(DEFAULT_RENDERING_EVENTS);

    Ok(ZonePlayer {
        room_name: device
            .room_name
            .clone()
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| device.friendly_name.clone()),
        udn: device.udn.clone(),
        model_name: device.model_name.clone(),
        transport_events: join(&base, transport),
        rendering_events: join(&base, rendering),
        base_url: base,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const LOCATION: &str = "http://192.168.1.20:1400/xml/device_description.xml";

    const NESTED: &str = r#"<?xml version="1.0" encoding="utf-8" ?>
<root xmlns="urn:schemas-upnp-org:device-1-0">
  <specVersion><major>1</major><minor>0</minor></specVersion>
  <device>
    <deviceType>urn:schemas-upnp-org:device:ZonePlayer:1</deviceType>
    <friendlyName>192.168.1.20 - Sonos One</friendlyName>
    <manufacturer>Sonos, Inc.</manufacturer>
    <modelName>Sonos One</modelName>
    <UDN>uuid:RINCON_000E58A0123456</UDN>
    <roomName>Kitchen</roomName>
    <serviceList>
      <service>
        <serviceType>urn:schemas-upnp-org:service:AlarmClock:1</serviceType>
        <eventSubURL>/AlarmClock/Event</eventSubURL>
      </service>
    </serviceList>
    <deviceList>
      <device>
        <deviceType>urn:schemas-upnp-org:device:MediaServer:1</deviceType>
        <friendlyName>Media Server</friendlyName>
        <manufacturer>Sonos, Inc.</manufacturer>
        <modelName>Sonos One</modelName>
        <UDN>uuid:RINCON_000E58A0123456_MS</UDN>
      </device>
      <device>
        <deviceType>urn:schemas-upnp-org:device:MediaRenderer:1</deviceType>
        <friendlyName>Kitchen - Sonos One Media Renderer</friendlyName>
        <manufacturer>Sonos, Inc.</manufacturer>
        <modelName>Sonos One</modelName>
        <UDN>uuid:RINCON_000E58A0123456_MR</UDN>
        <serviceList>
          <service>
            <serviceType>urn:schemas-upnp-org:service:RenderingControl:1</serviceType>
            <eventSubURL>/MediaRenderer/RenderingControl/Event</eventSubURL>
          </service>
          <service>
            <serviceType>urn:schemas-upnp-org:service:AVTransport:1</serviceType>
            <eventSubURL>/MediaRenderer/AVTransport/Event</eventSubURL>
          </service>
        </serviceList>
      </device>
    </deviceList>
  </device>
</root>"#;

    #[test]
    fn nested_renderer_services_are_found() {
        let player = parse_zone_player(LOCATION, NESTED).unwrap();
        assert_eq!(player.room_name, "Kitchen");
        assert_eq!(player.udn, "uuid:RINCON_000E58A0123456");
        assert_eq!(player.base_url, "http://192.168.1.20:1400");
        assert_eq!(player.transport_events, "http://192.168.1.20:1400/MediaRenderer/AVTransport/Event");
        assert_eq!(
            player.rendering_events,
            "http://192.168.1.20:1400/MediaRenderer/RenderingControl/Event"
        );
    }

    #[test]
    fn missing_services_fall_back_to_default_paths() {
        let xml = r#"<root><device>
            <deviceType>urn:schemas-upnp-org:device:ZonePlayer:1</deviceType>
            <friendlyName>Den</friendlyName>
            <manufacturer>Sonos, Inc.</manufacturer>
            <modelName>Play:1</modelName>
            <UDN>uuid:RINCON_X</UDN>
        </device></root>"#;
        let player = parse_zone_player(LOCATION, xml).unwrap();
        assert_eq!(player.room_name, "Den");
        assert!(player.transport_events.ends_with(DEFAULT_TRANSPORT_EVENTS));
        assert!(player.rendering_events.ends_with(DEFAULT_RENDERING_EVENTS));
    }

    #[test]
    fn other_devices_are_rejected() {
        let xml = r#"<root><device>
            <deviceType>urn:schemas-upnp-org:device:InternetGatewayDevice:1</deviceType>
            <friendlyName>Router</friendlyName>
            <manufacturer>Other Company</manufacturer>
            <modelName>R1</modelName>
            <UDN>uuid:ROUTER</UDN>
        </device></root>"#;
        assert!(matches!(
            parse_zone_player(LOCATION, xml),
            Err(DiscoveryError::InvalidDevice(_))
        ));
    }

    #[test]
    fn malformed_xml_is_a_parse_error() {
        assert!(matches!(
            parse_zone_player(LOCATION, "<root><device>"),
            Err(DiscoveryError::Parse(_))
        ));
    }

    #[rstest]
    #[case("http://192.168.1.20:1400/xml/device_description.xml", "http://192.168.1.20:1400")]
    #[case("http://10.0.0.5/desc.xml", "http://10.0.0.5:80")]
    fn base_url_keeps_scheme_host_and_port(#[case] location: &str, #[case] expected: &str) {
        assert_eq!(base_url(location).unwrap(), expected);
    }

    #[test]
    fn base_url_rejects_garbage() {
        assert!(base_url("not a url").is_err());
    }

    #[rstest]
    #[case("/Event", "http://h:1/Event")]
    #[case("Event", "http://h:1/Event")]
    #[case("http://other:2/Event", "http://other:2/Event")]
    fn join_event_paths(#[case] path: &str, #[case] expected: &str) {
        assert_eq!(join("http://h:1", path), expected);
    }
}
