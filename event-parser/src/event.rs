//! Service-agnostic renderer events.

use crate::error::{ParseError, ParseResult};
use crate::rendering::RenderingEvent;
use crate::transport::TransportEvent;
use crate::xml_decode::utf8;
use quick_xml::events::Event;
use quick_xml::Reader;
use serde::Serialize;

const AVT_NAMESPACE: &str = "urn:schemas-upnp-org:metadata-1-0/AVT/";
const RCS_NAMESPACE: &str = "urn:schemas-upnp-org:metadata-1-0/RCS/";

/// Which service produced a `LastChange` document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Transport,
    Rendering,
}

/// A decoded `LastChange` payload from either renderer service.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "service", rename_all = "snake_case")]
pub enum RendererEvent {
    Transport(TransportEvent),
    Rendering(RenderingEvent),
}

impl RendererEvent {
    /// Decode the text of a `LastChange` property.
    pub fn decode(last_change: &str) -> ParseResult<Self> {
        match sniff_kind(last_change)? {
            Some(EventKind::Transport) => {
                TransportEvent::from_last_change(last_change).map(RendererEvent::Transport)
            }
            Some(EventKind::Rendering) => {
                RenderingEvent::from_last_change(last_change).map(RendererEvent::Rendering)
            }
            None => Err(ParseError::UnsupportedEvent(
                "no AVTransport or RenderingControl variables".to_string(),
            )),
        }
    }

    pub fn kind(&self) -> EventKind {
        match self {
            RendererEvent::Transport(_) => EventKind::Transport,
            RendererEvent::Rendering(_) => EventKind::Rendering,
        }
    }
}

/// Pick the service from the root namespace, falling back to the first
/// recognisable state variable when the namespace is missing.
fn sniff_kind(xml: &str) -> ParseResult<Option<EventKind>> {
    let mut reader = Reader::from_str(xml);
    loop {
        let start = match reader.read_event()? {
            Event::Start(start) | Event::Empty(start) => start,
            Event::Eof => return Ok(None),
            _ => continue,
        };

        let name = utf8(start.local_name().into_inner())?;
        if name == "Event" {
            for attr in start.attributes().flatten() {
                if attr.key.as_ref() == b"xmlns" {
                    match attr.value.as_ref() {
                        v if v == AVT_NAMESPACE.as_bytes() => return Ok(Some(EventKind::Transport)),
                        v if v == RCS_NAMESPACE.as_bytes() => return Ok(Some(EventKind::Rendering)),
                        _ => {}
                    }
                }
            }
            continue;
        }

        match name.as_str() {
            "TransportState" | "CurrentTrackURI" | "CurrentTrackMetaData"
            | "CurrentTrackDuration" | "CurrentPlayMode" => return Ok(Some(EventKind::Transport)),
            "Volume" | "Mute" | "Bass" | "Treble" | "Loudness" => {
                return Ok(Some(EventKind::Rendering))
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_variant_from_namespace() {
        let avt = r#"<Event xmlns="urn:schemas-upnp-org:metadata-1-0/AVT/"><InstanceID val="0"><TransportState val="PLAYING"/></InstanceID></Event>"#;
        let event = RendererEvent::decode(avt).unwrap();
        assert_eq!(event.kind(), EventKind::Transport);

        let rcs = r#"<Event xmlns="urn:schemas-upnp-org:metadata-1-0/RCS/"><InstanceID val="0"><Volume channel="Master" val="9"/></InstanceID></Event>"#;
        match RendererEvent::decode(rcs).unwrap() {
            RendererEvent::Rendering(r) => assert_eq!(r.master_volume(), Some(9)),
            other => panic!("expected rendering event, got {other:?}"),
        }
    }

    #[test]
    fn falls_back_to_variable_names() {
        let xml = r#"<Event><InstanceID val="0"><Mute channel="Master" val="1"/></InstanceID></Event>"#;
        assert_eq!(
            RendererEvent::decode(xml).unwrap().kind(),
            EventKind::Rendering
        );
    }

    #[test]
    fn unknown_service_is_unsupported() {
        let xml = r#"<Event xmlns="urn:schemas-upnp-org:metadata-1-0/Queue/"><QueueID val="0"><UpdateID val="3"/></QueueID></Event>"#;
        assert!(matches!(
            RendererEvent::decode(xml),
            Err(ParseError::UnsupportedEvent(_))
        ));
    }

    #[test]
    fn serializes_with_service_tag() {
        let xml = r#"<Event xmlns="urn:schemas-upnp-org:metadata-1-0/AVT/"><InstanceID val="0"><TransportState val="STOPPED"/></InstanceID></Event>"#;
        let json = serde_json::to_value(RendererEvent::decode(xml).unwrap()).unwrap();
        assert_eq!(json["service"], "transport");
        assert_eq!(json["transport_state"], "STOPPED");
    }
}
