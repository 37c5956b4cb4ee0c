//! AVTransport `LastChange` payloads.

use crate::didl::DidlLite;
use crate::error::ParseResult;
use crate::xml_decode::{self, nested_val, val_attr};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
struct LastChange {
    #[serde(rename = "InstanceID")]
    instance: TransportEvent,
}

/// Transport state reported by a renderer. Sonos sends only the variables
/// that changed, so every field is optional.
///
/// ```xml
/// <Event xmlns="urn:schemas-upnp-org:metadata-1-0/AVT/">
///   <InstanceID val="0">
///     <TransportState val="PLAYING"/>
///     <CurrentTrackDuration val="0:03:57"/>
///     <CurrentTrackMetaData val="&lt;DIDL-Lite ..."/>
///   </InstanceID>
/// </Event>
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct TransportEvent {
    #[serde(rename(deserialize = "@val"), default)]
    pub instance_id: String,

    /// PLAYING, PAUSED_PLAYBACK, STOPPED or TRANSITIONING.
    #[serde(
        rename(deserialize = "TransportState"),
        default,
        deserialize_with = "val_attr",
        skip_serializing_if = "Option::is_none"
    )]
    pub transport_state: Option<String>,

    #[serde(
        rename(deserialize = "CurrentPlayMode"),
        default,
        deserialize_with = "val_attr",
        skip_serializing_if = "Option::is_none"
    )]
    pub current_play_mode: Option<String>,

    #[serde(
        rename(deserialize = "NumberOfTracks"),
        default,
        deserialize_with = "val_attr",
        skip_serializing_if = "Option::is_none"
    )]
    pub number_of_tracks: Option<String>,

    #[serde(
        rename(deserialize = "CurrentTrack"),
        default,
        deserialize_with = "val_attr",
        skip_serializing_if = "Option::is_none"
    )]
    pub current_track: Option<String>,

    #[serde(
        rename(deserialize = "CurrentTrackURI"),
        default,
        deserialize_with = "val_attr",
        skip_serializing_if = "Option::is_none"
    )]
    pub current_track_uri: Option<String>,

    /// `H:MM:SS`
    #[serde(
        rename(deserialize = "CurrentTrackDuration"),
        default,
        deserialize_with = "val_attr",
        skip_serializing_if = "Option::is_none"
    )]
    pub current_track_duration: Option<String>,

    #[serde(
        rename(deserialize = "CurrentTrackMetaData"),
        default,
        deserialize_with = "nested_val",
        skip_serializing_if = "Option::is_none"
    )]
    pub current_track_metadata: Option<DidlLite>,
}

impl TransportEvent {
    /// Decode the unescaped content of a `LastChange` variable.
    pub fn from_last_change(xml: &str) -> ParseResult<Self> {
        let last_change: LastChange = xml_decode::parse(xml)?;
        Ok(last_change.instance)
    }

    pub fn is_playing(&self) -> bool {
        self.transport_state.as_deref() == Some("PLAYING")
    }

    pub fn track_duration_secs(&self) -> Option<u64> {
        self.current_track_duration
            .as_deref()
            .and_then(parse_duration_secs)
    }

    pub fn track_title(&self) -> Option<&str> {
        self.current_track_metadata
            .as_ref()
            .and_then(|d| d.item.title.as_deref())
    }

    pub fn track_artist(&self) -> Option<&str> {
        self.current_track_metadata
            .as_ref()
            .and_then(|d| d.item.creator.as_deref())
    }

    pub fn track_album(&self) -> Option<&str> {
        self.current_track_metadata
            .as_ref()
            .and_then(|d| d.item.album.as_deref())
    }
}

/// `H:MM:SS`, `MM:SS` or `H:MM:SS.fff` to whole seconds. `NOT_IMPLEMENTED`
/// and other junk yield `None`.
pub fn parse_duration_secs(text: &str) -> Option<u64> {
    let mut total = 0u64;
    let mut parts = 0;
    for part in text.split(':') {
        let whole = part.split('.').next()?;
        let value: u64 = whole.parse().ok()?;
        total = total.checked_mul(60)?.checked_add(value)?;
        parts += 1;
    }
    (2..=3).contains(&parts).then_some(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const LAST_CHANGE: &str = r#"<Event xmlns="urn:schemas-upnp-org:metadata-1-0/AVT/" xmlns:r="urn:schemas-rinconnetworks-com:metadata-1-0/"><InstanceID val="0"><TransportState val="PAUSED_PLAYBACK"/><CurrentPlayMode val="REPEAT_ALL"/><NumberOfTracks val="12"/><CurrentTrack val="3"/><CurrentTrackURI val="http://10.0.0.2:3000/music/a.mp3"/><CurrentTrackDuration val="0:03:57"/><CurrentTrackMetaData val="&lt;DIDL-Lite xmlns:dc=&quot;http://purl.org/dc/elements/1.1/&quot; xmlns:upnp=&quot;urn:schemas-upnp-org:metadata-1-0/upnp/&quot;&gt;&lt;item id=&quot;-1&quot; parentID=&quot;-1&quot;&gt;&lt;dc:title&gt;Song2&lt;/dc:title&gt;&lt;dc:creator&gt;Artist A&lt;/dc:creator&gt;&lt;upnp:album&gt;AlbumX&lt;/upnp:album&gt;&lt;/item&gt;&lt;/DIDL-Lite&gt;"/><r:NextTrackURI val=""/></InstanceID></Event>"#;

    #[test]
    fn decodes_transport_change() {
        let event = TransportEvent::from_last_change(LAST_CHANGE).unwrap();
        assert_eq!(event.instance_id, "0");
        assert_eq!(event.transport_state.as_deref(), Some("PAUSED_PLAYBACK"));
        assert!(!event.is_playing());
        assert_eq!(event.current_play_mode.as_deref(), Some("REPEAT_ALL"));
        assert_eq!(event.current_track.as_deref(), Some("3"));
        assert_eq!(event.track_duration_secs(), Some(237));
        assert_eq!(event.track_title(), Some("Song2"));
        assert_eq!(event.track_artist(), Some("Artist A"));
        assert_eq!(event.track_album(), Some("AlbumX"));
    }

    #[test]
    fn partial_change_leaves_other_fields_empty() {
        let xml = r#"<Event xmlns="urn:schemas-upnp-org:metadata-1-0/AVT/"><InstanceID val="0"><TransportState val="PLAYING"/></InstanceID></Event>"#;
        let event = TransportEvent::from_last_change(xml).unwrap();
        assert!(event.is_playing());
        assert_eq!(event.current_track_metadata, None);
        assert_eq!(event.track_duration_secs(), None);
    }

    #[test]
    fn unparseable_metadata_is_dropped_not_fatal() {
        let xml = r#"<Event><InstanceID val="0"><TransportState val="STOPPED"/><CurrentTrackMetaData val="NOT_IMPLEMENTED"/></InstanceID></Event>"#;
        let event = TransportEvent::from_last_change(xml).unwrap();
        assert_eq!(event.transport_state.as_deref(), Some("STOPPED"));
        assert_eq!(event.current_track_metadata, None);
    }

    #[test]
    fn serializes_without_empty_fields() {
        let xml = r#"<Event><InstanceID val="0"><TransportState val="PLAYING"/></InstanceID></Event>"#;
        let event = TransportEvent::from_last_change(xml).unwrap();
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["transport_state"], "PLAYING");
        assert!(json.get("current_track_uri").is_none());
    }

    #[rstest]
    #[case("0:03:57", Some(237))]
    #[case("1:00:00", Some(3600))]
    #[case("04:05", Some(245))]
    #[case("0:00:01.500", Some(1))]
    #[case("NOT_IMPLEMENTED", None)]
    #[case("", None)]
    #[case("1:2:3:4", None)]
    fn duration_parsing(#[case] input: &str, #[case] expected: Option<u64>) {
        assert_eq!(parse_duration_secs(input), expected);
    }
}
