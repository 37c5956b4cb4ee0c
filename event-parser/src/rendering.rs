//! RenderingControl `LastChange` payloads.

use crate::error::ParseResult;
use crate::xml_decode::{self, val_attr};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
struct LastChange {
    #[serde(rename = "InstanceID")]
    instance: RenderingEvent,
}

/// A per-channel variable such as `<Volume channel="Master" val="21"/>`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ChannelValue {
    #[serde(rename(deserialize = "@channel"), default)]
    pub channel: String,
    #[serde(rename(deserialize = "@val"), default)]
    pub value: String,
}

/// Volume and tone state reported by a renderer.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct RenderingEvent {
    #[serde(rename(deserialize = "@val"), default)]
    pub instance_id: String,

    #[serde(rename(deserialize = "Volume"), default, skip_serializing_if = "Vec::is_empty")]
    pub volume: Vec<ChannelValue>,

    #[serde(rename(deserialize = "Mute"), default, skip_serializing_if = "Vec::is_empty")]
    pub mute: Vec<ChannelValue>,

    #[serde(rename(deserialize = "Loudness"), default, skip_serializing_if = "Vec::is_empty")]
    pub loudness: Vec<ChannelValue>,

    #[serde(
        rename(deserialize = "Bass"),
        default,
        deserialize_with = "val_attr",
        skip_serializing_if = "Option::is_none"
    )]
    pub bass: Option<String>,

    #[serde(
        rename(deserialize = "Treble"),
        default,
        deserialize_with = "val_attr",
        skip_serializing_if = "Option::is_none"
    )]
    pub treble: Option<String>,
}

impl RenderingEvent {
    pub fn from_last_change(xml: &str) -> ParseResult<Self> {
        let last_change: LastChange = xml_decode::parse(xml)?;
        Ok(last_change.instance)
    }

    /// Master channel volume, 0-100.
    pub fn master_volume(&self) -> Option<u8> {
        master(&self.volume).and_then(|v| v.parse().ok())
    }

    /// Master channel mute flag, if the event carried one.
    pub fn is_muted(&self) -> Option<bool> {
        master(&self.mute).map(|v| v == "1")
    }
}

fn master(values: &[ChannelValue]) -> Option<&str> {
    values
        .iter()
        .find(|v| v.channel == "Master")
        .map(|v| v.value.as_str())
}
