//! DIDL-Lite track metadata as carried in `CurrentTrackMetaData`.

use crate::error::ParseResult;
use crate::xml_decode;
use serde::{Deserialize, Serialize};

/// `<DIDL-Lite><item>...</item></DIDL-Lite>`
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DidlLite {
    pub item: DidlItem,
}

impl DidlLite {
    pub fn from_xml(xml: &str) -> ParseResult<Self> {
        xml_decode::parse(xml)
    }
}

/// The single track item. Every child is optional; radio streams and line-in
/// sources routinely omit most of them.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct DidlItem {
    #[serde(rename(deserialize = "@id"), default)]
    pub id: String,

    #[serde(rename(deserialize = "@parentID"), default)]
    pub parent_id: String,

    #[serde(default)]
    pub res: Option<DidlResource>,

    #[serde(rename(deserialize = "albumArtURI"), default)]
    pub album_art_uri: Option<String>,

    #[serde(default)]
    pub class: Option<String>,

    #[serde(default)]
    pub title: Option<String>,

    #[serde(default)]
    pub creator: Option<String>,

    #[serde(default)]
    pub album: Option<String>,
}

/// `<res duration=".." protocolInfo="..">uri</res>`
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct DidlResource {
    #[serde(rename(deserialize = "@duration"), default)]
    pub duration: Option<String>,

    #[serde(rename(deserialize = "@protocolInfo"), default)]
    pub protocol_info: Option<String>,

    #[serde(rename(deserialize = "$value"), default)]
    pub uri: Option<String>,
}
