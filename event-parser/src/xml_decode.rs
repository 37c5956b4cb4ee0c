//! Shared decoding helpers for UPnP XML.
//!
//! Renderer payloads arrive with namespace prefixes (`e:`, `dc:`, `upnp:`) and
//! with XML documents escaped inside attribute values. Everything here exists
//! so the typed structs elsewhere in the crate can be plain serde definitions.

use crate::error::{ParseError, ParseResult};
use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::name::QName;
use quick_xml::{Reader, Writer};
use serde::de::{DeserializeOwned, Deserializer};
use serde::Deserialize;

/// Deserialize `xml` into `T` after removing namespace prefixes.
pub fn parse<T: DeserializeOwned>(xml: &str) -> ParseResult<T> {
    let stripped = strip_namespaces(xml)?;
    Ok(quick_xml::de::from_str(&stripped)?)
}

/// Rewrite every element and attribute name to its local part and drop
/// `xmlns` declarations.
///
/// `<e:propertyset xmlns:e="..."><dc:title>x</dc:title></e:propertyset>`
/// becomes `<propertyset><title>x</title></propertyset>`. Text and attribute
/// values are copied through without re-escaping.
pub fn strip_namespaces(xml: &str) -> ParseResult<String> {
    let mut reader = Reader::from_str(xml);
    let mut writer = Writer::new(Vec::with_capacity(xml.len()));

    loop {
        match reader.read_event()? {
            Event::Start(start) => {
                writer
                    .write_event(Event::Start(local_start(&start)?))
                    .map_err(write_err)?;
            }
            Event::Empty(start) => {
                writer
                    .write_event(Event::Empty(local_start(&start)?))
                    .map_err(write_err)?;
            }
            Event::End(end) => {
                let name = utf8(end.local_name().into_inner())?;
                writer
                    .write_event(Event::End(BytesEnd::new(name)))
                    .map_err(write_err)?;
            }
            Event::Eof => break,
            other => writer.write_event(other).map_err(write_err)?,
        }
    }

    String::from_utf8(writer.into_inner())
        .map_err(|e| ParseError::Xml(format!("invalid UTF-8 after namespace strip: {e}")))
}

fn write_err<E: std::fmt::Display>(err: E) -> ParseError {
    ParseError::Xml(err.to_string())
}

fn local_start<'a>(start: &'a BytesStart<'a>) -> ParseResult<BytesStart<'static>> {
    let name = utf8(start.local_name().into_inner())?;
    let mut out = BytesStart::new(name);
    for attr in start.attributes() {
        let attr = attr.map_err(|e| ParseError::Xml(e.to_string()))?;
        if attr.key.as_namespace_binding().is_some() {
            continue;
        }
        out.push_attribute(Attribute {
            key: QName(attr.key.local_name().into_inner()),
            value: attr.value.clone(),
        });
    }
    Ok(out)
}

pub(crate) fn utf8(bytes: &[u8]) -> ParseResult<String> {
    std::str::from_utf8(bytes)
        .map(str::to_owned)
        .map_err(|e| ParseError::Xml(e.to_string()))
}

/// An empty element whose payload lives in a `val` attribute, e.g.
/// `<TransportState val="PLAYING"/>`.
#[derive(Debug, Deserialize, Default)]
struct Val {
    #[serde(rename = "@val", default)]
    val: String,
}

/// `deserialize_with` helper mapping `<X val="..."/>` to `Option<String>`,
/// treating an empty attribute as absent.
pub fn val_attr<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Val::deserialize(deserializer)?;
    Ok(Some(raw.val).filter(|v| !v.is_empty()))
}

/// `deserialize_with` helper for `val` attributes that carry an escaped XML
/// document. Empty, `NOT_IMPLEMENTED` and undecodable values all become
/// `None`; a broken nested document must not poison the outer event.
pub fn nested_val<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let raw = Val::deserialize(deserializer)?;
    if raw.val.is_empty() || raw.val == "NOT_IMPLEMENTED" {
        return Ok(None);
    }
    Ok(parse::<T>(&raw.val).ok())
}
