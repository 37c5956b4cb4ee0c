//! The GENA notification envelope.
//!
//! ```xml
//! <e:propertyset xmlns:e="urn:schemas-upnp-org:event-1-0">
//!   <e:property>
//!     <LastChange>&lt;Event ...&gt;...&lt;/Event&gt;</LastChange>
//!   </e:property>
//! </e:propertyset>
//! ```
//!
//! Each property wraps exactly one state variable element. The variable name
//! varies per service, so the envelope is walked with the streaming reader
//! instead of a fixed serde shape.

use crate::error::{ParseError, ParseResult};
use crate::xml_decode::utf8;
use quick_xml::events::Event;
use quick_xml::Reader;

/// One `<e:property>` entry: the state variable name and its unescaped text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    pub name: String,
    pub value: String,
}

/// A decoded notification body, properties kept in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertySet {
    pub properties: Vec<Property>,
}

impl PropertySet {
    /// Decode a NOTIFY body.
    pub fn from_xml(xml: &str) -> ParseResult<Self> {
        let mut reader = Reader::from_str(xml);
        reader.trim_text(true);

        let mut set = PropertySet::default();
        let mut depth = 0usize;
        let mut saw_root = false;
        // (variable name, accumulated text, depth of the variable element)
        let mut current: Option<(String, String, usize)> = None;

        loop {
            match reader.read_event()? {
                Event::Start(start) => {
                    depth += 1;
                    let name = utf8(start.local_name().into_inner())?;
                    match depth {
                        1 => {
                            if name != "propertyset" {
                                return Err(ParseError::InvalidStructure(format!(
                                    "expected <propertyset>, found <{name}>"
                                )));
                            }
                            saw_root = true;
                        }
                        3 if current.is_none() => current = Some((name, String::new(), depth)),
                        _ => {}
                    }
                }
                Event::Empty(start) => {
                    let name = utf8(start.local_name().into_inner())?;
                    if depth == 0 {
                        if name != "propertyset" {
                            return Err(ParseError::InvalidStructure(format!(
                                "expected <propertyset>, found <{name}/>"
                            )));
                        }
                        saw_root = true;
                    }
                    if depth == 2 && current.is_none() {
                        set.properties.push(Property {
                            name,
                            value: String::new(),
                        });
                    }
                }
                // Only the variable's own text; markup nested inside it is
                // not part of the value.
                Event::Text(text) => {
                    if let Some((_, value, d)) = current.as_mut() {
                        if *d == depth {
                            value.push_str(&text.unescape()?);
                        }
                    }
                }
                Event::CData(data) => {
                    if let Some((_, value, d)) = current.as_mut() {
                        if *d == depth {
                            value.push_str(&utf8(&data.into_inner())?);
                        }
                    }
                }
                Event::End(_) => {
                    if matches!(&current, Some((_, _, d)) if *d == depth) {
                        if let Some((name, value, _)) = current.take() {
                            set.properties.push(Property { name, value });
                        }
                    }
                    depth = depth.saturating_sub(1);
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !saw_root {
            return Err(ParseError::InvalidStructure("empty document".to_string()));
        }
        if depth != 0 {
            return Err(ParseError::InvalidStructure(
                "document ended inside an open element".to_string(),
            ));
        }
        Ok(set)
    }

    /// Text of the first property, the only one the gateway forwards.
    pub fn first_value(&self) -> Option<&str> {
        self.properties.first().map(|p| p.value.as_str())
    }

    /// Look a property up by variable name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.value.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_escaped_last_change() {
        let xml = r#"<e:propertyset xmlns:e="urn:schemas-upnp-org:event-1-0"><e:property><LastChange>&lt;Event&gt;&lt;InstanceID val=&quot;0&quot;/&gt;&lt;/Event&gt;</LastChange></e:property></e:propertyset>"#;
        let set = PropertySet::from_xml(xml).unwrap();
        assert_eq!(set.properties.len(), 1);
        assert_eq!(set.properties[0].name, "LastChange");
        assert_eq!(
            set.first_value(),
            Some(r#"<Event><InstanceID val="0"/></Event>"#)
        );
    }

    #[test]
    fn keeps_property_order() {
        let xml = r#"<e:propertyset xmlns:e="urn:schemas-upnp-org:event-1-0">
            <e:property><ZoneName>Kitchen</ZoneName></e:property>
            <e:property><Icon/></e:property>
            <e:property><Volume>12</Volume></e:property>
        </e:propertyset>"#;
        let set = PropertySet::from_xml(xml).unwrap();
        let names: Vec<_> = set.properties.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["ZoneName", "Icon", "Volume"]);
        assert_eq!(set.first_value(), Some("Kitchen"));
        assert_eq!(set.get("Icon"), Some(""));
        assert_eq!(set.get("Volume"), Some("12"));
    }

    #[test]
    fn empty_property_set() {
        let set = PropertySet::from_xml(r#"<e:propertyset xmlns:e="x"></e:propertyset>"#).unwrap();
        assert!(set.is_empty());
        assert_eq!(set.first_value(), None);
    }

    #[test]
    fn cdata_payload() {
        let xml = "<propertyset><property><LastChange><![CDATA[<Event/>]]></LastChange></property></propertyset>";
        let set = PropertySet::from_xml(xml).unwrap();
        assert_eq!(set.first_value(), Some("<Event/>"));
    }

    #[test]
    fn nested_element_text_is_not_part_of_the_value() {
        let xml = "<propertyset><property><Volume>12<Channel>Master</Channel></Volume></property></propertyset>";
        let set = PropertySet::from_xml(xml).unwrap();
        assert_eq!(set.get("Volume"), Some("12"));
    }

    #[test]
    fn rejects_wrong_root() {
        let err = PropertySet::from_xml("<html><body/></html>").unwrap_err();
        assert!(matches!(err, ParseError::InvalidStructure(_)));
    }

    #[test]
    fn rejects_garbage() {
        assert!(PropertySet::from_xml("").is_err());
        assert!(PropertySet::from_xml("<propertyset><property>").is_err());
        assert!(PropertySet::from_xml("<propertyset></property>").is_err());
    }
}
