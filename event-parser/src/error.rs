//! Error types for event decoding.

use thiserror::Error;

/// Errors that can occur while decoding a notification or event payload.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    /// The document is not well-formed XML.
    #[error("malformed XML: {0}")]
    Xml(String),

    /// The XML was well-formed but did not match the expected shape.
    #[error("XML deserialization failed: {0}")]
    Deserialize(String),

    /// A required element was missing or the root element was wrong.
    #[error("invalid document structure: {0}")]
    InvalidStructure(String),

    /// The LastChange payload belongs to a service we do not decode.
    #[error("unsupported event payload: {0}")]
    UnsupportedEvent(String),
}

impl From<quick_xml::Error> for ParseError {
    fn from(err: quick_xml::Error) -> Self {
        ParseError::Xml(err.to_string())
    }
}

impl From<quick_xml::DeError> for ParseError {
    fn from(err: quick_xml::DeError) -> Self {
        ParseError::Deserialize(err.to_string())
    }
}

/// Result type alias for decoding operations.
pub type ParseResult<T> = Result<T, ParseError>;
