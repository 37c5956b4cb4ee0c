//! # event-parser
//!
//! Decoding for everything a renderer pushes at us over GENA:
//!
//! - [`PropertySet`]: the `e:propertyset` NOTIFY envelope.
//! - [`RendererEvent`]: a typed `LastChange` payload, either
//!   [`TransportEvent`] (AVTransport) or [`RenderingEvent`] (RenderingControl).
//! - [`DidlLite`]: track metadata nested inside transport events.
//!
//! ```rust,ignore
//! use event_parser::{PropertySet, RendererEvent};
//!
//! let envelope = PropertySet::from_xml(body)?;
//! if let Some(last_change) = envelope.first_value() {
//!     let event = RendererEvent::decode(last_change)?;
//! }
//! ```

pub mod didl;
pub mod envelope;
pub mod error;
pub mod event;
pub mod rendering;
pub mod transport;
pub mod xml_decode;

pub use didl::{DidlItem, DidlLite, DidlResource};
pub use envelope::{Property, PropertySet};
pub use error::{ParseError, ParseResult};
pub use event::{EventKind, RendererEvent};
pub use rendering::{ChannelValue, RenderingEvent};
pub use transport::{parse_duration_secs, TransportEvent};
