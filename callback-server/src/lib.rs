//! Inbound side of UPnP eventing.
//!
//! Renderers deliver state changes by sending `NOTIFY` requests to the
//! callback URL given at subscription time. This crate owns that listener:
//!
//! - [`CallbackServer`] binds a port, validates GENA headers and always
//!   acknowledges well-formed notifications.
//! - [`EventRouter`] decodes the `e:propertyset` envelope and forwards the
//!   first property's text.
//! - [`NotificationPayload`] is what comes out the other end: the `SID`
//!   header plus that text.
//!
//! Matching identifiers to subscriptions is not done here. Whoever owns the
//! receiving end of the channel decides what an identifier means.

mod error;
pub mod router;
mod server;

pub use error::{CallbackError, Result};
pub use router::{EventRouter, NotificationPayload, RouteOutcome};
pub use server::CallbackServer;
