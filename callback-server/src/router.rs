//! Turns raw NOTIFY bodies into payloads for the subscription registry.

use event_parser::PropertySet;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

/// One event ready for the registry: the lease identifier from the `SID`
/// header and the text of the envelope's first property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationPayload {
    pub subscription_id: String,
    pub payload: String,
}

/// What happened to a single notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Handed to the registry channel.
    Forwarded,
    /// Well-formed envelope with no properties.
    Empty,
    /// Body was not a property set.
    Malformed,
    /// Nobody is listening on the channel any more.
    Closed,
}

/// Decodes envelopes and forwards them, in arrival order, on an unbounded
/// channel. It does not know which identifiers are live; the registry
/// drops the ones it does not recognise.
#[derive(Clone)]
pub struct EventRouter {
    event_sender: mpsc::UnboundedSender<NotificationPayload>,
}

impl EventRouter {
    pub fn new(event_sender: mpsc::UnboundedSender<NotificationPayload>) -> Self {
        Self { event_sender }
    }

    pub fn route(&self, subscription_id: &str, body: &[u8]) -> RouteOutcome {
        let text = match std::str::from_utf8(body) {
            Ok(text) => text,
            Err(e) => {
                warn!(sid = %subscription_id, error = %e, "NOTIFY body is not UTF-8");
                return RouteOutcome::Malformed;
            }
        };

        let envelope = match PropertySet::from_xml(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(sid = %subscription_id, error = %e, "discarding unparseable NOTIFY body");
                return RouteOutcome::Malformed;
            }
        };

        let Some(first) = envelope.first_value() else {
            debug!(sid = %subscription_id, "NOTIFY carried no properties");
            return RouteOutcome::Empty;
        };
        if envelope.properties.len() > 1 {
            trace!(
                sid = %subscription_id,
                ignored = envelope.properties.len() - 1,
                "forwarding first property only"
            );
        }

        let payload = NotificationPayload {
            subscription_id: subscription_id.to_string(),
            payload: first.to_string(),
        };
        match self.event_sender.send(payload) {
            Ok(()) => RouteOutcome::Forwarded,
            Err(_) => {
                debug!(sid = %subscription_id, "notification channel closed");
                RouteOutcome::Closed
            }
        }
    }
}
