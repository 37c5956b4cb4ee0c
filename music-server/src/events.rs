//! Live renderer events for one room.
//!
//! A room stream owns one registration on each of the room's event
//! endpoints. Dropping the stream drops both handles, which releases the
//! registrations and, for the last listener, cancels the device
//! subscription.

use std::sync::Arc;

use event_parser::{EventKind, RendererEvent};
use futures::stream::{self, Stream, StreamExt};
use subscriptions::{EventPayload, Registry, Subscription};
use tracing::debug;
use zone_discovery::ZonePlayer;

/// Merged transport and rendering events for `player`, decoded. Payloads
/// that do not decode are skipped.
pub fn room_events(
    registry: &Arc<Registry>,
    player: &ZonePlayer,
) -> subscriptions::Result<impl Stream<Item = RendererEvent> + Send + 'static> {
    let transport = registry.subscribe(&player.transport_events)?;
    let rendering = registry.subscribe(&player.rendering_events)?;
    debug!(room = %player.room_name, "opened room event stream");

    Ok(stream::select(decoded(transport), decoded(rendering)))
}

/// SSE event name for a decoded payload.
pub fn event_name(event: &RendererEvent) -> &'static str {
    match event.kind() {
        EventKind::Transport => "transport",
        EventKind::Rendering => "rendering",
    }
}

fn payloads(subscription: Subscription) -> impl Stream<Item = EventPayload> + Send + 'static {
    stream::unfold(subscription, |mut subscription| async move {
        let payload = subscription.recv().await?;
        Some((payload, subscription))
    })
}

fn decoded(subscription: Subscription) -> impl Stream<Item = RendererEvent> + Send + 'static {
    payloads(subscription).filter_map(|payload| async move {
        match RendererEvent::decode(&payload) {
            Ok(event) => Some(event),
            Err(e) => {
                debug!(error = %e, "skipping undecodable event payload");
                None
            }
        }
    })
}
