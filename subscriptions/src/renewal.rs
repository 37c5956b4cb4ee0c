//! Per-endpoint renew loop.
//!
//! ```text
//! subscribing --ok--> active --timer--> renewing --ok--> active ...
//!      |                 |                  |
//!      +--fail--+        +--shutdown--+     +--fail--+
//!               v                     v              v
//!          (abandon)            UNSUBSCRIBE    (abandon) + UNSUBSCRIBE
//! ```
//!
//! The loop owns no registry state. It performs the network calls and hands
//! results back through [`Registry::apply_lease`], which tells it whether the
//! entry it serves still exists. A stale result means the last listener left
//! while a request was in flight; the lease just obtained is released and the
//! loop ends.

use std::sync::Arc;

use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use url::Url;

use crate::client::Lease;
use crate::registry::{LeaseOutcome, Registry};

pub(crate) async fn run(
    registry: Arc<Registry>,
    endpoint: Url,
    generation: u64,
    mut shutdown: oneshot::Receiver<()>,
) {
    let requested = registry.lease_request();

    let mut lease = match registry
        .client
        .subscribe(&endpoint, &registry.config.callback_url, requested)
        .await
    {
        Ok(lease) => lease,
        Err(e) => {
            warn!(%endpoint, error = %e, "SUBSCRIBE failed");
            registry.abandon(&endpoint, generation);
            return;
        }
    };

    loop {
        if registry.apply_lease(&endpoint, generation, &lease) == LeaseOutcome::Stale {
            debug!(%endpoint, sid = %lease.sid, "subscription no longer wanted");
            release(&registry, &endpoint, &lease).await;
            return;
        }

        let delay = registry.config.renewal_delay(lease.timeout);
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = &mut shutdown => {
                release(&registry, &endpoint, &lease).await;
                return;
            }
        }

        if !registry.mark_renewing(&endpoint, generation) {
            release(&registry, &endpoint, &lease).await;
            return;
        }

        lease = match registry.client.renew(&endpoint, &lease.sid, requested).await {
            Ok(renewed) => renewed,
            Err(e) => {
                warn!(%endpoint, sid = %lease.sid, error = %e, "renewal failed, tearing down");
                registry.abandon(&endpoint, generation);
                release(&registry, &endpoint, &lease).await;
                return;
            }
        };
    }
}

/// Best-effort UNSUBSCRIBE. Failures are logged and never retried.
async fn release(registry: &Registry, endpoint: &Url, lease: &Lease) {
    match registry.client.unsubscribe(endpoint, &lease.sid).await {
        Ok(()) => info!(%endpoint, sid = %lease.sid, "unsubscribed"),
        Err(e) => warn!(%endpoint, sid = %lease.sid, error = %e, "UNSUBSCRIBE failed"),
    }
}
