//! The subscription registry.
//!
//! One [`Registry`] owns every remote subscription the process holds. Each
//! distinct event endpoint gets at most one lease, no matter how many local
//! listeners are interested in it; the lease lives exactly as long as the
//! endpoint has at least one listener.
//!
//! All mutable state sits behind a single lock. Critical sections only touch
//! maps and vectors and push onto unbounded channels, so nothing ever waits
//! on the network or on a listener while holding it. Network calls are made
//! by the per-endpoint renew loop (see [`crate::renewal`]), which applies
//! their results back under the lock and uses a generation number to notice
//! when the entry it was working for has gone away in the meantime.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use callback_server::NotificationPayload;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::client::{GenaClient, Lease};
use crate::config::RegistryConfig;
use crate::error::{Result, SubscriptionError};
use crate::renewal;

/// Events are shared between listeners, never copied per listener.
pub type EventPayload = Arc<str>;

/// Identifies one registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

/// Where an endpoint's subscription is in its lifecycle. Endpoints with no
/// listeners have no state at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    /// Initial SUBSCRIBE in flight.
    Subscribing,
    /// Lease held, waiting for the renewal time.
    Active,
    /// Renewal SUBSCRIBE in flight.
    Renewing,
}

struct Listener {
    id: ListenerId,
    sender: mpsc::UnboundedSender<EventPayload>,
}

struct Entry {
    generation: u64,
    state: SubscriptionState,
    sid: Option<String>,
    previous_sid: Option<String>,
    last_event: Option<EventPayload>,
    /// Registration order is delivery order.
    listeners: Vec<Listener>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl Entry {
    fn sids(&self) -> impl Iterator<Item = &String> {
        self.sid.iter().chain(self.previous_sid.iter())
    }
}

#[derive(Default)]
struct State {
    endpoints: HashMap<Url, Entry>,
    /// Every routable identifier, current and retained, to its endpoint.
    sids: HashMap<String, Url>,
    next_generation: u64,
    closed: bool,
}

impl State {
    /// Detach an entry and every identifier that routes to it.
    fn remove_entry(&mut self, endpoint: &Url) -> Option<Entry> {
        let entry = self.endpoints.remove(endpoint)?;
        for sid in entry.sids() {
            self.sids.remove(sid);
        }
        Some(entry)
    }
}

/// Result of applying a lease obtained by a renew loop.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum LeaseOutcome {
    Applied,
    /// The entry was torn down or replaced while the request was in flight.
    Stale,
}

/// Owner of all GENA subscriptions.
///
/// Construct once and share behind the returned `Arc`.
pub struct Registry {
    pub(crate) client: Arc<dyn GenaClient>,
    pub(crate) config: RegistryConfig,
    state: Mutex<State>,
    next_listener: AtomicU64,
    runtime: Handle,
}

impl Registry {
    /// # Panics
    ///
    /// Must be called from within a Tokio runtime; renew loops are spawned
    /// onto it.
    pub fn new(client: Arc<dyn GenaClient>, config: RegistryConfig) -> Arc<Self> {
        Arc::new(Self {
            client,
            config,
            state: Mutex::new(State::default()),
            next_listener: AtomicU64::new(1),
            runtime: Handle::current(),
        })
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Register a listener for `endpoint`.
    ///
    /// Returns immediately. The first listener for an endpoint starts its
    /// renew loop; later ones join the existing subscription. If the endpoint
    /// already has a cached event it is queued on the new receiver before the
    /// listener becomes visible to delivery, so it is always received first.
    pub fn subscribe(self: &Arc<Self>, endpoint: &str) -> Result<Subscription> {
        let endpoint = parse_endpoint(endpoint)?;
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        let (sender, events) = mpsc::unbounded_channel();

        let mut state = self.state.lock();
        if state.closed {
            return Err(SubscriptionError::ShuttingDown);
        }

        if let Some(entry) = state.endpoints.get_mut(&endpoint) {
            if let Some(last) = &entry.last_event {
                let _ = sender.send(Arc::clone(last));
            }
            entry.listeners.push(Listener { id, sender });
            debug!(%endpoint, listener = %id, listeners = entry.listeners.len(), "joined existing subscription");
        } else {
            let generation = state.next_generation;
            state.next_generation += 1;

            let (shutdown_tx, shutdown_rx) = oneshot::channel();
            let task = self.runtime.spawn(renewal::run(
                Arc::clone(self),
                endpoint.clone(),
                generation,
                shutdown_rx,
            ));
            state.endpoints.insert(
                endpoint.clone(),
                Entry {
                    generation,
                    state: SubscriptionState::Subscribing,
                    sid: None,
                    previous_sid: None,
                    last_event: None,
                    listeners: vec![Listener { id, sender }],
                    shutdown: Some(shutdown_tx),
                    task: Some(task),
                },
            );
            info!(%endpoint, listener = %id, "first listener, subscribing");
        }
        drop(state);

        Ok(Subscription {
            handle: SubscriptionHandle {
                registry: Arc::downgrade(self),
                endpoint,
                id,
                released: false,
            },
            events,
        })
    }

    /// Callback flavour of [`Registry::subscribe`].
    ///
    /// Anything already queued for the new listener (the cached event) is
    /// passed to `on_event` before this returns; later events are delivered
    /// from a dedicated task so a slow callback only delays itself.
    pub fn subscribe_with<F>(self: &Arc<Self>, endpoint: &str, mut on_event: F) -> Result<SubscriptionHandle>
    where
        F: FnMut(EventPayload) + Send + 'static,
    {
        let Subscription { handle, mut events } = self.subscribe(endpoint)?;
        while let Ok(event) = events.try_recv() {
            on_event(event);
        }
        self.runtime.spawn(async move {
            while let Some(event) = events.recv().await {
                on_event(event);
            }
        });
        Ok(handle)
    }

    /// Remove one listener. The remote subscription is torn down only when
    /// this was the endpoint's last listener.
    pub fn unsubscribe(&self, mut handle: SubscriptionHandle) -> Result<()> {
        handle.released = true;
        if self.remove_listener(&handle.endpoint, handle.id) {
            Ok(())
        } else {
            Err(SubscriptionError::UnknownRegistration(handle.id))
        }
    }

    fn remove_listener(&self, endpoint: &Url, id: ListenerId) -> bool {
        let mut state = self.state.lock();
        let Some(entry) = state.endpoints.get_mut(endpoint) else {
            return false;
        };
        let before = entry.listeners.len();
        entry.listeners.retain(|l| l.id != id);
        if entry.listeners.len() == before {
            return false;
        }

        debug!(%endpoint, listener = %id, remaining = entry.listeners.len(), "listener removed");
        if entry.listeners.is_empty() {
            if let Some(mut entry) = state.remove_entry(endpoint) {
                info!(%endpoint, sid = ?entry.sid, "last listener gone, tearing down");
                if let Some(shutdown) = entry.shutdown.take() {
                    let _ = shutdown.send(());
                }
            }
        }
        true
    }

    /// Route one event to the endpoint owning `sid`.
    ///
    /// Records it as the endpoint's latest event and queues it for every
    /// listener in registration order. Returns false, dropping the event,
    /// when no live subscription uses the identifier.
    pub fn deliver(&self, sid: &str, payload: &str) -> bool {
        let mut state = self.state.lock();
        let State { endpoints, sids, .. } = &mut *state;

        let Some(entry) = sids.get(sid).and_then(|endpoint| endpoints.get_mut(endpoint)) else {
            debug!(sid, "dropping event for unknown subscription");
            return false;
        };

        let payload: EventPayload = Arc::from(payload);
        entry.last_event = Some(Arc::clone(&payload));
        for listener in &entry.listeners {
            if listener.sender.send(Arc::clone(&payload)).is_err() {
                trace!(sid, listener = %listener.id, "listener receiver already dropped");
            }
        }
        true
    }

    /// Pump notifications from the callback server into [`Registry::deliver`]
    /// until the channel closes.
    pub async fn run_dispatcher(self: Arc<Self>, mut notifications: mpsc::UnboundedReceiver<NotificationPayload>) {
        while let Some(notification) = notifications.recv().await {
            self.deliver(&notification.subscription_id, &notification.payload);
        }
        debug!("notification channel closed, dispatcher exiting");
    }

    /// Tear down every subscription and refuse new ones. Waits up to
    /// `shutdown_timeout` for the UNSUBSCRIBE requests to go out.
    pub async fn shutdown(&self) {
        let tasks: Vec<JoinHandle<()>> = {
            let mut state = self.state.lock();
            state.closed = true;
            state.sids.clear();
            state
                .endpoints
                .drain()
                .filter_map(|(_, mut entry)| {
                    if let Some(shutdown) = entry.shutdown.take() {
                        let _ = shutdown.send(());
                    }
                    entry.task.take()
                })
                .collect()
        };

        info!(subscriptions = tasks.len(), "shutting down subscription registry");
        let wait = async {
            for task in tasks {
                let _ = task.await;
            }
        };
        if tokio::time::timeout(self.config.shutdown_timeout, wait).await.is_err() {
            warn!("timed out waiting for subscriptions to close");
        }
    }

    // Renew loop callbacks. Each checks the generation so a loop whose entry
    // has been replaced cannot touch its successor.

    pub(crate) fn apply_lease(&self, endpoint: &Url, generation: u64, lease: &Lease) -> LeaseOutcome {
        let mut state = self.state.lock();
        let State { endpoints, sids, .. } = &mut *state;
        let Some(entry) = endpoints
            .get_mut(endpoint)
            .filter(|e| e.generation == generation)
        else {
            return LeaseOutcome::Stale;
        };

        if entry.sid.as_deref() != Some(lease.sid.as_str()) {
            if let Some(retired) = entry.previous_sid.take() {
                sids.remove(&retired);
            }
            if let Some(replaced) = entry.sid.take() {
                if self.config.retain_previous_sid {
                    entry.previous_sid = Some(replaced);
                } else {
                    sids.remove(&replaced);
                }
            }
            sids.insert(lease.sid.clone(), endpoint.clone());
            debug!(%endpoint, sid = %lease.sid, previous = ?entry.previous_sid, "lease identifier updated");
            entry.sid = Some(lease.sid.clone());
        }
        entry.state = SubscriptionState::Active;
        LeaseOutcome::Applied
    }

    pub(crate) fn mark_renewing(&self, endpoint: &Url, generation: u64) -> bool {
        let mut state = self.state.lock();
        match state
            .endpoints
            .get_mut(endpoint)
            .filter(|e| e.generation == generation)
        {
            Some(entry) => {
                entry.state = SubscriptionState::Renewing;
                true
            }
            None => false,
        }
    }

    /// Remove an entry whose SUBSCRIBE or renewal failed. Dropping it closes
    /// every listener's channel, which is how listeners learn of the failure.
    pub(crate) fn abandon(&self, endpoint: &Url, generation: u64) {
        let mut state = self.state.lock();
        let owned = state
            .endpoints
            .get(endpoint)
            .is_some_and(|e| e.generation == generation);
        if owned {
            if let Some(entry) = state.remove_entry(endpoint) {
                warn!(%endpoint, listeners = entry.listeners.len(), "subscription failed, listeners detached");
            }
        }
    }

    // Introspection.

    /// Number of endpoints with a live subscription.
    pub fn endpoint_count(&self) -> usize {
        self.state.lock().endpoints.len()
    }

    pub fn listener_count(&self, endpoint: &str) -> usize {
        self.with_entry(endpoint, |e| e.listeners.len()).unwrap_or(0)
    }

    pub fn state(&self, endpoint: &str) -> Option<SubscriptionState> {
        self.with_entry(endpoint, |e| e.state)
    }

    pub fn current_sid(&self, endpoint: &str) -> Option<String> {
        self.with_entry(endpoint, |e| e.sid.clone()).flatten()
    }

    pub fn last_event(&self, endpoint: &str) -> Option<EventPayload> {
        self.with_entry(endpoint, |e| e.last_event.clone()).flatten()
    }

    fn with_entry<T>(&self, endpoint: &str, f: impl FnOnce(&Entry) -> T) -> Option<T> {
        let endpoint = Url::parse(endpoint).ok()?;
        self.state.lock().endpoints.get(&endpoint).map(f)
    }

    /// Lease length to request on every SUBSCRIBE.
    pub(crate) fn lease_request(&self) -> Duration {
        self.config.lease_duration
    }
}

fn parse_endpoint(endpoint: &str) -> Result<Url> {
    let url = Url::parse(endpoint).map_err(|e| SubscriptionError::InvalidEndpoint {
        url: endpoint.to_string(),
        reason: e.to_string(),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(SubscriptionError::InvalidEndpoint {
            url: endpoint.to_string(),
            reason: format!("unsupported scheme '{other}'"),
        }),
    }
}

/// A registration: the handle plus the listener's ordered event stream.
///
/// The stream ends when the subscription is torn down underneath the
/// listener (a failed SUBSCRIBE or renewal).
pub struct Subscription {
    pub handle: SubscriptionHandle,
    pub events: mpsc::UnboundedReceiver<EventPayload>,
}

impl Subscription {
    pub async fn recv(&mut self) -> Option<EventPayload> {
        self.events.recv().await
    }
}

/// Proof of registration. Dropping it unregisters the listener, so a
/// listener whose owner goes away never keeps a lease alive.
pub struct SubscriptionHandle {
    registry: Weak<Registry>,
    endpoint: Url,
    id: ListenerId,
    released: bool,
}

impl SubscriptionHandle {
    pub fn id(&self) -> ListenerId {
        self.id
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Same as [`Registry::unsubscribe`]. Returns false when the listener was
    /// already gone.
    pub fn unsubscribe(mut self) -> bool {
        self.release()
    }

    fn release(&mut self) -> bool {
        if std::mem::replace(&mut self.released, true) {
            return false;
        }
        match self.registry.upgrade() {
            Some(registry) => registry.remove_listener(&self.endpoint, self.id),
            None => false,
        }
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        if !self.released {
            trace!(endpoint = %self.endpoint, listener = %self.id, "handle dropped, unsubscribing");
            self.release();
        }
    }
}

impl fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("endpoint", &self.endpoint.as_str())
            .field("id", &self.id)
            .field("released", &self.released)
            .finish()
    }
}
