//! Session bus client for the everpad services.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use futures_util::StreamExt;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use zbus::fdo::DBusProxy;
use zbus::Connection;

use super::proxy::{EverpadAppProxy, EverpadProviderProxy};
use super::{BusClient, BusError, BusEvent, BusSignal, RemoteCall, Subscription, APP_BUS_NAME};

#[derive(Default)]
struct Slots {
    /// Bumped on every dispose so in-flight creations don't repopulate a
    /// disposed slot.
    generation: u64,
    app: Option<EverpadAppProxy<'static>>,
    provider: Option<EverpadProviderProxy<'static>>,
}

type Slot<P> = fn(&mut Slots) -> &mut Option<P>;

fn app_slot(slots: &mut Slots) -> &mut Option<EverpadAppProxy<'static>> {
    &mut slots.app
}

fn provider_slot(slots: &mut Slots) -> &mut Option<EverpadProviderProxy<'static>> {
    &mut slots.provider
}

/// Lazily created, cached proxies to the everpad services.
///
/// At most one proxy per service is cached at a time. Clones share the same
/// cache.
#[derive(Clone)]
pub struct EndpointHandles {
    connection: Connection,
    slots: Arc<Mutex<Slots>>,
}

impl EndpointHandles {
    pub fn new(connection: Connection) -> Self {
        Self {
            connection,
            slots: Arc::new(Mutex::new(Slots::default())),
        }
    }

    fn slots(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// The cached proxy, or the generation a new one must be installed under.
    fn lookup<P: Clone>(&self, slot: Slot<P>) -> Result<P, u64> {
        let mut slots = self.slots();
        match slot(&mut slots) {
            Some(proxy) => Ok(proxy.clone()),
            None => Err(slots.generation),
        }
    }

    /// Cache `proxy` unless the slots were disposed since `generation`, or
    /// another creation won the race. Returns the proxy to use.
    fn install<P: Clone>(&self, generation: u64, proxy: P, slot: Slot<P>) -> P {
        let mut slots = self.slots();
        if slots.generation != generation {
            // Disposed while we were connecting
            return proxy;
        }
        slot(&mut slots).get_or_insert(proxy).clone()
    }

    /// Get the cached `com.everpad.App` proxy, creating it on first use.
    pub async fn app(&self) -> zbus::Result<EverpadAppProxy<'static>> {
        let generation = match self.lookup(app_slot) {
            Ok(proxy) => return Ok(proxy),
            Err(generation) => generation,
        };
        let proxy = EverpadAppProxy::new(&self.connection).await?;
        Ok(self.install(generation, proxy, app_slot))
    }

    /// Get the cached `com.everpad.Provider` proxy, creating it on first use.
    pub async fn provider(&self) -> zbus::Result<EverpadProviderProxy<'static>> {
        let generation = match self.lookup(provider_slot) {
            Ok(proxy) => return Ok(proxy),
            Err(generation) => generation,
        };
        let proxy = EverpadProviderProxy::new(&self.connection).await?;
        Ok(self.install(generation, proxy, provider_slot))
    }

    /// Number of proxies currently cached.
    pub fn cached(&self) -> usize {
        let slots = self.slots();
        usize::from(slots.app.is_some()) + usize::from(slots.provider.is_some())
    }

    /// Drop both cached proxies.
    pub fn dispose(&self) {
        let mut slots = self.slots();
        slots.generation += 1;
        slots.app = None;
        slots.provider = None;
    }
}

/// Marks the `NameOwnerChanged` match as pending until dropped.
///
/// Name queries wait for the gate so that an owner change can't fall between
/// the query and the match registration.
struct OwnerWatchGuard(watch::Sender<bool>);

impl OwnerWatchGuard {
    fn arm(gate: &watch::Sender<bool>) -> Self {
        gate.send_replace(false);
        Self(gate.clone())
    }
}

impl Drop for OwnerWatchGuard {
    fn drop(&mut self) {
        self.0.send_replace(true);
    }
}

/// [`BusClient`] backed by a zbus session connection.
///
/// Every operation is spawned onto the current tokio runtime and reports back
/// through `events`.
pub struct DbusBus {
    connection: Connection,
    handles: EndpointHandles,
    events: UnboundedSender<BusEvent>,
    /// `false` while the `NameOwnerChanged` match is being registered
    owner_watch: watch::Sender<bool>,
}

impl DbusBus {
    /// Connect to the session bus.
    pub async fn connect(events: UnboundedSender<BusEvent>) -> Result<Self, BusError> {
        let connection = Connection::session()
            .await
            .map_err(|e| BusError::Connection(e.to_string()))?;
        info!("Connected to session bus");
        Ok(Self::with_connection(connection, events))
    }

    pub fn with_connection(connection: Connection, events: UnboundedSender<BusEvent>) -> Self {
        let handles = EndpointHandles::new(connection.clone());
        Self {
            connection,
            handles,
            events,
            owner_watch: watch::channel(true).0,
        }
    }

    /// Check if everpad currently owns its bus name.
    pub async fn is_everpad_running(&self) -> Result<bool, BusError> {
        let proxy = DBusProxy::new(&self.connection).await?;
        let name = zbus::names::BusName::try_from(APP_BUS_NAME)
            .map_err(|e| BusError::Call(e.to_string()))?;
        Ok(proxy.name_has_owner(name).await?)
    }
}

impl BusClient for DbusBus {
    fn list_names(&mut self) {
        let connection = self.connection.clone();
        let events = self.events.clone();
        let mut owner_watch = self.owner_watch.subscribe();

        tokio::spawn(async move {
            if owner_watch.wait_for(|ready| *ready).await.is_err() {
                return;
            }
            let result = list_names(&connection).await.map_err(BusError::from);
            if events.send(BusEvent::NamesListed(result)).is_err() {
                debug!("Event loop gone, dropping ListNames reply");
            }
        });
    }

    fn subscribe(&mut self, signal: BusSignal) -> Subscription {
        let events = self.events.clone();

        match signal {
            BusSignal::NameOwnerChanged => {
                let connection = self.connection.clone();
                let pending = OwnerWatchGuard::arm(&self.owner_watch);
                spawn_listener(signal, async move {
                    forward_owner_changes(&connection, &events, pending).await
                })
            }
            BusSignal::SyncStateChanged => {
                let handles = self.handles.clone();
                spawn_listener(signal, async move {
                    forward_sync_states(&handles, &events).await
                })
            }
            BusSignal::DataChanged => {
                let handles = self.handles.clone();
                spawn_listener(signal, async move {
                    forward_data_changes(&handles, &events).await
                })
            }
        }
    }

    fn call(&mut self, call: RemoteCall) {
        let handles = self.handles.clone();

        tokio::spawn(async move {
            debug!("Calling everpad {}", call.method_name());
            if let Err(e) = invoke(&handles, call).await {
                warn!("everpad {} failed: {}", call.method_name(), e);
            }
        });
    }

    fn dispose_endpoints(&mut self) {
        debug!("Disposing {} cached everpad proxies", self.handles.cached());
        self.handles.dispose();
    }
}

/// Run `listener` as a task that lives until the subscription is cancelled.
fn spawn_listener<F>(signal: BusSignal, listener: F) -> Subscription
where
    F: Future<Output = zbus::Result<()>> + Send + 'static,
{
    let task = tokio::spawn(async move {
        if let Err(e) = listener.await {
            warn!("{:?} listener stopped: {}", signal, e);
        }
    });

    debug!("Subscribed to {:?}", signal);
    let abort = task.abort_handle();
    Subscription::new(signal, move || {
        debug!("Unsubscribed from {:?}", signal);
        abort.abort();
    })
}

async fn list_names(connection: &Connection) -> zbus::Result<Vec<String>> {
    let proxy = DBusProxy::new(connection).await?;
    let names = proxy.list_names().await?;
    Ok(names.into_iter().map(|name| name.to_string()).collect())
}

async fn invoke(handles: &EndpointHandles, call: RemoteCall) -> zbus::Result<()> {
    match call {
        RemoteCall::Create => handles.app().await?.create().await,
        RemoteCall::AllNotes => handles.app().await?.all_notes().await,
        RemoteCall::Settings => handles.app().await?.settings().await,
        RemoteCall::Kill => handles.app().await?.kill().await,
        RemoteCall::Sync => handles.provider().await?.sync().await,
    }
}

async fn forward_owner_changes(
    connection: &Connection,
    events: &UnboundedSender<BusEvent>,
    pending: OwnerWatchGuard,
) -> zbus::Result<()> {
    let dbus = DBusProxy::new(connection).await?;
    let changes = dbus
        .receive_name_owner_changed_with_args(&[(0, APP_BUS_NAME)])
        .await;
    // The match is in place; queued name queries may go out now
    drop(pending);
    let mut changes = changes?;

    while let Some(signal) = changes.next().await {
        let args = signal.args()?;
        let event = BusEvent::NameOwnerChanged {
            name: args.name().to_string(),
            old_owner: Option::as_ref(args.old_owner())
                .map(ToString::to_string)
                .unwrap_or_default(),
            new_owner: Option::as_ref(args.new_owner())
                .map(ToString::to_string)
                .unwrap_or_default(),
        };
        if events.send(event).is_err() {
            break;
        }
    }

    Ok(())
}

async fn forward_sync_states(
    handles: &EndpointHandles,
    events: &UnboundedSender<BusEvent>,
) -> zbus::Result<()> {
    let provider = handles.provider().await?;
    let mut states = provider.receive_sync_state_changed().await?;

    while let Some(signal) = states.next().await {
        let args = signal.args()?;
        if events.send(BusEvent::SyncStateChanged(*args.state())).is_err() {
            break;
        }
    }

    Ok(())
}

async fn forward_data_changes(
    handles: &EndpointHandles,
    events: &UnboundedSender<BusEvent>,
) -> zbus::Result<()> {
    let provider = handles.provider().await?;
    let mut changes = provider.receive_data_changed().await?;

    while changes.next().await.is_some() {
        if events.send(BusEvent::DataChanged).is_err() {
            break;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::net::UnixStream;
    use tokio::sync::{mpsc, oneshot};
    use zbus::connection::Builder;
    use zbus::Guid;

    /// Client end of a peer-to-peer connection, plus the server end that
    /// must stay alive with it.
    async fn peer_connection() -> (Connection, Connection) {
        let guid = Guid::generate();
        let (server, client) = UnixStream::pair().unwrap();
        futures_util::try_join!(
            Builder::unix_stream(client).p2p().build(),
            Builder::unix_stream(server).server(guid).unwrap().p2p().build(),
        )
        .unwrap()
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
    }

    // ===================
    // Endpoint Cache Tests
    // ===================

    #[tokio::test]
    async fn test_proxies_are_cached_once() {
        let (client, _server) = peer_connection().await;
        let handles = EndpointHandles::new(client);
        assert_eq!(handles.cached(), 0);

        handles.app().await.unwrap();
        handles.app().await.unwrap();
        assert_eq!(handles.cached(), 1);

        handles.provider().await.unwrap();
        assert_eq!(handles.cached(), 2);
    }

    #[tokio::test]
    async fn test_dispose_drops_both_proxies() {
        let (client, _server) = peer_connection().await;
        let handles = EndpointHandles::new(client);
        handles.app().await.unwrap();
        handles.provider().await.unwrap();

        handles.dispose();
        assert_eq!(handles.cached(), 0);

        // Recreated on next use
        handles.provider().await.unwrap();
        assert_eq!(handles.cached(), 1);
    }

    #[tokio::test]
    async fn test_dispose_during_creation_leaves_slot_empty() {
        let (client, _server) = peer_connection().await;
        let handles = EndpointHandles::new(client);

        let generation = handles.lookup(app_slot).err().unwrap();
        let proxy = EverpadAppProxy::new(&handles.connection).await.unwrap();
        handles.dispose();
        handles.install(generation, proxy, app_slot);

        assert_eq!(handles.cached(), 0);
    }

    #[tokio::test]
    async fn test_clones_share_cache() {
        let (client, _server) = peer_connection().await;
        let handles = EndpointHandles::new(client);
        let other = handles.clone();

        handles.app().await.unwrap();
        assert_eq!(other.cached(), 1);
        other.dispose();
        assert_eq!(handles.cached(), 0);
    }

    #[tokio::test]
    async fn test_calls_fill_cache_and_dispose_clears_it() {
        let (client, _server) = peer_connection().await;
        let (events, _rx) = mpsc::unbounded_channel();
        let mut bus = DbusBus::with_connection(client, events);

        bus.call(RemoteCall::AllNotes);
        bus.call(RemoteCall::Sync);
        let handles = bus.handles.clone();
        wait_until(|| handles.cached() == 2).await;

        bus.dispose_endpoints();
        assert_eq!(bus.handles.cached(), 0);
    }

    // ===================
    // Listener Tests
    // ===================

    #[tokio::test]
    async fn test_cancel_aborts_listener() {
        let (alive, stopped) = oneshot::channel::<()>();
        let subscription = spawn_listener(BusSignal::DataChanged, async move {
            let _alive = alive;
            std::future::pending::<zbus::Result<()>>().await
        });
        tokio::task::yield_now().await;

        subscription.cancel();
        assert!(stopped.await.is_err());
    }

    #[tokio::test]
    async fn test_dropped_subscription_aborts_listener() {
        let (alive, stopped) = oneshot::channel::<()>();
        let subscription = spawn_listener(BusSignal::SyncStateChanged, async move {
            let _alive = alive;
            std::future::pending::<zbus::Result<()>>().await
        });

        drop(subscription);
        assert!(stopped.await.is_err());
    }

    #[tokio::test]
    async fn test_cancel_after_listener_finished() {
        let subscription = spawn_listener(BusSignal::DataChanged, async { Ok(()) });
        tokio::task::yield_now().await;
        subscription.cancel();
    }

    // ===================
    // Owner Watch Gate Tests
    // ===================

    #[tokio::test]
    async fn test_owner_watch_gate_opens_on_drop() {
        let (gate, _) = watch::channel(true);
        let mut ready = gate.subscribe();

        let pending = OwnerWatchGuard::arm(&gate);
        assert!(!*ready.borrow_and_update());

        drop(pending);
        assert!(*ready.wait_for(|ready| *ready).await.unwrap());
    }

    #[tokio::test]
    async fn test_aborted_owner_listener_reopens_gate() {
        let (gate, _) = watch::channel(true);
        let mut ready = gate.subscribe();

        let pending = OwnerWatchGuard::arm(&gate);
        let subscription = spawn_listener(BusSignal::NameOwnerChanged, async move {
            let _pending = pending;
            std::future::pending::<zbus::Result<()>>().await
        });
        subscription.cancel();

        assert!(*ready.wait_for(|ready| *ready).await.unwrap());
    }
}
