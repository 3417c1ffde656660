use parking_lot::Mutex;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Name of an event a bus can emit.
///
/// The pipeline and lifecycle events have dedicated variants; anything else
/// is carried by `Named`. Converting from a string maps the well-known names
/// onto their variants, so `"update"` and `Event::Update` are the same event.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Event {
    Start,
    Stop,
    UpdateStart,
    Update,
    UpdateEnd,
    Sync,
    SyncOnce,
    Effect,
    Named(Cow<'static, str>),
}

impl Event {
    pub fn as_str(&self) -> &str {
        match self {
            Event::Start => "start",
            Event::Stop => "stop",
            Event::UpdateStart => "updatestart",
            Event::Update => "update",
            Event::UpdateEnd => "updateend",
            Event::Sync => "sync",
            Event::SyncOnce => "synconce",
            Event::Effect => "effect",
            Event::Named(name) => name,
        }
    }

    fn well_known(name: &str) -> Option<Self> {
        Some(match name {
            "start" => Event::Start,
            "stop" => Event::Stop,
            "updatestart" => Event::UpdateStart,
            "update" => Event::Update,
            "updateend" => Event::UpdateEnd,
            "sync" => Event::Sync,
            "synconce" => Event::SyncOnce,
            "effect" => Event::Effect,
            _ => return None,
        })
    }
}

impl From<&'static str> for Event {
    fn from(name: &'static str) -> Self {
        Event::well_known(name).unwrap_or(Event::Named(Cow::Borrowed(name)))
    }
}

impl From<String> for Event {
    fn from(name: String) -> Self {
        Event::well_known(&name).unwrap_or(Event::Named(Cow::Owned(name)))
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a handler asks the emission to do next.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// Stop the emission; the remaining handlers are skipped and `emit`
    /// returns `false`.
    Veto,
}

/// Conversion from a handler's return value into a [`Flow`].
///
/// Only an explicit `false` (or `Flow::Veto`) vetoes.
pub trait IntoFlow {
    fn into_flow(self) -> Flow;
}

impl IntoFlow for Flow {
    fn into_flow(self) -> Flow {
        self
    }
}

impl IntoFlow for () {
    fn into_flow(self) -> Flow {
        Flow::Continue
    }
}

impl IntoFlow for bool {
    fn into_flow(self) -> Flow {
        if self {
            Flow::Continue
        } else {
            Flow::Veto
        }
    }
}

/// Identity of a single handler registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

type Handler<P> = Arc<dyn Fn(&P) -> Flow + Send + Sync>;

struct Registry<P> {
    // Vec per event keeps registration order for dispatch.
    handlers: HashMap<Event, Vec<(HandlerId, Handler<P>)>>,
    aliases: HashMap<Event, Event>,
}

impl<P> Registry<P> {
    fn resolve(&self, event: Event) -> Event {
        match self.aliases.get(&event) {
            Some(target) => target.clone(),
            None => event,
        }
    }

    fn contains(&self, event: &Event, id: HandlerId) -> bool {
        self.handlers
            .get(event)
            .is_some_and(|list| list.iter().any(|(hid, _)| *hid == id))
    }

    fn remove(&mut self, event: &Event, id: HandlerId) {
        if let Some(list) = self.handlers.get_mut(event) {
            list.retain(|(hid, _)| *hid != id);
            if list.is_empty() {
                self.handlers.remove(event);
            }
        }
    }
}

struct BusInner<P> {
    registry: Mutex<Registry<P>>,
    active: AtomicBool,
    next_id: AtomicU64,
}

/// Named-event registry whose handlers can veto an emission.
///
/// `EventBus` is a cheap handle: clones share the same handler table.
///
/// # Examples
///
/// ```
/// use sidestate::event::{EventBus, Flow};
///
/// let bus: EventBus<i32> = EventBus::new();
/// bus.on("check", |n: &i32| *n > 0);
///
/// assert!(bus.emit("check", &5));
/// assert!(!bus.emit("check", &-1));
/// ```
pub struct EventBus<P> {
    inner: Arc<BusInner<P>>,
}

impl<P: 'static> EventBus<P> {
    /// Create an active bus with no handlers.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BusInner {
                registry: Mutex::new(Registry {
                    handlers: HashMap::new(),
                    aliases: HashMap::new(),
                }),
                active: AtomicBool::new(true),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Route every lookup of `from` to `to`.
    ///
    /// Applies to `on`, `once`, `off` and `emit` alike, so a subscriber of
    /// the alias and the emitter of the target agree on the event.
    pub fn alias(&self, from: impl Into<Event>, to: impl Into<Event>) {
        let mut registry = self.inner.registry.lock();
        registry.aliases.insert(from.into(), to.into());
    }

    /// Resolve `event` through the alias table.
    pub fn resolve(&self, event: impl Into<Event>) -> Event {
        self.inner.registry.lock().resolve(event.into())
    }

    /// Add a handler for `event`.
    ///
    /// Returns a [`Subscription`] that removes exactly this registration.
    pub fn on<F, R>(&self, event: impl Into<Event>, handler: F) -> Subscription
    where
        F: Fn(&P) -> R + Send + Sync + 'static,
        R: IntoFlow,
    {
        let id = self.next_id();
        self.insert(event.into(), id, Arc::new(move |payload: &P| handler(payload).into_flow()))
    }

    /// Add a handler that is removed before its first invocation.
    ///
    /// Re-entrant emissions triggered from inside the handler never reach it
    /// a second time.
    pub fn once<F, R>(&self, event: impl Into<Event>, handler: F) -> Subscription
    where
        F: Fn(&P) -> R + Send + Sync + 'static,
        R: IntoFlow,
    {
        let id = self.next_id();
        let event = event.into();
        let fired = AtomicBool::new(false);
        let bus = Arc::downgrade(&self.inner);
        let resolved = self.resolve(event.clone());

        let wrapper = move |payload: &P| {
            if fired.swap(true, Ordering::SeqCst) {
                return Flow::Continue;
            }
            if let Some(bus) = bus.upgrade() {
                bus.registry.lock().remove(&resolved, id);
            }
            handler(payload).into_flow()
        };

        self.insert(event, id, Arc::new(wrapper))
    }

    /// Remove one handler of `event`, or all of them when `id` is `None`.
    pub fn off(&self, event: impl Into<Event>, id: Option<HandlerId>) {
        let mut registry = self.inner.registry.lock();
        let event = registry.resolve(event.into());
        match id {
            Some(id) => registry.remove(&event, id),
            None => {
                registry.handlers.remove(&event);
            }
        }
    }

    /// Emit `event` to its handlers in registration order.
    ///
    /// Returns `true` when the bus is inactive or nothing is registered.
    /// Returns `false` as soon as a handler vetoes; the handlers after it are
    /// not called.
    pub fn emit(&self, event: impl Into<Event>, payload: &P) -> bool {
        if !self.is_active() {
            return true;
        }
        self.dispatch(event.into(), payload)
    }

    /// Emit regardless of the active flag.
    fn dispatch(&self, event: Event, payload: &P) -> bool {
        // Snapshot so handlers can subscribe or unsubscribe while we iterate.
        let (event, snapshot) = {
            let registry = self.inner.registry.lock();
            let event = registry.resolve(event);
            let snapshot = registry.handlers.get(&event).cloned().unwrap_or_default();
            (event, snapshot)
        };

        if snapshot.is_empty() {
            return true;
        }

        tracing::trace!(event = %event, handlers = snapshot.len(), "emit");

        for (id, handler) in snapshot {
            // Skip handlers removed by an earlier handler of this emission.
            if !self.inner.registry.lock().contains(&event, id) {
                continue;
            }
            if handler(payload) == Flow::Veto {
                tracing::trace!(event = %event, handler = ?id, "emission vetoed");
                return false;
            }
        }

        true
    }

    /// Number of handlers currently registered for `event`.
    pub fn handler_count(&self, event: impl Into<Event>) -> usize {
        let registry = self.inner.registry.lock();
        let event = registry.resolve(event.into());
        registry.handlers.get(&event).map_or(0, Vec::len)
    }

    /// Reactivate the bus and deliver `"start"` with `payload`.
    ///
    /// Does nothing if the bus is already active.
    pub fn start_with(&self, payload: &P) {
        if !self.inner.active.swap(true, Ordering::SeqCst) {
            self.dispatch(Event::Start, payload);
        }
    }

    /// Deactivate the bus and deliver `"stop"` with `payload`.
    ///
    /// Stop handlers still run even though the bus is now inactive.
    pub fn stop_with(&self, payload: &P) {
        if self.inner.active.swap(false, Ordering::SeqCst) {
            self.dispatch(Event::Stop, payload);
        }
    }

    fn next_id(&self) -> HandlerId {
        HandlerId(self.inner.next_id.fetch_add(1, Ordering::SeqCst))
    }

    fn insert(&self, event: Event, id: HandlerId, handler: Handler<P>) -> Subscription {
        let event = {
            let mut registry = self.inner.registry.lock();
            let event = registry.resolve(event);
            registry
                .handlers
                .entry(event.clone())
                .or_default()
                .push((id, handler));
            event
        };

        let bus: Weak<BusInner<P>> = Arc::downgrade(&self.inner);
        Subscription::new(id, move || {
            if let Some(bus) = bus.upgrade() {
                bus.registry.lock().remove(&event, id);
            }
        })
    }
}

impl<P> EventBus<P> {
    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::SeqCst)
    }
}

impl<P: Default + 'static> EventBus<P> {
    /// Reactivate the bus and deliver `"start"` with a default payload.
    pub fn start(&self) {
        self.start_with(&P::default());
    }

    /// Deactivate the bus and deliver `"stop"` with a default payload.
    pub fn stop(&self) {
        self.stop_with(&P::default());
    }
}

impl<P: 'static> Default for EventBus<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> Clone for EventBus<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Handle returned by `on`/`once` that removes its registration.
///
/// Unsubscribing is idempotent. Dropping the handle does not unsubscribe.
pub struct Subscription {
    id: HandlerId,
    remove: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl Subscription {
    fn new(id: HandlerId, remove: impl FnOnce() + Send + 'static) -> Self {
        Self {
            id,
            remove: Mutex::new(Some(Box::new(remove))),
        }
    }

    pub fn id(&self) -> HandlerId {
        self.id
    }

    /// Remove the registration; later calls are no-ops.
    pub fn unsubscribe(&self) {
        let remove = self.remove.lock().take();
        if let Some(remove) = remove {
            remove();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
