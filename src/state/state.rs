use futures::FutureExt;
use parking_lot::{Mutex, ReentrantMutex};
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use crate::event::{Event, EventBus, Flow, HandlerId, IntoFlow, Subscription};

use super::hooks::{Hooks, Plain, StateEvent};
use super::outcome::{BoxFuture, Commit, Outcome, Revision, Tail};

/// Whether a handler registered on a designated event also runs right away.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Invoke {
    /// Run once at registration with a snapshot of the present state when
    /// the event is designated for immediate invocation.
    #[default]
    Auto,
    /// Only run when the event is emitted.
    OnEmit,
}

struct Values<T> {
    current: T,
    previous: T,
    revision: Revision,
}

/// Nesting limit for updates started from inside handlers.
pub const MAX_DEPTH: usize = 32;

struct StateInner<T, O> {
    values: Mutex<Values<T>>,
    // Held for a whole pipeline run; re-entrant so nested updates from
    // handlers on the same thread still run depth-first.
    serial: ReentrantMutex<()>,
    depth: AtomicUsize,
    bus: EventBus<StateEvent<T, O>>,
    hooks: Box<dyn Hooks<T, O>>,
    immediate: Mutex<HashSet<Event>>,
}

/// A value container that notifies observers when its value changes.
///
/// Every change goes through the same pipeline:
/// `"updatestart"` (vetoable) → transition hook (may refuse) → commit →
/// `"update"` (vetoable) → complete hook → `"updateend"`.
///
/// `ReactiveState` is a cheap handle: clones share the value and handlers.
///
/// # Examples
///
/// ```
/// use sidestate::ReactiveState;
///
/// let state = ReactiveState::new(10);
/// state.on("updatestart", |event: &sidestate::StateEvent<i32>| event.current >= 0);
///
/// let _ = state.set_value(2);
/// let _ = state.set_value(-1);
/// let _ = state.update(|n| n * 3);
///
/// assert_eq!(state.current(), 6);
/// assert_eq!(state.previous(), 2);
/// ```
pub struct ReactiveState<T, O = ()> {
    inner: Arc<StateInner<T, O>>,
}

impl<T> ReactiveState<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create an active container holding `value`.
    pub fn new(value: T) -> Self {
        Self::with_hooks(value, Plain)
    }
}

impl<T, O> ReactiveState<T, O>
where
    T: Clone + Send + Sync + 'static,
    O: Clone + Default + Send + Sync + 'static,
{
    /// Create an active container whose pipeline is extended by `hooks`.
    pub fn with_hooks(value: T, hooks: impl Hooks<T, O> + 'static) -> Self {
        Self {
            inner: Arc::new(StateInner {
                values: Mutex::new(Values {
                    current: value.clone(),
                    previous: value,
                    revision: Revision::INITIAL,
                }),
                serial: ReentrantMutex::new(()),
                depth: AtomicUsize::new(0),
                bus: EventBus::new(),
                hooks: Box::new(hooks),
                immediate: Mutex::new(HashSet::new()),
            }),
        }
    }

    pub fn current(&self) -> T {
        self.inner.values.lock().current.clone()
    }

    /// Value held right before the last commit; equal to the initial value
    /// until something is committed.
    pub fn previous(&self) -> T {
        self.inner.values.lock().previous.clone()
    }

    pub fn revision(&self) -> Revision {
        self.inner.values.lock().revision
    }

    /// Read the current value without cloning it.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let values = self.inner.values.lock();
        f(&values.current)
    }

    pub fn is_active(&self) -> bool {
        self.inner.bus.is_active()
    }

    /// Replace the value.
    pub fn set_value(&self, value: T) -> Outcome {
        self.set_value_with(value, O::default())
    }

    /// Replace the value, passing `options` to handlers and hooks.
    pub fn set_value_with(&self, value: T, options: O) -> Outcome {
        self.run(|_| value, options)
    }

    /// Compute the next value from the current one.
    ///
    /// `f` runs exactly once, against the value current at call time.
    pub fn update(&self, f: impl FnOnce(&T) -> T) -> Outcome {
        self.update_with(f, O::default())
    }

    /// Like [`update`](Self::update), passing `options` along.
    pub fn update_with(&self, f: impl FnOnce(&T) -> T, options: O) -> Outcome {
        self.run(f, options)
    }

    fn run(&self, resolve: impl FnOnce(&T) -> T, options: O) -> Outcome {
        let _serial = self.inner.serial.lock();

        if !self.is_active() {
            tracing::debug!("update skipped: container inactive");
            return Outcome::Inactive;
        }

        let Some(_depth) = DepthGuard::enter(&self.inner.depth) else {
            tracing::warn!(limit = MAX_DEPTH, "update refused: nested too deeply");
            return Outcome::DepthExceeded;
        };

        let current = self.current();
        let next = self.inner.hooks.normalize(resolve(&current));
        let options = self.inner.hooks.payload(&current, &next, options);
        let pending = StateEvent {
            previous: current,
            current: next,
            options,
        };

        if !self.inner.bus.emit(Event::UpdateStart, &pending) {
            tracing::debug!("update vetoed at updatestart");
            return Outcome::Vetoed;
        }

        if self.inner.hooks.transition(&pending) == Flow::Veto {
            tracing::debug!("update refused by transition");
            return Outcome::Refused;
        }

        let StateEvent {
            current: next,
            options,
            ..
        } = pending;

        let (previous, revision) = {
            let mut values = self.inner.values.lock();
            let previous = std::mem::replace(&mut values.current, next.clone());
            values.previous = previous.clone();
            values.revision = values.revision.next();
            (previous, values.revision)
        };

        tracing::debug!(%revision, "update committed");

        let committed = StateEvent {
            previous,
            current: next,
            options,
        };

        if !self.inner.bus.emit(Event::Update, &committed) {
            tracing::debug!(%revision, "update notification vetoed");
            return Outcome::Committed(Commit::new(revision, false, None));
        }

        let completion = self.inner.hooks.complete(&committed).map(|tail| self.spawn_tail(tail));
        self.inner.bus.emit(Event::UpdateEnd, &committed);

        Outcome::Committed(Commit::new(revision, true, completion))
    }

    fn spawn_tail(&self, tail: BoxFuture) -> Tail {
        let tail = tail.shared();
        self.inner.hooks.spawn(Box::pin(tail.clone()));
        tail
    }

    /// Snapshot payload describing the present state.
    pub fn snapshot(&self) -> StateEvent<T, O> {
        let (current, previous) = {
            let values = self.inner.values.lock();
            (values.current.clone(), values.previous.clone())
        };
        let options = self.inner.hooks.present(&current);
        StateEvent {
            previous,
            current,
            options,
        }
    }

    /// Add an event handler.
    ///
    /// Handlers of `"update"` run after every commit. If `event` is
    /// designated for immediate invocation, the handler also runs once now.
    pub fn on<F, R>(&self, event: impl Into<Event>, handler: F) -> Subscription
    where
        F: Fn(&StateEvent<T, O>) -> R + Send + Sync + 'static,
        R: IntoFlow,
    {
        self.on_with(event, handler, Invoke::Auto)
    }

    /// Add an event handler, choosing whether it may run immediately.
    pub fn on_with<F, R>(&self, event: impl Into<Event>, handler: F, invoke: Invoke) -> Subscription
    where
        F: Fn(&StateEvent<T, O>) -> R + Send + Sync + 'static,
        R: IntoFlow,
    {
        let event = event.into();

        if invoke == Invoke::Auto && self.is_active() && self.is_immediate(&event) {
            let _ = handler(&self.snapshot()).into_flow();
        }

        self.inner.bus.on(event, handler)
    }

    /// Add a one-time event handler.
    pub fn once<F, R>(&self, event: impl Into<Event>, handler: F) -> Subscription
    where
        F: Fn(&StateEvent<T, O>) -> R + Send + Sync + 'static,
        R: IntoFlow,
    {
        self.inner.bus.once(event, handler)
    }

    /// Remove one handler of `event`, or all of them when `id` is `None`.
    pub fn off(&self, event: impl Into<Event>, id: Option<HandlerId>) {
        self.inner.bus.off(event, id);
    }

    /// Emit `event` with a snapshot of the present state.
    pub fn emit(&self, event: impl Into<Event>) -> bool {
        self.inner.bus.emit(event, &self.snapshot())
    }

    /// Emit `event` with an explicit payload.
    pub fn emit_with(&self, event: impl Into<Event>, payload: &StateEvent<T, O>) -> bool {
        self.inner.bus.emit(event, payload)
    }

    /// Route `from` to `to` for subscription and emission alike.
    pub fn alias(&self, from: impl Into<Event>, to: impl Into<Event>) {
        self.inner.bus.alias(from, to);
    }

    /// Designate `event` for immediate invocation of new handlers.
    ///
    /// Matching is by the name used at registration, before alias
    /// resolution, so designating an alias leaves its target untouched.
    pub fn invoke_immediately(&self, event: impl Into<Event>) {
        self.inner.immediate.lock().insert(event.into());
    }

    fn is_immediate(&self, event: &Event) -> bool {
        self.inner.immediate.lock().contains(event)
    }

    pub(crate) fn downgrade(&self) -> WeakState<T, O> {
        WeakState(Arc::downgrade(&self.inner))
    }

    pub fn handler_count(&self, event: impl Into<Event>) -> usize {
        self.inner.bus.handler_count(event)
    }

    /// Reactivate the container and emit `"start"`.
    pub fn start(&self) {
        self.inner.bus.start_with(&self.snapshot());
    }

    /// Deactivate the container and emit `"stop"`.
    pub fn stop(&self) {
        self.inner.bus.stop_with(&self.snapshot());
    }
}

struct DepthGuard<'a>(&'a AtomicUsize);

impl<'a> DepthGuard<'a> {
    fn enter(depth: &'a AtomicUsize) -> Option<Self> {
        if depth.fetch_add(1, Ordering::SeqCst) >= MAX_DEPTH {
            depth.fetch_sub(1, Ordering::SeqCst);
            return None;
        }
        Some(DepthGuard(depth))
    }
}

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Non-owning handle used by collaborator callbacks to avoid cycles.
pub(crate) struct WeakState<T, O>(Weak<StateInner<T, O>>);

impl<T, O> WeakState<T, O> {
    pub(crate) fn upgrade(&self) -> Option<ReactiveState<T, O>> {
        self.0.upgrade().map(|inner| ReactiveState { inner })
    }
}

impl<T, O> Clone for WeakState<T, O> {
    fn clone(&self) -> Self {
        WeakState(Weak::clone(&self.0))
    }
}

impl<T: Clone + Send + Sync + 'static + Default> Default for ReactiveState<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T, O> Clone for ReactiveState<T, O> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug, O> fmt::Debug for ReactiveState<T, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let values = self.inner.values.lock();
        f.debug_struct("ReactiveState")
            .field("current", &values.current)
            .field("previous", &values.previous)
            .field("revision", &values.revision)
            .field("active", &self.inner.bus.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    type Log = Arc<Mutex<Vec<String>>>;

    fn record(state: &ReactiveState<i32>, log: &Log, event: &'static str) {
        let log = log.clone();
        state.on(event, move |e: &StateEvent<i32>| {
            log.lock().push(format!("{event}:{}->{}", e.previous, e.current));
        });
    }

    #[test]
    fn state_set_and_update() {
        let state = ReactiveState::new(10);

        assert_eq!(state.current(), 10);
        assert_eq!(state.previous(), 10);

        let _ = state.set_value(2);
        let _ = state.update(|n| n - 5);

        assert_eq!(state.current(), -3);
        assert_eq!(state.previous(), 2);
    }

    #[test]
    fn pipeline_order() {
        let state = ReactiveState::new(1);
        let log: Log = Arc::default();
        record(&state, &log, "updateend");
        record(&state, &log, "update");
        record(&state, &log, "updatestart");

        let _ = state.set_value(2);

        assert_eq!(
            *log.lock(),
            vec!["updatestart:1->2", "update:1->2", "updateend:1->2"]
        );
    }

    #[test]
    fn veto_at_updatestart_keeps_everything() {
        let state = ReactiveState::new(1);
        let revision = state.revision();
        let log: Log = Arc::default();
        record(&state, &log, "update");
        state.on("updatestart", |_: &StateEvent<i32>| false);

        let outcome = state.set_value(5);

        assert!(matches!(outcome, Outcome::Vetoed));
        assert_eq!(state.current(), 1);
        assert_eq!(state.previous(), 1);
        assert_eq!(state.revision(), revision);
        assert!(log.lock().is_empty());
    }

    #[test]
    fn veto_at_update_keeps_commit_skips_updateend() {
        let state = ReactiveState::new(1);
        let log: Log = Arc::default();
        state.on("update", |_: &StateEvent<i32>| false);
        record(&state, &log, "updateend");

        let outcome = state.set_value(7);

        match outcome {
            Outcome::Committed(commit) => assert!(!commit.notified),
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(state.current(), 7);
        assert!(log.lock().is_empty());
    }

    #[test]
    fn revision_changes_on_commit() {
        let state = ReactiveState::new("a".to_string());
        let before = state.revision();

        let outcome = state.set_value("a".to_string());

        assert_ne!(state.revision(), before);
        assert_eq!(outcome.revision(), Some(state.revision()));
    }

    #[test]
    fn inactive_state_ignores_updates() {
        let state = ReactiveState::new(1);
        let count = Arc::new(AtomicUsize::new(0));
        let count_c = count.clone();
        state.on("updatestart", move |_: &StateEvent<i32>| {
            count_c.fetch_add(1, Ordering::SeqCst);
        });

        state.stop();
        assert!(matches!(state.set_value(2), Outcome::Inactive));
        assert_eq!(state.current(), 1);
        assert_eq!(count.load(Ordering::SeqCst), 0);

        state.start();
        let _ = state.set_value(2);
        assert_eq!(state.current(), 2);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn transform_sees_value_at_call_time() {
        let state = ReactiveState::new(1);
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_c = calls.clone();

        state.update(move |n| {
            calls_c.fetch_add(1, Ordering::SeqCst);
            n + 1
        });
        let _ = state.update(|n| n * 10);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(state.current(), 20);
    }

    #[test]
    fn reentrant_update_runs_depth_first() {
        let state = ReactiveState::new(0);
        let log: Log = Arc::default();
        let inner = state.clone();

        state.on("update", move |e: &StateEvent<i32>| {
            if e.current == 1 {
                let _ = inner.set_value(2);
            }
        });
        record(&state, &log, "update");

        let _ = state.set_value(1);

        // The nested commit is observed before the outer emission resumes.
        assert_eq!(*log.lock(), vec!["update:1->2", "update:0->1"]);
        assert_eq!(state.current(), 2);
        assert_eq!(state.previous(), 1);
    }

    struct Refuse;

    impl Hooks<i32, ()> for Refuse {
        fn transition(&self, event: &StateEvent<i32>) -> Flow {
            if event.current < 0 {
                Flow::Veto
            } else {
                Flow::Continue
            }
        }
    }

    #[test]
    fn transition_can_refuse() {
        let state = ReactiveState::with_hooks(1, Refuse);

        assert!(matches!(state.set_value(-1), Outcome::Refused));
        assert_eq!(state.current(), 1);
        assert!(state.set_value(3).is_committed());
    }

    #[test]
    fn immediate_invocation_is_opt_out() {
        let state = ReactiveState::new(4);
        state.invoke_immediately("update");
        let seen = Arc::new(AtomicUsize::new(0));

        let seen_c = seen.clone();
        state.on("update", move |e: &StateEvent<i32>| {
            seen_c.fetch_add(e.current as usize, Ordering::SeqCst);
        });
        let seen_c = seen.clone();
        state.on_with(
            "update",
            move |e: &StateEvent<i32>| {
                seen_c.fetch_add(e.current as usize * 100, Ordering::SeqCst);
            },
            Invoke::OnEmit,
        );

        assert_eq!(seen.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn concurrent_updates_are_not_lost() {
        let state = ReactiveState::new(0u64);

        let workers: Vec<_> = (0..4)
            .map(|_| {
                let state = state.clone();
                std::thread::spawn(move || {
                    for _ in 0..2_000 {
                        let _ = state.update(|n| n + 1);
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        assert_eq!(state.current(), 8_000);
        assert_eq!(state.previous(), 7_999);
    }

    #[test]
    fn runaway_reentrancy_is_bounded() {
        let state = ReactiveState::new(0usize);
        let refusals = Arc::new(AtomicUsize::new(0));
        let inner = state.clone();
        let refusals_c = refusals.clone();

        state.on("update", move |e: &StateEvent<usize>| {
            if let Outcome::DepthExceeded = inner.set_value(e.current + 1) {
                refusals_c.fetch_add(1, Ordering::SeqCst);
            }
        });

        assert!(state.set_value(1).is_committed());
        assert_eq!(state.current(), MAX_DEPTH);
        assert_eq!(refusals.load(Ordering::SeqCst), 1);

        // The depth is released once the nested pipelines unwind.
        state.off("update", None);
        assert!(state.set_value(0).is_committed());
    }

    struct Deferred(Arc<Mutex<Vec<BoxFuture>>>, Arc<AtomicUsize>);

    impl Hooks<i32, ()> for Deferred {
        fn complete(&self, _event: &StateEvent<i32>) -> Option<BoxFuture> {
            let runs = self.1.clone();
            Some(Box::pin(async move {
                runs.fetch_add(1, Ordering::SeqCst);
            }))
        }

        fn spawn(&self, task: BoxFuture) {
            self.0.lock().push(task);
        }
    }

    #[tokio::test]
    async fn tails_run_once_whether_awaited_or_not() {
        let queue: Arc<Mutex<Vec<BoxFuture>>> = Arc::default();
        let runs = Arc::new(AtomicUsize::new(0));
        let state = ReactiveState::with_hooks(0, Deferred(queue.clone(), runs.clone()));

        let _ = state.set_value(1);
        state.set_value(2).settled().await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        let spawned = std::mem::take(&mut *queue.lock());
        assert_eq!(spawned.len(), 2);
        for task in spawned {
            task.await;
        }
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn stop_handlers_run() {
        let state = ReactiveState::new(0);
        let stops = Arc::new(AtomicUsize::new(0));
        let stops_c = stops.clone();
        state.on("stop", move |_: &StateEvent<i32>| {
            stops_c.fetch_add(1, Ordering::SeqCst);
        });

        state.stop();
        state.stop();

        assert_eq!(stops.load(Ordering::SeqCst), 1);
        assert!(!state.is_active());
    }

    #[test]
    fn debug_shows_values_and_activity() {
        let state = ReactiveState::new(1);
        let _ = state.set_value(2);
        state.stop();

        let shown = format!("{state:?}");

        assert!(shown.starts_with("ReactiveState"));
        assert!(shown.contains("current: 2"));
        assert!(shown.contains("previous: 1"));
        assert!(shown.contains("active: false"));
    }
}
