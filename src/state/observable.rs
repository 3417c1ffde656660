use std::sync::Arc;

use crate::event::{Event, Subscription};

use super::outcome::{Outcome, Revision};
use super::state::Invoke;
use super::ReactiveState;

/// The surface a renderer binds to.
///
/// Implemented by every container in this crate, so a binding layer can
/// accept any of them without knowing which specialization it holds.
pub trait Observable: Send + Sync {
    type Value;

    fn current(&self) -> Self::Value;

    fn revision(&self) -> Revision;

    /// Subscribe a payload-agnostic callback to `event`.
    fn watch(&self, event: Event, callback: Arc<dyn Fn() + Send + Sync>) -> Subscription;

    /// Emit `event` with a snapshot of the present state.
    fn notify(&self, event: Event) -> bool;

    fn set_value(&self, value: Self::Value) -> Outcome;
}

impl<T, O> Observable for ReactiveState<T, O>
where
    T: Clone + Send + Sync + 'static,
    O: Clone + Default + Send + Sync + 'static,
{
    type Value = T;

    fn current(&self) -> T {
        ReactiveState::current(self)
    }

    fn revision(&self) -> Revision {
        ReactiveState::revision(self)
    }

    fn watch(&self, event: Event, callback: Arc<dyn Fn() + Send + Sync>) -> Subscription {
        self.on_with(event, move |_| callback(), Invoke::OnEmit)
    }

    fn notify(&self, event: Event) -> bool {
        self.emit(event)
    }

    fn set_value(&self, value: T) -> Outcome {
        ReactiveState::set_value(self, value)
    }
}

/// Bind `render` to a container's commits.
///
/// Announces the binding with `"effect"` first, which lets containers that
/// hydrate lazily load their value before the first render, then re-runs
/// `render` after every commit.
///
/// # Examples
///
/// ```
/// use sidestate::{attach, ReactiveState};
/// use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
///
/// let state = ReactiveState::new(0);
/// let renders = Arc::new(AtomicUsize::new(0));
/// let renders_c = renders.clone();
///
/// let binding = attach(&state, move || {
///     renders_c.fetch_add(1, Ordering::SeqCst);
/// });
///
/// let _ = state.set_value(1);
/// binding.unsubscribe();
/// let _ = state.set_value(2);
///
/// assert_eq!(renders.load(Ordering::SeqCst), 1);
/// ```
pub fn attach<S>(state: &S, render: impl Fn() + Send + Sync + 'static) -> Subscription
where
    S: Observable + ?Sized,
{
    state.notify(Event::Effect);
    state.watch(Event::Update, Arc::new(render))
}
