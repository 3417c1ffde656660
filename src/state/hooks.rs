use crate::event::Flow;

use super::outcome::BoxFuture;

/// Payload delivered to every handler of a state container.
///
/// For `"updatestart"` and the transition hook `current` is the pending
/// value; from `"update"` on it is the committed one. Lifecycle and custom
/// events carry a snapshot where nothing is changing.
#[derive(Clone, Debug, PartialEq)]
pub struct StateEvent<T, O = ()> {
    pub previous: T,
    pub current: T,
    pub options: O,
}

/// Extension points of the update pipeline.
///
/// The base container uses [`Plain`], which always proceeds and has no
/// post-commit work. Specialized containers plug their own interpretation
/// into `transition` (before the commit) and `complete` (after it).
pub trait Hooks<T, O>: Send + Sync {
    /// Normalize a resolved value before anything sees it.
    fn normalize(&self, value: T) -> T {
        value
    }

    /// Build the options carried by the pipeline events.
    fn payload(&self, _current: &T, _next: &T, options: O) -> O {
        options
    }

    /// Options for a synthesized snapshot of the present state.
    fn present(&self, _current: &T) -> O
    where
        O: Default,
    {
        O::default()
    }

    /// Apply the pending change to the outside world.
    ///
    /// Returning `Flow::Veto` aborts before anything is committed.
    fn transition(&self, _event: &StateEvent<T, O>) -> Flow {
        Flow::Continue
    }

    /// Post-commit side effect. A returned future is the asynchronous tail
    /// of the update; the commit is already final when it runs.
    fn complete(&self, _event: &StateEvent<T, O>) -> Option<BoxFuture> {
        None
    }

    /// Run a tail returned by `complete` in the background.
    ///
    /// Hooks that return tails must override this; the default has no
    /// executor and drops the task.
    fn spawn(&self, task: BoxFuture) {
        drop(task);
        tracing::error!("update tail dropped: hooks have no executor");
    }
}

/// Hooks of a plain container.
#[derive(Clone, Copy, Debug, Default)]
pub struct Plain;

impl<T, O> Hooks<T, O> for Plain {}
