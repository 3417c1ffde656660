//! Reactive value containers.
//!
//! This module provides the update pipeline shared by every container:
//! - `ReactiveState`: current/previous value, revision and lifecycle
//! - `Hooks`: the transition and complete extension points
//! - `Outcome`: what a single update did
//! - `Observable`: the surface renderers bind to

mod hooks;
mod observable;
mod outcome;
mod state;

pub use hooks::{Hooks, Plain, StateEvent};
pub use observable::{attach, Observable};
pub use outcome::{BoxFuture, Commit, Outcome, Revision};
pub use state::{Invoke, ReactiveState, MAX_DEPTH};
pub(crate) use state::WeakState;
