//! # Sidestate
//!
//! Shared reactive values with a vetoable update pipeline.
//!
//! Every container is built from the same two layers:
//!
//! ## Events (Low-level primitive)
//!
//! Named-event dispatch where any handler can stop an emission:
//! - `EventBus<P>` - Handlers keyed by event name, with aliases and lifecycle
//! - `Flow` - `Continue` or `Veto`, returned by every handler
//! - `Subscription` - Idempotent unsubscribe handle
//!
//! ## Containers (High-level state)
//!
//! Values that announce, commit and report every change:
//! - `ReactiveState<T>` - Current/previous value behind
//!   `"updatestart"` → commit → `"update"` → `"updateend"`
//! - `NavigationState` - The current href, kept in sync with a `Host`'s history
//! - `SyncedState<T>` - Write-through mirror of an external `Storage`
//!
//! Renderers bind to any container through [`attach`].

pub mod error;
pub mod event;
pub mod navigation;
pub mod state;
pub mod synced;

// Re-export main types for convenience
pub use error::{Error, Result};
pub use event::{Event, EventBus, Flow, Subscription};
pub use navigation::{Host, MemoryHost, NavigationOptions, NavigationState};
pub use state::{attach, Hooks, Observable, Outcome, ReactiveState, Revision, StateEvent};
pub use synced::{EntryOptions, MemoryStore, Storage, StorageEntry, SyncedState};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_works() {
        // Basic smoke test
        let state = ReactiveState::new(0);
        assert_eq!(state.current(), 0);
        let _ = state.set_value(42);
        assert_eq!(state.current(), 42);
        assert_eq!(state.previous(), 0);
    }
}
