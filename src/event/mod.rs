//! Named-event dispatch with short-circuiting handlers.
//!
//! This module provides the primitive every state container is built on:
//! - `EventBus`: handler registry keyed by event name
//! - `Flow`: the value a handler returns to continue or veto an emission
//! - `Subscription`: an idempotent unsubscribe handle

mod bus;

pub use bus::{Event, EventBus, Flow, HandlerId, IntoFlow, Subscription};
