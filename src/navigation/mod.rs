//! URL navigation state.
//!
//! This module specializes the update pipeline for hrefs:
//! - `NavigationState`: decides per navigation whether to update history in
//!   place, leave the page or open another context
//! - `Host`: the location/history/viewport collaborator
//! - `MemoryHost`: an in-process host for headless use and tests
//! - `Href`: origin/path/query/fragment codec used for normalization

mod host;
pub mod href;
mod memory;
mod navigation;
mod options;

pub use host::{Host, Listener, ListenerId};
pub use href::Href;
pub use memory::{HostAction, MemoryHost};
pub use navigation::{NavigationState, NAVIGATION_COMPLETE, NAVIGATION_START};
pub use options::{HistoryMode, NavigationOptions, ScrollMode, Source, Spa};
