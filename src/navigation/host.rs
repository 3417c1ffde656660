use std::sync::Arc;

use crate::state::BoxFuture;

/// Callback invoked when the host location changes on its own
/// (back/forward, or another party rewriting history).
pub type Listener = Arc<dyn Fn() + Send + Sync>;

/// Identity of a registered location listener.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// The host's location, history and viewport, as consumed by
/// [`NavigationState`](super::NavigationState).
///
/// Hosts are shared ambient resources: the navigation state never assumes
/// it is the only party moving the location.
pub trait Host: Send + Sync {
    /// Current absolute URL.
    fn href(&self) -> String;

    /// `scheme://authority` of the current document.
    fn origin(&self) -> String;

    /// Subscribe to externally observed location changes.
    fn listen(&self, listener: Listener) -> ListenerId;

    fn unlisten(&self, id: ListenerId);

    /// Whether history entries can be pushed and replaced in place.
    fn has_history(&self) -> bool {
        true
    }

    fn push_state(&self, href: &str);

    fn replace_state(&self, href: &str);

    /// Full navigation adding a history entry.
    fn assign(&self, href: &str);

    /// Full navigation replacing the current history entry.
    fn replace(&self, href: &str);

    /// Open `href` in the browsing context named `target`.
    fn open(&self, href: &str, target: &str);

    /// Move through history by `delta` entries.
    fn go(&self, delta: i64);

    /// Resolves at the next rendering opportunity.
    fn next_frame(&self) -> BoxFuture {
        Box::pin(std::future::ready(()))
    }

    fn scroll_to_origin(&self);

    /// Scroll the element whose id or anchor name is `fragment` (without
    /// `#`) into view. Returns `false` when no such element exists.
    fn scroll_into_view(&self, fragment: &str) -> bool;

    /// Run `task` to completion in the background.
    ///
    /// Every scroll tail runs here, so it finishes even when nobody awaits
    /// [`Commit::completed`](crate::state::Commit::completed).
    fn spawn(&self, task: BoxFuture);
}
