use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::state::BoxFuture;

use super::host::{Host, Listener, ListenerId};
use super::href::Href;

/// Something a [`MemoryHost`] was asked to do.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HostAction {
    PushState(String),
    ReplaceState(String),
    Assign(String),
    Replace(String),
    Open { href: String, target: String },
    Go(i64),
    ScrollToOrigin,
    ScrollIntoView(String),
}

struct Session {
    entries: Vec<String>,
    index: usize,
    listeners: HashMap<ListenerId, Listener>,
    anchors: HashSet<String>,
    actions: Vec<HostAction>,
    deferred: Vec<BoxFuture>,
}

/// In-process host with a history stack.
///
/// Serves headless environments and tests: it records every request in
/// [`actions`](MemoryHost::actions) and fires its listeners synchronously on
/// [`go`](Host::go).
pub struct MemoryHost {
    origin: String,
    history: bool,
    next_listener: AtomicU64,
    session: Mutex<Session>,
}

impl MemoryHost {
    /// A host at `origin` whose single history entry is `path`.
    pub fn new(origin: &str, path: &str) -> Self {
        let origin = origin.trim_end_matches('/').to_ascii_lowercase();
        let first = absolute(&origin, path);
        Self {
            origin,
            history: true,
            next_listener: AtomicU64::new(1),
            session: Mutex::new(Session {
                entries: vec![first],
                index: 0,
                listeners: HashMap::new(),
                anchors: HashSet::new(),
                actions: Vec::new(),
                deferred: Vec::new(),
            }),
        }
    }

    /// A host without a programmable history mechanism.
    pub fn without_history(mut self) -> Self {
        self.history = false;
        self
    }

    /// Declare an element reachable by fragment `name`.
    pub fn add_anchor(&self, name: &str) {
        self.session.lock().anchors.insert(name.to_string());
    }

    pub fn actions(&self) -> Vec<HostAction> {
        self.session.lock().actions.clone()
    }

    pub fn clear_actions(&self) {
        self.session.lock().actions.clear();
    }

    /// History entries and the index of the current one.
    pub fn entries(&self) -> (Vec<String>, usize) {
        let session = self.session.lock();
        (session.entries.clone(), session.index)
    }

    pub fn listener_count(&self) -> usize {
        self.session.lock().listeners.len()
    }

    /// Move the location as if another party rewrote history, then notify
    /// listeners.
    pub fn simulate_external(&self, href: &str) {
        self.push_entry(href);
        self.notify();
    }

    /// Await every task handed to [`spawn`](Host::spawn) so far.
    pub async fn run_deferred(&self) {
        let tasks = std::mem::take(&mut self.session.lock().deferred);
        for task in tasks {
            task.await;
        }
    }

    fn record(&self, action: HostAction) {
        tracing::trace!(?action, "memory host");
        self.session.lock().actions.push(action);
    }

    fn notify(&self) {
        // Listeners may call back into the host.
        let listeners: Vec<Listener> = self.session.lock().listeners.values().cloned().collect();
        for listener in listeners {
            listener();
        }
    }

    fn push_entry(&self, href: &str) {
        let href = absolute(&self.origin, href);
        let mut session = self.session.lock();
        let index = session.index;
        session.entries.truncate(index + 1);
        session.entries.push(href);
        session.index += 1;
    }

    fn replace_entry(&self, href: &str) {
        let href = absolute(&self.origin, href);
        let mut session = self.session.lock();
        let index = session.index;
        session.entries[index] = href;
    }
}

fn absolute(origin: &str, href: &str) -> String {
    match Href::parse(href) {
        Ok(parsed) => parsed.resolve(origin).to_string(),
        Err(_) => href.to_string(),
    }
}

impl Host for MemoryHost {
    fn href(&self) -> String {
        let session = self.session.lock();
        session.entries[session.index].clone()
    }

    fn origin(&self) -> String {
        self.origin.clone()
    }

    fn listen(&self, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::SeqCst));
        self.session.lock().listeners.insert(id, listener);
        id
    }

    fn unlisten(&self, id: ListenerId) {
        self.session.lock().listeners.remove(&id);
    }

    fn has_history(&self) -> bool {
        self.history
    }

    fn push_state(&self, href: &str) {
        self.record(HostAction::PushState(href.to_string()));
        self.push_entry(href);
    }

    fn replace_state(&self, href: &str) {
        self.record(HostAction::ReplaceState(href.to_string()));
        self.replace_entry(href);
    }

    fn assign(&self, href: &str) {
        self.record(HostAction::Assign(href.to_string()));
        self.push_entry(href);
    }

    fn replace(&self, href: &str) {
        self.record(HostAction::Replace(href.to_string()));
        self.replace_entry(href);
    }

    fn open(&self, href: &str, target: &str) {
        self.record(HostAction::Open {
            href: href.to_string(),
            target: target.to_string(),
        });
    }

    fn go(&self, delta: i64) {
        self.record(HostAction::Go(delta));
        let moved = {
            let mut session = self.session.lock();
            let last = session.entries.len() as i64 - 1;
            let target = (session.index as i64 + delta).clamp(0, last) as usize;
            let moved = target != session.index;
            session.index = target;
            moved
        };
        if moved {
            self.notify();
        }
    }

    fn scroll_to_origin(&self) {
        self.record(HostAction::ScrollToOrigin);
    }

    fn scroll_into_view(&self, fragment: &str) -> bool {
        let found = self.session.lock().anchors.contains(fragment);
        if found {
            self.record(HostAction::ScrollIntoView(fragment.to_string()));
        }
        found
    }

    fn spawn(&self, task: BoxFuture) {
        self.session.lock().deferred.push(task);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn go_moves_and_notifies() {
        let host = MemoryHost::new("https://site.example", "/");
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_c = calls.clone();
        host.listen(Arc::new(move || {
            calls_c.fetch_add(1, Ordering::SeqCst);
        }));

        host.push_state("/a");
        host.push_state("/b");
        host.go(-1);
        host.go(-5);
        host.go(-1);

        assert_eq!(host.href(), "https://site.example/");
        // The last call hit the start of history and did not move.
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn push_truncates_forward_entries() {
        let host = MemoryHost::new("https://site.example", "/");
        host.push_state("/a");
        host.push_state("/b");
        host.go(-2);
        host.push_state("/c");

        let (entries, index) = host.entries();
        assert_eq!(entries, vec!["https://site.example/", "https://site.example/c"]);
        assert_eq!(index, 1);
    }

    #[test]
    fn scroll_into_view_needs_anchor() {
        let host = MemoryHost::new("https://site.example", "/");
        host.add_anchor("intro");

        assert!(host.scroll_into_view("intro"));
        assert!(!host.scroll_into_view("missing"));
        assert_eq!(host.actions(), vec![HostAction::ScrollIntoView("intro".into())]);
    }
}
