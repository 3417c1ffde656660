use parking_lot::Mutex;
use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, Weak};

use crate::error::Result;
use crate::event::{Event, Flow, Subscription};
use crate::state::{
    BoxFuture, Hooks, Invoke, Observable, Outcome, ReactiveState, Revision, StateEvent,
    WeakState,
};

use super::host::{Host, ListenerId};
use super::href::{self, Href};
use super::options::{HistoryMode, NavigationOptions, ScrollMode, Source, Spa};

/// Alias of `"updatestart"` carrying navigation options.
pub const NAVIGATION_START: &str = "navigationstart";
/// Alias of `"update"` carrying navigation options.
pub const NAVIGATION_COMPLETE: &str = "navigationcomplete";

type Navigation = ReactiveState<String, NavigationOptions>;

/// Pipeline hooks reconciling the stored href with the host.
struct NavigationHooks {
    host: Option<Arc<dyn Host>>,
}

impl NavigationHooks {
    fn full_navigation(host: &dyn Host, href: &str, history: HistoryMode) {
        match history {
            HistoryMode::Push => host.assign(href),
            HistoryMode::Replace => host.replace(href),
        }
    }
}

impl Hooks<String, NavigationOptions> for NavigationHooks {
    fn normalize(&self, value: String) -> String {
        let Some(host) = &self.host else {
            return value;
        };
        match href::normalize(&value, &host.href(), &host.origin()) {
            Ok(normalized) => normalized,
            Err(err) => {
                tracing::warn!(%err, "keeping unnormalized href");
                value
            }
        }
    }

    fn payload(&self, current: &String, next: &String, mut options: NavigationOptions) -> NavigationOptions {
        options.href = Some(next.clone());
        if options.referrer.is_none() {
            options.referrer = Some(current.clone());
        }
        options
    }

    fn present(&self, current: &String) -> NavigationOptions {
        NavigationOptions {
            href: Some(current.clone()),
            ..Default::default()
        }
    }

    fn transition(&self, event: &StateEvent<String, NavigationOptions>) -> Flow {
        let Some(host) = &self.host else {
            return Flow::Continue;
        };
        let options = &event.options;
        let href = &event.current;

        if options.source == Source::Popstate {
            tracing::debug!(%href, "externally observed navigation");
            return Flow::Continue;
        }

        if options.targets_other_context() {
            let target = options.target.as_deref().unwrap_or_default();
            tracing::debug!(%href, target, "navigation opens another context");
            host.open(href, target);
            return Flow::Veto;
        }

        let foreign = match Href::parse(href) {
            Ok(parsed) => !parsed.is_same_origin(&host.origin()),
            Err(_) => true,
        };

        if options.spa == Spa::Off || !host.has_history() || foreign {
            tracing::debug!(%href, foreign, "full navigation");
            Self::full_navigation(host.as_ref(), href, options.history);
            return Flow::Veto;
        }

        tracing::debug!(%href, history = ?options.history, "in-place navigation");
        match options.history {
            HistoryMode::Push => host.push_state(href),
            HistoryMode::Replace => host.replace_state(href),
        }
        Flow::Continue
    }

    fn complete(&self, event: &StateEvent<String, NavigationOptions>) -> Option<BoxFuture> {
        let host = self.host.clone()?;
        let options = &event.options;

        if options.scroll == ScrollMode::Off || options.targets_other_context() {
            return None;
        }

        let fragment = Href::parse(&event.current)
            .map(|href| href.fragment().trim_start_matches('#').to_string())
            .unwrap_or_default();

        Some(Box::pin(async move {
            host.next_frame().await;
            if fragment.is_empty() || !host.scroll_into_view(&fragment) {
                host.scroll_to_origin();
            }
        }))
    }

    fn spawn(&self, task: BoxFuture) {
        if let Some(host) = &self.host {
            host.spawn(task);
        }
    }
}

/// Reactive href reconciled with the host's location and history.
///
/// Dereferences to the underlying [`ReactiveState`], so `on`, `current`,
/// `revision`, `start`/`stop` and the rest of the container surface are
/// available directly.
///
/// # Examples
///
/// ```
/// use sidestate::navigation::{HostAction, MemoryHost, NavigationState};
/// use std::sync::Arc;
///
/// let host = Arc::new(MemoryHost::new("https://site.example", "/"));
/// let route = NavigationState::new(host.clone(), "").unwrap();
///
/// let _ = route.assign("https://site.example/docs#intro");
///
/// assert_eq!(route.href(), "/docs#intro");
/// assert_eq!(host.actions()[0], HostAction::PushState("/docs#intro".into()));
/// ```
#[derive(Clone)]
pub struct NavigationState {
    state: Navigation,
    host: Option<Arc<dyn Host>>,
    listener: Arc<Mutex<Option<ListenerId>>>,
}

impl NavigationState {
    /// A navigation state bound to `host`, starting at `href` (empty means
    /// the host's current location).
    ///
    /// Fails if `href` is not a valid URL.
    pub fn new(host: Arc<dyn Host>, href: &str) -> Result<Self> {
        let initial = href::normalize(href, &host.href(), &host.origin())?;
        let navigation = Self::build(initial, Some(host));
        navigation.listen();
        Ok(navigation)
    }

    /// A navigation state with no host: values are stored as given and
    /// navigation has no external effect.
    pub fn detached(href: &str) -> Result<Self> {
        Href::parse(href)?;
        Ok(Self::build(href.to_string(), None))
    }

    fn build(initial: String, host: Option<Arc<dyn Host>>) -> Self {
        let state = ReactiveState::with_hooks(initial, NavigationHooks { host: host.clone() });
        state.alias(NAVIGATION_START, Event::UpdateStart);
        state.alias(NAVIGATION_COMPLETE, Event::Update);
        state.invoke_immediately(NAVIGATION_START);
        state.invoke_immediately(NAVIGATION_COMPLETE);

        let navigation = Self {
            state,
            host,
            listener: Arc::new(Mutex::new(None)),
        };

        if navigation.host.is_some() {
            let on_start = navigation.clone_weak();
            navigation.state.on_with(
                Event::Start,
                move |_: &StateEvent<String, NavigationOptions>| on_start.listen(),
                Invoke::OnEmit,
            );
            let on_stop = navigation.clone_weak();
            navigation.state.on_with(
                Event::Stop,
                move |_: &StateEvent<String, NavigationOptions>| on_stop.unlisten(),
                Invoke::OnEmit,
            );
        }

        navigation
    }

    fn clone_weak(&self) -> ListenerSlot {
        ListenerSlot {
            state: self.state.downgrade(),
            host: self.host.as_ref().map(Arc::downgrade),
            listener: Arc::downgrade(&self.listener),
        }
    }

    fn listen(&self) {
        self.clone_weak().listen();
    }

    /// Navigate as described by `options`.
    ///
    /// Without an `href` this is a no-op.
    pub fn navigate(&self, options: NavigationOptions) -> Outcome {
        let href = match options.href.as_deref() {
            Some(href) if !href.is_empty() => href.to_string(),
            _ => return Outcome::Ignored,
        };

        if let Err(err) = Href::parse(&href) {
            tracing::warn!(%err, "navigation ignored");
            return Outcome::Ignored;
        }

        self.state.set_value_with(href, options)
    }

    /// Navigate to `href`, adding a history entry.
    pub fn assign(&self, href: &str) -> Outcome {
        self.navigate(NavigationOptions::to(href))
    }

    /// Navigate to `href`, replacing the current history entry.
    pub fn replace(&self, href: &str) -> Outcome {
        self.navigate(NavigationOptions::to(href).replace())
    }

    /// Navigate to the current href again.
    pub fn reload(&self) -> Outcome {
        self.assign(&self.href())
    }

    /// Move through the host's history; the resulting location change
    /// arrives through the host listener.
    pub fn go(&self, delta: i64) {
        if let Some(host) = &self.host {
            if host.has_history() {
                host.go(delta);
            }
        }
    }

    pub fn back(&self) {
        self.go(-1);
    }

    pub fn forward(&self) {
        self.go(1);
    }

    pub fn href(&self) -> String {
        self.state.current()
    }

    pub fn pathname(&self) -> String {
        self.parts().path().to_string()
    }

    pub fn search(&self) -> String {
        self.parts().query().to_string()
    }

    pub fn hash(&self) -> String {
        self.parts().fragment().to_string()
    }

    pub fn set_pathname(&self, pathname: &str) -> Outcome {
        let mut parts = self.parts();
        parts.set_path(pathname);
        self.assign(&parts.to_string())
    }

    pub fn set_search(&self, search: &str) -> Outcome {
        let mut parts = self.parts();
        parts.set_query(search);
        self.assign(&parts.to_string())
    }

    pub fn set_hash(&self, hash: &str) -> Outcome {
        let mut parts = self.parts();
        parts.set_fragment(hash);
        self.assign(&parts.to_string())
    }

    /// Absolute form of the current href, resolved against the host origin.
    pub fn absolute_href(&self) -> String {
        match &self.host {
            Some(host) => self.parts().resolve(&host.origin()).to_string(),
            None => self.href(),
        }
    }

    fn parts(&self) -> Href {
        // Stored values either parsed at construction or passed `navigate`.
        Href::parse(&self.href()).unwrap_or_default()
    }

    pub fn state(&self) -> &ReactiveState<String, NavigationOptions> {
        &self.state
    }
}

/// What a host listener and the lifecycle handlers need, held weakly so
/// neither the host nor the container keeps the other alive.
#[derive(Clone)]
struct ListenerSlot {
    state: WeakState<String, NavigationOptions>,
    host: Option<Weak<dyn Host>>,
    listener: Weak<Mutex<Option<ListenerId>>>,
}

impl ListenerSlot {
    fn listen(&self) {
        let (Some(host), Some(slot)) = (self.host.as_ref().and_then(Weak::upgrade), self.listener.upgrade()) else {
            return;
        };
        let mut slot = slot.lock();
        if slot.is_some() {
            return;
        }

        let state = self.state.clone();
        let weak_host = Arc::downgrade(&host);
        let id = host.listen(Arc::new(move || {
            let (Some(state), Some(host)) = (state.upgrade(), weak_host.upgrade()) else {
                return;
            };
            // The tail is already running on the host; nobody waits for it.
            let _ = state.set_value_with(host.href(), NavigationOptions::popstate());
        }));
        *slot = Some(id);
    }

    fn unlisten(&self) {
        let (Some(host), Some(slot)) = (self.host.as_ref().and_then(Weak::upgrade), self.listener.upgrade()) else {
            return;
        };
        let taken = slot.lock().take();
        if let Some(id) = taken {
            host.unlisten(id);
        }
    }
}

impl Deref for NavigationState {
    type Target = ReactiveState<String, NavigationOptions>;

    fn deref(&self) -> &Self::Target {
        &self.state
    }
}

impl fmt::Display for NavigationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.href())
    }
}

impl fmt::Debug for NavigationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NavigationState")
            .field("href", &self.href())
            .field("revision", &self.state.revision())
            .field("hosted", &self.host.is_some())
            .finish()
    }
}

impl Observable for NavigationState {
    type Value = String;

    fn current(&self) -> String {
        self.href()
    }

    fn revision(&self) -> Revision {
        self.state.revision()
    }

    fn watch(&self, event: Event, callback: Arc<dyn Fn() + Send + Sync>) -> Subscription {
        Observable::watch(&self.state, event, callback)
    }

    fn notify(&self, event: Event) -> bool {
        self.state.emit(event)
    }

    fn set_value(&self, value: String) -> Outcome {
        self.assign(&value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::navigation::{HostAction, MemoryHost};
    use std::sync::atomic::{AtomicUsize, Ordering};

    type Nav = StateEvent<String, NavigationOptions>;

    fn setup() -> (Arc<MemoryHost>, NavigationState) {
        let host = Arc::new(MemoryHost::new("https://site.example", "/"));
        let route = NavigationState::new(host.clone(), "").unwrap();
        (host, route)
    }

    #[test]
    fn starts_at_host_location() {
        let host = Arc::new(MemoryHost::new("https://site.example", "/start?x=1"));
        let route = NavigationState::new(host.clone(), "").unwrap();

        assert_eq!(route.href(), "/start?x=1");
        assert_eq!(route.pathname(), "/start");
        assert_eq!(route.search(), "?x=1");
        assert_eq!(route.absolute_href(), "https://site.example/start?x=1");
    }

    #[test]
    fn invalid_initial_href_fails() {
        let host = Arc::new(MemoryHost::new("https://site.example", "/"));
        assert!(NavigationState::new(host, "9bad://x").is_err());
        assert!(NavigationState::detached("/a\tb").is_err());
    }

    #[test]
    fn same_origin_pushes_history() {
        let (host, route) = setup();

        let outcome = route.assign("/a");

        assert!(outcome.is_committed());
        assert_eq!(route.href(), "/a");
        assert_eq!(route.previous(), "/");
        assert_eq!(host.actions(), vec![HostAction::PushState("/a".into())]);
    }

    #[test]
    fn replace_replaces_history() {
        let (host, route) = setup();

        let _ = route.replace("/b");

        assert_eq!(host.actions(), vec![HostAction::ReplaceState("/b".into())]);
        assert_eq!(host.entries().0, vec!["https://site.example/b"]);
    }

    #[test]
    fn cross_origin_is_full_navigation() {
        let (host, route) = setup();
        let revision = route.revision();

        let outcome = route.assign("https://other.example/x");

        assert!(matches!(outcome, Outcome::Refused));
        assert_eq!(route.href(), "/");
        assert_eq!(route.revision(), revision);
        assert_eq!(host.actions(), vec![HostAction::Assign("https://other.example/x".into())]);
    }

    #[test]
    fn equivalent_own_origins_stay_in_place() {
        let (host, route) = setup();

        let _ = route.assign("//site.example/a");
        let _ = route.assign("https://site.example:443/b");

        assert_eq!(route.href(), "/b");
        assert_eq!(
            host.actions(),
            vec![HostAction::PushState("/a".into()), HostAction::PushState("/b".into())]
        );
    }

    #[test]
    fn scheme_relative_foreign_origin_is_full_navigation() {
        let (host, route) = setup();

        let outcome = route.assign("//other.example/x");

        assert!(matches!(outcome, Outcome::Refused));
        assert_eq!(host.actions(), vec![HostAction::Assign("https://other.example/x".into())]);
    }

    #[test]
    fn spa_off_is_full_navigation() {
        let (host, route) = setup();

        let _ = route.navigate(NavigationOptions::to("/a").spa(Spa::Off).replace());

        assert_eq!(route.href(), "/");
        assert_eq!(host.actions(), vec![HostAction::Replace("/a".into())]);
    }

    #[test]
    fn missing_history_is_full_navigation() {
        let host = Arc::new(MemoryHost::new("https://site.example", "/").without_history());
        let route = NavigationState::new(host.clone(), "").unwrap();

        let _ = route.assign("/a");
        route.back();

        assert_eq!(host.actions(), vec![HostAction::Assign("/a".into())]);
    }

    #[test]
    fn other_target_opens_context() {
        let (host, route) = setup();

        let outcome = route.navigate(NavigationOptions::to("/a").target("_blank"));

        assert!(matches!(outcome, Outcome::Refused));
        assert_eq!(route.href(), "/");
        assert_eq!(
            host.actions(),
            vec![HostAction::Open {
                href: "/a".into(),
                target: "_blank".into()
            }]
        );
    }

    #[test]
    fn navigate_without_href_is_noop() {
        let (host, route) = setup();

        assert!(matches!(route.navigate(NavigationOptions::default()), Outcome::Ignored));
        assert!(matches!(route.assign(""), Outcome::Ignored));
        assert!(host.actions().is_empty());
    }

    #[test]
    fn back_is_observed_without_new_history() {
        let (host, route) = setup();
        let _ = route.assign("/a");
        let _ = route.assign("/b");
        host.clear_actions();

        route.back();

        assert_eq!(route.href(), "/a");
        assert_eq!(host.actions(), vec![HostAction::Go(-1)]);
    }

    #[test]
    fn external_history_changes_are_observed() {
        let (host, route) = setup();

        host.simulate_external("/elsewhere");

        assert_eq!(route.href(), "/elsewhere");
        assert!(host.actions().is_empty());
    }

    #[test]
    fn start_stop_cycles_keep_one_listener() {
        let (host, route) = setup();
        assert_eq!(host.listener_count(), 1);

        route.stop();
        assert_eq!(host.listener_count(), 0);
        route.stop();
        route.start();
        route.start();
        route.stop();
        route.start();

        assert_eq!(host.listener_count(), 1);
    }

    #[test]
    fn stopped_state_ignores_popstate() {
        let (host, route) = setup();
        route.stop();

        host.simulate_external("/elsewhere");

        assert_eq!(route.href(), "/");
    }

    #[test]
    fn dropping_state_releases_host_listener_target() {
        let (host, route) = setup();
        drop(route);

        // The listener is still registered but its target is gone.
        host.simulate_external("/elsewhere");
        assert_eq!(host.listener_count(), 1);
    }

    #[test]
    fn navigation_events_invoke_immediately() {
        let (_host, route) = setup();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let seen_c = seen.clone();
        route.on(NAVIGATION_START, move |e: &Nav| {
            seen_c.lock().push(e.options.href.clone());
        });
        let seen_c = seen.clone();
        route.on_with(
            NAVIGATION_COMPLETE,
            move |e: &Nav| {
                seen_c.lock().push(e.options.href.clone());
            },
            Invoke::OnEmit,
        );

        assert_eq!(*seen.lock(), vec![Some("/".to_string())]);

        let _ = route.assign("/next");
        assert_eq!(seen.lock().len(), 3);
    }

    #[test]
    fn plain_update_handlers_are_not_immediate() {
        let (_host, route) = setup();
        let count = Arc::new(AtomicUsize::new(0));
        let count_c = count.clone();

        route.on("update", move |_: &Nav| {
            count_c.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn referrer_defaults_to_current_href() {
        let (_host, route) = setup();
        let referrers = Arc::new(Mutex::new(Vec::new()));
        let referrers_c = referrers.clone();
        route.on("update", move |e: &Nav| {
            referrers_c.lock().push(e.options.referrer.clone());
        });

        let _ = route.assign("/a");
        let _ = route.navigate(NavigationOptions::to("/b").referrer("/custom"));

        assert_eq!(
            *referrers.lock(),
            vec![Some("/".to_string()), Some("/custom".to_string())]
        );
    }

    #[test]
    fn vetoed_redirect() {
        let (_host, route) = setup();
        let _ = route.assign("/start");
        let redirect = route.clone();

        route.on_with(
            NAVIGATION_START,
            move |e: &Nav| {
                if e.options.href.as_deref() == Some("/") {
                    let _ = redirect.assign("/sections/1");
                    return false;
                }
                true
            },
            Invoke::OnEmit,
        );

        let outcome = route.assign("/");

        assert!(matches!(outcome, Outcome::Vetoed));
        assert_eq!(route.href(), "/sections/1");
    }

    #[tokio::test]
    async fn completion_scrolls_to_fragment() {
        let (host, route) = setup();
        host.add_anchor("intro");

        route.assign("/docs#intro").settled().await;
        route.assign("/docs#missing").settled().await;
        route.navigate(NavigationOptions::to("/plain").scroll(ScrollMode::Off)).settled().await;

        let scrolls: Vec<_> = host
            .actions()
            .into_iter()
            .filter(|a| matches!(a, HostAction::ScrollIntoView(_) | HostAction::ScrollToOrigin))
            .collect();
        assert_eq!(
            scrolls,
            vec![HostAction::ScrollIntoView("intro".into()), HostAction::ScrollToOrigin]
        );
    }

    #[tokio::test]
    async fn unawaited_tail_still_scrolls() {
        let (host, route) = setup();
        host.add_anchor("intro");

        let _ = route.assign("/docs#intro");
        assert_eq!(host.actions(), vec![HostAction::PushState("/docs#intro".into())]);

        host.run_deferred().await;
        assert_eq!(
            host.actions(),
            vec![
                HostAction::PushState("/docs#intro".into()),
                HostAction::ScrollIntoView("intro".into())
            ]
        );
    }

    #[tokio::test]
    async fn awaited_tail_is_not_repeated_by_host() {
        let (host, route) = setup();

        route.assign("/a").settled().await;
        host.run_deferred().await;

        assert_eq!(
            host.actions(),
            vec![HostAction::PushState("/a".into()), HostAction::ScrollToOrigin]
        );
    }

    #[tokio::test]
    async fn popstate_tail_is_handed_to_host() {
        let (host, route) = setup();
        let _ = route.assign("/a");
        host.run_deferred().await;
        host.clear_actions();

        route.back();
        host.run_deferred().await;

        assert_eq!(host.actions(), vec![HostAction::Go(-1), HostAction::ScrollToOrigin]);
    }

    #[test]
    fn detached_state_has_no_effects() {
        let route = NavigationState::detached("/").unwrap();

        let outcome = route.assign("https://other.example/");
        route.back();

        assert!(outcome.is_committed());
        assert_eq!(route.href(), "https://other.example/");
        assert!(matches!(outcome, Outcome::Committed(ref c) if !c.is_pending()));
    }

    #[test]
    fn component_setters_assign() {
        let (_host, route) = setup();
        let _ = route.assign("/a?x=1");

        let _ = route.set_hash("top");
        assert_eq!(route.href(), "/a?x=1#top");

        let _ = route.set_search("y=2");
        assert_eq!(route.href(), "/a?y=2#top");

        let _ = route.set_pathname("/b");
        assert_eq!(route.href(), "/b?y=2#top");
        assert_eq!(route.to_string(), "/b?y=2#top");
    }
}
