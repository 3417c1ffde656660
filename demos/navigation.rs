//! In-app navigation against an in-memory host

use sidestate::navigation::{HostAction, NAVIGATION_COMPLETE, NAVIGATION_START};
use sidestate::{MemoryHost, NavigationOptions, NavigationState, StateEvent};
use std::sync::Arc;

type Nav = StateEvent<String, NavigationOptions>;

#[tokio::main(flavor = "current_thread")]
async fn main() -> sidestate::Result<()> {
    tracing_subscriber::fmt().with_max_level(tracing::Level::DEBUG).init();

    println!("=== Navigation ===\n");
    let host = Arc::new(MemoryHost::new("https://site.example", "/"));
    host.add_anchor("install");
    let route = NavigationState::new(host.clone(), "")?;

    // Registered on a navigation event, so it runs right away as well
    route.on(NAVIGATION_COMPLETE, |e: &Nav| {
        println!("   [Route] {} (from {:?})", e.current, e.options.referrer);
    });

    let guard = route.clone();
    route.on(NAVIGATION_START, move |e: &Nav| {
        if e.current == "/admin" {
            println!("   [Guard] /admin is off limits, redirecting");
            let _ = guard.assign("/login");
            return false;
        }
        true
    });

    println!("\n1. In-place navigation");
    route.assign("/docs").settled().await;
    route.assign("https://site.example/docs#install").settled().await;
    let _ = route.set_search("lang=rust");

    println!("\n2. Guarded navigation");
    let _ = route.assign("/admin");

    println!("\n3. Leaving the app");
    let _ = route.assign("https://other.example/");
    let _ = route.navigate(NavigationOptions::to("/print").target("_blank"));

    println!("\n4. History");
    route.back();
    route.back();
    host.run_deferred().await;
    println!("   Now at {} ({})", route, route.absolute_href());

    println!("\n5. Host actions");
    for action in host.actions() {
        if !matches!(action, HostAction::ScrollToOrigin) {
            println!("   {action:?}");
        }
    }

    println!("\n✓ Navigation complete!");
    Ok(())
}
