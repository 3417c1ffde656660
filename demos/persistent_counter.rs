//! Counter application whose state survives a restart

use serde::{Deserialize, Serialize};
use sidestate::synced::KeyValue;
use sidestate::{attach, EntryOptions, MemoryStore, StateEvent, StorageEntry, SyncedState};
use std::sync::Arc;

#[derive(Clone, Debug, Serialize, Deserialize)]
struct CounterState {
    count: i32,
    step: i32,
    history: Vec<i32>,
}

impl CounterState {
    fn new() -> Self {
        Self {
            count: 0,
            step: 1,
            history: vec![0],
        }
    }

    fn increment(&self) -> Self {
        let mut next = self.clone();
        next.count += next.step;
        next.history.push(next.count);
        next
    }

    fn with_step(&self, step: i32) -> Self {
        Self { step, ..self.clone() }
    }
}

fn open(store: &Arc<MemoryStore>) -> SyncedState<CounterState> {
    SyncedState::new(
        CounterState::new(),
        StorageEntry::new(store.clone(), EntryOptions::local("counter")),
    )
}

fn main() {
    tracing_subscriber::fmt().with_max_level(tracing::Level::DEBUG).init();

    println!("=== Persistent Counter ===\n");
    let store = Arc::new(MemoryStore::new());

    println!("1. First session");
    let counter = open(&store);

    // Refuse to go past 10
    counter.on("updatestart", |e: &StateEvent<CounterState>| e.current.count <= 10);

    let view = counter.clone();
    let binding = attach(&counter, move || {
        view.with(|s| println!("   [Render] Count: {}, Step: {}", s.count, s.step));
    });

    let _ = counter.update(CounterState::increment);
    let _ = counter.update(|s| s.with_step(4));
    let _ = counter.update(CounterState::increment);
    let _ = counter.update(CounterState::increment);

    let outcome = counter.update(CounterState::increment);
    println!("   Increment past 10: {outcome:?}");
    binding.unsubscribe();

    if let Ok(Some(raw)) = store.get(Default::default(), "counter") {
        println!("\n2. Stored entry: {raw}");
    }

    println!("\n3. Second session");
    let restored = open(&store);
    let _binding = attach(&restored, || {});
    restored.with(|s| println!("   Restored count {} with history {:?}", s.count, s.history));

    println!("\n✓ Persistent counter complete!");
}
