use futures::FutureExt;
use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::Result;
use crate::event::{Event, Subscription};
use crate::state::{BoxFuture, Invoke, Observable, Outcome, ReactiveState, Revision, StateEvent, WeakState};

use super::storage::{Read, Storage, Write};

struct Shared<T> {
    storage: Box<dyn Storage<T>>,
    synced: AtomicBool,
}

enum Hydration {
    Done(Result<()>),
    Pending(BoxFuture<Result<()>>),
}

impl From<Write> for Hydration {
    fn from(write: Write) -> Self {
        match write {
            Write::Done(result) => Hydration::Done(result),
            Write::Deferred(pending) => Hydration::Pending(pending),
        }
    }
}

/// A container mirrored to and from an external storage.
///
/// Every commit is written through to the storage. [`sync`](Self::sync)
/// loads the stored value, or seeds the storage with the current value when
/// nothing is stored yet. Until the first hydration the value passed to
/// [`new`](Self::new) is provisional.
///
/// Hydration can also be requested through events: `"sync"` always reads,
/// `"synconce"` and `"effect"` only read if no hydration happened yet.
///
/// Deferred reads and writes run on the storage's executor
/// ([`Storage::spawn`]) and finish whether or not anyone awaits them.
///
/// # Examples
///
/// ```
/// use sidestate::synced::{EntryOptions, MemoryStore, StorageEntry, SyncedState};
/// use std::sync::Arc;
///
/// let store = Arc::new(MemoryStore::new());
/// let counter = SyncedState::new(0, StorageEntry::new(store.clone(), EntryOptions::local("counter")));
/// let _ = counter.set_value(5);
///
/// let restored = SyncedState::new(0, StorageEntry::new(store, EntryOptions::local("counter")));
/// restored.emit("synconce");
/// assert_eq!(restored.current(), 5);
/// ```
pub struct SyncedState<T> {
    state: ReactiveState<T>,
    shared: Arc<Shared<T>>,
}

impl<T> SyncedState<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(value: T, storage: impl Storage<T> + 'static) -> Self {
        let state = ReactiveState::new(value);
        let shared = Arc::new(Shared {
            storage: Box::new(storage),
            synced: AtomicBool::new(false),
        });

        if shared.storage.is_writable() {
            let writer = Arc::clone(&shared);
            state.on_with(
                Event::Update,
                move |event: &StateEvent<T>| match writer.storage.write(&event.current) {
                    Write::Done(Ok(())) => {}
                    Write::Done(Err(err)) => tracing::warn!(%err, "write-through failed"),
                    Write::Deferred(pending) => writer.storage.spawn(Box::pin(async move {
                        if let Err(err) = pending.await {
                            tracing::warn!(%err, "write-through failed");
                        }
                    })),
                },
                Invoke::OnEmit,
            );
        }

        let weak = state.downgrade();
        let sync = Self::event_handler(weak.clone(), Arc::clone(&shared), false);
        state.on_with(Event::Sync, sync, Invoke::OnEmit);
        let sync_once = Self::event_handler(weak.clone(), Arc::clone(&shared), true);
        state.once(Event::SyncOnce, sync_once);
        let on_effect = Self::event_handler(weak, Arc::clone(&shared), true);
        state.once(Event::Effect, on_effect);

        Self { state, shared }
    }

    /// Whether a hydration has been started.
    pub fn is_synced(&self) -> bool {
        self.shared.synced.load(Ordering::SeqCst)
    }

    /// Load the stored value, or seed the storage if it is empty.
    ///
    /// Ready results are applied before this returns. Deferred ones are
    /// started on the storage executor; the returned future resolves when
    /// they are done, and dropping it does not cancel them. Storage errors
    /// are returned as is.
    pub fn sync(&self) -> BoxFuture<Result<()>> {
        match self.hydrate() {
            Hydration::Done(result) => Box::pin(std::future::ready(result)),
            Hydration::Pending(pending) => self.launch(pending),
        }
    }

    /// Like [`sync`](Self::sync), but does nothing after the first hydration.
    pub fn sync_once(&self) -> BoxFuture<Result<()>> {
        if self.is_synced() {
            return Box::pin(std::future::ready(Ok(())));
        }
        self.sync()
    }

    fn hydrate(&self) -> Hydration {
        self.shared.synced.store(true, Ordering::SeqCst);

        match self.shared.storage.read() {
            Read::Ready(Ok(value)) => self.apply(value),
            Read::Ready(Err(err)) => Hydration::Done(Err(err)),
            Read::Deferred(pending) => {
                let target = self.clone();
                Hydration::Pending(Box::pin(async move {
                    let value = pending.await?;
                    match target.apply(value) {
                        Hydration::Done(result) => result,
                        Hydration::Pending(seeding) => seeding.await,
                    }
                }))
            }
        }
    }

    fn apply(&self, value: Option<T>) -> Hydration {
        match value {
            Some(value) => {
                tracing::debug!("hydrating from storage");
                let _ = self.state.set_value(value);
                Hydration::Done(Ok(()))
            }
            None if self.shared.storage.is_writable() => {
                tracing::debug!("seeding empty storage");
                self.state.with(|current| self.shared.storage.write(current)).into()
            }
            None => Hydration::Done(Ok(())),
        }
    }

    /// Run `pending` on the storage executor and return a handle to its result.
    fn launch(&self, pending: BoxFuture<Result<()>>) -> BoxFuture<Result<()>> {
        let pending = pending.shared();
        let background = pending.clone();
        self.shared.storage.spawn(Box::pin(async move {
            if let Err(err) = background.await {
                tracing::warn!(%err, "hydration failed");
            }
        }));
        Box::pin(pending)
    }

    fn event_handler(
        state: WeakState<T, ()>,
        shared: Arc<Shared<T>>,
        once: bool,
    ) -> impl Fn(&StateEvent<T>) + Send + Sync + 'static {
        move |_: &StateEvent<T>| {
            let Some(state) = state.upgrade() else {
                return;
            };
            if once && shared.synced.load(Ordering::SeqCst) {
                return;
            }
            let synced = SyncedState {
                state,
                shared: Arc::clone(&shared),
            };
            match synced.hydrate() {
                Hydration::Done(Ok(())) => {}
                Hydration::Done(Err(err)) => tracing::warn!(%err, "hydration failed"),
                Hydration::Pending(pending) => drop(synced.launch(pending)),
            }
        }
    }

    pub fn state(&self) -> &ReactiveState<T> {
        &self.state
    }
}

impl<T> Clone for SyncedState<T> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> Deref for SyncedState<T> {
    type Target = ReactiveState<T>;

    fn deref(&self) -> &Self::Target {
        &self.state
    }
}

impl<T: fmt::Debug> fmt::Debug for SyncedState<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncedState")
            .field("state", &self.state)
            .field("synced", &self.shared.synced.load(Ordering::SeqCst))
            .finish()
    }
}

impl<T> Observable for SyncedState<T>
where
    T: Clone + Send + Sync + 'static,
{
    type Value = T;

    fn current(&self) -> T {
        self.state.current()
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

    fn set_value(&self, value: T) -> Outcome {
        self.state.set_value(value)
    }
}
