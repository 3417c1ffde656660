use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::state::BoxFuture;

/// Result of a storage read: available now, or after awaiting.
///
/// `Ok(None)` means nothing is stored yet.
pub enum Read<T> {
    Ready(Result<Option<T>>),
    Deferred(BoxFuture<Result<Option<T>>>),
}

impl<T: Send + 'static> Read<T> {
    /// Await the read regardless of its flavor.
    pub async fn resolve(self) -> Result<Option<T>> {
        match self {
            Read::Ready(result) => result,
            Read::Deferred(pending) => pending.await,
        }
    }
}

/// Result of a storage write: finished, or finishing when awaited.
pub enum Write {
    Done(Result<()>),
    Deferred(BoxFuture<Result<()>>),
}

impl Write {
    pub async fn resolve(self) -> Result<()> {
        match self {
            Write::Done(result) => result,
            Write::Deferred(pending) => pending.await,
        }
    }
}

/// External storage a [`SyncedState`](super::SyncedState) mirrors its value to.
///
/// Failures are the backend's concern; they are reported through `Result`
/// and never retried by the container.
pub trait Storage<T>: Send + Sync {
    fn read(&self) -> Read<T>;

    fn write(&self, value: &T) -> Write;

    /// Read-only storages are never written to.
    fn is_writable(&self) -> bool {
        true
    }

    /// Drive deferred reads and writes in the background.
    ///
    /// Storages returning [`Read::Deferred`] or [`Write::Deferred`] must
    /// override this. The default has no executor and drops the task.
    fn spawn(&self, task: BoxFuture) {
        drop(task);
        tracing::error!("deferred storage work dropped: storage has no executor");
    }
}

impl<T, S: Storage<T> + ?Sized> Storage<T> for Arc<S> {
    fn read(&self) -> Read<T> {
        (**self).read()
    }

    fn write(&self, value: &T) -> Write {
        (**self).write(value)
    }

    fn is_writable(&self) -> bool {
        (**self).is_writable()
    }

    fn spawn(&self, task: BoxFuture) {
        (**self).spawn(task)
    }
}

/// Lifetime of a storage area.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Area {
    /// Survives restarts.
    #[default]
    Local,
    /// Scoped to the current session.
    Session,
}

/// Where a [`StorageEntry`] lives.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntryOptions {
    pub key: String,
    pub area: Area,
}

impl EntryOptions {
    pub fn local(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            area: Area::Local,
        }
    }

    pub fn session(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            area: Area::Session,
        }
    }
}

/// String key-value backend, in the shape of browser local/session storage.
pub trait KeyValue: Send + Sync {
    fn get(&self, area: Area, key: &str) -> Result<Option<String>>;

    fn set(&self, area: Area, key: &str, value: String) -> Result<()>;

    fn remove(&self, area: Area, key: &str) -> Result<()>;
}

/// In-process [`KeyValue`] backend.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<(Area, String), String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every session-scoped entry, as ending a session would.
    pub fn end_session(&self) {
        self.entries.lock().retain(|(area, _), _| *area != Area::Session);
    }
}

impl KeyValue for MemoryStore {
    fn get(&self, area: Area, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().get(&(area, key.to_string())).cloned())
    }

    fn set(&self, area: Area, key: &str, value: String) -> Result<()> {
        self.entries.lock().insert((area, key.to_string()), value);
        Ok(())
    }

    fn remove(&self, area: Area, key: &str) -> Result<()> {
        self.entries.lock().remove(&(area, key.to_string()));
        Ok(())
    }
}

/// Turns values into the strings a [`KeyValue`] backend stores.
pub trait Codec<T>: Send + Sync {
    fn encode(&self, value: &T) -> Result<String>;

    fn decode(&self, raw: &str) -> Result<T>;
}

/// The default codec.
#[derive(Clone, Copy, Debug, Default)]
pub struct Json;

impl<T: Serialize + DeserializeOwned> Codec<T> for Json {
    fn encode(&self, value: &T) -> Result<String> {
        Ok(serde_json::to_string(value)?)
    }

    fn decode(&self, raw: &str) -> Result<T> {
        serde_json::from_str(raw).map_err(|e| Error::Deserialization(e.to_string()))
    }
}

/// A single entry of a [`KeyValue`] backend, JSON-encoded unless another
/// [`Codec`] is given.
///
/// # Examples
///
/// ```
/// use sidestate::synced::{EntryOptions, KeyValue, MemoryStore, Storage, StorageEntry, Write};
/// use std::sync::Arc;
///
/// let store = Arc::new(MemoryStore::new());
/// let entry = StorageEntry::<Vec<u8>, _>::new(store.clone(), EntryOptions::local("bytes"));
///
/// assert!(matches!(entry.write(&vec![1, 2]), Write::Done(Ok(()))));
/// assert_eq!(store.get(Default::default(), "bytes").unwrap().as_deref(), Some("[1,2]"));
/// ```
pub struct StorageEntry<T, B, C = Json> {
    backend: Arc<B>,
    options: EntryOptions,
    codec: C,
    _value: PhantomData<fn() -> T>,
}

impl<T, B: KeyValue> StorageEntry<T, B> {
    pub fn new(backend: Arc<B>, options: EntryOptions) -> Self {
        StorageEntry::with_codec(backend, options, Json)
    }
}

impl<T, B: KeyValue, C> StorageEntry<T, B, C> {
    pub fn with_codec(backend: Arc<B>, options: EntryOptions, codec: C) -> Self {
        Self {
            backend,
            options,
            codec,
            _value: PhantomData,
        }
    }

    pub fn options(&self) -> &EntryOptions {
        &self.options
    }

    /// Remove the stored value.
    pub fn clear(&self) -> Result<()> {
        self.backend.remove(self.options.area, &self.options.key)
    }
}

impl<T, B, C> Storage<T> for StorageEntry<T, B, C>
where
    B: KeyValue,
    C: Codec<T>,
{
    fn read(&self) -> Read<T> {
        let raw = match self.backend.get(self.options.area, &self.options.key) {
            Ok(raw) => raw,
            Err(err) => return Read::Ready(Err(err)),
        };
        Read::Ready(raw.map(|raw| self.codec.decode(&raw)).transpose())
    }

    fn write(&self, value: &T) -> Write {
        let written = self
            .codec
            .encode(value)
            .and_then(|raw| self.backend.set(self.options.area, &self.options.key, raw));
        Write::Done(written)
    }
}
