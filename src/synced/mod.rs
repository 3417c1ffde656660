//! Containers mirrored to external storage.
//!
//! This module provides write-through persistence with lazy hydration:
//! - `SyncedState`: a container that loads from and saves to a `Storage`
//! - `Storage`: the read/write contract, with ready or deferred reads and writes
//! - `StorageEntry`: an encoded entry of a key-value backend such as `MemoryStore`
//! - `Codec`: how an entry is encoded, `Json` unless chosen otherwise

mod storage;
mod synced;

pub use storage::{Area, Codec, EntryOptions, Json, KeyValue, MemoryStore, Read, Storage, StorageEntry, Write};
pub use synced::SyncedState;
