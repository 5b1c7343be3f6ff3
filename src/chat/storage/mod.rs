//! Persistence for sessions and message lists.

pub mod kv_store;
pub mod session_store;

pub use kv_store::{KeyValueStore, KvWrite, MemoryKvStore, SqliteKvStore, StoreFuture};
pub use session_store::SessionStore;
