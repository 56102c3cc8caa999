//! # tokensmith-db-memory
//!
//! Embedded in-memory backends for the Tokensmith storage contracts:
//!
//! - [`MemoryStore`]: a transactional record store over tokio `RwLock`
//!   guarded entity maps, with snapshot rollback and cascading delete
//! - [`MemoryCache`]: a TTL key/value cache over a lock-free papaya map
//!
//! Both are suitable for tests and single-process deployments; networked
//! backends implement the same traits.

pub mod kv;
pub mod store;

pub use kv::MemoryCache;
pub use store::MemoryStore;
