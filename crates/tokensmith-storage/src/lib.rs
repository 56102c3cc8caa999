//! # tokensmith-storage
//!
//! Storage contracts for the Tokensmith credential and session engine.
//!
//! This crate defines:
//! - The four persisted entity types: [`Subject`], [`Credential`],
//!   [`SessionToken`], and [`ResetToken`]
//! - The transactional record store gateway ([`RecordStore`] and the
//!   per-entity store traits)
//! - The generic [`KeyValueCache`] contract used by the cache-aside layer
//!
//! Implementations live in separate crates; `tokensmith-db-memory` provides
//! the embedded in-memory backend used by tests and single-process
//! deployments.

pub mod error;
pub mod kv;
pub mod traits;
pub mod types;

pub use error::{StorageError, StorageResult};
pub use kv::KeyValueCache;
pub use traits::{
    CredentialStore, RecordStore, ResetTokenStore, SessionTokenStore, StoreTransaction,
    SubjectStore,
};
pub use types::{Credential, ResetToken, SessionToken, Subject};
