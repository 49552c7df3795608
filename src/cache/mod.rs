//! Response cache subsystem.
//!
//! # Data Flow
//! ```text
//! Cacheable read:
//!     → key.rs (fingerprint from operation, resource, params)
//!     → store.rs get (fresh hit short-circuits the call)
//!     → on success: store.rs put_if_current (skipped if invalidated meanwhile)
//!
//! Successful write:
//!     → store.rs invalidate(resource) before the outcome is returned
//! ```
//!
//! # Design Decisions
//! - TTL is checked on every lookup; expired entries are never served
//! - Invalidation is driven by the executor, not by write operations
//! - LRU eviction on insert once the entry bound is exceeded

pub mod key;
pub mod store;

pub use key::CacheKey;
pub use store::{CachedResponse, Generation, ResponseCache};
