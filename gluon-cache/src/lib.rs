//! Query cache with explicit staleness and single-flight reads.
//!
//! This crate keeps the client's view of ledger reads consistent with the
//! writes it issues.
//!
//! # Design Philosophy
//!
//! The cache never pretends to be authoritative. Every read returns a
//! [`CacheEntry<T>`] carrying its `status`, last error, staleness flag and
//! generation, so callers can render "refreshing" instead of flickering to an
//! empty state.
//!
//! # Keys
//!
//! [`QueryKey`] cannot be built without a [`ClusterId`](gluon_core::ClusterId):
//! state from one cluster is unreachable from another by construction.
//! [`KeyPattern`] matches keys structurally for invalidation.
//!
//! # Example
//!
//! ```ignore
//! let key = QueryKey::collection(QueryKind::Accounts, cluster.id());
//! let entry = cache.get(key, fetcher).await;
//!
//! // After a write is confirmed:
//! cache.invalidate(&KeyPattern::operation(QueryKind::Accounts, cluster.id())).await;
//! ```

pub mod entry;
pub mod key;
pub mod query_cache;
pub mod stats;

pub use entry::{CacheEntry, Generation, QueryStatus};
pub use key::{KeyPattern, QueryKey, QueryKind};
pub use query_cache::{CacheConfig, QueryCache, QueryFetcher};
pub use stats::CacheStats;
