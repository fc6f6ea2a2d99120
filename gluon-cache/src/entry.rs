//! Cache entries and their lifecycle status.

use chrono::{DateTime, Utc};
use gluon_core::JournalError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::key::QueryKey;

/// Lifecycle of a cached read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryStatus {
    /// Never fetched.
    Idle,
    /// A fetch is in flight. `data` may still hold the previous value.
    Loading,
    /// The last fetch succeeded.
    Success,
    /// The last fetch failed. `data` still holds the last good value, if any.
    Error,
}

/// Monotonic per-entry counter, bumped by every invalidation or `set`.
///
/// A fetch records the generation it started under and only writes its
/// result back if the entry is still on that generation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Generation(u64);

impl Generation {
    pub fn zero() -> Self {
        Self(0)
    }

    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    pub fn is_newer_than(&self, other: &Generation) -> bool {
        self.0 > other.0
    }
}

/// Snapshot of one cache slot.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<T> {
    pub key: QueryKey,
    /// Last known value, absent if never fetched successfully.
    pub data: Option<T>,
    pub status: QueryStatus,
    /// Present only when `status` is `Error`.
    pub error: Option<JournalError>,
    /// Set by invalidation, cleared when a fetch under the new generation lands.
    pub is_stale: bool,
    pub generation: Generation,
    /// When `data` was last written.
    pub updated_at: Option<DateTime<Utc>>,
}

impl<T> CacheEntry<T> {
    pub fn idle(key: QueryKey) -> Self {
        Self {
            key,
            data: None,
            status: QueryStatus::Idle,
            error: None,
            is_stale: false,
            generation: Generation::zero(),
            updated_at: None,
        }
    }

    pub fn data(&self) -> Option<&T> {
        self.data.as_ref()
    }

    pub fn into_data(self) -> Option<T> {
        self.data
    }

    pub fn is_loading(&self) -> bool {
        self.status == QueryStatus::Loading
    }

    pub fn is_success(&self) -> bool {
        self.status == QueryStatus::Success
    }

    pub fn is_error(&self) -> bool {
        self.status == QueryStatus::Error
    }

    /// Whether the next `get` has to go to the remote.
    pub fn needs_fetch(&self) -> bool {
        self.is_stale || self.data.is_none() || self.status != QueryStatus::Success
    }

    /// Age of `data`, zero if never written.
    pub fn age(&self) -> Duration {
        match self.updated_at {
            Some(at) => Utc::now()
                .signed_duration_since(at)
                .to_std()
                .unwrap_or(Duration::ZERO),
            None => Duration::ZERO,
        }
    }
}
