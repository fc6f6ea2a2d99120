//! Cluster-scoped query keys and invalidation patterns.
//!
//! `QueryKey`'s private inner struct means a key can only be built through
//! constructors that take a `ClusterId`. Reads on one cluster can never be
//! served from another cluster's entries.

use gluon_core::{Address, ClusterId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The read operation a key caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryKind {
    /// Every journal entry owned by the program (`listAll`).
    Accounts,
    /// A single journal entry (`fetchOne`).
    Entry,
    /// Deployment info of the program account itself.
    ProgramAccount,
}

impl QueryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accounts => "accounts",
            Self::Entry => "entry",
            Self::ProgramAccount => "program_account",
        }
    }
}

/// A cache key: operation, cluster and an optional record address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    inner: QueryKeyInner,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct QueryKeyInner {
    kind: QueryKind,
    cluster: ClusterId,
    address: Option<Address>,
}

impl QueryKey {
    /// Key for a collection-level read such as `listAll`.
    pub fn collection(kind: QueryKind, cluster: ClusterId) -> Self {
        Self {
            inner: QueryKeyInner {
                kind,
                cluster,
                address: None,
            },
        }
    }

    /// Key for a read of one record.
    pub fn record(kind: QueryKind, cluster: ClusterId, address: Address) -> Self {
        Self {
            inner: QueryKeyInner {
                kind,
                cluster,
                address: Some(address),
            },
        }
    }

    pub fn kind(&self) -> QueryKind {
        self.inner.kind
    }

    pub fn cluster(&self) -> &ClusterId {
        &self.inner.cluster
    }

    pub fn address(&self) -> Option<&Address> {
        self.inner.address.as_ref()
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.inner.kind.as_str(), self.inner.cluster)?;
        if let Some(address) = &self.inner.address {
            write!(f, "/{}", address.ellipsify(4))?;
        }
        Ok(())
    }
}

/// Structural prefix over query keys.
///
/// Unset components match anything, so `operation(Entry, c)` covers every
/// single-entry key on cluster `c` while `record(Entry, c, a)` covers one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPattern {
    cluster: ClusterId,
    kind: Option<QueryKind>,
    address: Option<Address>,
}

impl KeyPattern {
    /// Every key on a cluster.
    pub fn cluster(cluster: ClusterId) -> Self {
        Self {
            cluster,
            kind: None,
            address: None,
        }
    }

    /// Every key of one operation on a cluster.
    pub fn operation(kind: QueryKind, cluster: ClusterId) -> Self {
        Self {
            cluster,
            kind: Some(kind),
            address: None,
        }
    }

    /// One record's key.
    pub fn record(kind: QueryKind, cluster: ClusterId, address: Address) -> Self {
        Self {
            cluster,
            kind: Some(kind),
            address: Some(address),
        }
    }

    pub fn matches(&self, key: &QueryKey) -> bool {
        if &self.cluster != key.cluster() {
            return false;
        }
        if self.kind.is_some_and(|kind| kind != key.kind()) {
            return false;
        }
        match &self.address {
            Some(address) => key.address() == Some(address),
            None => true,
        }
    }
}

impl From<&QueryKey> for KeyPattern {
    fn from(key: &QueryKey) -> Self {
        Self {
            cluster: key.cluster().clone(),
            kind: Some(key.kind()),
            address: key.address().copied(),
        }
    }
}
