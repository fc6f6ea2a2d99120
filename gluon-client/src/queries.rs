//! Read queries of a session and the caches that hold them.

use async_trait::async_trait;
use gluon_cache::{CacheConfig, KeyPattern, QueryCache, QueryFetcher, QueryKey, QueryKind};
use gluon_core::{
    Address, ClusterId, JournalEntry, JournalError, JournalResult, MutationKind, ProgramAccount,
};
use std::sync::Arc;
use tracing::debug;

use crate::program::{ProgramClient, ProgramInfo};

/// `list_all` through the program client.
pub struct AccountsQuery {
    program: Arc<ProgramClient>,
}

/// `fetch_one` through the program client.
///
/// A missing entry is a successful read of `None`, so a deleted entry shows
/// up as absent instead of as an error.
pub struct EntryQuery {
    program: Arc<ProgramClient>,
}

/// Program deployment info through the program client.
pub struct ProgramAccountQuery {
    program: Arc<ProgramClient>,
}

#[async_trait]
impl QueryFetcher<Vec<ProgramAccount>> for AccountsQuery {
    async fn fetch(&self, key: &QueryKey) -> JournalResult<Vec<ProgramAccount>> {
        debug!(key = %key, "Fetching journal entries");
        self.program.list_all().await
    }
}

#[async_trait]
impl QueryFetcher<Option<JournalEntry>> for EntryQuery {
    async fn fetch(&self, key: &QueryKey) -> JournalResult<Option<JournalEntry>> {
        let address = key
            .address()
            .ok_or_else(|| JournalError::invalid_input("key", "entry query without address"))?;
        debug!(key = %key, "Fetching journal entry");
        match self.program.fetch_one(address).await {
            Ok(entry) => Ok(Some(entry)),
            Err(JournalError::NotFound { .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }
}

#[async_trait]
impl QueryFetcher<Option<ProgramInfo>> for ProgramAccountQuery {
    async fn fetch(&self, key: &QueryKey) -> JournalResult<Option<ProgramInfo>> {
        debug!(key = %key, "Fetching program account");
        self.program.program_account().await
    }
}

/// The caches of one session, all keyed under the session's cluster.
#[derive(Clone)]
pub struct SessionCaches {
    cluster: ClusterId,
    accounts: QueryCache<Vec<ProgramAccount>>,
    entries: QueryCache<Option<JournalEntry>>,
    program_account: QueryCache<Option<ProgramInfo>>,
    accounts_query: Arc<AccountsQuery>,
    entry_query: Arc<EntryQuery>,
    program_account_query: Arc<ProgramAccountQuery>,
}

impl SessionCaches {
    pub fn new(program: Arc<ProgramClient>, config: CacheConfig) -> Self {
        Self {
            cluster: program.cluster().id(),
            accounts: QueryCache::new(config.clone()),
            entries: QueryCache::new(config.clone()),
            program_account: QueryCache::new(config),
            accounts_query: Arc::new(AccountsQuery {
                program: Arc::clone(&program),
            }),
            entry_query: Arc::new(EntryQuery {
                program: Arc::clone(&program),
            }),
            program_account_query: Arc::new(ProgramAccountQuery { program }),
        }
    }

    pub fn cluster(&self) -> &ClusterId {
        &self.cluster
    }

    pub fn accounts_key(&self) -> QueryKey {
        QueryKey::collection(QueryKind::Accounts, self.cluster.clone())
    }

    pub fn entry_key(&self, address: Address) -> QueryKey {
        QueryKey::record(QueryKind::Entry, self.cluster.clone(), address)
    }

    pub fn program_account_key(&self) -> QueryKey {
        QueryKey::collection(QueryKind::ProgramAccount, self.cluster.clone())
    }

    pub fn accounts(&self) -> &QueryCache<Vec<ProgramAccount>> {
        &self.accounts
    }

    pub fn entries(&self) -> &QueryCache<Option<JournalEntry>> {
        &self.entries
    }

    pub fn program_accounts(&self) -> &QueryCache<Option<ProgramInfo>> {
        &self.program_account
    }

    pub fn accounts_query(&self) -> Arc<dyn QueryFetcher<Vec<ProgramAccount>>> {
        self.accounts_query.clone()
    }

    pub fn entry_query(&self) -> Arc<dyn QueryFetcher<Option<JournalEntry>>> {
        self.entry_query.clone()
    }

    pub fn program_account_query(&self) -> Arc<dyn QueryFetcher<Option<ProgramInfo>>> {
        self.program_account_query.clone()
    }

    /// Invalidate what a confirmed write of `kind` at `address` made stale.
    ///
    /// | write  | invalidated                         |
    /// |--------|-------------------------------------|
    /// | create | entry collection, the entry itself  |
    /// | update | entry collection, the entry itself  |
    /// | delete | entry collection, the entry itself  |
    ///
    /// A read of the entry made before its create cached `None`, so create
    /// invalidates the record key too.
    pub async fn invalidate_after(&self, kind: MutationKind, address: Address) -> usize {
        let count = self
            .accounts
            .invalidate(&KeyPattern::operation(
                QueryKind::Accounts,
                self.cluster.clone(),
            ))
            .await
            + self
                .entries
                .invalidate(&KeyPattern::record(
                    QueryKind::Entry,
                    self.cluster.clone(),
                    address,
                ))
                .await;
        debug!(kind = %kind, address = %address, invalidated = count, "Invalidated after write");
        count
    }

    /// Drop every entry of this session's cluster.
    pub async fn clear(&self) -> usize {
        let pattern = KeyPattern::cluster(self.cluster.clone());
        self.accounts.remove(&pattern).await
            + self.entries.remove(&pattern).await
            + self.program_account.remove(&pattern).await
    }
}
