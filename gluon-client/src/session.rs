//! Session context for one cluster.
//!
//! A [`JournalClient`] owns everything that used to be ambient client state:
//! the program client, the query caches, the outcome channel and one
//! orchestrator per write kind. Nothing is global. Switching clusters builds
//! a new session and tears down the old caches.

use gluon_cache::{CacheConfig, CacheEntry, CacheStats, KeyPattern, QueryKind};
use gluon_core::{
    Address, Cluster, ConfirmationToken, JournalEntry, JournalError, JournalResult,
    ProgramAccount, ProgramId, Pubkey,
};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::info;

use crate::config::ClientConfig;
use crate::mutation::{
    MutationOrchestrator, MutationOutcome, MutationRequest, OutcomeChannel,
};
use crate::notifications::{NotificationRelay, NotificationSink};
use crate::program::{DeleteTarget, ProgramClient, ProgramInfo};
use crate::queries::SessionCaches;
use crate::signer::Signer;
use crate::transport::RemoteTransport;

const DEFAULT_OUTCOME_CAPACITY: usize = 64;

/// Builder for [`JournalClient`].
pub struct JournalClientBuilder {
    cluster: Cluster,
    transport: Arc<dyn RemoteTransport>,
    signer: Option<Arc<dyn Signer>>,
    cache: CacheConfig,
    outcome_capacity: usize,
}

impl JournalClientBuilder {
    pub fn signer(mut self, signer: Arc<dyn Signer>) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn cache_config(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    pub fn outcome_capacity(mut self, capacity: usize) -> Self {
        self.outcome_capacity = capacity.max(1);
        self
    }

    pub fn build(self) -> JournalClient {
        let program = Arc::new(ProgramClient::new(
            self.cluster,
            self.transport,
            self.signer,
        ));
        let caches = SessionCaches::new(Arc::clone(&program), self.cache.clone());
        let outcomes = OutcomeChannel::new(self.outcome_capacity);
        let orchestrator =
            || MutationOrchestrator::new(Arc::clone(&program), caches.clone(), outcomes.clone());

        info!(
            cluster = %program.cluster().name,
            program_id = %program.program_id(),
            signer = ?program.signer_pubkey(),
            "Journal session started"
        );
        JournalClient {
            create: orchestrator(),
            update: orchestrator(),
            delete: orchestrator(),
            program,
            caches,
            outcomes,
            cache_config: self.cache,
            outcome_capacity: self.outcome_capacity,
        }
    }
}

/// Client-state context for the journal program on one cluster.
pub struct JournalClient {
    program: Arc<ProgramClient>,
    caches: SessionCaches,
    outcomes: OutcomeChannel,
    create: MutationOrchestrator,
    update: MutationOrchestrator,
    delete: MutationOrchestrator,
    cache_config: CacheConfig,
    outcome_capacity: usize,
}

impl JournalClient {
    pub fn builder(cluster: Cluster, transport: Arc<dyn RemoteTransport>) -> JournalClientBuilder {
        JournalClientBuilder {
            cluster,
            transport,
            signer: None,
            cache: CacheConfig::default(),
            outcome_capacity: DEFAULT_OUTCOME_CAPACITY,
        }
    }

    /// Session for the configured cluster.
    pub fn from_config(
        config: &ClientConfig,
        transport: Arc<dyn RemoteTransport>,
        signer: Option<Arc<dyn Signer>>,
    ) -> Self {
        let mut builder = Self::builder(config.cluster.clone(), transport)
            .cache_config(config.cache_config())
            .outcome_capacity(config.outcome_capacity);
        builder.signer = signer;
        builder.build()
    }

    pub fn cluster(&self) -> &Cluster {
        self.program.cluster()
    }

    pub fn program_id(&self) -> ProgramId {
        self.program.program_id()
    }

    pub fn program(&self) -> &Arc<ProgramClient> {
        &self.program
    }

    /// Identity of the connected signer.
    pub fn owner(&self) -> Option<Pubkey> {
        self.program.signer_pubkey()
    }

    /// Address of the connected signer's entry titled `title`.
    pub fn entry_address(&self, title: &str) -> JournalResult<Address> {
        let owner = self.owner().ok_or(JournalError::SignerNotConnected)?;
        self.program.derive_address(&owner, title)
    }

    // ========================================================================
    // READS
    // ========================================================================

    /// Every journal entry on the cluster.
    pub async fn accounts(&self) -> CacheEntry<Vec<ProgramAccount>> {
        self.caches
            .accounts()
            .get(self.caches.accounts_key(), self.caches.accounts_query())
            .await
    }

    /// One entry; `Some(None)` data means the read succeeded and nothing is there.
    pub async fn entry(&self, address: Address) -> CacheEntry<Option<JournalEntry>> {
        self.caches
            .entries()
            .get(self.caches.entry_key(address), self.caches.entry_query())
            .await
    }

    pub async fn program_account(&self) -> CacheEntry<Option<ProgramInfo>> {
        self.caches
            .program_accounts()
            .get(
                self.caches.program_account_key(),
                self.caches.program_account_query(),
            )
            .await
    }

    pub async fn watch_accounts(&self) -> watch::Receiver<CacheEntry<Vec<ProgramAccount>>> {
        self.caches
            .accounts()
            .subscribe(self.caches.accounts_key())
            .await
    }

    pub async fn watch_entry(
        &self,
        address: Address,
    ) -> watch::Receiver<CacheEntry<Option<JournalEntry>>> {
        self.caches
            .entries()
            .subscribe(self.caches.entry_key(address))
            .await
    }

    /// Mark the entry collection stale and refetch it.
    pub async fn refresh_accounts(&self) -> usize {
        self.caches
            .accounts()
            .invalidate(&KeyPattern::operation(
                QueryKind::Accounts,
                self.caches.cluster().clone(),
            ))
            .await
    }

    pub async fn cache_stats(&self) -> CacheStats {
        let accounts = self.caches.accounts().stats().await;
        let entries = self.caches.entries().stats().await;
        let program = self.caches.program_accounts().stats().await;
        CacheStats {
            hits: accounts.hits + entries.hits + program.hits,
            misses: accounts.misses + entries.misses + program.misses,
            joined: accounts.joined + entries.joined + program.joined,
            fetches: accounts.fetches + entries.fetches + program.fetches,
            invalidations: accounts.invalidations + entries.invalidations + program.invalidations,
            entry_count: accounts.entry_count + entries.entry_count + program.entry_count,
        }
    }

    // ========================================================================
    // WRITES
    // ========================================================================

    pub fn create_mutation(&self) -> &MutationOrchestrator {
        &self.create
    }

    pub fn update_mutation(&self) -> &MutationOrchestrator {
        &self.update
    }

    pub fn delete_mutation(&self) -> &MutationOrchestrator {
        &self.delete
    }

    pub async fn create_entry(
        &self,
        title: &str,
        message: &str,
    ) -> JournalResult<ConfirmationToken> {
        self.create
            .issue(MutationRequest::create(title, message))
            .await
    }

    pub async fn update_entry(
        &self,
        title: &str,
        message: &str,
    ) -> JournalResult<ConfirmationToken> {
        self.update
            .issue(MutationRequest::update(title, message))
            .await
    }

    pub async fn delete_entry(&self, target: DeleteTarget) -> JournalResult<ConfirmationToken> {
        self.delete.issue(MutationRequest::delete(target)).await
    }

    /// Outcomes of every write settled from now on.
    pub fn subscribe_outcomes(&self) -> broadcast::Receiver<MutationOutcome> {
        self.outcomes.subscribe()
    }

    /// Relay outcomes of this session to `sink` until the session is dropped.
    pub fn relay_notifications(&self, sink: Arc<dyn NotificationSink>) -> NotificationRelay {
        NotificationRelay::spawn(self.outcomes.subscribe(), sink)
    }

    // ========================================================================
    // LIFECYCLE
    // ========================================================================

    /// Tear this session down and start one on `cluster`.
    ///
    /// The signer and cache settings carry over; cached reads do not.
    pub async fn switch_cluster(
        self,
        cluster: Cluster,
        transport: Arc<dyn RemoteTransport>,
    ) -> JournalClient {
        let builder = JournalClientBuilder {
            cluster,
            transport,
            signer: self.program.signer().cloned(),
            cache: self.cache_config.clone(),
            outcome_capacity: self.outcome_capacity,
        };
        self.shutdown().await;
        builder.build()
    }

    /// Drop every cached read of this session.
    pub async fn shutdown(self) {
        let removed = self.caches.clear().await;
        info!(cluster = %self.cluster().name, removed, "Journal session closed");
    }
}
