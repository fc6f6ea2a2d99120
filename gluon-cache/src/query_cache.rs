//! Read-through query cache with single-flight fetches.
//!
//! Each key owns one slot holding the latest [`CacheEntry`], the fetcher that
//! knows how to refresh it, the fetch currently in flight (if any) and a
//! watch channel that publishes every transition.
//!
//! Fetches run on their own task and are shared through a
//! [`Shared`](futures_util::future::Shared) future: concurrent readers of a
//! cold key join the same fetch, and a reader that gives up does not cancel
//! it for the others. The slot lock is never held across a fetch.

use async_trait::async_trait;
use chrono::Utc;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use gluon_core::JournalResult;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, warn};

use crate::entry::{CacheEntry, Generation, QueryStatus};
use crate::key::{KeyPattern, QueryKey};
use crate::stats::{CacheStats, StatCounters};

/// Configuration for the query cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Start a background refetch for every entry an invalidation marks stale.
    pub refetch_on_invalidate: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            refetch_on_invalidate: true,
        }
    }
}

impl CacheConfig {
    /// Create a new cache config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable background refetch on invalidation.
    pub fn with_refetch_on_invalidate(mut self, enabled: bool) -> Self {
        self.refetch_on_invalidate = enabled;
        self
    }
}

/// Source of truth for one kind of query.
///
/// The cache remembers the first fetcher registered for a key and reuses it
/// for background refetches after invalidation.
#[async_trait]
pub trait QueryFetcher<T>: Send + Sync {
    /// Fetch the current value for `key` from the remote.
    async fn fetch(&self, key: &QueryKey) -> JournalResult<T>;
}

type SharedFetch<T> = Shared<BoxFuture<'static, JournalResult<T>>>;

struct InFlight<T> {
    generation: Generation,
    future: SharedFetch<T>,
}

struct Slot<T> {
    entry: CacheEntry<T>,
    fetcher: Option<Arc<dyn QueryFetcher<T>>>,
    in_flight: Option<InFlight<T>>,
    tx: watch::Sender<CacheEntry<T>>,
}

impl<T: Clone> Slot<T> {
    fn new(key: QueryKey) -> Self {
        let entry = CacheEntry::idle(key);
        let (tx, _rx) = watch::channel(entry.clone());
        Self {
            entry,
            fetcher: None,
            in_flight: None,
            tx,
        }
    }

    fn publish(&self) {
        self.tx.send_replace(self.entry.clone());
    }
}

struct CacheInner<T> {
    slots: Mutex<HashMap<QueryKey, Slot<T>>>,
    stats: StatCounters,
    config: CacheConfig,
}

/// Session-scoped cache of read results.
///
/// Cloning is cheap and every clone shares the same slots.
pub struct QueryCache<T> {
    inner: Arc<CacheInner<T>>,
}

impl<T> Clone for QueryCache<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for QueryCache<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl<T> QueryCache<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(config: CacheConfig) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                slots: Mutex::new(HashMap::new()),
                stats: StatCounters::default(),
                config,
            }),
        }
    }

    /// Get the cache configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Read `key`, fetching through `fetcher` when the entry is cold, stale
    /// or failed.
    ///
    /// Concurrent callers share one fetch. If the entry is invalidated while
    /// the caller waits, the caller follows the newer fetch instead of
    /// returning a result computed before the invalidation. A failed fetch is
    /// reported through the entry's `status` and `error`; the previous `data`
    /// stays in place.
    pub async fn get(&self, key: QueryKey, fetcher: Arc<dyn QueryFetcher<T>>) -> CacheEntry<T> {
        let mut waited = false;
        loop {
            let flight = {
                let mut slots = self.inner.slots.lock().await;
                let slot = slots
                    .entry(key.clone())
                    .or_insert_with(|| Slot::new(key.clone()));
                if slot.fetcher.is_none() {
                    slot.fetcher = Some(Arc::clone(&fetcher));
                }

                if let Some(in_flight) = &slot.in_flight {
                    if !waited {
                        StatCounters::bump(&self.inner.stats.joined);
                    }
                    in_flight.future.clone()
                } else if !waited && slot.entry.needs_fetch() {
                    StatCounters::bump(&self.inner.stats.misses);
                    match self.inner.start_fetch(slot) {
                        Some(future) => future,
                        None => return slot.entry.clone(),
                    }
                } else {
                    if !waited {
                        StatCounters::bump(&self.inner.stats.hits);
                    }
                    return slot.entry.clone();
                }
            };

            waited = true;
            let _ = flight.await;
        }
    }

    /// Snapshot of `key` without fetching.
    pub async fn peek(&self, key: &QueryKey) -> Option<CacheEntry<T>> {
        let slots = self.inner.slots.lock().await;
        slots.get(key).map(|slot| slot.entry.clone())
    }

    /// Write `data` for `key` directly, superseding any fetch in flight.
    pub async fn set(&self, key: QueryKey, data: T) {
        let mut slots = self.inner.slots.lock().await;
        let slot = slots
            .entry(key.clone())
            .or_insert_with(|| Slot::new(key.clone()));
        slot.in_flight = None;
        slot.entry.generation = slot.entry.generation.next();
        slot.entry.data = Some(data);
        slot.entry.status = QueryStatus::Success;
        slot.entry.error = None;
        slot.entry.is_stale = false;
        slot.entry.updated_at = Some(Utc::now());
        slot.publish();
        debug!(key = %key, "Cache entry set");
    }

    /// Mark every entry matching `pattern` stale and refetch it in the
    /// background. Stale data stays visible until the refetch lands.
    ///
    /// Returns the number of entries invalidated.
    pub async fn invalidate(&self, pattern: &KeyPattern) -> usize {
        let mut slots = self.inner.slots.lock().await;
        let mut count = 0;
        for slot in slots
            .values_mut()
            .filter(|slot| pattern.matches(&slot.entry.key))
        {
            count += 1;
            StatCounters::bump(&self.inner.stats.invalidations);
            slot.entry.generation = slot.entry.generation.next();
            slot.entry.is_stale = true;
            let superseded = slot.in_flight.take().is_some();

            let refetching = self.inner.config.refetch_on_invalidate
                && self.inner.start_fetch(slot).is_some();
            if !refetching {
                if superseded {
                    slot.entry.status = if slot.entry.data.is_some() {
                        QueryStatus::Success
                    } else {
                        QueryStatus::Idle
                    };
                }
                slot.publish();
            }
            debug!(
                key = %slot.entry.key,
                generation = slot.entry.generation.value(),
                refetching,
                "Cache entry invalidated"
            );
        }
        count
    }

    /// Drop every entry matching `pattern`. Subscribers see their channel
    /// close; fetches in flight for those keys are discarded when they land.
    pub async fn remove(&self, pattern: &KeyPattern) -> usize {
        let mut slots = self.inner.slots.lock().await;
        let before = slots.len();
        slots.retain(|key, _| !pattern.matches(key));
        before - slots.len()
    }

    /// Observe every status/data transition of `key`.
    ///
    /// Subscribing does not fetch; the receiver starts at the current state
    /// (idle for a key nobody has read yet).
    pub async fn subscribe(&self, key: QueryKey) -> watch::Receiver<CacheEntry<T>> {
        let mut slots = self.inner.slots.lock().await;
        slots
            .entry(key.clone())
            .or_insert_with(|| Slot::new(key))
            .tx
            .subscribe()
    }

    /// Get cache statistics.
    pub async fn stats(&self) -> CacheStats {
        let slots = self.inner.slots.lock().await;
        self.inner.stats.snapshot(slots.len() as u64)
    }
}

impl<T> CacheInner<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Spawn a fetch for `slot` under its current generation.
    ///
    /// Returns `None` when no fetcher has been registered for the key yet.
    fn start_fetch(self: &Arc<Self>, slot: &mut Slot<T>) -> Option<SharedFetch<T>> {
        let fetcher = Arc::clone(slot.fetcher.as_ref()?);
        let generation = slot.entry.generation;
        let key = slot.entry.key.clone();
        let inner = Arc::clone(self);

        let future = async move {
            let result = fetcher.fetch(&key).await;
            inner.settle(&key, generation, result.clone()).await;
            result
        }
        .boxed()
        .shared();

        tokio::spawn(future.clone());
        StatCounters::bump(&self.stats.fetches);

        slot.in_flight = Some(InFlight {
            generation,
            future: future.clone(),
        });
        slot.entry.status = QueryStatus::Loading;
        slot.entry.error = None;
        slot.publish();
        debug!(key = %slot.entry.key, generation = generation.value(), "Fetch started");
        Some(future)
    }

    /// Write a fetch result back, unless a newer generation superseded it.
    async fn settle(&self, key: &QueryKey, generation: Generation, result: JournalResult<T>) {
        let mut slots = self.slots.lock().await;
        let Some(slot) = slots.get_mut(key) else {
            debug!(key = %key, "Discarding fetch for removed entry");
            return;
        };
        match &slot.in_flight {
            Some(in_flight) if in_flight.generation == generation => {}
            _ => {
                debug!(
                    key = %key,
                    generation = generation.value(),
                    current = slot.entry.generation.value(),
                    "Discarding superseded fetch"
                );
                return;
            }
        }

        slot.in_flight = None;
        match result {
            Ok(data) => {
                slot.entry.data = Some(data);
                slot.entry.status = QueryStatus::Success;
                slot.entry.error = None;
                slot.entry.is_stale = false;
                slot.entry.updated_at = Some(Utc::now());
                debug!(key = %key, generation = generation.value(), "Fetch settled");
            }
            Err(err) => {
                warn!(key = %key, error = %err, "Fetch failed, keeping previous data");
                slot.entry.status = QueryStatus::Error;
                slot.entry.error = Some(err);
            }
        }
        slot.publish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::QueryKind;
    use gluon_core::{ClusterId, JournalError};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Semaphore;

    /// Fetcher returning `v1`, `v2`, ... optionally held behind a gate.
    struct ScriptedFetcher {
        calls: AtomicUsize,
        gate: Option<Semaphore>,
        fail: std::sync::atomic::AtomicBool,
    }

    impl ScriptedFetcher {
        fn open() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                gate: None,
                fail: Default::default(),
            })
        }

        fn gated() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                gate: Some(Semaphore::new(0)),
                fail: Default::default(),
            })
        }

        fn release(&self, permits: usize) {
            if let Some(gate) = &self.gate {
                gate.add_permits(permits);
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn fail_next(&self, fail: bool) {
            self.fail.store(fail, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl QueryFetcher<String> for ScriptedFetcher {
        async fn fetch(&self, _key: &QueryKey) -> JournalResult<String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some(gate) = &self.gate {
                gate.acquire().await.expect("gate closed").forget();
            }
            if self.fail.load(Ordering::SeqCst) {
                return Err(JournalError::unavailable("connection refused"));
            }
            Ok(format!("v{}", n))
        }
    }

    fn accounts_key() -> QueryKey {
        QueryKey::collection(QueryKind::Accounts, ClusterId::new("local"))
    }

    fn accounts_pattern() -> KeyPattern {
        KeyPattern::operation(QueryKind::Accounts, ClusterId::new("local"))
    }

    async fn wait_for_calls(fetcher: &ScriptedFetcher, calls: usize) {
        while fetcher.calls() < calls {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_cold_get_fetches_once_then_hits() {
        let cache = QueryCache::<String>::default();
        let fetcher = ScriptedFetcher::open();

        let first = cache.get(accounts_key(), fetcher.clone()).await;
        assert_eq!(first.data.as_deref(), Some("v1"));
        assert_eq!(first.status, QueryStatus::Success);

        let second = cache.get(accounts_key(), fetcher.clone()).await;
        assert_eq!(second.data.as_deref(), Some("v1"));
        assert_eq!(fetcher.calls(), 1);

        let stats = cache.stats().await;
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.entry_count, 1);
    }

    #[tokio::test]
    async fn test_concurrent_cold_gets_share_one_fetch() {
        let cache = QueryCache::<String>::default();
        let fetcher = ScriptedFetcher::gated();

        let (a, b, c, _) = tokio::join!(
            cache.get(accounts_key(), fetcher.clone()),
            cache.get(accounts_key(), fetcher.clone()),
            cache.get(accounts_key(), fetcher.clone()),
            async { fetcher.release(1) },
        );

        assert_eq!(fetcher.calls(), 1);
        for entry in [a, b, c] {
            assert_eq!(entry.data.as_deref(), Some("v1"));
        }
        assert_eq!(cache.stats().await.joined, 2);
    }

    #[tokio::test]
    async fn test_invalidate_keeps_stale_data_visible() {
        let cache = QueryCache::<String>::default();
        let fetcher = ScriptedFetcher::gated();
        fetcher.release(1);
        cache.get(accounts_key(), fetcher.clone()).await;

        assert_eq!(cache.invalidate(&accounts_pattern()).await, 1);
        let during = cache.peek(&accounts_key()).await.unwrap();
        assert_eq!(during.data.as_deref(), Some("v1"));
        assert!(during.is_stale);
        assert_eq!(during.status, QueryStatus::Loading);

        fetcher.release(1);
        let after = cache.get(accounts_key(), fetcher.clone()).await;
        assert_eq!(after.data.as_deref(), Some("v2"));
        assert!(!after.is_stale);
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn test_fetch_started_before_invalidation_is_discarded() {
        let cache = QueryCache::<String>::default();
        let fetcher = ScriptedFetcher::gated();

        let reader = tokio::spawn({
            let cache = cache.clone();
            let fetcher = fetcher.clone();
            async move { cache.get(accounts_key(), fetcher).await }
        });
        wait_for_calls(&fetcher, 1).await;

        cache.invalidate(&accounts_pattern()).await;
        wait_for_calls(&fetcher, 2).await;
        fetcher.release(2);

        let entry = reader.await.unwrap();
        assert_eq!(entry.data.as_deref(), Some("v2"));
        assert_eq!(entry.generation, Generation::zero().next());
    }

    #[tokio::test]
    async fn test_failed_fetch_keeps_previous_data() {
        let cache = QueryCache::<String>::default();
        let fetcher = ScriptedFetcher::open();
        cache.get(accounts_key(), fetcher.clone()).await;

        fetcher.fail_next(true);
        cache.invalidate(&accounts_pattern()).await;
        let entry = cache.get(accounts_key(), fetcher.clone()).await;

        assert_eq!(entry.status, QueryStatus::Error);
        assert_eq!(entry.data.as_deref(), Some("v1"));
        assert!(matches!(
            entry.error,
            Some(JournalError::RemoteUnavailable { .. })
        ));
        assert!(entry.is_stale);
    }

    #[tokio::test]
    async fn test_error_entry_refetches_on_next_get() {
        let cache = QueryCache::<String>::default();
        let fetcher = ScriptedFetcher::open();
        fetcher.fail_next(true);
        let failed = cache.get(accounts_key(), fetcher.clone()).await;
        assert!(failed.is_error());
        assert!(failed.data.is_none());

        fetcher.fail_next(false);
        let recovered = cache.get(accounts_key(), fetcher.clone()).await;
        assert_eq!(recovered.data.as_deref(), Some("v2"));
        assert!(recovered.is_success());
    }

    #[tokio::test]
    async fn test_retry_after_error_clears_error_while_loading() {
        let cache = QueryCache::<String>::default();
        let fetcher = ScriptedFetcher::gated();
        fetcher.fail_next(true);
        fetcher.release(1);
        assert!(cache.get(accounts_key(), fetcher.clone()).await.is_error());

        fetcher.fail_next(false);
        let reader = tokio::spawn({
            let cache = cache.clone();
            let fetcher = fetcher.clone();
            async move { cache.get(accounts_key(), fetcher).await }
        });
        while fetcher.calls() < 2 {
            tokio::task::yield_now().await;
        }
        let during = cache.peek(&accounts_key()).await.unwrap();
        assert_eq!(during.status, QueryStatus::Loading);
        assert!(during.error.is_none());

        fetcher.release(1);
        assert!(reader.await.unwrap().is_success());
    }

    #[tokio::test]
    async fn test_invalidate_without_refetch_only_marks_stale() {
        let config = CacheConfig::new().with_refetch_on_invalidate(false);
        let cache = QueryCache::<String>::new(config);
        let fetcher = ScriptedFetcher::open();
        cache.get(accounts_key(), fetcher.clone()).await;

        cache.invalidate(&accounts_pattern()).await;
        let entry = cache.peek(&accounts_key()).await.unwrap();
        assert!(entry.is_stale);
        assert_eq!(entry.status, QueryStatus::Success);
        assert_eq!(fetcher.calls(), 1);

        let refreshed = cache.get(accounts_key(), fetcher.clone()).await;
        assert_eq!(refreshed.data.as_deref(), Some("v2"));
    }

    #[tokio::test]
    async fn test_set_supersedes_in_flight_fetch() {
        let cache = QueryCache::<String>::default();
        let fetcher = ScriptedFetcher::gated();

        let reader = tokio::spawn({
            let cache = cache.clone();
            let fetcher = fetcher.clone();
            async move { cache.get(accounts_key(), fetcher).await }
        });
        wait_for_calls(&fetcher, 1).await;

        cache.set(accounts_key(), "manual".to_string()).await;
        fetcher.release(1);

        let entry = reader.await.unwrap();
        assert_eq!(entry.data.as_deref(), Some("manual"));
        tokio::task::yield_now().await;
        let later = cache.peek(&accounts_key()).await.unwrap();
        assert_eq!(later.data.as_deref(), Some("manual"));
    }

    #[tokio::test]
    async fn test_subscribers_observe_transitions() {
        let cache = QueryCache::<String>::default();
        let fetcher = ScriptedFetcher::gated();
        let mut rx = cache.subscribe(accounts_key()).await;
        assert_eq!(rx.borrow().status, QueryStatus::Idle);

        let reader = tokio::spawn({
            let cache = cache.clone();
            let fetcher = fetcher.clone();
            async move { cache.get(accounts_key(), fetcher).await }
        });

        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().status, QueryStatus::Loading);

        fetcher.release(1);
        rx.changed().await.unwrap();
        let settled = rx.borrow_and_update().clone();
        assert_eq!(settled.status, QueryStatus::Success);
        assert_eq!(settled.data.as_deref(), Some("v1"));
        reader.await.unwrap();
    }

    #[tokio::test]
    async fn test_remove_drops_matching_entries() {
        let cache = QueryCache::<String>::default();
        let fetcher = ScriptedFetcher::open();
        cache.get(accounts_key(), fetcher.clone()).await;

        let removed = cache
            .remove(&KeyPattern::cluster(ClusterId::new("local")))
            .await;
        assert_eq!(removed, 1);
        assert!(cache.peek(&accounts_key()).await.is_none());
    }

    #[tokio::test]
    async fn test_invalidate_ignores_other_clusters() {
        let cache = QueryCache::<String>::default();
        let fetcher = ScriptedFetcher::open();
        cache.get(accounts_key(), fetcher.clone()).await;

        let other = KeyPattern::operation(QueryKind::Accounts, ClusterId::new("devnet"));
        assert_eq!(cache.invalidate(&other).await, 0);
        assert!(!cache.peek(&accounts_key()).await.unwrap().is_stale);
    }
}
