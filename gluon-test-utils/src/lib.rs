//! Gluon Test Utilities
//!
//! Shared test infrastructure for the Gluon workspace:
//! - Proptest generators for keys, titles and messages
//! - Fixtures for owners and clusters
//! - A scripted query fetcher with call counting and a release gate
//! - Assertions for journal errors

pub use gluon_core::{
    Address, Cluster, ClusterId, ClusterNetwork, JournalEntry, JournalError, JournalResult,
    Pubkey,
};

use async_trait::async_trait;
use gluon_cache::{QueryFetcher, QueryKey};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::Semaphore;

// ============================================================================
// SCRIPTED FETCHER
// ============================================================================

/// Query fetcher returning a fixed value, counting calls.
///
/// When gated, each fetch waits for one permit from [`release`](Self::release),
/// which lets a test hold fetches in flight.
pub struct CountingFetcher<T> {
    value: Mutex<T>,
    calls: AtomicUsize,
    failing: AtomicBool,
    gate: Option<Semaphore>,
}

impl<T: Clone + Send + Sync> CountingFetcher<T> {
    pub fn new(value: T) -> Self {
        Self {
            value: Mutex::new(value),
            calls: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
            gate: None,
        }
    }

    pub fn gated(value: T) -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::new(value)
        }
    }

    /// Let `permits` gated fetches complete.
    pub fn release(&self, permits: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(permits);
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Value returned by fetches from now on.
    pub fn set_value(&self, value: T) {
        *self.value.lock().unwrap_or_else(|p| p.into_inner()) = value;
    }

    /// Make subsequent fetches fail with `RemoteUnavailable`.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl<T: Clone + Send + Sync + 'static> QueryFetcher<T> for CountingFetcher<T> {
    async fn fetch(&self, _key: &QueryKey) -> JournalResult<T> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .map_err(|_| JournalError::unavailable("fetch gate closed"))?
                .forget();
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(JournalError::unavailable("scripted failure"));
        }
        Ok(self.value.lock().unwrap_or_else(|p| p.into_inner()).clone())
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest generators for journal types.

    use super::*;
    use proptest::prelude::*;

    /// Any 32-byte key. Most of these are not valid signer keys.
    pub fn arb_pubkey() -> impl Strategy<Value = Pubkey> {
        any::<[u8; 32]>().prop_map(Pubkey::new)
    }

    /// A key that could belong to a signer (an ed25519 public key).
    pub fn arb_owner() -> impl Strategy<Value = Pubkey> {
        any::<[u8; 32]>().prop_map(fixtures::owner_from_seed)
    }

    /// A title the program accepts: 1..=MAX_TITLE_LEN ASCII bytes.
    pub fn arb_title() -> impl Strategy<Value = String> {
        "[A-Za-z0-9 _-]{1,20}"
    }

    /// A message the program accepts, possibly empty.
    pub fn arb_message() -> impl Strategy<Value = String> {
        "[ -~]{0,200}"
    }

    pub fn arb_cluster_network() -> impl Strategy<Value = ClusterNetwork> {
        prop_oneof![
            Just(ClusterNetwork::Mainnet),
            Just(ClusterNetwork::Testnet),
            Just(ClusterNetwork::Devnet),
            Just(ClusterNetwork::Localnet),
            Just(ClusterNetwork::Custom),
        ]
    }

    pub fn arb_cluster_id() -> impl Strategy<Value = ClusterId> {
        "[a-z]{1,8}".prop_map(ClusterId::new)
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! Deterministic fixtures.

    use super::*;
    use ed25519_dalek::SigningKey;

    /// Secret seed for test signer number `n`.
    pub fn signer_seed(n: u8) -> [u8; 32] {
        [n; 32]
    }

    /// Public key for a secret seed.
    pub fn owner_from_seed(seed: [u8; 32]) -> Pubkey {
        Pubkey::new(SigningKey::from_bytes(&seed).verifying_key().to_bytes())
    }

    /// Public key of test signer number `n`.
    pub fn owner(n: u8) -> Pubkey {
        owner_from_seed(signer_seed(n))
    }

    /// Cluster with a custom name, for isolation tests.
    pub fn named_cluster(name: &str) -> Cluster {
        Cluster::new(name, ClusterNetwork::Custom, format!("http://{}.test:8899", name))
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for journal results.

    use super::*;

    #[track_caller]
    pub fn assert_invalid_input<T: std::fmt::Debug>(result: &JournalResult<T>, field: &str) {
        match result {
            Err(JournalError::InvalidInput { field: f, .. }) => {
                assert_eq!(f, field, "Wrong field in InvalidInput error");
            }
            other => panic!("Expected InvalidInput for {}, got: {:?}", field, other),
        }
    }

    #[track_caller]
    pub fn assert_not_found<T: std::fmt::Debug>(result: &JournalResult<T>, address: &Address) {
        match result {
            Err(JournalError::NotFound { address: a }) => {
                assert_eq!(a, address, "Wrong address in NotFound error");
            }
            other => panic!("Expected NotFound for {}, got: {:?}", address, other),
        }
    }

    #[track_caller]
    pub fn assert_rejected<T: std::fmt::Debug>(result: &JournalResult<T>) {
        match result {
            Err(JournalError::Rejected { .. }) => {}
            other => panic!("Expected Rejected error, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_off_curve(address: &Address) {
        assert!(
            !gluon_core::is_on_curve(address.as_bytes()),
            "Derived address {} lies on the ed25519 curve",
            address
        );
    }
}
