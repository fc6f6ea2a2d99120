//! Write orchestration.
//!
//! A [`MutationOrchestrator`] drives one write at a time through
//! `idle -> pending -> success | error`. The sequence for an issue is:
//!
//! 1. Move to `pending`, or reject with `MutationInFlight` if already there.
//! 2. Resolve the signer, validate input and derive the entry address.
//! 3. Submit through the [`ProgramClient`].
//! 4. On success, invalidate the affected cache keys, then settle `success`.
//!    On failure, settle `error` and leave the caches alone.
//! 5. Publish exactly one [`MutationOutcome`] on the session channel.
//!
//! Steps 2-5 run on a spawned task: dropping the future returned by
//! [`MutationOrchestrator::issue`] does not cancel a submitted write.

use chrono::{DateTime, Utc};
use gluon_core::{
    validate_message, validate_title, Address, Cluster, ConfirmationToken, JournalError,
    JournalResult, MutationKind,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::program::{DeleteTarget, ProgramClient};
use crate::queries::SessionCaches;

// ============================================================================
// STATE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationStatus {
    Idle,
    Pending,
    Success,
    Error,
}

/// Observable state of an orchestrator.
///
/// `error` is present only in `Error`, `data` only in `Success`.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationState {
    pub status: MutationStatus,
    /// Kind of the write currently pending or last settled.
    pub kind: Option<MutationKind>,
    pub error: Option<JournalError>,
    pub data: Option<ConfirmationToken>,
}

impl Default for MutationState {
    fn default() -> Self {
        Self::idle()
    }
}

impl MutationState {
    pub fn idle() -> Self {
        Self {
            status: MutationStatus::Idle,
            kind: None,
            error: None,
            data: None,
        }
    }

    fn pending(kind: MutationKind) -> Self {
        Self {
            status: MutationStatus::Pending,
            kind: Some(kind),
            error: None,
            data: None,
        }
    }

    fn settled(kind: MutationKind, result: &JournalResult<ConfirmationToken>) -> Self {
        match result {
            Ok(token) => Self {
                status: MutationStatus::Success,
                kind: Some(kind),
                error: None,
                data: Some(token.clone()),
            },
            Err(err) => Self {
                status: MutationStatus::Error,
                kind: Some(kind),
                error: Some(err.clone()),
                data: None,
            },
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == MutationStatus::Pending
    }
}

// ============================================================================
// REQUESTS AND OUTCOMES
// ============================================================================

/// A write to issue. The owner is always the session signer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MutationRequest {
    Create { title: String, message: String },
    Update { title: String, message: String },
    Delete { target: DeleteTarget },
}

impl MutationRequest {
    pub fn create(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Create {
            title: title.into(),
            message: message.into(),
        }
    }

    pub fn update(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Update {
            title: title.into(),
            message: message.into(),
        }
    }

    pub fn delete(target: DeleteTarget) -> Self {
        Self::Delete { target }
    }

    pub fn kind(&self) -> MutationKind {
        match self {
            Self::Create { .. } => MutationKind::Create,
            Self::Update { .. } => MutationKind::Update,
            Self::Delete { .. } => MutationKind::Delete,
        }
    }
}

/// Result of one settled write, published on the session's outcome channel.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationOutcome {
    pub id: Uuid,
    pub kind: MutationKind,
    pub cluster: Cluster,
    /// Entry address, absent when the write failed before it was derived.
    pub address: Option<Address>,
    pub result: JournalResult<ConfirmationToken>,
    pub settled_at: DateTime<Utc>,
}

impl MutationOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    /// Explorer link of the confirmed transaction.
    pub fn explorer_url(&self) -> Option<String> {
        self.result
            .as_ref()
            .ok()
            .map(|token| self.cluster.explorer_url(&format!("tx/{}", token)))
    }

    pub fn to_json(&self) -> serde_json::Value {
        let (status, token, error) = match &self.result {
            Ok(token) => ("success", Some(token.as_str().to_string()), None),
            Err(err) => ("error", None, Some(err.to_string())),
        };
        serde_json::json!({
            "id": self.id,
            "kind": self.kind,
            "cluster": self.cluster.name,
            "address": self.address,
            "status": status,
            "token": token,
            "error": error,
            "explorer_url": self.explorer_url(),
            "settled_at": self.settled_at,
        })
    }
}

/// Sending half of a session's outcome channel.
#[derive(Clone)]
pub struct OutcomeChannel {
    tx: broadcast::Sender<MutationOutcome>,
}

impl OutcomeChannel {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish an outcome. Dropped when nobody is subscribed.
    pub fn publish(&self, outcome: MutationOutcome) {
        let kind = outcome.kind;
        match self.tx.send(outcome) {
            Ok(receivers) => debug!(kind = %kind, receivers, "Published mutation outcome"),
            Err(_) => debug!(kind = %kind, "No receivers for mutation outcome"),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MutationOutcome> {
        self.tx.subscribe()
    }
}

// ============================================================================
// ORCHESTRATOR
// ============================================================================

/// Drives one write at a time. Cloning shares the same state.
#[derive(Clone)]
pub struct MutationOrchestrator {
    program: Arc<ProgramClient>,
    caches: SessionCaches,
    outcomes: OutcomeChannel,
    state: Arc<watch::Sender<MutationState>>,
}

impl MutationOrchestrator {
    pub fn new(
        program: Arc<ProgramClient>,
        caches: SessionCaches,
        outcomes: OutcomeChannel,
    ) -> Self {
        let (state, _rx) = watch::channel(MutationState::idle());
        Self {
            program,
            caches,
            outcomes,
            state: Arc::new(state),
        }
    }

    /// Current state.
    pub fn state(&self) -> MutationState {
        self.state.borrow().clone()
    }

    /// Observe state transitions.
    pub fn subscribe(&self) -> watch::Receiver<MutationState> {
        self.state.subscribe()
    }

    /// Issue a write and wait for it to settle.
    ///
    /// Fails with `MutationInFlight` without side effects while a previous
    /// issue is still pending.
    pub async fn issue(&self, request: MutationRequest) -> JournalResult<ConfirmationToken> {
        let kind = request.kind();
        let started = self.state.send_if_modified(|state| {
            if state.is_pending() {
                false
            } else {
                *state = MutationState::pending(kind);
                true
            }
        });
        if !started {
            let pending = self.state.borrow().kind.unwrap_or(kind);
            debug!(kind = %kind, pending = %pending, "Rejected overlapping mutation");
            return Err(JournalError::MutationInFlight { kind: pending });
        }

        let this = self.clone();
        let task = tokio::spawn(async move { this.run(request).await });
        match task.await {
            Ok(result) => result,
            Err(join_error) => {
                let err = JournalError::rejected(format!("mutation task aborted: {}", join_error));
                self.state
                    .send_replace(MutationState::settled(kind, &Err(err.clone())));
                Err(err)
            }
        }
    }

    async fn run(self, request: MutationRequest) -> JournalResult<ConfirmationToken> {
        let id = Uuid::now_v7();
        let kind = request.kind();
        debug!(mutation_id = %id, kind = %kind, "Mutation pending");

        let mut address = None;
        let result = self.execute(&request, &mut address).await;

        if let (Ok(_), Some(address)) = (&result, address) {
            self.caches.invalidate_after(kind, address).await;
        }
        self.state
            .send_replace(MutationState::settled(kind, &result));

        match &result {
            Ok(token) => {
                info!(mutation_id = %id, kind = %kind, token = %token, "Mutation succeeded")
            }
            Err(err) => {
                warn!(mutation_id = %id, kind = %kind, error = %err, "Mutation failed")
            }
        }
        self.outcomes.publish(MutationOutcome {
            id,
            kind,
            cluster: self.program.cluster().clone(),
            address,
            result: result.clone(),
            settled_at: Utc::now(),
        });
        result
    }

    async fn execute(
        &self,
        request: &MutationRequest,
        address: &mut Option<Address>,
    ) -> JournalResult<ConfirmationToken> {
        let owner = self
            .program
            .signer_pubkey()
            .ok_or(JournalError::SignerNotConnected)?;

        match request {
            MutationRequest::Create { title, message } => {
                validate_title(title)?;
                validate_message(message)?;
                *address = Some(self.program.derive_address(&owner, title)?);
                self.program.create(&owner, title, message).await
            }
            MutationRequest::Update { title, message } => {
                validate_title(title)?;
                validate_message(message)?;
                *address = Some(self.program.derive_address(&owner, title)?);
                self.program.update(&owner, title, message).await
            }
            MutationRequest::Delete { target } => {
                let (resolved, title) = self.program.resolve_delete(&owner, target).await?;
                *address = Some(resolved);
                self.program.delete_resolved(&owner, resolved, title).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::LocalLedger;
    use crate::signer::{KeypairSigner, Signer};
    use gluon_cache::CacheConfig;

    struct Harness {
        orchestrator: MutationOrchestrator,
        caches: SessionCaches,
        outcomes: OutcomeChannel,
        ledger: Arc<LocalLedger>,
    }

    fn harness(signed: bool) -> Harness {
        let ledger = Arc::new(LocalLedger::default());
        let signer = signed
            .then(|| Arc::new(KeypairSigner::from_seed([1u8; 32])) as Arc<dyn Signer>);
        let program = Arc::new(ProgramClient::new(Cluster::localnet(), ledger.clone(), signer));
        let caches = SessionCaches::new(program.clone(), CacheConfig::default());
        let outcomes = OutcomeChannel::new(16);
        Harness {
            orchestrator: MutationOrchestrator::new(program, caches.clone(), outcomes.clone()),
            caches,
            outcomes,
            ledger,
        }
    }

    #[tokio::test]
    async fn test_success_settles_and_publishes() {
        let h = harness(true);
        let mut outcomes = h.outcomes.subscribe();
        assert_eq!(h.orchestrator.state(), MutationState::idle());

        let token = h
            .orchestrator
            .issue(MutationRequest::create("Day1", "hello"))
            .await
            .unwrap();

        let state = h.orchestrator.state();
        assert_eq!(state.status, MutationStatus::Success);
        assert_eq!(state.data, Some(token.clone()));
        assert!(state.error.is_none());

        let outcome = outcomes.recv().await.unwrap();
        assert_eq!(outcome.kind, MutationKind::Create);
        assert_eq!(outcome.result, Ok(token));
        assert!(outcome.address.is_some());
        assert!(outcomes.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_failure_leaves_cache_untouched() {
        let h = harness(true);
        let before = h
            .caches
            .accounts()
            .get(h.caches.accounts_key(), h.caches.accounts_query())
            .await;

        h.ledger.set_unavailable(Some("connection refused")).await;
        let result = h
            .orchestrator
            .issue(MutationRequest::create("Day1", "hello"))
            .await;
        assert_eq!(result, Err(JournalError::unavailable("connection refused")));

        let after = h.caches.accounts().peek(&h.caches.accounts_key()).await.unwrap();
        assert_eq!(after, before);

        let state = h.orchestrator.state();
        assert_eq!(state.status, MutationStatus::Error);
        assert_eq!(state.error, Some(JournalError::unavailable("connection refused")));
        assert!(state.data.is_none());
    }

    #[tokio::test]
    async fn test_invalid_input_fails_after_pending() {
        let h = harness(true);
        let mut outcomes = h.outcomes.subscribe();
        let mut states = h.orchestrator.subscribe();

        let result = h.orchestrator.issue(MutationRequest::create("", "hello")).await;
        assert!(matches!(result, Err(JournalError::InvalidInput { .. })));
        assert_eq!(h.ledger.submissions(), 0);
        assert!(states.has_changed().unwrap());
        assert_eq!(states.borrow_and_update().status, MutationStatus::Error);

        let outcome = outcomes.recv().await.unwrap();
        assert!(outcome.address.is_none());
        assert!(!outcome.is_success());
    }

    #[tokio::test]
    async fn test_missing_signer_never_submits() {
        let h = harness(false);
        let result = h
            .orchestrator
            .issue(MutationRequest::create("Day1", "hello"))
            .await;
        assert_eq!(result, Err(JournalError::SignerNotConnected));
        assert_eq!(h.ledger.submissions(), 0);
    }

    #[tokio::test]
    async fn test_reissue_after_error_starts_fresh_cycle() {
        let h = harness(true);
        h.ledger.set_unavailable(Some("down")).await;
        assert!(h
            .orchestrator
            .issue(MutationRequest::create("Day1", "hello"))
            .await
            .is_err());

        h.ledger.set_unavailable(None).await;
        assert!(h
            .orchestrator
            .issue(MutationRequest::create("Day1", "hello"))
            .await
            .is_ok());
        assert_eq!(h.orchestrator.state().status, MutationStatus::Success);
    }

    #[tokio::test]
    async fn test_overlapping_issue_is_rejected() {
        let h = harness(true);
        h.orchestrator
            .state
            .send_replace(MutationState::pending(MutationKind::Update));
        let mut outcomes = h.outcomes.subscribe();

        let result = h
            .orchestrator
            .issue(MutationRequest::create("Day1", "hello"))
            .await;
        assert_eq!(
            result,
            Err(JournalError::MutationInFlight {
                kind: MutationKind::Update
            })
        );
        assert!(h.orchestrator.state().is_pending());
        assert_eq!(h.ledger.submissions(), 0);
        assert!(outcomes.try_recv().is_err());
    }

    #[test]
    fn test_outcome_json() {
        let outcome = MutationOutcome {
            id: Uuid::now_v7(),
            kind: MutationKind::Delete,
            cluster: Cluster::devnet(),
            address: None,
            result: Ok(ConfirmationToken::new("abcd")),
            settled_at: Utc::now(),
        };
        let json = outcome.to_json();
        assert_eq!(json["kind"], "delete");
        assert_eq!(json["status"], "success");
        assert_eq!(json["token"], "abcd");
        assert_eq!(
            json["explorer_url"],
            "https://explorer.solana.com/tx/abcd?cluster=devnet"
        );
    }

    #[test]
    fn test_request_serialization() {
        let request = MutationRequest::delete(DeleteTarget::Title("Day1".to_string()));
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["kind"], "delete");
        assert_eq!(json["target"]["by"], "title");
        assert_eq!(json["target"]["value"], "Day1");
    }
}
