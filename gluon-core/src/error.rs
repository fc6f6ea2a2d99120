//! Error types for Gluon journal operations

use crate::entry::MutationKind;
use crate::identity::Pubkey;
use thiserror::Error;

/// Master error type for journal reads and writes.
///
/// Remote errors travel unmodified from the transport to the mutation
/// orchestrator and on to notifications, so every variant is `Clone`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum JournalError {
    #[error("Invalid input for {field}: {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Journal entry not found at {address}")]
    NotFound { address: Pubkey },

    #[error("Journal entry already exists at {address}")]
    DuplicateEntry { address: Pubkey },

    #[error("Transaction rejected: {reason}")]
    Rejected { reason: String },

    #[error("Remote unavailable: {reason}")]
    RemoteUnavailable { reason: String },

    #[error("Malformed account data at {address}: {reason}")]
    MalformedAccount { address: Pubkey, reason: String },

    #[error("No signer connected")]
    SignerNotConnected,

    #[error("{kind} mutation is already pending")]
    MutationInFlight { kind: MutationKind },
}

impl JournalError {
    pub fn invalid_input(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected {
            reason: reason.into(),
        }
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::RemoteUnavailable {
            reason: reason.into(),
        }
    }

    /// True for errors raised before anything was sent to the remote.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            Self::InvalidInput { .. } | Self::SignerNotConnected | Self::MutationInFlight { .. }
        )
    }
}

/// Result type alias for journal operations.
pub type JournalResult<T> = Result<T, JournalError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display() {
        let err = JournalError::NotFound {
            address: Pubkey::new([0u8; 32]),
        };
        let msg = err.to_string();
        assert!(msg.contains("not found"));
        assert!(msg.contains(&"00".repeat(32)));
    }

    #[test]
    fn test_invalid_input_display() {
        let err = JournalError::invalid_input("title", "must not be empty");
        let msg = err.to_string();
        assert!(msg.contains("title"));
        assert!(msg.contains("must not be empty"));
    }

    #[test]
    fn test_mutation_in_flight_display() {
        let err = JournalError::MutationInFlight {
            kind: MutationKind::Update,
        };
        assert_eq!(err.to_string(), "update mutation is already pending");
    }

    #[test]
    fn test_is_local() {
        assert!(JournalError::SignerNotConnected.is_local());
        assert!(JournalError::invalid_input("title", "empty").is_local());
        assert!(!JournalError::unavailable("timeout").is_local());
        assert!(!JournalError::rejected("declined").is_local());
    }
}
