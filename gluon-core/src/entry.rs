//! The journal entry record and its input limits

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{JournalError, JournalResult};
use crate::identity::{Address, Pubkey};

/// Maximum title length in bytes accepted by the journal program.
pub const MAX_TITLE_LEN: usize = 20;

/// Maximum message length in bytes accepted by the journal program.
pub const MAX_MESSAGE_LEN: usize = 200;

/// A journal entry as observed on the ledger.
///
/// `owner` and `title` are fixed at creation and together with the program id
/// determine `address`. Only `message` changes afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub owner: Pubkey,
    pub title: String,
    pub message: String,
    pub address: Address,
    /// Carried by the on-ledger layout; the program never assigns it.
    pub entry_id: u64,
}

/// An `(address, entry)` pair as returned by a collection read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramAccount {
    pub address: Address,
    pub entry: JournalEntry,
}

/// The three write operations a client can issue against an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    Create,
    Update,
    Delete,
}

impl MutationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Check a title against the program's limits.
pub fn validate_title(title: &str) -> JournalResult<()> {
    if title.is_empty() {
        return Err(JournalError::invalid_input("title", "must not be empty"));
    }
    if title.len() > MAX_TITLE_LEN {
        return Err(JournalError::invalid_input(
            "title",
            format!("must be at most {} bytes, got {}", MAX_TITLE_LEN, title.len()),
        ));
    }
    Ok(())
}

/// Check a message against the program's limits.
pub fn validate_message(message: &str) -> JournalResult<()> {
    if message.len() > MAX_MESSAGE_LEN {
        return Err(JournalError::invalid_input(
            "message",
            format!(
                "must be at most {} bytes, got {}",
                MAX_MESSAGE_LEN,
                message.len()
            ),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_title_limits() {
        assert!(validate_title("Day1").is_ok());
        assert!(validate_title(&"t".repeat(MAX_TITLE_LEN)).is_ok());
        assert!(validate_title("").is_err());
        assert!(validate_title(&"t".repeat(MAX_TITLE_LEN + 1)).is_err());
    }

    #[test]
    fn test_validate_title_counts_bytes() {
        // 7 three-byte characters = 21 bytes
        let title = "日".repeat(7);
        let err = validate_title(&title).unwrap_err();
        assert!(err.to_string().contains("got 21"));
    }

    #[test]
    fn test_validate_message_limits() {
        assert!(validate_message("").is_ok());
        assert!(validate_message(&"m".repeat(MAX_MESSAGE_LEN)).is_ok());
        assert!(validate_message(&"m".repeat(MAX_MESSAGE_LEN + 1)).is_err());
    }

    #[test]
    fn test_mutation_kind_display() {
        assert_eq!(MutationKind::Create.to_string(), "create");
        assert_eq!(MutationKind::Delete.as_str(), "delete");
    }
}
