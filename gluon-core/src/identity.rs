//! Identity types for ledger accounts and submissions

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::JournalError;

/// 32-byte public identifier of a ledger account, signer, or program.
///
/// Rendered as lowercase hex. Serializes as the same hex string so that
/// config files and JSON payloads stay human-readable.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Pubkey([u8; 32]);

/// Deterministic location of a record on the ledger.
pub type Address = Pubkey;

/// Address of a deployed program.
pub type ProgramId = Pubkey;

impl Pubkey {
    pub const LEN: usize = 32;

    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_bytes(self) -> [u8; 32] {
        self.0
    }

    /// Build a key from a slice, rejecting anything that is not 32 bytes.
    pub fn try_from_slice(bytes: &[u8]) -> Result<Self, JournalError> {
        let array: [u8; 32] = bytes.try_into().map_err(|_| {
            JournalError::invalid_input(
                "pubkey",
                format!("expected {} bytes, got {}", Self::LEN, bytes.len()),
            )
        })?;
        Ok(Self(array))
    }

    /// Shorten the hex form to `head..tail` with `len` characters on each side.
    pub fn ellipsify(&self, len: usize) -> String {
        let full = self.to_string();
        if full.len() <= len * 2 {
            return full;
        }
        format!("{}..{}", &full[..len], &full[full.len() - len..])
    }
}

impl fmt::Display for Pubkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Pubkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pubkey({})", self.ellipsify(4))
    }
}

impl FromStr for Pubkey {
    type Err = JournalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s.trim())
            .map_err(|e| JournalError::invalid_input("pubkey", e.to_string()))?;
        Self::try_from_slice(&bytes)
    }
}

impl TryFrom<String> for Pubkey {
    type Error = JournalError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Pubkey> for String {
    fn from(key: Pubkey) -> Self {
        key.to_string()
    }
}

impl From<[u8; 32]> for Pubkey {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

/// Opaque proof returned by the transport that a submission was accepted.
///
/// Carries the hex-encoded signature of the submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfirmationToken(String);

impl ConfirmationToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn from_signature(signature: &[u8]) -> Self {
        Self(hex::encode(signature))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConfirmationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
