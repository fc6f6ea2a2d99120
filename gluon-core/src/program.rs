//! Binary layout of the journal program's accounts and instructions.
//!
//! Every account and instruction starts with an 8-byte discriminator taken
//! from `SHA-256("<namespace>:<name>")`. Fields follow in declaration order;
//! strings are a little-endian `u32` length followed by UTF-8 bytes.
//!
//! ```text
//! JournalEntryState: [disc: 8][owner: 32][title: 4+n][message: 4+m][entry_id: 8]
//! create_entry:      [disc: 8][title: 4+n][message: 4+m]
//! update_journal_entry: [disc: 8][title: 4+n][message: 4+m]
//! delete_journal_entry: [disc: 8][title: 4+n]
//! ```
//!
//! Trailing bytes are ignored on decode: accounts are allocated for the
//! maximum field sizes and padded with zeros.

use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::entry::{JournalEntry, MutationKind, MAX_MESSAGE_LEN, MAX_TITLE_LEN};
use crate::identity::{Address, ProgramId, Pubkey};

/// Id the journal program is deployed under unless a cluster overrides it.
pub const JOURNAL_PROGRAM_ID: ProgramId = Pubkey::new([
    77, 246, 128, 2, 222, 163, 138, 72, 230, 123, 136, 5, 83, 79, 77, 22, 253, 209, 13, 13, 14,
    135, 121, 131, 225, 238, 250, 204, 30, 124, 160, 84,
]);

pub const DISCRIMINATOR_LEN: usize = 8;

const ACCOUNT_NAME: &str = "JournalEntryState";

/// Decoding failures for program data.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LayoutError {
    #[error("Truncated data: needed {needed} bytes at offset {offset}, {remaining} remaining")]
    Truncated {
        offset: usize,
        needed: usize,
        remaining: usize,
    },

    #[error("Unknown discriminator {found:?}")]
    UnknownDiscriminator { found: [u8; DISCRIMINATOR_LEN] },

    #[error("Invalid UTF-8 in field {field}")]
    InvalidUtf8 { field: &'static str },
}

/// First 8 bytes of `SHA-256("<namespace>:<name>")`.
pub fn discriminator(namespace: &str, name: &str) -> [u8; DISCRIMINATOR_LEN] {
    let mut hasher = Sha256::new();
    hasher.update(namespace.as_bytes());
    hasher.update(b":");
    hasher.update(name.as_bytes());
    let hash = hasher.finalize();
    let mut disc = [0u8; DISCRIMINATOR_LEN];
    disc.copy_from_slice(&hash[..DISCRIMINATOR_LEN]);
    disc
}

pub fn account_discriminator() -> [u8; DISCRIMINATOR_LEN] {
    discriminator("account", ACCOUNT_NAME)
}

// ============================================================================
// ACCOUNT STATE
// ============================================================================

/// On-ledger state of one journal entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntryState {
    pub owner: Pubkey,
    pub title: String,
    pub message: String,
    pub entry_id: u64,
}

impl JournalEntryState {
    /// Bytes allocated for an account at creation time.
    pub const MAX_SPACE: usize =
        DISCRIMINATOR_LEN + Pubkey::LEN + 4 + MAX_TITLE_LEN + 4 + MAX_MESSAGE_LEN + 8;

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::MAX_SPACE);
        out.extend_from_slice(&account_discriminator());
        out.extend_from_slice(self.owner.as_bytes());
        write_string(&mut out, &self.title);
        write_string(&mut out, &self.message);
        out.extend_from_slice(&self.entry_id.to_le_bytes());
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, LayoutError> {
        let mut reader = Reader::new(bytes);
        let disc = reader.discriminator()?;
        if disc != account_discriminator() {
            return Err(LayoutError::UnknownDiscriminator { found: disc });
        }
        Ok(Self {
            owner: reader.pubkey()?,
            title: reader.string("title")?,
            message: reader.string("message")?,
            entry_id: reader.u64()?,
        })
    }

    pub fn into_entry(self, address: Address) -> JournalEntry {
        JournalEntry {
            owner: self.owner,
            title: self.title,
            message: self.message,
            address,
            entry_id: self.entry_id,
        }
    }
}

// ============================================================================
// INSTRUCTIONS
// ============================================================================

/// Instructions understood by the journal program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JournalInstruction {
    CreateEntry { title: String, message: String },
    UpdateEntry { title: String, message: String },
    DeleteEntry { title: String },
}

impl JournalInstruction {
    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateEntry { .. } => "create_entry",
            Self::UpdateEntry { .. } => "update_journal_entry",
            Self::DeleteEntry { .. } => "delete_journal_entry",
        }
    }

    pub fn kind(&self) -> MutationKind {
        match self {
            Self::CreateEntry { .. } => MutationKind::Create,
            Self::UpdateEntry { .. } => MutationKind::Update,
            Self::DeleteEntry { .. } => MutationKind::Delete,
        }
    }

    /// The title seed every instruction addresses its entry by.
    pub fn title(&self) -> &str {
        match self {
            Self::CreateEntry { title, .. }
            | Self::UpdateEntry { title, .. }
            | Self::DeleteEntry { title } => title,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&discriminator("global", self.name()));
        match self {
            Self::CreateEntry { title, message } | Self::UpdateEntry { title, message } => {
                write_string(&mut out, title);
                write_string(&mut out, message);
            }
            Self::DeleteEntry { title } => write_string(&mut out, title),
        }
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, LayoutError> {
        let mut reader = Reader::new(bytes);
        let disc = reader.discriminator()?;
        if disc == discriminator("global", "create_entry") {
            Ok(Self::CreateEntry {
                title: reader.string("title")?,
                message: reader.string("message")?,
            })
        } else if disc == discriminator("global", "update_journal_entry") {
            Ok(Self::UpdateEntry {
                title: reader.string("title")?,
                message: reader.string("message")?,
            })
        } else if disc == discriminator("global", "delete_journal_entry") {
            Ok(Self::DeleteEntry {
                title: reader.string("title")?,
            })
        } else {
            Err(LayoutError::UnknownDiscriminator { found: disc })
        }
    }
}

// ============================================================================
// ENCODING HELPERS
// ============================================================================

fn write_string(out: &mut Vec<u8>, value: &str) {
    out.extend_from_slice(&(value.len() as u32).to_le_bytes());
    out.extend_from_slice(value.as_bytes());
}

struct Reader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    fn take(&mut self, needed: usize) -> Result<&'a [u8], LayoutError> {
        let remaining = self.bytes.len() - self.offset;
        if remaining < needed {
            return Err(LayoutError::Truncated {
                offset: self.offset,
                needed,
                remaining,
            });
        }
        let slice = &self.bytes[self.offset..self.offset + needed];
        self.offset += needed;
        Ok(slice)
    }

    fn discriminator(&mut self) -> Result<[u8; DISCRIMINATOR_LEN], LayoutError> {
        let mut disc = [0u8; DISCRIMINATOR_LEN];
        disc.copy_from_slice(self.take(DISCRIMINATOR_LEN)?);
        Ok(disc)
    }

    fn pubkey(&mut self) -> Result<Pubkey, LayoutError> {
        let mut key = [0u8; 32];
        key.copy_from_slice(self.take(Pubkey::LEN)?);
        Ok(Pubkey::new(key))
    }

    fn u32(&mut self) -> Result<u32, LayoutError> {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(raw))
    }

    fn u64(&mut self) -> Result<u64, LayoutError> {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(raw))
    }

    fn string(&mut self, field: &'static str) -> Result<String, LayoutError> {
        let len = self.u32()? as usize;
        let raw = self.take(len)?;
        String::from_utf8(raw.to_vec()).map_err(|_| LayoutError::InvalidUtf8 { field })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_state() -> JournalEntryState {
        JournalEntryState {
            owner: Pubkey::new([3u8; 32]),
            title: "Day1".to_string(),
            message: "hello".to_string(),
            entry_id: 0,
        }
    }

    #[test]
    fn test_account_discriminator_value() {
        assert_eq!(account_discriminator(), [113, 86, 110, 124, 140, 14, 58, 66]);
    }

    #[test]
    fn test_instruction_discriminator_value() {
        assert_eq!(
            discriminator("global", "create_entry"),
            [248, 207, 142, 242, 66, 162, 150, 16]
        );
    }

    #[test]
    fn test_account_layout_offsets() {
        let bytes = sample_state().encode();
        assert_eq!(&bytes[..8], &account_discriminator());
        assert_eq!(&bytes[8..40], &[3u8; 32]);
        assert_eq!(&bytes[40..44], &4u32.to_le_bytes());
        assert_eq!(&bytes[44..48], b"Day1");
        assert_eq!(bytes.len(), 8 + 32 + 4 + 4 + 4 + 5 + 8);
    }

    #[test]
    fn test_account_decode_ignores_padding() {
        let mut bytes = sample_state().encode();
        bytes.resize(JournalEntryState::MAX_SPACE, 0);
        assert_eq!(JournalEntryState::decode(&bytes).unwrap(), sample_state());
    }

    #[test]
    fn test_account_decode_rejects_truncation() {
        let bytes = sample_state().encode();
        let err = JournalEntryState::decode(&bytes[..bytes.len() - 3]).unwrap_err();
        assert!(matches!(err, LayoutError::Truncated { needed: 8, .. }));
    }

    #[test]
    fn test_account_decode_rejects_foreign_discriminator() {
        let mut bytes = sample_state().encode();
        bytes[0] ^= 0xff;
        assert!(matches!(
            JournalEntryState::decode(&bytes),
            Err(LayoutError::UnknownDiscriminator { .. })
        ));
    }

    #[test]
    fn test_account_decode_rejects_bad_utf8() {
        let mut bytes = sample_state().encode();
        bytes[44] = 0xff;
        assert_eq!(
            JournalEntryState::decode(&bytes),
            Err(LayoutError::InvalidUtf8 { field: "title" })
        );
    }

    #[test]
    fn test_instruction_decode_dispatches_on_discriminator() {
        let ix = JournalInstruction::DeleteEntry {
            title: "Day1".to_string(),
        };
        let decoded = JournalInstruction::decode(&ix.encode()).unwrap();
        assert_eq!(decoded.kind(), MutationKind::Delete);
        assert_eq!(decoded.title(), "Day1");
    }

    #[test]
    fn test_instruction_decode_rejects_account_bytes() {
        let bytes = sample_state().encode();
        assert!(JournalInstruction::decode(&bytes).is_err());
    }

    #[test]
    fn test_into_entry_keeps_address() {
        let address = Pubkey::new([9u8; 32]);
        let entry = sample_state().into_entry(address);
        assert_eq!(entry.address, address);
        assert_eq!(entry.message, "hello");
    }
}
