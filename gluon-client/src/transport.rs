//! Remote transport seam.
//!
//! Everything the client needs from a ledger node fits in three calls: list
//! the accounts owned by a program, read one account, submit one signed
//! instruction. [`LocalLedger`](crate::ledger::LocalLedger) implements them
//! in-process.

use async_trait::async_trait;
use gluon_core::{Address, ConfirmationToken, JournalResult, ProgramId, Pubkey};

/// Loader that owns deployed programs.
pub const UPGRADEABLE_LOADER_ID: Pubkey = Pubkey::new([
    2, 168, 246, 145, 78, 136, 161, 176, 226, 16, 21, 62, 247, 99, 174, 43, 0, 194, 185, 61, 22,
    193, 36, 210, 192, 83, 122, 16, 4, 128, 0, 0,
]);

/// Raw account as stored on the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountInfo {
    /// Program that owns the account.
    pub owner: ProgramId,
    pub executable: bool,
    pub lamports: u64,
    pub data: Vec<u8>,
}

/// An account together with its address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyedAccount {
    pub address: Address,
    pub account: AccountInfo,
}

/// An instruction for the journal program, not yet signed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedSubmission {
    pub program_id: ProgramId,
    /// Entry account the instruction writes.
    pub address: Address,
    /// Fee payer and entry owner.
    pub signer: Pubkey,
    pub instruction: Vec<u8>,
}

impl UnsignedSubmission {
    /// Bytes the signer commits to: `program_id ‖ address ‖ signer ‖ instruction`.
    pub fn message(&self) -> Vec<u8> {
        let mut message = Vec::with_capacity(Pubkey::LEN * 3 + self.instruction.len());
        message.extend_from_slice(self.program_id.as_bytes());
        message.extend_from_slice(self.address.as_bytes());
        message.extend_from_slice(self.signer.as_bytes());
        message.extend_from_slice(&self.instruction);
        message
    }

    pub fn into_signed(self, signature: Vec<u8>) -> Submission {
        Submission {
            unsigned: self,
            signature,
        }
    }
}

/// A signed instruction ready for the remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub unsigned: UnsignedSubmission,
    pub signature: Vec<u8>,
}

impl Submission {
    pub fn message(&self) -> Vec<u8> {
        self.unsigned.message()
    }
}

/// Connection to a ledger node.
///
/// Transport failures surface as `RemoteUnavailable`; program failures as
/// `DuplicateEntry`, `NotFound` or `Rejected`. Implementations never retry.
#[async_trait]
pub trait RemoteTransport: Send + Sync {
    /// Every account owned by `program_id`.
    async fn program_accounts(&self, program_id: &ProgramId) -> JournalResult<Vec<KeyedAccount>>;

    /// One account, `None` if nothing lives at `address`.
    async fn account(&self, address: &Address) -> JournalResult<Option<AccountInfo>>;

    /// Submit a signed instruction and wait for confirmation.
    async fn submit(&self, submission: Submission) -> JournalResult<ConfirmationToken>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_layout() {
        let unsigned = UnsignedSubmission {
            program_id: Pubkey::new([1u8; 32]),
            address: Pubkey::new([2u8; 32]),
            signer: Pubkey::new([3u8; 32]),
            instruction: vec![9, 9],
        };
        let message = unsigned.message();
        assert_eq!(message.len(), 98);
        assert_eq!(&message[..32], &[1u8; 32]);
        assert_eq!(&message[32..64], &[2u8; 32]);
        assert_eq!(&message[64..96], &[3u8; 32]);
        assert_eq!(&message[96..], &[9, 9]);
    }

    #[test]
    fn test_signed_message_matches_unsigned() {
        let unsigned = UnsignedSubmission {
            program_id: Pubkey::new([1u8; 32]),
            address: Pubkey::new([2u8; 32]),
            signer: Pubkey::new([3u8; 32]),
            instruction: vec![7],
        };
        let expected = unsigned.message();
        let signed = unsigned.into_signed(vec![0u8; 64]);
        assert_eq!(signed.message(), expected);
    }
}
