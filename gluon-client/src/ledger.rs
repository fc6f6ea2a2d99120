//! In-process ledger running the journal program.
//!
//! `LocalLedger` is a [`RemoteTransport`] that keeps accounts in memory and
//! executes journal instructions with the same account rules the deployed
//! program enforces: the entry must sit at the address derived from
//! `[title, signer]`, `create` initializes a fresh account, `update` rewrites
//! the message of an existing one and `delete` closes it. Submissions must
//! carry a valid ed25519 signature from the signer.
//!
//! It also records program logs and read counters, and can be switched into
//! an unavailable state to exercise error paths.

use async_trait::async_trait;
use ed25519_dalek::{Signature, VerifyingKey};
use gluon_core::{
    address, Address, ConfirmationToken, JournalEntryState, JournalError, JournalInstruction,
    JournalResult, ProgramId, Pubkey, JOURNAL_PROGRAM_ID,
};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::transport::{
    AccountInfo, KeyedAccount, RemoteTransport, Submission, UPGRADEABLE_LOADER_ID,
};

/// Storage overhead charged per account on top of its data.
const ACCOUNT_STORAGE_OVERHEAD: u64 = 128;
const LAMPORTS_PER_BYTE_YEAR: u64 = 3480;
const EXEMPTION_THRESHOLD_YEARS: u64 = 2;

/// Minimum balance for an account of `data_len` bytes to be rent exempt.
pub fn rent_exempt_minimum(data_len: usize) -> u64 {
    (ACCOUNT_STORAGE_OVERHEAD + data_len as u64)
        * LAMPORTS_PER_BYTE_YEAR
        * EXEMPTION_THRESHOLD_YEARS
}

/// A confirmed submission and the logs it produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRecord {
    pub token: ConfirmationToken,
    pub slot: u64,
    pub signer: Pubkey,
    pub address: Address,
    pub logs: Vec<String>,
}

#[derive(Debug, Default)]
struct LedgerState {
    accounts: BTreeMap<Address, AccountInfo>,
    transactions: Vec<TransactionRecord>,
    slot: u64,
    unavailable: Option<String>,
}

/// Read and write counters, useful for asserting single-flight behavior.
#[derive(Debug, Default)]
struct LedgerCounters {
    program_account_reads: AtomicU64,
    account_reads: AtomicU64,
    submissions: AtomicU64,
}

/// In-memory ledger with the journal program deployed.
#[derive(Debug)]
pub struct LocalLedger {
    program_id: ProgramId,
    state: Mutex<LedgerState>,
    counters: LedgerCounters,
}

impl Default for LocalLedger {
    fn default() -> Self {
        Self::new(JOURNAL_PROGRAM_ID)
    }
}

impl LocalLedger {
    /// Ledger with the journal program deployed at `program_id`.
    pub fn new(program_id: ProgramId) -> Self {
        let mut state = LedgerState::default();
        state.accounts.insert(
            program_id,
            AccountInfo {
                owner: UPGRADEABLE_LOADER_ID,
                executable: true,
                lamports: rent_exempt_minimum(36),
                data: Vec::new(),
            },
        );
        Self {
            program_id,
            state: Mutex::new(state),
            counters: LedgerCounters::default(),
        }
    }

    /// Ledger with nothing deployed.
    pub fn empty() -> Self {
        Self {
            program_id: JOURNAL_PROGRAM_ID,
            state: Mutex::new(LedgerState::default()),
            counters: LedgerCounters::default(),
        }
    }

    pub fn program_id(&self) -> ProgramId {
        self.program_id
    }

    /// Make every call fail with `RemoteUnavailable` until cleared.
    pub async fn set_unavailable(&self, reason: Option<&str>) {
        let mut state = self.state.lock().await;
        state.unavailable = reason.map(str::to_string);
    }

    /// Write a raw account, bypassing the program.
    pub async fn insert_account(&self, address: Address, account: AccountInfo) {
        let mut state = self.state.lock().await;
        state.accounts.insert(address, account);
    }

    /// Confirmed transactions in submission order.
    pub async fn transactions(&self) -> Vec<TransactionRecord> {
        self.state.lock().await.transactions.clone()
    }

    /// All program logs in submission order.
    pub async fn logs(&self) -> Vec<String> {
        self.state
            .lock()
            .await
            .transactions
            .iter()
            .flat_map(|tx| tx.logs.iter().cloned())
            .collect()
    }

    pub fn program_account_reads(&self) -> u64 {
        self.counters.program_account_reads.load(Ordering::SeqCst)
    }

    pub fn account_reads(&self) -> u64 {
        self.counters.account_reads.load(Ordering::SeqCst)
    }

    pub fn submissions(&self) -> u64 {
        self.counters.submissions.load(Ordering::SeqCst)
    }

    fn check_available(state: &LedgerState) -> JournalResult<()> {
        match &state.unavailable {
            Some(reason) => Err(JournalError::unavailable(reason.clone())),
            None => Ok(()),
        }
    }

    fn verify_signature(submission: &Submission) -> JournalResult<()> {
        let signer = &submission.unsigned.signer;
        let key = VerifyingKey::from_bytes(signer.as_bytes())
            .map_err(|_| JournalError::rejected(format!("signer {} is not a valid key", signer)))?;
        let signature = Signature::from_slice(&submission.signature)
            .map_err(|_| JournalError::rejected("malformed signature"))?;
        key.verify_strict(&submission.message(), &signature)
            .map_err(|_| JournalError::rejected("signature verification failed"))
    }

    /// Run one instruction against `state`, returning the program logs.
    fn execute(
        &self,
        state: &mut LedgerState,
        submission: &Submission,
        instruction: JournalInstruction,
    ) -> JournalResult<Vec<String>> {
        let signer = submission.unsigned.signer;
        let address = submission.unsigned.address;

        let expected = address::derive(&signer, instruction.title(), &self.program_id)
            .map_err(|e| JournalError::rejected(format!("seeds constraint violated: {}", e)))?;
        if expected != address {
            return Err(JournalError::rejected(format!(
                "seeds constraint violated: expected {}, got {}",
                expected, address
            )));
        }

        match instruction {
            JournalInstruction::CreateEntry { title, message } => {
                if state.accounts.contains_key(&address) {
                    return Err(JournalError::DuplicateEntry { address });
                }
                let logs = vec![
                    "Program log: Journal Entry Created".to_string(),
                    format!("Program log: Title: {}", title),
                    format!("Program log: Message: {}", message),
                ];
                let entry = JournalEntryState {
                    owner: signer,
                    title,
                    message,
                    entry_id: 0,
                };
                state.accounts.insert(address, self.entry_account(&entry)?);
                Ok(logs)
            }
            JournalInstruction::UpdateEntry { title, message } => {
                let mut entry = self.load_entry(state, &address)?;
                if entry.owner != signer {
                    return Err(JournalError::rejected("owner constraint violated"));
                }
                let logs = vec![
                    "Program log: Journal Entry Updated".to_string(),
                    format!("Program log: Title: {}", title),
                    format!("Program log: Message: {}", message),
                ];
                entry.message = message;
                state.accounts.insert(address, self.entry_account(&entry)?);
                Ok(logs)
            }
            JournalInstruction::DeleteEntry { title } => {
                let entry = self.load_entry(state, &address)?;
                if entry.owner != signer {
                    return Err(JournalError::rejected("owner constraint violated"));
                }
                state.accounts.remove(&address);
                Ok(vec![format!(
                    "Program log: Journal entry titled {} deleted",
                    title
                )])
            }
        }
    }

    fn load_entry(
        &self,
        state: &LedgerState,
        address: &Address,
    ) -> JournalResult<JournalEntryState> {
        let account = state
            .accounts
            .get(address)
            .ok_or(JournalError::NotFound { address: *address })?;
        if account.owner != self.program_id {
            return Err(JournalError::rejected(format!(
                "account {} is not owned by the journal program",
                address
            )));
        }
        JournalEntryState::decode(&account.data).map_err(|e| JournalError::MalformedAccount {
            address: *address,
            reason: e.to_string(),
        })
    }

    fn entry_account(&self, entry: &JournalEntryState) -> JournalResult<AccountInfo> {
        let mut data = entry.encode();
        if data.len() > JournalEntryState::MAX_SPACE {
            return Err(JournalError::rejected(format!(
                "account data of {} bytes exceeds allocated {} bytes",
                data.len(),
                JournalEntryState::MAX_SPACE
            )));
        }
        data.resize(JournalEntryState::MAX_SPACE, 0);
        Ok(AccountInfo {
            owner: self.program_id,
            executable: false,
            lamports: rent_exempt_minimum(JournalEntryState::MAX_SPACE),
            data,
        })
    }
}

#[async_trait]
impl RemoteTransport for LocalLedger {
    async fn program_accounts(&self, program_id: &ProgramId) -> JournalResult<Vec<KeyedAccount>> {
        self.counters
            .program_account_reads
            .fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock().await;
        Self::check_available(&state)?;
        Ok(state
            .accounts
            .iter()
            .filter(|(_, account)| &account.owner == program_id)
            .map(|(address, account)| KeyedAccount {
                address: *address,
                account: account.clone(),
            })
            .collect())
    }

    async fn account(&self, address: &Address) -> JournalResult<Option<AccountInfo>> {
        self.counters.account_reads.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock().await;
        Self::check_available(&state)?;
        Ok(state.accounts.get(address).cloned())
    }

    async fn submit(&self, submission: Submission) -> JournalResult<ConfirmationToken> {
        self.counters.submissions.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().await;
        Self::check_available(&state)?;

        if submission.unsigned.program_id != self.program_id {
            return Err(JournalError::rejected(format!(
                "program {} is not deployed",
                submission.unsigned.program_id
            )));
        }
        Self::verify_signature(&submission)?;

        let instruction = JournalInstruction::decode(&submission.unsigned.instruction)
            .map_err(|e| JournalError::rejected(format!("invalid instruction data: {}", e)))?;
        let kind = instruction.kind();

        let logs = match self.execute(&mut state, &submission, instruction) {
            Ok(logs) => logs,
            Err(err) => {
                warn!(
                    kind = %kind,
                    address = %submission.unsigned.address,
                    error = %err,
                    "Instruction failed"
                );
                return Err(err);
            }
        };

        state.slot += 1;
        let token = ConfirmationToken::from_signature(&submission.signature);
        for line in &logs {
            debug!(slot = state.slot, "{}", line);
        }
        info!(
            kind = %kind,
            address = %submission.unsigned.address,
            slot = state.slot,
            "Transaction confirmed"
        );
        let record = TransactionRecord {
            token: token.clone(),
            slot: state.slot,
            signer: submission.unsigned.signer,
            address: submission.unsigned.address,
            logs,
        };
        state.transactions.push(record);
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signer::{KeypairSigner, Signer};
    use crate::transport::UnsignedSubmission;

    async fn signed(
        signer: &KeypairSigner,
        title: &str,
        instruction: JournalInstruction,
    ) -> Submission {
        let owner = signer.pubkey();
        let unsigned = UnsignedSubmission {
            program_id: JOURNAL_PROGRAM_ID,
            address: address::derive(&owner, title, &JOURNAL_PROGRAM_ID).unwrap(),
            signer: owner,
            instruction: instruction.encode(),
        };
        let signature = signer.sign(&unsigned.message()).await.unwrap();
        unsigned.into_signed(signature)
    }

    fn create(title: &str, message: &str) -> JournalInstruction {
        JournalInstruction::CreateEntry {
            title: title.to_string(),
            message: message.to_string(),
        }
    }

    #[tokio::test]
    async fn test_program_account_is_deployed() {
        let ledger = LocalLedger::default();
        let program = ledger.account(&JOURNAL_PROGRAM_ID).await.unwrap().unwrap();
        assert!(program.executable);
        assert_eq!(program.owner, UPGRADEABLE_LOADER_ID);
        assert!(ledger.program_accounts(&JOURNAL_PROGRAM_ID).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_then_duplicate() {
        let ledger = LocalLedger::default();
        let signer = KeypairSigner::from_seed([1u8; 32]);

        let submission = signed(&signer, "Day1", create("Day1", "hello")).await;
        let address = submission.unsigned.address;
        ledger.submit(submission).await.unwrap();

        let account = ledger.account(&address).await.unwrap().unwrap();
        assert_eq!(account.data.len(), JournalEntryState::MAX_SPACE);
        let state = JournalEntryState::decode(&account.data).unwrap();
        assert_eq!(state.owner, signer.pubkey());
        assert_eq!(state.message, "hello");

        let again = signed(&signer, "Day1", create("Day1", "hello")).await;
        assert_eq!(
            ledger.submit(again).await,
            Err(JournalError::DuplicateEntry { address })
        );
    }

    #[tokio::test]
    async fn test_update_and_delete_missing_entry() {
        let ledger = LocalLedger::default();
        let signer = KeypairSigner::from_seed([1u8; 32]);

        let update = signed(
            &signer,
            "Day9",
            JournalInstruction::UpdateEntry {
                title: "Day9".to_string(),
                message: "x".to_string(),
            },
        )
        .await;
        assert!(matches!(
            ledger.submit(update).await,
            Err(JournalError::NotFound { .. })
        ));

        let delete = signed(
            &signer,
            "Day9",
            JournalInstruction::DeleteEntry {
                title: "Day9".to_string(),
            },
        )
        .await;
        assert!(matches!(
            ledger.submit(delete).await,
            Err(JournalError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_logs_follow_program_messages() {
        let ledger = LocalLedger::default();
        let signer = KeypairSigner::from_seed([1u8; 32]);
        ledger
            .submit(signed(&signer, "Day1", create("Day1", "hello")).await)
            .await
            .unwrap();
        ledger
            .submit(
                signed(
                    &signer,
                    "Day1",
                    JournalInstruction::DeleteEntry {
                        title: "Day1".to_string(),
                    },
                )
                .await,
            )
            .await
            .unwrap();

        let logs = ledger.logs().await;
        assert_eq!(logs[0], "Program log: Journal Entry Created");
        assert_eq!(logs[1], "Program log: Title: Day1");
        assert_eq!(logs[2], "Program log: Message: hello");
        assert_eq!(logs[3], "Program log: Journal entry titled Day1 deleted");
        assert_eq!(ledger.transactions().await.len(), 2);
    }

    #[tokio::test]
    async fn test_tampered_signature_is_rejected() {
        let ledger = LocalLedger::default();
        let signer = KeypairSigner::from_seed([1u8; 32]);
        let mut submission = signed(&signer, "Day1", create("Day1", "hello")).await;
        submission.signature[0] ^= 0xff;

        assert_eq!(
            ledger.submit(submission).await,
            Err(JournalError::rejected("signature verification failed"))
        );
    }

    #[tokio::test]
    async fn test_wrong_address_violates_seeds() {
        let ledger = LocalLedger::default();
        let signer = KeypairSigner::from_seed([1u8; 32]);
        let owner = signer.pubkey();
        let unsigned = UnsignedSubmission {
            program_id: JOURNAL_PROGRAM_ID,
            address: address::derive(&owner, "Other", &JOURNAL_PROGRAM_ID).unwrap(),
            signer: owner,
            instruction: create("Day1", "hello").encode(),
        };
        let signature = signer.sign(&unsigned.message()).await.unwrap();

        let result = ledger.submit(unsigned.into_signed(signature)).await;
        match result {
            Err(JournalError::Rejected { reason }) => {
                assert!(reason.starts_with("seeds constraint violated"))
            }
            other => panic!("expected seeds violation, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unavailable_ledger() {
        let ledger = LocalLedger::default();
        ledger.set_unavailable(Some("connection refused")).await;
        assert_eq!(
            ledger.program_accounts(&JOURNAL_PROGRAM_ID).await,
            Err(JournalError::unavailable("connection refused"))
        );
        ledger.set_unavailable(None).await;
        assert!(ledger.program_accounts(&JOURNAL_PROGRAM_ID).await.is_ok());
        assert_eq!(ledger.program_account_reads(), 2);
    }

    #[test]
    fn test_rent_exempt_minimum() {
        assert_eq!(rent_exempt_minimum(0), 890_880);
    }
}
