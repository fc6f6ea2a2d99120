//! Typed facade over the journal program.
//!
//! `ProgramClient` turns entry-level operations into raw transport calls:
//! it derives addresses, encodes instructions, signs them with the session
//! signer and decodes accounts back into [`JournalEntry`] values. Every
//! write is exactly one submission; nothing is retried.

use gluon_core::{
    account_discriminator, address, validate_message, validate_title, Address, Cluster,
    ConfirmationToken, JournalEntry, JournalEntryState, JournalError, JournalInstruction,
    JournalResult, ProgramAccount, ProgramId, Pubkey, DISCRIMINATOR_LEN,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::signer::Signer;
use crate::transport::{AccountInfo, RemoteTransport, UnsignedSubmission};

/// How a delete identifies its entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "by", content = "value", rename_all = "snake_case")]
pub enum DeleteTarget {
    /// The entry at this address. Its title is read back before deleting.
    Address(Address),
    /// The signer's entry with this title.
    Title(String),
}

/// Deployment info of the program account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramInfo {
    pub program_id: ProgramId,
    /// Loader that owns the program.
    pub owner: Pubkey,
    pub executable: bool,
    pub lamports: u64,
    pub data_len: usize,
}

/// Client for the journal program on one cluster.
pub struct ProgramClient {
    cluster: Cluster,
    program_id: ProgramId,
    transport: Arc<dyn RemoteTransport>,
    signer: Option<Arc<dyn Signer>>,
}

impl ProgramClient {
    pub fn new(
        cluster: Cluster,
        transport: Arc<dyn RemoteTransport>,
        signer: Option<Arc<dyn Signer>>,
    ) -> Self {
        let program_id = cluster.program_id();
        Self {
            cluster,
            program_id,
            transport,
            signer,
        }
    }

    pub fn cluster(&self) -> &Cluster {
        &self.cluster
    }

    pub fn program_id(&self) -> ProgramId {
        self.program_id
    }

    pub fn signer(&self) -> Option<&Arc<dyn Signer>> {
        self.signer.as_ref()
    }

    /// Identity of the connected signer, if any.
    pub fn signer_pubkey(&self) -> Option<Pubkey> {
        self.signer.as_ref().map(|signer| signer.pubkey())
    }

    /// Address of `owner`'s entry titled `title` under this program.
    pub fn derive_address(&self, owner: &Pubkey, title: &str) -> JournalResult<Address> {
        address::derive(owner, title, &self.program_id)
    }

    // ========================================================================
    // READS
    // ========================================================================

    /// Every journal entry held by the program. Order is not significant.
    pub async fn list_all(&self) -> JournalResult<Vec<ProgramAccount>> {
        let accounts = self.transport.program_accounts(&self.program_id).await?;
        let disc = account_discriminator();
        let entries = accounts
            .into_iter()
            .filter(|keyed| keyed.account.data.get(..DISCRIMINATOR_LEN) == Some(&disc[..]))
            .map(|keyed| {
                let entry = decode_entry(&keyed.address, &keyed.account)?;
                Ok(ProgramAccount {
                    address: keyed.address,
                    entry,
                })
            })
            .collect::<JournalResult<Vec<_>>>()?;
        debug!(
            cluster = %self.cluster.name,
            count = entries.len(),
            "Listed journal entries"
        );
        Ok(entries)
    }

    /// The entry at `address`.
    pub async fn fetch_one(&self, address: &Address) -> JournalResult<JournalEntry> {
        let account = self
            .transport
            .account(address)
            .await?
            .ok_or(JournalError::NotFound { address: *address })?;
        if account.owner != self.program_id {
            return Err(JournalError::MalformedAccount {
                address: *address,
                reason: format!("owned by {} instead of the journal program", account.owner),
            });
        }
        decode_entry(address, &account)
    }

    /// Deployment info of the program id, `None` if nothing is deployed there.
    pub async fn program_account(&self) -> JournalResult<Option<ProgramInfo>> {
        let account = self.transport.account(&self.program_id).await?;
        Ok(account.map(|account| ProgramInfo {
            program_id: self.program_id,
            owner: account.owner,
            executable: account.executable,
            lamports: account.lamports,
            data_len: account.data.len(),
        }))
    }

    // ========================================================================
    // WRITES
    // ========================================================================

    pub async fn create(
        &self,
        owner: &Pubkey,
        title: &str,
        message: &str,
    ) -> JournalResult<ConfirmationToken> {
        validate_title(title)?;
        validate_message(message)?;
        let address = self.derive_address(owner, title)?;
        let instruction = JournalInstruction::CreateEntry {
            title: title.to_string(),
            message: message.to_string(),
        };
        self.submit(owner, address, instruction).await
    }

    /// Replace the message of `owner`'s entry titled `title`.
    pub async fn update(
        &self,
        owner: &Pubkey,
        title: &str,
        message: &str,
    ) -> JournalResult<ConfirmationToken> {
        validate_title(title)?;
        validate_message(message)?;
        let address = self.derive_address(owner, title)?;
        let instruction = JournalInstruction::UpdateEntry {
            title: title.to_string(),
            message: message.to_string(),
        };
        self.submit(owner, address, instruction).await
    }

    pub async fn delete(
        &self,
        owner: &Pubkey,
        target: &DeleteTarget,
    ) -> JournalResult<ConfirmationToken> {
        let (address, title) = self.resolve_delete(owner, target).await?;
        self.delete_resolved(owner, address, title).await
    }

    /// Delete the entry at `address` whose title seed is `title`, as returned
    /// by [`resolve_delete`](Self::resolve_delete).
    pub async fn delete_resolved(
        &self,
        owner: &Pubkey,
        address: Address,
        title: String,
    ) -> JournalResult<ConfirmationToken> {
        let instruction = JournalInstruction::DeleteEntry { title };
        self.submit(owner, address, instruction).await
    }

    /// Address and title a delete targets.
    ///
    /// The program keys deletion off the title seed, so deleting by address
    /// reads the entry first to recover it.
    pub async fn resolve_delete(
        &self,
        owner: &Pubkey,
        target: &DeleteTarget,
    ) -> JournalResult<(Address, String)> {
        match target {
            DeleteTarget::Title(title) => {
                validate_title(title)?;
                Ok((self.derive_address(owner, title)?, title.clone()))
            }
            DeleteTarget::Address(address) => {
                let entry = self.fetch_one(address).await?;
                Ok((*address, entry.title))
            }
        }
    }

    async fn submit(
        &self,
        owner: &Pubkey,
        address: Address,
        instruction: JournalInstruction,
    ) -> JournalResult<ConfirmationToken> {
        let signer = self.signer.as_ref().ok_or(JournalError::SignerNotConnected)?;
        let signer_key = signer.pubkey();
        if signer_key != *owner {
            return Err(JournalError::rejected(format!(
                "signer {} does not own entries of {}",
                signer_key.ellipsify(4),
                owner.ellipsify(4)
            )));
        }

        let kind = instruction.kind();
        let unsigned = UnsignedSubmission {
            program_id: self.program_id,
            address,
            signer: signer_key,
            instruction: instruction.encode(),
        };
        let signature = signer.sign(&unsigned.message()).await?;

        match self.transport.submit(unsigned.into_signed(signature)).await {
            Ok(token) => {
                info!(
                    kind = %kind,
                    cluster = %self.cluster.name,
                    address = %address,
                    token = %token,
                    "Submission confirmed"
                );
                Ok(token)
            }
            Err(err) => {
                warn!(
                    kind = %kind,
                    cluster = %self.cluster.name,
                    address = %address,
                    error = %err,
                    "Submission failed"
                );
                Err(err)
            }
        }
    }
}

fn decode_entry(address: &Address, account: &AccountInfo) -> JournalResult<JournalEntry> {
    JournalEntryState::decode(&account.data)
        .map(|state| state.into_entry(*address))
        .map_err(|e| JournalError::MalformedAccount {
            address: *address,
            reason: e.to_string(),
        })
}
