//! Gluon Core - Journal Entry Types
//!
//! Pure data structures and pure functions shared by every other crate:
//! - Identity types (`Pubkey`, `Address`, `ConfirmationToken`)
//! - The `JournalEntry` domain record and its validation limits
//! - Deterministic address derivation for entries
//! - The binary layout of the journal program's accounts and instructions
//! - Cluster descriptors that namespace all client state
//!
//! This crate performs no I/O.

pub mod address;
pub mod cluster;
pub mod entry;
pub mod error;
pub mod identity;
pub mod program;

pub use address::{
    create_program_address, derive, derive_with_bump, find_program_address, is_on_curve,
    MAX_SEED_LEN,
};
pub use cluster::{Cluster, ClusterId, ClusterNetwork};
pub use entry::{
    validate_message, validate_title, JournalEntry, MutationKind, ProgramAccount,
    MAX_MESSAGE_LEN, MAX_TITLE_LEN,
};
pub use error::{JournalError, JournalResult};
pub use identity::{Address, ConfirmationToken, ProgramId, Pubkey};
pub use program::{
    account_discriminator, discriminator, JournalEntryState, JournalInstruction, LayoutError,
    DISCRIMINATOR_LEN, JOURNAL_PROGRAM_ID,
};
