//! Deterministic address derivation for journal entries.
//!
//! An entry lives at a program-derived address: a SHA-256 hash of the seeds
//! `[title, owner]`, a one-byte bump, the program id and a fixed marker. The
//! hash is only accepted when it does NOT decode to an ed25519 point, so no
//! private key can ever sign for the address. Bumps are tried from 255
//! downwards and the first viable one wins, which keeps the result stable.

use ed25519_dalek::VerifyingKey;
use sha2::{Digest, Sha256};

use crate::error::{JournalError, JournalResult};
use crate::identity::{Address, ProgramId, Pubkey};

/// Maximum length of a single derivation seed.
pub const MAX_SEED_LEN: usize = 32;

const PDA_MARKER: &[u8] = b"ProgramDerivedAddress";

/// Derive the address of `owner`'s entry titled `title`.
pub fn derive(owner: &Pubkey, title: &str, program_id: &ProgramId) -> JournalResult<Address> {
    derive_with_bump(owner, title, program_id).map(|(address, _)| address)
}

/// Derive the address together with the bump seed that produced it.
pub fn derive_with_bump(
    owner: &Pubkey,
    title: &str,
    program_id: &ProgramId,
) -> JournalResult<(Address, u8)> {
    if title.is_empty() {
        return Err(JournalError::invalid_input("title", "must not be empty"));
    }
    if title.len() > MAX_SEED_LEN {
        return Err(JournalError::invalid_input(
            "title",
            format!("seed exceeds {} bytes", MAX_SEED_LEN),
        ));
    }

    find_program_address(&[title.as_bytes(), owner.as_bytes()], program_id).ok_or_else(|| {
        JournalError::invalid_input("title", "no viable bump seed for derived address")
    })
}

/// Search bumps 255..=0 for the first off-curve address.
pub fn find_program_address(seeds: &[&[u8]], program_id: &ProgramId) -> Option<(Address, u8)> {
    (0..=u8::MAX)
        .rev()
        .find_map(|bump| create_program_address(seeds, bump, program_id).map(|a| (a, bump)))
}

/// Hash seeds with one bump; `None` when the hash lands on the curve.
pub fn create_program_address(
    seeds: &[&[u8]],
    bump: u8,
    program_id: &ProgramId,
) -> Option<Address> {
    let mut hasher = Sha256::new();
    for seed in seeds {
        hasher.update(seed);
    }
    hasher.update([bump]);
    hasher.update(program_id.as_bytes());
    hasher.update(PDA_MARKER);
    let hash: [u8; 32] = hasher.finalize().into();

    if is_on_curve(&hash) {
        None
    } else {
        Some(Pubkey::new(hash))
    }
}

/// True if the bytes decompress to an ed25519 point.
pub fn is_on_curve(bytes: &[u8; 32]) -> bool {
    VerifyingKey::from_bytes(bytes).is_ok()
}
