//! Entry and Claim Signatures
//!
//! A player signs `commitment(entry) || identity`. The same message backs
//! both the submission and any later claim on it.

use crate::core::hash::{Commit, Hash};
use crate::core::keys::{verify_signature, IdentityKey, SignatureBytes, SigningKeypair};
use crate::error::{LottoError, LottoResult, SignedObject};
use crate::game::board::LottoEntry;

/// Bytes a player signs for an entry.
pub fn entry_message(identity: &IdentityKey, entry: &LottoEntry) -> Vec<u8> {
    message_for(&entry.commitment(), identity)
}

fn message_for(commitment: &Hash, identity: &IdentityKey) -> Vec<u8> {
    let mut message = Vec::with_capacity(64);
    message.extend_from_slice(commitment);
    message.extend_from_slice(identity.as_bytes());
    message
}

/// Player-side: sign an entry.
pub fn sign_entry(keypair: &SigningKeypair, entry: &LottoEntry) -> SignatureBytes {
    keypair.sign(&entry_message(&keypair.identity(), entry))
}

/// Check a player's signature over an entry and return the entry's
/// commitment. A bad signature is a hard rejection.
pub fn verify_signed_entry(
    identity: &IdentityKey,
    signature: &SignatureBytes,
    entry: &LottoEntry,
) -> LottoResult<Hash> {
    verify_signed(identity, signature, entry, SignedObject::Entry)
}

/// Same check for a claim on a settled entry.
pub fn verify_signed_claim(
    identity: &IdentityKey,
    signature: &SignatureBytes,
    entry: &LottoEntry,
) -> LottoResult<Hash> {
    verify_signed(identity, signature, entry, SignedObject::Claim)
}

fn verify_signed(
    identity: &IdentityKey,
    signature: &SignatureBytes,
    entry: &LottoEntry,
    what: SignedObject,
) -> LottoResult<Hash> {
    let commitment = entry.commitment();

    if verify_signature(identity, &message_for(&commitment, identity), signature) {
        Ok(commitment)
    } else {
        Err(LottoError::SignatureInvalid(what))
    }
}
