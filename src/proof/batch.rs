//! Batch Root Updates
//!
//! The operator keeps the entry store off-chain and periodically publishes
//! a new signed root. A batch is accepted only if every item is a valid
//! step from the previous root, the operator signed the resulting root,
//! and the sequence number moves strictly forward.

use serde::{Serialize, Deserialize};
#[cfg(feature = "debug-tracing")]
use tracing::trace;

use crate::core::hash::{short_hex, Commit, CommitmentHasher, Hash, EMPTY_LEAF, LEAF_DOMAIN, ROOT_DOMAIN};
use crate::core::keys::{verify_signature, IdentityKey, SignatureBytes, SigningKeypair};
use crate::error::{LottoError, LottoResult, SignedObject};
use crate::game::board::LottoEntry;
use crate::proof::merkle::{empty_root, MembershipProof};

// =============================================================================
// STORE LEAF
// =============================================================================

/// One occupied slot: who played, and what.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreLeaf {
    /// Identity that signed the entry.
    pub owner: IdentityKey,
    /// Commitment of the entry.
    pub entry_commitment: Hash,
}

impl StoreLeaf {
    /// Leaf for a player's entry.
    pub fn new(owner: IdentityKey, entry: &LottoEntry) -> Self {
        Self {
            owner,
            entry_commitment: entry.commitment(),
        }
    }
}

impl Commit for StoreLeaf {
    fn commitment(&self) -> Hash {
        let mut hasher = CommitmentHasher::new(LEAF_DOMAIN);
        hasher.update_hash(&self.entry_commitment);
        hasher.update_bytes(self.owner.as_bytes());
        hasher.finalize()
    }
}

/// Digest stored in the tree for a slot: the leaf commitment, or the
/// empty sentinel.
#[inline]
pub fn leaf_hash(leaf: Option<&StoreLeaf>) -> Hash {
    match leaf {
        Some(l) => l.commitment(),
        None => EMPTY_LEAF,
    }
}

// =============================================================================
// BATCH ITEMS
// =============================================================================

/// One slot mutation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeafUpdate {
    /// Slot content before the update (None = empty).
    pub old_leaf: Option<StoreLeaf>,
    /// Slot content after the update (None = cleared).
    pub new_leaf: Option<StoreLeaf>,
    /// Path for the slot. Authenticates both the old and the new content.
    pub proof: MembershipProof,
}

impl LeafUpdate {
    /// Fill an empty slot.
    pub fn insert(leaf: StoreLeaf, proof: MembershipProof) -> Self {
        Self {
            old_leaf: None,
            new_leaf: Some(leaf),
            proof,
        }
    }

    /// Slot this item touches.
    pub fn slot(&self) -> u64 {
        self.proof.leaf_index
    }
}

/// Signed snapshot of the store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedRoot {
    /// Store root.
    pub root: Hash,
    /// Strictly increasing update counter.
    pub sequence: u64,
    /// Operator signature over `(root, sequence)`.
    pub signature: SignatureBytes,
}

impl AuthenticatedRoot {
    /// Empty store at sequence 0. The genesis signature is never checked.
    pub fn genesis(depth: usize) -> Self {
        Self {
            root: empty_root(depth),
            sequence: 0,
            signature: SignatureBytes::ZERO,
        }
    }

    /// Operator-side: sign a root.
    pub fn sign(keypair: &SigningKeypair, root: Hash, sequence: u64) -> Self {
        Self {
            root,
            sequence,
            signature: sign_root_update(keypair, &root, sequence),
        }
    }

    /// Check the signature against the operator key.
    pub fn verify(&self, operator: &IdentityKey) -> bool {
        verify_signature(
            operator,
            &root_update_message(&self.root, self.sequence),
            &self.signature,
        )
    }
}

/// Bytes the operator signs for a root update.
pub fn root_update_message(root: &Hash, sequence: u64) -> Vec<u8> {
    let mut message = Vec::with_capacity(ROOT_DOMAIN.len() + 32 + 8);
    message.extend_from_slice(ROOT_DOMAIN);
    message.extend_from_slice(root);
    message.extend_from_slice(&sequence.to_le_bytes());
    message
}

/// Operator-side: sign `(root, sequence)`.
pub fn sign_root_update(keypair: &SigningKeypair, root: &Hash, sequence: u64) -> SignatureBytes {
    keypair.sign(&root_update_message(root, sequence))
}

// =============================================================================
// VERIFICATION
// =============================================================================

/// Walk a batch from `old_root`, checking each item against the running
/// root. Returns the root after the last item.
///
/// Items are sequential: item `i` is checked against the root produced by
/// items `0..i`.
pub fn replay_batch(old_root: &Hash, batch: &[LeafUpdate]) -> LottoResult<Hash> {
    let mut current_root = *old_root;

    for (i, update) in batch.iter().enumerate() {
        let old_hash = leaf_hash(update.old_leaf.as_ref());
        if update.proof.compute_root(&old_hash) != current_root {
            return Err(LottoError::InvalidProof(format!(
                "batch item {} (slot {}) does not match root {}",
                i,
                update.slot(),
                short_hex(&current_root)
            )));
        }

        let new_hash = leaf_hash(update.new_leaf.as_ref());
        current_root = update.proof.compute_root(&new_hash);

        #[cfg(feature = "debug-tracing")]
        trace!(item = i, slot = update.slot(), root = %short_hex(&current_root), "batch item applied");
    }

    Ok(current_root)
}

/// Verify a whole batch and return the newly authenticated root.
///
/// 1. Every item must step from the running root (atomic: any failure
///    rejects the batch).
/// 2. `new_root_signature` must be the signer's signature over the final
///    root and `new_sequence`.
/// 3. `new_sequence` must be strictly greater than `old_sequence`.
///
/// An empty batch is accepted and returns `old_root`, but still needs a
/// fresh signature and sequence number.
pub fn verify_and_apply_batch(
    signer: &IdentityKey,
    old_sequence: u64,
    old_root: &Hash,
    batch: &[LeafUpdate],
    new_sequence: u64,
    new_root_signature: &SignatureBytes,
) -> LottoResult<Hash> {
    let new_root = replay_batch(old_root, batch)?;

    let message = root_update_message(&new_root, new_sequence);
    if !verify_signature(signer, &message, new_root_signature) {
        return Err(LottoError::SignatureInvalid(SignedObject::RootUpdate));
    }

    if new_sequence <= old_sequence {
        return Err(LottoError::StaleSequence {
            current: old_sequence,
            claimed: new_sequence,
        });
    }

    Ok(new_root)
}
