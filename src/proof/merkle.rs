//! Merkle Membership Proofs
//!
//! Fixed-depth binary Merkle tree over the off-chain entry store, using
//! domain-separated SHA-256 nodes. Empty slots hold `EMPTY_LEAF`.
//!
//! The verification core only ever folds a `MembershipProof`. `StoreTree`
//! is the operator-side full tree that produces those proofs.

use std::collections::BTreeMap;
use serde::{Serialize, Deserialize};

use crate::core::hash::{hash_nodes, Commit, Hash, EMPTY_LEAF};
use crate::error::{LottoError, LottoResult};
use crate::proof::batch::{LeafUpdate, StoreLeaf};

/// Default store depth: 7 sibling levels, 128 slots.
pub const DEFAULT_TREE_DEPTH: usize = 7;

/// Deepest store supported.
pub const MAX_TREE_DEPTH: usize = 32;

/// Authentication path from one slot to the root.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipProof {
    /// Slot this path belongs to. Bit `i` picks the side at level `i`.
    pub leaf_index: u64,
    /// Sibling digests, leaf level first.
    pub siblings: Vec<Hash>,
}

impl MembershipProof {
    /// Create a proof.
    pub fn new(leaf_index: u64, siblings: Vec<Hash>) -> Self {
        Self { leaf_index, siblings }
    }

    /// Path length.
    pub fn depth(&self) -> usize {
        self.siblings.len()
    }

    /// Fold the path from `leaf_hash` up to a root.
    pub fn compute_root(&self, leaf_hash: &Hash) -> Hash {
        let mut current = *leaf_hash;
        let mut index = self.leaf_index;

        for sibling in &self.siblings {
            current = if index & 1 == 0 {
                hash_nodes(&current, sibling)
            } else {
                hash_nodes(sibling, &current)
            };
            index >>= 1;
        }

        current
    }

    /// Check the path leads from `leaf_hash` to `root`.
    pub fn verify(&self, root: &Hash, leaf_hash: &Hash) -> bool {
        self.compute_root(leaf_hash) == *root
    }

    /// Reject paths that do not fit a store of `expected` depth.
    pub fn check_depth(&self, expected: usize) -> LottoResult<()> {
        if self.depth() != expected {
            return Err(LottoError::InvalidProof(format!(
                "path has depth {}, store depth is {}",
                self.depth(),
                expected
            )));
        }

        if expected < 64 && self.leaf_index >> expected != 0 {
            return Err(LottoError::InvalidProof(format!(
                "slot {} outside a store of depth {}",
                self.leaf_index, expected
            )));
        }

        Ok(())
    }
}

/// Roots of all-empty subtrees, index = subtree height.
pub fn empty_subtree_roots(depth: usize) -> Vec<Hash> {
    let mut zeros = Vec::with_capacity(depth + 1);
    zeros.push(EMPTY_LEAF);
    for level in 0..depth {
        let below = zeros[level];
        zeros.push(hash_nodes(&below, &below));
    }
    zeros
}

/// Root of a store with every slot empty.
pub fn empty_root(depth: usize) -> Hash {
    empty_subtree_roots(depth)[depth]
}

// =============================================================================
// OFF-CHAIN STORE TREE
// =============================================================================

/// Sparse fixed-depth tree holding the full store.
///
/// Only non-empty nodes are kept; missing nodes are empty subtrees.
#[derive(Clone, Debug)]
pub struct StoreTree {
    depth: usize,
    /// Empty subtree roots per level.
    zeros: Vec<Hash>,
    /// Non-empty nodes per level (leaves at index 0, root at `depth`).
    levels: Vec<BTreeMap<u64, Hash>>,
    /// Leaf records by slot.
    leaves: BTreeMap<u64, StoreLeaf>,
}

impl StoreTree {
    /// Create an empty store.
    pub fn new(depth: usize) -> LottoResult<Self> {
        if depth == 0 || depth > MAX_TREE_DEPTH {
            return Err(LottoError::InvalidProof(format!(
                "unsupported store depth {}",
                depth
            )));
        }

        Ok(Self {
            depth,
            zeros: empty_subtree_roots(depth),
            levels: vec![BTreeMap::new(); depth + 1],
            leaves: BTreeMap::new(),
        })
    }

    /// Store depth.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Number of slots.
    pub fn capacity(&self) -> u64 {
        1u64 << self.depth
    }

    /// Occupied slots.
    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    /// True when no slot is occupied.
    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// Current root.
    pub fn root(&self) -> Hash {
        self.node(self.depth, 0)
    }

    /// Record in a slot.
    pub fn get(&self, index: u64) -> Option<&StoreLeaf> {
        self.leaves.get(&index)
    }

    /// Lowest empty slot.
    pub fn first_empty_slot(&self) -> Option<u64> {
        (0..self.capacity()).find(|i| !self.leaves.contains_key(i))
    }

    /// Slot holding `leaf`, if any.
    pub fn find(&self, leaf: &StoreLeaf) -> Option<u64> {
        self.leaves
            .iter()
            .find(|(_, stored)| *stored == leaf)
            .map(|(index, _)| *index)
    }

    /// Authentication path for a slot.
    ///
    /// Returns None if index is out of bounds.
    pub fn proof(&self, index: u64) -> Option<MembershipProof> {
        if index >= self.capacity() {
            return None;
        }

        let siblings = (0..self.depth)
            .map(|level| self.node(level, (index >> level) ^ 1))
            .collect();

        Some(MembershipProof::new(index, siblings))
    }

    /// Write (or clear) a slot and return the batch item describing it.
    ///
    /// The item's proof is taken before the write; paths are position
    /// stable so it also authenticates the new leaf.
    pub fn update(&mut self, index: u64, new_leaf: Option<StoreLeaf>) -> LottoResult<LeafUpdate> {
        let proof = self.proof(index).ok_or_else(|| {
            LottoError::InvalidProof(format!("slot {} outside store of depth {}", index, self.depth))
        })?;
        let old_leaf = self.leaves.get(&index).copied();

        self.write(index, new_leaf);

        Ok(LeafUpdate { old_leaf, new_leaf, proof })
    }

    fn write(&mut self, index: u64, leaf: Option<StoreLeaf>) {
        let mut hash = match &leaf {
            Some(l) => {
                self.leaves.insert(index, *l);
                l.commitment()
            }
            None => {
                self.leaves.remove(&index);
                EMPTY_LEAF
            }
        };

        let mut idx = index;
        for level in 0..self.depth {
            self.set_node(level, idx, hash);
            let sibling = self.node(level, idx ^ 1);
            hash = if idx & 1 == 0 {
                hash_nodes(&hash, &sibling)
            } else {
                hash_nodes(&sibling, &hash)
            };
            idx >>= 1;
        }
        self.set_node(self.depth, 0, hash);
    }

    fn node(&self, level: usize, index: u64) -> Hash {
        self.levels[level]
            .get(&index)
            .copied()
            .unwrap_or(self.zeros[level])
    }

    fn set_node(&mut self, level: usize, index: u64, hash: Hash) {
        if hash == self.zeros[level] {
            self.levels[level].remove(&index);
        } else {
            self.levels[level].insert(index, hash);
        }
    }
}
