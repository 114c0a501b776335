//! Commitment Hashing
//!
//! Deterministic, domain-separated SHA-256 digests for every record the
//! lottery commits to:
//! - Lottery entries and winning draws
//! - Game boards
//! - Merkle store leaves and inner nodes

use sha2::{Sha256, Digest};

/// Digest output type (256 bits / 32 bytes).
pub type Hash = [u8; 32];

/// Sentinel digest for an empty store slot.
pub const EMPTY_LEAF: Hash = [0u8; 32];

/// Domain separator for the six-number commitment.
pub const NUMBERS_DOMAIN: &[u8] = b"ZKLOTTO_NUMBERS_V1";

/// Domain separator for an epoch-bound lottery entry.
pub const ENTRY_DOMAIN: &[u8] = b"ZKLOTTO_ENTRY_V1";

/// Domain separator for game boards.
pub const BOARD_DOMAIN: &[u8] = b"ZKLOTTO_BOARD_V1";

/// Domain separator for store leaves.
pub const LEAF_DOMAIN: &[u8] = b"ZKLOTTO_LEAF_V1";

/// Domain separator for Merkle inner nodes.
pub const NODE_DOMAIN: &[u8] = b"ZKLOTTO_NODE_V1";

/// Domain separator for signed root updates.
pub const ROOT_DOMAIN: &[u8] = b"ZKLOTTO_ROOT_V1";

/// Anything with a canonical commitment digest.
pub trait Commit {
    /// Digest of the value's canonical encoding.
    fn commitment(&self) -> Hash;
}

/// Deterministic hasher for committed records.
///
/// Wraps SHA-256 with fixed-width little-endian helpers.
/// Order of updates is part of the encoding.
pub struct CommitmentHasher {
    hasher: Sha256,
}

impl CommitmentHasher {
    /// Create a new hasher with domain separator.
    pub fn new(domain: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(domain);
        Self { hasher }
    }

    /// Update with raw bytes.
    #[inline]
    pub fn update_bytes(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
    }

    /// Update with a u32 value (little-endian).
    #[inline]
    pub fn update_u32(&mut self, value: u32) {
        self.hasher.update(value.to_le_bytes());
    }

    /// Update with a u64 value (little-endian).
    #[inline]
    pub fn update_u64(&mut self, value: u64) {
        self.hasher.update(value.to_le_bytes());
    }

    /// Update with a boolean.
    #[inline]
    pub fn update_bool(&mut self, value: bool) {
        self.hasher.update([value as u8]);
    }

    /// Update with another digest.
    #[inline]
    pub fn update_hash(&mut self, hash: &Hash) {
        self.hasher.update(hash);
    }

    /// Finalize and return the digest.
    pub fn finalize(self) -> Hash {
        self.hasher.finalize().into()
    }
}

/// Hash two child nodes into their parent.
pub fn hash_nodes(left: &Hash, right: &Hash) -> Hash {
    let mut hasher = CommitmentHasher::new(NODE_DOMAIN);
    hasher.update_hash(left);
    hasher.update_hash(right);
    hasher.finalize()
}

/// First four bytes of a digest as hex, for log lines.
pub fn short_hex(hash: &Hash) -> String {
    hex::encode(&hash[..4])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hasher_determinism() {
        let make_hash = || {
            let mut hasher = CommitmentHasher::new(ENTRY_DOMAIN);
            hasher.update_u64(7);
            hasher.update_u32(42);
            hasher.update_bool(true);
            hasher.finalize()
        };

        assert_eq!(make_hash(), make_hash());
    }

    #[test]
    fn test_hash_order_matters() {
        let hash1 = {
            let mut h = CommitmentHasher::new(b"test");
            h.update_u32(1);
            h.update_u32(2);
            h.finalize()
        };

        let hash2 = {
            let mut h = CommitmentHasher::new(b"test");
            h.update_u32(2);
            h.update_u32(1);
            h.finalize()
        };

        assert_ne!(hash1, hash2);
    }

    #[test]
    fn test_domain_separation() {
        let hash_in = |domain: &[u8]| {
            let mut h = CommitmentHasher::new(domain);
            h.update_bytes(&[1, 2, 3, 4]);
            h.finalize()
        };
        assert_ne!(hash_in(LEAF_DOMAIN), hash_in(NODE_DOMAIN));
    }

    #[test]
    fn test_node_hash_not_commutative() {
        let a = [1u8; 32];
        let b = [2u8; 32];
        assert_ne!(hash_nodes(&a, &b), hash_nodes(&b, &a));
    }

    #[test]
    fn test_short_hex() {
        assert_eq!(short_hex(&[0xab; 32]), "abababab");
    }
}
