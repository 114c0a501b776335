//! Lottery Errors
//!
//! Every rejection is local to the call that caused it. A failed call
//! leaves the committed state untouched and is never retried by the core.

use thiserror::Error;

/// Which signed object failed verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignedObject {
    /// A lottery entry submission.
    Entry,
    /// A winning claim.
    Claim,
    /// An operator root update.
    RootUpdate,
}

impl std::fmt::Display for SignedObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Entry => write!(f, "entry"),
            Self::Claim => write!(f, "claim"),
            Self::RootUpdate => write!(f, "root update"),
        }
    }
}

/// Errors raised by the verification core.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LottoError {
    /// A membership path does not reconstruct the expected root.
    #[error("invalid membership proof: {0}")]
    InvalidProof(String),

    /// Claimed sequence number is not ahead of the current one.
    #[error("stale sequence number: current {current}, claimed {claimed}")]
    StaleSequence {
        /// Sequence number of the stored root.
        current: u64,
        /// Sequence number presented by the caller.
        claimed: u64,
    },

    /// Signature did not verify.
    #[error("invalid {0} signature")]
    SignatureInvalid(SignedObject),

    /// Operation attempted outside its legal state or time window.
    #[error("epoch state violation: {0}")]
    EpochStateViolation(String),

    /// Submission targets a slot that already holds an entry.
    #[error("store slot {index} is already occupied")]
    SlotOccupied {
        /// Leaf index of the occupied slot.
        index: u64,
    },

    /// Epoch id on the request disagrees with the epoch it targets.
    #[error("epoch mismatch: expected {expected}, got {got}")]
    MismatchedEpoch {
        /// Epoch the state machine expects.
        expected: u64,
        /// Epoch carried by the request.
        got: u64,
    },

    /// A lottery number lies outside the configured range.
    #[error("number {value} outside range [{min}, {max}]")]
    NumberOutOfRange {
        /// Offending number.
        value: u32,
        /// Inclusive lower bound.
        min: u32,
        /// Inclusive upper bound.
        max: u32,
    },

    /// Entry does not satisfy the configured match rule.
    #[error("entry matched {matched} numbers, {required} required")]
    NotAWinner {
        /// Numbers that matched the draw.
        matched: usize,
        /// Numbers the match rule requires.
        required: usize,
    },

    /// The slot has already been paid out for this epoch.
    #[error("store slot {index} already claimed for epoch {epoch_id}")]
    AlreadyClaimed {
        /// Settled epoch.
        epoch_id: u64,
        /// Leaf index of the claimed slot.
        index: u64,
    },

    /// Persisted state could not be encoded or decoded.
    #[error("state encoding error: {0}")]
    Encoding(String),
}

impl From<bincode::Error> for LottoError {
    fn from(err: bincode::Error) -> Self {
        Self::Encoding(err.to_string())
    }
}

impl From<serde_json::Error> for LottoError {
    fn from(err: serde_json::Error) -> Self {
        Self::Encoding(err.to_string())
    }
}

/// Result alias for the verification core.
pub type LottoResult<T> = Result<T, LottoError>;
