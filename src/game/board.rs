//! Game Board and Entries
//!
//! Record types shared by the epoch state machine, the entry verifier and
//! the settlement history.

use serde::{Serialize, Deserialize};

use crate::core::clock::Timestamp;
use crate::core::hash::{Commit, CommitmentHasher, Hash, BOARD_DOMAIN, ENTRY_DOMAIN, NUMBERS_DOMAIN};
use crate::error::{LottoError, LottoResult};

/// Numbers picked per entry.
pub const LOTTO_NUMBER_COUNT: usize = 6;

/// The six picked numbers, in play order.
pub type LottoNumbers = [u32; LOTTO_NUMBER_COUNT];

// =============================================================================
// LOTTO ENTRY
// =============================================================================

/// One play for one epoch. Winning draws share the same shape.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LottoEntry {
    /// Epoch this entry plays in.
    pub epoch_id: u64,
    /// Picked numbers.
    pub numbers: LottoNumbers,
}

impl LottoEntry {
    /// Create an entry.
    pub const fn new(epoch_id: u64, numbers: LottoNumbers) -> Self {
        Self { epoch_id, numbers }
    }
}

/// Digest of the numbers alone.
pub fn numbers_commitment(numbers: &LottoNumbers) -> Hash {
    let mut hasher = CommitmentHasher::new(NUMBERS_DOMAIN);
    for n in numbers {
        hasher.update_u32(*n);
    }
    hasher.finalize()
}

impl Commit for LottoEntry {
    /// `H(epoch_id, H(numbers))`: identical numbers in two epochs commit differently.
    fn commitment(&self) -> Hash {
        let mut hasher = CommitmentHasher::new(ENTRY_DOMAIN);
        hasher.update_u64(self.epoch_id);
        hasher.update_hash(&numbers_commitment(&self.numbers));
        hasher.finalize()
    }
}

// =============================================================================
// GAME RULES
// =============================================================================

/// Inclusive range every picked or drawn number must fall in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumberRange {
    /// Smallest legal number.
    pub min: u32,
    /// Largest legal number.
    pub max: u32,
}

impl Default for NumberRange {
    fn default() -> Self {
        Self { min: 1, max: 49 }
    }
}

impl NumberRange {
    /// Check if a single number is legal.
    #[inline]
    pub fn contains(&self, value: u32) -> bool {
        value >= self.min && value <= self.max
    }

    /// Reject the first out-of-range number.
    pub fn check(&self, numbers: &LottoNumbers) -> LottoResult<()> {
        match numbers.iter().find(|n| !self.contains(**n)) {
            Some(&value) => Err(LottoError::NumberOutOfRange {
                value,
                min: self.min,
                max: self.max,
            }),
            None => Ok(()),
        }
    }
}

/// How a claimed entry is judged against the draw.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchRule {
    /// Same numbers in the same order as the draw.
    Exact,
    /// At least this many drawn numbers appear anywhere in the entry.
    AtLeast(usize),
}

impl Default for MatchRule {
    fn default() -> Self {
        Self::Exact
    }
}

impl MatchRule {
    /// Numbers this rule needs to pay out.
    pub fn required(&self) -> usize {
        match self {
            Self::Exact => LOTTO_NUMBER_COUNT,
            Self::AtLeast(k) => *k,
        }
    }

    /// Judge an entry against a settled draw.
    ///
    /// `Exact` compares against the recorded winning commitment, so the
    /// entry must reproduce the draw digest bit for bit.
    /// Returns the number of matched numbers.
    pub fn evaluate(
        &self,
        entry: &LottoEntry,
        winning: &LottoEntry,
        winning_commitment: &Hash,
    ) -> LottoResult<usize> {
        let matched = matched_count(&entry.numbers, &winning.numbers);
        let wins = match self {
            Self::Exact => entry.commitment() == *winning_commitment,
            Self::AtLeast(k) => matched >= *k,
        };

        if wins {
            Ok(matched)
        } else {
            Err(LottoError::NotAWinner {
                matched,
                required: self.required(),
            })
        }
    }
}

/// Distinct entry numbers that were drawn.
pub fn matched_count(entry: &LottoNumbers, winning: &LottoNumbers) -> usize {
    let mut seen: Vec<u32> = Vec::with_capacity(LOTTO_NUMBER_COUNT);
    for n in entry {
        if winning.contains(n) && !seen.contains(n) {
            seen.push(*n);
        }
    }
    seen.len()
}

// =============================================================================
// GAME BOARD
// =============================================================================

/// Lifecycle phase derived from the live board.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EpochPhase {
    /// No epoch has ever been opened.
    Idle,
    /// Entries are accepted until the window closes.
    Open {
        /// Open epoch.
        epoch_id: u64,
    },
    /// Draw recorded, claims accepted.
    Settled {
        /// Most recently settled epoch.
        epoch_id: u64,
    },
}

/// The live (or most recently closed) epoch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameBoard {
    /// Epoch number, 0 before the first epoch.
    pub epoch_id: u64,
    /// Window start (inclusive).
    pub start_time: Timestamp,
    /// Window end (exclusive for entries, inclusive for closing).
    pub end_time: Timestamp,
    /// Whether the draw has been recorded.
    pub is_settled: bool,
}

impl GameBoard {
    /// Board before any epoch: settled, so the first open is legal.
    pub fn genesis(now: Timestamp) -> Self {
        Self {
            epoch_id: 0,
            start_time: 0,
            end_time: now,
            is_settled: true,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> EpochPhase {
        if self.epoch_id == 0 {
            EpochPhase::Idle
        } else if self.is_settled {
            EpochPhase::Settled { epoch_id: self.epoch_id }
        } else {
            EpochPhase::Open { epoch_id: self.epoch_id }
        }
    }

    /// Entry window check: `[start, end)`.
    #[inline]
    pub fn accepts_entries_at(&self, now: Timestamp) -> bool {
        !self.is_settled && now >= self.start_time && now < self.end_time
    }
}

impl Commit for GameBoard {
    fn commitment(&self) -> Hash {
        let mut hasher = CommitmentHasher::new(BOARD_DOMAIN);
        hasher.update_u64(self.epoch_id);
        hasher.update_u64(self.start_time);
        hasher.update_u64(self.end_time);
        hasher.update_bool(self.is_settled);
        hasher.finalize()
    }
}

// =============================================================================
// WIN HISTORY
// =============================================================================

/// Append-only list of winning draws, one per settled epoch.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WinHistory {
    draws: Vec<LottoEntry>,
}

impl WinHistory {
    /// Create an empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a draw. Only the settlement transition calls this.
    pub(crate) fn push(&mut self, draw: LottoEntry) {
        self.draws.push(draw);
    }

    /// All draws, oldest first.
    pub fn draws(&self) -> &[LottoEntry] {
        &self.draws
    }

    /// Most recent draw.
    pub fn latest(&self) -> Option<&LottoEntry> {
        self.draws.last()
    }

    /// Draw for a given epoch.
    pub fn for_epoch(&self, epoch_id: u64) -> Option<&LottoEntry> {
        self.draws.iter().find(|d| d.epoch_id == epoch_id)
    }

    /// Number of settled epochs.
    pub fn len(&self) -> usize {
        self.draws.len()
    }

    /// True before the first settlement.
    pub fn is_empty(&self) -> bool {
        self.draws.is_empty()
    }
}
