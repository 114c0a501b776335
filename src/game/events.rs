//! Lottery Events
//!
//! Emitted by state transitions. The payout collaborator listens for
//! `ClaimApproved`; everything else is informational.

use serde::{Serialize, Deserialize};

use crate::core::clock::Timestamp;
use crate::core::hash::Hash;
use crate::core::keys::IdentityKey;

/// Event data.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LottoEventData {
    /// A new epoch started accepting entries.
    EpochOpened {
        epoch_id: u64,
        start_time: Timestamp,
        end_time: Timestamp,
    },

    /// An entry passed verification and is waiting for the next batch.
    EntryAccepted {
        epoch_id: u64,
        owner: IdentityKey,
        slot: u64,
        entry_commitment: Hash,
    },

    /// The operator's batch was verified and the store root advanced.
    RootAdvanced {
        sequence: u64,
        root: Hash,
        updates: usize,
    },

    /// Draw recorded for an epoch.
    EpochSettled {
        epoch_id: u64,
        winning_commitment: Hash,
        store_root: Hash,
    },

    /// A winning entry was proven; pay `owner`.
    ClaimApproved {
        epoch_id: u64,
        owner: IdentityKey,
        slot: u64,
        matched: usize,
    },
}

/// Event tagged with the state version that produced it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LottoEvent {
    /// Version of the state after the transition.
    pub version: u64,
    /// Event data.
    pub data: LottoEventData,
}

impl LottoEvent {
    /// Create a new event.
    pub fn new(version: u64, data: LottoEventData) -> Self {
        Self { version, data }
    }

    /// Whether the payout collaborator must act on this event.
    pub fn is_payout(&self) -> bool {
        matches!(self.data, LottoEventData::ClaimApproved { .. })
    }
}
