//! Epoch State Machine
//!
//! `LottoState` is the single versioned state object. Every transition
//! borrows the current state and returns a new one; the caller commits
//! it. A failed transition returns an error and leaves nothing behind.
//!
//! ```text
//!   Idle ──open──▶ Open ──close──▶ Settled ──open──▶ Open ...
//!                  │ submit*       │ claim*
//! ```

use std::collections::{BTreeMap, BTreeSet};
use serde::{Serialize, Deserialize};

use crate::config::LottoConfig;
use crate::core::clock::Timestamp;
use crate::core::hash::{short_hex, Commit, Hash, EMPTY_LEAF};
use crate::core::keys::{IdentityKey, SignatureBytes};
use crate::error::{LottoError, LottoResult};
use crate::game::board::{EpochPhase, GameBoard, LottoEntry, WinHistory};
use crate::game::events::{LottoEvent, LottoEventData};
use crate::proof::batch::{verify_and_apply_batch, AuthenticatedRoot, LeafUpdate, StoreLeaf};
use crate::proof::entry::{verify_signed_claim, verify_signed_entry};
use crate::proof::merkle::MembershipProof;

/// Draw and store snapshot recorded when an epoch closes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    /// Settled epoch.
    pub epoch_id: u64,
    /// Winning numbers.
    pub winning: LottoEntry,
    /// `winning.commitment()`.
    pub winning_commitment: Hash,
    /// Store root claims are proven against.
    pub store_root: Hash,
    /// Store sequence number at settlement.
    pub store_sequence: u64,
    /// Close time.
    pub settled_at: Timestamp,
    /// Slots already paid.
    pub claimed: BTreeSet<u64>,
}

/// Submitter's view of the slot an entry should go into.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotWitness {
    /// What the submitter believes is in the slot (None = empty).
    pub occupant: Option<StoreLeaf>,
    /// Path for the slot against the current store root.
    pub proof: MembershipProof,
}

impl SlotWitness {
    /// Witness for an empty slot.
    pub fn empty(proof: MembershipProof) -> Self {
        Self { occupant: None, proof }
    }
}

/// Operator's request to advance the store root.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootUpdateRequest {
    /// Sequence number the batch was built on.
    pub old_sequence: u64,
    /// Root the batch was built on.
    pub old_root: Hash,
    /// Ordered slot mutations.
    pub updates: Vec<LeafUpdate>,
    /// Sequence number of the resulting root.
    pub new_sequence: u64,
    /// Operator signature over the resulting root and `new_sequence`.
    pub new_root_signature: SignatureBytes,
}

/// Approved claim handed to the payout collaborator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimReceipt {
    /// Settled epoch.
    pub epoch_id: u64,
    /// Winner.
    pub owner: IdentityKey,
    /// Store slot of the winning entry.
    pub slot: u64,
    /// Matched numbers.
    pub matched: usize,
}

/// Result of a successful transition.
#[derive(Debug)]
pub struct Transition<T> {
    /// State to commit.
    pub state: LottoState,
    /// Events produced.
    pub events: Vec<LottoEvent>,
    /// Transition-specific output.
    pub output: T,
}

/// Complete lottery state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LottoState {
    /// Bumped by every committed transition.
    pub version: u64,
    /// Key that signs store roots.
    pub operator: IdentityKey,
    /// Live board.
    pub board: GameBoard,
    /// Current signed store root.
    pub store: AuthenticatedRoot,
    /// Winning draws.
    pub history: WinHistory,
    /// Settlement record per epoch.
    pub settlements: BTreeMap<u64, Settlement>,
    /// Entries accepted in the current epoch.
    pub entries_this_epoch: u64,
    /// Slots handed to accepted entries that no batch has written yet.
    pub pending_slots: BTreeSet<u64>,
}

impl LottoState {
    /// Fresh state: no epoch yet, empty store.
    pub fn new(config: &LottoConfig, operator: IdentityKey, now: Timestamp) -> Self {
        Self {
            version: 0,
            operator,
            board: GameBoard::genesis(now),
            store: AuthenticatedRoot::genesis(config.tree_depth),
            history: WinHistory::new(),
            settlements: BTreeMap::new(),
            entries_this_epoch: 0,
            pending_slots: BTreeSet::new(),
        }
    }

    /// Current phase.
    pub fn phase(&self) -> EpochPhase {
        self.board.phase()
    }

    /// Winning commitment of the most recent draw.
    pub fn winning_commitment(&self) -> Option<Hash> {
        self.settlements
            .values()
            .next_back()
            .map(|s| s.winning_commitment)
    }

    /// Settlement record for an epoch.
    pub fn settlement(&self, epoch_id: u64) -> Option<&Settlement> {
        self.settlements.get(&epoch_id)
    }

    fn successor(&self) -> Self {
        let mut next = self.clone();
        next.version += 1;
        next
    }

    // =========================================================================
    // TRANSITIONS
    // =========================================================================

    /// Start the next epoch.
    ///
    /// Legal from `Idle` or `Settled`. After the first epoch, `now` must be
    /// at least `min_epoch_gap_secs` past the previous window's start.
    pub fn open_epoch(&self, config: &LottoConfig, now: Timestamp) -> LottoResult<Transition<GameBoard>> {
        match self.phase() {
            EpochPhase::Open { epoch_id } => {
                return Err(LottoError::EpochStateViolation(format!(
                    "epoch {} is still open",
                    epoch_id
                )));
            }
            EpochPhase::Settled { epoch_id } => {
                let earliest = self.board.start_time.saturating_add(config.min_epoch_gap_secs);
                if now < earliest {
                    return Err(LottoError::EpochStateViolation(format!(
                        "epoch {} started too recently, next epoch opens at {}",
                        epoch_id, earliest
                    )));
                }
            }
            EpochPhase::Idle => {}
        }

        let mut next = self.successor();
        next.board = GameBoard {
            epoch_id: self.board.epoch_id + 1,
            start_time: now,
            end_time: now.saturating_add(config.game_duration_secs),
            is_settled: false,
        };
        next.entries_this_epoch = 0;

        let event = LottoEvent::new(
            next.version,
            LottoEventData::EpochOpened {
                epoch_id: next.board.epoch_id,
                start_time: next.board.start_time,
                end_time: next.board.end_time,
            },
        );
        let board = next.board;

        Ok(Transition { state: next, events: vec![event], output: board })
    }

    /// Accept a signed entry for `epoch_id` into an empty slot.
    ///
    /// Returns the batch item the operator must include to store the entry.
    /// The slot stays reserved until a batch touching it is applied.
    #[allow(clippy::too_many_arguments)]
    pub fn submit(
        &self,
        config: &LottoConfig,
        now: Timestamp,
        identity: &IdentityKey,
        signature: &SignatureBytes,
        epoch_id: u64,
        entry: &LottoEntry,
        slot: &SlotWitness,
    ) -> LottoResult<Transition<LeafUpdate>> {
        let open_epoch = match self.phase() {
            EpochPhase::Open { epoch_id } => epoch_id,
            phase => {
                return Err(LottoError::EpochStateViolation(format!(
                    "entries are not accepted while {:?}",
                    phase
                )));
            }
        };

        if !self.board.accepts_entries_at(now) {
            return Err(LottoError::EpochStateViolation(format!(
                "time {} outside entry window [{}, {})",
                now, self.board.start_time, self.board.end_time
            )));
        }

        if epoch_id != open_epoch {
            return Err(LottoError::MismatchedEpoch {
                expected: open_epoch,
                got: epoch_id,
            });
        }
        if entry.epoch_id != epoch_id {
            return Err(LottoError::MismatchedEpoch {
                expected: epoch_id,
                got: entry.epoch_id,
            });
        }

        config.number_range.check(&entry.numbers)?;
        let entry_commitment = verify_signed_entry(identity, signature, entry)?;

        let proof = &slot.proof;
        proof.check_depth(config.tree_depth)?;
        match &slot.occupant {
            Some(occupant) if proof.verify(&self.store.root, &occupant.commitment()) => {
                return Err(LottoError::SlotOccupied { index: proof.leaf_index });
            }
            None if proof.verify(&self.store.root, &EMPTY_LEAF) => {}
            _ => {
                return Err(LottoError::InvalidProof(format!(
                    "slot {} witness does not match the store root",
                    proof.leaf_index
                )));
            }
        }
        if self.pending_slots.contains(&proof.leaf_index) {
            return Err(LottoError::SlotOccupied { index: proof.leaf_index });
        }

        let leaf = StoreLeaf {
            owner: *identity,
            entry_commitment,
        };

        let mut next = self.successor();
        next.entries_this_epoch += 1;
        next.pending_slots.insert(proof.leaf_index);

        let event = LottoEvent::new(
            next.version,
            LottoEventData::EntryAccepted {
                epoch_id,
                owner: *identity,
                slot: proof.leaf_index,
                entry_commitment,
            },
        );

        Ok(Transition {
            state: next,
            events: vec![event],
            output: LeafUpdate::insert(leaf, proof.clone()),
        })
    }

    /// Record the draw and settle the open epoch.
    ///
    /// Only once the entry window has ended. Claims for this epoch are
    /// proven against the store root at this moment.
    pub fn close_epoch(
        &self,
        config: &LottoConfig,
        now: Timestamp,
        winning: &LottoEntry,
    ) -> LottoResult<Transition<Settlement>> {
        let epoch_id = match self.phase() {
            EpochPhase::Open { epoch_id } => epoch_id,
            phase => {
                return Err(LottoError::EpochStateViolation(format!(
                    "no open epoch to close while {:?}",
                    phase
                )));
            }
        };

        if now < self.board.end_time {
            return Err(LottoError::EpochStateViolation(format!(
                "epoch {} window ends at {}, now {}",
                epoch_id, self.board.end_time, now
            )));
        }

        if winning.epoch_id != epoch_id {
            return Err(LottoError::MismatchedEpoch {
                expected: epoch_id,
                got: winning.epoch_id,
            });
        }

        config.number_range.check(&winning.numbers)?;

        let settlement = Settlement {
            epoch_id,
            winning: *winning,
            winning_commitment: winning.commitment(),
            store_root: self.store.root,
            store_sequence: self.store.sequence,
            settled_at: now,
            claimed: BTreeSet::new(),
        };

        let mut next = self.successor();
        next.board.is_settled = true;
        next.history.push(*winning);
        next.settlements.insert(epoch_id, settlement.clone());

        let event = LottoEvent::new(
            next.version,
            LottoEventData::EpochSettled {
                epoch_id,
                winning_commitment: settlement.winning_commitment,
                store_root: settlement.store_root,
            },
        );

        Ok(Transition { state: next, events: vec![event], output: settlement })
    }

    /// Prove a winning entry for a settled epoch.
    ///
    /// The claimant signs the entry like a submission and presents the
    /// slot's path against the root recorded at settlement.
    pub fn claim(
        &self,
        config: &LottoConfig,
        identity: &IdentityKey,
        signature: &SignatureBytes,
        proof: &MembershipProof,
        epoch_id: u64,
        entry: &LottoEntry,
    ) -> LottoResult<Transition<ClaimReceipt>> {
        let settlement = self.settlements.get(&epoch_id).ok_or_else(|| {
            LottoError::EpochStateViolation(format!("epoch {} is not settled", epoch_id))
        })?;

        if entry.epoch_id != epoch_id {
            return Err(LottoError::MismatchedEpoch {
                expected: epoch_id,
                got: entry.epoch_id,
            });
        }

        let entry_commitment = verify_signed_claim(identity, signature, entry)?;

        proof.check_depth(config.tree_depth)?;
        let leaf = StoreLeaf {
            owner: *identity,
            entry_commitment,
        };
        if !proof.verify(&settlement.store_root, &leaf.commitment()) {
            return Err(LottoError::InvalidProof(format!(
                "entry is not in the epoch {} store snapshot",
                epoch_id
            )));
        }

        let slot = proof.leaf_index;
        if settlement.claimed.contains(&slot) {
            return Err(LottoError::AlreadyClaimed { epoch_id, index: slot });
        }

        let matched = config
            .match_rule
            .evaluate(entry, &settlement.winning, &settlement.winning_commitment)?;

        let mut next = self.successor();
        if let Some(record) = next.settlements.get_mut(&epoch_id) {
            record.claimed.insert(slot);
        }

        let receipt = ClaimReceipt {
            epoch_id,
            owner: *identity,
            slot,
            matched,
        };
        let event = LottoEvent::new(
            next.version,
            LottoEventData::ClaimApproved {
                epoch_id,
                owner: *identity,
                slot,
                matched,
            },
        );

        Ok(Transition { state: next, events: vec![event], output: receipt })
    }

    /// Verify an operator batch against the stored root and advance it.
    ///
    /// The request must be built on the current root: a request built on
    /// an older sequence number is stale.
    pub fn apply_batch(
        &self,
        config: &LottoConfig,
        request: &RootUpdateRequest,
    ) -> LottoResult<Transition<AuthenticatedRoot>> {
        let current = &self.store;

        if request.old_sequence != current.sequence {
            return Err(LottoError::StaleSequence {
                current: current.sequence,
                claimed: request.new_sequence,
            });
        }
        if request.old_root != current.root {
            return Err(LottoError::InvalidProof(format!(
                "batch built on root {}, store root is {}",
                short_hex(&request.old_root),
                short_hex(&current.root)
            )));
        }

        for update in &request.updates {
            update.proof.check_depth(config.tree_depth)?;
        }

        let root = verify_and_apply_batch(
            &self.operator,
            current.sequence,
            &current.root,
            &request.updates,
            request.new_sequence,
            &request.new_root_signature,
        )?;

        let mut next = self.successor();
        next.store = AuthenticatedRoot {
            root,
            sequence: request.new_sequence,
            signature: request.new_root_signature,
        };
        for update in &request.updates {
            next.pending_slots.remove(&update.slot());
        }

        let event = LottoEvent::new(
            next.version,
            LottoEventData::RootAdvanced {
                sequence: request.new_sequence,
                root,
                updates: request.updates.len(),
            },
        );
        let store = next.store;

        Ok(Transition { state: next, events: vec![event], output: store })
    }

    // =========================================================================
    // PERSISTENCE
    // =========================================================================

    /// Serialize to binary.
    pub fn to_bytes(&self) -> LottoResult<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Deserialize from binary.
    pub fn from_bytes(data: &[u8]) -> LottoResult<Self> {
        Ok(bincode::deserialize(data)?)
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> LottoResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::SECONDS_PER_DAY;
    use crate::core::keys::SigningKeypair;
    use crate::game::board::MatchRule;
    use crate::proof::batch::sign_root_update;
    use crate::proof::entry::sign_entry;
    use crate::proof::merkle::StoreTree;

    const NUMS: [u32; 6] = [4, 8, 15, 16, 23, 42];
    const WINDOW: u64 = 6 * SECONDS_PER_DAY;

    struct Harness {
        config: LottoConfig,
        operator: SigningKeypair,
        tree: StoreTree,
        state: LottoState,
    }

    impl Harness {
        fn new() -> Self {
            let config = LottoConfig { tree_depth: 4, ..Default::default() };
            let operator = SigningKeypair::from_secret(&[1; 32]);
            let tree = StoreTree::new(config.tree_depth).unwrap();
            let state = LottoState::new(&config, operator.identity(), 0);
            Self { config, operator, tree, state }
        }

        fn open(&mut self, now: Timestamp) {
            self.state = self.state.open_epoch(&self.config, now).unwrap().state;
        }

        /// Submit, then have the operator store the entry in one batch.
        fn play(&mut self, player: &SigningKeypair, entry: LottoEntry, now: Timestamp) -> u64 {
            let slot = self.tree.first_empty_slot().unwrap();
            let witness = SlotWitness::empty(self.tree.proof(slot).unwrap());
            let sig = sign_entry(player, &entry);

            let t = self
                .state
                .submit(&self.config, now, &player.identity(), &sig, entry.epoch_id, &entry, &witness)
                .unwrap();
            self.state = t.state;

            self.tree.update(slot, t.output.new_leaf).unwrap();
            let request = self.request(vec![t.output]);
            self.state = self.state.apply_batch(&self.config, &request).unwrap().state;
            slot
        }

        fn request(&self, updates: Vec<LeafUpdate>) -> RootUpdateRequest {
            let new_sequence = self.state.store.sequence + 1;
            RootUpdateRequest {
                old_sequence: self.state.store.sequence,
                old_root: self.state.store.root,
                updates,
                new_sequence,
                new_root_signature: sign_root_update(&self.operator, &self.tree.root(), new_sequence),
            }
        }

        fn close(&mut self, now: Timestamp, numbers: [u32; 6]) {
            let epoch = self.state.board.epoch_id;
            self.state = self
                .state
                .close_epoch(&self.config, now, &LottoEntry::new(epoch, numbers))
                .unwrap()
                .state;
        }
    }

    fn player(n: u8) -> SigningKeypair {
        SigningKeypair::from_secret(&[n + 100; 32])
    }

    #[test]
    fn test_initial_state() {
        let h = Harness::new();
        assert_eq!(h.state.phase(), EpochPhase::Idle);
        assert_eq!(h.state.store.root, h.tree.root());
        assert_eq!(h.state.store.sequence, 0);
        assert!(h.state.winning_commitment().is_none());
    }

    #[test]
    fn test_open_from_idle_at_time_zero() {
        let h = Harness::new();
        let t = h.state.open_epoch(&h.config, 0).unwrap();

        assert_eq!(t.output, GameBoard { epoch_id: 1, start_time: 0, end_time: WINDOW, is_settled: false });
        assert_eq!(t.state.version, 1);
        assert_eq!(t.events.len(), 1);
        // Original untouched
        assert_eq!(h.state.phase(), EpochPhase::Idle);
    }

    #[test]
    fn test_cannot_open_twice() {
        let mut h = Harness::new();
        h.open(0);
        assert!(matches!(
            h.state.open_epoch(&h.config, 10 * SECONDS_PER_DAY),
            Err(LottoError::EpochStateViolation(_))
        ));
    }

    #[test]
    fn test_reopen_respects_gap() {
        let mut config = LottoConfig { tree_depth: 4, game_duration_secs: 100, ..Default::default() };
        config.min_epoch_gap_secs = 1000;
        let op = SigningKeypair::from_secret(&[1; 32]);
        let state = LottoState::new(&config, op.identity(), 0);

        let state = state.open_epoch(&config, 0).unwrap().state;
        let state = state.close_epoch(&config, 100, &LottoEntry::new(1, NUMS)).unwrap().state;

        assert!(matches!(state.open_epoch(&config, 999), Err(LottoError::EpochStateViolation(_))));
        let next = state.open_epoch(&config, 1000).unwrap();
        assert_eq!(next.output.epoch_id, 2);
    }

    #[test]
    fn test_submit_requires_open_epoch() {
        let h = Harness::new();
        let p = player(1);
        let entry = LottoEntry::new(1, NUMS);
        let witness = SlotWitness::empty(h.tree.proof(0).unwrap());

        let err = h
            .state
            .submit(&h.config, 5, &p.identity(), &sign_entry(&p, &entry), entry.epoch_id, &entry, &witness)
            .unwrap_err();
        assert!(matches!(err, LottoError::EpochStateViolation(_)));
    }

    #[test]
    fn test_submit_outside_window() {
        let mut h = Harness::new();
        h.open(0);
        let p = player(1);
        let entry = LottoEntry::new(1, NUMS);
        let witness = SlotWitness::empty(h.tree.proof(0).unwrap());

        let err = h
            .state
            .submit(&h.config, WINDOW, &p.identity(), &sign_entry(&p, &entry), entry.epoch_id, &entry, &witness)
            .unwrap_err();
        assert!(matches!(err, LottoError::EpochStateViolation(_)));
    }

    #[test]
    fn test_submit_wrong_epoch() {
        let mut h = Harness::new();
        h.open(0);
        let p = player(1);
        let entry = LottoEntry::new(2, NUMS);
        let witness = SlotWitness::empty(h.tree.proof(0).unwrap());

        let err = h
            .state
            .submit(&h.config, SECONDS_PER_DAY, &p.identity(), &sign_entry(&p, &entry), entry.epoch_id, &entry, &witness)
            .unwrap_err();
        assert_eq!(err, LottoError::MismatchedEpoch { expected: 1, got: 2 });

        // Requested epoch is checked against the open one first
        let entry = LottoEntry::new(1, NUMS);
        let err = h
            .state
            .submit(&h.config, SECONDS_PER_DAY, &p.identity(), &sign_entry(&p, &entry), 3, &entry, &witness)
            .unwrap_err();
        assert_eq!(err, LottoError::MismatchedEpoch { expected: 1, got: 3 });
    }

    #[test]
    fn test_submit_after_close() {
        let mut h = Harness::new();
        h.open(0);
        h.close(WINDOW, NUMS);

        let p = player(1);
        let entry = LottoEntry::new(1, NUMS);
        let witness = SlotWitness::empty(h.tree.proof(0).unwrap());
        let err = h
            .state
            .submit(&h.config, WINDOW + 1, &p.identity(), &sign_entry(&p, &entry), 1, &entry, &witness)
            .unwrap_err();
        assert!(matches!(err, LottoError::EpochStateViolation(_)));
    }

    #[test]
    fn test_submit_out_of_range() {
        let mut h = Harness::new();
        h.open(0);
        let p = player(1);
        let entry = LottoEntry::new(1, [1, 2, 3, 4, 5, 99]);
        let witness = SlotWitness::empty(h.tree.proof(0).unwrap());

        let err = h
            .state
            .submit(&h.config, 1, &p.identity(), &sign_entry(&p, &entry), entry.epoch_id, &entry, &witness)
            .unwrap_err();
        assert!(matches!(err, LottoError::NumberOutOfRange { value: 99, .. }));
    }

    #[test]
    fn test_submit_bad_signature() {
        let mut h = Harness::new();
        h.open(0);
        let p = player(1);
        let entry = LottoEntry::new(1, NUMS);
        let witness = SlotWitness::empty(h.tree.proof(0).unwrap());
        let sig = sign_entry(&player(2), &entry);

        let err = h.state.submit(&h.config, 1, &p.identity(), &sig, entry.epoch_id, &entry, &witness).unwrap_err();
        assert!(matches!(err, LottoError::SignatureInvalid(_)));
    }

    #[test]
    fn test_submit_into_occupied_slot() {
        let mut h = Harness::new();
        h.open(0);
        let first = player(1);
        let slot = h.play(&first, LottoEntry::new(1, NUMS), 1);

        let second = player(2);
        let entry = LottoEntry::new(1, [1, 2, 3, 4, 5, 6]);
        let witness = SlotWitness {
            occupant: h.tree.get(slot).copied(),
            proof: h.tree.proof(slot).unwrap(),
        };

        let err = h
            .state
            .submit(&h.config, 2, &second.identity(), &sign_entry(&second, &entry), entry.epoch_id, &entry, &witness)
            .unwrap_err();
        assert_eq!(err, LottoError::SlotOccupied { index: slot });

        // Pretending the slot is empty does not help
        let lying = SlotWitness::empty(h.tree.proof(slot).unwrap());
        let err = h
            .state
            .submit(&h.config, 2, &second.identity(), &sign_entry(&second, &entry), entry.epoch_id, &entry, &lying)
            .unwrap_err();
        assert!(matches!(err, LottoError::InvalidProof(_)));
    }

    #[test]
    fn test_slot_reserved_until_batched() {
        let mut h = Harness::new();
        h.open(0);
        let first = player(1);
        let second = player(2);
        let entry = LottoEntry::new(1, NUMS);

        let witness = SlotWitness::empty(h.tree.proof(0).unwrap());
        let t = h
            .state
            .submit(&h.config, 1, &first.identity(), &sign_entry(&first, &entry), 1, &entry, &witness)
            .unwrap();
        h.state = t.state;
        assert!(h.state.pending_slots.contains(&0));

        // Same empty slot, same root, before the operator's batch
        let err = h
            .state
            .submit(&h.config, 2, &second.identity(), &sign_entry(&second, &entry), 1, &entry, &witness)
            .unwrap_err();
        assert_eq!(err, LottoError::SlotOccupied { index: 0 });
        assert_eq!(h.state.entries_this_epoch, 1);

        // The batch writes the slot and releases the reservation
        h.tree.update(0, t.output.new_leaf).unwrap();
        let request = h.request(vec![t.output]);
        h.state = h.state.apply_batch(&h.config, &request).unwrap().state;
        assert!(h.state.pending_slots.is_empty());

        let witness = SlotWitness::empty(h.tree.proof(1).unwrap());
        assert!(h
            .state
            .submit(&h.config, 3, &second.identity(), &sign_entry(&second, &entry), 1, &entry, &witness)
            .is_ok());
    }

    #[test]
    fn test_submit_counts_entries() {
        let mut h = Harness::new();
        h.open(0);
        h.play(&player(1), LottoEntry::new(1, NUMS), 1);
        h.play(&player(2), LottoEntry::new(1, NUMS), 2);
        assert_eq!(h.state.entries_this_epoch, 2);
        assert_eq!(h.tree.len(), 2);
        assert_eq!(h.state.store.root, h.tree.root());
    }

    #[test]
    fn test_close_before_window_end() {
        let mut h = Harness::new();
        h.open(0);
        let err = h
            .state
            .close_epoch(&h.config, 2 * SECONDS_PER_DAY, &LottoEntry::new(1, NUMS))
            .unwrap_err();
        assert!(matches!(err, LottoError::EpochStateViolation(_)));
    }

    #[test]
    fn test_close_records_settlement() {
        let mut h = Harness::new();
        h.open(0);
        h.play(&player(1), LottoEntry::new(1, NUMS), 1);

        let t = h.state.close_epoch(&h.config, WINDOW + 1, &LottoEntry::new(1, NUMS)).unwrap();
        assert_eq!(t.output.store_root, h.tree.root());
        assert_eq!(t.state.history.len(), 1);
        assert_eq!(t.state.history.latest(), t.state.history.for_epoch(1));
        assert_eq!(t.state.phase(), EpochPhase::Settled { epoch_id: 1 });
        assert_eq!(t.state.winning_commitment(), Some(LottoEntry::new(1, NUMS).commitment()));
    }

    #[test]
    fn test_close_wrong_epoch_and_twice() {
        let mut h = Harness::new();
        h.open(0);
        let err = h.state.close_epoch(&h.config, WINDOW, &LottoEntry::new(3, NUMS)).unwrap_err();
        assert_eq!(err, LottoError::MismatchedEpoch { expected: 1, got: 3 });

        h.close(WINDOW, NUMS);
        assert!(matches!(
            h.state.close_epoch(&h.config, WINDOW + 5, &LottoEntry::new(1, NUMS)),
            Err(LottoError::EpochStateViolation(_))
        ));
    }

    #[test]
    fn test_winning_claim() {
        let mut h = Harness::new();
        h.open(0);
        let winner = player(1);
        let entry = LottoEntry::new(1, NUMS);
        let slot = h.play(&winner, entry, 1);
        h.play(&player(2), LottoEntry::new(1, [1, 2, 3, 4, 5, 6]), 2);
        h.close(WINDOW, NUMS);

        let proof = h.tree.proof(slot).unwrap();
        let sig = sign_entry(&winner, &entry);
        let t = h.state.claim(&h.config, &winner.identity(), &sig, &proof, 1, &entry).unwrap();

        assert_eq!(t.output, ClaimReceipt { epoch_id: 1, owner: winner.identity(), slot, matched: 6 });
        assert!(t.events[0].is_payout());

        // Second payout for the same slot is refused
        let err = t.state.claim(&h.config, &winner.identity(), &sig, &proof, 1, &entry).unwrap_err();
        assert_eq!(err, LottoError::AlreadyClaimed { epoch_id: 1, index: slot });
    }

    #[test]
    fn test_claim_entry_from_other_epoch() {
        let mut h = Harness::new();
        h.open(0);
        let p = player(1);
        let slot = h.play(&p, LottoEntry::new(1, NUMS), 1);
        h.close(WINDOW, NUMS);

        let other = LottoEntry::new(2, NUMS);
        let err = h
            .state
            .claim(&h.config, &p.identity(), &sign_entry(&p, &other), &h.tree.proof(slot).unwrap(), 1, &other)
            .unwrap_err();
        assert_eq!(err, LottoError::MismatchedEpoch { expected: 1, got: 2 });
    }

    #[test]
    fn test_losing_claim() {
        let mut h = Harness::new();
        h.open(0);
        let p = player(1);
        let entry = LottoEntry::new(1, [1, 2, 3, 4, 5, 6]);
        let slot = h.play(&p, entry, 1);
        h.close(WINDOW, NUMS);

        let err = h
            .state
            .claim(&h.config, &p.identity(), &sign_entry(&p, &entry), &h.tree.proof(slot).unwrap(), 1, &entry)
            .unwrap_err();
        assert!(matches!(err, LottoError::NotAWinner { .. }));
    }

    #[test]
    fn test_partial_match_claim() {
        let mut h = Harness::new();
        h.config.match_rule = MatchRule::AtLeast(3);
        h.open(0);
        let p = player(1);
        let entry = LottoEntry::new(1, [4, 8, 15, 1, 2, 3]);
        let slot = h.play(&p, entry, 1);
        h.close(WINDOW, NUMS);

        let t = h
            .state
            .claim(&h.config, &p.identity(), &sign_entry(&p, &entry), &h.tree.proof(slot).unwrap(), 1, &entry)
            .unwrap();
        assert_eq!(t.output.matched, 3);
    }

    #[test]
    fn test_claim_before_settlement() {
        let mut h = Harness::new();
        h.open(0);
        let p = player(1);
        let entry = LottoEntry::new(1, NUMS);
        let slot = h.play(&p, entry, 1);

        let err = h
            .state
            .claim(&h.config, &p.identity(), &sign_entry(&p, &entry), &h.tree.proof(slot).unwrap(), 1, &entry)
            .unwrap_err();
        assert!(matches!(err, LottoError::EpochStateViolation(_)));
    }

    #[test]
    fn test_claim_for_entry_not_batched_before_close() {
        let mut h = Harness::new();
        h.open(0);
        let p = player(1);
        let entry = LottoEntry::new(1, NUMS);

        // Accepted but never stored by the operator
        let witness = SlotWitness::empty(h.tree.proof(0).unwrap());
        let t = h
            .state
            .submit(&h.config, 1, &p.identity(), &sign_entry(&p, &entry), entry.epoch_id, &entry, &witness)
            .unwrap();
        h.state = t.state;
        h.tree.update(0, t.output.new_leaf).unwrap();
        h.close(WINDOW, NUMS);

        let err = h
            .state
            .claim(&h.config, &p.identity(), &sign_entry(&p, &entry), &h.tree.proof(0).unwrap(), 1, &entry)
            .unwrap_err();
        assert!(matches!(err, LottoError::InvalidProof(_)));
    }

    #[test]
    fn test_stale_batch_rejected() {
        let mut h = Harness::new();
        h.open(0);
        let slot = h.tree.first_empty_slot().unwrap();
        let update = h.tree.update(slot, Some(StoreLeaf { owner: player(1).identity(), entry_commitment: [3; 32] })).unwrap();
        let request = h.request(vec![update]);

        h.state = h.state.apply_batch(&h.config, &request).unwrap().state;
        assert_eq!(h.state.store.sequence, 1);

        assert_eq!(
            h.state.apply_batch(&h.config, &request).unwrap_err(),
            LottoError::StaleSequence { current: 1, claimed: 1 }
        );
    }

    #[test]
    fn test_batch_with_wrong_depth_rejected() {
        let mut h = Harness::new();
        let mut request = h.request(vec![]);
        request.updates.push(LeafUpdate::insert(
            StoreLeaf { owner: player(1).identity(), entry_commitment: [3; 32] },
            MembershipProof::new(0, vec![[0; 32]; 3]),
        ));
        assert!(matches!(h.state.apply_batch(&h.config, &request), Err(LottoError::InvalidProof(_))));

        // An empty batch just restamps the root
        h.state = h.state.apply_batch(&h.config, &h.request(vec![])).unwrap().state;
        assert_eq!(h.state.store.root, h.tree.root());
        assert_eq!(h.state.store.sequence, 1);
    }

    #[test]
    fn test_persistence_roundtrip() {
        let mut h = Harness::new();
        h.open(0);
        h.play(&player(1), LottoEntry::new(1, NUMS), 1);
        h.close(WINDOW, NUMS);

        let bytes = h.state.to_bytes().unwrap();
        assert_eq!(LottoState::from_bytes(&bytes).unwrap(), h.state);
        assert!(h.state.to_json().unwrap().contains("settlements"));
        assert!(matches!(LottoState::from_bytes(&[1, 2, 3]), Err(LottoError::Encoding(_))));
    }
}
