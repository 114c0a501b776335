//! Lottery Service
//!
//! Shares one `LottoState` between concurrent callers. Transitions run
//! under a single lock, so two operators racing to advance the root are
//! serialized and the loser sees a stale sequence number. Committed
//! events are broadcast to subscribers (the payout collaborator listens
//! for `ClaimApproved`).

use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, instrument, warn};

use crate::config::{ConfigError, LottoConfig};
use crate::core::clock::{Clock, Timestamp};
use crate::core::hash::short_hex;
use crate::core::keys::{IdentityKey, SignatureBytes};
use crate::error::LottoResult;
use crate::game::board::{GameBoard, LottoEntry};
use crate::game::epoch::{ClaimReceipt, LottoState, RootUpdateRequest, Settlement, SlotWitness, Transition};
use crate::game::events::LottoEvent;
use crate::proof::batch::{AuthenticatedRoot, LeafUpdate};
use crate::proof::merkle::MembershipProof;

/// Event channel capacity.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Thread-safe front for the lottery state.
pub struct LottoService<C: Clock> {
    /// Lottery rules.
    config: LottoConfig,
    /// Time source.
    clock: Arc<C>,
    /// Current state.
    state: Mutex<LottoState>,
    /// Event broadcast channel.
    event_tx: broadcast::Sender<LottoEvent>,
}

impl<C: Clock> LottoService<C> {
    /// Start a lottery with no epoch and an empty store.
    pub fn new(config: LottoConfig, operator: IdentityKey, clock: Arc<C>) -> Result<Self, ConfigError> {
        config.validate()?;
        let state = LottoState::new(&config, operator, clock.now());
        Ok(Self::with_state(config, clock, state))
    }

    /// Resume from a previously committed state.
    pub fn with_state(config: LottoConfig, clock: Arc<C>, state: LottoState) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            config,
            clock,
            state: Mutex::new(state),
            event_tx,
        }
    }

    /// Lottery rules.
    pub fn config(&self) -> &LottoConfig {
        &self.config
    }

    /// Subscribe to committed events.
    pub fn subscribe_events(&self) -> broadcast::Receiver<LottoEvent> {
        self.event_tx.subscribe()
    }

    /// Copy of the current state.
    pub async fn snapshot(&self) -> LottoState {
        self.state.lock().await.clone()
    }

    /// Run a transition against the current state and commit it on success.
    async fn commit<T, F>(&self, f: F) -> LottoResult<T>
    where
        F: FnOnce(&LottoState, &LottoConfig, Timestamp) -> LottoResult<Transition<T>>,
    {
        let mut state = self.state.lock().await;
        let now = self.clock.now();

        let transition = match f(&*state, &self.config, now) {
            Ok(t) => t,
            Err(e) => {
                warn!(version = state.version, error = %e, "transition rejected");
                return Err(e);
            }
        };

        *state = transition.state;
        drop(state);

        for event in transition.events {
            // No subscribers is fine
            let _ = self.event_tx.send(event);
        }

        Ok(transition.output)
    }

    /// Start the next epoch now.
    #[instrument(skip(self))]
    pub async fn open_epoch(&self) -> LottoResult<GameBoard> {
        let board = self
            .commit(|state, config, now| state.open_epoch(config, now))
            .await?;
        info!(
            epoch = board.epoch_id,
            start = board.start_time,
            end = board.end_time,
            "Epoch opened"
        );
        Ok(board)
    }

    /// Accept a signed entry. The returned item belongs in the operator's
    /// next batch.
    #[instrument(skip_all, fields(player = %identity.short(), epoch = epoch_id))]
    pub async fn submit(
        &self,
        identity: IdentityKey,
        signature: SignatureBytes,
        epoch_id: u64,
        entry: LottoEntry,
        slot: SlotWitness,
    ) -> LottoResult<LeafUpdate> {
        let update = self
            .commit(|state, config, now| {
                state.submit(config, now, &identity, &signature, epoch_id, &entry, &slot)
            })
            .await?;
        debug!(slot = update.slot(), "Entry accepted");
        Ok(update)
    }

    /// Record the draw for the open epoch.
    #[instrument(skip_all, fields(epoch = winning.epoch_id))]
    pub async fn close_epoch(&self, winning: LottoEntry) -> LottoResult<Settlement> {
        let settlement = self
            .commit(|state, config, now| state.close_epoch(config, now, &winning))
            .await?;
        info!(
            winning = %short_hex(&settlement.winning_commitment),
            store_root = %short_hex(&settlement.store_root),
            "Epoch settled"
        );
        Ok(settlement)
    }

    /// Verify a claim on a settled epoch.
    #[instrument(skip_all, fields(player = %identity.short(), epoch = epoch_id))]
    pub async fn claim(
        &self,
        identity: IdentityKey,
        signature: SignatureBytes,
        proof: MembershipProof,
        epoch_id: u64,
        entry: LottoEntry,
    ) -> LottoResult<ClaimReceipt> {
        let receipt = self
            .commit(|state, config, _| {
                state.claim(config, &identity, &signature, &proof, epoch_id, &entry)
            })
            .await?;
        info!(slot = receipt.slot, matched = receipt.matched, "Claim approved");
        Ok(receipt)
    }

    /// Verify an operator batch and advance the store root.
    #[instrument(skip_all, fields(old_seq = request.old_sequence, new_seq = request.new_sequence))]
    pub async fn apply_batch(&self, request: RootUpdateRequest) -> LottoResult<AuthenticatedRoot> {
        let root = self
            .commit(|state, config, _| state.apply_batch(config, &request))
            .await?;
        info!(
            sequence = root.sequence,
            root = %short_hex(&root.root),
            updates = request.updates.len(),
            "Store root advanced"
        );
        Ok(root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::ManualClock;
    use crate::core::keys::SigningKeypair;
    use crate::error::LottoError;
    use crate::game::events::LottoEventData;
    use crate::proof::batch::{sign_root_update, StoreLeaf};
    use crate::proof::entry::sign_entry;
    use crate::proof::merkle::StoreTree;

    const NUMS: [u32; 6] = [5, 10, 15, 20, 25, 30];

    fn setup() -> (LottoService<ManualClock>, SigningKeypair, Arc<ManualClock>) {
        let config = LottoConfig { tree_depth: 4, ..Default::default() };
        let operator = SigningKeypair::from_secret(&[9; 32]);
        let clock = Arc::new(ManualClock::new(0));
        let service = LottoService::new(config, operator.identity(), clock.clone()).unwrap();
        (service, operator, clock)
    }

    fn request(
        operator: &SigningKeypair,
        old: &AuthenticatedRoot,
        updates: Vec<LeafUpdate>,
        new_root: &[u8; 32],
        new_sequence: u64,
    ) -> RootUpdateRequest {
        RootUpdateRequest {
            old_sequence: old.sequence,
            old_root: old.root,
            updates,
            new_sequence,
            new_root_signature: sign_root_update(operator, new_root, new_sequence),
        }
    }

    #[tokio::test]
    async fn test_rejects_invalid_config() {
        let config = LottoConfig { tree_depth: 0, ..Default::default() };
        let clock = Arc::new(ManualClock::new(0));
        assert!(LottoService::new(config, IdentityKey::new([0; 32]), clock).is_err());
    }

    #[tokio::test]
    async fn test_full_epoch_with_events() {
        let (service, operator, clock) = setup();
        let mut events = service.subscribe_events();
        let mut tree = StoreTree::new(4).unwrap();

        let board = service.open_epoch().await.unwrap();
        assert_eq!(board.epoch_id, 1);

        let player = SigningKeypair::from_secret(&[3; 32]);
        let entry = LottoEntry::new(1, NUMS);
        clock.advance(60);
        let update = service
            .submit(
                player.identity(),
                sign_entry(&player, &entry),
                1,
                entry,
                SlotWitness::empty(tree.proof(0).unwrap()),
            )
            .await
            .unwrap();

        tree.update(update.slot(), update.new_leaf).unwrap();
        let store = service.snapshot().await.store;
        service
            .apply_batch(request(&operator, &store, vec![update], &tree.root(), 1))
            .await
            .unwrap();

        clock.set(board.end_time);
        service.close_epoch(LottoEntry::new(1, NUMS)).await.unwrap();

        let receipt = service
            .claim(player.identity(), sign_entry(&player, &entry), tree.proof(0).unwrap(), 1, entry)
            .await
            .unwrap();
        assert_eq!(receipt.owner, player.identity());

        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        assert_eq!(seen.len(), 5);
        assert!(matches!(seen[0].data, LottoEventData::EpochOpened { epoch_id: 1, .. }));
        assert!(seen[4].is_payout());
        // Versions follow commit order
        assert!(seen.windows(2).all(|w| w[0].version < w[1].version));
    }

    #[tokio::test]
    async fn test_failed_transition_changes_nothing() {
        let (service, _, _) = setup();
        let before = service.snapshot().await;
        let mut events = service.subscribe_events();

        let err = service.close_epoch(LottoEntry::new(1, NUMS)).await.unwrap_err();
        assert!(matches!(err, LottoError::EpochStateViolation(_)));
        assert_eq!(service.snapshot().await, before);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_racing_batches_one_wins() {
        let (service, operator, _) = setup();
        let service = Arc::new(service);

        // Advance the store to sequence 4 with empty batches
        let tree = StoreTree::new(4).unwrap();
        for seq in 1..=4 {
            let store = service.snapshot().await.store;
            service
                .apply_batch(request(&operator, &store, vec![], &tree.root(), seq))
                .await
                .unwrap();
        }
        let base = service.snapshot().await.store;
        assert_eq!(base.sequence, 4);

        // Two operators build different batches on the same root
        let make = |slot: u64, n: u8| {
            let mut tree = tree.clone();
            let leaf = StoreLeaf { owner: IdentityKey::new([n; 32]), entry_commitment: [n; 32] };
            let update = tree.update(slot, Some(leaf)).unwrap();
            request(&operator, &base, vec![update], &tree.root(), 5)
        };
        let first = make(0, 1);
        let second = make(1, 2);

        let a = tokio::spawn({
            let service = service.clone();
            async move { service.apply_batch(first).await }
        });
        let b = tokio::spawn({
            let service = service.clone();
            async move { service.apply_batch(second).await }
        });
        let results = [a.await.unwrap(), b.await.unwrap()];

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .any(|r| *r == Err(LottoError::StaleSequence { current: 5, claimed: 5 })));
        assert_eq!(service.snapshot().await.store.sequence, 5);
    }
}
