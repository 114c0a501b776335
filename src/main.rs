//! ZK Lotto Demo
//!
//! Runs one scripted epoch through the verification core on a manual
//! clock: open, enter, batch, settle, claim.

use std::sync::Arc;
use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use zklotto::{
    core::{clock::format_timestamp, hash::short_hex, Clock, ManualClock},
    game::{LottoEntry, RootUpdateRequest, SlotWitness},
    proof::{sign_entry, sign_root_update, StoreTree},
    LottoConfig, LottoService, SigningKeypair, VERSION,
};

/// Demo epoch start: 2024-01-01T00:00:00Z.
const DEMO_START: u64 = 1_704_067_200;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    let config = LottoConfig::from_env().context("invalid LOTTO_* configuration")?;

    info!("ZK Lotto v{}", VERSION);
    info!(
        "Entry window: {}s, epoch gap: {}s, store depth: {}",
        config.game_duration_secs, config.min_epoch_gap_secs, config.tree_depth
    );

    demo_epoch(config).await
}

/// Script one full epoch.
async fn demo_epoch(config: LottoConfig) -> Result<()> {
    info!("=== Starting Demo Epoch ===");

    let operator = SigningKeypair::from_secret(&[0x0f; 32]);
    let clock = Arc::new(ManualClock::new(DEMO_START));
    let service = LottoService::new(config.clone(), operator.identity(), clock.clone())?;
    let mut store = StoreTree::new(config.tree_depth)?;

    info!("Operator: {}", operator.identity().short());
    info!("Genesis root: {}", hex::encode(store.root()));

    let board = service.open_epoch().await?;
    info!(
        "Epoch {} open from {} to {}",
        board.epoch_id,
        format_timestamp(board.start_time),
        format_timestamp(board.end_time)
    );

    // Players enter
    let picks: [[u32; 6]; 4] = [
        [7, 14, 21, 28, 35, 42],
        [1, 2, 3, 4, 5, 6],
        [7, 14, 21, 1, 2, 3],
        [10, 20, 30, 40, 41, 49],
    ];
    let players: Vec<SigningKeypair> = (0..picks.len() as u8)
        .map(|i| SigningKeypair::from_secret(&[0xa0 + i; 32]))
        .collect();

    let mut pending = Vec::new();
    for (player, numbers) in players.iter().zip(picks) {
        clock.advance(3600);
        let entry = LottoEntry::new(board.epoch_id, numbers);
        let slot = store
            .first_empty_slot()
            .context("entry store is full")?;
        let witness = SlotWitness::empty(
            store.proof(slot).context("slot outside store")?,
        );

        let update = service
            .submit(player.identity(), sign_entry(player, &entry), board.epoch_id, entry, witness)
            .await?;
        store.update(update.slot(), update.new_leaf)?;
        info!("Player {} entered {:?} in slot {}", player.identity().short(), numbers, update.slot());
        pending.push(update);
    }

    // Operator publishes the batch
    let current = service.snapshot().await.store;
    let new_sequence = current.sequence + 1;
    let request = RootUpdateRequest {
        old_sequence: current.sequence,
        old_root: current.root,
        updates: pending,
        new_sequence,
        new_root_signature: sign_root_update(&operator, &store.root(), new_sequence),
    };
    let root = service.apply_batch(request).await?;
    info!("Store root {} at sequence {}", hex::encode(root.root), root.sequence);

    // Draw
    clock.set(board.end_time);
    let winning = LottoEntry::new(board.epoch_id, picks[0]);
    let settlement = service.close_epoch(winning).await?;
    info!(
        "Epoch {} settled at {}: winning {}",
        settlement.epoch_id,
        format_timestamp(clock.now()),
        short_hex(&settlement.winning_commitment)
    );

    // Everyone tries to claim
    info!("=== Claims ===");
    for (player, numbers) in players.iter().zip(picks) {
        let entry = LottoEntry::new(board.epoch_id, numbers);
        let slot = store
            .find(&zklotto::proof::StoreLeaf::new(player.identity(), &entry))
            .context("entry missing from store")?;
        let proof = store.proof(slot).context("slot outside store")?;

        match service
            .claim(player.identity(), sign_entry(player, &entry), proof, board.epoch_id, entry)
            .await
        {
            Ok(receipt) => info!(
                "PAYOUT: player {} slot {} matched {}",
                receipt.owner.short(),
                receipt.slot,
                receipt.matched
            ),
            Err(e) => warn!("Player {} claim refused: {}", player.identity().short(), e),
        }
    }

    let final_state = service.snapshot().await;
    info!("Final state version: {}", final_state.version);
    info!("State size: {} bytes", final_state.to_bytes()?.len());

    Ok(())
}
