//! Game Logic Module
//!
//! Lottery rules and the epoch lifecycle. Pure: every transition takes
//! the current state and the current time and returns a new state.
//!
//! ## Module Structure
//!
//! - `board`: Entries, number rules, the game board, win history
//! - `epoch`: `LottoState` and its transitions
//! - `events`: Events emitted by transitions

pub mod board;
pub mod epoch;
pub mod events;

// Re-export key types
pub use board::{EpochPhase, GameBoard, LottoEntry, LottoNumbers, MatchRule, NumberRange, WinHistory};
pub use epoch::{ClaimReceipt, LottoState, RootUpdateRequest, Settlement, SlotWitness, Transition};
pub use events::{LottoEvent, LottoEventData};
