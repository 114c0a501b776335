//! # ZK Lotto
//!
//! Verification core for a commitment-based weekly lottery. The entry
//! store lives off-chain with an operator; this crate only ever holds its
//! signed Merkle root and checks every proof handed in against it.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        ZK LOTTO                              │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Primitives                                │
//! │  ├── hash.rs     - Domain-separated SHA-256 commitments      │
//! │  ├── keys.rs     - Ed25519 identities and signatures         │
//! │  └── clock.rs    - Injectable time source                    │
//! │                                                              │
//! │  proof/          - Verification core                         │
//! │  ├── merkle.rs   - Membership proofs, off-chain store tree   │
//! │  ├── batch.rs    - Signed batch root updates                 │
//! │  └── entry.rs    - Entry and claim signatures                │
//! │                                                              │
//! │  game/           - Lottery rules                             │
//! │  ├── board.rs    - Entries, board, match rules, history      │
//! │  ├── epoch.rs    - Epoch state machine                       │
//! │  └── events.rs   - Transition events                         │
//! │                                                              │
//! │  service.rs      - Serialized async front, event broadcast   │
//! │  config.rs       - Game timing and rules                     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Determinism
//!
//! `core/`, `proof/` and `game/` never read the clock or any other
//! ambient input: time is passed in, maps are `BTreeMap`, and every
//! transition returns a new state instead of mutating in place. Replaying
//! the same calls yields the same roots and the same events.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod config;
pub mod core;
pub mod error;
pub mod game;
pub mod proof;
pub mod service;

// Re-export commonly used types
pub use crate::config::{ConfigError, LottoConfig};
pub use crate::core::hash::{Commit, Hash, EMPTY_LEAF};
pub use crate::core::keys::{IdentityKey, SignatureBytes, SigningKeypair};
pub use crate::error::{LottoError, LottoResult};
pub use crate::game::board::{LottoEntry, MatchRule};
pub use crate::game::epoch::LottoState;
pub use crate::proof::batch::verify_and_apply_batch;
pub use crate::proof::entry::verify_signed_entry;
pub use crate::proof::merkle::MembershipProof;
pub use crate::service::LottoService;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
