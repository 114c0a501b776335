//! Verification Core
//!
//! Everything needed to check what the operator and the players hand in:
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    VERIFICATION CORE                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  merkle.rs   - Membership proofs and the off-chain store    │
//! │  batch.rs    - Signed root updates, batch replay            │
//! │  entry.rs    - Entry and claim signatures                   │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod merkle;
pub mod batch;
pub mod entry;

// Re-export key types
pub use merkle::{MembershipProof, StoreTree, DEFAULT_TREE_DEPTH};
pub use batch::{
    verify_and_apply_batch, sign_root_update,
    AuthenticatedRoot, LeafUpdate, StoreLeaf,
};
pub use entry::{sign_entry, verify_signed_claim, verify_signed_entry};
