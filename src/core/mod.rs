//! Core primitives.
//!
//! Hashing, identities and time. Everything above this module is built
//! from these three pieces.

pub mod hash;
pub mod keys;
pub mod clock;

// Re-export core types
pub use hash::{Commit, Hash, EMPTY_LEAF};
pub use keys::{IdentityKey, SignatureBytes, SigningKeypair};
pub use clock::{Clock, ManualClock, SystemClock, Timestamp};
