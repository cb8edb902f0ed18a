//! Shaker Privacy SDK
//!
//! Client-side primitives for the Shaker deposit pool: secret deposit material,
//! the note string that carries it, and the commitment tree used to prove
//! membership at withdrawal time.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                            Deposit                               │
//! │   nullifier (31B) ──┬──────────────► nullifier_hash = H(n)       │
//! │   secret    (31B) ──┴─ preimage ───► commitment     = H(n ‖ s)   │
//! └──────────────────────────────────────────────────────────────────┘
//!          │                                      │
//!          ▼                                      ▼
//!   shaker-eth-0.1-1-0x<preimage>        leaf in the commitment tree
//!        (Note string)                 (rebuilt from Deposit events)
//! ```

pub mod commitment;
pub mod merkle;
pub mod note;
pub mod units;

pub use commitment::{
    Commitment, CommitmentScheme, Deposit, NullifierHash, PREIMAGE_BYTES, SCALAR_BYTES,
    random_scalar,
};
pub use merkle::{
    DEFAULT_TREE_HEIGHT, LeafEntry, MAX_TREE_HEIGHT, MerkleError, MerkleHasher, MerklePath,
    MerkleTree,
};
pub use note::{NOTE_PREFIX, Note, NoteError};
pub use units::{UnitError, from_decimals, to_decimals};
