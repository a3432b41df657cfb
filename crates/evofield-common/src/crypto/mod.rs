//! Content hashing
//!
//! - [`hash`]: BLAKE3 digests for checkpoints and dumps

pub mod hash;

pub use hash::{hash_bytes, ContentHash, ContentHasher, HASH_SIZE};
