//! Content hashing for checkpoints and dumps
//!
//! BLAKE3 digests over artifact bytes. Each artifact is length-prefixed before it
//! is fed to the hasher so that moving bytes between artifacts changes the hash.

use serde::{Deserialize, Serialize};

/// Hash size in bytes (BLAKE3 output)
pub const HASH_SIZE: usize = 32;

/// Content-derived digest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash([u8; HASH_SIZE]);

impl ContentHash {
    /// Raw digest bytes
    pub fn as_bytes(&self) -> &[u8; HASH_SIZE] {
        &self.0
    }

    /// Lowercase hex encoding
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex
    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s).ok()?;
        let array: [u8; HASH_SIZE] = bytes.try_into().ok()?;
        Some(Self(array))
    }

    /// Short 64-bit form used by the binary dump
    #[inline]
    pub fn code_hash(&self) -> u64 {
        let mut head = [0u8; 8];
        head.copy_from_slice(&self.0[..8]);
        u64::from_le_bytes(head)
    }
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Incremental hasher over a sequence of named artifacts
pub struct ContentHasher {
    inner: blake3::Hasher,
}

impl ContentHasher {
    pub fn new() -> Self {
        Self {
            inner: blake3::Hasher::new(),
        }
    }

    /// Feed one artifact
    pub fn update_artifact(&mut self, name: &str, data: &[u8]) -> &mut Self {
        self.inner.update(&(name.len() as u64).to_le_bytes());
        self.inner.update(name.as_bytes());
        self.inner.update(&(data.len() as u64).to_le_bytes());
        self.inner.update(data);
        self
    }

    /// Finish hashing
    pub fn finalize(&self) -> ContentHash {
        ContentHash(*self.inner.finalize().as_bytes())
    }
}

impl Default for ContentHasher {
    fn default() -> Self {
        Self::new()
    }
}

/// Hash a single byte slice
#[inline]
pub fn hash_bytes(data: &[u8]) -> ContentHash {
    ContentHash(*blake3::hash(data).as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_bytes() {
        let hash = hash_bytes(b"field snapshot");
        assert_eq!(hash, hash_bytes(b"field snapshot"));
        assert_ne!(hash, hash_bytes(b"other snapshot"));
    }

    #[test]
    fn test_artifact_boundaries_matter() {
        let mut a = ContentHasher::new();
        a.update_artifact("x", b"ab").update_artifact("y", b"c");

        let mut b = ContentHasher::new();
        b.update_artifact("x", b"a").update_artifact("y", b"bc");

        assert_ne!(a.finalize(), b.finalize());
    }

    #[test]
    fn test_hex_roundtrip() {
        let hash = hash_bytes(b"data");
        let hex = hash.to_hex();
        assert_eq!(hex.len(), HASH_SIZE * 2);
        assert_eq!(ContentHash::from_hex(&hex), Some(hash));
        assert_eq!(ContentHash::from_hex("zz"), None);
    }

    #[test]
    fn test_code_hash_is_prefix() {
        let hash = hash_bytes(b"data");
        let expected = u64::from_le_bytes(hash.as_bytes()[..8].try_into().unwrap());
        assert_eq!(hash.code_hash(), expected);
    }
}
