//! Checkpoint storage
//!
//! Checkpoints are immutable, fitness-tagged snapshots of the field plus the
//! persisted artifacts. Each store assigns a monotonically increasing index and
//! applies a retention policy: the last `keep_last` checkpoints survive, and so
//! does the best-ever one.
//!
//! - [`MemoryCheckpointStore`]: process-local, used in tests and dry runs
//! - [`FsCheckpointStore`]: one directory per checkpoint

mod fs;
mod memory;

pub use self::fs::FsCheckpointStore;
pub use self::memory::MemoryCheckpointStore;

use std::path::{Path, PathBuf};

use evofield_common::{ContentHash, ContentHasher, EvofieldError};
use evofield_lattice::FieldSnapshot;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Checkpoint errors
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("Checkpoint not found: {0}")]
    NotFound(u64),

    #[error("No checkpoints recorded")]
    Empty,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt checkpoint {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("Snapshot holds a non-finite {component} value at index {index}")]
    NonFinite { component: &'static str, index: usize },
}

impl From<CheckpointError> for EvofieldError {
    fn from(err: CheckpointError) -> Self {
        EvofieldError::Checkpoint(err.to_string())
    }
}

/// Checkpoint metadata record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Store-assigned, monotonically increasing
    pub index: u64,
    /// Directory or key name
    pub name: String,
    /// Creation time, seconds since the Unix epoch
    pub timestamp: i64,
    /// Aggregate fitness when taken
    pub fitness: f64,
    /// Evaluations completed when taken
    pub step_count: u64,
    /// BLAKE3 content hash, hex encoded
    pub hash: String,
}

impl Checkpoint {
    /// First eight hash bytes as a little-endian integer, zero if unparseable
    pub fn code_hash(&self) -> u64 {
        ContentHash::from_hex(&self.hash)
            .map(|h| h.code_hash())
            .unwrap_or(0)
    }
}

/// Everything needed to take a checkpoint
#[derive(Debug, Clone, Copy)]
pub struct CheckpointRequest<'a> {
    pub timestamp: i64,
    pub fitness: f64,
    pub step_count: u64,
    pub snapshot: &'a FieldSnapshot,
    /// Files copied alongside the snapshot
    pub artifacts: &'a [PathBuf],
}

/// Which checkpoints survive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    /// Most recent checkpoints kept
    pub keep_last: usize,
    /// Always keep the highest-fitness checkpoint
    pub keep_best: bool,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            keep_last: 10,
            keep_best: true,
        }
    }
}

/// Checkpoint storage backend
pub trait CheckpointStore: Send {
    /// Persist a new checkpoint and apply retention
    fn create(&mut self, request: CheckpointRequest<'_>) -> Result<Checkpoint, CheckpointError>;

    /// Load the field snapshot of a retained checkpoint
    fn load(&self, index: u64) -> Result<FieldSnapshot, CheckpointError>;

    /// Retained checkpoints, oldest first
    fn checkpoints(&self) -> &[Checkpoint];

    /// Backing directory, if any
    fn location(&self) -> Option<&Path> {
        None
    }

    /// Most recently created checkpoint
    fn latest(&self) -> Option<&Checkpoint> {
        self.checkpoints().last()
    }

    fn get(&self, index: u64) -> Option<&Checkpoint> {
        self.checkpoints().iter().find(|c| c.index == index)
    }

    /// Highest-fitness retained checkpoint; earliest wins ties
    fn best(&self) -> Option<&Checkpoint> {
        self.checkpoints().iter().fold(None, |best: Option<&Checkpoint>, c| match best {
            Some(b) if b.fitness >= c.fitness => Some(b),
            _ => Some(c),
        })
    }
}

/// Index bookkeeping and retention shared by the stores
#[derive(Debug, Clone)]
pub(crate) struct CheckpointLedger {
    policy: RetentionPolicy,
    entries: Vec<Checkpoint>,
    next_index: u64,
    best: Option<(u64, f64)>,
}

impl CheckpointLedger {
    pub(crate) fn new(policy: RetentionPolicy) -> Self {
        Self {
            policy,
            entries: Vec::new(),
            next_index: 0,
            best: None,
        }
    }

    /// Rebuild from persisted records
    pub(crate) fn from_entries(policy: RetentionPolicy, mut entries: Vec<Checkpoint>) -> Self {
        entries.sort_by_key(|c| c.index);
        let next_index = entries.last().map(|c| c.index + 1).unwrap_or(0);
        let mut ledger = Self {
            policy,
            entries: Vec::new(),
            next_index,
            best: None,
        };
        for entry in &entries {
            ledger.track_best(entry);
        }
        ledger.entries = entries;
        ledger
    }

    pub(crate) fn next_index(&self) -> u64 {
        self.next_index
    }

    pub(crate) fn entries(&self) -> &[Checkpoint] {
        &self.entries
    }

    fn track_best(&mut self, checkpoint: &Checkpoint) {
        match self.best {
            Some((_, fitness)) if fitness >= checkpoint.fitness => {}
            _ => self.best = Some((checkpoint.index, checkpoint.fitness)),
        }
    }

    /// Record a new checkpoint, returning the ones retention drops
    pub(crate) fn admit(&mut self, checkpoint: Checkpoint) -> Vec<Checkpoint> {
        self.next_index = checkpoint.index + 1;
        self.track_best(&checkpoint);
        self.entries.push(checkpoint);

        let keep_last = self.policy.keep_last.max(1);
        if self.entries.len() <= keep_last {
            return Vec::new();
        }

        let cutoff = self.entries.len() - keep_last;
        let best = if self.policy.keep_best {
            self.best.map(|(index, _)| index)
        } else {
            None
        };

        let mut evicted = Vec::new();
        let mut position = 0usize;
        self.entries.retain(|c| {
            let keep = position >= cutoff || Some(c.index) == best;
            position += 1;
            if !keep {
                evicted.push(c.clone());
            }
            keep
        });
        evicted
    }
}

/// Reject snapshots that could not be restored after a JSON round trip
pub(crate) fn ensure_finite(snapshot: &FieldSnapshot) -> Result<(), CheckpointError> {
    for (component, values) in [
        ("phi", &snapshot.phi),
        ("pi", &snapshot.pi),
        ("weight", &snapshot.weights),
    ] {
        if let Some(index) = values.iter().position(|v| !v.is_finite()) {
            return Err(CheckpointError::NonFinite { component, index });
        }
    }
    Ok(())
}

/// Hash the snapshot bytes and every artifact
pub(crate) fn content_hash(snapshot_json: &[u8], artifacts: &[(String, Vec<u8>)]) -> ContentHash {
    let mut hasher = ContentHasher::new();
    hasher.update_artifact("field.json", snapshot_json);
    for (name, data) in artifacts {
        hasher.update_artifact(name, data);
    }
    hasher.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checkpoint(index: u64, fitness: f64) -> Checkpoint {
        Checkpoint {
            index,
            name: index.to_string(),
            timestamp: 1_700_000_000 + index as i64,
            fitness,
            step_count: index * 10,
            hash: String::new(),
        }
    }

    #[test]
    fn test_retention_keeps_last_and_best() {
        let mut ledger = CheckpointLedger::new(RetentionPolicy {
            keep_last: 2,
            keep_best: true,
        });

        assert!(ledger.admit(checkpoint(0, 0.5)).is_empty());
        assert!(ledger.admit(checkpoint(1, 0.9)).is_empty());
        let evicted = ledger.admit(checkpoint(2, 0.4));
        assert_eq!(evicted.iter().map(|c| c.index).collect::<Vec<_>>(), vec![0]);

        // Best (index 1) survives past the keep_last window
        let evicted = ledger.admit(checkpoint(3, 0.3));
        assert!(evicted.is_empty());
        let evicted = ledger.admit(checkpoint(4, 0.2));
        assert_eq!(evicted.iter().map(|c| c.index).collect::<Vec<_>>(), vec![2]);

        let kept: Vec<u64> = ledger.entries().iter().map(|c| c.index).collect();
        assert_eq!(kept, vec![1, 3, 4]);
        assert_eq!(ledger.next_index(), 5);
    }

    #[test]
    fn test_retention_without_best() {
        let mut ledger = CheckpointLedger::new(RetentionPolicy {
            keep_last: 1,
            keep_best: false,
        });
        ledger.admit(checkpoint(0, 0.9));
        let evicted = ledger.admit(checkpoint(1, 0.1));
        assert_eq!(evicted.len(), 1);
        assert_eq!(ledger.entries()[0].index, 1);
    }

    #[test]
    fn test_ledger_rebuild_continues_indices() {
        let ledger = CheckpointLedger::from_entries(
            RetentionPolicy::default(),
            vec![checkpoint(7, 0.2), checkpoint(3, 0.8)],
        );
        assert_eq!(ledger.next_index(), 8);
        assert_eq!(ledger.entries()[0].index, 3);
    }

    #[test]
    fn test_code_hash_from_hex() {
        let hash = content_hash(b"{}", &[]);
        let cp = Checkpoint {
            hash: hash.to_hex(),
            ..checkpoint(0, 0.0)
        };
        assert_eq!(cp.code_hash(), hash.code_hash());
        assert_eq!(checkpoint(0, 0.0).code_hash(), 0);
    }

    #[test]
    fn test_ensure_finite() {
        let mut snapshot = FieldSnapshot {
            params: evofield_lattice::SimulationParameters {
                side: 1,
                ..Default::default()
            },
            phi: vec![0.1],
            pi: vec![0.0],
            weights: vec![0.0],
        };
        assert!(ensure_finite(&snapshot).is_ok());

        snapshot.pi[0] = f64::NAN;
        assert!(matches!(
            ensure_finite(&snapshot),
            Err(CheckpointError::NonFinite { component: "pi", index: 0 })
        ));
    }

    #[test]
    fn test_hash_covers_artifacts() {
        let a = content_hash(b"{}", &[("a.toml".into(), b"x = 1".to_vec())]);
        let b = content_hash(b"{}", &[("a.toml".into(), b"x = 2".to_vec())]);
        assert_ne!(a, b);
    }
}
