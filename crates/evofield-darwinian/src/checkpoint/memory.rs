//! In-memory checkpoint store
//!
//! Keeps field snapshots in a map. Artifact files are not read; the hash
//! covers the snapshot only.

use std::collections::HashMap;

use evofield_lattice::FieldSnapshot;
use tracing::debug;

use super::{
    content_hash, ensure_finite, Checkpoint, CheckpointError, CheckpointLedger, CheckpointRequest,
    CheckpointStore, RetentionPolicy,
};

pub struct MemoryCheckpointStore {
    ledger: CheckpointLedger,
    snapshots: HashMap<u64, FieldSnapshot>,
}

impl MemoryCheckpointStore {
    pub fn new(policy: RetentionPolicy) -> Self {
        Self {
            ledger: CheckpointLedger::new(policy),
            snapshots: HashMap::new(),
        }
    }
}

impl Default for MemoryCheckpointStore {
    fn default() -> Self {
        Self::new(RetentionPolicy::default())
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn create(&mut self, request: CheckpointRequest<'_>) -> Result<Checkpoint, CheckpointError> {
        ensure_finite(request.snapshot)?;
        let index = self.ledger.next_index();
        let snapshot_json = serde_json::to_vec(request.snapshot)?;
        let hash = content_hash(&snapshot_json, &[]);

        let checkpoint = Checkpoint {
            index,
            name: format!("{}-{}", request.timestamp, index),
            timestamp: request.timestamp,
            fitness: request.fitness,
            step_count: request.step_count,
            hash: hash.to_hex(),
        };

        self.snapshots.insert(index, request.snapshot.clone());
        for evicted in self.ledger.admit(checkpoint.clone()) {
            self.snapshots.remove(&evicted.index);
            debug!(index = evicted.index, "Checkpoint evicted");
        }

        Ok(checkpoint)
    }

    fn load(&self, index: u64) -> Result<FieldSnapshot, CheckpointError> {
        self.snapshots
            .get(&index)
            .cloned()
            .ok_or(CheckpointError::NotFound(index))
    }

    fn checkpoints(&self) -> &[Checkpoint] {
        self.ledger.entries()
    }
}
