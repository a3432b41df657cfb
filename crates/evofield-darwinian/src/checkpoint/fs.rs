//! Filesystem checkpoint store
//!
//! Layout, one directory per checkpoint named by its creation second:
//!
//! ```text
//! <root>/<unix_seconds>[_<n>]/
//!     checkpoint.json   metadata record
//!     field.json        field snapshot
//!     artifacts/        copied artifact files
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use evofield_lattice::FieldSnapshot;
use tracing::{debug, info, warn};

use super::{
    content_hash, ensure_finite, Checkpoint, CheckpointError, CheckpointLedger, CheckpointRequest,
    CheckpointStore, RetentionPolicy,
};

const METADATA_FILE: &str = "checkpoint.json";
const SNAPSHOT_FILE: &str = "field.json";
const ARTIFACT_DIR: &str = "artifacts";

pub struct FsCheckpointStore {
    root: PathBuf,
    ledger: CheckpointLedger,
}

impl FsCheckpointStore {
    /// Open or create a store rooted at `root`
    ///
    /// Existing checkpoint directories are indexed from their metadata records;
    /// directories without a readable record are skipped.
    pub fn open(root: impl Into<PathBuf>, policy: RetentionPolicy) -> Result<Self, CheckpointError> {
        let root = root.into();
        fs::create_dir_all(&root)?;

        let mut entries = Vec::new();
        for entry in fs::read_dir(&root)? {
            let path = entry?.path();
            let meta_path = path.join(METADATA_FILE);
            if !meta_path.is_file() {
                continue;
            }
            match fs::read(&meta_path)
                .map_err(CheckpointError::from)
                .and_then(|bytes| serde_json::from_slice::<Checkpoint>(&bytes).map_err(Into::into))
            {
                Ok(checkpoint) => entries.push(checkpoint),
                Err(e) => warn!(path = %meta_path.display(), error = %e, "Skipping unreadable checkpoint"),
            }
        }

        info!(root = %root.display(), existing = entries.len(), "Checkpoint store opened");
        Ok(Self {
            root,
            ledger: CheckpointLedger::from_entries(policy, entries),
        })
    }

    fn unique_dir(&self, timestamp: i64) -> PathBuf {
        let base = timestamp.to_string();
        let mut candidate = self.root.join(&base);
        let mut suffix = 1u32;
        while candidate.exists() {
            candidate = self.root.join(format!("{base}_{suffix}"));
            suffix += 1;
        }
        candidate
    }

    fn write_checkpoint(
        &self,
        dir: &Path,
        index: u64,
        request: &CheckpointRequest<'_>,
    ) -> Result<Checkpoint, CheckpointError> {
        fs::create_dir_all(dir.join(ARTIFACT_DIR))?;

        let snapshot_json = serde_json::to_vec(request.snapshot)?;
        fs::write(dir.join(SNAPSHOT_FILE), &snapshot_json)?;

        let mut copied: Vec<(String, Vec<u8>)> = Vec::with_capacity(request.artifacts.len());
        for (i, source) in request.artifacts.iter().enumerate() {
            let Some(file_name) = source.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let name = if copied.iter().any(|(n, _)| n == file_name) {
                format!("{i}_{file_name}")
            } else {
                file_name.to_string()
            };
            match fs::read(source) {
                Ok(data) => {
                    fs::write(dir.join(ARTIFACT_DIR).join(&name), &data)?;
                    copied.push((name, data));
                }
                Err(e) => warn!(artifact = %source.display(), error = %e, "Artifact not copied"),
            }
        }

        let checkpoint = Checkpoint {
            index,
            name: dir
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default()
                .to_string(),
            timestamp: request.timestamp,
            fitness: request.fitness,
            step_count: request.step_count,
            hash: content_hash(&snapshot_json, &copied).to_hex(),
        };
        fs::write(dir.join(METADATA_FILE), serde_json::to_vec_pretty(&checkpoint)?)?;
        Ok(checkpoint)
    }
}

impl CheckpointStore for FsCheckpointStore {
    fn create(&mut self, request: CheckpointRequest<'_>) -> Result<Checkpoint, CheckpointError> {
        ensure_finite(request.snapshot)?;
        let index = self.ledger.next_index();
        let dir = self.unique_dir(request.timestamp);

        let checkpoint = match self.write_checkpoint(&dir, index, &request) {
            Ok(checkpoint) => checkpoint,
            Err(e) => {
                let _ = fs::remove_dir_all(&dir);
                return Err(e);
            }
        };

        for evicted in self.ledger.admit(checkpoint.clone()) {
            let path = self.root.join(&evicted.name);
            match fs::remove_dir_all(&path) {
                Ok(()) => debug!(index = evicted.index, path = %path.display(), "Checkpoint evicted"),
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove evicted checkpoint"),
            }
        }

        debug!(index, dir = %dir.display(), "Checkpoint written");
        Ok(checkpoint)
    }

    fn load(&self, index: u64) -> Result<FieldSnapshot, CheckpointError> {
        let checkpoint = self.get(index).ok_or(CheckpointError::NotFound(index))?;
        let path = self.root.join(&checkpoint.name).join(SNAPSHOT_FILE);
        let bytes = fs::read(&path)?;
        serde_json::from_slice(&bytes).map_err(|e| CheckpointError::Corrupt {
            path,
            reason: e.to_string(),
        })
    }

    fn checkpoints(&self) -> &[Checkpoint] {
        self.ledger.entries()
    }

    fn location(&self) -> Option<&Path> {
        Some(&self.root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evofield_lattice::{FieldState, SimulationParameters};

    fn snapshot(seed: u64) -> FieldSnapshot {
        let mut field = FieldState::new(SimulationParameters {
            side: 2,
            ..SimulationParameters::default()
        })
        .unwrap();
        field.initialize(seed, 0.1, 0.02).unwrap();
        field.snapshot()
    }

    #[test]
    fn test_directory_layout() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("evofield.toml");
        fs::write(&artifact, "[simulation]\nside = 2\n").unwrap();

        let mut store =
            FsCheckpointStore::open(dir.path().join("checkpoints"), RetentionPolicy::default())
                .unwrap();
        let s = snapshot(1);
        let artifacts = vec![artifact];
        let checkpoint = store
            .create(CheckpointRequest {
                timestamp: 1_700_000_123,
                fitness: 0.75,
                step_count: 42,
                snapshot: &s,
                artifacts: &artifacts,
            })
            .unwrap();

        let cp_dir = dir.path().join("checkpoints/1700000123");
        assert_eq!(checkpoint.name, "1700000123");
        assert!(cp_dir.join(METADATA_FILE).is_file());
        assert!(cp_dir.join(SNAPSHOT_FILE).is_file());
        assert!(cp_dir.join("artifacts/evofield.toml").is_file());

        let meta: serde_json::Value =
            serde_json::from_slice(&fs::read(cp_dir.join(METADATA_FILE)).unwrap()).unwrap();
        assert_eq!(meta["timestamp"], 1_700_000_123);
        assert_eq!(meta["fitness"], 0.75);
        assert_eq!(meta["step_count"], 42);
        assert_eq!(meta["hash"].as_str().unwrap().len(), 64);

        assert_eq!(store.load(checkpoint.index).unwrap(), s);
    }

    #[test]
    fn test_same_second_gets_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FsCheckpointStore::open(dir.path(), RetentionPolicy::default()).unwrap();
        let s = snapshot(2);
        let req = CheckpointRequest {
            timestamp: 1_700_000_000,
            fitness: 0.5,
            step_count: 1,
            snapshot: &s,
            artifacts: &[],
        };

        let a = store.create(req).unwrap();
        let b = store.create(req).unwrap();

        assert_eq!(a.name, "1700000000");
        assert_eq!(b.name, "1700000000_1");
        assert_eq!(store.latest().map(|c| c.index), Some(1));
    }

    #[test]
    fn test_retention_removes_directories() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FsCheckpointStore::open(
            dir.path(),
            RetentionPolicy {
                keep_last: 1,
                keep_best: true,
            },
        )
        .unwrap();
        let s = snapshot(3);

        for (i, fitness) in [0.9, 0.1, 0.2].into_iter().enumerate() {
            store
                .create(CheckpointRequest {
                    timestamp: 1_700_000_000 + i as i64,
                    fitness,
                    step_count: i as u64,
                    snapshot: &s,
                    artifacts: &[],
                })
                .unwrap();
        }

        assert!(dir.path().join("1700000000").exists());
        assert!(!dir.path().join("1700000001").exists());
        assert!(dir.path().join("1700000002").exists());
        assert_eq!(store.best().map(|c| c.fitness), Some(0.9));
    }

    #[test]
    fn test_reopen_restores_index() {
        let dir = tempfile::tempdir().unwrap();
        let s = snapshot(4);
        {
            let mut store = FsCheckpointStore::open(dir.path(), RetentionPolicy::default()).unwrap();
            for i in 0..3 {
                store
                    .create(CheckpointRequest {
                        timestamp: 1_700_000_000 + i,
                        fitness: 0.5,
                        step_count: i as u64,
                        snapshot: &s,
                        artifacts: &[],
                    })
                    .unwrap();
            }
        }

        let mut store = FsCheckpointStore::open(dir.path(), RetentionPolicy::default()).unwrap();
        assert_eq!(store.checkpoints().len(), 3);
        let next = store
            .create(CheckpointRequest {
                timestamp: 1_700_000_010,
                fitness: 0.5,
                step_count: 9,
                snapshot: &s,
                artifacts: &[],
            })
            .unwrap();
        assert_eq!(next.index, 3);
    }

    #[test]
    fn test_diverged_snapshot_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FsCheckpointStore::open(dir.path(), RetentionPolicy::default()).unwrap();
        fn request(snapshot: &FieldSnapshot) -> CheckpointRequest<'_> {
            CheckpointRequest {
                timestamp: 1_700_000_000,
                fitness: 0.5,
                step_count: 1,
                snapshot,
                artifacts: &[],
            }
        }
        let good = snapshot(5);
        store.create(request(&good)).unwrap();

        let mut diverged = snapshot(5);
        diverged.phi[0] = f64::INFINITY;
        let err = store.create(request(&diverged)).unwrap_err();

        assert!(matches!(err, CheckpointError::NonFinite { component: "phi", index: 0 }));
        assert_eq!(store.checkpoints().len(), 1);
        assert!(!dir.path().join("1700000000_1").exists());
        assert_eq!(store.load(store.latest().unwrap().index).unwrap(), good);
    }

    #[test]
    fn test_load_missing_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsCheckpointStore::open(dir.path(), RetentionPolicy::default()).unwrap();
        assert!(matches!(store.load(0), Err(CheckpointError::NotFound(0))));
    }
}
