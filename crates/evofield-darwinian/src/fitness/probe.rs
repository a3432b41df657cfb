//! Artifact probes
//!
//! The compactness score and checkpoint contents both come from the set of
//! persisted artifacts the system is judged by. A probe reports that set.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

/// Source of the artifact size signal and the files to checkpoint
pub trait ArtifactProbe: Send + Sync {
    /// Total artifact size in bytes, `None` when nothing can be measured
    fn total_size(&self) -> Option<u64>;

    /// Files copied into every checkpoint
    fn artifacts(&self) -> Vec<PathBuf> {
        Vec::new()
    }
}

/// Probe with a fixed answer and no files
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedProbe(pub Option<u64>);

impl ArtifactProbe for FixedProbe {
    fn total_size(&self) -> Option<u64> {
        self.0
    }
}

/// Walks a directory tree for files with the given extensions
#[derive(Debug, Clone)]
pub struct DirectoryProbe {
    root: PathBuf,
    extensions: Vec<String>,
    /// Subtrees never walked (checkpoint directories live here)
    excluded: Vec<PathBuf>,
}

impl DirectoryProbe {
    pub fn new(root: impl Into<PathBuf>, extensions: &[&str]) -> Self {
        Self {
            root: root.into(),
            extensions: extensions.iter().map(|e| e.trim_start_matches('.').to_string()).collect(),
            excluded: Vec::new(),
        }
    }

    /// Skip a subtree
    pub fn exclude(mut self, path: impl Into<PathBuf>) -> Self {
        self.excluded.push(path.into());
        self
    }

    fn matches(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| self.extensions.iter().any(|x| x == e))
            .unwrap_or(false)
    }

    fn walk(&self, dir: &Path, out: &mut Vec<PathBuf>) {
        let Ok(entries) = fs::read_dir(dir) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if self.excluded.iter().any(|x| path.starts_with(x)) {
                continue;
            }
            match entry.file_type() {
                Ok(t) if t.is_dir() => self.walk(&path, out),
                Ok(t) if t.is_file() && self.matches(&path) => out.push(path),
                _ => {}
            }
        }
    }
}

impl ArtifactProbe for DirectoryProbe {
    fn total_size(&self) -> Option<u64> {
        let files = self.artifacts();
        if files.is_empty() {
            return None;
        }
        let total = files
            .iter()
            .filter_map(|p| fs::metadata(p).ok())
            .map(|m| m.len())
            .sum();
        debug!(files = files.len(), total, "Artifacts measured");
        Some(total)
    }

    fn artifacts(&self) -> Vec<PathBuf> {
        let mut out = Vec::new();
        self.walk(&self.root, &mut out);
        out.sort();
        out
    }
}
