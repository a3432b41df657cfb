//! Human-readable evolution state report

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use evofield_common::FitnessMetrics;
use serde::{Deserialize, Serialize};

/// Controller state written on stasis entry and at shutdown
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvolutionReport {
    /// Evaluations / 1000
    pub generation: u64,
    pub current: FitnessMetrics,
    pub best_fitness: f64,
    pub total_steps: u64,
    pub checkpoint_dir: Option<PathBuf>,
}

impl EvolutionReport {
    pub fn write_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_string())
    }
}

impl fmt::Display for EvolutionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Evolution State - Generation: {}", self.generation)?;
        writeln!(f, "Current Fitness: {}", self.current.aggregate)?;
        writeln!(f, "Best Fitness: {}", self.best_fitness)?;
        writeln!(f, "Compactness Score: {}", self.current.compactness)?;
        writeln!(f, "Performance Score: {}", self.current.performance)?;
        writeln!(f, "Energy Score: {}", self.current.energy)?;
        writeln!(f, "Total Steps: {}", self.total_steps)?;
        match &self.checkpoint_dir {
            Some(dir) => writeln!(f, "Checkpoints available in: {}", dir.display()),
            None => writeln!(f, "Checkpoints available in: (memory)"),
        }
    }
}
