//! Runtime configuration
//!
//! Layered from an optional TOML file and `EVOFIELD__*` environment variables
//! (`EVOFIELD__EVOLUTION__REDUCTION_COOLDOWN_SECONDS=10`). Every recognised key
//! is read on its own; a missing key keeps its default and an unparseable one
//! keeps its default with a warning.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use config::{Config, ConfigError, Environment, File};
use evofield_common::EvofieldError;
use evofield_darwinian::{EvolutionConfig, RetentionPolicy};
use evofield_lattice::{DynamicsConfig, LearningConfig, SimulationParameters};
use evofield_metering::MonitorConfig;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Config file used when `EVOFIELD_CONFIG` is unset
pub const DEFAULT_CONFIG_PATH: &str = "config/evofield.toml";

/// Environment variable naming the config file
pub const CONFIG_PATH_ENV: &str = "EVOFIELD_CONFIG";

/// Full system configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystemConfig {
    pub simulation: SimulationSettings,
    pub learning: LearningConfig,
    pub dynamics: DynamicsConfig,
    pub monitor: MonitorConfig,
    pub evolution: EvolutionConfig,
    pub checkpoints: CheckpointSettings,
    pub runtime: RuntimeSettings,
}

/// Lattice constants and initial conditions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationSettings {
    pub side: usize,
    pub dt: f64,
    pub mass: f64,
    pub coupling: f64,
    pub seed: u64,
    /// Half-width of the initial amplitude draw
    pub phi_range: f64,
    /// Half-width of the initial coupling draw
    pub weight_range: f64,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        let params = SimulationParameters::default();
        Self {
            side: params.side,
            dt: params.dt,
            mass: params.mass,
            coupling: params.coupling,
            seed: 42,
            phi_range: 0.1,
            weight_range: 0.02,
        }
    }
}

impl SimulationSettings {
    pub fn parameters(&self) -> SimulationParameters {
        SimulationParameters {
            side: self.side,
            dt: self.dt,
            mass: self.mass,
            coupling: self.coupling,
        }
    }
}

/// Checkpoint storage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointSettings {
    pub directory: PathBuf,
    /// Keep checkpoints in memory only
    pub in_memory: bool,
    pub keep_last: usize,
    pub keep_best: bool,
}

impl Default for CheckpointSettings {
    fn default() -> Self {
        let retention = RetentionPolicy::default();
        Self {
            directory: PathBuf::from("checkpoints"),
            in_memory: false,
            keep_last: retention.keep_last,
            keep_best: retention.keep_best,
        }
    }
}

impl CheckpointSettings {
    pub fn retention(&self) -> RetentionPolicy {
        RetentionPolicy {
            keep_last: self.keep_last,
            keep_best: self.keep_best,
        }
    }
}

/// Where resource readings come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadSourceKind {
    /// procfs when readable, otherwise the saw-tooth generator
    Auto,
    Procfs,
    Sawtooth,
}

impl FromStr for LoadSourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "procfs" => Ok(Self::Procfs),
            "sawtooth" => Ok(Self::Sawtooth),
            other => Err(format!("unknown load source: {other}")),
        }
    }
}

/// Tick loop and output settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeSettings {
    /// Stop after this many ticks; 0 runs until interrupted
    pub max_steps: u64,
    /// Ticks between shutdown checks
    pub batch_size: u64,
    /// Pause between batches (milliseconds)
    pub batch_pause_ms: u64,
    /// Ticks between energy invariant checks
    pub invariant_check_interval: u64,
    /// Ticks between stasis exit checks
    pub stasis_exit_interval: u64,
    /// CPU load (percent) below which stasis is left
    pub stasis_exit_load: f64,
    pub energy_upper_bound: f64,
    pub load_source: LoadSourceKind,
    /// Directory scanned for the compactness score
    pub artifact_root: PathBuf,
    pub artifact_extensions: Vec<String>,
    pub state_report_path: PathBuf,
    pub dump_path: PathBuf,
    /// JSON-lines audit log, in addition to tracing
    pub audit_log: Option<PathBuf>,
    /// Prometheus text written at shutdown
    pub metrics_path: Option<PathBuf>,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            max_steps: 0,
            batch_size: 100,
            batch_pause_ms: 0,
            invariant_check_interval: 500,
            stasis_exit_interval: 1000,
            stasis_exit_load: 30.0,
            energy_upper_bound: evofield_common::ENERGY_UPPER_BOUND,
            load_source: LoadSourceKind::Auto,
            artifact_root: PathBuf::from("config"),
            artifact_extensions: vec!["toml".to_string()],
            state_report_path: PathBuf::from("evolution_state.txt"),
            dump_path: PathBuf::from("evolution_dump.bin"),
            audit_log: None,
            metrics_path: None,
        }
    }
}

impl SystemConfig {
    /// Load from `EVOFIELD_CONFIG` (or the default path) and the environment
    pub fn load() -> Result<Self, EvofieldError> {
        // Try to load .env file
        let _ = dotenvy::dotenv();

        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(Path::new(&path))
    }

    /// Load from an explicit file plus the environment
    ///
    /// A missing file is not an error; a file that fails to parse is.
    pub fn load_from(path: &Path) -> Result<Self, EvofieldError> {
        debug!(path = %path.display(), "Loading configuration");
        let source = Config::builder()
            .add_source(File::from(path).required(false))
            .add_source(
                Environment::with_prefix("EVOFIELD")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| EvofieldError::Config(e.to_string()))?;
        Ok(Self::from_source(&source))
    }

    /// Read every recognised key from an assembled source
    pub fn from_source(source: &Config) -> Self {
        let r = KeyReader { source };
        let mut cfg = Self::default();

        let sim = &mut cfg.simulation;
        r.read("simulation.side", &mut sim.side);
        r.read("simulation.dt", &mut sim.dt);
        r.read("simulation.mass", &mut sim.mass);
        r.read("simulation.coupling", &mut sim.coupling);
        r.read("simulation.seed", &mut sim.seed);
        r.read("simulation.phi_range", &mut sim.phi_range);
        r.read("simulation.weight_range", &mut sim.weight_range);

        let learning = &mut cfg.learning;
        r.read("learning.enabled", &mut learning.enabled);
        r.read("learning.rule", &mut learning.rule);
        r.read("learning.learning_rate", &mut learning.learning_rate);
        r.read("learning.weight_decay", &mut learning.weight_decay);
        r.read("learning.min_weight", &mut learning.min_weight);
        r.read("learning.max_weight", &mut learning.max_weight);

        let dynamics = &mut cfg.dynamics;
        r.read("dynamics.enabled", &mut dynamics.enabled);
        r.read("dynamics.damping_enabled", &mut dynamics.damping_enabled);
        r.read("dynamics.damping_factor", &mut dynamics.damping_factor);
        r.read("dynamics.limits_enabled", &mut dynamics.limits_enabled);
        r.read("dynamics.min_phi", &mut dynamics.min_phi);
        r.read("dynamics.max_phi", &mut dynamics.max_phi);
        r.read("dynamics.min_pi", &mut dynamics.min_pi);
        r.read("dynamics.max_pi", &mut dynamics.max_pi);

        let monitor = &mut cfg.monitor;
        r.read("monitor.cpu_threshold", &mut monitor.cpu_threshold);
        r.read("monitor.memory_threshold", &mut monitor.memory_threshold);
        r.read("monitor.overload_debounce_seconds", &mut monitor.overload_debounce_seconds);
        r.read("monitor.max_overloads_per_minute", &mut monitor.max_overloads_per_minute);
        r.read("monitor.adaptive_thresholds", &mut monitor.adaptive_thresholds);
        r.read("monitor.sample_interval_ms", &mut monitor.sample_interval_ms);

        let evolution = &mut cfg.evolution;
        r.read("evolution.reduction_cooldown_seconds", &mut evolution.reduction_cooldown_seconds);
        r.read("evolution.max_reductions_per_minute", &mut evolution.max_reductions_per_minute);
        r.read("evolution.min_fitness_for_optimization", &mut evolution.min_fitness_for_optimization);
        r.read("evolution.evolution_interval_steps", &mut evolution.evolution_interval_steps);
        r.read("evolution.mutation_strength", &mut evolution.mutation_strength);
        r.read("evolution.stasis_mutation_strength", &mut evolution.stasis_mutation_strength);
        r.read("evolution.degradation_check_interval", &mut evolution.degradation_check_interval);
        r.read("evolution.optimization_interval", &mut evolution.optimization_interval);
        r.read("evolution.stasis_upkeep_interval", &mut evolution.stasis_upkeep_interval);
        r.read_optional("evolution.history_limit", &mut evolution.history_limit);
        r.read("evolution.size_budget", &mut evolution.targets.size_budget);
        r.read("evolution.target_time", &mut evolution.targets.target_time);
        r.read("evolution.target_energy", &mut evolution.targets.target_energy);

        let checkpoints = &mut cfg.checkpoints;
        r.read("checkpoints.directory", &mut checkpoints.directory);
        r.read("checkpoints.in_memory", &mut checkpoints.in_memory);
        r.read("checkpoints.keep_last", &mut checkpoints.keep_last);
        r.read("checkpoints.keep_best", &mut checkpoints.keep_best);

        let runtime = &mut cfg.runtime;
        r.read("runtime.max_steps", &mut runtime.max_steps);
        r.read("runtime.batch_size", &mut runtime.batch_size);
        r.read("runtime.batch_pause_ms", &mut runtime.batch_pause_ms);
        r.read("runtime.invariant_check_interval", &mut runtime.invariant_check_interval);
        r.read("runtime.stasis_exit_interval", &mut runtime.stasis_exit_interval);
        r.read("runtime.stasis_exit_load", &mut runtime.stasis_exit_load);
        r.read("runtime.energy_upper_bound", &mut runtime.energy_upper_bound);
        r.read("runtime.load_source", &mut runtime.load_source);
        r.read("runtime.artifact_root", &mut runtime.artifact_root);
        r.read("runtime.artifact_extensions", &mut runtime.artifact_extensions);
        r.read("runtime.state_report_path", &mut runtime.state_report_path);
        r.read("runtime.dump_path", &mut runtime.dump_path);
        r.read_optional("runtime.audit_log", &mut runtime.audit_log);
        r.read_optional("runtime.metrics_path", &mut runtime.metrics_path);

        cfg.evolution.state_report_path = Some(cfg.runtime.state_report_path.clone());
        cfg
    }
}

struct KeyReader<'a> {
    source: &'a Config,
}

impl KeyReader<'_> {
    fn read<T: DeserializeOwned>(&self, key: &str, slot: &mut T) {
        match self.source.get::<T>(key) {
            Ok(value) => *slot = value,
            Err(ConfigError::NotFound(_)) => {}
            Err(e) => warn!(key, error = %e, "Invalid configuration value, using default"),
        }
    }

    fn read_optional<T: DeserializeOwned>(&self, key: &str, slot: &mut Option<T>) {
        match self.source.get::<T>(key) {
            Ok(value) => *slot = Some(value),
            Err(ConfigError::NotFound(_)) => {}
            Err(e) => warn!(key, error = %e, "Invalid configuration value, using default"),
        }
    }
}
