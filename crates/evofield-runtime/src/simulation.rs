//! The tick loop
//!
//! One tick, in order:
//!
//! 1. resource sample
//! 2. overload decision (may ask the gate and propose a mutation)
//! 3. integration step, then dynamics and learning unless in stasis
//! 4. fitness evaluation
//! 5. periodic bookkeeping: evolution check, stasis exit, invariant check

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use evofield_common::security::gate::ACTION_REDUCE_COMPLEXITY;
use evofield_common::security::{FileAuditSink, GateConfig};
use evofield_common::{
    AuditLogger, EvofieldError, FitnessMetrics, SealedGate, SharedClock, SharedGate, SystemClock,
};
use evofield_darwinian::{
    ArtifactProbe, CheckpointStore, ControllerStats, DirectoryProbe, EvolutionController,
    EvolutionPhase, FsCheckpointStore, MemoryCheckpointStore, MutationOutcome, ParameterDelta,
    Telemetry,
};
use evofield_lattice::{Dynamics, FieldState, Learning};
use evofield_metering::{LoadSource, ProcfsLoad, ResourceMonitor, SawtoothLoad};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::config::{LoadSourceKind, SystemConfig};

/// What happened during one tick
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    pub tick: u64,
    /// A new resource sample was taken
    pub sampled: bool,
    /// A debounced overload fired
    pub overload: bool,
    /// Outcomes of every mutation proposed this tick
    pub mutations: Vec<MutationOutcome>,
    /// Fitness of this tick's step; `None` while paused
    pub metrics: Option<FitnessMetrics>,
    pub exited_stasis: bool,
    pub proposals: Vec<ParameterDelta>,
}

/// End-of-run summary
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub ticks: u64,
    pub evaluations: u64,
    pub phase: EvolutionPhase,
    pub metrics: FitnessMetrics,
    pub best_fitness: f64,
    pub energy: f64,
    pub checkpoints: usize,
    pub stats: ControllerStats,
}

/// Overrides for the collaborators [`Simulation::new`] would build itself
pub struct SimulationBuilder {
    config: SystemConfig,
    gate: Option<SharedGate>,
    clock: Option<SharedClock>,
    load_source: Option<Box<dyn LoadSource>>,
    store: Option<Box<dyn CheckpointStore>>,
    probe: Option<Box<dyn ArtifactProbe>>,
    audit: Option<AuditLogger>,
    telemetry: bool,
}

impl SimulationBuilder {
    pub fn gate(mut self, gate: SharedGate) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn load_source(mut self, source: Box<dyn LoadSource>) -> Self {
        self.load_source = Some(source);
        self
    }

    pub fn checkpoint_store(mut self, store: Box<dyn CheckpointStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn artifact_probe(mut self, probe: Box<dyn ArtifactProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Audit logger for the controller
    pub fn audit(mut self, audit: AuditLogger) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn without_telemetry(mut self) -> Self {
        self.telemetry = false;
        self
    }

    pub fn build(self) -> Result<Simulation, EvofieldError> {
        let config = self.config;
        let params = config.simulation.parameters();
        params
            .validate()
            .map_err(|e| EvofieldError::Validation(e.to_string()))?;

        let mut field =
            FieldState::new(params).map_err(|e| EvofieldError::Validation(e.to_string()))?;
        field
            .initialize(
                config.simulation.seed,
                config.simulation.phi_range,
                config.simulation.weight_range,
            )
            .map_err(|e| EvofieldError::Validation(e.to_string()))?;

        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(SystemClock::new()) as SharedClock);
        let gate = match self.gate {
            Some(gate) => gate,
            None => Arc::new(SealedGate::new(
                GateConfig {
                    energy_upper_bound: config.runtime.energy_upper_bound,
                    ..GateConfig::default()
                },
                audit_logger(&config),
            )),
        };
        let source = self
            .load_source
            .unwrap_or_else(|| load_source(config.runtime.load_source));
        let store = match self.store {
            Some(store) => store,
            None => checkpoint_store(&config)?,
        };
        let probe = self.probe.unwrap_or_else(|| artifact_probe(&config));
        let audit = self.audit.unwrap_or_else(|| audit_logger(&config));

        let monitor = ResourceMonitor::new(config.monitor.clone(), source, clock.clone());
        let controller = EvolutionController::new(
            config.evolution.clone(),
            gate.clone(),
            clock.clone(),
            store,
            probe,
        )
        .with_audit(audit);

        let telemetry = if self.telemetry {
            match Telemetry::new() {
                Ok(telemetry) => Some(telemetry),
                Err(e) => {
                    warn!(error = %e, "Telemetry disabled");
                    None
                }
            }
        } else {
            None
        };

        info!(
            side = params.side,
            nodes = field.node_count(),
            seed = config.simulation.seed,
            energy = field.total_energy(),
            "Simulation initialized"
        );

        Ok(Simulation {
            dynamics: Dynamics::new(config.dynamics.clone()),
            learning: Learning::new(config.learning.clone()),
            config,
            field,
            monitor,
            controller,
            gate,
            clock,
            telemetry,
            ticks: 0,
            running: true,
        })
    }
}

/// Field, monitor and controller driven one tick at a time
pub struct Simulation {
    config: SystemConfig,
    field: FieldState,
    dynamics: Dynamics,
    learning: Learning,
    monitor: ResourceMonitor,
    controller: EvolutionController,
    gate: SharedGate,
    clock: SharedClock,
    telemetry: Option<Telemetry>,
    ticks: u64,
    running: bool,
}

impl Simulation {
    /// Build with the default collaborators for `config`
    pub fn new(config: SystemConfig) -> Result<Self, EvofieldError> {
        Self::builder(config).build()
    }

    pub fn builder(config: SystemConfig) -> SimulationBuilder {
        SimulationBuilder {
            config,
            gate: None,
            clock: None,
            load_source: None,
            store: None,
            probe: None,
            audit: None,
            telemetry: true,
        }
    }

    /// Run one tick
    ///
    /// Only an energy invariant violation is returned as an error; everything
    /// else is logged and reflected in the report.
    #[instrument(skip(self), fields(tick = self.ticks + 1))]
    pub fn tick(&mut self) -> Result<TickReport, EvofieldError> {
        self.ticks += 1;
        let n = self.ticks;
        let mut report = TickReport {
            tick: n,
            ..TickReport::default()
        };

        report.sampled = self.monitor.update();
        if report.sampled {
            self.monitor.adjust_performance();
            if let Some(telemetry) = &self.telemetry {
                telemetry.observe_load(self.monitor.current_load(), self.monitor.memory_usage());
            }
        }

        if !self.controller.is_in_stasis() && self.monitor.check_and_trigger_overload() {
            report.overload = true;
            if let Some(telemetry) = &self.telemetry {
                telemetry.record_overload();
            }
            if self.gate.request_permission(ACTION_REDUCE_COMPLEXITY) {
                let outcome = self.controller.propose_mutation(&mut self.field);
                debug!(?outcome, "Complexity reduction");
                report.mutations.push(outcome);
            } else {
                warn!("Complexity reduction denied");
            }
        }

        if self.running {
            let started = self.clock.elapsed();
            self.field.step();
            if !self.controller.is_in_stasis() {
                self.dynamics.apply(&mut self.field);
                self.learning.apply(&mut self.field);
            }
            let duration = self.clock.elapsed().saturating_sub(started);

            let metrics = self.controller.evaluate_fitness(&mut self.field, duration);
            if let Some(telemetry) = &self.telemetry {
                telemetry.observe_step(duration, self.field.total_energy());
            }
            report.metrics = Some(metrics);
        }

        let evolution = &self.config.evolution;
        if every(n, evolution.evolution_interval_steps)
            && !self.controller.is_in_stasis()
            && self.controller.metrics().aggregate < evolution.min_fitness_for_optimization
        {
            let outcome = self.controller.propose_mutation(&mut self.field);
            debug!(?outcome, "Evolution check");
            report.mutations.push(outcome);
        }

        let runtime = &self.config.runtime;
        if every(n, runtime.stasis_exit_interval)
            && self.controller.is_in_stasis()
            && self.monitor.current_load() < runtime.stasis_exit_load
        {
            self.controller.exit_stasis();
            report.exited_stasis = true;
        }

        report.proposals = self.controller.take_proposals();
        for delta in &report.proposals {
            info!(
                evaluation = delta.evaluation,
                reasons = ?delta.reasons,
                "Parameter delta pending review"
            );
        }

        if let Some(telemetry) = &self.telemetry {
            telemetry.observe_controller(&self.controller);
        }

        if every(n, self.config.runtime.invariant_check_interval) {
            self.gate.validate_energy(self.field.total_energy())?;
        }

        Ok(report)
    }

    /// Tick until `max_steps` or until `shutdown` resolves
    ///
    /// Shutdown is observed between batches of `batch_size` ticks.
    pub async fn run<F>(&mut self, shutdown: F) -> Result<RunSummary, EvofieldError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let batch = self.config.runtime.batch_size.max(1);
        let pause = Duration::from_millis(self.config.runtime.batch_pause_ms);

        info!(
            max_steps = self.config.runtime.max_steps,
            batch, "Tick loop started"
        );

        while !self.finished() {
            for _ in 0..batch {
                if self.finished() {
                    break;
                }
                self.tick()?;
            }

            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!(ticks = self.ticks, "Shutdown requested");
                    break;
                }
                _ = tokio::time::sleep(pause) => {}
            }
        }

        Ok(self.summary())
    }

    fn finished(&self) -> bool {
        let max = self.config.runtime.max_steps;
        max > 0 && self.ticks >= max
    }

    /// Write the state report, binary dump and metrics; failures are logged
    pub fn write_outputs(&self) {
        let runtime = &self.config.runtime;

        match self.controller.report().write_to(&runtime.state_report_path) {
            Ok(()) => info!(path = %runtime.state_report_path.display(), "State report written"),
            Err(e) => warn!(path = %runtime.state_report_path.display(), error = %e, "State report not written"),
        }

        let written = self
            .controller
            .dump_record(&self.field)
            .and_then(|record| record.write_to(&runtime.dump_path).map(|()| record.encoded_len()));
        match written {
            Ok(bytes) => info!(path = %runtime.dump_path.display(), bytes, "Binary dump written"),
            Err(e) => warn!(path = %runtime.dump_path.display(), error = %e, "Binary dump not written"),
        }

        if let (Some(path), Some(telemetry)) = (&runtime.metrics_path, &self.telemetry) {
            let written = telemetry
                .render()
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
                .and_then(|text| std::fs::write(path, text));
            if let Err(e) = written {
                warn!(path = %path.display(), error = %e, "Metrics not written");
            }
        }
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            ticks: self.ticks,
            evaluations: self.controller.evaluations(),
            phase: self.controller.phase(),
            metrics: *self.controller.metrics(),
            best_fitness: self.controller.best_fitness(),
            energy: self.field.total_energy(),
            checkpoints: self.controller.store().checkpoints().len(),
            stats: *self.controller.stats(),
        }
    }

    /// Stop integrating; sampling and bookkeeping continue
    pub fn pause(&mut self) {
        self.running = false;
    }

    pub fn resume(&mut self) {
        self.running = true;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn field(&self) -> &FieldState {
        &self.field
    }

    pub fn field_mut(&mut self) -> &mut FieldState {
        &mut self.field
    }

    pub fn controller(&self) -> &EvolutionController {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut EvolutionController {
        &mut self.controller
    }

    pub fn monitor(&self) -> &ResourceMonitor {
        &self.monitor
    }

    pub fn telemetry(&self) -> Option<&Telemetry> {
        self.telemetry.as_ref()
    }

    pub fn config(&self) -> &SystemConfig {
        &self.config
    }
}

fn every(n: u64, interval: u64) -> bool {
    interval > 0 && n % interval == 0
}

fn audit_logger(config: &SystemConfig) -> AuditLogger {
    let logger = AuditLogger::new();
    match &config.runtime.audit_log {
        Some(path) => logger.with_sink(Box::new(FileAuditSink::new(path))),
        None => logger,
    }
}

fn load_source(kind: LoadSourceKind) -> Box<dyn LoadSource> {
    match kind {
        LoadSourceKind::Sawtooth => Box::new(SawtoothLoad::new()),
        LoadSourceKind::Procfs => Box::new(ProcfsLoad::new()),
        LoadSourceKind::Auto => {
            let procfs = ProcfsLoad::new();
            if procfs.is_available() {
                Box::new(procfs)
            } else {
                debug!("procfs unavailable, using saw-tooth load");
                Box::new(SawtoothLoad::new())
            }
        }
    }
}

fn checkpoint_store(config: &SystemConfig) -> Result<Box<dyn CheckpointStore>, EvofieldError> {
    let settings = &config.checkpoints;
    if settings.in_memory {
        return Ok(Box::new(MemoryCheckpointStore::new(settings.retention())));
    }
    let store = FsCheckpointStore::open(&settings.directory, settings.retention())?;
    Ok(Box::new(store))
}

fn artifact_probe(config: &SystemConfig) -> Box<dyn ArtifactProbe> {
    let runtime = &config.runtime;
    let extensions: Vec<&str> = runtime.artifact_extensions.iter().map(String::as_str).collect();
    Box::new(
        DirectoryProbe::new(&runtime.artifact_root, &extensions)
            .exclude(&config.checkpoints.directory),
    )
}
