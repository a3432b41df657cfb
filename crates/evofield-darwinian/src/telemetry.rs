//! Prometheus telemetry for the control loop

use std::time::Duration;

use prometheus::{
    Encoder, Gauge, Histogram, HistogramOpts, IntCounter, IntGauge, Registry, TextEncoder,
};

use crate::controller::{EvolutionController, EvolutionPhase};

/// Control-loop metrics on a private registry
pub struct Telemetry {
    registry: Registry,
    pub fitness: Gauge,
    pub best_fitness: Gauge,
    pub energy: Gauge,
    pub cpu_load: Gauge,
    pub memory_load: Gauge,
    pub stasis: IntGauge,
    pub step_duration_seconds: Histogram,
    pub mutations_total: IntCounter,
    pub rollbacks_total: IntCounter,
    pub checkpoints_total: IntCounter,
    pub overloads_total: IntCounter,
}

impl Telemetry {
    pub fn new() -> prometheus::Result<Self> {
        let telemetry = Self {
            registry: Registry::new(),
            fitness: Gauge::new("evofield_fitness", "Aggregate fitness of the last evaluation")?,
            best_fitness: Gauge::new("evofield_best_fitness", "Best aggregate fitness since the last rollback")?,
            energy: Gauge::new("evofield_energy", "Mean total field energy")?,
            cpu_load: Gauge::new("evofield_cpu_load_percent", "Sampled CPU load")?,
            memory_load: Gauge::new("evofield_memory_load_percent", "Sampled memory load")?,
            stasis: IntGauge::new("evofield_stasis", "1 while the controller is in stasis")?,
            step_duration_seconds: Histogram::with_opts(
                HistogramOpts::new("evofield_step_duration_seconds", "Integration step duration")
                    .buckets(vec![0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.05, 0.1, 0.5]),
            )?,
            mutations_total: IntCounter::new("evofield_mutations_total", "Mutations applied, minimal ones included")?,
            rollbacks_total: IntCounter::new("evofield_rollbacks_total", "Checkpoint rollbacks")?,
            checkpoints_total: IntCounter::new("evofield_checkpoints_total", "Checkpoints created")?,
            overloads_total: IntCounter::new("evofield_overloads_total", "Debounced overload triggers")?,
        };
        telemetry.register()?;
        Ok(telemetry)
    }

    fn register(&self) -> prometheus::Result<()> {
        self.registry.register(Box::new(self.fitness.clone()))?;
        self.registry.register(Box::new(self.best_fitness.clone()))?;
        self.registry.register(Box::new(self.energy.clone()))?;
        self.registry.register(Box::new(self.cpu_load.clone()))?;
        self.registry.register(Box::new(self.memory_load.clone()))?;
        self.registry.register(Box::new(self.stasis.clone()))?;
        self.registry.register(Box::new(self.step_duration_seconds.clone()))?;
        self.registry.register(Box::new(self.mutations_total.clone()))?;
        self.registry.register(Box::new(self.rollbacks_total.clone()))?;
        self.registry.register(Box::new(self.checkpoints_total.clone()))?;
        self.registry.register(Box::new(self.overloads_total.clone()))?;
        Ok(())
    }

    /// Copy controller state into the gauges and catch the counters up
    pub fn observe_controller(&self, controller: &EvolutionController) {
        self.fitness.set(controller.metrics().aggregate);
        self.best_fitness.set(controller.best_fitness());
        self.stasis
            .set(i64::from(controller.phase() == EvolutionPhase::Stasis));

        let stats = controller.stats();
        catch_up(&self.mutations_total, stats.mutations_applied + stats.minimal_mutations);
        catch_up(&self.rollbacks_total, stats.rollbacks);
        catch_up(&self.checkpoints_total, stats.checkpoints_created);
    }

    pub fn observe_step(&self, duration: Duration, energy: f64) {
        self.step_duration_seconds.observe(duration.as_secs_f64());
        self.energy.set(energy);
    }

    /// Loads in percent
    pub fn observe_load(&self, cpu: f64, memory: f64) {
        self.cpu_load.set(cpu);
        self.memory_load.set(memory);
    }

    pub fn record_overload(&self) {
        self.overloads_total.inc();
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Text exposition format
    pub fn render(&self) -> prometheus::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

fn catch_up(counter: &IntCounter, total: u64) {
    let seen = counter.get();
    if total > seen {
        counter.inc_by(total - seen);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use evofield_common::{AuditLogger, ManualClock, SealedGate};
    use evofield_lattice::{FieldState, SimulationParameters};

    use super::*;
    use crate::checkpoint::MemoryCheckpointStore;
    use crate::fitness::FixedProbe;
    use crate::EvolutionConfig;

    #[test]
    fn test_render_lists_metrics() {
        let telemetry = Telemetry::new().unwrap();
        telemetry.observe_load(42.0, 10.0);
        telemetry.record_overload();

        let text = telemetry.render().unwrap();
        assert!(text.contains("evofield_cpu_load_percent 42"));
        assert!(text.contains("evofield_overloads_total 1"));
        assert!(text.contains("evofield_step_duration_seconds_bucket"));
    }

    #[test]
    fn test_counters_follow_controller() {
        let telemetry = Telemetry::new().unwrap();
        let mut controller = EvolutionController::new(
            EvolutionConfig::default(),
            Arc::new(SealedGate::default()),
            Arc::new(ManualClock::default()),
            Box::new(MemoryCheckpointStore::default()),
            Box::new(FixedProbe(None)),
        )
        .with_audit(AuditLogger::silent());
        let mut field = FieldState::new(SimulationParameters {
            side: 2,
            ..SimulationParameters::default()
        })
        .unwrap();
        field.initialize(7, 0.1, 0.02).unwrap();

        controller.evaluate_fitness(&mut field, Duration::ZERO);
        controller.propose_mutation(&mut field);
        telemetry.observe_controller(&controller);
        telemetry.observe_controller(&controller);

        let stats = controller.stats();
        assert_eq!(telemetry.mutations_total.get(), 1);
        assert_eq!(telemetry.checkpoints_total.get(), stats.checkpoints_created);
        assert_eq!(telemetry.stasis.get(), 0);
        assert_eq!(telemetry.fitness.get(), controller.metrics().aggregate);
    }
}
