//! Evolution controller
//!
//! Owns fitness bookkeeping, the mutation rate limiter, the Active/Stasis state
//! machine and the checkpoint store. Every mutation it issues while Active goes
//! through the admission gate first; a denial sends the controller into stasis.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use evofield_common::security::gate::ACTION_SYSTEM_MUTATION;
use evofield_common::security::ThrottleDenial;
use evofield_common::{
    AuditLogger, FitnessMetrics, SharedClock, SharedGate, Throttle, ThrottleRule,
};
use evofield_lattice::{FieldState, MutationKind};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

use super::optimizer::{ParameterDelta, SelfOptimizer};
use crate::checkpoint::{CheckpointRequest, CheckpointStore};
use crate::degradation::{DegradationPolicy, Verdict};
use crate::dump::{compress_weights, DumpError, DumpRecord, EvolutionReport};
use crate::fitness::{ArtifactProbe, FitnessCalculator};
use crate::EvolutionConfig;

const ACTOR: &str = "evolution_controller";

/// Pending proposals kept when nobody drains them
const MAX_PENDING_PROPOSALS: usize = 64;

/// Controller state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvolutionPhase {
    /// Normal operation, mutations go through the limiter and the gate
    Active,
    /// Low-power holding pattern after a gate denial
    Stasis,
}

impl fmt::Display for EvolutionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvolutionPhase::Active => write!(f, "active"),
            EvolutionPhase::Stasis => write!(f, "stasis"),
        }
    }
}

/// Result of [`EvolutionController::propose_mutation`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationOutcome {
    /// Stasis-mode minimal mutation
    Minimal,
    /// Coupling mutation applied
    Applied,
    /// Limiter refused; nothing changed
    RateLimited(ThrottleDenial),
    /// Gate refused; the controller is now in stasis
    Denied,
}

impl MutationOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(self, MutationOutcome::Minimal | MutationOutcome::Applied)
    }
}

/// Running totals, exported through telemetry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerStats {
    pub mutations_applied: u64,
    pub minimal_mutations: u64,
    pub rate_limited: u64,
    pub gate_denials: u64,
    pub checkpoints_created: u64,
    pub checkpoint_failures: u64,
    pub rollbacks: u64,
    pub rollback_failures: u64,
    pub optimization_passes: u64,
    pub stasis_entries: u64,
}

pub struct EvolutionController {
    config: EvolutionConfig,
    gate: SharedGate,
    clock: SharedClock,
    store: Box<dyn CheckpointStore>,
    probe: Box<dyn ArtifactProbe>,
    audit: AuditLogger,
    calculator: FitnessCalculator,
    degradation: DegradationPolicy,
    optimizer: SelfOptimizer,
    limiter: Throttle,
    phase: EvolutionPhase,
    metrics: FitnessMetrics,
    best_fitness: f64,
    history: Vec<FitnessMetrics>,
    evaluations: u64,
    proposals: Vec<ParameterDelta>,
    stats: ControllerStats,
}

impl EvolutionController {
    pub fn new(
        config: EvolutionConfig,
        gate: SharedGate,
        clock: SharedClock,
        store: Box<dyn CheckpointStore>,
        probe: Box<dyn ArtifactProbe>,
    ) -> Self {
        let limiter = Throttle::new(ThrottleRule::per_minute(
            "mutation",
            Duration::from_secs(config.reduction_cooldown_seconds),
            config.max_reductions_per_minute,
        ));

        info!(
            cooldown_secs = config.reduction_cooldown_seconds,
            max_per_minute = config.max_reductions_per_minute,
            min_fitness = config.min_fitness_for_optimization,
            "Evolution controller initialized"
        );

        Self {
            calculator: FitnessCalculator::new(config.targets),
            degradation: config.degradation.clone(),
            optimizer: SelfOptimizer::new(config.min_fitness_for_optimization),
            config,
            gate,
            clock,
            store,
            probe,
            audit: AuditLogger::new(),
            limiter,
            phase: EvolutionPhase::Active,
            metrics: FitnessMetrics::default(),
            best_fitness: 0.0,
            history: Vec::new(),
            evaluations: 0,
            proposals: Vec::new(),
            stats: ControllerStats::default(),
        }
    }

    /// Replace the audit logger
    pub fn with_audit(mut self, audit: AuditLogger) -> Self {
        self.audit = audit;
        self
    }

    /// Score the field after one step and run the periodic bookkeeping
    ///
    /// Returns the metrics of this evaluation, even when a rollback reset the
    /// controller's current metrics afterwards.
    #[instrument(skip(self, field), fields(evaluation = self.evaluations + 1))]
    pub fn evaluate_fitness(
        &mut self,
        field: &mut FieldState,
        step_duration: Duration,
    ) -> FitnessMetrics {
        let energy = field.total_energy();
        let metrics = self
            .calculator
            .calculate(self.probe.total_size(), step_duration, energy);
        self.metrics = metrics;

        if metrics.aggregate > self.best_fitness {
            debug!(
                previous = self.best_fitness,
                best = metrics.aggregate,
                "New best fitness"
            );
            self.best_fitness = metrics.aggregate;
            self.create_checkpoint(field);
        }

        self.history.push(metrics);
        if let Some(limit) = self.config.history_limit {
            let limit = limit.max(1);
            if self.history.len() > limit {
                let excess = self.history.len() - limit;
                self.history.drain(..excess);
            }
        }
        self.evaluations += 1;

        let n = self.evaluations;
        if every(n, self.config.degradation_check_interval) {
            self.check_degradation(field);
        }
        if every(n, self.config.optimization_interval) && self.phase == EvolutionPhase::Active {
            self.self_optimize(field);
        }
        if every(n, self.config.stasis_upkeep_interval) && self.phase == EvolutionPhase::Stasis {
            let delta = self.optimizer.minimal(n);
            debug!(evaluation = n, "Stasis upkeep delta issued");
            self.push_proposal(delta);
        }

        metrics
    }

    /// Attempt a mutation
    ///
    /// In stasis this is always a minimal amplitude nudge. While Active the
    /// limiter and then the gate must both admit it.
    #[instrument(skip(self, field), fields(phase = %self.phase))]
    pub fn propose_mutation(&mut self, field: &mut FieldState) -> MutationOutcome {
        if self.phase == EvolutionPhase::Stasis {
            field.apply_mutation(self.config.stasis_mutation_strength, MutationKind::Minimal);
            self.stats.minimal_mutations += 1;
            self.audit
                .log_mutation(ACTOR, "minimal", self.config.stasis_mutation_strength);
            debug!(
                strength = self.config.stasis_mutation_strength,
                "Minimal mutation applied"
            );
            return MutationOutcome::Minimal;
        }

        let now = self.clock.elapsed();
        if let Err(denial) = self.limiter.check(now) {
            self.stats.rate_limited += 1;
            debug!(%denial, "Mutation rate limited");
            return MutationOutcome::RateLimited(denial);
        }

        if !self.create_checkpoint(field) {
            warn!("Mutating without a fresh checkpoint");
        }

        if !self.gate.request_permission(ACTION_SYSTEM_MUTATION) {
            self.stats.gate_denials += 1;
            warn!("Mutation denied by admission gate");
            self.enter_stasis(field);
            return MutationOutcome::Denied;
        }

        field.apply_mutation(self.config.mutation_strength, MutationKind::Couplings);
        self.audit
            .log_mutation(ACTOR, "couplings", self.config.mutation_strength);
        self.optimizer.log_pressure(&self.metrics);
        self.self_optimize(field);
        self.limiter.record(now);
        self.stats.mutations_applied += 1;

        info!(
            strength = self.config.mutation_strength,
            in_window = self.limiter.count_in_window(),
            "Mutation applied"
        );
        MutationOutcome::Applied
    }

    /// Switch to stasis, drop the field into low power and persist the state report
    pub fn enter_stasis(&mut self, field: &mut FieldState) {
        let from = self.phase;
        self.phase = EvolutionPhase::Stasis;
        field.enter_low_power();

        if from != EvolutionPhase::Stasis {
            self.stats.stasis_entries += 1;
            self.audit
                .log_state_transition(ACTOR, &from.to_string(), &self.phase.to_string());
            warn!(evaluations = self.evaluations, "Entered stasis");
        }

        if let Some(path) = &self.config.state_report_path {
            match self.report().write_to(path) {
                Ok(()) => debug!(path = %path.display(), "State report written"),
                Err(e) => warn!(path = %path.display(), error = %e, "State report not written"),
            }
        }
    }

    /// Return to Active unconditionally
    pub fn exit_stasis(&mut self) {
        if self.phase == EvolutionPhase::Active {
            return;
        }
        self.phase = EvolutionPhase::Active;
        self.audit.log_state_transition(
            ACTOR,
            &EvolutionPhase::Stasis.to_string(),
            &self.phase.to_string(),
        );
        info!(evaluations = self.evaluations, "Exited stasis");
    }

    /// Persist the current field; false on storage failure
    pub fn create_checkpoint(&mut self, field: &FieldState) -> bool {
        let snapshot = field.snapshot();
        let artifacts = self.probe.artifacts();
        let request = CheckpointRequest {
            timestamp: self.clock.unix_seconds(),
            fitness: self.metrics.aggregate,
            step_count: self.evaluations,
            snapshot: &snapshot,
            artifacts: &artifacts,
        };

        match self.store.create(request) {
            Ok(checkpoint) => {
                self.stats.checkpoints_created += 1;
                self.audit
                    .log_checkpoint(ACTOR, "create", true, Some(&checkpoint.hash));
                info!(
                    index = checkpoint.index,
                    name = %checkpoint.name,
                    fitness = checkpoint.fitness,
                    "Checkpoint created"
                );
                true
            }
            Err(e) => {
                self.stats.checkpoint_failures += 1;
                self.audit.log_checkpoint(ACTOR, "create", false, None);
                error!(error = %e, "Checkpoint creation failed");
                false
            }
        }
    }

    /// Restore the latest checkpoint and reset best/current fitness
    ///
    /// Leaves the field untouched and returns false when there is nothing to
    /// restore or the restore fails.
    pub fn rollback(&mut self, field: &mut FieldState) -> bool {
        let Some(latest) = self.store.latest() else {
            self.stats.rollback_failures += 1;
            self.audit.log_checkpoint(ACTOR, "rollback", false, None);
            warn!("No checkpoint to roll back to");
            return false;
        };
        let index = latest.index;
        let hash = latest.hash.clone();

        let snapshot = match self.store.load(index) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.stats.rollback_failures += 1;
                self.audit.log_checkpoint(ACTOR, "rollback", false, Some(&hash));
                error!(index, error = %e, "Checkpoint load failed");
                return false;
            }
        };
        if let Err(e) = field.restore(&snapshot) {
            self.stats.rollback_failures += 1;
            self.audit.log_checkpoint(ACTOR, "rollback", false, Some(&hash));
            error!(index, error = %e, "Checkpoint restore failed");
            return false;
        }

        self.best_fitness = 0.0;
        self.metrics = FitnessMetrics::default();
        self.stats.rollbacks += 1;
        self.audit.log_checkpoint(ACTOR, "rollback", true, Some(&hash));
        warn!(index, "Rolled back to checkpoint");
        true
    }

    /// Propose parameter changes when fitness is below the threshold
    pub fn self_optimize(&mut self, field: &FieldState) -> Option<ParameterDelta> {
        if !self.optimizer.should_optimize(&self.metrics) {
            debug!(
                aggregate = self.metrics.aggregate,
                "Fitness above threshold, optimization skipped"
            );
            return None;
        }
        if !self.create_checkpoint(field) {
            warn!("Optimization aborted: no checkpoint");
            return None;
        }

        let delta = self.optimizer.propose(&self.metrics, self.evaluations);
        self.stats.optimization_passes += 1;
        self.optimizer.validate_improvement(&self.history);
        self.push_proposal(delta.clone());
        Some(delta)
    }

    fn check_degradation(&mut self, field: &mut FieldState) -> Verdict {
        let verdict =
            self.degradation
                .assess(&self.history, self.metrics.aggregate, self.best_fitness);
        match verdict {
            Verdict::Healthy => debug!(
                aggregate = self.metrics.aggregate,
                best = self.best_fitness,
                "Fitness healthy"
            ),
            Verdict::Degraded => warn!(
                aggregate = self.metrics.aggregate,
                best = self.best_fitness,
                "Fitness trend degraded"
            ),
            Verdict::Rollback => {
                warn!(
                    aggregate = self.metrics.aggregate,
                    best = self.best_fitness,
                    "Fitness collapsed, rolling back"
                );
                self.rollback(field);
            }
        }
        verdict
    }

    fn push_proposal(&mut self, delta: ParameterDelta) {
        if self.proposals.len() >= MAX_PENDING_PROPOSALS {
            self.proposals.remove(0);
        }
        self.proposals.push(delta);
    }

    /// Text report of the current state
    pub fn report(&self) -> EvolutionReport {
        EvolutionReport {
            generation: self.evaluations / 1000,
            current: self.metrics,
            best_fitness: self.best_fitness,
            total_steps: self.evaluations,
            checkpoint_dir: self.store.location().map(Path::to_path_buf),
        }
    }

    /// Binary dump record of the controller and field
    pub fn dump_record(&self, field: &FieldState) -> Result<DumpRecord, DumpError> {
        Ok(DumpRecord {
            generation: self.evaluations / 1000,
            metrics: self.metrics,
            energy_state: field.total_energy(),
            code_hash: self.store.latest().map(|c| c.code_hash()).unwrap_or(0),
            weights: compress_weights(field.weights(), field.node_count())?,
        })
    }

    /// Drain pending parameter proposals
    pub fn take_proposals(&mut self) -> Vec<ParameterDelta> {
        std::mem::take(&mut self.proposals)
    }

    pub fn phase(&self) -> EvolutionPhase {
        self.phase
    }

    pub fn is_in_stasis(&self) -> bool {
        self.phase == EvolutionPhase::Stasis
    }

    pub fn metrics(&self) -> &FitnessMetrics {
        &self.metrics
    }

    pub fn best_fitness(&self) -> f64 {
        self.best_fitness
    }

    pub fn history(&self) -> &[FitnessMetrics] {
        &self.history
    }

    pub fn evaluations(&self) -> u64 {
        self.evaluations
    }

    pub fn stats(&self) -> &ControllerStats {
        &self.stats
    }

    pub fn proposals(&self) -> &[ParameterDelta] {
        &self.proposals
    }

    pub fn store(&self) -> &dyn CheckpointStore {
        self.store.as_ref()
    }

    pub fn config(&self) -> &EvolutionConfig {
        &self.config
    }
}

fn every(n: u64, interval: u64) -> bool {
    interval > 0 && n % interval == 0
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use evofield_common::security::{AuditCategory, GateConfig, MemoryAuditSink};
    use evofield_common::{AdmissionGate, InvariantViolation, ManualClock, SealedGate};
    use evofield_lattice::SimulationParameters;
    use mockall::mock;

    use super::*;
    use crate::checkpoint::MemoryCheckpointStore;
    use crate::controller::DeltaReason;
    use crate::fitness::FixedProbe;

    mock! {
        pub Gate {}

        impl AdmissionGate for Gate {
            fn request_permission(&self, action: &str) -> bool;
            fn validate_energy(&self, energy: f64) -> Result<(), InvariantViolation>;
        }
    }

    fn open_gate() -> SharedGate {
        Arc::new(SealedGate::new(GateConfig::default(), AuditLogger::silent()))
    }

    fn controller_with(
        config: EvolutionConfig,
        gate: SharedGate,
        clock: &ManualClock,
    ) -> EvolutionController {
        EvolutionController::new(
            config,
            gate,
            Arc::new(clock.clone()),
            Box::new(MemoryCheckpointStore::default()),
            Box::new(FixedProbe(Some(0))),
        )
        .with_audit(AuditLogger::silent())
    }

    fn controller(clock: &ManualClock) -> EvolutionController {
        controller_with(EvolutionConfig::default(), open_gate(), clock)
    }

    fn field() -> FieldState {
        let mut field = FieldState::new(SimulationParameters {
            side: 4,
            ..SimulationParameters::default()
        })
        .unwrap();
        field.initialize(42, 0.1, 0.02).unwrap();
        field
    }

    #[test]
    fn test_cooldown_blocks_second_mutation() {
        let clock = ManualClock::default();
        let mut controller = controller(&clock);
        let mut field = field();

        assert_eq!(controller.propose_mutation(&mut field), MutationOutcome::Applied);

        clock.advance(Duration::from_secs(10));
        let before = field.snapshot();
        let outcome = controller.propose_mutation(&mut field);

        assert!(matches!(
            outcome,
            MutationOutcome::RateLimited(ThrottleDenial::Cooldown { .. })
        ));
        assert!(!outcome.succeeded());
        assert_eq!(field.snapshot(), before);
        assert_eq!(controller.stats().rate_limited, 1);
    }

    #[test]
    fn test_window_cap_blocks_third_mutation() {
        let clock = ManualClock::default();
        let config = EvolutionConfig {
            reduction_cooldown_seconds: 10,
            ..EvolutionConfig::default()
        };
        let mut controller = controller_with(config, open_gate(), &clock);
        let mut field = field();

        assert!(controller.propose_mutation(&mut field).succeeded());
        clock.set(Duration::from_secs(20));
        assert!(controller.propose_mutation(&mut field).succeeded());
        clock.set(Duration::from_secs(40));
        assert_eq!(
            controller.propose_mutation(&mut field),
            MutationOutcome::RateLimited(ThrottleDenial::WindowCap { count: 2, max: 2 })
        );

        // Window opened at t=0 and rolls over at t=60
        clock.set(Duration::from_secs(60));
        assert_eq!(controller.propose_mutation(&mut field), MutationOutcome::Applied);
        assert_eq!(controller.stats().mutations_applied, 3);
    }

    #[test]
    fn test_applied_mutation_keeps_couplings_bounded() {
        let clock = ManualClock::default();
        let mut controller = controller(&clock);
        let mut field = field();

        for _ in 0..5 {
            controller.propose_mutation(&mut field);
            clock.advance(Duration::from_secs(61));
        }

        let n = field.node_count();
        for i in 0..n {
            assert_eq!(field.weight(i, i), 0.0);
            for j in 0..n {
                assert_eq!(field.weight(i, j), field.weight(j, i));
                assert!(field.weight(i, j).abs() <= 0.1);
            }
        }
    }

    #[test]
    fn test_gate_denial_enters_stasis() {
        let clock = ManualClock::default();
        let mut gate = MockGate::new();
        gate.expect_request_permission()
            .withf(|action| action == ACTION_SYSTEM_MUTATION)
            .times(1)
            .return_const(false);
        let mut controller = controller_with(EvolutionConfig::default(), Arc::new(gate), &clock);
        let mut field = field();
        let weights = field.weights().to_vec();

        assert_eq!(controller.propose_mutation(&mut field), MutationOutcome::Denied);
        assert!(controller.is_in_stasis());
        assert_eq!(field.weights(), weights.as_slice());
        assert_eq!(controller.stats().gate_denials, 1);
        assert_eq!(controller.stats().stasis_entries, 1);

        // Stasis never consults the gate again
        assert_eq!(controller.propose_mutation(&mut field), MutationOutcome::Minimal);
    }

    #[test]
    fn test_stasis_mutation_is_minimal() {
        let clock = ManualClock::default();
        let mut controller = controller(&clock);
        let mut field = field();
        controller.enter_stasis(&mut field);

        for _ in 0..20 {
            let before = field.phi().to_vec();
            assert_eq!(controller.propose_mutation(&mut field), MutationOutcome::Minimal);

            let changed: Vec<f64> = before
                .iter()
                .zip(field.phi())
                .map(|(a, b)| (b - a).abs())
                .filter(|d| *d > 0.0)
                .collect();
            assert!(changed.len() <= 5);
            assert!(changed.iter().all(|d| *d <= 0.01));
        }
    }

    #[test]
    fn test_exit_stasis() {
        let clock = ManualClock::default();
        let mut controller = controller(&clock);
        let mut field = field();

        controller.enter_stasis(&mut field);
        assert_eq!(controller.phase(), EvolutionPhase::Stasis);
        controller.exit_stasis();
        assert_eq!(controller.phase(), EvolutionPhase::Active);
    }

    #[test]
    fn test_enter_stasis_writes_report() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("evolution_state.txt");
        let clock = ManualClock::default();
        let config = EvolutionConfig {
            state_report_path: Some(path.clone()),
            ..EvolutionConfig::default()
        };
        let mut controller = controller_with(config, open_gate(), &clock);
        let mut field = field();

        controller.enter_stasis(&mut field);

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("Evolution State - Generation: 0"));
    }

    #[test]
    fn test_improvement_creates_checkpoint() {
        let clock = ManualClock::default();
        let mut controller = controller(&clock);
        let mut field = field();

        let first = controller.evaluate_fitness(&mut field, Duration::from_micros(10));
        assert_eq!(controller.best_fitness(), first.aggregate);
        assert_eq!(controller.store().checkpoints().len(), 1);

        // Same score is not an improvement
        controller.evaluate_fitness(&mut field, Duration::from_micros(10));
        assert_eq!(controller.store().checkpoints().len(), 1);
        assert_eq!(controller.evaluations(), 2);
        assert_eq!(controller.history().len(), 2);
    }

    #[test]
    fn test_rollback_without_checkpoint() {
        let clock = ManualClock::default();
        let mut controller = controller(&clock);
        let mut field = field();
        let before = field.snapshot();

        assert!(!controller.rollback(&mut field));
        assert_eq!(field.snapshot(), before);
        assert_eq!(controller.stats().rollback_failures, 1);
    }

    #[test]
    fn test_rollback_restores_latest_checkpoint() {
        let clock = ManualClock::default();
        let mut controller = controller(&clock);
        let mut field = field();

        controller.evaluate_fitness(&mut field, Duration::ZERO);
        let saved = field.snapshot();
        field.apply_mutation(1.0, MutationKind::Amplitudes);
        assert_ne!(field.snapshot(), saved);

        assert!(controller.rollback(&mut field));
        assert_eq!(field.snapshot(), saved);
        assert_eq!(controller.best_fitness(), 0.0);
        assert_eq!(*controller.metrics(), FitnessMetrics::default());
    }

    #[test]
    fn test_diverged_field_keeps_last_good_checkpoint() {
        let clock = ManualClock::default();
        let mut controller = controller(&clock);
        let mut field = field();

        controller.evaluate_fitness(&mut field, Duration::ZERO);
        let saved = field.snapshot();
        let good = controller.store().latest().map(|c| c.index);

        field.phi_mut()[0] = f64::INFINITY;
        assert!(!controller.create_checkpoint(&field));
        assert_eq!(controller.stats().checkpoint_failures, 1);
        assert_eq!(controller.store().latest().map(|c| c.index), good);

        assert!(controller.rollback(&mut field));
        assert_eq!(field.snapshot(), saved);
    }

    #[test]
    fn test_history_keeps_every_evaluation() {
        let clock = ManualClock::default();
        let mut controller = controller(&clock);
        let mut field = field();

        for _ in 0..1500 {
            controller.evaluate_fitness(&mut field, Duration::ZERO);
        }

        assert_eq!(controller.evaluations(), 1500);
        assert_eq!(controller.history().len(), 1500);
    }

    #[test]
    fn test_history_limit_is_opt_in() {
        let clock = ManualClock::default();
        let config = EvolutionConfig {
            history_limit: Some(100),
            ..EvolutionConfig::default()
        };
        let mut controller = controller_with(config, open_gate(), &clock);
        let mut field = field();

        for _ in 0..250 {
            controller.evaluate_fitness(&mut field, Duration::ZERO);
        }

        assert_eq!(controller.evaluations(), 250);
        assert_eq!(controller.history().len(), 100);
    }

    #[test]
    fn test_mutations_reach_audit_trail() {
        let clock = ManualClock::default();
        let sink = MemoryAuditSink::new();
        let mut controller = controller(&clock)
            .with_audit(AuditLogger::silent().with_sink(Box::new(sink.clone())));
        let mut field = field();

        assert_eq!(controller.propose_mutation(&mut field), MutationOutcome::Applied);
        controller.enter_stasis(&mut field);
        assert_eq!(controller.propose_mutation(&mut field), MutationOutcome::Minimal);

        let actions: Vec<String> = sink
            .events()
            .into_iter()
            .filter(|e| e.category == AuditCategory::Mutation)
            .map(|e| e.action)
            .collect();
        assert_eq!(actions, vec!["couplings".to_string(), "minimal".to_string()]);
    }

    #[test]
    fn test_collapse_at_degradation_check_rolls_back() {
        let clock = ManualClock::default();
        let mut controller = controller(&clock);
        let mut field = field();

        let saved = field.snapshot();
        for _ in 0..499 {
            controller.evaluate_fitness(&mut field, Duration::ZERO);
        }
        assert_eq!(controller.store().checkpoints().len(), 1);
        assert_eq!(controller.stats().rollbacks, 0);

        field.apply_mutation(0.001, MutationKind::Minimal);
        assert_ne!(field.snapshot(), saved);

        // A one-second step collapses the performance score
        controller.evaluate_fitness(&mut field, Duration::from_secs(1));

        assert_eq!(controller.stats().rollbacks, 1);
        assert_eq!(field.snapshot(), saved);
        assert_eq!(controller.best_fitness(), 0.0);
    }

    #[test]
    fn test_optimization_runs_every_thousand_evaluations() {
        let clock = ManualClock::default();
        let mut controller = controller(&clock);
        let mut field = field();

        for _ in 0..999 {
            controller.evaluate_fitness(&mut field, Duration::from_secs(1));
        }
        assert!(controller.proposals().is_empty());

        controller.evaluate_fitness(&mut field, Duration::from_secs(1));
        let proposals = controller.take_proposals();
        assert_eq!(proposals.len(), 1);
        assert!(proposals[0].reasons.contains(&DeltaReason::LowPerformance));
        assert_eq!(proposals[0].evaluation, 1000);
        assert_eq!(controller.stats().optimization_passes, 1);
        assert!(controller.proposals().is_empty());
    }

    #[test]
    fn test_stasis_upkeep_every_two_thousand_evaluations() {
        let clock = ManualClock::default();
        let mut controller = controller(&clock);
        let mut field = field();
        controller.enter_stasis(&mut field);

        for _ in 0..2000 {
            controller.evaluate_fitness(&mut field, Duration::from_secs(1));
        }

        let proposals = controller.take_proposals();
        assert_eq!(proposals.len(), 1);
        assert_eq!(proposals[0].reasons, vec![DeltaReason::StasisUpkeep]);
        assert_eq!(controller.stats().optimization_passes, 0);
    }

    #[test]
    fn test_dump_record_matches_state() {
        let clock = ManualClock::default();
        let mut controller = controller(&clock);
        let mut field = field();
        controller.evaluate_fitness(&mut field, Duration::ZERO);

        let record = controller.dump_record(&field).unwrap();
        let n = field.node_count();
        assert_eq!(record.weights.len(), n * (n + 1) / 2);
        assert_eq!(record.metrics, *controller.metrics());
        assert_eq!(
            record.code_hash,
            controller.store().latest().unwrap().code_hash()
        );
        assert_ne!(record.code_hash, 0);
    }
}
