//! Field state and symplectic integrator
//!
//! A square lattice of `N = side²` scalar nodes. Each node carries an
//! amplitude `phi` and a conjugate momentum `pi`; nodes interact through a
//! dense symmetric coupling matrix `W` with a zero diagonal.
//!
//! ## Hamiltonian
//!
//! ```text
//! H_i = 0.5·pi_i² + 0.5·m²·phi_i² + (lam/6)·phi_i³ + 0.5·Σ_j W_ij·(phi_i - phi_j)²
//! E   = mean_i H_i
//! ```
//!
//! The cubic self-interaction makes `E` sign-indefinite for large amplitudes.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, trace};

use evofield_common::WEIGHT_BOUND;

/// Number of nodes touched by a minimal mutation
pub const MINIMAL_MUTATION_NODES: usize = 5;

/// Magnitude below which low-power mode zeroes a value
pub const LOW_POWER_EPSILON: f64 = 0.01;

/// Field errors
#[derive(Debug, Error, PartialEq)]
pub enum FieldError {
    #[error("Lattice side must be positive")]
    EmptyLattice,

    #[error("Invalid parameter {name}: {value}")]
    InvalidParameter { name: &'static str, value: f64 },

    #[error("Snapshot holds {actual} nodes, lattice has {expected}")]
    SnapshotMismatch { expected: usize, actual: usize },

    #[error("Unknown mutation kind: {0}")]
    UnknownMutationKind(u8),
}

/// Immutable per-run constants
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimulationParameters {
    /// Lattice side length
    pub side: usize,
    /// Integration timestep
    pub dt: f64,
    /// Mass term `m`
    pub mass: f64,
    /// Cubic coupling constant `lam`
    pub coupling: f64,
}

impl Default for SimulationParameters {
    fn default() -> Self {
        Self {
            side: 20,
            dt: 0.001,
            mass: 1.0,
            coupling: 0.5,
        }
    }
}

impl SimulationParameters {
    /// Number of lattice nodes
    #[inline]
    pub fn node_count(&self) -> usize {
        self.side * self.side
    }

    /// Reject parameters the integrator cannot run with
    pub fn validate(&self) -> Result<(), FieldError> {
        if self.side == 0 {
            return Err(FieldError::EmptyLattice);
        }
        for (name, value) in [("dt", self.dt), ("mass", self.mass), ("coupling", self.coupling)] {
            if !value.is_finite() {
                return Err(FieldError::InvalidParameter { name, value });
            }
        }
        if self.dt <= 0.0 {
            return Err(FieldError::InvalidParameter {
                name: "dt",
                value: self.dt,
            });
        }
        Ok(())
    }
}

/// Structured perturbation applied by the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum MutationKind {
    /// Perturb every coupling, clamp to the weight bound, re-mirror
    Couplings = 0,
    /// Perturb every amplitude by a tenth of the draw
    Amplitudes = 1,
    /// Perturb a handful of random amplitudes by a hundredth of the draw
    Minimal = 2,
}

impl TryFrom<u8> for MutationKind {
    type Error = FieldError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Couplings),
            1 => Ok(Self::Amplitudes),
            2 => Ok(Self::Minimal),
            other => Err(FieldError::UnknownMutationKind(other)),
        }
    }
}

/// Serializable copy of the mutable field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSnapshot {
    pub params: SimulationParameters,
    pub phi: Vec<f64>,
    pub pi: Vec<f64>,
    /// Row-major `N×N` couplings
    pub weights: Vec<f64>,
}

/// Lattice state plus the integrator
pub struct FieldState {
    params: SimulationParameters,
    n: usize,
    phi: Vec<f64>,
    pi: Vec<f64>,
    /// Row-major `N×N`
    weights: Vec<f64>,
    /// Force scratch buffer, reused every step
    dh: Vec<f64>,
    rng: StdRng,
}

impl FieldState {
    /// Allocate a zeroed lattice
    pub fn new(params: SimulationParameters) -> Result<Self, FieldError> {
        params.validate()?;
        let n = params.node_count();
        Ok(Self {
            params,
            n,
            phi: vec![0.0; n],
            pi: vec![0.0; n],
            weights: vec![0.0; n * n],
            dh: vec![0.0; n],
            rng: StdRng::seed_from_u64(0),
        })
    }

    /// Draw amplitudes and couplings from the seeded generator
    ///
    /// Momenta are reset to zero. Draws follow row order: `phi[i]` first, then
    /// the couplings `W[i][j]` for `j > i`.
    pub fn initialize(
        &mut self,
        seed: u64,
        phi_range: f64,
        weight_range: f64,
    ) -> Result<(), FieldError> {
        for (name, value) in [("phi_range", phi_range), ("weight_range", weight_range)] {
            if !value.is_finite() || value < 0.0 {
                return Err(FieldError::InvalidParameter { name, value });
            }
        }

        self.rng = StdRng::seed_from_u64(seed);
        self.pi.fill(0.0);
        self.weights.fill(0.0);

        let n = self.n;
        for i in 0..n {
            self.phi[i] = uniform(&mut self.rng, phi_range);
            for j in (i + 1)..n {
                let w = uniform(&mut self.rng, weight_range);
                self.weights[i * n + j] = w;
                self.weights[j * n + i] = w;
            }
        }

        debug!(seed, nodes = n, phi_range, weight_range, "Field initialized");
        Ok(())
    }

    /// Advance one symplectic-Euler step
    ///
    /// Amplitudes move with the pre-step momenta, then momenta are kicked by
    /// the force evaluated at the new amplitudes.
    pub fn step(&mut self) {
        let dt = self.params.dt;

        for (phi, pi) in self.phi.iter_mut().zip(&self.pi) {
            *phi += dt * pi;
        }

        self.compute_forces();

        for (pi, dh) in self.pi.iter_mut().zip(&self.dh) {
            *pi -= dt * dh;
        }
    }

    fn compute_forces(&mut self) {
        let n = self.n;
        let m2 = self.params.mass * self.params.mass;
        let lam = self.params.coupling;

        for i in 0..n {
            let phi_i = self.phi[i];
            let row = &self.weights[i * n..(i + 1) * n];
            let interaction: f64 = row
                .iter()
                .zip(&self.phi)
                .map(|(w, phi_j)| w * (phi_i - phi_j))
                .sum();
            self.dh[i] = m2 * phi_i + 0.5 * lam * phi_i * phi_i + interaction;
        }
    }

    /// Mean per-node energy
    pub fn total_energy(&self) -> f64 {
        let n = self.n;
        let m2 = self.params.mass * self.params.mass;
        let lam = self.params.coupling;

        let total: f64 = (0..n)
            .map(|i| {
                let phi_i = self.phi[i];
                let pi_i = self.pi[i];
                let potential = 0.5 * m2 * phi_i * phi_i + (lam / 6.0) * phi_i * phi_i * phi_i;
                let interaction: f64 = self.weights[i * n..(i + 1) * n]
                    .iter()
                    .zip(&self.phi)
                    .map(|(w, phi_j)| {
                        let d = phi_i - phi_j;
                        0.5 * w * d * d
                    })
                    .sum();
                0.5 * pi_i * pi_i + potential + interaction
            })
            .sum();

        total / n as f64
    }

    /// Apply a structured perturbation of the given strength
    pub fn apply_mutation(&mut self, strength: f64, kind: MutationKind) {
        let n = self.n;
        match kind {
            MutationKind::Couplings => {
                for i in 0..n {
                    for j in (i + 1)..n {
                        let w = (self.weights[i * n + j] + uniform(&mut self.rng, strength))
                            .clamp(-WEIGHT_BOUND, WEIGHT_BOUND);
                        self.weights[i * n + j] = w;
                        self.weights[j * n + i] = w;
                    }
                }
            }
            MutationKind::Amplitudes => {
                for phi in self.phi.iter_mut() {
                    *phi += 0.1 * uniform(&mut self.rng, strength);
                }
            }
            MutationKind::Minimal => {
                for _ in 0..MINIMAL_MUTATION_NODES.min(n) {
                    let idx = self.rng.gen_range(0..n);
                    self.phi[idx] += 0.01 * uniform(&mut self.rng, strength);
                }
            }
        }
        debug!(?kind, strength, "Mutation applied");
    }

    /// Zero every amplitude and momentum below [`LOW_POWER_EPSILON`]
    pub fn enter_low_power(&mut self) {
        let mut zeroed = 0usize;
        for value in self.phi.iter_mut().chain(self.pi.iter_mut()) {
            if value.abs() < LOW_POWER_EPSILON && *value != 0.0 {
                *value = 0.0;
                zeroed += 1;
            }
        }
        trace!(zeroed, "Low-power mode entered");
    }

    pub fn params(&self) -> &SimulationParameters {
        &self.params
    }

    #[inline]
    pub fn node_count(&self) -> usize {
        self.n
    }

    pub fn phi(&self) -> &[f64] {
        &self.phi
    }

    pub fn phi_mut(&mut self) -> &mut [f64] {
        &mut self.phi
    }

    pub fn pi(&self) -> &[f64] {
        &self.pi
    }

    pub fn pi_mut(&mut self) -> &mut [f64] {
        &mut self.pi
    }

    /// Amplitudes and momenta borrowed together
    pub fn phase_space_mut(&mut self) -> (&mut [f64], &mut [f64]) {
        (&mut self.phi, &mut self.pi)
    }

    /// Row-major couplings
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Amplitudes read-only, couplings writable
    pub fn couplings_mut(&mut self) -> (&[f64], &mut [f64]) {
        (&self.phi, &mut self.weights)
    }

    #[inline]
    pub fn weight(&self, i: usize, j: usize) -> f64 {
        self.weights[i * self.n + j]
    }

    /// Set `W[i][j]` and its mirror. Diagonal writes are ignored.
    pub fn set_weight(&mut self, i: usize, j: usize, value: f64) {
        if i == j {
            return;
        }
        self.weights[i * self.n + j] = value;
        self.weights[j * self.n + i] = value;
    }

    /// Copy the mutable state
    pub fn snapshot(&self) -> FieldSnapshot {
        FieldSnapshot {
            params: self.params,
            phi: self.phi.clone(),
            pi: self.pi.clone(),
            weights: self.weights.clone(),
        }
    }

    /// Overwrite the mutable state from a snapshot of the same lattice
    pub fn restore(&mut self, snapshot: &FieldSnapshot) -> Result<(), FieldError> {
        let n = self.n;
        if snapshot.phi.len() != n || snapshot.pi.len() != n {
            return Err(FieldError::SnapshotMismatch {
                expected: n,
                actual: snapshot.phi.len().max(snapshot.pi.len()),
            });
        }
        if snapshot.weights.len() != n * n {
            return Err(FieldError::SnapshotMismatch {
                expected: n * n,
                actual: snapshot.weights.len(),
            });
        }

        self.phi.copy_from_slice(&snapshot.phi);
        self.pi.copy_from_slice(&snapshot.pi);
        self.weights.copy_from_slice(&snapshot.weights);
        debug!(nodes = n, "Field restored from snapshot");
        Ok(())
    }
}

/// Draw from `U[-half_width, half_width]`; a non-positive width yields zero
fn uniform(rng: &mut StdRng, half_width: f64) -> f64 {
    if half_width > 0.0 && half_width.is_finite() {
        rng.gen_range(-half_width..=half_width)
    } else {
        0.0
    }
}
