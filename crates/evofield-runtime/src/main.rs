//! Evofield runtime binary
//!
//! Runs the tick loop until Ctrl-C or `runtime.max_steps`, then writes the state
//! report and the binary dump.

use anyhow::Result;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use evofield_runtime::{Simulation, SystemConfig, RUNTIME_VERSION};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    info!("Starting evofield runtime v{}", RUNTIME_VERSION);

    let config = SystemConfig::load()?;
    info!(
        side = config.simulation.side,
        seed = config.simulation.seed,
        max_steps = config.runtime.max_steps,
        checkpoints = %config.checkpoints.directory.display(),
        "Loaded configuration"
    );

    let mut simulation = Simulation::new(config)?;

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    let result = simulation.run(shutdown).await;
    simulation.write_outputs();

    let summary = result?;
    info!(
        ticks = summary.ticks,
        phase = %summary.phase,
        fitness = summary.metrics.aggregate,
        best_fitness = summary.best_fitness,
        energy = summary.energy,
        checkpoints = summary.checkpoints,
        mutations = summary.stats.mutations_applied,
        rollbacks = summary.stats.rollbacks,
        "Run finished"
    );
    info!("Summary: {}", serde_json::to_string(&summary)?);

    Ok(())
}
