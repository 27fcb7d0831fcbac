//! Terminal runner for the Afterhours chat simulation.
//!
//! Wires the simulation core to real collaborators and a stdin/stdout
//! front end:
//!
//! ```text
//! stdin --> Terminal --> Simulation --> ChatBackend (templates + HTTP LLM)
//!                            |      \-> JsonlStore (per-target JSON Lines)
//!                            |      \-> BuiltinBot (!help, !roll, ...)
//!                            \--> SimEvents --> stdout
//! ```
//!
//! Logs go to stderr so they never interleave with chat output.

mod bot;
mod config;
mod error;
mod frontend;
mod llm;
mod prompt;
mod store;

use std::sync::Arc;

use afterhours_core::{Collaborators, SeededRandom, Simulation, SimulationConfig};
use afterhours_types::Target;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::bot::BuiltinBot;
use crate::config::RunnerConfig;
use crate::frontend::Terminal;
use crate::llm::{ChatBackend, create_backend};
use crate::prompt::PromptEngine;
use crate::store::JsonlStore;

/// Application entry point.
///
/// Initializes logging, loads the environment and YAML configuration,
/// restores the last snapshot, starts the scheduler, then hands control to
/// the terminal until the user quits. The state is snapshotted on exit.
///
/// # Errors
///
/// Returns an error if initialization fails or the terminal loses stdin.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    info!("afterhours-runner starting");

    let runner = RunnerConfig::from_env()?;
    let mut config = SimulationConfig::from_file(&runner.config_path)?;
    if let Some(model) = &runner.backend.model {
        config.model_id.clone_from(model);
    }
    info!(
        config = %runner.config_path.display(),
        templates_dir = runner.templates_dir,
        data_dir = %runner.data_dir.display(),
        model = config.model_id,
        actors = config.actors.len(),
        "configuration loaded"
    );

    let prompts = PromptEngine::new(&runner.templates_dir)?;
    let llm = create_backend(&runner.backend);
    info!(backend = llm.name(), "LLM backend configured");

    let store = Arc::new(JsonlStore::new(runner.data_dir.clone()));
    let bot_rng = Arc::new(match config.seed {
        Some(seed) => SeededRandom::from_seed(seed.wrapping_add(1)),
        None => SeededRandom::from_os(),
    });
    let collaborators = Collaborators {
        backend: Arc::new(ChatBackend::new(llm, prompts)),
        store: store.clone(),
        bot: Arc::new(BuiltinBot::new(bot_rng)),
    };

    let first_channel = config.channels.first().map(|c| Target::Channel(c.name.clone()));
    let sim = Simulation::new(config, collaborators);
    match store.load_snapshot().await {
        Ok(Some(state)) => {
            info!(channels = state.channels.len(), "restored previous session");
            sim.restore(state);
        }
        Ok(None) => {}
        Err(e) => warn!(error = %e, "snapshot unreadable, starting fresh"),
    }

    sim.start();
    Terminal::new(sim.clone(), first_channel).run().await?;
    sim.stop();

    if let Err(e) = store.save_snapshot(&sim.snapshot()).await {
        warn!(error = %e, "failed to save snapshot");
    }
    info!("afterhours-runner stopped");
    Ok(())
}
