//! Scheduling, memory, and message pipeline for the Afterhours chat
//! simulation.
//!
//! A [`Simulation`] drives a roster of synthetic actors in IRC-style
//! channels around a single human. Every message, whatever produced it,
//! passes through one ingestion funnel; a timer-driven scheduler decides
//! when actors talk; relationship memory shapes what they say.
//!
//! # Modules
//!
//! - [`config`] -- YAML configuration into strongly-typed structs.
//! - [`error`] -- Error enums and generation-failure classification.
//! - [`random`] -- Injected random source used by every probabilistic branch.
//! - [`limiter`] -- Concurrency limiter and spacing for generation calls.
//! - [`temporal`] -- Afterhours window and hourly activity multipliers.
//! - [`patterns`] -- Repeated-phrase staleness tracker.
//! - [`relationship`] -- Per-actor relationship memory.
//! - [`opener`] -- Contextual conversation openers for direct messages.
//! - [`links`] -- Link and image extraction with domain filtering.
//! - [`parse`] -- Parsing of generated lines.
//! - [`typing`] -- Simulated typing delays.
//! - [`dedup`] -- Bounded seen-id set.
//! - [`bus`] -- Cross-context broadcast bus.
//! - [`state`] -- In-memory chat state.
//! - [`collaborators`] -- Generation, persistence, and bot-handler seams.
//! - [`simulation`] -- The [`Simulation`] handle and human-facing operations.
//! - [`ingest`] -- The message ingestion funnel.
//! - [`scheduler`] -- Timer loop, burst and quiet modes, auto-join.
//! - [`dm`] -- Autonomous direct messages.

pub mod bus;
pub mod collaborators;
pub mod config;
pub mod dedup;
pub mod dm;
pub mod error;
pub mod ingest;
pub mod limiter;
pub mod links;
pub mod opener;
pub mod parse;
pub mod patterns;
pub mod random;
pub mod relationship;
pub mod scheduler;
pub mod simulation;
pub mod state;
pub mod temporal;
pub mod typing;

pub use bus::{BusEndpoint, BusReceiver, CrossTabBus};
pub use collaborators::{
    BotHandler, GenerationBackend, GenerationRequest, MemoryStore, MessageStore, Persona,
    SilentBot, StorageKey,
};
pub use config::{ConfigError, SimulationConfig, Speed};
pub use error::{BotError, GenerationError, GenerationFailureKind, PersistenceError, SimulationError};
pub use ingest::Origin;
pub use random::{RandomExt, RandomSource, ScriptedRandom, SeededRandom};
pub use scheduler::{SchedulerPhase, TickMode, TickReport};
pub use simulation::{Collaborators, SimEvent, Simulation, SYSTEM_AUTHOR};
pub use state::{ChatState, MAX_LOG};
