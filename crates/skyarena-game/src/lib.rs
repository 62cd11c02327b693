//! Game instance lifecycle for SkyArena.
//!
//! A game instance is one arena with a fixed group of players, moving
//! through `Waiting → Running → Ending` before it is discarded. This
//! crate owns every piece of bookkeeping that has to stay consistent
//! while that happens.
//!
//! # Key types
//!
//! - [`GameIdHandler`]: hands out and reclaims small integer game IDs
//! - [`CurrentGames`]: registry of active instances, indexed by ID,
//!   arena, and player
//! - [`GameHandler`]: starts and ends games, runs countdowns
//! - [`GameState`]: lifecycle state machine
//! - [`GameConfig`]: player limits, countdown, concurrency cap
//! - [`ArenaProvisioner`] / [`GameHooks`]: the seams the host plugs into

mod config;
mod error;
mod handler;
mod hooks;
mod ids;
mod instance;
mod provisioner;
mod registry;

pub use config::{GameConfig, GameState};
pub use error::GameError;
pub use handler::{Departure, GameHandler};
pub use hooks::{GameHooks, GameOutcome};
pub use ids::GameIdHandler;
pub use instance::{GameInfo, GameInstance, GameTimer};
pub use provisioner::{ArenaPool, ArenaProvisioner};
pub use registry::CurrentGames;
