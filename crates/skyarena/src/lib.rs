//! # SkyArena
//!
//! Game-session lifecycle manager for a SkyWars-style arena mode.
//!
//! Players queue up, get batched into isolated game instances, play
//! through a countdown and a last-player-standing match, and are cleaned
//! up afterwards. The host server (world loading, chat, scoreboards)
//! plugs in through [`ArenaProvisioner`] and [`GameHooks`] and feeds
//! player actions in as [`GameEvent`]s.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use skyarena::prelude::*;
//!
//! # async fn run() -> Result<(), SkyWarsError> {
//! skyarena::init_tracing();
//! let service = SkyWarsService::builder()
//!     .config(SkyWarsConfig::from_json_str(r#"{ "game": { "min_players": 4 } }"#)?)
//!     .arenas(6)
//!     .spawn();
//!
//! let handle = service.handle();
//! handle.send_event(GameEvent::PlayerJoinRequest { player: PlayerId(1) }).await?;
//! let status = handle.status().await?;
//! println!("{}", status.summary());
//!
//! service.shutdown().await?;
//! # Ok(())
//! # }
//! ```

mod config;
mod dispatch;
mod error;
mod service;

pub use config::{RetryConfig, SkyWarsConfig};
pub use dispatch::{Dispatcher, JoinOutcome, LeaveOutcome, RetryBatch, StatusReport};
pub use error::SkyWarsError;
pub use service::{SkyWarsHandle, SkyWarsService, SkyWarsServiceBuilder};

pub use skyarena_game::{
    ArenaPool, ArenaProvisioner, Departure, GameConfig, GameError, GameHooks, GameInfo,
    GameOutcome, GameState,
};
pub use skyarena_protocol::{
    ArenaId, Codec, Command, CommandResponse, GameEvent, GameId, JsonCodec, PlayerId,
    ProtocolError,
};

/// Version string reported by the `version` command.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Installs a `tracing` subscriber that logs to stderr.
///
/// The filter comes from `RUST_LOG` (e.g. `skyarena=debug`), falling back
/// to `info`. Does nothing if a subscriber is already installed.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// Everything a host integration usually needs.
pub mod prelude {
    pub use crate::{
        ArenaId, ArenaPool, ArenaProvisioner, Command, CommandResponse, GameEvent, GameHooks,
        GameId, GameInfo, GameOutcome, GameState, JoinOutcome, LeaveOutcome, PlayerId,
        SkyWarsConfig, SkyWarsError, SkyWarsHandle, SkyWarsService, StatusReport,
    };
}
