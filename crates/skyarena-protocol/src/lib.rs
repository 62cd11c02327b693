//! Shared vocabulary for SkyArena.
//!
//! - **Types** ([`PlayerId`], [`GameId`], [`ArenaId`], [`GameEvent`],
//!   [`Command`], [`CommandResponse`]): identities and the messages the
//!   host exchanges with the lifecycle core.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how those messages are
//!   converted to/from bytes.
//! - **Errors** ([`ProtocolError`]).
//!
//! ```text
//! Host listeners (bytes / callbacks) → Protocol (GameEvent, Command) → Core
//! ```

mod codec;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{ArenaId, Command, CommandResponse, GameEvent, GameId, PlayerId};
