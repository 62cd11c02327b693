//! Core protocol types shared by every SkyArena layer.
//!
//! These are the values that cross the boundary between the host server
//! (which owns worlds, chat and permissions) and the lifecycle core:
//! identities, the events the host reports, and the admin commands it
//! forwards.

use serde::{Deserialize, Serialize};

use std::fmt;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// An opaque identifier for a connected player.
///
/// The host assigns these and the core never interprets them. This is a
/// "newtype wrapper" around `u64`: a `PlayerId` can't be passed where a
/// `GameId` is expected even though both are plain integers underneath.
///
/// `#[serde(transparent)]` serializes `PlayerId(42)` as just `42`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct PlayerId(pub u64);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P-{}", self.0)
    }
}

/// A small integer handle for an active game instance.
///
/// IDs are handed out smallest-first and reused once a game ends, so two
/// games that never overlap in time may share the same `GameId`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct GameId(pub u32);

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "G-{}", self.0)
    }
}

/// A handle for an arena (the isolated world one game runs in).
///
/// Arenas are owned by the host's world provisioner. The core only
/// borrows them for the lifetime of a game and hands them back.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ArenaId(pub u32);

impl fmt::Display for ArenaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "arena-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// GameEvent: what the host reports
// ---------------------------------------------------------------------------

/// Player and world events delivered by the host's listeners.
///
/// The host registers its own callbacks and translates each one into a
/// `GameEvent`. The core consumes them from a single dispatch loop, so
/// the host never has to care about ordering between its listeners.
///
/// `#[serde(tag = "type")]` gives internally tagged JSON:
///   `{ "type": "PlayerQuit", "player": 7 }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GameEvent {
    /// A player asked to play (join command or lobby sign).
    PlayerJoinRequest { player: PlayerId },

    /// A player stepped into the lobby portal. Treated as a join request.
    PortalUse { player: PlayerId },

    /// A player disconnected from the server.
    PlayerQuit { player: PlayerId },

    /// A player died inside an arena and is out of the game.
    PlayerDeath { player: PlayerId },

    /// The host detected a win inside a running game.
    ///
    /// Game IDs are recycled, so the report also names the instance
    /// `epoch` (taken from the game's status snapshot). A report whose
    /// epoch no longer matches the game under that ID is stale and does
    /// nothing.
    GameWinCondition { game: GameId, epoch: u64 },
}

// ---------------------------------------------------------------------------
// Command: the administrative surface
// ---------------------------------------------------------------------------

/// Administrative commands. Each maps 1:1 onto a core operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    /// Put a player into the queue (or a waiting game).
    Join { player: PlayerId },

    /// Take a player out of the queue or their current game.
    Leave { player: PlayerId },

    /// Force-cancel a game by ID.
    Cancel { game: GameId },

    /// Report active games and the queue length.
    Status,

    /// Report the running SkyArena version.
    Version,
}

/// The reply to a [`Command`]: a success flag plus a player-facing line.
///
/// The command layer that owns chat formatting decides how to render it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResponse {
    pub success: bool,
    pub message: String,
}

impl CommandResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_display_with_prefix() {
        assert_eq!(PlayerId(42).to_string(), "P-42");
        assert_eq!(GameId(0).to_string(), "G-0");
        assert_eq!(ArenaId(3).to_string(), "arena-3");
    }

    #[test]
    fn test_game_ids_order_numerically() {
        let mut ids = vec![GameId(2), GameId(0), GameId(1)];
        ids.sort();
        assert_eq!(ids, vec![GameId(0), GameId(1), GameId(2)]);
    }

    #[test]
    fn test_command_response_constructors() {
        let ok = CommandResponse::ok("joined");
        assert!(ok.success);
        assert_eq!(ok.message, "joined");
        assert!(!CommandResponse::failed("nope").success);
    }
}
