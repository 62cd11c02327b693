//! Error types for the game layer.

use skyarena_protocol::{ArenaId, GameId, PlayerId};

/// Errors that can occur during game lifecycle operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GameError {
    /// The player is already a member of a game.
    #[error("player {0} is already in game {1}")]
    AlreadyInGame(PlayerId, GameId),

    /// No active game has this ID.
    #[error("game {0} not found")]
    NotFound(GameId),

    /// Another active game already occupies this arena.
    #[error("arena {0} is already in use")]
    DuplicateArena(ArenaId),

    /// Another active game already uses this ID.
    #[error("game {0} is already registered")]
    DuplicateGame(GameId),

    /// The provisioner has no free arena right now.
    #[error("no arena available")]
    NoArenaAvailable,

    /// Every game ID below the cap is in use.
    #[error("all {cap} game slots are in use")]
    ResourceExhausted { cap: u32 },

    /// The game has already ended. Repeated `end_game` calls land here.
    #[error("game {0} has already ended")]
    AlreadyEnded(GameId),

    /// The request doesn't fit the game's current state.
    #[error("invalid game state for this operation: {0}")]
    InvalidState(String),
}

impl GameError {
    /// `true` for the races that are expected on teardown paths (a win and
    /// a shutdown both ending the same game, for example).
    pub fn is_benign_teardown(&self) -> bool {
        matches!(self, Self::AlreadyEnded(_) | Self::NotFound(_))
    }

    /// The line shown to the player or admin who triggered the error.
    pub fn user_message(&self) -> String {
        match self {
            Self::AlreadyInGame(_, game) => format!("You are already in game {}.", game.0),
            Self::NotFound(game) => format!("There is no game with ID {}.", game.0),
            Self::NoArenaAvailable => {
                "All arenas are busy. You will be placed as soon as one frees up.".to_string()
            }
            Self::ResourceExhausted { .. } => {
                "Too many games are running. Please try again later.".to_string()
            }
            Self::AlreadyEnded(game) => format!("Game {} has already ended.", game.0),
            Self::DuplicateArena(_) | Self::DuplicateGame(_) | Self::InvalidState(_) => {
                "Something went wrong starting that game. Please try again.".to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_benign_teardown_errors() {
        assert!(GameError::AlreadyEnded(GameId(1)).is_benign_teardown());
        assert!(GameError::NotFound(GameId(1)).is_benign_teardown());
        assert!(!GameError::NoArenaAvailable.is_benign_teardown());
        assert!(!GameError::ResourceExhausted { cap: 4 }.is_benign_teardown());
    }

    #[test]
    fn test_resource_exhausted_asks_to_try_later() {
        let msg = GameError::ResourceExhausted { cap: 4 }.user_message();
        assert!(msg.contains("try again later"));
    }

    #[test]
    fn test_display_includes_ids() {
        let err = GameError::AlreadyInGame(PlayerId(3), GameId(1));
        assert_eq!(err.to_string(), "player P-3 is already in game G-1");
    }
}
