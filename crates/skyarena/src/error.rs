//! Unified error type for SkyArena.

use skyarena_game::GameError;
use skyarena_protocol::ProtocolError;
use skyarena_queue::QueueError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `skyarena` crate you deal with this single error type
/// instead of importing errors from each sub-crate. `#[from]` on each
/// wrapping variant lets `?` convert sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum SkyWarsError {
    /// Decoding a host event or command failed.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The queue rejected the player.
    #[error(transparent)]
    Queue(#[from] QueueError),

    /// A game lifecycle operation failed.
    #[error(transparent)]
    Game(#[from] GameError),

    /// The service actor has stopped.
    #[error("SkyWars service is not running")]
    Unavailable,

    /// The configuration couldn't be read or parsed.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl SkyWarsError {
    /// The line shown to the player or admin who triggered the error.
    pub fn user_message(&self) -> String {
        match self {
            Self::Game(e) => e.user_message(),
            Self::Queue(QueueError::AlreadyQueued(_)) => "You are already in the queue.".to_string(),
            Self::Protocol(_) => "That request could not be understood.".to_string(),
            Self::Unavailable => "SkyWars is not running right now.".to_string(),
            Self::Config(_) => "SkyWars is misconfigured. Ask an admin to check the logs.".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skyarena_protocol::{GameId, PlayerId};

    #[test]
    fn test_from_protocol_error() {
        let err = ProtocolError::InvalidMessage("bad".into());
        let sky_err: SkyWarsError = err.into();
        assert!(matches!(sky_err, SkyWarsError::Protocol(_)));
        assert!(sky_err.to_string().contains("bad"));
    }

    #[test]
    fn test_from_queue_error() {
        let sky_err: SkyWarsError = QueueError::AlreadyQueued(PlayerId(3)).into();
        assert!(matches!(sky_err, SkyWarsError::Queue(_)));
        assert_eq!(sky_err.user_message(), "You are already in the queue.");
    }

    #[test]
    fn test_from_game_error_keeps_user_message() {
        let sky_err: SkyWarsError = GameError::ResourceExhausted { cap: 2 }.into();
        assert!(matches!(sky_err, SkyWarsError::Game(_)));
        assert!(sky_err.user_message().contains("try again later"));
    }

    #[test]
    fn test_transparent_display() {
        let sky_err: SkyWarsError = GameError::NotFound(GameId(4)).into();
        assert_eq!(sky_err.to_string(), "game G-4 not found");
    }
}
