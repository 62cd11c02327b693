//! Codec trait and implementations for events and commands.
//!
//! The host may forward events and admin commands as raw bytes (from a
//! console bridge, a proxy plugin, a test harness). A [`Codec`] turns
//! those bytes into [`GameEvent`](crate::GameEvent) /
//! [`Command`](crate::Command) values and encodes replies back.

use serde::{de::DeserializeOwned, Serialize};

use crate::ProtocolError;

/// Encodes Rust values to bytes and decodes bytes back.
///
/// `Send + Sync + 'static` so one codec can be shared by every task that
/// talks to the service.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed or
    /// don't match the expected type.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] backed by `serde_json`.
///
/// Behind the `json` feature flag (enabled by default).
///
/// ## Example
///
/// ```rust
/// use skyarena_protocol::{Codec, Command, GameId, JsonCodec};
///
/// let codec = JsonCodec;
/// let bytes = br#"{ "command": "cancel", "game": 2 }"#;
/// let cmd: Command = codec.decode(bytes).unwrap();
/// assert_eq!(cmd, Command::Cancel { game: GameId(2) });
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}

#[cfg(all(test, feature = "json"))]
mod tests {
    use super::*;
    use crate::{Command, CommandResponse, GameEvent, GameId, PlayerId};

    #[test]
    fn test_decode_internally_tagged_event() {
        let event: GameEvent = JsonCodec
            .decode(br#"{ "type": "PlayerDeath", "player": 12 }"#)
            .expect("valid event");
        assert_eq!(event, GameEvent::PlayerDeath { player: PlayerId(12) });
    }

    #[test]
    fn test_decode_unit_command() {
        let cmd: Command = JsonCodec
            .decode(br#"{ "command": "status" }"#)
            .expect("valid command");
        assert_eq!(cmd, Command::Status);
    }

    #[test]
    fn test_encode_response_is_flat_json() {
        let bytes = JsonCodec
            .encode(&CommandResponse::ok("game G-1 cancelled"))
            .unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(text, r#"{"success":true,"message":"game G-1 cancelled"}"#);
    }

    #[test]
    fn test_decode_win_condition_without_epoch_is_rejected() {
        let result: Result<GameEvent, _> =
            JsonCodec.decode(br#"{ "type": "GameWinCondition", "game": 1 }"#);
        assert!(matches!(result, Err(ProtocolError::Decode(_))));

        let event: GameEvent = JsonCodec
            .decode(br#"{ "type": "GameWinCondition", "game": 1, "epoch": 4 }"#)
            .unwrap();
        assert_eq!(event, GameEvent::GameWinCondition { game: GameId(1), epoch: 4 });
    }

    #[test]
    fn test_decode_unknown_command_returns_decode_error() {
        let result: Result<Command, _> = JsonCodec.decode(br#"{ "command": "explode" }"#);
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }
}
