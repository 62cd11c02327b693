//! Service configuration, loaded once at startup.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use skyarena_game::GameConfig;
use skyarena_queue::QueueConfig;
use skyarena_timer::Backoff;

use crate::SkyWarsError;

/// Default command channel size for the service actor.
const DEFAULT_CHANNEL_SIZE: usize = 64;

/// Backoff for retrying a batch when no arena is free.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Upper bound on the random delay added to each retry.
    pub jitter_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 500,
            max_delay_ms: 30_000,
            jitter_ms: 250,
        }
    }
}

impl RetryConfig {
    pub fn backoff(&self) -> Backoff {
        Backoff::new(
            Duration::from_millis(self.base_delay_ms),
            Duration::from_millis(self.max_delay_ms),
            Duration::from_millis(self.jitter_ms),
        )
    }
}

/// Everything the service needs at startup.
///
/// ```json
/// {
///   "game": { "min_players": 4, "max_players": 8, "countdown_secs": 20 },
///   "retry": { "base_delay_ms": 1000 },
///   "channel_size": 128
/// }
/// ```
///
/// Any field left out takes its default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SkyWarsConfig {
    pub game: GameConfig,
    pub retry: RetryConfig,
    /// Capacity of the bounded request channel into the service actor.
    pub channel_size: usize,
}

impl Default for SkyWarsConfig {
    fn default() -> Self {
        Self {
            game: GameConfig::default(),
            retry: RetryConfig::default(),
            channel_size: DEFAULT_CHANNEL_SIZE,
        }
    }
}

impl SkyWarsConfig {
    pub fn from_json_str(json: &str) -> Result<Self, SkyWarsError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| SkyWarsError::Config(e.to_string()))?;
        Ok(config.validated())
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, SkyWarsError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| SkyWarsError::Config(format!("{}: {e}", path.display())))?;
        tracing::info!(path = %path.display(), "loading configuration");
        Self::from_json_str(&json)
    }

    /// Clamps values that would make the service misbehave.
    pub fn validated(mut self) -> Self {
        self.game = self.game.validated();
        if self.channel_size == 0 {
            tracing::warn!("channel_size of 0 raised to 1");
            self.channel_size = 1;
        }
        if self.retry.max_delay_ms < self.retry.base_delay_ms {
            tracing::warn!(
                base = self.retry.base_delay_ms,
                max = self.retry.max_delay_ms,
                "retry max_delay_ms below base_delay_ms, raising"
            );
            self.retry.max_delay_ms = self.retry.base_delay_ms;
        }
        self
    }

    /// Queue batching follows the game's player limits.
    pub fn queue_config(&self) -> QueueConfig {
        QueueConfig {
            min_batch: self.game.min_players,
            max_batch: self.game.max_players,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_json_str_partial_uses_defaults() {
        let config =
            SkyWarsConfig::from_json_str(r#"{ "game": { "min_players": 4 }, "channel_size": 8 }"#)
                .unwrap();

        assert_eq!(config.game.min_players, 4);
        assert_eq!(config.game.max_players, 8);
        assert_eq!(config.game.countdown_secs, 30);
        assert_eq!(config.retry, RetryConfig::default());
        assert_eq!(config.channel_size, 8);
    }

    #[test]
    fn test_from_json_str_empty_object_is_default() {
        assert_eq!(SkyWarsConfig::from_json_str("{}").unwrap(), SkyWarsConfig::default());
    }

    #[test]
    fn test_from_json_str_malformed_is_config_error() {
        let result = SkyWarsConfig::from_json_str("{ not json");
        assert!(matches!(result, Err(SkyWarsError::Config(_))));
    }

    #[test]
    fn test_from_json_file_missing_is_config_error() {
        let result = SkyWarsConfig::from_json_file("/nonexistent/skyarena.json");
        assert!(matches!(result, Err(SkyWarsError::Config(msg)) if msg.contains("skyarena.json")));
    }

    #[test]
    fn test_from_json_file_reads_file() {
        let path = std::env::temp_dir().join(format!("skyarena-config-{}.json", std::process::id()));
        std::fs::write(&path, r#"{ "retry": { "base_delay_ms": 100, "max_delay_ms": 50 } }"#).unwrap();

        let config = SkyWarsConfig::from_json_file(&path).unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(config.retry.base_delay_ms, 100);
        assert_eq!(config.retry.max_delay_ms, 100, "max raised to base");
    }

    #[test]
    fn test_validated_clamps_channel_and_game() {
        let config = SkyWarsConfig {
            channel_size: 0,
            game: GameConfig {
                min_players: 5,
                max_players: 2,
                ..GameConfig::default()
            },
            ..SkyWarsConfig::default()
        }
        .validated();

        assert_eq!(config.channel_size, 1);
        assert_eq!(config.game.max_players, 5);
    }

    #[test]
    fn test_queue_config_follows_player_limits() {
        let config = SkyWarsConfig::default();
        let queue = config.queue_config();
        assert_eq!(queue.min_batch, 2);
        assert_eq!(queue.max_batch, 8);
    }
}
