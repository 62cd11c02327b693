//! Game configuration and state machine.

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// GameConfig
// ---------------------------------------------------------------------------

/// Limits and timings shared by every game instance.
///
/// Read once at startup and never changed while games are running.
/// Missing fields in a config file fall back to [`Default`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    /// Minimum players for a game to start. Also the queue batch threshold.
    pub min_players: usize,

    /// Maximum players in one game. A game that fills up skips the
    /// countdown and starts right away.
    pub max_players: usize,

    /// Countdown between a game being created and it starting, in seconds.
    /// Late joiners can enter during this window. 0 starts immediately.
    pub countdown_secs: u64,

    /// How often players are told how much countdown is left, in seconds.
    pub countdown_tick_secs: u64,

    /// Hard cap on simultaneously active games. Also the exclusive upper
    /// bound for game IDs.
    pub max_concurrent_games: u32,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            min_players: 2,
            max_players: 8,
            countdown_secs: 30,
            countdown_tick_secs: 5,
            max_concurrent_games: 8,
        }
    }
}

impl GameConfig {
    /// Clamps out-of-range values so the config is safe to use.
    ///
    /// Called automatically by [`GameHandler::new`](crate::GameHandler::new).
    /// Rules:
    /// - `min_players` at least 1.
    /// - `max_players` at least `min_players`.
    /// - `countdown_tick_secs` at least 1.
    /// - `max_concurrent_games` at least 1.
    pub fn validated(mut self) -> Self {
        if self.min_players == 0 {
            tracing::warn!("min_players of 0 raised to 1");
            self.min_players = 1;
        }
        if self.max_players < self.min_players {
            tracing::warn!(
                max = self.max_players,
                min = self.min_players,
                "max_players below min_players, raising"
            );
            self.max_players = self.min_players;
        }
        if self.countdown_tick_secs == 0 {
            tracing::warn!("countdown_tick_secs of 0 raised to 1");
            self.countdown_tick_secs = 1;
        }
        if self.max_concurrent_games == 0 {
            tracing::warn!("max_concurrent_games of 0 raised to 1");
            self.max_concurrent_games = 1;
        }
        self
    }

    pub fn countdown(&self) -> Duration {
        Duration::from_secs(self.countdown_secs)
    }

    pub fn countdown_tick(&self) -> Duration {
        Duration::from_secs(self.countdown_tick_secs)
    }
}

// ---------------------------------------------------------------------------
// GameState
// ---------------------------------------------------------------------------

/// The lifecycle state of a game instance.
///
/// ```text
/// Waiting ──(countdown elapsed / full)──→ Running ──→ Ending ──→ (discarded)
///    │                                                  ↑
///    └──────────────(cancelled)─────────────────────────┘
/// ```
///
/// - **Waiting**: Arena assigned, countdown running, late joins allowed.
/// - **Running**: Game in progress. Eliminations only, no joins.
/// - **Ending**: Winner decided or game cancelled; cleanup in progress.
///   Terminal: an `Ending` game never goes back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GameState {
    Waiting,
    Running,
    Ending,
}

impl GameState {
    /// Returns `true` if players may still join.
    pub fn is_joinable(&self) -> bool {
        matches!(self, Self::Waiting)
    }

    /// Returns `true` until cleanup has started.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Waiting | Self::Running)
    }

    /// Returns `true` if moving to `target` is allowed.
    ///
    /// Only forward moves exist, and every path ends in `Ending`.
    pub fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Waiting, Self::Running) | (Self::Waiting, Self::Ending) | (Self::Running, Self::Ending)
        )
    }
}

impl std::fmt::Display for GameState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Waiting => write!(f, "Waiting"),
            Self::Running => write!(f, "Running"),
            Self::Ending => write!(f, "Ending"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_game_state_forward_transitions_allowed() {
        assert!(GameState::Waiting.can_transition_to(GameState::Running));
        assert!(GameState::Waiting.can_transition_to(GameState::Ending));
        assert!(GameState::Running.can_transition_to(GameState::Ending));
    }

    #[test]
    fn test_game_state_backward_and_self_transitions_rejected() {
        let all = [GameState::Waiting, GameState::Running, GameState::Ending];
        for to in all {
            assert!(!GameState::Ending.can_transition_to(to));
        }
        assert!(!GameState::Running.can_transition_to(GameState::Waiting));
        assert!(!GameState::Running.can_transition_to(GameState::Running));
        assert!(!GameState::Waiting.can_transition_to(GameState::Waiting));
    }

    #[test]
    fn test_game_state_is_joinable() {
        assert!(GameState::Waiting.is_joinable());
        assert!(!GameState::Running.is_joinable());
        assert!(!GameState::Ending.is_joinable());
    }

    #[test]
    fn test_game_state_is_active() {
        assert!(GameState::Waiting.is_active());
        assert!(GameState::Running.is_active());
        assert!(!GameState::Ending.is_active());
    }

    #[test]
    fn test_game_state_display() {
        assert_eq!(GameState::Waiting.to_string(), "Waiting");
        assert_eq!(GameState::Ending.to_string(), "Ending");
    }

    #[test]
    fn test_game_config_default() {
        let config = GameConfig::default();
        assert_eq!(config.min_players, 2);
        assert_eq!(config.max_players, 8);
        assert_eq!(config.countdown(), Duration::from_secs(30));
        assert_eq!(config.max_concurrent_games, 8);
    }

    #[test]
    fn test_game_config_validated_clamps() {
        let config = GameConfig {
            min_players: 0,
            max_players: 0,
            countdown_secs: 10,
            countdown_tick_secs: 0,
            max_concurrent_games: 0,
        }
        .validated();
        assert_eq!(config.min_players, 1);
        assert_eq!(config.max_players, 1);
        assert_eq!(config.countdown_tick_secs, 1);
        assert_eq!(config.max_concurrent_games, 1);
    }
}
