//! The `GameHooks` trait: how the host reacts to lifecycle changes.
//!
//! The lifecycle core decides *when* things happen. What a game start
//! looks like in the world (teleports, kits, chat lines, scoreboards) is
//! the host's business, plugged in through this trait.

use std::time::Duration;

use serde::Serialize;
use skyarena_protocol::{ArenaId, GameId, PlayerId};

/// How a game ended and who was in it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GameOutcome {
    pub game: GameId,
    pub arena: ArenaId,

    /// `true` if the game finished by a win; `false` if it was cancelled,
    /// shut down, or emptied out before starting.
    pub completed_normally: bool,

    /// Remaining players on a normal finish. Empty when cancelled.
    pub winners: Vec<PlayerId>,

    /// Players still in the game when it ended.
    pub players: Vec<PlayerId>,

    /// Everyone who was ever enrolled in the game, ascending.
    pub enrolled: Vec<PlayerId>,
}

/// Callbacks fired by the [`GameHandler`](crate::GameHandler).
///
/// Every method has a no-op default, so implementors override only what
/// they need. Calls happen on the dispatch loop: keep them quick and
/// never block.
pub trait GameHooks: Send + 'static {
    /// A game was created in `arena` and is waiting to start.
    fn on_game_start(&mut self, _game: GameId, _arena: ArenaId, _players: &[PlayerId]) {}

    /// A late joiner entered a waiting game.
    fn on_player_joined(&mut self, _game: GameId, _player: PlayerId) {}

    /// Countdown progress. `remaining` of zero means it just finished.
    fn on_countdown(&mut self, _game: GameId, _players: &[PlayerId], _remaining: Duration) {}

    /// The game moved to `Running`.
    fn on_game_running(&mut self, _game: GameId, _players: &[PlayerId]) {}

    /// A player died or quit mid-game.
    fn on_player_eliminated(&mut self, _game: GameId, _player: PlayerId) {}

    /// The game is over. Fired once per game, before its ID and arena
    /// are released.
    fn on_game_end(&mut self, _outcome: &GameOutcome) {}

    /// A message for one player.
    fn notify(&mut self, _player: PlayerId, _message: &str) {}
}

impl GameHooks for () {}

impl<H: GameHooks + ?Sized> GameHooks for Box<H> {
    fn on_game_start(&mut self, game: GameId, arena: ArenaId, players: &[PlayerId]) {
        (**self).on_game_start(game, arena, players);
    }

    fn on_player_joined(&mut self, game: GameId, player: PlayerId) {
        (**self).on_player_joined(game, player);
    }

    fn on_countdown(&mut self, game: GameId, players: &[PlayerId], remaining: Duration) {
        (**self).on_countdown(game, players, remaining);
    }

    fn on_game_running(&mut self, game: GameId, players: &[PlayerId]) {
        (**self).on_game_running(game, players);
    }

    fn on_player_eliminated(&mut self, game: GameId, player: PlayerId) {
        (**self).on_player_eliminated(game, player);
    }

    fn on_game_end(&mut self, outcome: &GameOutcome) {
        (**self).on_game_end(outcome);
    }

    fn notify(&mut self, player: PlayerId, message: &str) {
        (**self).notify(player, message);
    }
}
