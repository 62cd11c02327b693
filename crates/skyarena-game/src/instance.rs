//! A single game instance and the snapshots handed out about it.

use std::time::Duration;

use serde::Serialize;
use skyarena_protocol::{ArenaId, GameId, PlayerId};
use skyarena_timer::TaskHandle;

use crate::{GameError, GameState};

/// Timer events a [`GameHandler`](crate::GameHandler) schedules for itself.
///
/// Each carries the instance `epoch`. Game IDs are reused, so an event
/// from a game that already ended must not act on a newer game that
/// happens to have the same ID; the epoch tells them apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameTimer {
    /// Countdown still running; `remaining` is what's left.
    CountdownTick {
        game: GameId,
        epoch: u64,
        remaining: Duration,
    },

    /// Countdown reached zero.
    CountdownElapsed { game: GameId, epoch: u64 },
}

impl GameTimer {
    pub fn game(&self) -> GameId {
        match self {
            Self::CountdownTick { game, .. } | Self::CountdownElapsed { game, .. } => *game,
        }
    }

    pub fn epoch(&self) -> u64 {
        match self {
            Self::CountdownTick { epoch, .. } | Self::CountdownElapsed { epoch, .. } => *epoch,
        }
    }
}

/// A snapshot of instance metadata.
///
/// `game_id` alone is not enough to name an instance once it has ended,
/// because the ID goes back to the pool. `epoch` is unique for the life
/// of the process; hosts echo it back in
/// [`GameEvent::GameWinCondition`](skyarena_protocol::GameEvent) so a
/// late report cannot touch a newer game under the same ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GameInfo {
    pub game_id: GameId,
    pub epoch: u64,
    pub arena: ArenaId,
    pub state: GameState,
    /// Members still in the game, in join order.
    pub players: Vec<PlayerId>,
}

/// One running (or about to run) game.
///
/// Owned by [`CurrentGames`](crate::CurrentGames). Membership changes go
/// through the registry so its player index stays in sync; the
/// instance itself only exposes read access to them.
#[derive(Debug)]
pub struct GameInstance {
    id: GameId,
    epoch: u64,
    arena: ArenaId,
    state: GameState,
    members: Vec<PlayerId>,
    countdown: Option<TaskHandle>,
}

impl GameInstance {
    /// Creates an instance in [`GameState::Waiting`].
    pub fn new(id: GameId, epoch: u64, arena: ArenaId, members: Vec<PlayerId>) -> Self {
        Self {
            id,
            epoch,
            arena,
            state: GameState::Waiting,
            members,
            countdown: None,
        }
    }

    pub fn id(&self) -> GameId {
        self.id
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn arena(&self) -> ArenaId {
        self.arena
    }

    pub fn state(&self) -> GameState {
        self.state
    }

    pub fn members(&self) -> &[PlayerId] {
        &self.members
    }

    pub fn contains(&self, player: PlayerId) -> bool {
        self.members.contains(&player)
    }

    pub fn player_count(&self) -> usize {
        self.members.len()
    }

    /// Whether a countdown is armed and not yet cancelled.
    pub fn has_countdown(&self) -> bool {
        self.countdown.as_ref().is_some_and(|h| !h.is_cancelled())
    }

    pub fn info(&self) -> GameInfo {
        GameInfo {
            game_id: self.id,
            epoch: self.epoch,
            arena: self.arena,
            state: self.state,
            players: self.members.clone(),
        }
    }

    /// Moves to `target`, refusing anything the state machine forbids.
    pub(crate) fn transition(&mut self, target: GameState) -> Result<(), GameError> {
        if !self.state.can_transition_to(target) {
            return Err(GameError::InvalidState(format!(
                "game {} cannot go from {} to {}",
                self.id, self.state, target
            )));
        }
        tracing::debug!(game_id = %self.id, from = %self.state, to = %target, "game state change");
        self.state = target;
        Ok(())
    }

    /// Stores the countdown handle, cancelling any previous one.
    pub(crate) fn arm_countdown(&mut self, handle: TaskHandle) {
        self.cancel_countdown();
        self.countdown = Some(handle);
    }

    /// Cancels the countdown if one is armed. Idempotent.
    pub(crate) fn cancel_countdown(&mut self) {
        if let Some(handle) = self.countdown.take() {
            handle.cancel();
        }
    }

    pub(crate) fn push_member(&mut self, player: PlayerId) {
        self.members.push(player);
    }

    pub(crate) fn remove_member(&mut self, player: PlayerId) -> bool {
        let before = self.members.len();
        self.members.retain(|p| *p != player);
        self.members.len() != before
    }
}
