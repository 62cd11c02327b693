//! Game orchestration: starting batches, countdowns, eliminations, and
//! orderly teardown.
//!
//! ## Generics explained
//!
//! `GameHandler<P, H>` is generic over the arena provisioner `P` and the
//! host hooks `H`. The compiler generates a separate copy of the handler
//! for each concrete pair ("monomorphization"), so calls into the host
//! are direct calls with no `dyn` lookup. A host that wants to choose at
//! runtime can still pass `Box<dyn GameHooks>`: the blanket impl in
//! `hooks.rs` makes the box itself a `GameHooks`.
//!
//! ## Epochs
//!
//! Game IDs are small and get reused as soon as a game ends. Anything
//! that refers to a game from the outside and can arrive late (countdown
//! events, host win reports) carries the instance epoch as well, and is
//! dropped when the live instance under that ID has a different one.

use std::collections::HashSet;
use std::time::Duration;

use skyarena_protocol::{ArenaId, GameId, PlayerId};
use skyarena_timer::Scheduler;

use crate::{
    ArenaProvisioner, CurrentGames, GameConfig, GameError, GameHooks, GameIdHandler, GameInfo,
    GameInstance, GameOutcome, GameState, GameTimer,
};

/// What happened when a player left their game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departure {
    /// The game the player was in.
    pub game: GameId,

    /// Set if the departure ended the game.
    pub outcome: Option<GameOutcome>,
}

/// Ties the ID allocator, the registry, the arena provisioner, and the
/// countdown timers together.
///
/// Single-writer: every method takes `&mut self`, and the owner (the
/// dispatch loop) is the only caller. Countdown timers don't touch the
/// handler directly; they post [`GameTimer`] events back through the
/// [`Scheduler`] and the owner feeds them to
/// [`handle_timer`](Self::handle_timer).
pub struct GameHandler<P, H> {
    config: GameConfig,
    ids: GameIdHandler,
    games: CurrentGames,
    provisioner: P,
    hooks: H,
    timers: Scheduler<GameTimer>,

    /// Incremented per instance; stamped on every timer event.
    next_epoch: u64,

    /// IDs whose game has ended and that haven't been handed out again.
    /// Lets a repeated `end_game` answer `AlreadyEnded` instead of
    /// `NotFound`.
    ended: HashSet<GameId>,
}

impl<P: ArenaProvisioner, H: GameHooks> GameHandler<P, H> {
    pub fn new(config: GameConfig, provisioner: P, hooks: H, timers: Scheduler<GameTimer>) -> Self {
        let config = config.validated();
        Self {
            ids: GameIdHandler::new(config.max_concurrent_games),
            games: CurrentGames::new(),
            config,
            provisioner,
            hooks,
            timers,
            next_epoch: 1,
            ended: HashSet::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Starting
    // -----------------------------------------------------------------------

    /// Starts a new game for `players` (in the order given).
    ///
    /// Order of operations: validate, acquire an arena, allocate an ID,
    /// register. Any failure undoes what came before it, so on `Err` no
    /// ID is held, no arena is held, and no player is tracked. The caller
    /// keeps ownership of the batch and re-queues it.
    ///
    /// A full game starts right away; so does one with a zero countdown
    /// that already has enough players. Otherwise a countdown is armed.
    pub fn start_game(&mut self, players: Vec<PlayerId>) -> Result<GameId, GameError> {
        if players.is_empty() {
            return Err(GameError::InvalidState("cannot start a game with no players".into()));
        }
        if players.len() > self.config.max_players {
            return Err(GameError::InvalidState(format!(
                "{} players exceeds the maximum of {}",
                players.len(),
                self.config.max_players
            )));
        }
        if let Some((player, game)) = players
            .iter()
            .find_map(|p| self.games.game_of(*p).map(|g| (*p, g)))
        {
            return Err(GameError::AlreadyInGame(player, game));
        }
        if !self.ids.has_capacity() {
            tracing::warn!(cap = self.ids.cap(), "cannot start game, ID cap reached");
            return Err(GameError::ResourceExhausted { cap: self.ids.cap() });
        }

        let arena = self
            .provisioner
            .acquire_arena()
            .ok_or(GameError::NoArenaAvailable)?;

        let game_id = match self.ids.allocate() {
            Ok(id) => id,
            Err(e) => {
                self.provisioner.release_arena(arena);
                return Err(e);
            }
        };

        if let Err(e) = self.install(game_id, arena, &players) {
            let _ = self.ids.release(game_id);
            self.provisioner.release_arena(arena);
            return Err(e);
        }

        tracing::info!(%game_id, %arena, players = players.len(), "game started");
        self.hooks.on_game_start(game_id, arena, &players);

        let full = players.len() >= self.config.max_players;
        let instant = self.config.countdown_secs == 0 && players.len() >= self.config.min_players;
        if full || instant {
            self.begin(game_id)?;
        } else {
            self.arm_countdown(game_id);
        }
        Ok(game_id)
    }

    fn install(&mut self, game_id: GameId, arena: ArenaId, players: &[PlayerId]) -> Result<(), GameError> {
        self.ids.enroll(game_id, players)?;
        let epoch = self.next_epoch;
        self.next_epoch += 1;
        self.games
            .register(GameInstance::new(game_id, epoch, arena, players.to_vec()))?;
        self.ended.remove(&game_id);
        Ok(())
    }

    fn arm_countdown(&mut self, game_id: GameId) {
        let Some(instance) = self.games.get_mut(game_id) else {
            return;
        };
        let epoch = instance.epoch();
        let handle = self.timers.schedule_countdown(
            self.config.countdown(),
            self.config.countdown_tick(),
            move |remaining| {
                if remaining.is_zero() {
                    GameTimer::CountdownElapsed { game: game_id, epoch }
                } else {
                    GameTimer::CountdownTick {
                        game: game_id,
                        epoch,
                        remaining,
                    }
                }
            },
        );
        tracing::debug!(%game_id, task = %handle.id(), "countdown armed");
        instance.arm_countdown(handle);
    }

    /// Moves a waiting game to `Running`.
    fn begin(&mut self, game_id: GameId) -> Result<(), GameError> {
        let instance = self
            .games
            .get_mut(game_id)
            .ok_or(GameError::NotFound(game_id))?;
        instance.cancel_countdown();
        instance.transition(GameState::Running)?;
        let players = instance.members().to_vec();

        tracing::info!(%game_id, players = players.len(), "game running");
        self.hooks.on_game_running(game_id, &players);
        Ok(())
    }

    /// Puts `player` into the lowest-ID waiting game that has room.
    ///
    /// Returns `Ok(None)` if there is no such game, in which case the
    /// caller queues the player instead. Filling the game to
    /// `max_players` starts it immediately.
    pub fn join_waiting(&mut self, player: PlayerId) -> Result<Option<GameId>, GameError> {
        if let Some(current) = self.games.game_of(player) {
            return Err(GameError::AlreadyInGame(player, current));
        }
        let Some(game_id) = self.games.find_joinable(self.config.max_players) else {
            return Ok(None);
        };

        self.games.add_member(game_id, player)?;
        self.ids.enroll(game_id, &[player])?;
        tracing::info!(%game_id, player_id = %player, "player joined waiting game");
        self.hooks.on_player_joined(game_id, player);

        let count = self.games.get(game_id).map_or(0, GameInstance::player_count);
        if count >= self.config.max_players {
            self.begin(game_id)?;
        }
        Ok(Some(game_id))
    }

    // -----------------------------------------------------------------------
    // Timers and departures
    // -----------------------------------------------------------------------

    /// Applies a countdown event. Events for a game that has ended, or
    /// for an older instance under a reused ID, are dropped.
    ///
    /// Returns the outcome if the countdown ran out with too few players
    /// and the game was cancelled.
    pub fn handle_timer(&mut self, timer: GameTimer) -> Option<GameOutcome> {
        let game_id = timer.game();
        let live = self.games.get(game_id).filter(|g| {
            g.epoch() == timer.epoch() && g.state() == GameState::Waiting
        });
        let Some(instance) = live else {
            tracing::debug!(%game_id, epoch = timer.epoch(), "stale timer event dropped");
            return None;
        };
        let players = instance.members().to_vec();

        match timer {
            GameTimer::CountdownTick { remaining, .. } => {
                self.hooks.on_countdown(game_id, &players, remaining);
                None
            }
            GameTimer::CountdownElapsed { .. } => {
                self.hooks.on_countdown(game_id, &players, Duration::ZERO);
                if players.len() >= self.config.min_players {
                    if let Err(e) = self.begin(game_id) {
                        tracing::warn!(%game_id, error = %e, "failed to start game after countdown");
                    }
                    return None;
                }
                tracing::info!(
                    %game_id,
                    players = players.len(),
                    min = self.config.min_players,
                    "countdown elapsed without enough players, cancelling"
                );
                self.end_game(game_id, false).ok()
            }
        }
    }

    /// Takes `player` out of their game, if they're in one.
    ///
    /// In a running game this is an elimination; once at most one player
    /// is left the game ends normally with them as the winner. A waiting
    /// game that empties out is cancelled.
    pub fn remove_player(&mut self, player: PlayerId) -> Option<Departure> {
        let game_id = self.games.remove_member(player)?;
        let (state, remaining) = self
            .games
            .get(game_id)
            .map(|g| (g.state(), g.player_count()))?;

        tracing::info!(%game_id, player_id = %player, %state, remaining, "player left game");

        let outcome = match state {
            GameState::Running => {
                self.hooks.on_player_eliminated(game_id, player);
                if remaining <= 1 {
                    self.end_game(game_id, true).ok()
                } else {
                    None
                }
            }
            GameState::Waiting if remaining == 0 => self.end_game(game_id, false).ok(),
            _ => None,
        };
        Some(Departure {
            game: game_id,
            outcome,
        })
    }

    // -----------------------------------------------------------------------
    // Ending
    // -----------------------------------------------------------------------

    /// Ends a game: `Ending`, hooks, unregister, release ID, return arena.
    ///
    /// A second call for the same game returns
    /// [`GameError::AlreadyEnded`] and changes nothing. With
    /// `completed_normally` the remaining members are the winners.
    pub fn end_game(&mut self, game_id: GameId, completed_normally: bool) -> Result<GameOutcome, GameError> {
        if self.ended.contains(&game_id) {
            tracing::debug!(%game_id, "end_game on an already ended game");
            return Err(GameError::AlreadyEnded(game_id));
        }
        let instance = self
            .games
            .get_mut(game_id)
            .ok_or(GameError::NotFound(game_id))?;

        instance.cancel_countdown();
        instance.transition(GameState::Ending)?;

        let players = instance.members().to_vec();
        let outcome = GameOutcome {
            game: game_id,
            arena: instance.arena(),
            completed_normally,
            winners: if completed_normally { players.clone() } else { Vec::new() },
            enrolled: self.ids.get_players(game_id).unwrap_or_default(),
            players,
        };
        self.hooks.on_game_end(&outcome);

        let instance = self.games.unregister(game_id)?;
        if let Err(e) = self.ids.release(game_id) {
            tracing::debug!(%game_id, error = %e, "game ID already released");
        }
        self.provisioner.release_arena(instance.arena());
        self.ended.insert(game_id);

        tracing::info!(
            %game_id,
            arena = %outcome.arena,
            completed_normally,
            winners = outcome.winners.len(),
            "game ended"
        );
        Ok(outcome)
    }

    /// Ends a game only if the live instance under `game_id` is the one
    /// stamped `epoch`.
    ///
    /// Used for host-originated reports. The host may still be holding an
    /// ID whose game already ended (last player standing, shutdown) and
    /// was handed to a new batch; that report answers
    /// [`GameError::AlreadyEnded`] and leaves the new game alone.
    pub fn end_instance(
        &mut self,
        game_id: GameId,
        epoch: u64,
        completed_normally: bool,
    ) -> Result<GameOutcome, GameError> {
        match self.games.get(game_id).map(GameInstance::epoch) {
            Some(live) if live != epoch => {
                tracing::debug!(%game_id, epoch, live, "end request for an earlier instance ignored");
                Err(GameError::AlreadyEnded(game_id))
            }
            _ => self.end_game(game_id, completed_normally),
        }
    }

    /// Force-ends every active game, iterating a snapshot of the allocated
    /// IDs. Benign teardown races are logged and skipped.
    pub fn shutdown(&mut self) -> Vec<GameOutcome> {
        let ids = self.ids.current_ids();
        tracing::info!(games = ids.len(), "ending all games");

        let mut outcomes = Vec::with_capacity(ids.len());
        for game_id in ids {
            match self.end_game(game_id, false) {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) if e.is_benign_teardown() => {
                    tracing::debug!(%game_id, error = %e, "game already gone during shutdown");
                }
                Err(e) => tracing::warn!(%game_id, error = %e, "failed to end game during shutdown"),
            }
        }
        outcomes
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// `true` while another game ID can be allocated.
    pub fn can_start_game(&self) -> bool {
        self.ids.has_capacity()
    }

    /// Sends `message` to `player` through the hooks.
    pub fn notify(&mut self, player: PlayerId, message: &str) {
        self.hooks.notify(player, message);
    }

    pub fn infos(&self) -> Vec<GameInfo> {
        self.games.infos()
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn games(&self) -> &CurrentGames {
        &self.games
    }

    pub fn ids(&self) -> &GameIdHandler {
        &self.ids
    }

    pub fn provisioner(&self) -> &P {
        &self.provisioner
    }

    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    pub fn hooks_mut(&mut self) -> &mut H {
        &mut self.hooks
    }
}
