//! The dispatcher: the single owner of the queue and the game handler.
//!
//! Every host event, admin command, and timer callback ends up as a call
//! on [`Dispatcher`]. Because it is mutated only through `&mut self`,
//! each call is atomic with respect to every other: a quit racing a batch
//! either removes the player from the queue first, or finds them already
//! in their new game and eliminates them there.
//!
//! ## `&mut self` as a lock
//!
//! Rust allows one mutable borrow at a time. Whoever holds
//! `&mut Dispatcher` has exclusive access to the queue, the registries,
//! and the ID allocator together, with no `Mutex` involved. The service
//! actor is the only owner, so "exclusive access" and "the actor is
//! processing this request" are the same thing.
//!
//! ## Deferred batching
//!
//! [`enqueue`](Dispatcher::enqueue) only records the player;
//! [`flush_batches`](Dispatcher::flush_batches) turns the queue into
//! games. Splitting the two lets the actor take a whole burst of joins
//! and form one batch from it.

use serde::Serialize;
use skyarena_game::{
    ArenaProvisioner, Departure, GameError, GameHandler, GameHooks, GameInfo, GameOutcome,
    GameState, GameTimer,
};
use skyarena_protocol::{ArenaId, Command, CommandResponse, GameEvent, GameId, PlayerId};
use skyarena_queue::{GameQueue, QueueEntry};
use skyarena_timer::{Backoff, Scheduler, TaskHandle};

use crate::{SkyWarsConfig, SkyWarsError};

/// Fired by the retry timer after a batch found no free arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBatch;

/// Where a player ended up after asking to join.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "placement", rename_all = "snake_case")]
pub enum JoinOutcome {
    /// In a game (a new one, or a waiting one they joined late).
    Joined { game: GameId },

    /// Waiting in the queue at this 1-based position.
    Queued { position: usize },
}

/// What a leave request did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaveOutcome {
    /// Taken out of the queue.
    Dequeued,

    /// Taken out of their game.
    LeftGame(Departure),

    /// The player was neither queued nor in a game.
    NotTracked,
}

/// Snapshot of the whole system, as reported by the status command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    /// Queued players, oldest first.
    pub queued: Vec<PlayerId>,
    /// Active games, ordered by ID.
    pub games: Vec<GameInfo>,
    pub max_concurrent_games: u32,
    /// Free arenas, if the provisioner reports it.
    pub free_arenas: Option<usize>,
    /// `true` while a batch is parked waiting for an arena.
    pub waiting_for_arena: bool,
}

impl StatusReport {
    pub fn queue_len(&self) -> usize {
        self.queued.len()
    }

    /// Human-readable form, one line per game.
    pub fn summary(&self) -> String {
        let mut out = format!(
            "{}/{} games active, {} queued",
            self.games.len(),
            self.max_concurrent_games,
            self.queued.len()
        );
        if self.waiting_for_arena {
            out.push_str(" (waiting for an arena)");
        }
        for game in &self.games {
            out.push_str(&format!(
                "\n  game {} in {}: {}, {} players",
                game.game_id.0,
                game.arena,
                game.state,
                game.players.len()
            ));
        }
        out
    }
}

/// Owns the [`GameQueue`] and the [`GameHandler`] and moves players
/// between them.
///
/// Batches are formed in [`flush_batches`](Self::flush_batches). The
/// public operations flush on their own; [`enqueue`](Self::enqueue) does
/// not, so a caller holding a burst of joins can enqueue them all first
/// and then flush once.
pub struct Dispatcher<P, H> {
    queue: GameQueue,
    games: GameHandler<P, H>,
    retries: Scheduler<RetryBatch>,
    backoff: Backoff,

    /// Armed while a batch waits for an arena. No batch is attempted
    /// until it fires or a game ends and frees an arena.
    retry_task: Option<TaskHandle>,

    /// Set when the last start attempt hit the game cap. Cleared when a
    /// game ends.
    at_capacity: bool,
}

impl<P: ArenaProvisioner, H: GameHooks> Dispatcher<P, H> {
    pub fn new(
        config: &SkyWarsConfig,
        provisioner: P,
        hooks: H,
        timers: Scheduler<GameTimer>,
        retries: Scheduler<RetryBatch>,
    ) -> Self {
        let config = config.clone().validated();
        Self {
            queue: GameQueue::new(config.queue_config()),
            games: GameHandler::new(config.game.clone(), provisioner, hooks, timers),
            retries,
            backoff: config.retry.backoff(),
            retry_task: None,
            at_capacity: false,
        }
    }

    // -----------------------------------------------------------------------
    // Joining and leaving
    // -----------------------------------------------------------------------

    /// Places a player without forming batches.
    ///
    /// With an empty queue the player goes straight into a waiting game
    /// that has room. Otherwise they join the back of the queue, behind
    /// the players already waiting.
    ///
    /// # Errors
    /// `AlreadyInGame` or `AlreadyQueued` if the player is tracked
    /// anywhere. Nothing is changed in that case.
    pub fn enqueue(&mut self, player: PlayerId) -> Result<JoinOutcome, SkyWarsError> {
        if let Some(game) = self.games.games().game_of(player) {
            return Err(GameError::AlreadyInGame(player, game).into());
        }
        if self.queue.is_empty() {
            if let Some(game) = self.games.join_waiting(player)? {
                return Ok(JoinOutcome::Joined { game });
            }
        }
        let queued = self.queue.enqueue(player)?;
        Ok(JoinOutcome::Queued {
            position: queued.position,
        })
    }

    /// Enqueues a player, forms any ready batches, and reports where the
    /// player ended up.
    pub fn join(&mut self, player: PlayerId) -> Result<JoinOutcome, SkyWarsError> {
        self.enqueue(player)?;
        self.flush_batches();
        self.placement(player).ok_or_else(|| {
            GameError::InvalidState(format!("player {player} was not placed")).into()
        })
    }

    /// Where `player` currently is, if anywhere.
    pub fn placement(&self, player: PlayerId) -> Option<JoinOutcome> {
        if let Some(game) = self.games.games().game_of(player) {
            return Some(JoinOutcome::Joined { game });
        }
        self.queue
            .position(player)
            .map(|position| JoinOutcome::Queued { position })
    }

    /// Takes a player out of the queue or their game.
    pub fn leave(&mut self, player: PlayerId) -> LeaveOutcome {
        let outcome = self.withdraw(player);
        if matches!(outcome, LeaveOutcome::LeftGame(_)) {
            self.flush_batches();
        }
        outcome
    }

    fn withdraw(&mut self, player: PlayerId) -> LeaveOutcome {
        if self.queue.remove(player) {
            return LeaveOutcome::Dequeued;
        }
        match self.games.remove_player(player) {
            Some(departure) => {
                if departure.outcome.is_some() {
                    self.game_ended();
                }
                LeaveOutcome::LeftGame(departure)
            }
            None => LeaveOutcome::NotTracked,
        }
    }

    /// Death only matters inside a running game.
    fn eliminate(&mut self, player: PlayerId) {
        let state = self
            .games
            .games()
            .lookup_by_player(player)
            .map(|g| g.state());
        if state != Some(GameState::Running) {
            tracing::debug!(player_id = %player, "death outside a running game ignored");
            return;
        }
        if let Some(Departure {
            outcome: Some(_), ..
        }) = self.games.remove_player(player)
        {
            self.game_ended();
        }
    }

    // -----------------------------------------------------------------------
    // Ending games
    // -----------------------------------------------------------------------

    /// Force-cancels a game (`completedNormally = false`).
    pub fn cancel(&mut self, game: GameId) -> Result<GameOutcome, SkyWarsError> {
        let outcome = self.games.end_game(game, false)?;
        tracing::info!(game_id = %game, "game cancelled by command");
        self.game_ended();
        self.flush_batches();
        Ok(outcome)
    }

    /// The host saw a win. Losing the race against another teardown path
    /// is expected and only logged, and so is a report for an earlier
    /// instance whose ID has since been reused.
    fn finish(&mut self, game: GameId, epoch: u64) {
        match self.games.end_instance(game, epoch, true) {
            Ok(_) => self.game_ended(),
            Err(e) if e.is_benign_teardown() => {
                tracing::debug!(game_id = %game, error = %e, "win reported for a game that already ended");
            }
            Err(e) => tracing::warn!(game_id = %game, error = %e, "failed to end game on win"),
        }
    }

    /// A game slot and an arena just came free: stop waiting.
    fn game_ended(&mut self) {
        self.at_capacity = false;
        if let Some(task) = self.retry_task.take() {
            task.cancel();
            tracing::debug!("arena freed, retrying parked batch now");
        }
    }

    // -----------------------------------------------------------------------
    // Events and timers
    // -----------------------------------------------------------------------

    /// Applies a host event and forms any ready batches.
    pub fn handle_event(&mut self, event: GameEvent) {
        self.apply_event(event);
        self.flush_batches();
    }

    /// Applies a host event without forming batches.
    pub(crate) fn apply_event(&mut self, event: GameEvent) {
        tracing::trace!(?event, "host event");
        match event {
            GameEvent::PlayerJoinRequest { player } => {
                if let Err(e) = self.enqueue(player) {
                    tracing::debug!(player_id = %player, error = %e, "join request rejected");
                    self.games.notify(player, &e.user_message());
                }
            }
            GameEvent::PortalUse { player } => {
                if let Err(e) = self.enqueue(player) {
                    tracing::trace!(player_id = %player, error = %e, "portal use ignored");
                }
            }
            GameEvent::PlayerQuit { player } => {
                self.withdraw(player);
            }
            GameEvent::PlayerDeath { player } => self.eliminate(player),
            GameEvent::GameWinCondition { game, epoch } => self.finish(game, epoch),
        }
    }

    pub fn handle_timer(&mut self, timer: GameTimer) {
        if self.games.handle_timer(timer).is_some() {
            self.game_ended();
        }
        self.flush_batches();
    }

    /// The retry timer fired: try the parked batch again.
    pub fn on_retry(&mut self, _retry: RetryBatch) {
        if let Some(task) = self.retry_task.take() {
            task.cancel();
        }
        self.flush_batches();
    }

    // -----------------------------------------------------------------------
    // Batching
    // -----------------------------------------------------------------------

    /// Moves queued players into games: first into waiting games with
    /// room, then as new batches while enough players are queued.
    ///
    /// Returns the IDs of the games started.
    pub fn flush_batches(&mut self) -> Vec<GameId> {
        self.fill_waiting_games();

        let mut started = Vec::new();
        while self.retry_task.is_none() && self.queue.is_batch_ready() {
            if self.at_capacity {
                if !self.games.can_start_game() {
                    break;
                }
                self.at_capacity = false;
            }
            let Some(batch) = self.queue.take_batch() else {
                break;
            };
            let players: Vec<PlayerId> = batch.iter().map(|e| e.player).collect();
            let waited = batch.first().map(|e| e.enqueued_at.elapsed()).unwrap_or_default();
            match self.games.start_game(players) {
                Ok(game) => {
                    tracing::debug!(game_id = %game, waited_ms = waited.as_millis() as u64, "batch placed");
                    self.backoff.reset();
                    started.push(game);
                }
                Err(e) => {
                    self.requeue(batch, e);
                    break;
                }
            }
        }
        started
    }

    fn fill_waiting_games(&mut self) {
        let max = self.games.config().max_players;
        while !self.queue.is_empty() && self.games.games().find_joinable(max).is_some() {
            let entries = self.queue.dequeue_entries(1);
            let Some(player) = entries.first().map(|e| e.player) else {
                break;
            };
            match self.games.join_waiting(player) {
                Ok(Some(_)) => {}
                Ok(None) => {
                    self.queue.requeue_front(entries);
                    break;
                }
                Err(e) => {
                    tracing::warn!(player_id = %player, error = %e, "could not move queued player into game");
                    self.queue.requeue_front(entries);
                    break;
                }
            }
        }
    }

    /// Puts a batch that failed to start back at the queue front.
    fn requeue(&mut self, batch: Vec<QueueEntry>, error: GameError) {
        let players: Vec<PlayerId> = batch.iter().map(|e| e.player).collect();
        self.queue.requeue_front(batch);

        match error {
            GameError::NoArenaAvailable => {
                let delay = self.backoff.next_delay();
                tracing::info!(
                    players = players.len(),
                    attempt = self.backoff.attempt(),
                    delay_ms = delay.as_millis() as u64,
                    "no arena available, batch re-queued"
                );
                self.retry_task = Some(self.retries.schedule(delay, RetryBatch));
                // Tell players once per wait, not on every retry.
                if self.backoff.attempt() == 1 {
                    self.notify_all(&players, &error.user_message());
                }
            }
            GameError::ResourceExhausted { cap } => {
                tracing::warn!(cap, players = players.len(), "game cap reached, batch re-queued");
                self.at_capacity = true;
                self.notify_all(&players, &error.user_message());
            }
            other => {
                tracing::warn!(error = %other, players = players.len(), "failed to start game, batch re-queued");
            }
        }
    }

    fn notify_all(&mut self, players: &[PlayerId], message: &str) {
        for player in players {
            self.games.notify(*player, message);
        }
    }

    // -----------------------------------------------------------------------
    // Commands and queries
    // -----------------------------------------------------------------------

    /// Runs an admin command and renders the result for the command layer.
    pub fn execute(&mut self, command: Command) -> CommandResponse {
        tracing::debug!(?command, "admin command");
        match command {
            Command::Join { player } => match self.join(player) {
                Ok(JoinOutcome::Joined { game }) => {
                    CommandResponse::ok(format!("You joined game {}.", game.0))
                }
                Ok(JoinOutcome::Queued { position }) if self.at_capacity => CommandResponse::ok(format!(
                    "You are #{position} in the queue. Too many games are running, please be patient."
                )),
                Ok(JoinOutcome::Queued { position }) => {
                    CommandResponse::ok(format!("You are #{position} in the queue."))
                }
                Err(e) => CommandResponse::failed(e.user_message()),
            },
            Command::Leave { player } => match self.leave(player) {
                LeaveOutcome::Dequeued => CommandResponse::ok("You left the queue."),
                LeaveOutcome::LeftGame(departure) => {
                    CommandResponse::ok(format!("You left game {}.", departure.game.0))
                }
                LeaveOutcome::NotTracked => {
                    CommandResponse::failed("You are not in a game or in the queue.")
                }
            },
            Command::Cancel { game } => match self.cancel(game) {
                Ok(_) => CommandResponse::ok(format!("Game {} cancelled.", game.0)),
                Err(e) => CommandResponse::failed(e.user_message()),
            },
            Command::Status => CommandResponse::ok(self.status().summary()),
            Command::Version => CommandResponse::ok(format!("SkyArena {}", crate::VERSION)),
        }
    }

    pub fn status(&self) -> StatusReport {
        StatusReport {
            queued: self.queue.players(),
            games: self.games.infos(),
            max_concurrent_games: self.games.config().max_concurrent_games,
            free_arenas: self.games.provisioner().available(),
            waiting_for_arena: self.retry_task.is_some(),
        }
    }

    pub fn lookup_player(&self, player: PlayerId) -> Option<GameInfo> {
        self.games.games().lookup_by_player(player).map(|g| g.info())
    }

    pub fn lookup_arena(&self, arena: ArenaId) -> Option<GameInfo> {
        self.games.games().lookup_by_arena(arena).map(|g| g.info())
    }

    // -----------------------------------------------------------------------
    // Shutdown
    // -----------------------------------------------------------------------

    /// Force-ends every game, then empties the queue and tells each queued
    /// player. Safe to call more than once.
    pub fn shutdown(&mut self) -> Vec<GameOutcome> {
        if let Some(task) = self.retry_task.take() {
            task.cancel();
        }
        let outcomes = self.games.shutdown();
        let queued = self.queue.drain();
        self.notify_all(&queued, "SkyWars is shutting down.");
        tracing::info!(games = outcomes.len(), queued = queued.len(), "dispatcher shut down");
        outcomes
    }

    pub fn queue(&self) -> &GameQueue {
        &self.queue
    }

    pub fn games(&self) -> &GameHandler<P, H> {
        &self.games
    }
}
