//! Registry of active game instances.
//!
//! Lookups hand out `Option<&GameInstance>`: a shared borrow of the
//! instance, not a copy. While a caller holds that reference the borrow
//! checker won't let anyone call a `&mut self` method on the registry, so
//! a reader can never see an index halfway through an update. Callers
//! that need the data to outlive the borrow take a [`GameInfo`] snapshot
//! instead.
//!
//! The reverse indexes (`by_arena`, `by_player`) are plain `HashMap`s
//! pointing back at a [`GameId`], the same "secondary index" shape a
//! database uses: O(1) lookup in exchange for keeping them in sync on
//! every insert and remove.

use std::collections::HashMap;

use skyarena_protocol::{ArenaId, GameId, PlayerId};

use crate::{GameError, GameInfo, GameInstance};

/// Tracks every active game and which player and arena belong to it.
///
/// Three indexes are kept in lockstep:
/// - `games`: ID → instance
/// - `by_arena`: arena → ID (one game per arena)
/// - `by_player`: player → ID (a player is in at most ONE game)
///
/// Membership changes go through [`add_member`](Self::add_member) and
/// [`remove_member`](Self::remove_member) so the player index can't drift.
#[derive(Debug, Default)]
pub struct CurrentGames {
    games: HashMap<GameId, GameInstance>,
    by_arena: HashMap<ArenaId, GameId>,
    by_player: HashMap<PlayerId, GameId>,
}

impl CurrentGames {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an instance to the registry.
    ///
    /// All checks run before anything is inserted, so a rejected
    /// registration leaves the registry untouched.
    pub fn register(&mut self, instance: GameInstance) -> Result<(), GameError> {
        let game_id = instance.id();
        let arena = instance.arena();

        if self.games.contains_key(&game_id) {
            return Err(GameError::DuplicateGame(game_id));
        }
        if self.by_arena.contains_key(&arena) {
            return Err(GameError::DuplicateArena(arena));
        }
        if let Some((player, other)) = instance
            .members()
            .iter()
            .find_map(|p| self.by_player.get(p).map(|g| (*p, *g)))
        {
            return Err(GameError::AlreadyInGame(player, other));
        }

        for player in instance.members() {
            self.by_player.insert(*player, game_id);
        }
        self.by_arena.insert(arena, game_id);
        tracing::info!(
            %game_id,
            %arena,
            players = instance.player_count(),
            "game registered"
        );
        self.games.insert(game_id, instance);
        Ok(())
    }

    /// Removes an instance and every index entry pointing at it.
    pub fn unregister(&mut self, game_id: GameId) -> Result<GameInstance, GameError> {
        let instance = self
            .games
            .remove(&game_id)
            .ok_or(GameError::NotFound(game_id))?;

        self.by_arena.remove(&instance.arena());
        self.by_player.retain(|_, g| *g != game_id);
        tracing::info!(%game_id, "game unregistered");
        Ok(instance)
    }

    /// The game `player` is currently in, if any.
    pub fn lookup_by_player(&self, player: PlayerId) -> Option<&GameInstance> {
        self.by_player.get(&player).and_then(|id| self.games.get(id))
    }

    /// The game occupying `arena`, if any.
    pub fn lookup_by_arena(&self, arena: ArenaId) -> Option<&GameInstance> {
        self.by_arena.get(&arena).and_then(|id| self.games.get(id))
    }

    pub fn game_of(&self, player: PlayerId) -> Option<GameId> {
        self.by_player.get(&player).copied()
    }

    pub fn get(&self, game_id: GameId) -> Option<&GameInstance> {
        self.games.get(&game_id)
    }

    pub(crate) fn get_mut(&mut self, game_id: GameId) -> Option<&mut GameInstance> {
        self.games.get_mut(&game_id)
    }

    pub fn contains(&self, game_id: GameId) -> bool {
        self.games.contains_key(&game_id)
    }

    /// Adds `player` to a game that is still accepting joins.
    pub(crate) fn add_member(&mut self, game_id: GameId, player: PlayerId) -> Result<(), GameError> {
        if let Some(current) = self.by_player.get(&player) {
            return Err(GameError::AlreadyInGame(player, *current));
        }
        let instance = self
            .games
            .get_mut(&game_id)
            .ok_or(GameError::NotFound(game_id))?;
        if !instance.state().is_joinable() {
            return Err(GameError::InvalidState(format!(
                "game {} is {} and not accepting players",
                game_id,
                instance.state()
            )));
        }

        instance.push_member(player);
        self.by_player.insert(player, game_id);
        Ok(())
    }

    /// Removes `player` from whatever game they're in. Returns that game's ID.
    pub(crate) fn remove_member(&mut self, player: PlayerId) -> Option<GameId> {
        let game_id = self.by_player.remove(&player)?;
        if let Some(instance) = self.games.get_mut(&game_id) {
            instance.remove_member(player);
        }
        Some(game_id)
    }

    /// The lowest-ID `Waiting` game with room for another player.
    pub fn find_joinable(&self, max_players: usize) -> Option<GameId> {
        self.games
            .values()
            .filter(|g| g.state().is_joinable() && g.player_count() < max_players)
            .map(GameInstance::id)
            .min()
    }

    /// Active game IDs, ascending.
    pub fn ids(&self) -> Vec<GameId> {
        let mut ids: Vec<GameId> = self.games.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Snapshots of every active game, ordered by ID.
    pub fn infos(&self) -> Vec<GameInfo> {
        let mut infos: Vec<GameInfo> = self.games.values().map(GameInstance::info).collect();
        infos.sort_by_key(|i| i.game_id);
        infos
    }

    pub fn len(&self) -> usize {
        self.games.len()
    }

    pub fn is_empty(&self) -> bool {
        self.games.is_empty()
    }
}
