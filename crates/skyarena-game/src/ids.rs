//! Game ID allocation.
//!
//! IDs are small integers in `[0, cap)`. `allocate` always returns the
//! smallest free one, so IDs released by finished games are reused
//! before the range grows. Each allocated ID carries the roster of
//! players enrolled in that game.

use std::collections::{BTreeMap, BTreeSet};

use skyarena_protocol::{GameId, PlayerId};

use crate::GameError;

/// Allocates and reclaims game IDs.
///
/// Like the other registries this is a plain struct: it is owned by the
/// [`GameHandler`](crate::GameHandler) and only touched through `&mut self`.
pub struct GameIdHandler {
    /// Allocated IDs and their enrolled players. The key set IS the set of
    /// used IDs; there is no separate "used" set to drift out of sync.
    rosters: BTreeMap<GameId, BTreeSet<PlayerId>>,

    /// Exclusive upper bound on IDs, i.e. the concurrent game cap.
    cap: u32,
}

impl GameIdHandler {
    pub fn new(cap: u32) -> Self {
        Self {
            rosters: BTreeMap::new(),
            cap,
        }
    }

    /// Returns the smallest unused ID, marks it used, and gives it an
    /// empty roster.
    ///
    /// # Errors
    /// [`GameError::ResourceExhausted`] if every ID below the cap is taken.
    pub fn allocate(&mut self) -> Result<GameId, GameError> {
        // Keys iterate in ascending order; the first gap is the answer.
        let mut candidate = 0u32;
        for id in self.rosters.keys() {
            if id.0 != candidate {
                break;
            }
            candidate += 1;
        }

        if candidate >= self.cap {
            tracing::warn!(cap = self.cap, "game ID space exhausted");
            return Err(GameError::ResourceExhausted { cap: self.cap });
        }

        let id = GameId(candidate);
        self.rosters.insert(id, BTreeSet::new());
        tracing::debug!(game_id = %id, "game ID allocated");
        Ok(id)
    }

    /// Frees an ID and discards its roster, returning the roster.
    ///
    /// # Errors
    /// [`GameError::NotFound`] if the ID wasn't allocated. Callers on
    /// shutdown paths treat this as benign.
    pub fn release(&mut self, id: GameId) -> Result<BTreeSet<PlayerId>, GameError> {
        let roster = self.rosters.remove(&id).ok_or(GameError::NotFound(id))?;
        tracing::debug!(game_id = %id, "game ID released");
        Ok(roster)
    }

    /// Adds players to an allocated ID's roster.
    pub fn enroll(&mut self, id: GameId, players: &[PlayerId]) -> Result<(), GameError> {
        let roster = self.rosters.get_mut(&id).ok_or(GameError::NotFound(id))?;
        roster.extend(players.iter().copied());
        Ok(())
    }

    /// Snapshot of the players enrolled under `id`, or `None` if the ID
    /// isn't allocated.
    pub fn get_players(&self, id: GameId) -> Option<Vec<PlayerId>> {
        self.rosters.get(&id).map(|r| r.iter().copied().collect())
    }

    /// Snapshot of every allocated ID, ascending.
    ///
    /// This is a copy: callers may end games (and so release IDs) while
    /// iterating it.
    pub fn current_ids(&self) -> Vec<GameId> {
        self.rosters.keys().copied().collect()
    }

    pub fn is_allocated(&self, id: GameId) -> bool {
        self.rosters.contains_key(&id)
    }

    /// Number of allocated IDs.
    pub fn len(&self) -> usize {
        self.rosters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rosters.is_empty()
    }

    /// `true` if another ID can be allocated.
    pub fn has_capacity(&self) -> bool {
        (self.rosters.len() as u64) < u64::from(self.cap)
    }

    pub fn cap(&self) -> u32 {
        self.cap
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gid(id: u32) -> GameId {
        GameId(id)
    }

    #[test]
    fn test_allocate_starts_at_zero_and_counts_up() {
        let mut ids = GameIdHandler::new(8);
        assert_eq!(ids.allocate().unwrap(), gid(0));
        assert_eq!(ids.allocate().unwrap(), gid(1));
        assert_eq!(ids.allocate().unwrap(), gid(2));
    }

    #[test]
    fn test_allocate_reuses_smallest_released_id() {
        let mut ids = GameIdHandler::new(8);
        for _ in 0..3 {
            ids.allocate().unwrap();
        }

        ids.release(gid(1)).unwrap();

        assert_eq!(ids.allocate().unwrap(), gid(1), "must reuse 1, not hand out 3");
        assert_eq!(ids.allocate().unwrap(), gid(3));
    }

    #[test]
    fn test_allocate_prefers_lowest_of_several_gaps() {
        let mut ids = GameIdHandler::new(8);
        for _ in 0..5 {
            ids.allocate().unwrap();
        }
        ids.release(gid(3)).unwrap();
        ids.release(gid(1)).unwrap();

        assert_eq!(ids.allocate().unwrap(), gid(1));
        assert_eq!(ids.allocate().unwrap(), gid(3));
    }

    #[test]
    fn test_allocate_at_cap_returns_resource_exhausted() {
        let mut ids = GameIdHandler::new(2);
        ids.allocate().unwrap();
        ids.allocate().unwrap();

        assert_eq!(ids.allocate(), Err(GameError::ResourceExhausted { cap: 2 }));
        assert_eq!(ids.len(), 2, "failed allocate must not mutate");
        assert!(!ids.has_capacity());
    }

    #[test]
    fn test_allocate_gives_empty_roster() {
        let mut ids = GameIdHandler::new(4);
        let id = ids.allocate().unwrap();
        assert_eq!(ids.get_players(id), Some(vec![]));
    }

    #[test]
    fn test_release_unknown_id_returns_not_found() {
        let mut ids = GameIdHandler::new(4);
        assert_eq!(ids.release(gid(2)), Err(GameError::NotFound(gid(2))));
    }

    #[test]
    fn test_release_twice_is_safe() {
        let mut ids = GameIdHandler::new(4);
        let id = ids.allocate().unwrap();
        ids.release(id).unwrap();

        assert!(ids.release(id).is_err());
        assert!(ids.is_empty());
    }

    #[test]
    fn test_release_discards_roster() {
        let mut ids = GameIdHandler::new(4);
        let id = ids.allocate().unwrap();
        ids.enroll(id, &[PlayerId(1), PlayerId(2)]).unwrap();

        let roster = ids.release(id).unwrap();

        assert_eq!(roster.len(), 2);
        assert_eq!(ids.get_players(id), None);
    }

    #[test]
    fn test_enroll_unknown_id_returns_not_found() {
        let mut ids = GameIdHandler::new(4);
        assert!(ids.enroll(gid(0), &[PlayerId(1)]).is_err());
    }

    #[test]
    fn test_current_ids_is_a_stable_snapshot() {
        let mut ids = GameIdHandler::new(4);
        for _ in 0..3 {
            ids.allocate().unwrap();
        }

        let snapshot = ids.current_ids();
        for id in &snapshot {
            ids.release(*id).unwrap();
        }

        assert_eq!(snapshot, vec![gid(0), gid(1), gid(2)]);
        assert!(ids.current_ids().is_empty());
    }

    #[test]
    fn test_release_of_lower_ids_moves_next_allocation_down() {
        let mut ids = GameIdHandler::new(8);
        for _ in 0..5 {
            ids.allocate().unwrap();
        }

        // Release k = 3, then every ID below it.
        ids.release(gid(3)).unwrap();
        for k in 0..3 {
            ids.release(gid(k)).unwrap();
        }

        assert_eq!(ids.allocate().unwrap(), gid(0));
        assert_eq!(ids.allocate().unwrap(), gid(1));
        assert_eq!(ids.allocate().unwrap(), gid(2));
        assert_eq!(ids.allocate().unwrap(), gid(3));
        assert_eq!(ids.allocate().unwrap(), gid(5));
    }
}
