//! Arena provisioning.

use std::collections::VecDeque;

use skyarena_protocol::ArenaId;

/// Supplies arenas for new games.
///
/// A real host might clone a world template here; [`ArenaPool`] is the
/// fixed-size in-memory version.
pub trait ArenaProvisioner: Send + 'static {
    /// Hands out a free arena, or `None` if there isn't one.
    fn acquire_arena(&mut self) -> Option<ArenaId>;

    /// Returns an arena once its game has ended.
    fn release_arena(&mut self, arena: ArenaId);

    /// Number of free arenas, if the provisioner knows it.
    fn available(&self) -> Option<usize> {
        None
    }
}

impl<P: ArenaProvisioner + ?Sized> ArenaProvisioner for Box<P> {
    fn acquire_arena(&mut self) -> Option<ArenaId> {
        (**self).acquire_arena()
    }

    fn release_arena(&mut self, arena: ArenaId) {
        (**self).release_arena(arena);
    }

    fn available(&self) -> Option<usize> {
        (**self).available()
    }
}

/// A fixed set of arenas handed out first-in, first-out.
#[derive(Debug, Clone, Default)]
pub struct ArenaPool {
    free: VecDeque<ArenaId>,
    total: usize,
}

impl ArenaPool {
    pub fn new(arenas: impl IntoIterator<Item = ArenaId>) -> Self {
        let free: VecDeque<ArenaId> = arenas.into_iter().collect();
        let total = free.len();
        Self { free, total }
    }

    /// A pool of arenas `0..count`.
    pub fn with_count(count: u32) -> Self {
        Self::new((0..count).map(ArenaId))
    }

    pub fn total(&self) -> usize {
        self.total
    }
}

impl ArenaProvisioner for ArenaPool {
    fn acquire_arena(&mut self) -> Option<ArenaId> {
        let arena = self.free.pop_front();
        if let Some(arena) = arena {
            tracing::debug!(%arena, free = self.free.len(), "arena acquired");
        }
        arena
    }

    fn release_arena(&mut self, arena: ArenaId) {
        if self.free.contains(&arena) {
            tracing::warn!(%arena, "arena released twice, ignoring");
            return;
        }
        self.free.push_back(arena);
        tracing::debug!(%arena, free = self.free.len(), "arena released");
    }

    fn available(&self) -> Option<usize> {
        Some(self.free.len())
    }
}
