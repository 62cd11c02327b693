//! The game queue: a FIFO of players waiting for a game.
//!
//! # Concurrency note
//!
//! `GameQueue` is NOT thread-safe by itself. It is owned by the single
//! dispatch loop and mutated only through `&mut self`, which makes every
//! operation atomic with respect to every other one: a player can never be
//! dequeued twice, and a quit racing a batch either removes the player
//! before the batch is taken or finds them already gone.

use std::collections::{HashSet, VecDeque};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use skyarena_protocol::PlayerId;

use crate::QueueError;

// ---------------------------------------------------------------------------
// QueueConfig
// ---------------------------------------------------------------------------

/// Batch size limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Queue length at which a batch becomes ready.
    pub min_batch: usize,

    /// Most players taken out as one batch.
    pub max_batch: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            min_batch: 2,
            max_batch: 8,
        }
    }
}

impl QueueConfig {
    /// Forces `1 <= min_batch <= max_batch`.
    pub fn validated(mut self) -> Self {
        if self.min_batch == 0 {
            tracing::warn!("min_batch of 0 raised to 1");
            self.min_batch = 1;
        }
        if self.max_batch < self.min_batch {
            tracing::warn!(
                max_batch = self.max_batch,
                min_batch = self.min_batch,
                "max_batch below min_batch, raising"
            );
            self.max_batch = self.min_batch;
        }
        self
    }
}

// ---------------------------------------------------------------------------
// QueueEntry
// ---------------------------------------------------------------------------

/// A single waiting player.
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub player: PlayerId,

    /// When the player was queued. Informational; ordering uses `seq`.
    pub enqueued_at: Instant,

    /// Arrival order at the queue. Two players queued within the same
    /// clock tick still get distinct, ordered sequence numbers.
    pub seq: u64,
}

/// Result of a successful [`GameQueue::enqueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Enqueued {
    /// 1-based position in the queue.
    pub position: usize,
}

// ---------------------------------------------------------------------------
// GameQueue
// ---------------------------------------------------------------------------

/// FIFO queue of players waiting to be placed into a game.
pub struct GameQueue {
    /// Waiting players, oldest at the front.
    entries: VecDeque<QueueEntry>,

    /// Index of queued players for O(1) membership checks. Kept in sync
    /// with `entries`.
    members: HashSet<PlayerId>,

    config: QueueConfig,
    next_seq: u64,
}

impl GameQueue {
    pub fn new(config: QueueConfig) -> Self {
        Self {
            entries: VecDeque::new(),
            members: HashSet::new(),
            config: config.validated(),
            next_seq: 0,
        }
    }

    /// Appends a player to the back of the queue.
    ///
    /// # Errors
    /// Returns [`QueueError::AlreadyQueued`] if the player is already
    /// waiting. The queue is left untouched.
    pub fn enqueue(&mut self, player: PlayerId) -> Result<Enqueued, QueueError> {
        if self.members.contains(&player) {
            return Err(QueueError::AlreadyQueued(player));
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.push_back(QueueEntry {
            player,
            enqueued_at: Instant::now(),
            seq,
        });
        self.members.insert(player);

        let position = self.entries.len();
        tracing::info!(player_id = %player, position, "player queued");
        if position == self.config.min_batch {
            tracing::debug!(queued = position, "queue reached batch threshold");
        }

        Ok(Enqueued { position })
    }

    /// Removes up to `max` of the oldest players, in FIFO order.
    ///
    /// Returns fewer than `max` only if the queue runs out.
    pub fn dequeue_batch(&mut self, max: usize) -> Vec<PlayerId> {
        self.dequeue_entries(max)
            .into_iter()
            .map(|e| e.player)
            .collect()
    }

    /// Like [`dequeue_batch`](Self::dequeue_batch), but keeps the full
    /// entries so they can be put back with
    /// [`requeue_front`](Self::requeue_front).
    pub fn dequeue_entries(&mut self, max: usize) -> Vec<QueueEntry> {
        let n = max.min(self.entries.len());
        let batch: Vec<QueueEntry> = self.entries.drain(..n).collect();
        for entry in &batch {
            self.members.remove(&entry.player);
        }
        if !batch.is_empty() {
            tracing::debug!(players = batch.len(), remaining = self.entries.len(), "batch dequeued");
        }
        batch
    }

    /// Takes the next batch if at least `min_batch` players are waiting.
    pub fn take_batch(&mut self) -> Option<Vec<QueueEntry>> {
        if !self.is_batch_ready() {
            return None;
        }
        Some(self.dequeue_entries(self.config.max_batch))
    }

    /// Puts previously dequeued entries back at the front, keeping their
    /// original order and sequence numbers.
    ///
    /// Players that were queued again in the meantime are skipped.
    /// Returns how many entries went back.
    pub fn requeue_front(&mut self, entries: Vec<QueueEntry>) -> usize {
        let mut restored = 0;
        for entry in entries.into_iter().rev() {
            if self.members.insert(entry.player) {
                self.entries.push_front(entry);
                restored += 1;
            }
        }
        if restored > 0 {
            tracing::debug!(players = restored, "batch returned to queue front");
        }
        restored
    }

    /// Cancels a queued player. Returns `false` if they weren't queued.
    pub fn remove(&mut self, player: PlayerId) -> bool {
        if !self.members.remove(&player) {
            return false;
        }
        self.entries.retain(|e| e.player != player);
        tracing::info!(player_id = %player, "player left queue");
        true
    }

    /// Empties the queue, returning the players in FIFO order.
    pub fn drain(&mut self) -> Vec<PlayerId> {
        self.members.clear();
        self.entries.drain(..).map(|e| e.player).collect()
    }

    pub fn contains(&self, player: PlayerId) -> bool {
        self.members.contains(&player)
    }

    /// 1-based position of a queued player.
    pub fn position(&self, player: PlayerId) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.player == player)
            .map(|i| i + 1)
    }

    /// Snapshot of the waiting players, oldest first.
    pub fn players(&self) -> Vec<PlayerId> {
        self.entries.iter().map(|e| e.player).collect()
    }

    /// `true` once at least `min_batch` players are waiting.
    pub fn is_batch_ready(&self) -> bool {
        self.entries.len() >= self.config.min_batch
    }

    /// Current queue length.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn config(&self) -> QueueConfig {
        self.config
    }
}

// =========================================================================
// Tests
// =========================================================================
