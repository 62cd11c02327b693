//! Error types for the queue layer.

use skyarena_protocol::PlayerId;

/// Errors that can occur while queueing players.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// The player is already waiting in the queue.
    #[error("player {0} is already queued")]
    AlreadyQueued(PlayerId),
}
