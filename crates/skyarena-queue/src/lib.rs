//! Player queue for SkyArena.
//!
//! Players who want to play wait here, in strict arrival order, until
//! enough of them are queued to fill a game. The orchestrator then takes
//! them out as a batch and hands the batch to the game layer.
//!
//! ```text
//! Orchestrator (above)  ← takes batches, re-queues them if no arena is free
//!     ↕
//! Queue (this crate)    ← FIFO of waiting players
//!     ↕
//! Protocol (below)      ← provides PlayerId
//! ```

mod error;
mod queue;

pub use error::QueueError;
pub use queue::{Enqueued, GameQueue, QueueConfig, QueueEntry};
