//! Service actor: a Tokio task that owns the [`Dispatcher`].
//!
//! Host listeners, admin commands, and timers all talk to the dispatcher
//! through channels. Nothing else holds a reference to it, so there is no
//! lock around the queue or the registries: the actor loop IS the
//! serialization point.

use serde::de::DeserializeOwned;
use skyarena_game::{ArenaPool, ArenaProvisioner, GameError, GameHooks, GameInfo, GameOutcome, GameTimer};
use skyarena_protocol::{
    ArenaId, Codec, Command, CommandResponse, GameEvent, GameId, PlayerId, ProtocolError,
};
use skyarena_timer::Scheduler;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::{
    Dispatcher, JoinOutcome, LeaveOutcome, RetryBatch, SkyWarsConfig, SkyWarsError, StatusReport,
};

/// Requests sent to the service actor.
///
/// Variants with a `oneshot::Sender` expect an answer; the caller waits
/// on the paired receiver.
pub(crate) enum Request {
    /// A host event (fire-and-forget).
    Event(GameEvent),

    Join {
        player: PlayerId,
        reply: oneshot::Sender<Result<JoinOutcome, SkyWarsError>>,
    },

    Leave {
        player: PlayerId,
        reply: oneshot::Sender<LeaveOutcome>,
    },

    Cancel {
        game: GameId,
        reply: oneshot::Sender<Result<GameOutcome, SkyWarsError>>,
    },

    Execute {
        command: Command,
        reply: oneshot::Sender<CommandResponse>,
    },

    Status {
        reply: oneshot::Sender<StatusReport>,
    },

    LookupPlayer {
        player: PlayerId,
        reply: oneshot::Sender<Option<GameInfo>>,
    },

    LookupArena {
        arena: ArenaId,
        reply: oneshot::Sender<Option<GameInfo>>,
    },

    /// Force-end every game and stop the actor.
    Shutdown {
        reply: oneshot::Sender<Vec<GameOutcome>>,
    },
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Handle to a running service. Used by host listeners and the command
/// layer.
///
/// Cheap to clone: it's just an `mpsc::Sender` wrapper. Every method
/// returns [`SkyWarsError::Unavailable`] once the actor has stopped.
#[derive(Clone)]
pub struct SkyWarsHandle {
    sender: mpsc::Sender<Request>,
}

impl SkyWarsHandle {
    /// Delivers a host event (fire-and-forget).
    pub async fn send_event(&self, event: GameEvent) -> Result<(), SkyWarsError> {
        self.sender
            .send(Request::Event(event))
            .await
            .map_err(|_| SkyWarsError::Unavailable)
    }

    /// Decodes a host event from bytes and delivers it.
    pub async fn send_encoded_event<C: Codec>(&self, codec: &C, data: &[u8]) -> Result<(), SkyWarsError> {
        let event: GameEvent = decode_payload(codec, data)?;
        self.send_event(event).await
    }

    /// Queues a player, or places them in a waiting game.
    ///
    /// Joins already waiting in the channel are handled together, so
    /// several players joining at once form one batch.
    pub async fn join(&self, player: PlayerId) -> Result<JoinOutcome, SkyWarsError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(Request::Join {
                player,
                reply: reply_tx,
            })
            .await
            .map_err(|_| SkyWarsError::Unavailable)?;
        reply_rx.await.map_err(|_| SkyWarsError::Unavailable)?
    }

    pub async fn leave(&self, player: PlayerId) -> Result<LeaveOutcome, SkyWarsError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(Request::Leave {
                player,
                reply: reply_tx,
            })
            .await
            .map_err(|_| SkyWarsError::Unavailable)?;
        reply_rx.await.map_err(|_| SkyWarsError::Unavailable)
    }

    /// Force-cancels a game.
    pub async fn cancel(&self, game: GameId) -> Result<GameOutcome, SkyWarsError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(Request::Cancel {
                game,
                reply: reply_tx,
            })
            .await
            .map_err(|_| SkyWarsError::Unavailable)?;
        reply_rx.await.map_err(|_| SkyWarsError::Unavailable)?
    }

    /// Runs an admin command.
    pub async fn execute(&self, command: Command) -> Result<CommandResponse, SkyWarsError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(Request::Execute {
                command,
                reply: reply_tx,
            })
            .await
            .map_err(|_| SkyWarsError::Unavailable)?;
        reply_rx.await.map_err(|_| SkyWarsError::Unavailable)
    }

    /// Decodes an admin command, runs it, and encodes the response with
    /// the same codec.
    pub async fn execute_encoded<C: Codec>(&self, codec: &C, data: &[u8]) -> Result<Vec<u8>, SkyWarsError> {
        let command: Command = decode_payload(codec, data)?;
        let response = self.execute(command).await?;
        Ok(codec.encode(&response)?)
    }

    pub async fn status(&self) -> Result<StatusReport, SkyWarsError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(Request::Status { reply: reply_tx })
            .await
            .map_err(|_| SkyWarsError::Unavailable)?;
        reply_rx.await.map_err(|_| SkyWarsError::Unavailable)
    }

    /// The game a player is in. Listeners use this to decide whether an
    /// in-world action falls under game rules.
    pub async fn lookup_player(&self, player: PlayerId) -> Result<Option<GameInfo>, SkyWarsError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(Request::LookupPlayer {
                player,
                reply: reply_tx,
            })
            .await
            .map_err(|_| SkyWarsError::Unavailable)?;
        reply_rx.await.map_err(|_| SkyWarsError::Unavailable)
    }

    /// The game running in an arena.
    pub async fn lookup_arena(&self, arena: ArenaId) -> Result<Option<GameInfo>, SkyWarsError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(Request::LookupArena {
                arena,
                reply: reply_tx,
            })
            .await
            .map_err(|_| SkyWarsError::Unavailable)?;
        reply_rx.await.map_err(|_| SkyWarsError::Unavailable)
    }

    /// Force-ends every game, empties the queue, and stops the actor.
    pub async fn shutdown(&self) -> Result<Vec<GameOutcome>, SkyWarsError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(Request::Shutdown { reply: reply_tx })
            .await
            .map_err(|_| SkyWarsError::Unavailable)?;
        reply_rx.await.map_err(|_| SkyWarsError::Unavailable)
    }
}

/// Decodes a host payload. Blank input is refused up front so the caller
/// gets a clear error instead of the codec's end-of-input message.
fn decode_payload<C: Codec, T: DeserializeOwned>(codec: &C, data: &[u8]) -> Result<T, SkyWarsError> {
    if data.iter().all(u8::is_ascii_whitespace) {
        return Err(ProtocolError::InvalidMessage("empty payload".into()).into());
    }
    Ok(codec.decode(data)?)
}

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

type JoinReply = oneshot::Sender<Result<JoinOutcome, SkyWarsError>>;

/// A read-only request, answered after the current drain has formed its
/// batches.
enum Query {
    Status(oneshot::Sender<StatusReport>),
    LookupPlayer(PlayerId, oneshot::Sender<Option<GameInfo>>),
    LookupArena(ArenaId, oneshot::Sender<Option<GameInfo>>),
    /// `Status` and `Version` admin commands.
    Report(Command, oneshot::Sender<CommandResponse>),
}

struct ServiceActor<P, H> {
    dispatcher: Dispatcher<P, H>,
    requests: mpsc::Receiver<Request>,
    timers: mpsc::UnboundedReceiver<GameTimer>,
    retries: mpsc::UnboundedReceiver<RetryBatch>,
    /// Joins accepted in the current drain, answered once batches formed.
    pending_joins: Vec<(PlayerId, JoinReply)>,
    /// Queries received in the current drain.
    pending_queries: Vec<Query>,
}

impl<P: ArenaProvisioner, H: GameHooks> ServiceActor<P, H> {
    /// Builds the actor and the sender its handles wrap.
    fn new(config: SkyWarsConfig, provisioner: P, hooks: H) -> (Self, mpsc::Sender<Request>) {
        let config = config.validated();
        let (tx, rx) = mpsc::channel(config.channel_size);
        let (timers, timer_rx) = Scheduler::channel();
        let (retries, retry_rx) = Scheduler::channel();

        let actor = Self {
            dispatcher: Dispatcher::new(&config, provisioner, hooks, timers, retries),
            requests: rx,
            timers: timer_rx,
            retries: retry_rx,
            pending_joins: Vec::new(),
            pending_queries: Vec::new(),
        };
        (actor, tx)
    }

    /// Runs until a shutdown request or until every handle is dropped.
    async fn run(mut self) {
        tracing::info!("SkyWars service started");

        loop {
            tokio::select! {
                request = self.requests.recv() => {
                    let stop = match request {
                        Some(request) => self.drain(request),
                        None => {
                            tracing::info!("all handles dropped, shutting down");
                            self.settle();
                            self.dispatcher.shutdown();
                            true
                        }
                    };
                    if stop {
                        break;
                    }
                }
                Some(timer) = self.timers.recv() => {
                    self.dispatcher.handle_timer(timer);
                }
                Some(retry) = self.retries.recv() => {
                    self.dispatcher.on_retry(retry);
                }
            }
        }

        tracing::info!("SkyWars service stopped");
    }

    /// Applies `first` and every request already waiting behind it, then
    /// forms batches once and answers what was deferred. A burst of joins
    /// therefore lands in one batch even with a status request in the
    /// middle of it.
    ///
    /// Returns `true` if the actor should stop.
    fn drain(&mut self, first: Request) -> bool {
        let mut stop = self.apply(first);
        while !stop {
            match self.requests.try_recv() {
                Ok(request) => stop = self.apply(request),
                Err(_) => break,
            }
        }
        self.settle();
        stop
    }

    /// Applies one request. Returns `true` if the actor should stop.
    fn apply(&mut self, request: Request) -> bool {
        match request {
            Request::Event(event) => self.dispatcher.apply_event(event),
            Request::Join { player, reply } => match self.dispatcher.enqueue(player) {
                Ok(_) => self.pending_joins.push((player, reply)),
                Err(e) => {
                    let _ = reply.send(Err(e));
                }
            },
            Request::Leave { player, reply } => {
                let _ = reply.send(self.dispatcher.leave(player));
            }
            Request::Cancel { game, reply } => {
                let _ = reply.send(self.dispatcher.cancel(game));
            }
            Request::Execute { command, reply } => match command {
                Command::Status | Command::Version => {
                    self.pending_queries.push(Query::Report(command, reply));
                }
                command => {
                    let _ = reply.send(self.dispatcher.execute(command));
                }
            },
            Request::Status { reply } => self.pending_queries.push(Query::Status(reply)),
            Request::LookupPlayer { player, reply } => {
                self.pending_queries.push(Query::LookupPlayer(player, reply));
            }
            Request::LookupArena { arena, reply } => {
                self.pending_queries.push(Query::LookupArena(arena, reply));
            }
            Request::Shutdown { reply } => {
                self.settle();
                let _ = reply.send(self.dispatcher.shutdown());
                return true;
            }
        }
        false
    }

    /// Forms batches, then answers the joins and queries deferred since
    /// the last settle.
    fn settle(&mut self) {
        self.dispatcher.flush_batches();
        for (player, reply) in self.pending_joins.drain(..) {
            let placement: Result<JoinOutcome, SkyWarsError> =
                self.dispatcher.placement(player).ok_or_else(|| {
                    GameError::InvalidState(format!("player {player} left before being placed")).into()
                });
            let _ = reply.send(placement);
        }
        for query in std::mem::take(&mut self.pending_queries) {
            match query {
                Query::Status(reply) => {
                    let _ = reply.send(self.dispatcher.status());
                }
                Query::LookupPlayer(player, reply) => {
                    let _ = reply.send(self.dispatcher.lookup_player(player));
                }
                Query::LookupArena(arena, reply) => {
                    let _ = reply.send(self.dispatcher.lookup_arena(arena));
                }
                Query::Report(command, reply) => {
                    let _ = reply.send(self.dispatcher.execute(command));
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for configuring and spawning the service.
///
/// # Example
///
/// ```rust,ignore
/// let service = SkyWarsService::builder()
///     .config(SkyWarsConfig::from_json_file("skyarena.json")?)
///     .arenas(12)
///     .hooks(MyHooks::new(server))
///     .spawn();
/// let handle = service.handle();
/// ```
pub struct SkyWarsServiceBuilder<P, H> {
    config: SkyWarsConfig,
    provisioner: P,
    hooks: H,
}

impl SkyWarsServiceBuilder<ArenaPool, ()> {
    /// Default config, one in-memory arena per game slot, no-op hooks.
    pub fn new() -> Self {
        let config = SkyWarsConfig::default();
        Self {
            provisioner: ArenaPool::with_count(config.game.max_concurrent_games),
            config,
            hooks: (),
        }
    }
}

impl Default for SkyWarsServiceBuilder<ArenaPool, ()> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> SkyWarsServiceBuilder<ArenaPool, H> {
    /// Replaces the in-memory pool with one of `count` arenas.
    pub fn arenas(mut self, count: u32) -> Self {
        self.provisioner = ArenaPool::with_count(count);
        self
    }
}

impl<P, H> SkyWarsServiceBuilder<P, H> {
    pub fn config(mut self, config: SkyWarsConfig) -> Self {
        self.config = config;
        self
    }

    pub fn provisioner<P2: ArenaProvisioner>(self, provisioner: P2) -> SkyWarsServiceBuilder<P2, H> {
        SkyWarsServiceBuilder {
            config: self.config,
            provisioner,
            hooks: self.hooks,
        }
    }

    pub fn hooks<H2: GameHooks>(self, hooks: H2) -> SkyWarsServiceBuilder<P, H2> {
        SkyWarsServiceBuilder {
            config: self.config,
            provisioner: self.provisioner,
            hooks,
        }
    }
}

impl<P: ArenaProvisioner, H: GameHooks> SkyWarsServiceBuilder<P, H> {
    /// Spawns the actor task. Must be called from within a Tokio runtime.
    pub fn spawn(self) -> SkyWarsService {
        let (actor, tx) = ServiceActor::new(self.config, self.provisioner, self.hooks);
        let task = tokio::spawn(actor.run());

        SkyWarsService {
            handle: SkyWarsHandle { sender: tx },
            task,
        }
    }
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

/// A running SkyWars service.
pub struct SkyWarsService {
    handle: SkyWarsHandle,
    task: JoinHandle<()>,
}

impl SkyWarsService {
    pub fn builder() -> SkyWarsServiceBuilder<ArenaPool, ()> {
        SkyWarsServiceBuilder::new()
    }

    /// A handle for listeners and commands. Clone it freely.
    pub fn handle(&self) -> SkyWarsHandle {
        self.handle.clone()
    }

    /// Force-ends every game and waits for the actor to stop.
    pub async fn shutdown(self) -> Result<Vec<GameOutcome>, SkyWarsError> {
        let outcomes = self.handle.shutdown().await?;
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "service task ended abnormally");
        }
        Ok(outcomes)
    }
}
