//! Lifecycle tests for the game layer, driven with paused Tokio time so
//! countdowns run deterministically.

use std::collections::BTreeSet;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use skyarena_game::{
    ArenaPool, ArenaProvisioner, GameConfig, GameError, GameHandler, GameHooks, GameIdHandler,
    GameOutcome, GameState, GameTimer,
};
use skyarena_protocol::{ArenaId, GameId, PlayerId};
use skyarena_timer::Scheduler;
use tokio::sync::mpsc::UnboundedReceiver;

// ---------------------------------------------------------------------------
// Recording hooks
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    Start(GameId, ArenaId, Vec<PlayerId>),
    Joined(GameId, PlayerId),
    Countdown(GameId, Duration),
    Running(GameId),
    Eliminated(GameId, PlayerId),
    End(GameOutcome),
    Notify(PlayerId, String),
}

#[derive(Default)]
struct RecordingHooks {
    calls: Vec<Call>,
}

impl RecordingHooks {
    fn ends(&self) -> Vec<&GameOutcome> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::End(o) => Some(o),
                _ => None,
            })
            .collect()
    }

    fn countdowns(&self, game: GameId) -> Vec<Duration> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::Countdown(g, d) if *g == game => Some(*d),
                _ => None,
            })
            .collect()
    }
}

impl GameHooks for RecordingHooks {
    fn on_game_start(&mut self, game: GameId, arena: ArenaId, players: &[PlayerId]) {
        self.calls.push(Call::Start(game, arena, players.to_vec()));
    }

    fn on_player_joined(&mut self, game: GameId, player: PlayerId) {
        self.calls.push(Call::Joined(game, player));
    }

    fn on_countdown(&mut self, game: GameId, _players: &[PlayerId], remaining: Duration) {
        self.calls.push(Call::Countdown(game, remaining));
    }

    fn on_game_running(&mut self, game: GameId, _players: &[PlayerId]) {
        self.calls.push(Call::Running(game));
    }

    fn on_player_eliminated(&mut self, game: GameId, player: PlayerId) {
        self.calls.push(Call::Eliminated(game, player));
    }

    fn on_game_end(&mut self, outcome: &GameOutcome) {
        self.calls.push(Call::End(outcome.clone()));
    }

    fn notify(&mut self, player: PlayerId, message: &str) {
        self.calls.push(Call::Notify(player, message.to_string()));
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

type Handler = GameHandler<ArenaPool, RecordingHooks>;

fn players(ids: &[u64]) -> Vec<PlayerId> {
    ids.iter().map(|p| PlayerId(*p)).collect()
}

fn config(countdown_secs: u64, tick_secs: u64) -> GameConfig {
    GameConfig {
        min_players: 2,
        max_players: 4,
        countdown_secs,
        countdown_tick_secs: tick_secs,
        max_concurrent_games: 4,
    }
}

fn setup(config: GameConfig, arenas: u32) -> (Handler, UnboundedReceiver<GameTimer>) {
    let (timers, rx) = Scheduler::channel();
    let handler = GameHandler::new(config, ArenaPool::with_count(arenas), RecordingHooks::default(), timers);
    (handler, rx)
}

/// Feeds every timer event to the handler until the countdown for `game`
/// elapses (or the channel goes quiet for longer than `limit`).
async fn run_timers(handler: &mut Handler, rx: &mut UnboundedReceiver<GameTimer>, limit: Duration) {
    while let Ok(Some(timer)) = tokio::time::timeout(limit, rx.recv()).await {
        let elapsed = matches!(timer, GameTimer::CountdownElapsed { .. });
        handler.handle_timer(timer);
        if elapsed {
            break;
        }
    }
}

// ---------------------------------------------------------------------------
// Countdown
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_countdown_ticks_then_runs_game() {
    let (mut handler, mut rx) = setup(config(10, 5), 1);
    let game = handler.start_game(players(&[1, 2])).unwrap();

    run_timers(&mut handler, &mut rx, Duration::from_secs(60)).await;

    assert_eq!(
        handler.hooks().countdowns(game),
        vec![
            Duration::from_secs(10),
            Duration::from_secs(5),
            Duration::ZERO
        ]
    );
    assert_eq!(handler.games().get(game).unwrap().state(), GameState::Running);
    assert!(handler.hooks().calls.contains(&Call::Running(game)));
}

#[tokio::test(start_paused = true)]
async fn test_countdown_elapsed_below_min_cancels_game() {
    let (mut handler, mut rx) = setup(config(10, 5), 1);
    let game = handler.start_game(players(&[1, 2])).unwrap();
    handler.remove_player(PlayerId(1)).unwrap();

    run_timers(&mut handler, &mut rx, Duration::from_secs(60)).await;

    let ends = handler.hooks().ends();
    assert_eq!(ends.len(), 1);
    assert_eq!(ends[0].game, game);
    assert!(!ends[0].completed_normally);
    assert!(handler.games().is_empty());
    assert_eq!(handler.provisioner().available(), Some(1));
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_game_countdown_never_resurrects_it() {
    let (mut handler, mut rx) = setup(config(10, 5), 1);
    let game = handler.start_game(players(&[1, 2])).unwrap();
    handler.end_game(game, false).unwrap();

    // The ID and arena are reused by a fresh game straight away.
    let reused = handler.start_game(players(&[3, 4])).unwrap();
    assert_eq!(reused, game);

    // Drain whatever the first countdown managed to send before cancel,
    // plus the whole of the second countdown.
    run_timers(&mut handler, &mut rx, Duration::from_secs(60)).await;

    let instance = handler.games().get(reused).unwrap();
    assert_eq!(instance.members(), &players(&[3, 4])[..]);
    assert_eq!(instance.state(), GameState::Running);
    assert_eq!(handler.hooks().ends().len(), 1, "only the explicit end");
}

#[tokio::test(start_paused = true)]
async fn test_zero_countdown_with_enough_players_runs_immediately() {
    let (mut handler, _rx) = setup(config(0, 5), 1);

    let game = handler.start_game(players(&[1, 2])).unwrap();

    assert_eq!(handler.games().get(game).unwrap().state(), GameState::Running);
}

// ---------------------------------------------------------------------------
// Late join and eliminations
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_late_joiner_enters_waiting_game_and_fills_it() {
    let (mut handler, _rx) = setup(config(30, 5), 2);
    let game = handler.start_game(players(&[1, 2])).unwrap();

    assert_eq!(handler.join_waiting(PlayerId(3)), Ok(Some(game)));
    assert_eq!(handler.games().get(game).unwrap().state(), GameState::Waiting);
    assert_eq!(handler.join_waiting(PlayerId(4)), Ok(Some(game)));

    let instance = handler.games().get(game).unwrap();
    assert_eq!(instance.state(), GameState::Running);
    assert!(!instance.has_countdown());
    assert!(handler.hooks().calls.contains(&Call::Joined(game, PlayerId(4))));
}

#[tokio::test(start_paused = true)]
async fn test_join_waiting_player_already_in_game_rejected() {
    let (mut handler, _rx) = setup(config(30, 5), 2);
    let game = handler.start_game(players(&[1, 2])).unwrap();

    assert_eq!(
        handler.join_waiting(PlayerId(1)),
        Err(GameError::AlreadyInGame(PlayerId(1), game))
    );
}

#[tokio::test(start_paused = true)]
async fn test_deaths_until_one_left_declare_winner() {
    let (mut handler, _rx) = setup(config(30, 5), 1);
    let game = handler.start_game(players(&[1, 2, 3, 4])).unwrap();

    handler.remove_player(PlayerId(4)).unwrap();
    handler.remove_player(PlayerId(2)).unwrap();
    let departure = handler.remove_player(PlayerId(1)).unwrap();

    let outcome = departure.outcome.unwrap();
    assert_eq!(outcome.game, game);
    assert!(outcome.completed_normally);
    assert_eq!(outcome.winners, vec![PlayerId(3)]);
    assert_eq!(outcome.enrolled, players(&[1, 2, 3, 4]));

    let eliminated: Vec<_> = handler
        .hooks()
        .calls
        .iter()
        .filter(|c| matches!(c, Call::Eliminated(..)))
        .collect();
    assert_eq!(eliminated.len(), 3);

    // The winner ending the game naturally races with an admin cancel.
    assert_eq!(handler.end_game(game, false), Err(GameError::AlreadyEnded(game)));
}

// ---------------------------------------------------------------------------
// Shutdown
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_shutdown_with_two_games_ends_each_once() {
    let (mut handler, _rx) = setup(config(30, 5), 2);
    handler.start_game(players(&[1, 2])).unwrap();
    handler.start_game(players(&[3, 4])).unwrap();
    assert_eq!(handler.ids().current_ids(), vec![GameId(0), GameId(1)]);

    handler.shutdown();

    let ended: Vec<GameId> = handler.hooks().ends().iter().map(|o| o.game).collect();
    assert_eq!(ended, vec![GameId(0), GameId(1)]);
    assert!(handler.ids().current_ids().is_empty());
    assert!(handler.games().is_empty());
    assert!(handler.games().lookup_by_player(PlayerId(1)).is_none());
    assert!(handler.games().lookup_by_arena(ArenaId(0)).is_none());
}

#[tokio::test(start_paused = true)]
async fn test_notify_goes_through_hooks() {
    let (mut handler, _rx) = setup(config(30, 5), 1);
    handler.notify(PlayerId(1), "hello");
    assert_eq!(
        handler.hooks().calls,
        vec![Call::Notify(PlayerId(1), "hello".into())]
    );
}

// ---------------------------------------------------------------------------
// Randomised interleavings
// ---------------------------------------------------------------------------

#[test]
fn test_id_allocation_random_interleavings_stay_minimal_and_in_range() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let cap = 6;
    let mut ids = GameIdHandler::new(cap);
    let mut used: BTreeSet<u32> = BTreeSet::new();

    for _ in 0..2_000 {
        if rng.random_bool(0.55) {
            let expected = (0..cap).find(|k| !used.contains(k));
            match (ids.allocate(), expected) {
                (Ok(id), Some(k)) => {
                    assert_eq!(id.0, k, "allocate must return the minimum free ID");
                    used.insert(k);
                }
                (Err(GameError::ResourceExhausted { cap: c }), None) => assert_eq!(c, cap),
                (got, want) => panic!("allocate returned {got:?}, expected {want:?}"),
            }
        } else {
            let k = rng.random_range(0..cap);
            let released = ids.release(GameId(k)).is_ok();
            assert_eq!(released, used.remove(&k));
        }

        let current: BTreeSet<u32> = ids.current_ids().iter().map(|g| g.0).collect();
        assert_eq!(current, used);
        assert!(current.iter().all(|k| *k < cap));
    }
}

#[tokio::test(start_paused = true)]
async fn test_random_lifecycle_keeps_indexes_consistent() {
    let mut rng = StdRng::seed_from_u64(42);
    let (mut handler, _rx) = setup(config(30, 5), 3);
    let mut next_player = 0u64;

    for _ in 0..500 {
        match rng.random_range(0..4) {
            0 => {
                let size = rng.random_range(2..=4);
                let batch: Vec<PlayerId> = (0..size)
                    .map(|_| {
                        next_player += 1;
                        PlayerId(next_player)
                    })
                    .collect();
                let _ = handler.start_game(batch);
            }
            1 => {
                next_player += 1;
                let _ = handler.join_waiting(PlayerId(next_player));
            }
            2 => {
                if next_player > 0 {
                    let player = PlayerId(rng.random_range(1..=next_player));
                    handler.remove_player(player);
                }
            }
            _ => {
                let game = GameId(rng.random_range(0..4));
                let _ = handler.end_game(game, rng.random_bool(0.5));
            }
        }

        // Every tracked player maps to exactly one game that lists them.
        let games = handler.games();
        let mut seen = BTreeSet::new();
        for info in games.infos() {
            assert!(info.state.is_active());
            assert_eq!(games.lookup_by_arena(info.arena).map(|g| g.id()), Some(info.game_id));
            for player in &info.players {
                assert!(seen.insert(*player), "{player} is in two games");
                assert_eq!(games.game_of(*player), Some(info.game_id));
            }
        }
        assert_eq!(handler.ids().current_ids(), games.ids());
        let in_use = games.len() + handler.provisioner().available().unwrap_or(0);
        assert_eq!(in_use, 3, "arenas leaked or double-freed");
    }
}
