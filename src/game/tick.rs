//! Tick scheduler - resolves one battle per player per tick and broadcasts
//! the resulting state

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use rayon::prelude::*;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{info, warn};

use crate::game::constants::tick;
use crate::game::registry::PlayerRegistry;
use crate::metrics::Metrics;
use crate::net::broadcast::{Broadcaster, SubmitError};
use crate::net::connection::Payload;
use crate::net::protocol::{encode, ServerMessage};

/// What one tick did
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub tick: u64,
    pub players: usize,
    pub victories: usize,
    /// Outcome of handing the update to the broadcaster; None if encoding failed
    pub submitted: Option<Result<(), SubmitError>>,
}

/// Periodic battle resolution for every player
pub struct TickScheduler {
    players: Arc<PlayerRegistry>,
    broadcaster: Arc<Broadcaster>,
    metrics: Arc<Metrics>,
    interval: Duration,
    tick: u64,
}

/// Resolve one battle for every player. Players are independent, so they are
/// processed in parallel; each battle runs under that player's own lock.
pub fn resolve_battles(players: &PlayerRegistry) -> usize {
    players
        .handles()
        .par_iter()
        .map(|player| player.battle())
        .filter(|outcome| outcome.victory)
        .count()
}

impl TickScheduler {
    pub fn new(
        players: Arc<PlayerRegistry>,
        broadcaster: Arc<Broadcaster>,
        metrics: Arc<Metrics>,
        interval: Duration,
    ) -> Self {
        Self {
            players,
            broadcaster,
            metrics,
            interval,
            tick: 0,
        }
    }

    /// Run a single tick: battles, snapshot, broadcast handoff
    pub fn tick(&mut self) -> TickReport {
        let started = Instant::now();
        self.tick += 1;

        let victories = resolve_battles(&self.players);
        let snapshot = self.players.snapshot_all();
        let player_count = snapshot.len();

        let submitted = match encode(&ServerMessage::Update { players: snapshot }) {
            Ok(text) => {
                let payload: Payload = Arc::from(text);
                let result = self.broadcaster.try_submit(payload);
                if let Err(e) = result {
                    warn!("Tick {} update not broadcast: {}", self.tick, e);
                }
                Some(result)
            }
            Err(e) => {
                warn!("Failed to encode tick {} update: {}", self.tick, e);
                None
            }
        };

        self.metrics
            .players_total
            .store(player_count as u64, Ordering::Relaxed);
        self.metrics.record_tick_time(started.elapsed());

        TickReport {
            tick: self.tick,
            players: player_count,
            victories,
            submitted,
        }
    }

    /// Start ticking in the background. There is no stop transition; the task
    /// runs until the runtime shuts down.
    pub fn start(mut self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            info!("Tick loop started every {:?}", self.interval);

            // First tick fires immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let report = self.tick();

                if report.tick % tick::SUMMARY_EVERY == 0 {
                    info!(
                        "Tick {}: {} players, {} connections, {} victories, {} broadcasts dropped",
                        report.tick,
                        report.players,
                        self.metrics.connections_active.load(Ordering::Relaxed),
                        report.victories,
                        self.metrics.broadcasts_dropped.load(Ordering::Relaxed)
                    );
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::broadcast::BroadcastQueue;
    use crate::net::connection::{ConnectionHandle, ConnectionRegistry};
    use crate::net::protocol::ServerMessage;

    fn setup() -> (
        Arc<PlayerRegistry>,
        Arc<ConnectionRegistry>,
        Arc<Broadcaster>,
        BroadcastQueue,
        TickScheduler,
    ) {
        let players = Arc::new(PlayerRegistry::new());
        let connections = Arc::new(ConnectionRegistry::new());
        let metrics = Arc::new(Metrics::new());
        let (broadcaster, queue) = Broadcaster::new(connections.clone(), metrics.clone());
        let scheduler = TickScheduler::new(
            players.clone(),
            broadcaster.clone(),
            metrics,
            Duration::from_millis(10),
        );
        (players, connections, broadcaster, queue, scheduler)
    }

    #[test]
    fn test_resolve_battles_advances_every_player() {
        let players = PlayerRegistry::new();
        players.get_or_create("a");
        players.get_or_create("b");

        assert_eq!(resolve_battles(&players), 2);

        for state in players.snapshot_all().values() {
            assert_eq!(state.progress.dungeon_level, 2);
            assert_eq!(state.progress.gold, 12);
            assert_eq!(state.progress.experience, 6);
        }
    }

    #[test]
    fn test_resolve_battles_on_empty_registry() {
        assert_eq!(resolve_battles(&PlayerRegistry::new()), 0);
    }

    #[tokio::test]
    async fn test_tick_submits_update_with_all_players() {
        let (players, connections, broadcaster, queue, mut scheduler) = setup();
        players.get_or_create("p1");
        players.get_or_create("p2");
        let (handle, mut rx) = ConnectionHandle::channel(4);
        connections.register(&handle, "p1".to_string());
        let drain = queue.spawn(broadcaster);

        let report = scheduler.tick();
        assert_eq!(report.tick, 1);
        assert_eq!(report.players, 2);
        assert_eq!(report.victories, 2);
        assert_eq!(report.submitted, Some(Ok(())));

        let payload = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        let message: ServerMessage = serde_json::from_str(&payload).unwrap();
        match message {
            ServerMessage::Update { players } => {
                assert_eq!(players.len(), 2);
                assert_eq!(players["p2"].progress.dungeon_level, 2);
            }
            other => panic!("unexpected message {:?}", other),
        }
        drain.abort();
    }

    #[tokio::test]
    async fn test_tick_drops_update_when_previous_pending() {
        let (players, _connections, _broadcaster, _queue, mut scheduler) = setup();
        players.get_or_create("p1");

        assert_eq!(scheduler.tick().submitted, Some(Ok(())));
        let second = scheduler.tick();

        // Battles still ran even though the broadcast was dropped
        assert_eq!(second.submitted, Some(Err(SubmitError::Saturated)));
        assert_eq!(second.tick, 2);
        assert_eq!(players.get("p1").unwrap().snapshot().progress.gold, 12 + 7);
        assert_eq!(scheduler.metrics.broadcasts_dropped.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_tick_records_metrics() {
        let (players, _connections, _broadcaster, _queue, mut scheduler) = setup();
        players.get_or_create("p1");
        players.get_or_create("p2");
        players.get_or_create("p3");

        scheduler.tick();

        assert_eq!(scheduler.metrics.players_total.load(Ordering::Relaxed), 3);
        assert_eq!(scheduler.metrics.tick_count.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_started_loop_keeps_ticking() {
        let (players, connections, broadcaster, queue, scheduler) = setup();
        players.get_or_create("p1");
        let (handle, mut rx) = ConnectionHandle::channel(4);
        connections.register(&handle, "p1".to_string());
        let drain = queue.spawn(broadcaster);
        let ticker = scheduler.start();

        for _ in 0..3 {
            let payload = tokio::time::timeout(Duration::from_secs(2), rx.recv())
                .await
                .unwrap()
                .unwrap();
            assert!(payload.contains(r#""type":"update""#));
        }

        assert!(players.get("p1").unwrap().snapshot().progress.dungeon_level >= 2);
        ticker.abort();
        drain.abort();
    }
}
