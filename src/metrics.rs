//! Prometheus-compatible metrics endpoint
//!
//! Exposes game server counters in Prometheus text format and as JSON.
//! Default endpoint: http://localhost:9090/metrics

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use parking_lot::RwLock;
use tracing::info;

/// Number of tick samples kept for percentile calculation
const TICK_HISTORY_LEN: usize = 1000;

/// Metrics registry for the game server
#[derive(Debug)]
pub struct Metrics {
    // Players
    pub players_total: AtomicU64,

    // Tick timing (microseconds)
    pub tick_count: AtomicU64,
    pub tick_time_us: AtomicU64,
    pub tick_time_p95_us: AtomicU64,
    pub tick_time_p99_us: AtomicU64,
    pub tick_time_max_us: AtomicU64,

    // Broadcast
    pub broadcasts_published: AtomicU64,
    /// Tick updates dropped because the previous one had not drained yet
    pub broadcasts_dropped: AtomicU64,

    // Network
    pub connections_active: AtomicU64,
    pub connections_opened: AtomicU64,
    /// Connections removed after a failed delivery
    pub connections_dropped: AtomicU64,
    pub messages_sent: AtomicU64,
    pub messages_received: AtomicU64,
    pub bytes_sent: AtomicU64,
    pub bytes_received: AtomicU64,

    // Game actions
    pub upgrades_succeeded: AtomicU64,
    pub upgrades_failed: AtomicU64,

    start_time: Instant,
    tick_history: RwLock<VecDeque<u64>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            players_total: AtomicU64::new(0),
            tick_count: AtomicU64::new(0),
            tick_time_us: AtomicU64::new(0),
            tick_time_p95_us: AtomicU64::new(0),
            tick_time_p99_us: AtomicU64::new(0),
            tick_time_max_us: AtomicU64::new(0),
            broadcasts_published: AtomicU64::new(0),
            broadcasts_dropped: AtomicU64::new(0),
            connections_active: AtomicU64::new(0),
            connections_opened: AtomicU64::new(0),
            connections_dropped: AtomicU64::new(0),
            messages_sent: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            upgrades_succeeded: AtomicU64::new(0),
            upgrades_failed: AtomicU64::new(0),
            start_time: Instant::now(),
            tick_history: RwLock::new(VecDeque::with_capacity(TICK_HISTORY_LEN)),
        }
    }

    /// Record a tick time and update percentiles
    pub fn record_tick_time(&self, duration: Duration) {
        let us = duration.as_micros() as u64;
        self.tick_time_us.store(us, Ordering::Relaxed);
        self.tick_count.fetch_add(1, Ordering::Relaxed);

        let mut history = self.tick_history.write();
        history.push_back(us);
        while history.len() > TICK_HISTORY_LEN {
            history.pop_front();
        }

        if history.len() >= 10 {
            let mut sorted: Vec<u64> = history.iter().copied().collect();
            sorted.sort_unstable();

            let p95_idx = (sorted.len() as f32 * 0.95) as usize;
            let p99_idx = (sorted.len() as f32 * 0.99) as usize;

            self.tick_time_p95_us.store(sorted[p95_idx.min(sorted.len() - 1)], Ordering::Relaxed);
            self.tick_time_p99_us.store(sorted[p99_idx.min(sorted.len() - 1)], Ordering::Relaxed);
            self.tick_time_max_us.store(sorted.last().copied().unwrap_or(0), Ordering::Relaxed);
        }
    }

    /// Record one outbound message of `bytes` length delivered to `recipients`
    pub fn record_sent(&self, bytes: usize, recipients: u64) {
        self.messages_sent.fetch_add(recipients, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64 * recipients, Ordering::Relaxed);
    }

    /// Record one inbound message
    pub fn record_received(&self, bytes: usize) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Record the outcome of an upgrade request
    pub fn record_upgrade(&self, succeeded: bool) {
        if succeeded {
            self.upgrades_succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.upgrades_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Get uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Generate Prometheus-format metrics output
    pub fn to_prometheus(&self) -> String {
        let mut output = String::with_capacity(2048);

        macro_rules! metric {
            ($name:expr, $help:expr, $type:expr, $value:expr) => {
                output.push_str(&format!(
                    "# HELP {} {}\n# TYPE {} {}\n{} {}\n",
                    $name, $help, $name, $type, $name, $value
                ));
            };
        }

        metric!("idle_dungeon_players_total", "Number of known players", "gauge",
            self.players_total.load(Ordering::Relaxed));

        metric!("idle_dungeon_tick_count", "Total ticks processed", "counter",
            self.tick_count.load(Ordering::Relaxed));
        metric!("idle_dungeon_tick_time_microseconds", "Current tick time in microseconds", "gauge",
            self.tick_time_us.load(Ordering::Relaxed));
        metric!("idle_dungeon_tick_time_p95_microseconds", "95th percentile tick time", "gauge",
            self.tick_time_p95_us.load(Ordering::Relaxed));
        metric!("idle_dungeon_tick_time_p99_microseconds", "99th percentile tick time", "gauge",
            self.tick_time_p99_us.load(Ordering::Relaxed));
        metric!("idle_dungeon_tick_time_max_microseconds", "Maximum tick time", "gauge",
            self.tick_time_max_us.load(Ordering::Relaxed));

        metric!("idle_dungeon_broadcasts_published_total", "Tick updates fanned out", "counter",
            self.broadcasts_published.load(Ordering::Relaxed));
        metric!("idle_dungeon_broadcasts_dropped_total", "Tick updates dropped while a broadcast was pending", "counter",
            self.broadcasts_dropped.load(Ordering::Relaxed));

        metric!("idle_dungeon_connections_active", "Active WebSocket connections", "gauge",
            self.connections_active.load(Ordering::Relaxed));
        metric!("idle_dungeon_connections_opened_total", "WebSocket connections accepted", "counter",
            self.connections_opened.load(Ordering::Relaxed));
        metric!("idle_dungeon_connections_dropped_total", "Connections removed after a failed delivery", "counter",
            self.connections_dropped.load(Ordering::Relaxed));
        metric!("idle_dungeon_messages_sent_total", "Messages sent", "counter",
            self.messages_sent.load(Ordering::Relaxed));
        metric!("idle_dungeon_messages_received_total", "Messages received", "counter",
            self.messages_received.load(Ordering::Relaxed));
        metric!("idle_dungeon_bytes_sent_total", "Bytes sent", "counter",
            self.bytes_sent.load(Ordering::Relaxed));
        metric!("idle_dungeon_bytes_received_total", "Bytes received", "counter",
            self.bytes_received.load(Ordering::Relaxed));

        metric!("idle_dungeon_upgrades_succeeded_total", "Successful station upgrades", "counter",
            self.upgrades_succeeded.load(Ordering::Relaxed));
        metric!("idle_dungeon_upgrades_failed_total", "Rejected station upgrades", "counter",
            self.upgrades_failed.load(Ordering::Relaxed));

        metric!("idle_dungeon_uptime_seconds", "Server uptime in seconds", "counter",
            self.uptime_seconds());

        output
    }

    /// Generate JSON metrics output
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "players": {
                "total": self.players_total.load(Ordering::Relaxed),
            },
            "ticks": {
                "count": self.tick_count.load(Ordering::Relaxed),
                "time_us": self.tick_time_us.load(Ordering::Relaxed),
                "time_p95_us": self.tick_time_p95_us.load(Ordering::Relaxed),
                "time_p99_us": self.tick_time_p99_us.load(Ordering::Relaxed),
                "time_max_us": self.tick_time_max_us.load(Ordering::Relaxed),
            },
            "broadcasts": {
                "published": self.broadcasts_published.load(Ordering::Relaxed),
                "dropped": self.broadcasts_dropped.load(Ordering::Relaxed),
            },
            "network": {
                "connections": self.connections_active.load(Ordering::Relaxed),
                "connections_opened": self.connections_opened.load(Ordering::Relaxed),
                "connections_dropped": self.connections_dropped.load(Ordering::Relaxed),
                "messages_sent": self.messages_sent.load(Ordering::Relaxed),
                "messages_received": self.messages_received.load(Ordering::Relaxed),
                "bytes_sent": self.bytes_sent.load(Ordering::Relaxed),
                "bytes_received": self.bytes_received.load(Ordering::Relaxed),
            },
            "upgrades": {
                "succeeded": self.upgrades_succeeded.load(Ordering::Relaxed),
                "failed": self.upgrades_failed.load(Ordering::Relaxed),
            },
            "uptime_seconds": self.uptime_seconds(),
        })
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

async fn prometheus_handler(State(metrics): State<Arc<Metrics>>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics.to_prometheus(),
    )
}

async fn json_handler(State(metrics): State<Arc<Metrics>>) -> impl IntoResponse {
    axum::Json(metrics.to_json())
}

/// Routes served on the metrics port
pub fn router(metrics: Arc<Metrics>) -> Router {
    Router::new()
        .route("/metrics", get(prometheus_handler))
        .route("/metrics/json", get(json_handler))
        .route("/health", get(|| async { "OK" }))
        .with_state(metrics)
}

/// Start the metrics HTTP server
pub async fn start_metrics_server(metrics: Arc<Metrics>, port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("Metrics server listening on http://{}/metrics", addr);

    axum::serve(listener, router(metrics)).await?;
    Ok(())
}
