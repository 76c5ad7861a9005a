//! Server context and HTTP entry point
//!
//! `GameServer` owns every shared resource: the player registry, the
//! connection registry, the broadcaster and the metrics. It is built once and
//! handed to tasks as a cheap `AppState` clone.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::services::ServeDir;
use tracing::info;

use crate::config::ServerConfig;
use crate::game::registry::PlayerRegistry;
use crate::game::tick::TickScheduler;
use crate::metrics::Metrics;
use crate::net::api;
use crate::net::broadcast::{BroadcastQueue, Broadcaster};
use crate::net::connection::ConnectionRegistry;
use crate::net::transport::ws_handler;

/// Shared state handed to every request handler and connection task
#[derive(Debug, Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub players: Arc<PlayerRegistry>,
    pub connections: Arc<ConnectionRegistry>,
    pub broadcaster: Arc<Broadcaster>,
    pub metrics: Arc<Metrics>,
}

/// Idle dungeon game server
pub struct GameServer {
    state: AppState,
    queue: BroadcastQueue,
}

impl GameServer {
    pub fn new(config: ServerConfig, metrics: Arc<Metrics>) -> Self {
        let players = Arc::new(PlayerRegistry::new());
        let connections = Arc::new(ConnectionRegistry::new());
        let (broadcaster, queue) = Broadcaster::new(connections.clone(), metrics.clone());

        Self {
            state: AppState {
                config: Arc::new(config),
                players,
                connections,
                broadcaster,
                metrics,
            },
            queue,
        }
    }

    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.state.config.bind_address, self.state.config.port)
    }

    /// HTTP routes: WebSocket, REST adapters, static assets
    pub fn router(&self) -> Router {
        router(self.state.clone())
    }

    /// Bind, start the background tasks and serve until the process exits.
    /// Failing to bind is the only fatal error.
    pub async fn run(self) -> anyhow::Result<()> {
        let addr = self.bind_addr();
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!("Idle Dungeon server listening on http://{}", addr);

        let app = self.router();
        let state = self.state;

        self.queue.spawn(state.broadcaster.clone());
        TickScheduler::new(
            state.players.clone(),
            state.broadcaster.clone(),
            state.metrics.clone(),
            state.config.tick_interval(),
        )
        .start();

        info!("Routes: WS /ws, GET /api/player, POST /api/upgrade, GET / (static)");

        axum::serve(listener, app).await?;
        Ok(())
    }
}

pub fn router(state: AppState) -> Router {
    let static_files = ServeDir::new(&state.config.static_dir);

    Router::new()
        .route("/ws", get(ws_handler))
        .route("/api/player", get(api::get_player))
        .route("/api/upgrade", post(api::upgrade_station))
        .fallback_service(static_files)
        .with_state(state)
}
