//! WebSocket transport
//!
//! One task per connection reads client actions until the socket closes or
//! errors. A companion writer task drains the connection's outbound queue
//! into the socket. Registration is held by a `ConnectionGuard`, so the
//! connection leaves the registry on every exit path.

use std::fmt::Display;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::game::state::{generate_player_id, PlayerId};
use crate::net::connection::{ConnectionGuard, ConnectionHandle, ConnectionId, Payload};
use crate::net::protocol::{decode, encode, ClientMessage, ServerMessage};
use crate::server::AppState;

/// Query parameters accepted on `/ws`
#[derive(Debug, Default, Deserialize)]
pub struct ConnectParams {
    #[serde(rename = "playerID")]
    pub player_id: Option<String>,
}

/// Upgrade an HTTP request to a WebSocket bound to a player
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(state): State<AppState>,
) -> Response {
    let player_id = params
        .player_id
        .filter(|id| !id.is_empty())
        .unwrap_or_else(generate_player_id);

    ws.max_message_size(state.config.max_message_size)
        .on_failed_upgrade(|e| warn!("WebSocket upgrade error: {}", e))
        .on_upgrade(move |socket| handle_socket(socket, player_id, state))
}

async fn handle_socket(socket: WebSocket, player_id: PlayerId, state: AppState) {
    let (sink, stream) = socket.split();
    run_connection(sink, stream, player_id, state).await;
}

/// Serve one connection until its inbound stream ends or fails
pub async fn run_connection<W, R, E>(sink: W, mut stream: R, player_id: PlayerId, state: AppState)
where
    W: Sink<Message> + Unpin + Send + 'static,
    W::Error: Display,
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let player = state.players.get_or_create(&player_id);
    let (handle, outbound_rx) = ConnectionHandle::channel(state.config.outbound_queue);
    let connection_id = handle.id();
    let mut writer = tokio::spawn(write_outbound(sink, outbound_rx, connection_id));

    // Initial state goes out before registration so it precedes any tick update
    let initial = ServerMessage::GameState {
        player: player.snapshot(),
    };
    let sent = match encode(&initial) {
        Ok(text) => state
            .broadcaster
            .send_to(&handle, Payload::from(text))
            .await
            .map_err(|e| e.to_string()),
        Err(e) => Err(e.to_string()),
    };
    if let Err(e) = sent {
        warn!("Failed to send initial state to {}: {}", player_id, e);
        writer.abort();
        return;
    }

    let Some(guard) = ConnectionGuard::register(state.connections.clone(), &handle, player_id.clone())
    else {
        warn!("Connection {} already registered", connection_id);
        writer.abort();
        return;
    };
    drop(handle);

    state.metrics.connections_opened.fetch_add(1, Ordering::Relaxed);
    update_connection_gauge(&state);
    info!("Player {} connected (conn_id: {})", player_id, connection_id);

    loop {
        tokio::select! {
            next = stream.next() => match next {
                Some(Ok(Message::Text(text))) => {
                    state.metrics.record_received(text.len());
                    handle_client_message(&state, guard.id(), &text);
                }
                Some(Ok(Message::Close(_))) | None => {
                    debug!("Connection {} closed by client", connection_id);
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!("Connection {} read error: {}", connection_id, e);
                    break;
                }
            },
            _ = &mut writer => {
                debug!("Connection {} writer stopped", connection_id);
                break;
            }
        }
    }

    let session = state.connections.connected_for(connection_id).unwrap_or_default();
    drop(guard);
    update_connection_gauge(&state);
    info!(
        "Player {} disconnected (conn_id: {}, session: {:.1}s)",
        player_id,
        connection_id,
        session.as_secs_f64()
    );
}

/// Forward queued payloads to the socket until the queue closes or a write fails
async fn write_outbound<W>(mut sink: W, mut rx: mpsc::Receiver<Payload>, connection_id: ConnectionId)
where
    W: Sink<Message> + Unpin,
    W::Error: Display,
{
    while let Some(payload) = rx.recv().await {
        if let Err(e) = sink.send(Message::Text(payload.to_string())).await {
            debug!("Connection {} write error: {}", connection_id, e);
            return;
        }
    }
    let _ = sink.close().await;
}

/// Apply one inbound action. Bad input affects only this request.
fn handle_client_message(state: &AppState, connection_id: ConnectionId, text: &str) {
    let message = match decode(text) {
        Ok(message) => message,
        Err(e) => {
            debug!("Ignoring malformed message on {}: {}", connection_id, e);
            return;
        }
    };

    match message {
        ClientMessage::Upgrade { station } => {
            let Some(player_id) = state.connections.lookup_player(connection_id) else {
                return;
            };
            let Some(player) = state.players.get(&player_id) else {
                return;
            };

            let result = player.upgrade_by_key(&station);
            state.metrics.record_upgrade(result.is_ok());
            match result {
                Ok(receipt) => debug!(
                    "Player {} upgraded {} to level {}",
                    player_id, receipt.station, receipt.new_level
                ),
                Err(e) => debug!("Player {} upgrade rejected: {}", player_id, e),
            }
        }
        ClientMessage::Unknown => {
            debug!("Ignoring unknown message type on {}", connection_id);
        }
    }
}

fn update_connection_gauge(state: &AppState) {
    state
        .metrics
        .connections_active
        .store(state.connections.len() as u64, Ordering::Relaxed);
}
