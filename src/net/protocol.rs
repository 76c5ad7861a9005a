//! JSON wire messages exchanged over the WebSocket

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::game::state::{PlayerId, PlayerState};

/// Messages from client to server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Upgrade one factory station. The key is validated by the game layer.
    Upgrade { station: String },
    /// Any other `type` value; ignored
    #[serde(other)]
    Unknown,
}

/// Messages from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    /// Initial state pushed once on connect
    GameState { player: PlayerState },
    /// Per-tick state of every player
    Update { players: HashMap<PlayerId, PlayerState> },
}

/// Encode a message as JSON text
pub fn encode(message: &ServerMessage) -> Result<String, EncodeError> {
    serde_json::to_string(message).map_err(|e| EncodeError(e.to_string()))
}

/// Decode a client message from JSON text
pub fn decode(text: &str) -> Result<ClientMessage, DecodeError> {
    serde_json::from_str(text).map_err(|e| DecodeError(e.to_string()))
}

#[derive(Debug, thiserror::Error)]
#[error("Encode error: {0}")]
pub struct EncodeError(String);

#[derive(Debug, thiserror::Error)]
#[error("Decode error: {0}")]
pub struct DecodeError(String);
