//! Idle Dungeon Server Library
//!
//! A multiplayer idle game server. Every tick each player's hero fights the
//! enemy of its current dungeon level, and the resulting state is streamed
//! to connected browsers over WebSocket.

pub mod config;
pub mod game;
pub mod net;
pub mod metrics;
pub mod server;
