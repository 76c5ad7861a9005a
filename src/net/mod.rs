pub mod protocol;
pub mod connection;
pub mod broadcast;
pub mod transport;
pub mod api;
