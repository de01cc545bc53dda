//! WebSocket upgrade handling and per-socket session lifecycle.

pub mod handler;
pub mod session;
