//! WebSocket endpoint: event stream plus the client command protocol.

pub mod commands;
mod handler;

pub use handler::ws_handler;
