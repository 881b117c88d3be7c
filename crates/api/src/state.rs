use std::sync::Arc;

use dtsfix_events::BroadcastHub;
use dtsfix_worker::ConversionService;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    /// Observer registry for WebSocket clients.
    pub hub: Arc<BroadcastHub>,
    /// Admission, cancel, delete, state views and media search.
    pub service: Arc<ConversionService>,
}
