use std::sync::Arc;

use chemaudit_pipeline::BatchRegistry;

use crate::config::ServerConfig;
use crate::ws::WsManager;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Batch engine: admission, sessions, progress.
    pub registry: Arc<BatchRegistry>,
    /// Progress stream connections.
    pub ws_manager: Arc<WsManager>,
}
