//! WebSocket progress streaming.
//!
//! Provides connection management, heartbeat pings, and the HTTP upgrade
//! handler that streams one batch's progress per connection.

mod handler;
mod heartbeat;
pub mod manager;

pub use handler::batch_ws_handler;
pub use heartbeat::{start_heartbeat, HEARTBEAT_INTERVAL};
pub use manager::WsManager;
