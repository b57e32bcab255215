//! ChemAudit progress streaming infrastructure.
//!
//! - [`ProgressChannel`]: per-batch publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`ProgressFrame`]: the JSON envelope pushed to streaming clients.

pub mod channel;

pub use channel::{ProgressChannel, ProgressFrame};
