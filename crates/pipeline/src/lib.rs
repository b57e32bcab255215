//! ChemAudit batch orchestration engine.
//!
//! Admits batches of structures, fans their items out over a bounded
//! worker pool, aggregates per-item results into session state, and
//! streams progress to subscribers.
//!
//! - [`registry::BatchRegistry`]: entry point; submit, query, cancel, subscribe.
//! - [`worker::WorkerPool`]: global concurrency bound and per-batch dispatch.
//! - [`aggregator`]: the single mutation path for session state.
//! - [`subscription::Subscription`]: snapshot-then-deltas progress stream.

pub mod admission;
pub mod aggregator;
pub mod config;
pub mod queue;
pub mod registry;
pub mod session;
pub mod subscription;
pub mod worker;

pub use config::EngineConfig;
pub use registry::{BatchRegistry, SweepReport};
pub use session::BatchSession;
pub use subscription::Subscription;
pub use worker::WorkerPool;
