//! Shared helpers for engine integration tests.
//!
//! Validators here are scripted by payload: a test picks payload strings
//! that make an item slow, fail, panic, or wait on a [`Gate`].

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chemaudit_core::batch::BatchSnapshot;
use chemaudit_core::payload::{StructurePayload, SubmittedStructure};
use chemaudit_core::types::BatchId;
use chemaudit_core::validation::{
    ValidationOptions, ValidationRecord, Validator, ValidatorError,
};
use chemaudit_pipeline::{BatchRegistry, EngineConfig};
use parking_lot::{Condvar, Mutex};

/// Payload the scripted validator sleeps on.
pub const SLOW: &str = "O";
/// Payload the scripted validator rejects.
pub const BROKEN: &str = "N";
/// Payload the scripted validator panics on.
pub const PANIC: &str = "P";
/// Payload the gated validator blocks on.
pub const GATED: &str = "S";

// ---------------------------------------------------------------------------
// Gate
// ---------------------------------------------------------------------------

/// Blocking gate for validator threads.
///
/// `release(n)` lets `n` waiters through; `open()` lets everyone through.
#[derive(Default)]
pub struct Gate {
    state: Mutex<GateState>,
    cv: Condvar,
}

#[derive(Default)]
struct GateState {
    permits: usize,
    open: bool,
}

impl Gate {
    pub fn wait(&self) {
        let mut state = self.state.lock();
        while !state.open && state.permits == 0 {
            self.cv.wait(&mut state);
        }
        if !state.open {
            state.permits -= 1;
        }
    }

    pub fn release(&self, n: usize) {
        self.state.lock().permits += n;
        self.cv.notify_all();
    }

    pub fn open(&self) {
        self.state.lock().open = true;
        self.cv.notify_all();
    }
}

// ---------------------------------------------------------------------------
// Validators
// ---------------------------------------------------------------------------

/// Validator whose behaviour is chosen by the payload text.
pub struct ScriptedValidator {
    pub slow_for: Duration,
    pub gate: Arc<Gate>,
    /// Payloads that wait on the gate, unless `gate_all` is set.
    pub gated: HashSet<String>,
    pub gate_all: bool,
    pub calls: AtomicUsize,
    pub running: AtomicUsize,
    pub max_running: AtomicUsize,
}

impl ScriptedValidator {
    pub fn new() -> Self {
        Self {
            slow_for: Duration::from_millis(400),
            gate: Arc::new(Gate::default()),
            gated: HashSet::from([GATED.to_string()]),
            gate_all: false,
            calls: AtomicUsize::new(0),
            running: AtomicUsize::new(0),
            max_running: AtomicUsize::new(0),
        }
    }

    /// Every item waits on the gate.
    pub fn gated() -> Self {
        Self {
            gate_all: true,
            ..Self::new()
        }
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            slow_for: delay,
            ..Self::new()
        }
    }

    pub fn max_running(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Validator for ScriptedValidator {
    fn name(&self) -> &str {
        "scripted"
    }

    fn validate(
        &self,
        payload: &StructurePayload,
        _options: &ValidationOptions,
    ) -> Result<ValidationRecord, ValidatorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(now, Ordering::SeqCst);

        let text = payload.as_str();
        if self.gate_all || self.gated.contains(text) {
            self.gate.wait();
        }
        let result = match text {
            SLOW => {
                std::thread::sleep(self.slow_for);
                Ok(ValidationRecord::new(90))
            }
            BROKEN => Err(ValidatorError::Unparseable("scripted failure".into())),
            PANIC => {
                self.running.fetch_sub(1, Ordering::SeqCst);
                panic!("scripted panic");
            }
            _ => Ok(ValidationRecord::new(90)),
        };

        self.running.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

// ---------------------------------------------------------------------------
// Engine helpers
// ---------------------------------------------------------------------------

pub fn config(workers: usize) -> EngineConfig {
    EngineConfig {
        worker_pool_size: workers,
        ..EngineConfig::default()
    }
}

pub fn registry(config: EngineConfig, validator: Arc<ScriptedValidator>) -> BatchRegistry {
    BatchRegistry::new(config, validator)
}

pub fn structures(payloads: &[&str]) -> Vec<SubmittedStructure> {
    payloads
        .iter()
        .map(|p| SubmittedStructure::new(*p))
        .collect()
}

pub fn uniform(payload: &str, n: usize) -> Vec<SubmittedStructure> {
    (0..n).map(|_| SubmittedStructure::new(payload)).collect()
}

/// Poll until `check` holds, panicking after ten seconds.
pub async fn wait_until<F>(mut check: F)
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while !check() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Poll the registry until the batch is terminal.
pub async fn wait_terminal(registry: &BatchRegistry, id: BatchId) -> BatchSnapshot {
    let session = registry.session(id).await.expect("batch should exist");
    wait_until(|| session.is_terminal()).await;
    session.snapshot()
}
