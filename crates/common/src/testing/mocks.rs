//! Mock implementations of the auth ports
//!
//! Provides mock objects for testing purposes.

// Allow missing error/panic docs for test mocks - they are designed to be simple
// and errors are clearly indicated by their return types
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::auth::{MemorySlotStorage, RefreshError, RefreshTransport, SlotStorage, StorageError};

type RefreshOutcome = Result<String, RefreshError>;

/// Scripted refresh endpoint
///
/// Outcomes are consumed in order; once the script is exhausted the last
/// outcome repeats. Every call records the refresh token it was given.
pub struct MockRefreshTransport {
    script: Mutex<VecDeque<RefreshOutcome>>,
    last: Mutex<RefreshOutcome>,
    calls: AtomicUsize,
    presented: Mutex<Vec<String>>,
    gate: Option<RefreshGate>,
}

impl MockRefreshTransport {
    /// Every call yields `token`.
    pub fn succeeding(token: impl Into<String>) -> Self {
        Self::sequence(vec![Ok(token.into())])
    }

    /// Every call fails with `error`.
    pub fn failing(error: RefreshError) -> Self {
        Self::sequence(vec![Err(error)])
    }

    /// Calls yield `outcomes` in order, then repeat the last one.
    pub fn sequence(outcomes: Vec<RefreshOutcome>) -> Self {
        let last = outcomes
            .last()
            .cloned()
            .unwrap_or_else(|| Err(RefreshError::Transport("no scripted outcome".into())));
        Self {
            script: Mutex::new(outcomes.into()),
            last: Mutex::new(last),
            calls: AtomicUsize::new(0),
            presented: Mutex::new(Vec::new()),
            gate: None,
        }
    }

    /// Hold every call until [`RefreshGate::release`] is invoked.
    #[must_use]
    pub fn with_gate(mut self) -> (Self, RefreshGate) {
        let gate = RefreshGate::default();
        self.gate = Some(gate.clone());
        (self, gate)
    }

    /// Number of round trips performed.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Refresh tokens presented, in call order.
    pub fn presented_tokens(&self) -> Vec<String> {
        self.presented.lock().clone()
    }

    fn next_outcome(&self) -> RefreshOutcome {
        match self.script.lock().pop_front() {
            Some(outcome) => {
                *self.last.lock() = outcome.clone();
                outcome
            }
            None => self.last.lock().clone(),
        }
    }
}

#[async_trait]
impl RefreshTransport for MockRefreshTransport {
    async fn refresh(&self, refresh_token: &str) -> Result<String, RefreshError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.presented.lock().push(refresh_token.to_string());

        if let Some(gate) = &self.gate {
            gate.started.notify_one();
            gate.release.notified().await;
        }

        self.next_outcome()
    }
}

/// Handle controlling a gated [`MockRefreshTransport`]
#[derive(Clone, Default)]
pub struct RefreshGate {
    started: Arc<Notify>,
    release: Arc<Notify>,
}

impl RefreshGate {
    /// Resolve once a round trip has entered the transport.
    pub async fn wait_started(&self) {
        self.started.notified().await;
    }

    /// Let one held round trip complete.
    pub fn release(&self) {
        self.release.notify_one();
    }
}

/// Slot storage whose writes fail
///
/// Reads are served from an in-memory slot so a credential store can still
/// find its tokens.
pub struct FailingSlotStorage {
    inner: MemorySlotStorage,
}

impl FailingSlotStorage {
    pub fn failing_writes(key: impl Into<String>, initial: impl Into<String>) -> Self {
        Self { inner: MemorySlotStorage::with_slot(key, initial) }
    }
}

impl SlotStorage for FailingSlotStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.inner.get(key)
    }

    fn set(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
        Err(StorageError::Backend("storage is read-only".into()))
    }

    fn remove(&self, _key: &str) -> Result<(), StorageError> {
        Err(StorageError::Backend("storage is read-only".into()))
    }
}
