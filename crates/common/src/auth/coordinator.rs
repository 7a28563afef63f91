//! Single-flight token refresh coordinator
//!
//! At most one refresh round trip is in flight per coordinator. The first
//! caller of [`RefreshCoordinator::ensure_fresh_token`] while idle becomes the
//! *driver* and performs the round trip; every caller arriving while the
//! refresh is outstanding is parked as a *waiter* and receives the driver's
//! outcome. Waiters are resolved exactly once, in the order they arrived.
//!
//! ```text
//!            ensure_fresh_token()            refresh settles
//!   Idle ─────────────────────────► Refreshing ───────────────► Idle
//!                                      │  ▲
//!              ensure_fresh_token()    └──┘ enqueue waiter
//! ```
//!
//! On success the new access token is merged into the credential store and
//! mirrored into the [`DefaultCredential`]. On failure the store and the
//! default credential are wiped and [`SessionEvent::LoginRequired`] is
//! published. If the session is ended or replaced while the round trip is
//! out, the cycle settles as [`RefreshError::Interrupted`] and its token is
//! dropped.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, error, info, warn};

use super::credential_store::CredentialStore;
use super::default_credential::DefaultCredential;
use super::errors::{RefreshError, StorageError};
use super::traits::RefreshTransport;
use super::types::{RefreshPhase, SessionEvent};

const EVENT_CAPACITY: usize = 32;

type RefreshOutcome = Result<String, RefreshError>;

enum Settlement {
    Fresh(String),
    Superseded,
}

struct Waiter {
    resolve: oneshot::Sender<RefreshOutcome>,
}

enum CoordinatorState {
    Idle,
    Refreshing { waiters: VecDeque<Waiter> },
}

/// Owns the refresh phase and the waiter queue
///
/// Share it behind an `Arc` between every pipeline that talks to the same
/// API; two coordinators over the same store would refresh independently.
pub struct RefreshCoordinator {
    store: Arc<CredentialStore>,
    transport: Arc<dyn RefreshTransport>,
    default_credential: DefaultCredential,
    events: broadcast::Sender<SessionEvent>,
    state: Mutex<CoordinatorState>,
}

impl RefreshCoordinator {
    /// Create an idle coordinator
    ///
    /// # Arguments
    /// * `store` - Credential store read for the refresh token and updated
    ///   with the new access token
    /// * `transport` - Round trip to the refresh endpoint
    /// * `default_credential` - Ambient header kept in sync with the store
    pub fn new(
        store: Arc<CredentialStore>,
        transport: Arc<dyn RefreshTransport>,
        default_credential: DefaultCredential,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            store,
            transport,
            default_credential,
            events,
            state: Mutex::new(CoordinatorState::Idle),
        }
    }

    /// Obtain a fresh access token, joining an in-flight refresh if any
    ///
    /// # Errors
    /// Returns the refresh cycle's failure. Every caller of the same cycle
    /// receives the same error.
    pub async fn ensure_fresh_token(&self) -> Result<String, RefreshError> {
        let pending = {
            let mut state = self.state.lock();
            match &mut *state {
                CoordinatorState::Refreshing { waiters } => {
                    let (resolve, pending) = oneshot::channel();
                    waiters.push_back(Waiter { resolve });
                    debug!(position = waiters.len(), "Joining in-flight token refresh");
                    Some(pending)
                }
                CoordinatorState::Idle => {
                    *state = CoordinatorState::Refreshing { waiters: VecDeque::new() };
                    None
                }
            }
        };

        match pending {
            // A dropped sender means the cycle was torn down without an outcome.
            Some(pending) => pending.await.unwrap_or(Err(RefreshError::Interrupted)),
            None => self.drive().await,
        }
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> RefreshPhase {
        match &*self.state.lock() {
            CoordinatorState::Idle => RefreshPhase::Idle,
            CoordinatorState::Refreshing { .. } => RefreshPhase::Refreshing,
        }
    }

    /// Number of callers parked behind the in-flight refresh.
    #[must_use]
    pub fn waiter_count(&self) -> usize {
        match &*self.state.lock() {
            CoordinatorState::Idle => 0,
            CoordinatorState::Refreshing { waiters } => waiters.len(),
        }
    }

    /// Subscribe to session lifecycle events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Publish a session event; having no subscriber is not an error.
    pub fn notify(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    /// Credential store this coordinator refreshes.
    #[must_use]
    pub fn store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    /// Ambient credential mirrored from the store.
    #[must_use]
    pub fn default_credential(&self) -> &DefaultCredential {
        &self.default_credential
    }

    /// Drop the stored session and the default credential
    ///
    /// A refresh in flight when this runs settles as
    /// [`RefreshError::Interrupted`] and does not write its token.
    ///
    /// # Errors
    /// Returns error if the backend rejects the deletion; the default
    /// credential is cleared regardless
    pub fn end_session(&self) -> Result<(), StorageError> {
        // Store first: a driver that sets the default credential after this
        // point sees the new generation and resets it.
        let cleared = self.store.clear();
        self.default_credential.clear();
        cleared
    }

    async fn drive(&self) -> Result<String, RefreshError> {
        let cycle = RefreshCycle { coordinator: self, settled: false };
        let generation = self.store.generation();
        info!(generation, "Starting token refresh");

        match self.round_trip(generation).await {
            Ok(Settlement::Fresh(token)) => self.settle_success(cycle, generation, token),
            Ok(Settlement::Superseded) => self.settle_superseded(cycle),
            Err(_) if self.store.generation() != generation => self.settle_superseded(cycle),
            Err(err) => self.settle_failure(cycle, err),
        }
    }

    async fn round_trip(&self, generation: u64) -> Result<Settlement, RefreshError> {
        let refresh_token = self.store.refresh_token().ok_or(RefreshError::NoRefreshToken)?;

        let access_token = self.transport.refresh(&refresh_token).await?;
        if access_token.is_empty() {
            return Err(RefreshError::Malformed("empty access token".to_string()));
        }

        if self.store.set_access_token_if_current(generation, &access_token)? {
            Ok(Settlement::Fresh(access_token))
        } else {
            Ok(Settlement::Superseded)
        }
    }

    fn settle_success(
        &self,
        mut cycle: RefreshCycle<'_>,
        generation: u64,
        token: String,
    ) -> RefreshOutcome {
        self.default_credential.set(token.clone());
        if self.store.generation() != generation {
            match self.store.access_token() {
                Some(current) => self.default_credential.set(current),
                None => self.default_credential.clear(),
            }
            return self.settle_superseded(cycle);
        }

        let waiters = cycle.finish();
        let released = waiters.len();
        for waiter in waiters {
            let _ = waiter.resolve.send(Ok(token.clone()));
        }

        self.notify(SessionEvent::TokenRefreshed);
        info!(waiters = released, "Token refresh succeeded");
        Ok(token)
    }

    // The session was ended or replaced while the round trip was out.
    fn settle_superseded(&self, mut cycle: RefreshCycle<'_>) -> RefreshOutcome {
        let waiters = cycle.finish();
        warn!(waiters = waiters.len(), "Session changed during token refresh; discarding result");
        for waiter in waiters {
            let _ = waiter.resolve.send(Err(RefreshError::Interrupted));
        }
        Err(RefreshError::Interrupted)
    }

    fn settle_failure(&self, mut cycle: RefreshCycle<'_>, err: RefreshError) -> RefreshOutcome {
        error!(kind = err.kind(), error = %err, "Token refresh failed; clearing session");

        if let Err(clear_err) = self.end_session() {
            warn!(error = %clear_err, "Failed to clear credential slot after refresh failure");
        }

        let waiters = cycle.finish();
        let released = waiters.len();
        for waiter in waiters {
            let _ = waiter.resolve.send(Err(err.clone()));
        }

        self.notify(SessionEvent::LoginRequired { reason: err.clone() });
        debug!(waiters = released, "Refresh failure delivered to waiters");
        Err(err)
    }
}

impl std::fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshCoordinator")
            .field("phase", &self.phase())
            .field("waiters", &self.waiter_count())
            .finish_non_exhaustive()
    }
}

/// One `Refreshing` period, owned by the driver.
///
/// Returning to `Idle` happens in `finish`; if the driver is dropped or
/// unwinds first, `Drop` does it and releases the waiters with
/// `Interrupted`.
struct RefreshCycle<'a> {
    coordinator: &'a RefreshCoordinator,
    settled: bool,
}

impl RefreshCycle<'_> {
    fn finish(&mut self) -> VecDeque<Waiter> {
        self.settled = true;
        let previous =
            std::mem::replace(&mut *self.coordinator.state.lock(), CoordinatorState::Idle);
        match previous {
            CoordinatorState::Refreshing { waiters } => waiters,
            CoordinatorState::Idle => VecDeque::new(),
        }
    }
}

impl Drop for RefreshCycle<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }

        let waiters = self.finish();
        warn!(waiters = waiters.len(), "Token refresh abandoned before settling");
        for waiter in waiters {
            let _ = waiter.resolve.send(Err(RefreshError::Interrupted));
        }
    }
}
