//! The session state machine.
//!
//! `Session` owns the current authentication state, the persisted token and
//! the liveness monitor. It moves between three phases:
//!
//! - `Authenticating`: only before `initialize()` has run
//! - `Authenticated`: a token is held and was valid at the last check
//! - `Unauthenticated`: no token is held
//!
//! Every transition is published through a `watch` channel before the call
//! returns, so views holding a receiver never read a stale state.
//!
//! A `logout()` racing a pending `login()` is not guarded: whichever
//! transition is applied last wins.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::clock::{Clock, SystemClock};
use super::error::AuthError;
use super::monitor::{Liveness, LivenessMonitor, DEFAULT_CHECK_INTERVAL};
use super::store::TokenStore;
use super::token::{self, ClaimSet, PROACTIVE_EXPIRY_BUFFER_SECS, REQUEST_EXPIRY_BUFFER_SECS};
use crate::api::{ApiClient, ApiError};
use crate::models::LoginRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AuthPhase {
    Unauthenticated,
    Authenticating,
    Authenticated,
}

/// Timing knobs for a session.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// How often the liveness monitor re-checks the token.
    pub check_interval: Duration,
    /// Tokens expiring within this many seconds are rejected when a session is restored.
    pub expiry_buffer_secs: i64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            check_interval: DEFAULT_CHECK_INTERVAL,
            expiry_buffer_secs: PROACTIVE_EXPIRY_BUFFER_SECS,
        }
    }
}

/// Snapshot of the authentication state.
///
/// `is_authenticated` is true exactly when `raw_token` is present and was
/// valid at the last check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub is_authenticated: bool,
    pub claims: Option<ClaimSet>,
    pub raw_token: Option<String>,
    pub loading: bool,
}

impl SessionState {
    fn initial() -> Self {
        Self {
            is_authenticated: false,
            claims: None,
            raw_token: None,
            loading: true,
        }
    }

    fn unauthenticated() -> Self {
        Self {
            loading: false,
            ..Self::initial()
        }
    }

    fn authenticated(token: String, claims: ClaimSet) -> Self {
        Self {
            is_authenticated: true,
            claims: Some(claims),
            raw_token: Some(token),
            loading: false,
        }
    }

    pub fn phase(&self) -> AuthPhase {
        if self.is_authenticated {
            AuthPhase::Authenticated
        } else if self.loading {
            AuthPhase::Authenticating
        } else {
            AuthPhase::Unauthenticated
        }
    }

    /// The logged-in username, if any.
    pub fn subject(&self) -> Option<&str> {
        self.claims.as_ref().map(|c| c.subject.as_str())
    }
}

/// Injectable session store. Clone is cheap; clones share one state.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    api: ApiClient,
    store: Box<dyn TokenStore>,
    clock: Arc<dyn Clock>,
    settings: SessionSettings,
    state: watch::Sender<SessionState>,
    monitor: Mutex<LivenessMonitor>,
}

impl SessionInner {
    fn monitor(&self) -> MutexGuard<'_, LivenessMonitor> {
        self.monitor.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Decode `token` and reject it if it expires within `buffer_secs`.
    fn validate(&self, token: &str, buffer_secs: i64) -> Result<ClaimSet, AuthError> {
        let claims = token::decode(token)?;
        if claims.is_expired_at(self.clock.now(), buffer_secs) {
            return Err(AuthError::Expired);
        }
        Ok(claims)
    }

    /// The single transition into `Unauthenticated`.
    fn clear(&self) {
        self.monitor().stop();
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "Failed to remove persisted token");
        }
        self.state.send_replace(SessionState::unauthenticated());
    }
}

impl Session {
    pub fn new(api: ApiClient, store: impl TokenStore + 'static, settings: SessionSettings) -> Self {
        Self::with_clock(api, store, settings, Arc::new(SystemClock))
    }

    pub fn with_clock(
        api: ApiClient,
        store: impl TokenStore + 'static,
        settings: SessionSettings,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::initial());
        Self {
            inner: Arc::new(SessionInner {
                api,
                store: Box::new(store),
                clock,
                settings,
                state,
                monitor: Mutex::new(LivenessMonitor::new()),
            }),
        }
    }

    // =========================================================================
    // Reading state
    // =========================================================================

    pub fn state(&self) -> SessionState {
        self.inner.state.borrow().clone()
    }

    /// Receiver that observes every transition.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    pub fn phase(&self) -> AuthPhase {
        self.inner.state.borrow().phase()
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.state.borrow().is_authenticated
    }

    pub fn claims(&self) -> Option<ClaimSet> {
        self.inner.state.borrow().claims.clone()
    }

    pub fn token(&self) -> Option<String> {
        self.inner.state.borrow().raw_token.clone()
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.inner.settings
    }

    /// API client that attaches this session's token and reports 401s back to it.
    pub fn client(&self) -> ApiClient {
        self.inner.api.with_session(self.clone())
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    /// Restore a session from the persisted token on startup.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn initialize(&self) -> AuthPhase {
        debug!("Initializing session");
        self.restore()
    }

    /// Re-read the persisted token and re-apply the startup validity rules.
    ///
    /// Claims only change if a new token has been persisted; profile edits
    /// made on the server are not visible until the backend reissues one.
    pub fn refresh(&self) -> AuthPhase {
        debug!("Refreshing session from persisted token");
        self.restore()
    }

    fn restore(&self) -> AuthPhase {
        let stored = match self.inner.store.load() {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "Failed to read persisted token");
                None
            }
        };

        match stored {
            Some(token) => match self.inner.validate(&token, self.inner.settings.expiry_buffer_secs) {
                Ok(claims) => {
                    info!(user = %claims.subject, "Session restored from persisted token");
                    self.authenticate(token, claims);
                }
                Err(e) => {
                    info!(error = %e, "Persisted token rejected, clearing it");
                    self.inner.clear();
                }
            },
            None => {
                debug!("No persisted token found");
                self.inner.monitor().stop();
                self.inner.state.send_replace(SessionState::unauthenticated());
            }
        }

        self.phase()
    }

    /// Log in with the backend and enter `Authenticated`.
    ///
    /// Failures from the backend are returned unchanged; the state is only
    /// touched on success.
    pub async fn login(&self, username: &str, password: &str) -> Result<ClaimSet, AuthError> {
        let request = LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        };

        let response = self.inner.api.login(&request).await.map_err(|e| {
            error!(error = %e, "Login failed");
            e
        })?;

        let token = response
            .token
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| {
                warn!("Login response did not include a token");
                AuthError::MissingToken
            })?;

        let claims = token::decode(&token)?;

        if let Err(e) = self.inner.store.save(&token) {
            warn!(error = %e, "Failed to persist token");
        }

        info!(user = %claims.subject, "Login successful");
        self.authenticate(token, claims.clone());
        Ok(claims)
    }

    /// Forget the current session. Idempotent.
    pub fn logout(&self) {
        info!("Logging out");
        self.inner.clear();
    }

    /// Stop background checks without changing the state.
    pub fn teardown(&self) {
        debug!("Session teardown");
        self.inner.monitor().stop();
    }

    fn authenticate(&self, token: String, claims: ClaimSet) {
        let mut monitor = self.inner.monitor();
        self.inner
            .state
            .send_replace(SessionState::authenticated(token, claims.clone()));

        let weak = Arc::downgrade(&self.inner);
        monitor.start(self.inner.settings.check_interval, move || {
            let Some(inner) = weak.upgrade() else {
                return Liveness::Ended;
            };
            if claims.is_expired_at(inner.clock.now(), REQUEST_EXPIRY_BUFFER_SECS) {
                info!(user = %claims.subject, "Token expired during session, logging out");
                inner.clear();
                Liveness::Ended
            } else {
                Liveness::Alive
            }
        });
    }

    // =========================================================================
    // Request gate (used by ApiClient)
    // =========================================================================

    /// Token to attach to an outgoing request.
    ///
    /// An expired or unreadable token ends the session and the request is
    /// never sent.
    pub(crate) fn request_token(&self) -> Result<Option<String>, ApiError> {
        let Some(token) = self.token() else {
            return Ok(None);
        };
        match self.inner.validate(&token, REQUEST_EXPIRY_BUFFER_SECS) {
            Ok(_) => Ok(Some(token)),
            Err(AuthError::Expired) => {
                warn!("Token expired, request not sent");
                self.inner.clear();
                Err(ApiError::TokenExpired)
            }
            Err(e) => {
                warn!(error = %e, "Invalid token, request not sent");
                self.inner.clear();
                Err(ApiError::InvalidToken)
            }
        }
    }

    pub(crate) fn handle_unauthorized(&self) {
        warn!("Unauthorized response, logging out");
        self.logout();
    }
}
