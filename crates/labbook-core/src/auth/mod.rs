//! Authentication module for the client-side session lifecycle.
//!
//! This module provides:
//! - `token`: decoding of bearer tokens into a `ClaimSet` and expiry checks
//! - `Session`: the session state machine (login, logout, refresh)
//! - `LivenessMonitor`: the periodic re-check that logs out expired sessions
//! - `TokenStore`: persistence of the single credential token
//!
//! Tokens are re-validated every 60 seconds while authenticated and treated
//! as expired 5 minutes early when a session is restored.

pub mod clock;
pub mod error;
pub mod monitor;
pub mod session;
pub mod store;
pub mod token;

pub use clock::{Clock, SystemClock};
pub use error::AuthError;
pub use monitor::LivenessMonitor;
pub use session::{AuthPhase, Session, SessionSettings, SessionState};
pub use store::{FileTokenStore, KeyringTokenStore, MemoryTokenStore, TokenStore, TOKEN_FILE};
pub use token::{decode, is_expired, ClaimSet, TokenError};
