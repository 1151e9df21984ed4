//! Core library for labbook.
//!
//! Holds everything a labbook front-end needs apart from rendering:
//!
//! - `auth`: bearer token decoding, the session state machine, token
//!   persistence and the liveness monitor that logs out expired sessions
//! - `events`: shared search term and refresh signal for independent views
//! - `api`: REST client for the experiment backend
//! - `models`: wire types for experiments, users and auth payloads
//! - `config`: persisted client configuration

pub mod api;
pub mod auth;
pub mod config;
pub mod events;
pub mod models;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;

pub use api::{ApiClient, ApiError};
pub use auth::{AuthError, AuthPhase, ClaimSet, Session, SessionSettings, SessionState};
pub use config::Config;
pub use events::EventBus;
