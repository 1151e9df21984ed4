//! REST API client module for the labbook backend.
//!
//! This module provides the `ApiClient` for logging in, registering,
//! managing experiment records and editing user profiles.
//!
//! Requests made through a session-bound client carry the session's JWT
//! as a bearer token; expired tokens are caught before a request leaves
//! the client, and a 401 response ends the session.

pub mod client;
pub mod error;

pub use client::{ApiClient, ProfilePicture};
pub use error::ApiError;
