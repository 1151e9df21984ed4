//! Data models for the labbook backend.
//!
//! - `Experiment`, `ExperimentStatus`, `Page`: experiment records and paged listings
//! - `User`, `ProfileUpdate`: user accounts and profile edits
//! - `LoginRequest`, `LoginResponse`, `RegisterRequest`: auth payloads

pub mod experiment;
pub mod user;

pub use experiment::{filter_by_title, Experiment, ExperimentStatus, Page};
pub use user::{LoginRequest, LoginResponse, ProfileUpdate, RegisterRequest, User, DEFAULT_ROLE};
