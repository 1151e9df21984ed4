//! API client for communicating with the labbook REST backend.
//!
//! This module provides the `ApiClient` struct for making authenticated
//! API requests to manage experiments, users and profile pictures.

use std::time::Duration;

use chrono::Utc;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::auth::Session;
use crate::config::Config;
use crate::models::{
    Experiment, ExperimentStatus, LoginRequest, LoginResponse, Page, ProfileUpdate,
    RegisterRequest, User,
};

use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds.
/// 30s allows for slow API responses while failing fast enough for good UX.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Page size used by the search endpoint when the caller does not pick one.
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// An image to upload as a user's profile picture.
#[derive(Debug, Clone)]
pub struct ProfilePicture {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// API client for the labbook backend.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    session: Option<Session>,
}

impl ApiClient {
    /// Create a new API client for `base_url` (e.g. `http://localhost:8080/api`)
    pub fn new(base_url: impl Into<String>) -> Result<Self, ApiError> {
        Self::with_timeout(base_url, Duration::from_secs(REQUEST_TIMEOUT_SECS))
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(timeout).build()?;
        let base_url: String = base_url.into();

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            session: None,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, ApiError> {
        Self::with_timeout(config.api_base_url(), config.request_timeout())
    }

    /// Create a client bound to `session`, sharing the connection pool.
    pub fn with_session(&self, session: Session) -> Self {
        Self {
            client: self.client.clone(), // Cheap clone, shares connection pool
            base_url: self.base_url.clone(),
            session: Some(session),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// URL for `path` with `segment` appended as a single percent-encoded path segment.
    fn segment_url(&self, path: &str, segment: &str) -> Result<Url, ApiError> {
        let mut url = Url::parse(&self.url(path)).map_err(|e| ApiError::InvalidUrl(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidUrl(self.base_url.clone()))?
            .pop_if_empty()
            .push(segment);
        Ok(url)
    }

    // ===== Request plumbing =====

    /// Attach the session's bearer token. Fails without sending if the token has expired.
    fn authorize(&self, request: RequestBuilder) -> Result<RequestBuilder, ApiError> {
        let token = match self.session {
            Some(ref session) => session.request_token()?,
            None => None,
        };
        Ok(match token {
            Some(token) => request.bearer_auth(token),
            None => request,
        })
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(&self, response: Response) -> Result<Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        match status {
            StatusCode::UNAUTHORIZED => {
                if let Some(ref session) = self.session {
                    session.handle_unauthorized();
                }
            }
            StatusCode::FORBIDDEN => warn!("Access forbidden"),
            _ => {}
        }
        Err(ApiError::from_status(status, &body))
    }

    async fn execute(&self, request: RequestBuilder) -> Result<Response, ApiError> {
        let response = self.authorize(request)?.send().await?;
        debug!(status = %response.status(), url = %response.url(), "Response received");
        self.check_response(response).await
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ApiError> {
        let response = self.execute(request).await?;
        let text = response.text().await?;
        serde_json::from_str(&text)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse response: {}", e)))
    }

    async fn send_empty(&self, request: RequestBuilder) -> Result<(), ApiError> {
        self.execute(request).await?;
        Ok(())
    }

    // ===== Auth =====

    pub async fn login(&self, credentials: &LoginRequest) -> Result<LoginResponse, ApiError> {
        debug!(user = %credentials.username, "Sending login request");
        let request = self.client.post(self.url("/auth/login")).json(credentials);
        self.send_json(request).await
    }

    pub async fn register(&self, registration: &RegisterRequest) -> Result<(), ApiError> {
        debug!(user = %registration.username, "Sending registration request");
        let request = self.client.post(self.url("/auth/register")).json(registration);
        self.send_empty(request).await
    }

    // ===== Experiments =====

    /// Fetch all experiments. A response that is not a list yields no experiments.
    pub async fn list_experiments(&self) -> Result<Vec<Experiment>, ApiError> {
        let request = self.client.get(self.url("/experiments"));
        let value: serde_json::Value = self.send_json(request).await?;
        if !value.is_array() {
            warn!("Experiment list response is not an array");
            return Ok(vec![]);
        }
        serde_json::from_value(value)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse experiments: {}", e)))
    }

    pub async fn get_experiment(&self, id: i64) -> Result<Experiment, ApiError> {
        let request = self.client.get(self.url(&format!("/experiments/{}", id)));
        self.send_json(request).await
    }

    pub async fn create_experiment(&self, experiment: &Experiment) -> Result<Experiment, ApiError> {
        let request = self.client.post(self.url("/experiments")).json(experiment);
        self.send_json(request).await
    }

    pub async fn update_experiment(&self, id: i64, experiment: &Experiment) -> Result<Experiment, ApiError> {
        let request = self
            .client
            .put(self.url(&format!("/experiments/{}", id)))
            .json(experiment);
        self.send_json(request).await
    }

    pub async fn delete_experiment(&self, id: i64) -> Result<(), ApiError> {
        let request = self.client.delete(self.url(&format!("/experiments/{}", id)));
        self.send_empty(request).await
    }

    pub async fn update_experiment_status(
        &self,
        id: i64,
        status: ExperimentStatus,
    ) -> Result<Experiment, ApiError> {
        let request = self
            .client
            .put(self.url(&format!("/experiments/{}/status", id)))
            .query(&[("status", status.as_str())]);
        self.send_json(request).await
    }

    /// Server-side keyword search, zero-based `page`.
    pub async fn search_experiments(
        &self,
        keyword: &str,
        page: u32,
        size: u32,
    ) -> Result<Page<Experiment>, ApiError> {
        let request = self.client.get(self.url("/experiments/search")).query(&[
            ("keyword", keyword.to_string()),
            ("page", page.to_string()),
            ("size", size.to_string()),
        ]);
        self.send_json(request).await
    }

    pub async fn experiments_by_user(&self, user_id: i64) -> Result<Vec<Experiment>, ApiError> {
        let request = self.client.get(self.url(&format!("/experiments/user/{}", user_id)));
        self.send_json(request).await
    }

    pub async fn experiments_by_status(&self, status: ExperimentStatus) -> Result<Vec<Experiment>, ApiError> {
        let request = self
            .client
            .get(self.url(&format!("/experiments/status/{}", status.as_str())));
        self.send_json(request).await
    }

    // ===== Users =====

    pub async fn list_users(&self) -> Result<Vec<User>, ApiError> {
        let request = self.client.get(self.url("/users"));
        self.send_json(request).await
    }

    /// `id` is the username for accounts addressed through their token subject.
    pub async fn get_user(&self, id: &str) -> Result<User, ApiError> {
        let request = self.client.get(self.segment_url("/users", id)?);
        self.send_json(request).await
    }

    pub async fn create_user(&self, user: &RegisterRequest) -> Result<User, ApiError> {
        let request = self.client.post(self.url("/users")).json(user);
        self.send_json(request).await
    }

    pub async fn update_user(&self, id: &str, profile: &ProfileUpdate) -> Result<User, ApiError> {
        let request = self.client.put(self.segment_url("/users", id)?).json(profile);
        self.send_json(request).await
    }

    pub async fn delete_user(&self, id: &str) -> Result<(), ApiError> {
        let request = self.client.delete(self.segment_url("/users", id)?);
        self.send_empty(request).await
    }

    /// True if the username is already taken.
    pub async fn check_username(&self, username: &str) -> Result<bool, ApiError> {
        let request = self
            .client
            .get(self.segment_url("/users/check-username", username)?);
        self.send_json(request).await
    }

    /// True if the email is already registered.
    pub async fn check_email(&self, email: &str) -> Result<bool, ApiError> {
        let request = self.client.get(self.segment_url("/users/check-email", email)?);
        self.send_json(request).await
    }

    // ===== Profile pictures =====

    pub async fn upload_profile_picture(
        &self,
        username: &str,
        picture: ProfilePicture,
    ) -> Result<(), ApiError> {
        let size = picture.bytes.len();
        let part = Part::bytes(picture.bytes)
            .file_name(picture.file_name)
            .mime_str(&picture.content_type)?;
        let form = Form::new().part("file", part);

        debug!(user = %username, bytes = size, "Uploading profile picture");
        let request = self
            .client
            .post(self.segment_url("/profile-pictures", username)?)
            .multipart(form);
        self.send_empty(request).await
    }

    /// Profile picture URL with a cache-busting timestamp.
    pub fn profile_picture_url(&self, username: &str) -> Result<String, ApiError> {
        let mut url = self.segment_url("/profile-pictures", username)?;
        url.query_pairs_mut()
            .append_pair("t", &Utc::now().timestamp_millis().to_string());
        Ok(url.into())
    }
}
