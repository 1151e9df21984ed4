//! Shared helpers for unit tests: token minting and a clock that follows
//! Tokio's (pausable) time.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::Serialize;

use crate::auth::Clock;

const TEST_SECRET: &[u8] = b"labbook-test-secret";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenSpec {
    pub sub: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
}

impl TokenSpec {
    /// A token for `sub` issued now and expiring `expires_in_secs` from now.
    pub fn for_subject(sub: &str, expires_in_secs: i64) -> Self {
        Self::expiring_at(sub, Utc::now() + Duration::seconds(expires_in_secs))
    }

    pub fn expiring_at(sub: &str, expiry: DateTime<Utc>) -> Self {
        Self {
            sub: sub.to_string(),
            email: Some(format!("{}@lab.test", sub)),
            first_name: None,
            last_name: None,
            role: Some("STUDENT".to_string()),
            iat: Some(Utc::now().timestamp()),
            exp: Some(expiry.timestamp()),
        }
    }
}

pub fn mint_token(spec: &TokenSpec) -> String {
    encode(&Header::default(), spec, &EncodingKey::from_secret(TEST_SECRET))
        .expect("failed to mint test token")
}

/// Wall clock anchored at creation that advances with `tokio::time`, so
/// paused-time tests move token expiry checks forward too.
pub struct TokioClock {
    origin: DateTime<Utc>,
    started: tokio::time::Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self {
            origin: Utc::now(),
            started: tokio::time::Instant::now(),
        }
    }

    pub fn origin(&self) -> DateTime<Utc> {
        self.origin
    }
}

impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = Duration::from_std(self.started.elapsed()).unwrap_or_else(|_| Duration::zero());
        self.origin + elapsed
    }
}
