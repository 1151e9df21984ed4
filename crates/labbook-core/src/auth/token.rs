//! Bearer token decoding.
//!
//! Tokens are JWTs issued by the backend. The client never verifies the
//! signature (it has no key); it only reads the payload to learn who is
//! logged in and when the token stops being accepted.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Seconds before expiry at which a restored token is already treated as invalid.
pub const PROACTIVE_EXPIRY_BUFFER_SECS: i64 = 300;

/// Buffer used when gating an outgoing request.
pub const REQUEST_EXPIRY_BUFFER_SECS: i64 = 0;

#[derive(Error, Debug)]
pub enum TokenError {
    #[error("Malformed token: {0}")]
    Malformed(&'static str),

    #[error("Token payload is not valid base64url: {0}")]
    Encoding(#[from] base64::DecodeError),

    #[error("Token payload is not a valid claim set: {0}")]
    Claims(#[from] serde_json::Error),

    #[error("Invalid {0} claim: {1}")]
    InvalidClaim(&'static str, i64),
}

/// Claims carried inside a bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClaimSet {
    /// The username the token was issued to.
    pub subject: String,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: Option<String>,
    pub issued_at: Option<DateTime<Utc>>,
    /// `None` when the token carries no `exp` claim; such tokens never expire client-side.
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClaimsRepr {
    sub: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
    #[serde(default)]
    role: Option<String>,
    // NumericDate may carry a fractional part
    #[serde(default)]
    iat: Option<f64>,
    #[serde(default)]
    exp: Option<f64>,
}

fn timestamp(claim: &'static str, value: Option<f64>) -> Result<Option<DateTime<Utc>>, TokenError> {
    // Saturating cast; out-of-range values are rejected by `timestamp_opt`
    match value.map(|secs| secs.trunc() as i64) {
        Some(secs) => Utc
            .timestamp_opt(secs, 0)
            .single()
            .map(Some)
            .ok_or(TokenError::InvalidClaim(claim, secs)),
        None => Ok(None),
    }
}

impl TryFrom<ClaimsRepr> for ClaimSet {
    type Error = TokenError;

    fn try_from(value: ClaimsRepr) -> Result<Self, TokenError> {
        Ok(Self {
            issued_at: timestamp("iat", value.iat)?,
            expires_at: timestamp("exp", value.exp)?,
            subject: value.sub,
            email: value.email,
            first_name: value.first_name,
            last_name: value.last_name,
            role: value.role,
        })
    }
}

impl ClaimSet {
    /// True if the token expires before `now + buffer_secs`.
    ///
    /// A buffer too large to represent counts as expired.
    pub fn is_expired_at(&self, now: DateTime<Utc>, buffer_secs: i64) -> bool {
        let Some(expiry) = self.expires_at else {
            return false;
        };
        match Duration::try_seconds(buffer_secs).and_then(|buffer| now.checked_add_signed(buffer)) {
            Some(deadline) => expiry < deadline,
            None => true,
        }
    }

    pub fn is_expired(&self, buffer_secs: i64) -> bool {
        self.is_expired_at(Utc::now(), buffer_secs)
    }

    /// Time left until expiry, clamped at zero. `None` for tokens without `exp`.
    pub fn time_until_expiry(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.expires_at
            .map(|expiry| (expiry - now).max(Duration::zero()))
    }

    /// "First Last", falling back to the subject when no name is present.
    pub fn display_name(&self) -> String {
        let parts: Vec<&str> = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .filter(|s| !s.is_empty())
            .collect();
        if parts.is_empty() {
            self.subject.clone()
        } else {
            parts.join(" ")
        }
    }
}

/// Decode a bearer token into its claim set without verifying the signature.
pub fn decode(token: &str) -> Result<ClaimSet, TokenError> {
    let mut segments = token.split('.');
    let (Some(header), Some(payload), Some(_signature), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return Err(TokenError::Malformed("expected three dot-separated segments"));
    };
    if header.is_empty() || payload.is_empty() {
        return Err(TokenError::Malformed("empty header or payload segment"));
    }

    // Some issuers pad base64url segments even though JWT forbids it
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('='))?;
    let repr: ClaimsRepr = serde_json::from_slice(&bytes)?;
    repr.try_into()
}

/// Free-function form of [`ClaimSet::is_expired`].
pub fn is_expired(claims: &ClaimSet, buffer_secs: i64) -> bool {
    claims.is_expired(buffer_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{mint_token, TokenSpec};

    #[test]
    fn test_decode_full_claim_set() {
        let now = Utc::now().timestamp();
        let token = mint_token(&TokenSpec {
            sub: "alice".to_string(),
            email: Some("alice@lab.test".to_string()),
            first_name: Some("Alice".to_string()),
            last_name: Some("Liddell".to_string()),
            role: Some("STUDENT".to_string()),
            iat: Some(now),
            exp: Some(now + 3600),
        });

        let claims = decode(&token).expect("token should decode");
        assert_eq!(claims.subject, "alice");
        assert_eq!(claims.email.as_deref(), Some("alice@lab.test"));
        assert_eq!(claims.role.as_deref(), Some("STUDENT"));
        assert_eq!(claims.issued_at.map(|t| t.timestamp()), Some(now));
        assert_eq!(claims.expires_at.map(|t| t.timestamp()), Some(now + 3600));
        assert_eq!(claims.display_name(), "Alice Liddell");
    }

    #[test]
    fn test_decode_rejects_malformed_tokens() {
        assert!(matches!(decode(""), Err(TokenError::Malformed(_))));
        assert!(matches!(decode("not-a-token"), Err(TokenError::Malformed(_))));
        assert!(matches!(decode("a.b"), Err(TokenError::Malformed(_))));
        assert!(matches!(decode("a.b.c.d"), Err(TokenError::Malformed(_))));
        assert!(matches!(decode("a..c"), Err(TokenError::Malformed(_))));
        assert!(matches!(decode("eyJhbGciOiJIUzI1NiJ9.!!!.sig"), Err(TokenError::Encoding(_))));

        // Valid base64url, but not JSON
        let payload = URL_SAFE_NO_PAD.encode(b"hello");
        let token = format!("eyJhbGciOiJIUzI1NiJ9.{}.sig", payload);
        assert!(matches!(decode(&token), Err(TokenError::Claims(_))));

        // JSON without a subject
        let payload = URL_SAFE_NO_PAD.encode(br#"{"exp": 1}"#);
        let token = format!("eyJhbGciOiJIUzI1NiJ9.{}.sig", payload);
        assert!(matches!(decode(&token), Err(TokenError::Claims(_))));
    }

    #[test]
    fn test_decode_rejects_out_of_range_expiry() {
        let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"sub":"bob","exp":{}}}"#, i64::MAX));
        let token = format!("eyJhbGciOiJIUzI1NiJ9.{}.sig", payload);
        assert!(matches!(decode(&token), Err(TokenError::InvalidClaim("exp", _))));
    }

    #[test]
    fn test_decode_accepts_fractional_timestamps() {
        let payload = URL_SAFE_NO_PAD.encode(br#"{"sub":"bob","iat":1700000000.25,"exp":1700003600.9}"#);
        let token = format!("eyJhbGciOiJIUzI1NiJ9.{}.sig", payload);
        let claims = decode(&token).expect("fractional claims should decode");
        assert_eq!(claims.issued_at.map(|t| t.timestamp()), Some(1_700_000_000));
        assert_eq!(claims.expires_at.map(|t| t.timestamp()), Some(1_700_003_600));
    }

    #[test]
    fn test_decode_tolerates_padded_payload() {
        let payload = format!("{}==", URL_SAFE_NO_PAD.encode(br#"{"sub":"bob"}"#));
        let token = format!("eyJhbGciOiJIUzI1NiJ9.{}.sig", payload);
        let claims = decode(&token).expect("padded payload should decode");
        assert_eq!(claims.subject, "bob");
        assert_eq!(claims.expires_at, None);
    }

    #[test]
    fn test_is_expired_respects_buffer() {
        let now = Utc::now();
        let mut claims = decode(&mint_token(&TokenSpec::for_subject("alice", 0))).unwrap();

        claims.expires_at = Some(now - Duration::seconds(1));
        assert!(claims.is_expired_at(now, 0));

        claims.expires_at = Some(now + Duration::seconds(300));
        assert!(!claims.is_expired_at(now, 300));
        assert!(!claims.is_expired_at(now, 0));

        claims.expires_at = Some(now + Duration::seconds(299));
        assert!(claims.is_expired_at(now, 300));
        assert!(!claims.is_expired_at(now, 0));
    }

    #[test]
    fn test_out_of_range_buffer_counts_as_expired() {
        let now = Utc::now();
        let claims = decode(&mint_token(&TokenSpec::for_subject("alice", 3600))).unwrap();
        assert!(claims.is_expired_at(now, i64::MAX));
        assert!(claims.is_expired_at(now, i64::MIN));
        assert!(!claims.is_expired_at(now, 60));
    }

    #[test]
    fn test_missing_expiry_never_expires() {
        let payload = URL_SAFE_NO_PAD.encode(br#"{"sub":"carol"}"#);
        let claims = decode(&format!("e30.{}.sig", payload)).unwrap();
        assert!(!is_expired(&claims, PROACTIVE_EXPIRY_BUFFER_SECS));
        assert_eq!(claims.time_until_expiry(Utc::now()), None);
        assert_eq!(claims.display_name(), "carol");
    }

    #[test]
    fn test_time_until_expiry_clamps_at_zero() {
        let now = Utc::now();
        let mut claims = decode(&mint_token(&TokenSpec::for_subject("alice", 60))).unwrap();
        claims.expires_at = Some(now - Duration::seconds(10));
        assert_eq!(claims.time_until_expiry(now), Some(Duration::zero()));
    }
}
