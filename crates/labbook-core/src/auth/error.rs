use thiserror::Error;

use super::token::TokenError;
use crate::api::ApiError;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid token: {0}")]
    Decode(#[from] TokenError),

    #[error("No token received from server")]
    MissingToken,

    #[error("Token expired")]
    Expired,

    #[error(transparent)]
    Api(#[from] ApiError),
}

impl AuthError {
    /// Message suitable for showing on a login form.
    pub fn user_message(&self) -> String {
        match self {
            AuthError::Api(e) => e.user_message(),
            AuthError::MissingToken => "Login failed: the server did not return a token.".to_string(),
            AuthError::Decode(_) => "Login failed: the server returned an unreadable token.".to_string(),
            AuthError::Expired => "Your session has expired. Please log in again.".to_string(),
        }
    }
}
