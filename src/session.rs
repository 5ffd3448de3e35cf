use base64::{engine::general_purpose::URL_SAFE_NO_PAD as BASE64URL, Engine as _};
use log::info;
use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

use crate::models::UserId;

/// Identity of the signed-in user, fixed for the process lifetime.
///
/// The bearer token comes from an external identity provider before
/// startup; this type only carries it and the subject id decoded from
/// its payload. Token acquisition and refresh live outside this crate.
#[derive(Debug, Clone)]
pub struct Session {
    user_id: UserId,
    token: String,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("token is not a three-segment JWT")]
    MalformedToken,
    #[error("token payload is not valid base64url: {0}")]
    PayloadEncoding(#[from] base64::DecodeError),
    #[error("token claims are not valid JSON: {0}")]
    ClaimsFormat(#[from] serde_json::Error),
    #[error("token subject is not a UUID: {0}")]
    SubjectFormat(#[from] uuid::Error),
}

#[derive(Deserialize)]
struct Claims {
    sub: String,
}

impl Session {
    /// Decodes the payload segment of `token` and takes its `sub` claim
    /// as the user id. The signature is not verified here; the backend
    /// rejects tampered tokens on every call anyway.
    pub fn from_token(token: impl Into<String>) -> Result<Self, SessionError> {
        let token = token.into();
        let mut segments = token.split('.');
        let payload = match (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) {
            (Some(_), Some(payload), Some(_), None) => payload,
            _ => return Err(SessionError::MalformedToken),
        };
        let decoded = BASE64URL.decode(payload)?;
        let claims: Claims = serde_json::from_slice(&decoded)?;
        let user_id = Uuid::parse_str(&claims.sub)?;

        info!("session established for user {user_id}");
        Ok(Session { user_id, token })
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}
