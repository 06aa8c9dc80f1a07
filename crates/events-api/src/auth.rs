// Session authentication
// Decision: The session cookie is issued by the fronting OAuth2 proxy; this service only decodes it
// Decision: Every authentication failure is a 403, with no detail about which step failed

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::extract::CookieJar;
use base64::{
    engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD},
    Engine,
};
use events_core::User;

use crate::common::ErrorResponse;

/// Cookie carrying the caller's identity
pub const SESSION_COOKIE: &str = "backplane.oauth2.session";

/// Why a session could not be resolved
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("session cookie missing")]
    MissingCookie,

    #[error("session cookie is not valid base64: {0}")]
    Encoding(#[from] base64::DecodeError),

    #[error("session cookie is not a valid user: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("session user has no id")]
    MissingUserId,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        tracing::debug!(error = %self, "Rejected session");
        (
            StatusCode::FORBIDDEN,
            Json(ErrorResponse::new("Forbidden")),
        )
            .into_response()
    }
}

/// Authenticated caller, decoded from the session cookie
#[derive(Debug, Clone)]
pub struct SessionUser(pub User);

#[axum::async_trait]
impl<S> FromRequestParts<S> for SessionUser
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let cookie = jar.get(SESSION_COOKIE).ok_or(AuthError::MissingCookie)?;
        decode_session(cookie.value()).map(SessionUser)
    }
}

/// Decode a session cookie value: URL-safe base64 of a JSON user
pub fn decode_session(value: &str) -> Result<User, AuthError> {
    let value = value.trim();
    let bytes = URL_SAFE
        .decode(value)
        .or_else(|_| URL_SAFE_NO_PAD.decode(value))?;

    let user: User = serde_json::from_slice(&bytes)?;
    if user.id.trim().is_empty() {
        return Err(AuthError::MissingUserId);
    }
    Ok(user)
}

/// Encode a user as a session cookie value
pub fn encode_session(user: &User) -> Result<String, serde_json::Error> {
    Ok(URL_SAFE.encode(serde_json::to_vec(user)?))
}
