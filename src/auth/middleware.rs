use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::extract::cookie::CookieJar;
use std::convert::Infallible;
use std::sync::Arc;
use uuid::Uuid;

use super::{AuthContext, Session};
use crate::app::AppState;
use crate::error::ErrorResponse;

/// Cookie holding the console session id
pub const SESSION_COOKIE: &str = "dbportal_session";

/// Extractor that requires a signed-in session
///
/// Example:
/// ```ignore
/// async fn protected_route(auth: RequireAuth) -> impl IntoResponse {
///     format!("Hello, user {}", auth.uid)
/// }
/// ```
#[derive(Debug, Clone)]
pub struct RequireAuth(pub AuthContext);

impl std::ops::Deref for RequireAuth {
    type Target = AuthContext;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Extractor for routes that also serve anonymous callers
#[derive(Clone)]
pub struct MaybeAuth(pub Option<AuthContext>);

#[derive(Debug)]
pub enum AuthError {
    MissingSession,
    InvalidFormat,
    UnknownSession,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let message = match &self {
            AuthError::MissingSession => "Not signed in",
            AuthError::InvalidFormat => "Invalid session cookie",
            AuthError::UnknownSession => "Session expired or signed out",
        };

        let body = ErrorResponse {
            code: "UNAUTHORIZED".to_string(),
            message: message.to_string(),
            request_id: None,
        };

        (StatusCode::UNAUTHORIZED, Json(body)).into_response()
    }
}

fn session_from_parts(parts: &Parts, state: &AppState) -> Result<Arc<Session>, AuthError> {
    let jar = CookieJar::from_headers(&parts.headers);
    let raw = jar
        .get(SESSION_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .ok_or(AuthError::MissingSession)?;

    let id = Uuid::parse_str(&raw).map_err(|_| AuthError::InvalidFormat)?;

    state.sessions.get(&id).ok_or_else(|| {
        tracing::debug!(session_id = %id, "Unknown session");
        AuthError::UnknownSession
    })
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for RequireAuth {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let session = session_from_parts(parts, state)?;
        Ok(RequireAuth(AuthContext::from_session(session)))
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for MaybeAuth {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        Ok(MaybeAuth(
            session_from_parts(parts, state)
                .ok()
                .map(AuthContext::from_session),
        ))
    }
}
