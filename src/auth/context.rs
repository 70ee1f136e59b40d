use std::sync::Arc;
use uuid::Uuid;

use super::{AuthClaims, Session};
use crate::domain::nav::route_permits;
use crate::error::ApiError;

/// Authenticated request context built from the caller's session
/// This is attached to request extensions after successful auth
#[derive(Clone)]
pub struct AuthContext {
    /// Firebase user ID
    pub uid: String,

    pub email: Option<String>,

    /// Claims snapshot taken when the request arrived
    pub claims: Option<AuthClaims>,

    session: Arc<Session>,
}

impl AuthContext {
    pub fn from_session(session: Arc<Session>) -> Self {
        Self {
            uid: session.uid(),
            email: session.email(),
            claims: session.claims(),
            session,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session.id()
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Fail with `403` unless the caller's claims open the console page at `path`
    pub fn require_route(&self, path: &str) -> Result<(), ApiError> {
        if route_permits(path, self.claims.as_ref()) {
            Ok(())
        } else {
            tracing::warn!(uid = %self.uid, path, "Route denied by claims");
            Err(ApiError::Forbidden(format!(
                "Your account does not have access to {path}"
            )))
        }
    }

    /// ID token for calls made on the user's behalf
    pub async fn id_token(&self) -> Result<String, ApiError> {
        self.session
            .id_token()
            .await
            .map_err(|e| ApiError::Unauthorized(e.to_string()))
    }
}

impl std::fmt::Debug for AuthContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthContext")
            .field("uid", &self.uid)
            .field("email", &self.email)
            .field("claims", &self.claims)
            .field("session_id", &self.session.id())
            .finish()
    }
}
