use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::auth::{AuthClaims, RequireAuth};

#[derive(Serialize)]
pub struct MeResponse {
    pub uid: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    /// Identity provider used to sign in (`microsoft.com`)
    pub provider_id: Option<String>,
    pub session_id: Uuid,
    pub signed_in_at: DateTime<Utc>,
    /// `null` while the claims are still being read, `{}` when there are none
    pub claims: Option<AuthClaims>,
}

/// Get current signed-in user and their claims
pub async fn get_me(auth: RequireAuth) -> Json<MeResponse> {
    Json(MeResponse {
        uid: auth.uid.clone(),
        email: auth.email.clone(),
        display_name: auth.session().display_name(),
        provider_id: auth.session().provider_id(),
        session_id: auth.session_id(),
        signed_in_at: auth.session().created_at(),
        claims: auth.claims.clone(),
    })
}
