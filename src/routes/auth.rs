//! Sign-in and sign-out
//!
//! The console sends the browser to `/auth/microsoft/start`; Microsoft form-posts the
//! tokens back to `/auth/microsoft/callback`, which opens a session and redirects to the
//! console with the session cookie set.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Redirect},
    Form,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::app::AppState;
use crate::auth::sign_in::verify_nonce;
use crate::auth::{MaybeAuth, MicrosoftCredential, Session, SESSION_COOKIE};
use crate::config::Settings;
use crate::error::ApiError;

/// Short-lived cookie tying the callback to the browser that started sign-in
pub const SIGN_IN_STATE_COOKIE: &str = "dbportal_signin_state";

/// `state` and `nonce` of one authorization request, kept in the state cookie
#[derive(Debug, PartialEq, Eq)]
struct PendingSignIn {
    state: String,
    nonce: String,
}

impl PendingSignIn {
    fn new() -> Self {
        Self {
            state: Uuid::new_v4().to_string(),
            nonce: Uuid::new_v4().to_string(),
        }
    }

    fn to_cookie_value(&self) -> String {
        format!("{}.{}", self.state, self.nonce)
    }

    fn from_cookie_value(value: &str) -> Option<Self> {
        let (state, nonce) = value.split_once('.')?;
        (!state.is_empty() && !nonce.is_empty()).then(|| Self {
            state: state.to_string(),
            nonce: nonce.to_string(),
        })
    }
}

/// Microsoft returns with a cross-site form post, which only carries `SameSite=None`
/// cookies. Those must be `Secure`; browsers accept that from `http://localhost` too.
fn sign_in_state_cookie(pending: &PendingSignIn) -> Cookie<'static> {
    Cookie::build((SIGN_IN_STATE_COOKIE, pending.to_cookie_value()))
        .path("/auth")
        .http_only(true)
        .secure(true)
        .same_site(SameSite::None)
        .build()
}

/// Outside local development the console calls this service from another site.
fn session_cookie(session_id: String, settings: &Settings) -> Cookie<'static> {
    let same_site = if settings.env.is_dev() {
        SameSite::Lax
    } else {
        SameSite::None
    };

    Cookie::build((SESSION_COOKIE, session_id))
        .path("/")
        .http_only(true)
        .secure(!settings.env.is_dev())
        .same_site(same_site)
        .build()
}

fn removal(name: &'static str, path: &'static str) -> Cookie<'static> {
    Cookie::build(name).path(path).build()
}

/// GET /auth/microsoft/start
pub async fn start_sign_in(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> Result<impl IntoResponse, ApiError> {
    let pending = PendingSignIn::new();

    let url = state
        .sign_in
        .authorize_url(
            &state.settings.sign_in_redirect_uri(),
            &pending.state,
            &pending.nonce,
        )
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("Invalid authorize URL: {e}")))?;

    let jar = jar.add(sign_in_state_cookie(&pending));

    Ok((jar, Redirect::to(url.as_str())))
}

#[derive(Debug, Deserialize)]
pub struct CallbackForm {
    pub id_token: Option<String>,
    pub access_token: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// POST /auth/microsoft/callback
///
/// Signs in to Firebase with the Microsoft credential, asks the claim-update function to
/// grant the user's roles, then forces a token refresh so those claims are picked up now.
pub async fn sign_in_callback(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(form): Form<CallbackForm>,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(error) = form.error {
        return Err(ApiError::Unauthorized(
            form.error_description.unwrap_or(error),
        ));
    }

    let pending = jar
        .get(SIGN_IN_STATE_COOKIE)
        .and_then(|c| PendingSignIn::from_cookie_value(c.value()))
        .filter(|pending| form.state.as_deref() == Some(pending.state.as_str()))
        .ok_or_else(|| ApiError::BadRequest("Sign-in state mismatch".to_string()))?;

    let credential = MicrosoftCredential {
        id_token: form
            .id_token
            .ok_or_else(|| ApiError::BadRequest("Missing id_token".to_string()))?,
        access_token: form.access_token,
    };

    verify_nonce(&credential.id_token, &pending.nonce).map_err(|e| {
        tracing::warn!(error = %e, "Rejected Microsoft ID token");
        ApiError::Unauthorized(e.to_string())
    })?;

    let user = state
        .sign_in
        .trigger(
            &state.identity,
            &credential,
            &state.settings.sign_in_redirect_uri(),
        )
        .await?;

    let session = Session::start(user, state.identity.clone(), state.jwks.clone());
    state.sessions.insert(session.clone());

    let id_token = session.id_token().await?;
    if let Err(e) = state.functions.update_user_claims(&id_token).await {
        tracing::warn!(error = %e, uid = %session.uid(), "Claim update failed");
    }
    if let Err(e) = session.force_refresh().await {
        tracing::warn!(error = %e, uid = %session.uid(), "Token refresh after sign-in failed");
    }

    let jar = jar
        .remove(removal(SIGN_IN_STATE_COOKIE, "/auth"))
        .add(session_cookie(session.id().to_string(), &state.settings));

    Ok((jar, Redirect::to(&state.settings.console_url)))
}

/// POST /auth/sign-out
pub async fn sign_out(
    State(state): State<Arc<AppState>>,
    MaybeAuth(auth): MaybeAuth,
    jar: CookieJar,
) -> impl IntoResponse {
    if let Some(auth) = auth {
        auth.session().sign_out();
        state.sessions.remove(&auth.session_id());
    }

    (jar.remove(removal(SESSION_COOKIE, "/")), StatusCode::NO_CONTENT)
}
