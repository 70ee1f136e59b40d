//! Firebase Auth REST client
//!
//! - `accounts:signInWithIdp` exchanges a federated (Microsoft) credential for a Firebase user
//! - `token` (Secure Token API) refreshes a user's ID token

use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use super::GoogleErrorBody;

/// Authentication failure, carrying the provider's message unchanged
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("{message}")]
    Provider { status: u16, message: String },

    #[error("identity service unavailable: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Secure Token API messages meaning the refresh token will never work again
const REVOKED_CREDENTIAL_MESSAGES: &[&str] = &[
    "TOKEN_EXPIRED",
    "USER_DISABLED",
    "USER_NOT_FOUND",
    "INVALID_REFRESH_TOKEN",
];

impl IdentityError {
    /// Whether the provider refused the credential for good, rather than failing transiently
    pub fn is_revoked_credential(&self) -> bool {
        match self {
            Self::Provider { status, message } => {
                (400..500).contains(status)
                    && REVOKED_CREDENTIAL_MESSAGES
                        .iter()
                        .any(|code| message.starts_with(code))
            }
            Self::Transport(_) => false,
        }
    }
}

/// A signed-in Firebase user and its tokens
#[derive(Debug, Clone)]
pub struct FirebaseUser {
    pub uid: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub provider_id: Option<String>,
    pub id_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

impl FirebaseUser {
    /// Whether the ID token expires within `margin`
    pub fn token_expires_within(&self, margin: Duration, now: DateTime<Utc>) -> bool {
        self.expires_at - margin <= now
    }

    pub fn apply_refresh(&mut self, refreshed: RefreshedToken, now: DateTime<Utc>) {
        self.expires_at = now + Duration::seconds(refreshed.expires_in_seconds());
        self.id_token = refreshed.id_token;
        self.refresh_token = refreshed.refresh_token;
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SignInWithIdpRequest<'a> {
    post_body: &'a str,
    request_uri: &'a str,
    return_idp_credential: bool,
    return_secure_token: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignInWithIdpResponse {
    local_id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    provider_id: Option<String>,
    id_token: String,
    refresh_token: String,
    expires_in: String,
}

/// Secure Token API response (snake_case, unlike Identity Toolkit)
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshedToken {
    pub id_token: String,
    pub refresh_token: String,
    pub expires_in: String,
}

impl RefreshedToken {
    fn expires_in_seconds(&self) -> i64 {
        parse_expires_in(&self.expires_in)
    }
}

// Firebase sends lifetimes as decimal strings; 3600 is what it issues today
fn parse_expires_in(raw: &str) -> i64 {
    raw.parse().unwrap_or(3600)
}

#[derive(Clone)]
pub struct IdentityClient {
    client: Client,
    identity_toolkit_url: String,
    secure_token_url: String,
    api_key: String,
}

impl IdentityClient {
    pub fn new(
        client: Client,
        identity_toolkit_url: &str,
        secure_token_url: &str,
        api_key: &str,
    ) -> Self {
        Self {
            client,
            identity_toolkit_url: identity_toolkit_url.trim_end_matches('/').to_string(),
            secure_token_url: secure_token_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    /// Sign in with a federated identity provider credential.
    ///
    /// `post_body` is the form-encoded provider credential
    /// (`id_token=...&access_token=...&providerId=microsoft.com`).
    #[instrument(skip(self, post_body))]
    pub async fn sign_in_with_idp(
        &self,
        post_body: &str,
        request_uri: &str,
    ) -> Result<FirebaseUser, IdentityError> {
        let url = format!("{}/accounts:signInWithIdp", self.identity_toolkit_url);

        let response = self
            .client
            .post(&url)
            .query(&[("key", &self.api_key)])
            .json(&SignInWithIdpRequest {
                post_body,
                request_uri,
                return_idp_credential: true,
                return_secure_token: true,
            })
            .send()
            .await?;

        let body: SignInWithIdpResponse = read_json(response).await?;
        debug!(uid = %body.local_id, "Federated sign-in succeeded");

        Ok(FirebaseUser {
            expires_at: Utc::now() + Duration::seconds(parse_expires_in(&body.expires_in)),
            uid: body.local_id,
            email: body.email,
            display_name: body.display_name,
            provider_id: body.provider_id,
            id_token: body.id_token,
            refresh_token: body.refresh_token,
        })
    }

    /// Exchange a refresh token for a fresh ID token
    #[instrument(skip_all)]
    pub async fn refresh(&self, refresh_token: &str) -> Result<RefreshedToken, IdentityError> {
        let url = format!("{}/token", self.secure_token_url);

        let response = self
            .client
            .post(&url)
            .query(&[("key", &self.api_key)])
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .send()
            .await?;

        read_json(response).await
    }
}

async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, IdentityError> {
    let status = response.status();

    if status.is_success() {
        return Ok(response.json::<T>().await?);
    }

    let message = response
        .json::<GoogleErrorBody>()
        .await
        .ok()
        .map(|body| body.error.message)
        .unwrap_or_else(|| format!("identity service error: {status}"));

    warn!(status = %status, message = %message, "Identity provider rejected request");

    Err(IdentityError::Provider {
        status: status.as_u16(),
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn user(expires_at: DateTime<Utc>) -> FirebaseUser {
        FirebaseUser {
            uid: "u1".into(),
            email: None,
            display_name: None,
            provider_id: Some("microsoft.com".into()),
            id_token: "old-id".into(),
            refresh_token: "old-refresh".into(),
            expires_at,
        }
    }

    #[test]
    fn refresh_replaces_tokens_and_expiry() {
        let now = Utc.with_ymd_and_hms(2024, 2, 1, 12, 0, 0).unwrap();
        let mut u = user(now);

        u.apply_refresh(
            RefreshedToken {
                id_token: "new-id".into(),
                refresh_token: "new-refresh".into(),
                expires_in: "3600".into(),
            },
            now,
        );

        assert_eq!(u.id_token, "new-id");
        assert_eq!(u.refresh_token, "new-refresh");
        assert_eq!(u.expires_at, now + Duration::hours(1));
    }

    #[test]
    fn expiry_margin() {
        let now = Utc.with_ymd_and_hms(2024, 2, 1, 12, 0, 0).unwrap();
        let u = user(now + Duration::minutes(3));

        assert!(u.token_expires_within(Duration::minutes(5), now));
        assert!(!u.token_expires_within(Duration::minutes(1), now));
    }

    #[test]
    fn secure_token_response_shape() {
        let refreshed: RefreshedToken = serde_json::from_str(
            r#"{"access_token":"a","expires_in":"3600","token_type":"Bearer","refresh_token":"r","id_token":"i","user_id":"u1","project_id":"1"}"#,
        )
        .unwrap();

        assert_eq!(refreshed.id_token, "i");
        assert_eq!(refreshed.expires_in_seconds(), 3600);
    }

    #[test]
    fn revoked_refresh_tokens_are_recognised() {
        let provider = |status, message: &str| IdentityError::Provider {
            status,
            message: message.to_string(),
        };

        assert!(provider(400, "TOKEN_EXPIRED").is_revoked_credential());
        assert!(provider(400, "USER_DISABLED : The user account has been disabled.").is_revoked_credential());
        assert!(!provider(400, "MISSING_REFRESH_TOKEN").is_revoked_credential());
        assert!(!provider(503, "TOKEN_EXPIRED").is_revoked_credential());
    }
}
