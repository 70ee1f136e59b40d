//! Microsoft (Azure AD) federated sign-in with the university's fixed parameters

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use thiserror::Error;
use url::{form_urlencoded, Url};

use crate::config::Settings;
use crate::services::{FirebaseUser, IdentityClient, IdentityError};

pub const MICROSOFT_PROVIDER_ID: &str = "microsoft.com";
pub const DEFAULT_SCOPES: &[&str] = &["profile", "email", "openid", "offline_access", "User.Read"];
pub const DEFAULT_TENANT: &str = "2b30530b-69b6-4457-b818-481cb53d42ae";
pub const DEFAULT_DOMAIN_HINT: &str = "uky.edu";
const LOGIN_BASE_URL: &str = "https://login.microsoftonline.com";

/// Credential posted back by Microsoft after the user signs in
#[derive(Debug, Clone, Deserialize)]
pub struct MicrosoftCredential {
    pub id_token: String,
    #[serde(default)]
    pub access_token: Option<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NonceError {
    #[error("Microsoft ID token is malformed")]
    Malformed,

    #[error("Microsoft ID token was not issued for this sign-in")]
    Mismatch,
}

#[derive(Deserialize)]
struct NonceClaim {
    #[serde(default)]
    nonce: Option<String>,
}

/// Check that the Microsoft ID token carries the nonce sent with the authorization request.
///
/// Only the payload is read here; Firebase verifies the signature during `signInWithIdp`.
pub fn verify_nonce(id_token: &str, expected: &str) -> Result<(), NonceError> {
    let mut validation = Validation::new(Algorithm::RS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.set_required_spec_claims::<&str>(&[]);

    let claims = decode::<NonceClaim>(id_token, &DecodingKey::from_secret(&[]), &validation)
        .map_err(|_| NonceError::Malformed)?
        .claims;

    match claims.nonce {
        Some(nonce) if nonce == expected => Ok(()),
        _ => Err(NonceError::Mismatch),
    }
}

#[derive(Debug, Clone)]
pub struct MicrosoftSignIn {
    client_id: String,
    tenant: String,
    domain_hint: String,
    scopes: Vec<String>,
}

impl MicrosoftSignIn {
    pub fn new(client_id: &str, tenant: &str, domain_hint: &str, scopes: Vec<String>) -> Self {
        Self {
            client_id: client_id.to_string(),
            tenant: tenant.to_string(),
            domain_hint: domain_hint.to_string(),
            scopes,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            &settings.microsoft_client_id,
            &settings.microsoft_tenant,
            &settings.microsoft_domain_hint,
            settings.microsoft_scopes.clone(),
        )
    }

    /// Authorization request; Microsoft form-posts the tokens back to `redirect_uri`.
    pub fn authorize_url(
        &self,
        redirect_uri: &str,
        state: &str,
        nonce: &str,
    ) -> Result<Url, url::ParseError> {
        let scope = self.scopes.join(" ");

        Url::parse_with_params(
            &format!("{LOGIN_BASE_URL}/{}/oauth2/v2.0/authorize", self.tenant),
            [
                ("client_id", self.client_id.as_str()),
                ("response_type", "id_token token"),
                ("response_mode", "form_post"),
                ("redirect_uri", redirect_uri),
                ("scope", scope.as_str()),
                ("state", state),
                ("nonce", nonce),
                ("domain_hint", self.domain_hint.as_str()),
            ],
        )
    }

    /// Form-encoded provider credential for Identity Toolkit
    pub fn post_body(&self, credential: &MicrosoftCredential) -> String {
        let mut body = form_urlencoded::Serializer::new(String::new());
        body.append_pair("id_token", &credential.id_token);
        if let Some(access_token) = &credential.access_token {
            body.append_pair("access_token", access_token);
        }
        body.append_pair("providerId", MICROSOFT_PROVIDER_ID);
        body.finish()
    }

    /// Exchange the Microsoft credential for a Firebase user.
    ///
    /// Provider errors come back unchanged; nothing is retried.
    pub async fn trigger(
        &self,
        identity: &IdentityClient,
        credential: &MicrosoftCredential,
        request_uri: &str,
    ) -> Result<FirebaseUser, IdentityError> {
        identity
            .sign_in_with_idp(&self.post_body(credential), request_uri)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign_in() -> MicrosoftSignIn {
        MicrosoftSignIn::new(
            "client-1",
            DEFAULT_TENANT,
            DEFAULT_DOMAIN_HINT,
            DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
        )
    }

    #[test]
    fn authorize_url_carries_organization_parameters() {
        let url = sign_in()
            .authorize_url("https://portal.example/auth/microsoft/callback", "s1", "n1")
            .unwrap();

        assert_eq!(
            url.path(),
            "/2b30530b-69b6-4457-b818-481cb53d42ae/oauth2/v2.0/authorize"
        );

        let query: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(query["client_id"], "client-1");
        assert_eq!(query["domain_hint"], "uky.edu");
        assert_eq!(query["scope"], "profile email openid offline_access User.Read");
        assert_eq!(query["response_mode"], "form_post");
        assert_eq!(query["state"], "s1");
        assert_eq!(query["nonce"], "n1");
        assert_eq!(
            query["redirect_uri"],
            "https://portal.example/auth/microsoft/callback"
        );
    }

    #[test]
    fn post_body_names_the_provider() {
        let body = sign_in().post_body(&MicrosoftCredential {
            id_token: "a.b.c".into(),
            access_token: Some("tok en".into()),
        });

        assert_eq!(body, "id_token=a.b.c&access_token=tok+en&providerId=microsoft.com");

        let without_access = sign_in().post_body(&MicrosoftCredential {
            id_token: "a.b.c".into(),
            access_token: None,
        });
        assert_eq!(without_access, "id_token=a.b.c&providerId=microsoft.com");
    }

    fn microsoft_token(claims: serde_json::Value) -> String {
        jsonwebtoken::encode(
            &jsonwebtoken::Header::default(),
            &claims,
            &jsonwebtoken::EncodingKey::from_secret(b"test"),
        )
        .unwrap()
    }

    #[test]
    fn nonce_must_match_the_authorization_request() {
        let token = microsoft_token(serde_json::json!({ "nonce": "n1", "sub": "ms-user" }));

        assert_eq!(verify_nonce(&token, "n1"), Ok(()));
        assert_eq!(verify_nonce(&token, "n2"), Err(NonceError::Mismatch));

        let without = microsoft_token(serde_json::json!({ "sub": "ms-user" }));
        assert_eq!(verify_nonce(&without, "n1"), Err(NonceError::Mismatch));

        assert_eq!(verify_nonce("garbage", "n1"), Err(NonceError::Malformed));
    }
}
