use anyhow::{Context, Result};
use std::env;

use crate::auth::jwks::FIREBASE_JWKS_URL;
use crate::auth::sign_in::{DEFAULT_DOMAIN_HINT, DEFAULT_SCOPES, DEFAULT_TENANT};
use crate::domain::grid::EVENTS_COLLECTION;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Dev,
    Staging,
    Prod,
}

impl Environment {
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "prod" | "production" => Self::Prod,
            "staging" => Self::Staging,
            _ => Self::Dev,
        }
    }

    pub fn is_dev(&self) -> bool {
        matches!(self, Self::Dev)
    }

    pub fn is_prod(&self) -> bool {
        matches!(self, Self::Prod)
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub env: Environment,
    pub server_addr: String,

    /// Public origin of this service, used to build OAuth redirect URIs
    pub public_url: String,
    /// Where the browser lands after sign-in
    pub console_url: String,

    // CORS
    pub cors_allow_origins: Vec<String>,

    // Firebase project
    pub firebase_project_id: String,
    pub firebase_api_key: String,
    pub events_collection: String,

    // Firebase REST endpoints
    pub firestore_url: String,
    pub storage_url: String,
    pub identity_toolkit_url: String,
    pub secure_token_url: String,
    pub functions_url: String,

    // ID token verification
    pub jwks_url: String,
    pub jwks_cache_ttl_seconds: u64,

    pub http_timeout_seconds: u64,

    // Sessions
    pub session_idle_minutes: u64,
    pub session_max_age_hours: u64,

    // Microsoft sign-in
    pub microsoft_client_id: String,
    pub microsoft_tenant: String,
    pub microsoft_domain_hint: String,
    pub microsoft_scopes: Vec<String>,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build settings from any variable source
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let or = |key: &str, default: &str| var(key).unwrap_or_else(|| default.to_string());
        let number = |key: &str, default: u64| {
            var(key)
                .and_then(|s| s.parse().ok())
                .unwrap_or(default)
        };
        let list = |key: &str, default: &str, sep: char| -> Vec<String> {
            or(key, default)
                .split(sep)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        };

        let env = Environment::from_str(&or("ENV", "dev"));
        let server_addr = or("SERVER_ADDR", "0.0.0.0:8080");
        let public_url = or("PUBLIC_URL", "http://localhost:8080")
            .trim_end_matches('/')
            .to_string();
        let console_url = or("CONSOLE_URL", "http://localhost:3000");

        // CORS
        let cors_allow_origins = list("CORS_ALLOW_ORIGINS", "http://localhost:3000", ',');

        // Firebase project
        let firebase_project_id =
            var("FIREBASE_PROJECT_ID").context("FIREBASE_PROJECT_ID must be set")?;
        let firebase_api_key = var("FIREBASE_API_KEY").context("FIREBASE_API_KEY must be set")?;
        let events_collection = or("EVENTS_COLLECTION", EVENTS_COLLECTION);

        // Firebase REST endpoints (override to point at the emulator suite)
        let firestore_url = or("FIRESTORE_URL", "https://firestore.googleapis.com/v1");
        let storage_url = or("STORAGE_URL", "https://firebasestorage.googleapis.com");
        let identity_toolkit_url = or(
            "IDENTITY_TOOLKIT_URL",
            "https://identitytoolkit.googleapis.com/v1",
        );
        let secure_token_url = or("SECURE_TOKEN_URL", "https://securetoken.googleapis.com/v1");
        let functions_region = or("FUNCTIONS_REGION", "us-central1");
        let functions_url = var("FUNCTIONS_URL").unwrap_or_else(|| {
            format!("https://{functions_region}-{firebase_project_id}.cloudfunctions.net")
        });

        // ID token verification
        let jwks_url = or("JWKS_URL", FIREBASE_JWKS_URL);
        let jwks_cache_ttl_seconds = number("JWKS_CACHE_TTL_SECONDS", 1800); // 30 minutes default

        let http_timeout_seconds = number("HTTP_TIMEOUT_SECONDS", 15);

        // Sessions
        let session_idle_minutes = number("SESSION_IDLE_MINUTES", 120);
        let session_max_age_hours = number("SESSION_MAX_AGE_HOURS", 24);

        // Microsoft sign-in
        let microsoft_client_id =
            var("MICROSOFT_CLIENT_ID").context("MICROSOFT_CLIENT_ID must be set")?;
        let microsoft_tenant = or("MICROSOFT_TENANT", DEFAULT_TENANT);
        let microsoft_domain_hint = or("MICROSOFT_DOMAIN_HINT", DEFAULT_DOMAIN_HINT);
        let microsoft_scopes = list("MICROSOFT_SCOPES", &DEFAULT_SCOPES.join(" "), ' ');

        Ok(Settings {
            env,
            server_addr,
            public_url,
            console_url,
            cors_allow_origins,
            firebase_project_id,
            firebase_api_key,
            events_collection,
            firestore_url,
            storage_url,
            identity_toolkit_url,
            secure_token_url,
            functions_url,
            jwks_url,
            jwks_cache_ttl_seconds,
            http_timeout_seconds,
            session_idle_minutes,
            session_max_age_hours,
            microsoft_client_id,
            microsoft_tenant,
            microsoft_domain_hint,
            microsoft_scopes,
        })
    }

    /// Redirect URI registered with Microsoft for the sign-in callback
    pub fn sign_in_redirect_uri(&self) -> String {
        format!("{}/auth/microsoft/callback", self.public_url)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::Settings;
    use std::collections::HashMap;

    pub fn settings() -> Settings {
        let vars: HashMap<&str, &str> = [
            ("FIREBASE_PROJECT_ID", "db-app"),
            ("FIREBASE_API_KEY", "api-key"),
            ("MICROSOFT_CLIENT_ID", "client-1"),
            ("FIRESTORE_URL", "http://127.0.0.1:9/v1"),
            ("STORAGE_URL", "http://127.0.0.1:9"),
            ("IDENTITY_TOOLKIT_URL", "http://127.0.0.1:9/v1"),
            ("SECURE_TOKEN_URL", "http://127.0.0.1:9/v1"),
            ("FUNCTIONS_URL", "http://127.0.0.1:9"),
            ("JWKS_URL", "http://127.0.0.1:9/jwks"),
        ]
        .into_iter()
        .collect();

        Settings::from_lookup(|key| vars.get(key).map(|v| v.to_string()))
            .expect("test settings are complete")
    }
}
