//! JWKS cache for Firebase ID token verification

use anyhow::{Context, Result};
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use parking_lot::RwLock;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::AuthClaims;

/// Google's published keys for `securetoken@system.gserviceaccount.com`
pub const FIREBASE_JWKS_URL: &str =
    "https://www.googleapis.com/service_accounts/v1/jwk/securetoken@system.gserviceaccount.com";

#[derive(Debug, Deserialize)]
struct KeySet {
    keys: Vec<Jwk>,
}

#[derive(Debug, Deserialize)]
struct Jwk {
    kid: String,
    kty: String,
    n: String,
    e: String,
}

/// Verifies ID tokens issued by Firebase Auth for one project
#[derive(Clone)]
pub struct JwksCache {
    keys: Arc<RwLock<KeyRing>>,
    client: reqwest::Client,
    jwks_url: String,
    issuer: String,
    audience: String,
    /// Used when the key endpoint sends no `max-age`
    fallback_ttl: Duration,
}

/// Signing keys from the latest fetch, valid until `expires_at`
#[derive(Default)]
struct KeyRing {
    keys: HashMap<String, DecodingKey>,
    fetched_at: Option<Instant>,
    expires_at: Option<Instant>,
}

impl KeyRing {
    fn fresh_key(&self, kid: &str, now: Instant) -> Option<DecodingKey> {
        self.expires_at
            .filter(|expires| now < *expires)
            .and_then(|_| self.keys.get(kid).cloned())
    }

    fn fetched_within(&self, window: Duration, now: Instant) -> bool {
        self.fetched_at
            .map_or(false, |at| now.saturating_duration_since(at) < window)
    }
}

/// `max-age` from a `Cache-Control` header value
fn max_age(cache_control: &str) -> Option<Duration> {
    cache_control
        .split(',')
        .filter_map(|directive| directive.trim().strip_prefix("max-age="))
        .find_map(|secs| secs.parse().ok())
        .map(Duration::from_secs)
}

impl JwksCache {
    /// Issuer is `https://securetoken.google.com/<project>`, audience is the project id.
    pub fn new(client: reqwest::Client, jwks_url: String, project_id: &str, ttl_seconds: u64) -> Self {
        Self {
            keys: Arc::new(RwLock::new(KeyRing::default())),
            client,
            jwks_url,
            issuer: format!("https://securetoken.google.com/{project_id}"),
            audience: project_id.to_string(),
            fallback_ttl: Duration::from_secs(ttl_seconds),
        }
    }

    /// Verify an ID token and return all of its claims
    pub async fn verify_token(&self, token: &str) -> Result<AuthClaims> {
        let header = decode_header(token).context("Invalid JWT header")?;
        let kid = header.kid.context("JWT missing kid header")?;

        let key = self.signing_key(&kid).await?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);
        validation.set_required_spec_claims(&["exp", "iat", "sub", "aud", "iss"]);

        let claims = decode::<AuthClaims>(token, &key, &validation)
            .context("JWT validation failed")?
            .claims;

        // Firebase requires a non-empty subject (the uid)
        if claims.subject().map_or(true, str::is_empty) {
            anyhow::bail!("JWT has an empty subject");
        }

        Ok(claims)
    }

    async fn signing_key(&self, kid: &str) -> Result<DecodingKey> {
        let cached = self.keys.read().fresh_key(kid, Instant::now());
        if let Some(key) = cached {
            return Ok(key);
        }

        // An unknown kid usually means Google rotated keys since the last fetch
        self.fetch_keys().await?;

        self.keys
            .read()
            .keys
            .get(kid)
            .cloned()
            .with_context(|| format!("No signing key with kid {kid}"))
    }

    async fn fetch_keys(&self) -> Result<()> {
        if self.keys.read().fetched_within(Duration::from_secs(1), Instant::now()) {
            return Ok(());
        }

        tracing::debug!(url = %self.jwks_url, "Fetching signing keys");

        let response = self
            .client
            .get(&self.jwks_url)
            .send()
            .await
            .context("Failed to fetch JWKS")?
            .error_for_status()
            .context("JWKS endpoint returned an error")?;

        let ttl = response
            .headers()
            .get(reqwest::header::CACHE_CONTROL)
            .and_then(|value| value.to_str().ok())
            .and_then(max_age)
            .unwrap_or(self.fallback_ttl);

        let key_set: KeySet = response.json().await.context("Failed to parse JWKS")?;

        let keys: HashMap<String, DecodingKey> = key_set
            .keys
            .into_iter()
            .filter(|jwk| jwk.kty == "RSA")
            .filter_map(|jwk| match DecodingKey::from_rsa_components(&jwk.n, &jwk.e) {
                Ok(key) => Some((jwk.kid, key)),
                Err(e) => {
                    tracing::warn!(kid = %jwk.kid, error = %e, "Skipping unusable JWK");
                    None
                }
            })
            .collect();

        let now = Instant::now();
        let mut ring = self.keys.write();
        *ring = KeyRing {
            keys,
            fetched_at: Some(now),
            expires_at: Some(now + ttl),
        };

        tracing::info!(keys = ring.keys.len(), ttl_secs = ttl.as_secs(), "Signing keys refreshed");
        Ok(())
    }

    /// Fetch keys ahead of the first sign-in
    pub async fn warm_cache(&self) -> Result<()> {
        self.fetch_keys().await
    }

    pub fn key_count(&self) -> usize {
        self.keys.read().keys.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache() -> JwksCache {
        JwksCache::new(
            reqwest::Client::new(),
            "http://127.0.0.1:9/jwks".to_string(),
            "db-app",
            60,
        )
    }

    #[test]
    fn derives_issuer_and_audience_from_project() {
        let cache = cache();

        assert_eq!(cache.issuer, "https://securetoken.google.com/db-app");
        assert_eq!(cache.audience, "db-app");
        assert_eq!(cache.key_count(), 0);
    }

    #[test]
    fn reads_max_age_from_cache_control() {
        assert_eq!(
            max_age("public, max-age=19845, must-revalidate, no-transform"),
            Some(Duration::from_secs(19845))
        );
        assert_eq!(max_age("no-cache"), None);
        assert_eq!(max_age("max-age=soon"), None);
    }

    #[test]
    fn expired_ring_yields_no_key() {
        let now = Instant::now();
        let ring = KeyRing {
            keys: HashMap::from([("k1".to_string(), DecodingKey::from_secret(b"s"))]),
            fetched_at: Some(now),
            expires_at: Some(now),
        };

        assert!(ring.fresh_key("k1", now).is_none());
        assert!(ring.fresh_key("k1", now - Duration::from_millis(1)).is_some());
        assert!(ring.fresh_key("k2", now - Duration::from_millis(1)).is_none());
        assert!(ring.fetched_within(Duration::from_secs(1), now));
    }

    #[tokio::test]
    async fn rejects_malformed_tokens_without_fetching() {
        let err = cache().verify_token("not-a-jwt").await.unwrap_err();

        assert!(err.to_string().contains("Invalid JWT header"));
    }
}
