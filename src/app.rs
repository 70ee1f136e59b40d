use anyhow::{Context, Result};
use axum::{body::Body, http::HeaderValue, Router};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::{AllowHeaders, AllowMethods, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::auth::{JwksCache, MicrosoftSignIn, SessionLimits, SessionStore};
use crate::config::Settings;
use crate::middleware::{make_request_span, request_id_layer};
use crate::routes;
use crate::services::{FirestoreClient, FunctionsClient, IdentityClient, StorageClient};

/// Request bodies are small JSON edits and OAuth form posts
const MAX_BODY_BYTES: usize = 64 * 1024;

/// Shared application state
pub struct AppState {
    pub settings: Settings,
    pub jwks: JwksCache,
    pub identity: IdentityClient,
    pub firestore: FirestoreClient,
    pub storage: StorageClient,
    pub functions: FunctionsClient,
    pub sign_in: MicrosoftSignIn,
    pub sessions: SessionStore,
}

impl AppState {
    /// Build every upstream client around one shared HTTP client
    pub fn from_settings(settings: Settings) -> Result<Arc<Self>> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.http_timeout_seconds))
            .build()
            .context("Failed to create HTTP client")?;

        let jwks = JwksCache::new(
            http_client.clone(),
            settings.jwks_url.clone(),
            &settings.firebase_project_id,
            settings.jwks_cache_ttl_seconds,
        );
        let identity = IdentityClient::new(
            http_client.clone(),
            &settings.identity_toolkit_url,
            &settings.secure_token_url,
            &settings.firebase_api_key,
        );
        let firestore = FirestoreClient::new(
            http_client.clone(),
            &settings.firestore_url,
            &settings.firebase_project_id,
        );
        let storage = StorageClient::new(http_client.clone(), &settings.storage_url);
        let functions = FunctionsClient::new(http_client, &settings.functions_url);
        let sign_in = MicrosoftSignIn::from_settings(&settings);
        let sessions = SessionStore::new(SessionLimits {
            idle: chrono::Duration::minutes(settings.session_idle_minutes as i64),
            max_age: chrono::Duration::hours(settings.session_max_age_hours as i64),
        });

        Ok(Arc::new(Self {
            settings,
            jwks,
            identity,
            firestore,
            storage,
            functions,
            sign_in,
            sessions,
        }))
    }
}

/// Build the complete application with all middleware
pub fn create_app(state: Arc<AppState>) -> Router {
    let cors = build_cors_layer(&state.settings);

    // DEBUG spans keep per-request overhead off the INFO level
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(make_request_span::<Body>)
        .on_request(DefaultOnRequest::new().level(Level::DEBUG))
        .on_response(DefaultOnResponse::new().level(Level::DEBUG));

    let (set_request_id, propagate_request_id) = request_id_layer();

    Router::new()
        .merge(routes::api_router())
        // Middleware stack (applied bottom-up)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(propagate_request_id)
        .layer(trace_layer)
        .layer(set_request_id)
        .layer(cors)
        .with_state(state)
}

fn build_cors_layer(settings: &Settings) -> CorsLayer {
    let origins: Vec<HeaderValue> = settings
        .cors_allow_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    let max_age = if settings.env.is_dev() {
        Duration::from_secs(86400)
    } else {
        Duration::from_secs(3600)
    };

    // Credentials are allowed so the session cookie travels with console requests
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(AllowMethods::list([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::PATCH,
            axum::http::Method::OPTIONS,
        ]))
        .allow_headers(AllowHeaders::list([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::ACCEPT,
            axum::http::HeaderName::from_static("x-request-id"),
        ]))
        .allow_credentials(true)
        .max_age(max_age)
}
