//! Clients for the Firebase services behind the console.
//!
//! Identity (sign-in and token refresh), Firestore documents, Storage download URLs and
//! callable Cloud Functions, all over their REST APIs.

pub mod firestore;
pub mod functions;
pub mod identity;
pub mod storage;

pub use firestore::FirestoreClient;
pub use functions::FunctionsClient;
pub use identity::{FirebaseUser, IdentityClient, IdentityError};
pub use storage::StorageClient;

use reqwest::StatusCode;
use serde::{de::DeserializeOwned, Deserialize};

use crate::error::ApiError;

/// Error envelope shared by Google REST APIs
#[derive(Debug, Deserialize)]
pub(crate) struct GoogleErrorBody {
    pub error: GoogleError,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GoogleError {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    #[allow(dead_code)]
    pub status: Option<String>,
}

/// Decode a successful response, or map the upstream failure onto an API error.
pub(crate) async fn read_upstream<T: DeserializeOwned>(
    response: reqwest::Response,
    service: &'static str,
) -> Result<T, ApiError> {
    let status = response.status();

    if status.is_success() {
        return response.json::<T>().await.map_err(|e| {
            tracing::error!(error = %e, service, "Failed to parse upstream response");
            ApiError::BadGateway(format!("Invalid {service} response"))
        });
    }

    let message = response
        .json::<GoogleErrorBody>()
        .await
        .ok()
        .map(|body| body.error.message)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| format!("{service} error: {status}"));

    match status {
        StatusCode::BAD_REQUEST => Err(ApiError::BadRequest(message)),
        StatusCode::UNAUTHORIZED => Err(ApiError::Unauthorized(message)),
        StatusCode::FORBIDDEN => Err(ApiError::Forbidden(message)),
        StatusCode::NOT_FOUND => Err(ApiError::NotFound(message)),
        _ => {
            tracing::error!(status = %status, message = %message, service, "Upstream error");
            Err(ApiError::BadGateway(format!("{service} unavailable")))
        }
    }
}

pub(crate) fn transport_error(service: &'static str, e: reqwest::Error) -> ApiError {
    tracing::error!(error = %e, service, "Upstream request failed");
    ApiError::BadGateway(format!("{service} unavailable"))
}
