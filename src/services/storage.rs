//! Cloud Storage for Firebase: turns `gs://` locators into download URLs

use reqwest::Client;
use serde::Deserialize;
use tracing::instrument;
use url::Url;

use crate::domain::images::{ImageError, ImageResolver, STORAGE_URI_PREFIX};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectMetadata {
    /// Comma-separated list of download tokens
    #[serde(default)]
    download_tokens: Option<String>,
}

#[derive(Clone)]
pub struct StorageClient {
    client: Client,
    base_url: String,
}

/// Split `gs://bucket/path/to/object` into bucket and object path
pub fn split_storage_uri(uri: &str) -> Option<(&str, &str)> {
    let (bucket, path) = uri.strip_prefix(STORAGE_URI_PREFIX)?.split_once('/')?;
    (!bucket.is_empty() && !path.is_empty()).then_some((bucket, path))
}

/// `<base>/v0/b/<bucket>/o/<percent-encoded path>`
pub fn object_url(base_url: &str, bucket: &str, path: &str) -> Result<Url, url::ParseError> {
    let mut url = Url::parse(base_url)?;
    url.path_segments_mut()
        .map_err(|_| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
        .pop_if_empty()
        .extend(["v0", "b", bucket, "o"])
        .push(path);
    Ok(url)
}

impl StorageClient {
    pub fn new(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Resolver that reads object metadata as the signed-in user
    pub fn authorized<'a>(&'a self, id_token: &'a str) -> AuthorizedStorage<'a> {
        AuthorizedStorage {
            storage: self,
            id_token,
        }
    }

    #[instrument(skip(self, id_token))]
    async fn download_url(&self, storage_uri: &str, id_token: &str) -> Result<String, ImageError> {
        let fail = |reason: String| ImageError::Resolve {
            uri: storage_uri.to_string(),
            reason,
        };

        let (bucket, path) = split_storage_uri(storage_uri)
            .ok_or_else(|| ImageError::UnsupportedUri(storage_uri.to_string()))?;

        let url = object_url(&self.base_url, bucket, path).map_err(|e| fail(e.to_string()))?;

        let response = self
            .client
            .get(url.clone())
            .header("Authorization", format!("Firebase {id_token}"))
            .send()
            .await
            .map_err(|e| fail(e.to_string()))?;

        if !response.status().is_success() {
            return Err(fail(format!("metadata request returned {}", response.status())));
        }

        let metadata: ObjectMetadata = response.json().await.map_err(|e| fail(e.to_string()))?;

        let token = metadata
            .download_tokens
            .as_deref()
            .and_then(|tokens| tokens.split(',').find(|t| !t.is_empty()))
            .ok_or_else(|| fail("object has no download token".to_string()))?;

        let mut download = url;
        download
            .query_pairs_mut()
            .append_pair("alt", "media")
            .append_pair("token", token);

        Ok(download.into())
    }
}

pub struct AuthorizedStorage<'a> {
    storage: &'a StorageClient,
    id_token: &'a str,
}

impl ImageResolver for AuthorizedStorage<'_> {
    async fn resolve(&self, storage_uri: &str) -> Result<String, ImageError> {
        self.storage.download_url(storage_uri, self.id_token).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_bucket_and_path() {
        assert_eq!(
            split_storage_uri("gs://db-app.appspot.com/events/poster.png"),
            Some(("db-app.appspot.com", "events/poster.png"))
        );
        assert_eq!(split_storage_uri("gs://db-app.appspot.com/"), None);
        assert_eq!(split_storage_uri("gs://bucket-only"), None);
        assert_eq!(split_storage_uri("https://x/y"), None);
    }

    #[test]
    fn object_path_is_a_single_encoded_segment() {
        let url = object_url(
            "https://firebasestorage.googleapis.com",
            "db-app.appspot.com",
            "events/poster 1.png",
        )
        .unwrap();

        assert_eq!(
            url.as_str(),
            "https://firebasestorage.googleapis.com/v0/b/db-app.appspot.com/o/events%2Fposter%201.png"
        );
    }

    #[tokio::test]
    async fn non_storage_uris_are_unsupported() {
        let storage = StorageClient::new(Client::new(), "http://127.0.0.1:9");

        let result = storage.authorized("token").resolve("gs://nobucketpath").await;

        assert_eq!(
            result,
            Err(ImageError::UnsupportedUri("gs://nobucketpath".into()))
        );
    }
}
