//! Image descriptors stored on documents and their downloadable form

use serde::Serialize;
use std::future::Future;
use thiserror::Error;

use super::value::{present, FirestoreValue};

/// Prefix of Cloud Storage locators (`gs://bucket/path`)
pub const STORAGE_URI_PREFIX: &str = "gs://";

/// Image descriptor as stored in Firestore
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FirestoreImage {
    pub uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alt: Option<String>,
    /// Caption some documents carry instead of `alt`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
}

/// Image descriptor with a URL a browser can fetch
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DownloadableImage {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ImageError {
    #[error("unsupported image uri: {0}")]
    UnsupportedUri(String),

    #[error("failed to resolve {uri}: {reason}")]
    Resolve { uri: String, reason: String },
}

/// Turns a storage locator into a download URL
pub trait ImageResolver: Sync {
    fn resolve(&self, storage_uri: &str) -> impl Future<Output = Result<String, ImageError>> + Send;
}

impl FirestoreImage {
    /// Read an image descriptor out of a stored map value.
    ///
    /// `uri` must be a string; `alt` and `title` strings when present; `width` and `height`
    /// non-negative numbers when present.
    pub fn from_value(value: &FirestoreValue) -> Option<Self> {
        let fields = value.as_map()?;

        let uri = present(fields, "uri")?.as_str()?.to_string();

        let text = |key: &str| -> Result<Option<String>, ()> {
            match present(fields, key) {
                None => Ok(None),
                Some(v) => v.as_str().map(|s| Some(s.to_string())).ok_or(()),
            }
        };

        let dimension = |key: &str| -> Result<Option<f64>, ()> {
            match present(fields, key) {
                None => Ok(None),
                Some(v) => match v.as_f64() {
                    Some(n) if n.is_finite() && n >= 0.0 => Ok(Some(n)),
                    _ => Err(()),
                },
            }
        };

        Some(Self {
            uri,
            alt: text("alt").ok()?,
            title: text("title").ok()?,
            width: dimension("width").ok()?,
            height: dimension("height").ok()?,
        })
    }

    pub fn is_storage_uri(&self) -> bool {
        self.uri.starts_with(STORAGE_URI_PREFIX)
    }
}

pub fn is_firestore_image(value: &FirestoreValue) -> bool {
    FirestoreImage::from_value(value).is_some()
}

/// Resolve an image to a downloadable URL.
///
/// Storage locators go through the resolver; http(s) URLs are already downloadable.
pub async fn parse_image<R: ImageResolver>(
    image: &FirestoreImage,
    resolver: &R,
) -> Result<DownloadableImage, ImageError> {
    let url = if image.is_storage_uri() {
        resolver.resolve(&image.uri).await?
    } else if image.uri.starts_with("https://") || image.uri.starts_with("http://") {
        image.uri.clone()
    } else {
        return Err(ImageError::UnsupportedUri(image.uri.clone()));
    };

    Ok(DownloadableImage {
        url,
        alt: image.alt.clone(),
        width: image.width,
        height: image.height,
    })
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::HashMap;

    /// In-memory resolver keyed by storage uri
    #[derive(Default)]
    pub struct FakeStorage {
        pub urls: HashMap<String, String>,
    }

    impl FakeStorage {
        pub fn with(entries: &[(&str, &str)]) -> Self {
            Self {
                urls: entries
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            }
        }
    }

    impl ImageResolver for FakeStorage {
        async fn resolve(&self, storage_uri: &str) -> Result<String, ImageError> {
            tokio::task::yield_now().await;
            self.urls
                .get(storage_uri)
                .cloned()
                .ok_or_else(|| ImageError::Resolve {
                    uri: storage_uri.to_string(),
                    reason: "object not found".to_string(),
                })
        }
    }
}
