//! Cursor paging for list endpoints
//!
//! Firestore pages with opaque tokens rather than offsets, so list endpoints hand the
//! token back to the console and take it again on the next request.

use axum::{
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

/// Paging query parameters
#[derive(Debug, Clone, Deserialize, Default)]
pub struct PageParams {
    /// Items per page
    pub page_size: Option<u32>,

    /// Token returned as `next_page_token` by the previous page
    pub page_token: Option<String>,
}

impl PageParams {
    pub const DEFAULT_PAGE_SIZE: u32 = 20;
    pub const MAX_PAGE_SIZE: u32 = 100;

    /// Returns the clamped page size
    pub fn page_size(&self) -> u32 {
        self.page_size
            .unwrap_or(Self::DEFAULT_PAGE_SIZE)
            .clamp(1, Self::MAX_PAGE_SIZE)
    }

    pub fn page_token(&self) -> Option<&str> {
        self.page_token.as_deref().filter(|t| !t.is_empty())
    }
}

/// One page of results
///
/// `skipped` lists the ids of stored documents that failed validation and were left out.
#[derive(Debug, Serialize)]
pub struct Page<T: Serialize> {
    pub data: Vec<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<String>,
}

impl<T: Serialize> IntoResponse for Page<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_size_is_clamped() {
        let params = |page_size| PageParams {
            page_size,
            page_token: None,
        };

        assert_eq!(params(None).page_size(), 20);
        assert_eq!(params(Some(0)).page_size(), 1);
        assert_eq!(params(Some(500)).page_size(), 100);
        assert_eq!(params(Some(42)).page_size(), 42);
    }

    #[test]
    fn empty_token_means_first_page() {
        let params = PageParams {
            page_size: None,
            page_token: Some(String::new()),
        };

        assert_eq!(params.page_token(), None);
    }
}
