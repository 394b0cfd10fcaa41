//! Content collaborator: where the About page and the posts come from.

use crate::config::ExportConfig;
use crate::document::Document;
use crate::error::ExportError;
use serde::Deserialize;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Supplies the documents of one export.
pub trait ContentSource: Send + Sync {
    /// The About document. `Ok(None)` when it does not exist.
    fn fetch_about(&self) -> impl Future<Output = Result<Option<Document>, ExportError>> + Send;

    /// Every post, in the order the backend returns them.
    fn fetch_posts(&self) -> impl Future<Output = Result<Vec<Document>, ExportError>> + Send;
}

/// Reads the board API of the portfolio backend.
///
/// * About: `GET {base}/api/v1/board/slug/{slug}` (404 → `None`)
/// * Posts: `GET {base}/api/v1/board/`
#[derive(Debug, Clone)]
pub struct HttpContentSource {
    client: reqwest::Client,
    base_url: String,
    about_slug: String,
}

/// The list endpoint returns either a bare array or `{ "items": [...] }`.
#[derive(Deserialize)]
#[serde(untagged)]
enum PostList {
    Bare(Vec<Document>),
    Wrapped { items: Vec<Document> },
}

impl HttpContentSource {
    pub fn new(config: &ExportConfig) -> Result<Self, ExportError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ExportError::Internal(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            about_slug: config.about_slug.clone(),
        })
    }

    fn about_url(&self) -> String {
        format!("{}/api/v1/board/slug/{}", self.base_url, self.about_slug)
    }

    fn posts_url(&self) -> String {
        format!("{}/api/v1/board/", self.base_url)
    }
}

impl ContentSource for HttpContentSource {
    async fn fetch_about(&self) -> Result<Option<Document>, ExportError> {
        let url = self.about_url();
        let unavailable = |reason: String| ExportError::ContentUnavailable {
            reason: format!("About ({}): {}", url, reason),
        };

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| unavailable(e.to_string()))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            debug!("No About document at {}", url);
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(unavailable(format!("HTTP {}", response.status())));
        }
        let doc = response
            .json::<Document>()
            .await
            .map_err(|e| unavailable(e.to_string()))?;
        Ok(Some(doc))
    }

    async fn fetch_posts(&self) -> Result<Vec<Document>, ExportError> {
        let url = self.posts_url();
        let unavailable = |reason: String| ExportError::ContentUnavailable {
            reason: format!("posts ({}): {}", url, reason),
        };

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| unavailable(e.to_string()))?;
        if !response.status().is_success() {
            return Err(unavailable(format!("HTTP {}", response.status())));
        }
        let list = response
            .json::<PostList>()
            .await
            .map_err(|e| unavailable(e.to_string()))?;
        let posts = match list {
            PostList::Bare(posts) | PostList::Wrapped { items: posts } => posts,
        };
        debug!("Fetched {} post(s)", posts.len());
        Ok(posts)
    }
}
