//! Result types returned by the export pipeline.

use serde::{Deserialize, Serialize};

/// Final outcome of one image reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageStatus {
    /// The `src` now carries the image bytes as a data URI.
    Inlined,
    /// Left as an external reference because of its size.
    Skipped(String),
    /// Left as an external reference because probing or downloading failed.
    Failed(String),
}

/// One `img` element seen during resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    /// The `src` as written in the markup.
    pub original_src: String,
    /// The absolute URL the resolver requested.
    pub resolved_url: String,
    pub status: ImageStatus,
}

/// Aggregated image outcomes for a whole export.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageReport {
    pub images: Vec<ImageRef>,
}

impl ImageReport {
    /// Resolved URLs of images whose inlining failed.
    pub fn failed(&self) -> Vec<String> {
        self.images
            .iter()
            .filter(|r| matches!(r.status, ImageStatus::Failed(_)))
            .map(|r| r.resolved_url.clone())
            .collect()
    }

    /// Resolved URLs of images left external because of their size.
    pub fn skipped(&self) -> Vec<String> {
        self.images
            .iter()
            .filter(|r| matches!(r.status, ImageStatus::Skipped(_)))
            .map(|r| r.resolved_url.clone())
            .collect()
    }

    pub fn inlined_count(&self) -> usize {
        self.images
            .iter()
            .filter(|r| r.status == ImageStatus::Inlined)
            .count()
    }
}

/// The exported artifact. Ownership passes to the caller for delivery.
#[derive(Debug, Clone)]
pub struct ExportResult {
    /// PDF bytes.
    pub bytes: Vec<u8>,
    /// Deterministic download name, `portfolio_<YYYY-MM-DD>.pdf`.
    pub file_name: String,
    /// Resolved URLs of images that could not be inlined.
    pub failed_images: Vec<String>,
    /// Resolved URLs of images over the admission threshold.
    pub skipped_images: Vec<String>,
}
