//! Error types for the portfolio-export library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`ExportError`] — **Fatal**: the export cannot produce an artifact
//!   (post list unavailable, renderer unreachable, rasterisation failed).
//!   Returned as `Err(ExportError)` from the `export*` entry points.
//!
//! * [`ImageError`] — **Non-fatal**: a single embedded image could not be
//!   inlined. Recorded in [`crate::output::ImageReport`] and the export
//!   carries on with the original image reference left in place.

use std::path::PathBuf;
use thiserror::Error;

/// Message shown to end users when an export fails, whatever the cause.
pub const GENERIC_FAILURE_MESSAGE: &str = "The PDF export could not be generated. Please try again later.";

/// All fatal errors returned by the export pipeline.
///
/// `Display` keeps the technical detail for logs; use
/// [`ExportError::user_message`] for anything shown in a UI.
#[derive(Debug, Error)]
pub enum ExportError {
    // ── Content errors ────────────────────────────────────────────────────
    /// The post collection could not be fetched or decoded.
    #[error("Post collection unavailable: {reason}")]
    ContentUnavailable { reason: String },

    // ── Rendering errors ──────────────────────────────────────────────────
    /// The remote renderer answered with an error or a non-PDF body.
    #[error("Rendering failed: {reason}")]
    RenderFailed { reason: String },

    /// The remote renderer did not answer in time.
    #[error("Renderer timed out after {secs}s")]
    RenderTimeout { secs: u64 },

    /// The composed document exceeds what the renderer accepts.
    #[error("Composed document is {size} bytes, renderer limit is {limit} bytes")]
    PayloadTooLarge { size: usize, limit: usize },

    /// A section could not be rasterised by the local strategy.
    #[error("Rasterisation failed for section {section}: {detail}")]
    RasterisationFailed { section: usize, detail: String },

    // ── Delivery errors ───────────────────────────────────────────────────
    /// Could not write the exported file.
    #[error("Failed to write export file '{path}': {source}")]
    DeliveryFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ExportError {
    /// A generic, non-leaking description suitable for end users.
    pub fn user_message(&self) -> &'static str {
        GENERIC_FAILURE_MESSAGE
    }
}

/// A non-fatal error for a single image.
///
/// `TooLarge` means the image was deliberately not inlined; every other
/// variant means the attempt failed.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum ImageError {
    /// The server answered with a non-success status.
    #[error("{url}: HTTP {status}")]
    Status { url: String, status: u16 },

    /// Connection, TLS or body read failure.
    #[error("{url}: {detail}")]
    Transport { url: String, detail: String },

    /// The image is larger than the admission threshold.
    #[error("{url}: {size} bytes exceeds the inline limit")]
    TooLarge { url: String, size: u64 },

    /// Probe and download did not finish within the per-image timeout.
    #[error("{url}: timed out after {secs}s")]
    Timeout { url: String, secs: u64 },
}

impl ImageError {
    /// True when the image was refused for its size rather than failing.
    pub fn is_oversize(&self) -> bool {
        matches!(self, ImageError::TooLarge { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_message_does_not_leak_detail() {
        let e = ExportError::RenderFailed {
            reason: "connection refused to 10.0.0.3:8000".into(),
        };
        assert!(e.to_string().contains("10.0.0.3"));
        assert!(!e.user_message().contains("10.0.0.3"));
        assert_eq!(e.user_message(), GENERIC_FAILURE_MESSAGE);
    }

    #[test]
    fn payload_too_large_display() {
        let e = ExportError::PayloadTooLarge {
            size: 6_000_000,
            limit: 5_242_880,
        };
        let msg = e.to_string();
        assert!(msg.contains("6000000"), "got: {msg}");
        assert!(msg.contains("5242880"), "got: {msg}");
    }

    #[test]
    fn image_timeout_display() {
        let e = ImageError::Timeout {
            url: "https://cdn.example.com/a.png".into(),
            secs: 10,
        };
        assert!(e.to_string().contains("10s"));
        assert!(!e.is_oversize());
    }

    #[test]
    fn too_large_is_oversize() {
        let e = ImageError::TooLarge {
            url: "https://cdn.example.com/big.png".into(),
            size: 400_000,
        };
        assert!(e.is_oversize());
    }
}
