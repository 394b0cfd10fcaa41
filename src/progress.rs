//! Progress-callback trait for export events.
//!
//! Inject an [`Arc<dyn ExportProgressCallback>`] via
//! [`crate::config::ExportConfigBuilder::progress_callback`] to receive
//! events as the pipeline fetches content, resolves images and renders.
//!
//! # Example
//!
//! ```rust
//! use portfolio_export::{ExportConfig, ExportProgressCallback, ImageStatus};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     images: AtomicUsize,
//! }
//!
//! impl ExportProgressCallback for CountingCallback {
//!     fn on_image_resolved(&self, _url: &str, _status: &ImageStatus) {
//!         self.images.fetch_add(1, Ordering::SeqCst);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { images: AtomicUsize::new(0) });
//!
//! let config = ExportConfig::builder()
//!     .progress_callback(counter as Arc<dyn ExportProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::output::ImageStatus;
use std::sync::Arc;

/// Called by the export pipeline as it progresses.
///
/// Implementations must be `Send + Sync`: images are resolved concurrently,
/// so `on_image_resolved` may be called from several tasks in any order.
/// All methods have default no-op implementations.
pub trait ExportProgressCallback: Send + Sync {
    /// Called once before any content is fetched.
    fn on_export_start(&self) {}

    /// Called once both content requests have settled.
    ///
    /// # Arguments
    /// * `has_about` — whether an About document will be included
    /// * `posts`     — number of posts fetched
    fn on_content_fetched(&self, has_about: bool, posts: usize) {
        let _ = (has_about, posts);
    }

    /// Called when one image reaches its final status.
    fn on_image_resolved(&self, url: &str, status: &ImageStatus) {
        let _ = (url, status);
    }

    /// Called right before the composed document is paginated.
    fn on_render_start(&self, sections: usize) {
        let _ = sections;
    }

    /// Called once the artifact exists.
    ///
    /// # Arguments
    /// * `bytes`   — size of the produced PDF
    /// * `failed`  — images whose inlining failed
    /// * `skipped` — images left external because of their size
    fn on_export_complete(&self, bytes: usize, failed: usize, skipped: usize) {
        let _ = (bytes, failed, skipped);
    }
}

/// A no-op implementation; the default when no callback is configured.
pub struct NoopProgressCallback;

impl ExportProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ExportConfig`].
pub type ProgressCallback = Arc<dyn ExportProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        images: AtomicUsize,
        skipped_images: AtomicUsize,
        sections: AtomicUsize,
        completed_bytes: AtomicUsize,
    }

    impl ExportProgressCallback for TrackingCallback {
        fn on_image_resolved(&self, _url: &str, status: &ImageStatus) {
            self.images.fetch_add(1, Ordering::SeqCst);
            if matches!(status, ImageStatus::Skipped(_)) {
                self.skipped_images.fetch_add(1, Ordering::SeqCst);
            }
        }

        fn on_render_start(&self, sections: usize) {
            self.sections.store(sections, Ordering::SeqCst);
        }

        fn on_export_complete(&self, bytes: usize, _failed: usize, _skipped: usize) {
            self.completed_bytes.store(bytes, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_export_start();
        cb.on_content_fetched(true, 3);
        cb.on_image_resolved("https://x/a.png", &ImageStatus::Inlined);
        cb.on_render_start(5);
        cb.on_export_complete(1024, 0, 1);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        tracker.on_image_resolved("a", &ImageStatus::Inlined);
        tracker.on_image_resolved("b", &ImageStatus::Skipped("too large".into()));
        tracker.on_render_start(4);
        tracker.on_export_complete(2048, 0, 1);

        assert_eq!(tracker.images.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.skipped_images.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.sections.load(Ordering::SeqCst), 4);
        assert_eq!(tracker.completed_bytes.load(Ordering::SeqCst), 2048);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: Arc<dyn ExportProgressCallback> = Arc::new(NoopProgressCallback);
        cb.on_export_start();
        cb.on_render_start(1);
    }
}
