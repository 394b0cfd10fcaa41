//! # portfolio-export
//!
//! Export a portfolio (an About page plus a list of posts written in
//! Markdown or HTML) to one paginated, script-free PDF.
//!
//! ## Why this crate?
//!
//! Post bodies come from an editor that accepts both Markdown and raw HTML,
//! reference images on several hosts, and were never meant for print. This
//! crate turns them into something a renderer can paginate safely: every
//! body goes through an allow-list sanitiser, small images are inlined so
//! the renderer needs no network access, and every section starts on its own
//! page.
//!
//! ## Pipeline Overview
//!
//! ```text
//! Board API
//!  │
//!  ├─ 1. Fetch     About + posts concurrently (About is optional)
//!  ├─ 2. Classify  Markdown or markup, per body
//!  ├─ 3. Sanitize  pulldown-cmark, then an html5ever allow-list filter
//!  ├─ 4. Images    probe, fetch ≤ 300 KiB, inline as data URIs (never fatal)
//!  ├─ 5. Compose   cover → About → posts (newest first), page breaks
//!  ├─ 6. Paginate  remote renderer, or local raster-and-slice via lopdf
//!  └─ 7. Output    PDF bytes named portfolio_<YYYY-MM-DD>.pdf
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use portfolio_export::{export_to_dir, ExportConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ExportConfig::builder()
//!         .base_url("https://portfolio.example.com")
//!         .author("Jane Doe")
//!         .build()?;
//!     let (path, result) = export_to_dir("exports", &config).await?;
//!     println!("wrote {}", path.display());
//!     if !result.failed_images.is_empty() {
//!         eprintln!("{} image(s) left as external links", result.failed_images.len());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Choosing a Pagination Strategy
//!
//! | Strategy | Type | Needs |
//! |----------|------|-------|
//! | Remote (default) | [`RemotePaginator`] | an HTTP renderer accepting `{html, failed_images, skipped_images}` |
//! | Local | [`LocalPaginator`] | a [`Rasterizer`] implementation for your environment |
//!
//! Plug either into [`Exporter::new`] together with a [`ContentSource`] and
//! an [`ImageFetcher`].

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod document;
pub mod error;
pub mod export;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod source;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    ExportConfig, ExportConfigBuilder, MarkdownOptions, NormalizeOptions, PageGeometry, SanitizePolicy,
};
pub use document::Document;
pub use error::{ExportError, ImageError, GENERIC_FAILURE_MESSAGE};
pub use export::{export, export_sync, export_to_dir, file_name_for, Exporter};
pub use output::{ExportResult, ImageRef, ImageReport, ImageStatus};
pub use pipeline::classify::{classify, ContentKind};
pub use pipeline::compose::{ComposedDocument, Composer, CoverInfo, PreparedDocument, Section, SectionKind};
pub use pipeline::images::{FetchedImage, HttpImageFetcher, ImageFetcher, ImageResolver, ResolvedImages};
pub use pipeline::paginate::{plan_slices, LocalPaginator, PageSlice, RasterError, Rasterizer};
pub use pipeline::pdf::{LopdfPageWriter, PageWriter};
pub use pipeline::render::{Paginator, RemotePaginator};
pub use pipeline::sanitize::{normalize, SanitizedBlock};
pub use progress::{ExportProgressCallback, NoopProgressCallback, ProgressCallback};
pub use source::{ContentSource, HttpContentSource};
