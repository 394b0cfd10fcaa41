//! Export entry points.
//!
//! [`Exporter`] wires the collaborators together and runs the stages in
//! order: fetch → normalise → resolve images → compose → paginate. Only a
//! failed post fetch or a failed pagination aborts the run; image problems
//! and a missing About page are absorbed and logged.
//!
//! The free functions [`export`], [`export_to_dir`] and [`export_sync`] use
//! the HTTP collaborators and the remote renderer.

use crate::config::ExportConfig;
use crate::error::ExportError;
use crate::output::ExportResult;
use crate::pipeline::compose::{Composer, PreparedDocument};
use crate::pipeline::images::{HttpImageFetcher, ImageFetcher, ImageResolver};
use crate::pipeline::render::{Paginator, RemotePaginator};
use crate::pipeline::sanitize::{normalize, SanitizedBlock};
use crate::progress::{NoopProgressCallback, ProgressCallback};
use crate::source::{ContentSource, HttpContentSource};
use chrono::NaiveDate;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// `portfolio_<YYYY-MM-DD>.pdf`
pub fn file_name_for(date: NaiveDate) -> String {
    format!("portfolio_{}.pdf", date.format("%Y-%m-%d"))
}

/// Orchestrates one export over pluggable collaborators.
pub struct Exporter<S, F, P> {
    source: S,
    resolver: ImageResolver<F>,
    paginator: P,
    config: ExportConfig,
}

impl Exporter<HttpContentSource, HttpImageFetcher, RemotePaginator> {
    /// Board API for content, reqwest for images, remote renderer for the PDF.
    pub fn http(config: ExportConfig) -> Result<Self, ExportError> {
        let source = HttpContentSource::new(&config)?;
        let fetcher = HttpImageFetcher::new(config.image_timeout_secs)?;
        let paginator = RemotePaginator::new(&config)?;
        Self::new(source, fetcher, paginator, config)
    }
}

impl<S, F, P> Exporter<S, F, P>
where
    S: ContentSource,
    F: ImageFetcher,
    P: Paginator,
{
    pub fn new(source: S, fetcher: F, paginator: P, config: ExportConfig) -> Result<Self, ExportError> {
        let resolver = ImageResolver::new(fetcher, &config)?;
        Ok(Self {
            source,
            resolver,
            paginator,
            config,
        })
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn resolver(&self) -> &ImageResolver<F> {
        &self.resolver
    }

    pub fn paginator(&self) -> &P {
        &self.paginator
    }

    fn progress(&self) -> ProgressCallback {
        self.config
            .progress_callback
            .clone()
            .unwrap_or_else(|| Arc::new(NoopProgressCallback))
    }

    /// Run the pipeline and return the PDF.
    ///
    /// # Errors
    /// * [`ExportError::ContentUnavailable`] when the posts cannot be fetched.
    /// * Whatever the paginator returns when rendering fails.
    pub async fn export(&self) -> Result<ExportResult, ExportError> {
        let start = Instant::now();
        let progress = self.progress();
        let date = self.config.export_date();
        info!("Starting portfolio export from {}", self.config.base_url);
        progress.on_export_start();

        // ── Step 1: Fetch About and posts concurrently ───────────────────────
        let (about, posts) = tokio::join!(self.source.fetch_about(), self.source.fetch_posts());
        let about = match about {
            Ok(about) => about.filter(|d| !d.is_blank()),
            Err(e) => {
                warn!("About page unavailable, exporting without it: {}", e);
                None
            }
        };
        let posts = posts.map_err(|e| match e {
            e @ ExportError::ContentUnavailable { .. } => e,
            other => ExportError::ContentUnavailable {
                reason: other.to_string(),
            },
        })?;
        info!("Fetched {} post(s), About page: {}", posts.len(), about.is_some());
        progress.on_content_fetched(about.is_some(), posts.len());

        // ── Step 2: Normalise every body ─────────────────────────────────────
        let options = &self.config.normalize;
        let blocks: Vec<SanitizedBlock> = about
            .iter()
            .chain(posts.iter())
            .map(|d| normalize(&d.content, options))
            .collect();
        debug!("Normalised {} block(s)", blocks.len());

        // ── Step 3: Resolve images across all blocks ─────────────────────────
        let (resolved, report) = self.resolver.resolve_all(blocks).await;
        let mut bodies = resolved.into_iter();
        let about = about.and_then(|document| {
            bodies.next().map(|body| PreparedDocument { document, body })
        });
        let posts: Vec<PreparedDocument> = posts
            .into_iter()
            .zip(bodies)
            .map(|(document, body)| PreparedDocument { document, body })
            .collect();

        // ── Step 4: Compose ──────────────────────────────────────────────────
        let composer = Composer::from_config(&self.config, date);
        let composed = composer.compose(about, posts);

        // ── Step 5: Paginate ─────────────────────────────────────────────────
        progress.on_render_start(composed.sections.len());
        let bytes = self
            .paginator
            .paginate(&composed, &report)
            .await
            .inspect_err(|e| warn!("Export failed while rendering: {}", e))?;

        let result = ExportResult {
            bytes,
            file_name: file_name_for(date),
            failed_images: report.failed(),
            skipped_images: report.skipped(),
        };
        progress.on_export_complete(
            result.bytes.len(),
            result.failed_images.len(),
            result.skipped_images.len(),
        );
        info!(
            "Export complete: {} ({} bytes, {} section(s), {} failed / {} skipped image(s)) in {:?}",
            result.file_name,
            result.bytes.len(),
            composed.sections.len(),
            result.failed_images.len(),
            result.skipped_images.len(),
            start.elapsed()
        );
        Ok(result)
    }

    /// Export and write the PDF into `dir` under its deterministic name.
    ///
    /// The file appears atomically: bytes go to a uniquely named temporary
    /// sibling first, which is then renamed. A failed write leaves nothing
    /// behind.
    pub async fn export_to_dir(&self, dir: impl AsRef<Path>) -> Result<(PathBuf, ExportResult), ExportError> {
        let result = self.export().await?;
        let path = write_atomically(dir.as_ref(), &result).await?;
        info!("Wrote {}", path.display());
        Ok((path, result))
    }

    /// Blocking wrapper around [`Exporter::export`].
    ///
    /// Creates a temporary tokio runtime; do not call from inside one.
    pub fn export_sync(&self) -> Result<ExportResult, ExportError> {
        tokio::runtime::Runtime::new()
            .map_err(|e| ExportError::Internal(format!("Failed to create tokio runtime: {}", e)))?
            .block_on(self.export())
    }
}

async fn write_atomically(dir: &Path, result: &ExportResult) -> Result<PathBuf, ExportError> {
    let dir = dir.to_path_buf();
    let path = dir.join(&result.file_name);
    let bytes = result.bytes.clone();
    let target = path.clone();

    tokio::task::spawn_blocking(move || -> std::io::Result<()> {
        std::fs::create_dir_all(&dir)?;
        // Unique sibling name; removed on drop if persisting never happens.
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&target).map_err(|e| e.error)?;
        Ok(())
    })
    .await
    .map_err(|e| ExportError::Internal(format!("Write task panicked: {}", e)))?
    .map_err(|source| ExportError::DeliveryFailed {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}

/// Export with the HTTP collaborators described by `config`.
///
/// # Example
/// ```rust,no_run
/// use portfolio_export::{export, ExportConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ExportConfig::builder()
///     .base_url("https://portfolio.example.com")
///     .build()?;
/// let result = export(&config).await?;
/// std::fs::write(&result.file_name, &result.bytes)?;
/// # Ok(())
/// # }
/// ```
pub async fn export(config: &ExportConfig) -> Result<ExportResult, ExportError> {
    Exporter::http(config.clone())?.export().await
}

/// [`export`], then write the PDF into `dir`. Returns the written path.
pub async fn export_to_dir(
    dir: impl AsRef<Path>,
    config: &ExportConfig,
) -> Result<(PathBuf, ExportResult), ExportError> {
    Exporter::http(config.clone())?.export_to_dir(dir).await
}

/// Synchronous wrapper around [`export`].
///
/// Creates a temporary tokio runtime internally.
pub fn export_sync(config: &ExportConfig) -> Result<ExportResult, ExportError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ExportError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(export(config))
}
