//! Image resolution: find every `img`, absolutise its `src`, and inline the
//! bytes as a data URI when the image is small enough.
//!
//! Resolution is best effort. Each image gets at most one size probe and one
//! download, no retries, under a per-image timeout. Outcomes are recorded in
//! an [`ImageReport`]; a failed or oversize image keeps its original `src`.
//!
//! All images of all blocks go through one `buffer_unordered` stream, so
//! `image_concurrency` bounds the whole export, not each block.

use crate::config::ExportConfig;
use crate::error::{ExportError, ImageError};
use crate::output::{ImageRef, ImageReport, ImageStatus};
use crate::pipeline::dom::{parse_fragment, serialize_children, Dom, NodeId};
use crate::pipeline::encode::{data_uri, detect_mime, downscale};
use crate::pipeline::sanitize::SanitizedBlock;
use crate::progress::{NoopProgressCallback, ProgressCallback};
use futures::stream::{self, StreamExt};
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::Url;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Body and declared type of a downloaded image.
#[derive(Debug, Clone)]
pub struct FetchedImage {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

/// Network access used by [`ImageResolver`].
pub trait ImageFetcher: Send + Sync {
    /// Declared size of the resource, without downloading it.
    ///
    /// `None` means unknown: the probe failed or the server sent no length.
    fn probe(&self, url: &str) -> impl Future<Output = Option<u64>> + Send;

    /// Download the body, giving up with [`ImageError::TooLarge`] once more
    /// than `limit` bytes have arrived.
    fn fetch(
        &self,
        url: &str,
        limit: u64,
    ) -> impl Future<Output = Result<FetchedImage, ImageError>> + Send;
}

/// [`ImageFetcher`] backed by reqwest: `HEAD` to probe, streamed `GET` to fetch.
#[derive(Debug, Clone)]
pub struct HttpImageFetcher {
    client: reqwest::Client,
    timeout_secs: u64,
}

impl HttpImageFetcher {
    pub fn new(timeout_secs: u64) -> Result<Self, ExportError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ExportError::Internal(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client, timeout_secs })
    }

    fn transport_error(&self, url: &str, e: reqwest::Error) -> ImageError {
        if e.is_timeout() {
            ImageError::Timeout {
                url: url.to_string(),
                secs: self.timeout_secs,
            }
        } else {
            ImageError::Transport {
                url: url.to_string(),
                detail: e.to_string(),
            }
        }
    }
}

fn header_length(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

impl ImageFetcher for HttpImageFetcher {
    async fn probe(&self, url: &str) -> Option<u64> {
        let response = match self.client.head(url).send().await {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                debug!("HEAD {} returned {}", url, r.status());
                return None;
            }
            Err(e) => {
                debug!("HEAD {} failed: {}", url, e);
                return None;
            }
        };
        // `Response::content_length` reports the body size hint, which is
        // zero for HEAD; the header carries the real value.
        header_length(response.headers())
    }

    async fn fetch(&self, url: &str, limit: u64) -> Result<FetchedImage, ImageError> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.transport_error(url, e))?;

        if !response.status().is_success() {
            return Err(ImageError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }
        if let Some(len) = header_length(response.headers()).filter(|&len| len > limit) {
            return Err(ImageError::TooLarge {
                url: url.to_string(),
                size: len,
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let mut bytes = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| self.transport_error(url, e))?
        {
            let size = (bytes.len() + chunk.len()) as u64;
            if size > limit {
                return Err(ImageError::TooLarge {
                    url: url.to_string(),
                    size,
                });
            }
            bytes.extend_from_slice(&chunk);
        }

        Ok(FetchedImage {
            bytes,
            content_type,
        })
    }
}

/// Markup after resolution plus the per-image outcomes.
#[derive(Debug, Clone)]
pub struct ResolvedImages {
    pub block: SanitizedBlock,
    pub report: ImageReport,
}

impl ResolvedImages {
    pub fn failed(&self) -> Vec<String> {
        self.report.failed()
    }

    pub fn skipped(&self) -> Vec<String> {
        self.report.skipped()
    }
}

/// Inlines images of sanitized blocks.
pub struct ImageResolver<F> {
    fetcher: F,
    origin: Url,
    max_inline_bytes: u64,
    max_width: Option<u32>,
    timeout: Duration,
    concurrency: usize,
    progress: ProgressCallback,
}

/// One `img` waiting for resolution: (block index, node, original src).
type Target = (usize, NodeId, String);

impl<F: ImageFetcher> ImageResolver<F> {
    /// Relative `src` values resolve against `config.base_url`.
    pub fn new(fetcher: F, config: &ExportConfig) -> Result<Self, ExportError> {
        let origin = Url::parse(&config.base_url).map_err(|e| {
            ExportError::InvalidConfig(format!("base_url '{}' is not a URL: {}", config.base_url, e))
        })?;
        Ok(Self {
            fetcher,
            origin,
            max_inline_bytes: config.max_inline_image_bytes,
            max_width: config.max_inline_image_width,
            timeout: Duration::from_secs(config.image_timeout_secs),
            concurrency: config.image_concurrency.max(1),
            progress: config
                .progress_callback
                .clone()
                .unwrap_or_else(|| Arc::new(NoopProgressCallback)),
        })
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Resolve the images of a single block.
    pub async fn resolve_images(&self, block: &SanitizedBlock) -> ResolvedImages {
        let (mut blocks, report) = self.resolve_all(vec![block.clone()]).await;
        ResolvedImages {
            block: blocks.pop().unwrap_or_else(|| block.clone()),
            report,
        }
    }

    /// Resolve the images of every block concurrently.
    ///
    /// Returns the blocks in input order; the report lists images in
    /// document order. Blocks without a resolvable image are returned as is.
    pub async fn resolve_all(&self, blocks: Vec<SanitizedBlock>) -> (Vec<SanitizedBlock>, ImageReport) {
        let mut doms: Vec<Option<Dom>> = Vec::with_capacity(blocks.len());
        let mut targets: Vec<Target> = Vec::new();
        for (index, block) in blocks.iter().enumerate() {
            let dom = parse_fragment(block.as_str());
            let found = image_sources(&dom);
            if found.is_empty() {
                doms.push(None);
                continue;
            }
            targets.extend(found.into_iter().map(|(id, src)| (index, id, src)));
            doms.push(Some(dom));
        }
        if targets.is_empty() {
            return (blocks, ImageReport::default());
        }
        info!("Resolving {} image(s) across {} block(s)", targets.len(), blocks.len());

        let mut outcomes: Vec<(usize, NodeId, ImageRef, Option<String>)> =
            stream::iter(targets.into_iter().map(|(index, id, src)| async move {
                let url = self.absolutize(&src);
                let (status, uri) = self.resolve_one(&url).await;
                self.progress.on_image_resolved(&url, &status);
                let image = ImageRef {
                    original_src: src,
                    resolved_url: url,
                    status,
                };
                (index, id, image, uri)
            }))
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        // Completion order is arbitrary; report in document order.
        outcomes.sort_by_key(|(index, id, _, _)| (*index, *id));

        let mut report = ImageReport::default();
        for (index, id, image, uri) in outcomes {
            if let (Some(uri), Some(Some(dom))) = (uri, doms.get_mut(index)) {
                dom.set_attr(id, "src", uri);
            }
            report.images.push(image);
        }

        let resolved = blocks
            .into_iter()
            .zip(doms)
            .map(|(block, dom)| match dom {
                Some(dom) => SanitizedBlock::from_sanitized(serialize_children(&dom, dom.body())),
                None => block,
            })
            .collect();

        info!(
            "Images: {} inlined, {} skipped, {} failed",
            report.inlined_count(),
            report.skipped().len(),
            report.failed().len()
        );
        (resolved, report)
    }

    /// Turn an `img src` into an absolute URL against the configured origin.
    pub fn absolutize(&self, src: &str) -> String {
        let origin = self.origin.origin().ascii_serialization();
        if let Some(rest) = src.strip_prefix("//") {
            format!("{}://{}", self.origin.scheme(), rest)
        } else if src.starts_with('/') {
            format!("{}{}", origin, src)
        } else if Url::parse(src).is_ok() {
            src.to_string()
        } else {
            format!("{}/{}", origin, src)
        }
    }

    /// Probe, fetch and encode one image. Returns the data URI on success.
    async fn resolve_one(&self, url: &str) -> (ImageStatus, Option<String>) {
        let limit = self.max_inline_bytes;
        let attempt = async {
            if let Some(size) = self.fetcher.probe(url).await.filter(|&s| s > limit) {
                return Err(ImageError::TooLarge {
                    url: url.to_string(),
                    size,
                });
            }
            let fetched = self.fetcher.fetch(url, limit).await?;
            let size = fetched.bytes.len() as u64;
            if size > limit {
                return Err(ImageError::TooLarge {
                    url: url.to_string(),
                    size,
                });
            }
            Ok(fetched)
        };

        let fetched = match tokio::time::timeout(self.timeout, attempt).await {
            Ok(Ok(fetched)) => fetched,
            Ok(Err(e)) if e.is_oversize() => {
                debug!("Skipping image: {}", e);
                return (ImageStatus::Skipped(e.to_string()), None);
            }
            Ok(Err(e)) => {
                warn!("Image not inlined: {}", e);
                return (ImageStatus::Failed(e.to_string()), None);
            }
            Err(_) => {
                let e = ImageError::Timeout {
                    url: url.to_string(),
                    secs: self.timeout.as_secs(),
                };
                warn!("Image not inlined: {}", e);
                return (ImageStatus::Failed(e.to_string()), None);
            }
        };

        let max_width = self.max_width;
        let encoded = tokio::task::spawn_blocking(move || {
            let mime = detect_mime(fetched.content_type.as_deref(), &fetched.bytes);
            let bytes = match max_width {
                Some(width) => downscale(fetched.bytes, width),
                None => fetched.bytes,
            };
            data_uri(&bytes, &mime)
        })
        .await;

        match encoded {
            Ok(uri) => {
                debug!("Inlined {} ({} chars)", url, uri.len());
                (ImageStatus::Inlined, Some(uri))
            }
            Err(e) => {
                warn!("Encoding task for {} panicked: {}", url, e);
                (ImageStatus::Failed(format!("encoding failed: {}", e)), None)
            }
        }
    }
}

/// `img` elements with a non-empty, non-inline `src`, in document order.
fn image_sources(dom: &Dom) -> Vec<(NodeId, String)> {
    dom.elements_named(dom.body(), "img")
        .into_iter()
        .filter_map(|id| {
            let src = dom.attr(id, "src")?.trim();
            let inline = src.get(..5).is_some_and(|p| p.eq_ignore_ascii_case("data:"));
            (!src.is_empty() && !inline).then(|| (id, src.to_string()))
        })
        .collect()
}
