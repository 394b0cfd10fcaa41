//! Configuration types for portfolio export.
//!
//! All export behaviour is controlled through [`ExportConfig`], built via its
//! [`ExportConfigBuilder`]. Markdown and sanitisation settings travel inside
//! the config as an immutable [`NormalizeOptions`] value that is handed to
//! [`crate::pipeline::sanitize::normalize`] on every call; nothing is stored
//! in process-wide state.

use crate::error::ExportError;
use crate::progress::ProgressCallback;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Configuration for one portfolio export.
///
/// Built via [`ExportConfig::builder()`] or using [`ExportConfig::default()`].
///
/// # Example
/// ```rust
/// use portfolio_export::ExportConfig;
///
/// let config = ExportConfig::builder()
///     .base_url("https://portfolio.example.com")
///     .author("Jane Doe")
///     .image_concurrency(8)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ExportConfig {
    /// Root of the content API, also the origin used to absolutise
    /// root-relative image references. Default: `http://localhost:8000`.
    pub base_url: String,

    /// Remote renderer endpoint. `None` means `{base_url}/api/v1/pdf/generate`.
    pub render_url: Option<String>,

    /// Slug of the About document. Default: `about`.
    pub about_slug: String,

    /// Title printed on the cover page. Default: `PORTFOLIO`.
    pub cover_title: String,

    /// Optional author line printed under the cover title.
    pub author: Option<String>,

    /// Heading used when the About document has no title. Default: `About Me`.
    pub about_fallback_title: String,

    /// Heading that opens the posts part of the document. Default: `Projects`.
    pub posts_heading: String,

    /// Date printed on the cover and used in the file name.
    /// `None` means today's date (UTC) at export time.
    pub generated_on: Option<NaiveDate>,

    /// Admission threshold for inlining an image, in bytes. Default: 300 KiB.
    pub max_inline_image_bytes: u64,

    /// Inlined images wider than this are downscaled. Default: `Some(1024)`.
    pub max_inline_image_width: Option<u32>,

    /// Maximum number of images resolved at the same time. Default: 16.
    pub image_concurrency: usize,

    /// Timeout covering the probe and the download of one image. Default: 10.
    pub image_timeout_secs: u64,

    /// Timeout for content-source requests. Default: 30.
    pub request_timeout_secs: u64,

    /// Timeout for the remote renderer. Default: 120.
    pub render_timeout_secs: u64,

    /// Largest composed HTML the remote renderer accepts. Default: 5 MiB.
    pub max_payload_bytes: usize,

    /// Output page size and margins. Default: A4 with 15 mm margins.
    pub geometry: PageGeometry,

    /// Width in pixels at which the local strategy rasterises sections. Default: 794.
    pub raster_width_px: u32,

    /// Markdown rendering and sanitisation settings.
    pub normalize: NormalizeOptions,

    /// Receives per-stage events. Default: none.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            render_url: None,
            about_slug: "about".to_string(),
            cover_title: "PORTFOLIO".to_string(),
            author: None,
            about_fallback_title: "About Me".to_string(),
            posts_heading: "Projects".to_string(),
            generated_on: None,
            max_inline_image_bytes: 300 * 1024,
            max_inline_image_width: Some(1024),
            image_concurrency: 16,
            image_timeout_secs: 10,
            request_timeout_secs: 30,
            render_timeout_secs: 120,
            max_payload_bytes: 5 * 1024 * 1024,
            geometry: PageGeometry::default(),
            raster_width_px: 794,
            normalize: NormalizeOptions::default(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExportConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExportConfig")
            .field("base_url", &self.base_url)
            .field("render_url", &self.render_url)
            .field("about_slug", &self.about_slug)
            .field("cover_title", &self.cover_title)
            .field("author", &self.author)
            .field("about_fallback_title", &self.about_fallback_title)
            .field("posts_heading", &self.posts_heading)
            .field("generated_on", &self.generated_on)
            .field("max_inline_image_bytes", &self.max_inline_image_bytes)
            .field("max_inline_image_width", &self.max_inline_image_width)
            .field("image_concurrency", &self.image_concurrency)
            .field("image_timeout_secs", &self.image_timeout_secs)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("render_timeout_secs", &self.render_timeout_secs)
            .field("max_payload_bytes", &self.max_payload_bytes)
            .field("geometry", &self.geometry)
            .field("raster_width_px", &self.raster_width_px)
            .field("normalize", &self.normalize)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ExportProgressCallback>"),
            )
            .finish()
    }
}

impl ExportConfig {
    /// Create a new builder for `ExportConfig`.
    pub fn builder() -> ExportConfigBuilder {
        ExportConfigBuilder {
            config: Self::default(),
        }
    }

    /// The renderer endpoint, derived from `base_url` when not set explicitly.
    pub fn render_endpoint(&self) -> String {
        match &self.render_url {
            Some(url) => url.clone(),
            None => format!("{}/api/v1/pdf/generate", self.base_url.trim_end_matches('/')),
        }
    }

    /// The date stamped on the cover and in the file name.
    pub fn export_date(&self) -> NaiveDate {
        self.generated_on
            .unwrap_or_else(|| chrono::Utc::now().date_naive())
    }
}

/// Builder for [`ExportConfig`].
#[derive(Debug)]
pub struct ExportConfigBuilder {
    config: ExportConfig,
}

impl ExportConfigBuilder {
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into();
        self
    }

    pub fn render_url(mut self, url: impl Into<String>) -> Self {
        self.config.render_url = Some(url.into());
        self
    }

    pub fn about_slug(mut self, slug: impl Into<String>) -> Self {
        self.config.about_slug = slug.into();
        self
    }

    pub fn cover_title(mut self, title: impl Into<String>) -> Self {
        self.config.cover_title = title.into();
        self
    }

    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.config.author = Some(author.into());
        self
    }

    pub fn about_fallback_title(mut self, title: impl Into<String>) -> Self {
        self.config.about_fallback_title = title.into();
        self
    }

    pub fn posts_heading(mut self, heading: impl Into<String>) -> Self {
        self.config.posts_heading = heading.into();
        self
    }

    pub fn generated_on(mut self, date: NaiveDate) -> Self {
        self.config.generated_on = Some(date);
        self
    }

    pub fn max_inline_image_bytes(mut self, bytes: u64) -> Self {
        self.config.max_inline_image_bytes = bytes;
        self
    }

    pub fn max_inline_image_width(mut self, px: Option<u32>) -> Self {
        self.config.max_inline_image_width = px.map(|w| w.max(16));
        self
    }

    pub fn image_concurrency(mut self, n: usize) -> Self {
        self.config.image_concurrency = n.max(1);
        self
    }

    pub fn image_timeout_secs(mut self, secs: u64) -> Self {
        self.config.image_timeout_secs = secs;
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs;
        self
    }

    pub fn render_timeout_secs(mut self, secs: u64) -> Self {
        self.config.render_timeout_secs = secs;
        self
    }

    pub fn max_payload_bytes(mut self, bytes: usize) -> Self {
        self.config.max_payload_bytes = bytes;
        self
    }

    pub fn geometry(mut self, geometry: PageGeometry) -> Self {
        self.config.geometry = geometry;
        self
    }

    pub fn raster_width_px(mut self, px: u32) -> Self {
        self.config.raster_width_px = px;
        self
    }

    pub fn normalize(mut self, options: NormalizeOptions) -> Self {
        self.config.normalize = options;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExportConfig, ExportError> {
        let c = &self.config;
        if !(c.base_url.starts_with("http://") || c.base_url.starts_with("https://")) {
            return Err(ExportError::InvalidConfig(format!(
                "base_url must be an http(s) URL, got '{}'",
                c.base_url
            )));
        }
        if c.max_inline_image_bytes == 0 {
            return Err(ExportError::InvalidConfig(
                "max_inline_image_bytes must be > 0".into(),
            ));
        }
        if c.image_timeout_secs == 0 || c.request_timeout_secs == 0 || c.render_timeout_secs == 0 {
            return Err(ExportError::InvalidConfig("timeouts must be ≥ 1s".into()));
        }
        if c.raster_width_px == 0 {
            return Err(ExportError::InvalidConfig(
                "raster_width_px must be > 0".into(),
            ));
        }
        c.geometry.validate()?;
        Ok(self.config)
    }
}

// ── Page geometry ────────────────────────────────────────────────────────

const MM_TO_PT: f32 = 72.0 / 25.4;

/// Output page size and uniform margin, in PDF points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageGeometry {
    pub width_pt: f32,
    pub height_pt: f32,
    pub margin_pt: f32,
}

impl Default for PageGeometry {
    fn default() -> Self {
        Self::a4(15.0)
    }
}

impl PageGeometry {
    /// A4 portrait with the given margin in millimetres.
    pub fn a4(margin_mm: f32) -> Self {
        Self {
            width_pt: 595.28,
            height_pt: 841.89,
            margin_pt: margin_mm * MM_TO_PT,
        }
    }

    /// Width available to content between the side margins.
    pub fn content_width(&self) -> f32 {
        self.width_pt - 2.0 * self.margin_pt
    }

    /// Height available to content between the top and bottom margins.
    pub fn content_height(&self) -> f32 {
        self.height_pt - 2.0 * self.margin_pt
    }

    fn validate(&self) -> Result<(), ExportError> {
        if self.margin_pt < 0.0 || self.content_width() <= 0.0 || self.content_height() <= 0.0 {
            return Err(ExportError::InvalidConfig(format!(
                "page geometry leaves no content area: {self:?}"
            )));
        }
        Ok(())
    }
}

// ── Normalisation options ────────────────────────────────────────────────

/// Markdown dialect settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkdownOptions {
    /// GitHub-flavoured extensions: tables, strikethrough, task lists.
    pub gfm: bool,
    /// Render single newlines as `<br>`.
    pub hard_breaks: bool,
}

impl Default for MarkdownOptions {
    fn default() -> Self {
        Self {
            gfm: true,
            hard_breaks: true,
        }
    }
}

/// Allow-list applied to every sanitised block.
///
/// Tags in [`crate::pipeline::sanitize::FORBIDDEN_TAGS`] and attributes
/// starting with `on` are rejected before this list is consulted, so adding
/// them here has no effect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SanitizePolicy {
    pub allowed_tags: BTreeSet<String>,
    pub allowed_attributes: BTreeSet<String>,
}

const DEFAULT_ALLOWED_TAGS: &[&str] = &[
    "h1", "h2", "h3", "h4", "h5", "h6", "p", "br", "hr", "ul", "ol", "li", "blockquote", "pre",
    "code", "a", "img", "strong", "em", "b", "i", "u", "s", "del", "ins", "table", "thead",
    "tbody", "tr", "th", "td", "div", "span", "sup", "sub",
];

const DEFAULT_ALLOWED_ATTRIBUTES: &[&str] = &[
    "href", "src", "alt", "title", "class", "id", "target", "rel", "width", "height", "colspan",
    "rowspan", "style",
];

impl Default for SanitizePolicy {
    fn default() -> Self {
        Self {
            allowed_tags: DEFAULT_ALLOWED_TAGS.iter().map(|s| s.to_string()).collect(),
            allowed_attributes: DEFAULT_ALLOWED_ATTRIBUTES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl SanitizePolicy {
    pub fn allows_tag(&self, tag: &str) -> bool {
        self.allowed_tags.contains(tag)
    }

    pub fn allows_attribute(&self, attr: &str) -> bool {
        self.allowed_attributes.contains(attr)
    }
}

/// Everything [`crate::pipeline::sanitize::normalize`] needs, passed by value
/// instead of living in global state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizeOptions {
    pub markdown: MarkdownOptions,
    pub policy: SanitizePolicy,
}
