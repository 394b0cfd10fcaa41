//! Remote pagination: serialise the composed document to one HTML page with
//! CSS break hints and let an external renderer produce the PDF.
//!
//! The renderer owns pagination, so nothing is sliced or duplicated here.
//! Sections after the cover get `break-before: page`; images, code blocks
//! and blockquotes inside posts get `break-inside: avoid`.
//!
//! [`Paginator`] is the seam between the exporter and either strategy; the
//! local one lives in [`crate::pipeline::paginate`].

use crate::config::ExportConfig;
use crate::error::ExportError;
use crate::output::ImageReport;
use crate::pipeline::compose::{ComposedDocument, Section, SectionKind};
use crate::pipeline::dom::escape;
use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Print stylesheet embedded in every composed page.
pub const STYLESHEET: &str = r#"
@page { size: A4; margin: 15mm; }
body { font-family: sans-serif; line-height: 1.6; color: #333; background: #fff; margin: 0; padding: 0; }
a { text-decoration: none; color: inherit; }
.page-break-before { break-before: page; page-break-before: always; }
.cover-page { height: 90vh; display: flex; flex-direction: column; justify-content: center; align-items: center; text-align: center; }
.cover-title { font-size: 48px; font-weight: bold; margin-bottom: 20px; }
.cover-subtitle { font-size: 24px; color: #555; margin-bottom: 10px; }
.cover-date { font-size: 18px; color: #888; }
.section-title { font-size: 32px; font-weight: bold; border-bottom: 2px solid #333; padding-bottom: 10px; margin-bottom: 30px; margin-top: 0; }
.post-container { margin-bottom: 50px; }
.post-header { margin-bottom: 20px; padding-bottom: 10px; border-bottom: 1px solid #eee; }
.post-title { font-size: 24px; font-weight: bold; margin: 0 0 10px 0; }
.post-meta { font-size: 14px; color: #666; display: block; }
.post-tag { color: #2563eb; display: block; margin-top: 5px; }
.markdown-body { font-size: 14px; }
.markdown-body h1, .markdown-body h2, .markdown-body h3 { margin-top: 20px; margin-bottom: 10px; font-weight: bold; break-after: avoid; page-break-after: avoid; }
.markdown-body p { margin-bottom: 10px; text-align: justify; }
.markdown-body img { max-width: 100%; height: auto; display: block; margin: 15px auto; border-radius: 4px; }
.markdown-body pre { background: #f8f9fa; padding: 15px; border-radius: 5px; font-family: monospace; font-size: 12px; border: 1px solid #e9ecef; white-space: pre-wrap; }
.markdown-body blockquote { border-left: 4px solid #dfe2e5; padding-left: 15px; color: #6a737d; margin: 15px 0; }
.post-container img, .post-container pre, .post-container blockquote { break-inside: avoid; page-break-inside: avoid; }
@media print { body { -webkit-print-color-adjust: exact; } }
"#;

/// Turns a composed document into PDF bytes.
pub trait Paginator: Send + Sync {
    /// `images` is forwarded to renderers that want to know which
    /// references were left external.
    fn paginate(
        &self,
        doc: &ComposedDocument,
        images: &ImageReport,
    ) -> impl Future<Output = Result<Vec<u8>, ExportError>> + Send;
}

/// Serialise the whole document as one HTML page.
pub fn to_html(doc: &ComposedDocument) -> String {
    let mut html = page_open(&doc.title);
    for section in &doc.sections {
        push_section(&mut html, section, true);
    }
    html.push_str("</body></html>");
    html
}

/// Serialise one section as a standalone page without break rules.
///
/// Used by the local strategy, which rasterises each section on its own.
pub fn section_html(title: &str, section: &Section) -> String {
    let mut html = page_open(title);
    push_section(&mut html, section, false);
    html.push_str("</body></html>");
    html
}

fn page_open(title: &str) -> String {
    format!(
        "<!DOCTYPE html><html><head><meta charset=\"UTF-8\"><title>{}</title><style>{}</style></head><body>",
        escape(title),
        STYLESHEET
    )
}

fn push_section(out: &mut String, section: &Section, with_breaks: bool) {
    let class = match section.kind {
        SectionKind::Cover => "cover-page",
        SectionKind::About => "about",
        SectionKind::Post { .. } => "post-container",
    };
    out.push_str("<section class=\"");
    out.push_str(class);
    if with_breaks && section.page_break_before {
        out.push_str(" page-break-before");
    }
    out.push_str("\">");
    out.push_str(&section.header);
    if let Some(body) = &section.body {
        out.push_str("<div class=\"markdown-body\">");
        out.push_str(body.as_str());
        out.push_str("</div>");
    }
    out.push_str("</section>");
}

/// Body sent to the remote renderer.
#[derive(Debug, Serialize)]
pub struct RenderRequest<'a> {
    pub html: &'a str,
    pub failed_images: Vec<String>,
    pub skipped_images: Vec<String>,
}

/// [`Paginator`] that posts the HTML to a rendering service.
#[derive(Debug, Clone)]
pub struct RemotePaginator {
    client: reqwest::Client,
    endpoint: String,
    timeout_secs: u64,
    max_payload_bytes: usize,
}

impl RemotePaginator {
    pub fn new(config: &ExportConfig) -> Result<Self, ExportError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.render_timeout_secs))
            .build()
            .map_err(|e| ExportError::Internal(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            endpoint: config.render_endpoint(),
            timeout_secs: config.render_timeout_secs,
            max_payload_bytes: config.max_payload_bytes,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Paginator for RemotePaginator {
    async fn paginate(&self, doc: &ComposedDocument, images: &ImageReport) -> Result<Vec<u8>, ExportError> {
        let html = to_html(doc);
        if html.len() > self.max_payload_bytes {
            return Err(ExportError::PayloadTooLarge {
                size: html.len(),
                limit: self.max_payload_bytes,
            });
        }

        let request = RenderRequest {
            html: &html,
            failed_images: images.failed(),
            skipped_images: images.skipped(),
        };
        info!(
            "Rendering {} section(s) via {} ({} bytes)",
            doc.sections.len(),
            self.endpoint,
            html.len()
        );

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ExportError::RenderTimeout {
                        secs: self.timeout_secs,
                    }
                } else {
                    ExportError::RenderFailed {
                        reason: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!("Renderer returned {}", status);
            return Err(ExportError::RenderFailed {
                reason: format!("HTTP {}", status),
            });
        }

        let bytes = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                ExportError::RenderTimeout {
                    secs: self.timeout_secs,
                }
            } else {
                ExportError::RenderFailed {
                    reason: e.to_string(),
                }
            }
        })?;

        if !bytes.starts_with(b"%PDF") {
            return Err(ExportError::RenderFailed {
                reason: "response is not a PDF".into(),
            });
        }
        debug!("Renderer returned {} bytes", bytes.len());
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::compose::{Composer, CoverInfo, PreparedDocument};
    use crate::pipeline::sanitize::SanitizedBlock;
    use crate::Document;
    use chrono::{NaiveDate, TimeZone, Utc};

    fn composed() -> ComposedDocument {
        let post = |title: &str, day: u32, body: &str| PreparedDocument {
            document: Document::new(title, "x", Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap()),
            body: SanitizedBlock::from_sanitized(body.to_string()),
        };
        Composer::new(
            CoverInfo {
                title: "PORTFOLIO".into(),
                author: None,
                date: NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(),
            },
            "About Me",
            "Projects",
        )
        .compose(
            Some(post("About", 1, "<p>me</p>")),
            vec![post("old", 1, "<p>first</p>"), post("new", 2, "<pre>code</pre>")],
        )
    }

    #[test]
    fn html_keeps_section_order_and_breaks() {
        let html = to_html(&composed());
        let cover = html.find("<section class=\"cover-page\">").unwrap();
        let about = html.find("<p>me</p>").unwrap();
        let newer = html.find("<pre>code</pre>").unwrap();
        let older = html.find("<p>first</p>").unwrap();
        assert!(cover < about && about < newer && newer < older);

        assert_eq!(html.matches(" page-break-before\"").count(), 3);
        assert!(!html.contains("cover-page page-break-before"));
        assert!(html.contains(".post-container img, .post-container pre, .post-container blockquote { break-inside: avoid"));
        assert!(!html.contains("<script"));
    }

    #[test]
    fn section_html_has_no_break_classes() {
        let doc = composed();
        let html = section_html(&doc.title, &doc.sections[2]);
        assert!(html.contains("<section class=\"post-container\">"));
        assert!(html.contains("<pre>code</pre>"));
        assert!(!html.contains("<p>first</p>"));
    }

    #[tokio::test]
    async fn oversized_payload_is_rejected_before_sending() {
        let config = ExportConfig::builder()
            .render_url("http://127.0.0.1:9/never-called")
            .max_payload_bytes(64)
            .build()
            .unwrap();
        let paginator = RemotePaginator::new(&config).unwrap();
        let err = paginator
            .paginate(&composed(), &ImageReport::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ExportError::PayloadTooLarge { limit: 64, .. }));
    }

    #[tokio::test]
    async fn unreachable_renderer_is_render_failure() {
        let config = ExportConfig::builder()
            .render_url("http://127.0.0.1:9/api/v1/pdf/generate")
            .render_timeout_secs(5)
            .build()
            .unwrap();
        let paginator = RemotePaginator::new(&config).unwrap();
        let err = paginator
            .paginate(&composed(), &ImageReport::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ExportError::RenderFailed { .. } | ExportError::RenderTimeout { .. }
        ));
        assert_eq!(err.user_message(), crate::error::GENERIC_FAILURE_MESSAGE);
    }

    // ── RemotePaginator against a local server ──────────────────────────────

    use crate::pipeline::http_stub::{response, serve};

    async fn render_with(reply: Vec<u8>) -> Result<Vec<u8>, ExportError> {
        let addr = serve(vec![reply]).await;
        let config = ExportConfig::builder()
            .render_url(format!("http://{}/render", addr))
            .render_timeout_secs(5)
            .build()
            .unwrap();
        RemotePaginator::new(&config)
            .unwrap()
            .paginate(&composed(), &ImageReport::default())
            .await
    }

    #[tokio::test]
    async fn renderer_pdf_response_is_returned() {
        let body = b"%PDF-1.7\n%%EOF";
        let reply = response(
            "200 OK",
            &[("Content-Type", "application/pdf"), ("Content-Length", &body.len().to_string())],
            body,
        );
        assert_eq!(render_with(reply).await.unwrap(), body.to_vec());
    }

    #[tokio::test]
    async fn renderer_non_pdf_body_is_rejected() {
        let reply = response("200 OK", &[("Content-Type", "text/html"), ("Content-Length", "9")], b"<p>x</p>\n");
        let err = render_with(reply).await.unwrap_err();
        assert!(matches!(&err, ExportError::RenderFailed { reason } if reason.contains("not a PDF")), "{:?}", err);
    }

    #[tokio::test]
    async fn renderer_error_status_is_render_failure() {
        let reply = response("500 Internal Server Error", &[("Content-Length", "0")], b"");
        let err = render_with(reply).await.unwrap_err();
        assert!(matches!(&err, ExportError::RenderFailed { reason } if reason.contains("500")), "{:?}", err);
    }

    #[test]
    fn request_serializes_image_lists() {
        let request = RenderRequest {
            html: "<p>x</p>",
            failed_images: vec!["https://a/x.png".into()],
            skipped_images: vec![],
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["html"], "<p>x</p>");
        assert_eq!(json["failed_images"][0], "https://a/x.png");
        assert!(json["skipped_images"].as_array().unwrap().is_empty());
    }
}
