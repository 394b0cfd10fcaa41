//! Composition: cover, About and posts → one [`ComposedDocument`].
//!
//! Pure and deterministic. Every input body has already been sanitized and
//! had its images resolved; the composer only orders sections, numbers posts
//! and builds the escaped header markup for each section.

use crate::config::ExportConfig;
use crate::document::Document;
use crate::pipeline::dom::escape;
use crate::pipeline::sanitize::SanitizedBlock;
use chrono::NaiveDate;
use serde::Serialize;
use tracing::debug;

/// Separator placed between tags in a post header.
pub const TAG_SEPARATOR: &str = " · ";

/// A fetched record together with its sanitized, image-resolved body.
#[derive(Debug, Clone, Serialize)]
pub struct PreparedDocument {
    pub document: Document,
    pub body: SanitizedBlock,
}

/// What the cover page shows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CoverInfo {
    pub title: String,
    pub author: Option<String>,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SectionKind {
    Cover,
    About,
    /// `index` is 1-based. The first post carries the posts heading.
    Post { index: usize, opens_posts: bool },
}

/// One logical unit of the composed document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Section {
    pub kind: SectionKind,
    pub page_break_before: bool,
    /// Escaped header markup built by the composer.
    pub header: String,
    /// `None` for the cover.
    pub body: Option<SanitizedBlock>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComposedDocument {
    pub title: String,
    pub sections: Vec<Section>,
}

impl ComposedDocument {
    pub fn posts(&self) -> impl Iterator<Item = &Section> {
        self.sections
            .iter()
            .filter(|s| matches!(s.kind, SectionKind::Post { .. }))
    }

    pub fn has_about(&self) -> bool {
        self.sections.iter().any(|s| s.kind == SectionKind::About)
    }
}

/// Builds [`ComposedDocument`]s with fixed labels.
#[derive(Debug, Clone)]
pub struct Composer {
    cover: CoverInfo,
    about_fallback_title: String,
    posts_heading: String,
}

impl Composer {
    pub fn new(cover: CoverInfo, about_fallback_title: impl Into<String>, posts_heading: impl Into<String>) -> Self {
        Self {
            cover,
            about_fallback_title: about_fallback_title.into(),
            posts_heading: posts_heading.into(),
        }
    }

    /// Labels and cover fields from `config`, dated `date`.
    pub fn from_config(config: &ExportConfig, date: NaiveDate) -> Self {
        Self::new(
            CoverInfo {
                title: config.cover_title.clone(),
                author: config.author.clone(),
                date,
            },
            config.about_fallback_title.clone(),
            config.posts_heading.clone(),
        )
    }

    /// Assemble the document.
    ///
    /// The cover always comes first and is the only section without a page
    /// break. About is included only when its raw content is non-blank.
    /// Posts are ordered newest first; equal timestamps keep fetch order.
    pub fn compose(&self, about: Option<PreparedDocument>, mut posts: Vec<PreparedDocument>) -> ComposedDocument {
        let mut sections = Vec::with_capacity(posts.len() + 2);
        sections.push(Section {
            kind: SectionKind::Cover,
            page_break_before: false,
            header: cover_header(&self.cover),
            body: None,
        });

        if let Some(about) = about.filter(|a| !a.document.is_blank()) {
            let title = match about.document.title.trim() {
                "" => self.about_fallback_title.as_str(),
                t => t,
            };
            sections.push(Section {
                kind: SectionKind::About,
                page_break_before: true,
                header: format!(r#"<h1 class="section-title">{}</h1>"#, escape(title)),
                body: Some(about.body),
            });
        }

        // `sort_by` is stable.
        posts.sort_by(|a, b| b.document.created_at.cmp(&a.document.created_at));
        for (i, post) in posts.into_iter().enumerate() {
            let opens_posts = i == 0;
            let mut header = String::new();
            if opens_posts {
                header.push_str(&format!(
                    r#"<h1 class="section-title">{}</h1>"#,
                    escape(&self.posts_heading)
                ));
            }
            header.push_str(&post_header(i + 1, &post.document));
            sections.push(Section {
                kind: SectionKind::Post {
                    index: i + 1,
                    opens_posts,
                },
                page_break_before: true,
                header,
                body: Some(post.body),
            });
        }

        debug!("Composed {} section(s)", sections.len());
        ComposedDocument {
            title: self.cover.title.clone(),
            sections,
        }
    }
}

fn cover_header(cover: &CoverInfo) -> String {
    let mut html = format!(r#"<div class="cover-title">{}</div>"#, escape(&cover.title));
    if let Some(author) = cover.author.as_deref().filter(|a| !a.trim().is_empty()) {
        html.push_str(&format!(r#"<div class="cover-subtitle">{}</div>"#, escape(author)));
    }
    html.push_str(&format!(
        r#"<div class="cover-date">{}</div>"#,
        cover.date.format("%B %-d, %Y")
    ));
    html
}

fn post_header(index: usize, doc: &Document) -> String {
    let mut html = format!(
        r#"<div class="post-header"><h2 class="post-title">{}. {}</h2>"#,
        index,
        escape(&doc.title)
    );
    if !doc.tags.is_empty() {
        html.push_str(&format!(
            r#"<div class="post-meta"><span class="post-tag">{}</span></div>"#,
            escape(&doc.tags.join(TAG_SEPARATOR))
        ));
    }
    html.push_str("</div>");
    html
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn prepared(title: &str, content: &str, day: u32) -> PreparedDocument {
        let created = Utc.with_ymd_and_hms(2024, 3, day, 12, 0, 0).unwrap();
        PreparedDocument {
            document: Document::new(title, content, created),
            body: SanitizedBlock::from_sanitized(format!("<p>{content}</p>")),
        }
    }

    fn composer() -> Composer {
        Composer::new(
            CoverInfo {
                title: "PORTFOLIO".into(),
                author: Some("Jane <Doe>".into()),
                date: NaiveDate::from_ymd_opt(2024, 3, 9).unwrap(),
            },
            "About Me",
            "Projects",
        )
    }

    fn titles(doc: &ComposedDocument) -> Vec<String> {
        doc.posts()
            .map(|s| s.body.as_ref().unwrap().as_str().to_string())
            .collect()
    }

    #[test]
    fn posts_are_newest_first() {
        let doc = composer().compose(
            None,
            vec![prepared("t3", "c3", 3), prepared("t1", "c1", 1), prepared("t2", "c2", 2)],
        );
        assert_eq!(titles(&doc), vec!["<p>c3</p>", "<p>c2</p>", "<p>c1</p>"]);
    }

    #[test]
    fn equal_timestamps_keep_fetch_order() {
        let doc = composer().compose(
            None,
            vec![prepared("a", "a", 2), prepared("b", "b", 5), prepared("c", "c", 2)],
        );
        assert_eq!(titles(&doc), vec!["<p>b</p>", "<p>a</p>", "<p>c</p>"]);
    }

    #[test]
    fn cover_first_then_about_then_posts_with_breaks() {
        let doc = composer().compose(
            Some(prepared("", "hello", 1)),
            vec![prepared("p1", "x", 1), prepared("p2", "y", 2)],
        );
        let kinds: Vec<_> = doc.sections.iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            vec![
                SectionKind::Cover,
                SectionKind::About,
                SectionKind::Post { index: 1, opens_posts: true },
                SectionKind::Post { index: 2, opens_posts: false },
            ]
        );
        assert!(!doc.sections[0].page_break_before);
        assert!(doc.sections[1..].iter().all(|s| s.page_break_before));
        assert_eq!(doc.sections[1].header, r#"<h1 class="section-title">About Me</h1>"#);
        assert!(doc.sections[2].header.starts_with(r#"<h1 class="section-title">Projects</h1>"#));
        assert!(!doc.sections[3].header.contains("section-title"));
    }

    #[test]
    fn blank_about_is_omitted() {
        let doc = composer().compose(Some(prepared("About", "  ", 1)), vec![]);
        assert_eq!(doc.sections.len(), 1);
        assert!(!doc.has_about());
    }

    #[test]
    fn headers_are_escaped_and_tags_joined() {
        let mut post = prepared("<b>Ray</b> tracer", "x", 1);
        post.document = post.document.with_tags(["rust", "graphics"]);
        let doc = composer().compose(None, vec![post]);
        let header = &doc.sections[1].header;
        assert!(header.contains("1. &lt;b&gt;Ray&lt;/b&gt; tracer"), "{header}");
        assert!(header.contains("rust · graphics"), "{header}");

        let cover = &doc.sections[0].header;
        assert!(cover.contains("Jane &lt;Doe&gt;"));
        assert!(cover.contains("March 9, 2024"));
    }

    #[test]
    fn composer_takes_labels_from_config() {
        let config = ExportConfig::builder()
            .cover_title("WORKS")
            .author("Sam")
            .about_fallback_title("Who")
            .posts_heading("Things")
            .build()
            .unwrap();
        let date = NaiveDate::from_ymd_opt(2023, 12, 1).unwrap();
        let doc = Composer::from_config(&config, date).compose(Some(prepared("", "hi", 1)), vec![prepared("p", "x", 1)]);
        assert!(doc.sections[0].header.contains("WORKS"));
        assert!(doc.sections[0].header.contains("Sam"));
        assert!(doc.sections[0].header.contains("December 1, 2023"));
        assert_eq!(doc.sections[1].header, r#"<h1 class="section-title">Who</h1>"#);
        assert!(doc.sections[2].header.starts_with(r#"<h1 class="section-title">Things</h1>"#));
    }

    #[test]
    fn composition_is_serializable() {
        let doc = composer().compose(None, vec![prepared("p", "x", 1)]);
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["sections"][1]["kind"]["kind"], "post");
        assert_eq!(json["sections"][1]["kind"]["index"], 1);
        assert_eq!(json["sections"][1]["body"]["html"], "<p>x</p>");
    }
}
