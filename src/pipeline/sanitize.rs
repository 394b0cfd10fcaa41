//! Sanitisation: Markdown → markup, then an allow-list filter over the DOM.
//!
//! Every content string goes through [`normalize`], which returns a
//! [`SanitizedBlock`]. The filter runs on an html5ever parse of the markup
//! and re-serialises only what the [`SanitizePolicy`] allows, so malformed
//! tags, entity-encoded URLs and nested tricks are judged on what a browser
//! would actually build, not on their spelling.
//!
//! Rules, in precedence order:
//!
//! * [`FORBIDDEN_TAGS`] are never emitted, whatever the policy says. The
//!   ones that carry executable or form content are dropped together with
//!   their children; `form nav header footer` are unwrapped.
//! * Attributes starting with `on` are never emitted.
//! * Other elements outside the policy are unwrapped (children kept).
//! * `href`/`src` must use `http`, `https`, `mailto`, `tel` or be relative;
//!   `img src` may also be a `data:image/*` URI.
//! * `style` values that can load resources or run code are dropped.
//! * An `a` with `target` gets `rel="noopener noreferrer"`.
//! * `thead`/`tfoot` outside the policy become `tbody` when that is
//!   allowed; `col` and `colgroup` are dropped.
//!
//! The output of [`sanitize_html`] is a fixed point: sanitising it again
//! returns the same string. Unwrapping can leave markup the parser would
//! rebuild differently (text directly inside a `table`, say), so the result
//! is re-parsed and filtered until it stops changing.

use crate::config::{MarkdownOptions, NormalizeOptions, SanitizePolicy};
use crate::pipeline::classify::{classify, contains_tag, ContentKind};
use crate::pipeline::dom::{
    escape_text, parse_fragment, push_attr, Attr, Flow, NodeData, Visit, VOID_ELEMENTS,
};
use html5ever::QualName;
use pulldown_cmark::{Event, Options, Parser};
use serde::Serialize;
use std::fmt;
use tracing::debug;

/// Tags that no policy can allow.
pub const FORBIDDEN_TAGS: &[&str] = &[
    "script", "style", "iframe", "object", "embed", "form", "input", "button", "textarea",
    "select", "nav", "header", "footer",
];

/// Tags removed together with everything inside them.
const DROP_WITH_CONTENT: &[&str] = &[
    "script", "style", "iframe", "object", "embed", "input", "button", "textarea", "select",
    "noscript", "noembed", "noframes", "template", "title", "xmp", "plaintext", "svg", "math",
    "col", "colgroup",
];

/// Upper bound on filter passes in [`sanitize_html`].
const MAX_PASSES: usize = 4;

const UNSAFE_STYLE_TOKENS: &[&str] = &[
    "expression(", "javascript:", "url(", "@import", "behavior:", "-moz-binding",
];

/// Markup returned for absent or empty content.
pub const PLACEHOLDER_HTML: &str = "<p>No content</p>";

/// Markup that has been through the allow-list filter.
///
/// Only this module (and the image resolver, which rewrites `src` values
/// with `data:image/*` URIs) can construct one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SanitizedBlock {
    html: String,
}

impl SanitizedBlock {
    pub(crate) fn from_sanitized(html: String) -> Self {
        Self { html }
    }

    pub fn placeholder() -> Self {
        Self::from_sanitized(PLACEHOLDER_HTML.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.html
    }

    pub fn into_string(self) -> String {
        self.html
    }
}

impl fmt::Display for SanitizedBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.html)
    }
}

/// Turn raw Markdown-or-markup content into a [`SanitizedBlock`].
///
/// Never returns an empty block: blank input, or input that sanitises to
/// nothing, yields [`PLACEHOLDER_HTML`].
pub fn normalize(content: &str, options: &NormalizeOptions) -> SanitizedBlock {
    if content.trim().is_empty() {
        return SanitizedBlock::placeholder();
    }

    let kind = classify(content);
    let markup = match kind {
        ContentKind::Markdown => markdown_to_html(content, &options.markdown),
        ContentKind::Markup if !contains_tag(content) => plain_text_to_html(content),
        ContentKind::Markup => content.to_string(),
    };

    let html = sanitize_html(&markup, &options.policy);
    debug!("Normalized {:?} content: {} → {} bytes", kind, content.len(), html.len());
    if html.trim().is_empty() {
        SanitizedBlock::placeholder()
    } else {
        SanitizedBlock::from_sanitized(html)
    }
}

/// Render Markdown with pulldown-cmark.
pub fn markdown_to_html(markdown: &str, options: &MarkdownOptions) -> String {
    let parser_options = if options.gfm {
        Options::ENABLE_TABLES
            | Options::ENABLE_STRIKETHROUGH
            | Options::ENABLE_TASKLISTS
            | Options::ENABLE_GFM
    } else {
        Options::empty()
    };
    let hard_breaks = options.hard_breaks;
    let events = Parser::new_ext(markdown, parser_options).map(move |event| match event {
        Event::SoftBreak if hard_breaks => Event::HardBreak,
        other => other,
    });

    let mut html = String::with_capacity(markdown.len() * 3 / 2);
    pulldown_cmark::html::push_html(&mut html, events);
    html
}

/// Escape plain text and wrap it in a paragraph, keeping line breaks.
fn plain_text_to_html(text: &str) -> String {
    let mut html = String::from("<p>");
    for (i, line) in text.trim().lines().enumerate() {
        if i > 0 {
            html.push_str("<br>");
        }
        escape_text(line, &mut html);
    }
    html.push_str("</p>");
    html
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action<'a> {
    /// Emit the element under this name.
    Keep(&'a str),
    Unwrap,
    Drop,
}

fn element_action<'a>(name: &'a QualName, policy: &SanitizePolicy) -> Action<'a> {
    let local = &*name.local;
    if DROP_WITH_CONTENT.contains(&local) {
        Action::Drop
    } else if FORBIDDEN_TAGS.contains(&local) || name.ns != html5ever::ns!(html) {
        Action::Unwrap
    } else if policy.allows_tag(local) {
        Action::Keep(local)
    } else if matches!(local, "thead" | "tfoot") && policy.allows_tag("tbody") {
        // An unwrapped table section comes back as an implicit `tbody`.
        Action::Keep("tbody")
    } else {
        Action::Unwrap
    }
}

/// Filter markup down to the policy's allow-list.
pub fn sanitize_html(markup: &str, policy: &SanitizePolicy) -> String {
    let (mut out, removed) = filter_pass(markup, policy);
    for _ in 1..MAX_PASSES {
        let (next, _) = filter_pass(&out, policy);
        if next == out {
            break;
        }
        out = next;
    }

    if removed > 0 {
        debug!("Sanitizer removed or unwrapped {} element(s)", removed);
    }
    out
}

/// One parse-filter-serialise round. Returns the markup and the number of
/// elements removed or unwrapped.
fn filter_pass(markup: &str, policy: &SanitizePolicy) -> (String, usize) {
    let dom = parse_fragment(markup);
    let mut out = String::with_capacity(markup.len());
    let mut removed = 0usize;

    dom.walk(dom.body(), |visit| match visit {
        Visit::Enter(id) => match &dom.node(id).data {
            NodeData::Text(text) => {
                escape_text(text, &mut out);
                Flow::Descend
            }
            NodeData::Element { name, attrs } => match element_action(name, policy) {
                Action::Drop => {
                    removed += 1;
                    Flow::SkipChildren
                }
                Action::Unwrap => {
                    removed += 1;
                    Flow::Descend
                }
                Action::Keep(tag) => {
                    write_start_tag(&mut out, tag, attrs, policy);
                    if VOID_ELEMENTS.contains(&tag) {
                        return Flow::SkipChildren;
                    }
                    if dom.needs_leading_newline(id) {
                        out.push('\n');
                    }
                    Flow::Descend
                }
            },
            _ => Flow::SkipChildren,
        },
        Visit::Leave(id) => {
            if let NodeData::Element { name, .. } = &dom.node(id).data {
                if let Action::Keep(tag) = element_action(name, policy) {
                    out.push_str("</");
                    out.push_str(tag);
                    out.push('>');
                }
            }
            Flow::Descend
        }
    });
    (out, removed)
}

fn write_start_tag(out: &mut String, tag: &str, attrs: &[Attr], policy: &SanitizePolicy) {
    let permitted = |attr: &&Attr| {
        let name = &*attr.name.local;
        attr.name.prefix.is_none()
            && attr.name.ns == html5ever::ns!()
            && !name.starts_with("on")
            && policy.allows_attribute(name)
    };

    let opens_window = tag == "a" && attrs.iter().filter(permitted).any(|a| &*a.name.local == "target");
    let mut rel_written = false;

    out.push('<');
    out.push_str(tag);
    for attr in attrs.iter().filter(permitted) {
        let name = &*attr.name.local;
        let value = attr.value.as_str();
        match name {
            "href" if !is_safe_url(value, false) => continue,
            "src" if !is_safe_url(value, tag == "img") => continue,
            "style" if !is_safe_style(value) => continue,
            "rel" if opens_window => {
                push_attr(out, "rel", "noopener noreferrer");
                rel_written = true;
                continue;
            }
            _ => {}
        }
        push_attr(out, name, value);
    }
    if opens_window && !rel_written && policy.allows_attribute("rel") {
        push_attr(out, "rel", "noopener noreferrer");
    }
    out.push('>');
}

/// Accept relative URLs and a small set of schemes.
fn is_safe_url(value: &str, allow_data_image: bool) -> bool {
    let compact: String = value
        .chars()
        .filter(|c| !c.is_whitespace() && !c.is_control())
        .collect::<String>()
        .to_ascii_lowercase();

    let Some(colon) = compact.find(':') else {
        return true;
    };
    let first_separator = compact.find(['/', '?', '#']).unwrap_or(usize::MAX);
    if colon > first_separator {
        return true;
    }
    match &compact[..colon] {
        "http" | "https" | "mailto" | "tel" => true,
        "data" => allow_data_image && compact.starts_with("data:image/"),
        _ => false,
    }
}

fn is_safe_style(value: &str) -> bool {
    let lower = value.to_ascii_lowercase();
    !UNSAFE_STYLE_TOKENS.iter().any(|t| lower.contains(t))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts() -> NormalizeOptions {
        NormalizeOptions::default()
    }

    /// Every element and attribute in `html` is allowed by `policy`.
    fn assert_allowlisted(html: &str, policy: &SanitizePolicy) {
        let dom = parse_fragment(html);
        dom.walk(dom.body(), |visit| {
            if let Visit::Enter(id) = visit {
                if let NodeData::Element { name, attrs } = &dom.node(id).data {
                    let tag = &*name.local;
                    assert!(policy.allows_tag(tag), "tag <{tag}> leaked in {html}");
                    assert!(!FORBIDDEN_TAGS.contains(&tag), "forbidden <{tag}> in {html}");
                    for attr in attrs {
                        let a = &*attr.name.local;
                        assert!(!a.starts_with("on"), "event handler {a} in {html}");
                        assert!(policy.allows_attribute(a), "attribute {a} leaked in {html}");
                    }
                }
            }
            Flow::Descend
        });
    }

    #[test]
    fn strips_script_and_event_handlers() {
        let out = normalize("<script>alert(1)</script><img src=x onerror=alert(1)>", &opts());
        let html = out.as_str();
        assert!(!html.contains("<script"), "got: {html}");
        assert!(!html.contains("onerror"), "got: {html}");
        assert!(!html.contains("alert(1)"), "script body must be dropped: {html}");
        assert_eq!(html, r#"<img src="x">"#);
    }

    #[test]
    fn adversarial_inputs_stay_within_allowlist() {
        let policy = SanitizePolicy::default();
        let inputs = [
            "<scr<script>ipt>alert(1)</script>",
            "<SCRIPT SRC=//evil.example/x.js></SCRIPT>",
            "<img src=\"x\" OnError=\"alert(1)\">",
            "<a href=\"&#106;avascript:alert(1)\">x</a>",
            "<a href=\" java\tscript:alert(1)\">x</a>",
            "<div style=\"background:url(javascript:alert(1))\">x</div>",
            "<svg><script>alert(1)</script><foreignObject><p>x</p></foreignObject></svg>",
            "<math><mi xlink:href=\"javascript:alert(1)\">x</mi></math>",
            "<iframe srcdoc=\"<script>alert(1)</script>\"></iframe>",
            "<form action=\"/steal\"><input name=a><button>go</button></form>",
            "<noscript><p title=\"</noscript><img src=x onerror=alert(1)>\"></noscript>",
            "<p onclick=\"x()\" onmouseover=\"y()\">hi</p>",
            "<object data=\"x.swf\"></object><embed src=\"x.swf\">",
            "<style>body{}</style><p>after</p>",
            "<a href=\"x\" target=\"_blank\">x</a>",
            "<!-- <script>alert(1)</script> --><p>c</p>",
            "<table><tr><td onclick=x>1</td></tr></table>",
        ];
        for input in inputs {
            let out = normalize(input, &opts());
            assert_allowlisted(out.as_str(), &policy);
            assert!(!out.as_str().to_lowercase().contains("javascript:"), "{input} -> {out}");
        }
    }

    #[test]
    fn markdown_output_stays_within_allowlist() {
        let policy = SanitizePolicy::default();
        let inputs = [
            "# Title\n\nSome **bold** and *italic* and ~~gone~~ text.",
            "- [x] done\n- [ ] todo",
            "## Data\n\n| a | b |\n|---|---|\n| 1 | 2 |",
            "```rust\nfn main() {}\n```",
            "> quote\n> more",
            "![pic](/static/a.png) and [link](javascript:alert(1))",
            "1. one\n2. two\n\n---\n\nend",
        ];
        for input in inputs {
            assert_eq!(classify(input), ContentKind::Markdown, "{input}");
            let out = normalize(input, &opts());
            assert_allowlisted(out.as_str(), &policy);
        }
    }

    #[test]
    fn markdown_renders_gfm_and_hard_breaks() {
        let out = normalize("# Hi\nline one\nline two\n\n~~old~~", &opts());
        let html = out.as_str();
        assert!(html.contains("<h1>Hi</h1>"), "got: {html}");
        assert!(html.contains("line one<br>"), "got: {html}");
        assert!(html.contains("<del>old</del>"), "got: {html}");
    }

    #[test]
    fn markdown_table_is_kept() {
        let out = normalize("## Data\n\n| a | b |\n|---|---|\n| 1 | 2 |", &opts());
        let html = out.as_str();
        assert!(html.contains("<table>"), "got: {html}");
        assert!(html.contains("<th>a</th>"), "got: {html}");
        assert!(html.contains("<td>2</td>"), "got: {html}");
    }

    #[test]
    fn table_without_other_markdown_falls_back_to_plain_text() {
        let input = "| a | b |\n|---|---|";
        assert_eq!(classify(input), ContentKind::Markup);
        assert_eq!(normalize(input, &opts()).as_str(), "<p>| a | b |<br>|---|---|</p>");
    }

    #[test]
    fn javascript_links_lose_href() {
        let out = normalize("[click](javascript:alert(1))", &opts());
        assert_eq!(out.as_str(), "<p><a>click</a></p>\n");
    }

    #[test]
    fn sanitizer_is_idempotent() {
        let policy = SanitizePolicy::default();
        let inputs = [
            "<p>Hello <b>world</b> &amp; &lt;friends&gt;</p>",
            "<a href=\"https://x\" target=\"_blank\">x</a>",
            "<p><b>bold<p>next",
            "<ul><li>a<li>b</ul><img src=\"data:image/png;base64,AAAA\" alt='&quot;q&quot;'>",
            "<table><tr><td colspan=2>x</td></tr></table>",
            "<custom-el><p>inside</p></custom-el><nav><p>menu</p></nav>",
            "<table><tfoot><tr><td>x</td></tr></tfoot></table>",
            "<table><thead><tr><th>h</th></tr></thead><tr><td>x</td></tr><tfoot><tr><td>f</td></tr></tfoot></table>",
            "<table><caption>cap</caption><tr><td>x</td></tr></table>",
            "<table><colgroup><col span=2></colgroup><tr><td>x</td></tr></table>",
            "<pre>\n\ncode</pre>",
            "<pre><span>\nx</span></pre>",
            "<h1><custom-el><h2>t</h2></custom-el></h1>",
        ];
        for input in inputs {
            let once = sanitize_html(input, &policy);
            let twice = sanitize_html(&once, &policy);
            assert_eq!(once, twice, "not idempotent for {input}");
        }

        for content in [
            "# Title\n\n![a](/a.png)\n\ntext",
            "# Code\n\n```\n\nindented\n```",
            "<table><caption>cap</caption><tfoot><tr><td>x</td></tr></tfoot></table>",
        ] {
            let block = normalize(content, &opts());
            let again = normalize(block.as_str(), &opts());
            assert_eq!(block, again, "not idempotent for {content:?}");
        }
    }

    #[test]
    fn table_sections_outside_policy_become_tbody() {
        let out = sanitize_html(
            "<table><tfoot><tr><td>x</td></tr></tfoot></table>",
            &SanitizePolicy::default(),
        );
        assert_eq!(out, "<table><tbody><tr><td>x</td></tr></tbody></table>");
    }

    #[test]
    fn caption_text_is_kept_outside_the_table() {
        let out = sanitize_html(
            "<table><caption>cap</caption><tr><td>x</td></tr></table>",
            &SanitizePolicy::default(),
        );
        assert_eq!(out, "cap<table><tbody><tr><td>x</td></tr></tbody></table>");
    }

    #[test]
    fn pre_leading_newline_survives() {
        let out = sanitize_html("<pre>\n\ncode</pre>", &SanitizePolicy::default());
        assert_eq!(out, "<pre>\n\ncode</pre>");
    }

    #[test]
    fn empty_and_fully_stripped_content_yield_placeholder() {
        assert_eq!(normalize("", &opts()).as_str(), PLACEHOLDER_HTML);
        assert_eq!(normalize("   \n", &opts()).as_str(), PLACEHOLDER_HTML);
        assert_eq!(
            normalize("<script>alert(1)</script>", &opts()).as_str(),
            PLACEHOLDER_HTML
        );
        let placeholder = normalize(PLACEHOLDER_HTML, &opts());
        assert_eq!(placeholder.as_str(), PLACEHOLDER_HTML);
    }

    #[test]
    fn plain_text_is_escaped_and_wrapped() {
        let out = normalize("a < b\nc & d", &opts());
        assert_eq!(out.as_str(), "<p>a &lt; b<br>c &amp; d</p>");
    }

    #[test]
    fn target_links_get_noopener() {
        let out = sanitize_html(
            r#"<a href="https://x" target="_blank" rel="opener">x</a>"#,
            &SanitizePolicy::default(),
        );
        assert_eq!(
            out,
            r#"<a href="https://x" target="_blank" rel="noopener noreferrer">x</a>"#
        );
    }

    #[test]
    fn structural_forbidden_tags_keep_their_text() {
        let out = sanitize_html(
            "<header><p>top</p></header><form><p>f</p><textarea>secret</textarea></form>",
            &SanitizePolicy::default(),
        );
        assert_eq!(out, "<p>top</p><p>f</p>");
    }

    #[test]
    fn data_uris_only_for_images() {
        let policy = SanitizePolicy::default();
        let img = sanitize_html(r#"<img src="data:image/png;base64,AAAA">"#, &policy);
        assert!(img.contains("data:image/png"));
        let html_data = sanitize_html(r#"<img src="data:text/html;base64,AAAA">"#, &policy);
        assert_eq!(html_data, "<img>");
        let link = sanitize_html(r#"<a href="data:image/png;base64,AAAA">x</a>"#, &policy);
        assert_eq!(link, "<a>x</a>");
    }

    #[test]
    fn unsafe_style_is_dropped_safe_style_kept() {
        let policy = SanitizePolicy::default();
        let bad = sanitize_html(r#"<p style="background:url(x)">a</p>"#, &policy);
        assert_eq!(bad, "<p>a</p>");
        let good = sanitize_html(r#"<p style="color:red">a</p>"#, &policy);
        assert_eq!(good, r#"<p style="color:red">a</p>"#);
    }

    #[test]
    fn policy_cannot_reenable_forbidden_tags() {
        let mut policy = SanitizePolicy::default();
        policy.allowed_tags.insert("script".into());
        policy.allowed_tags.insert("iframe".into());
        policy.allowed_attributes.insert("onclick".into());
        let out = sanitize_html(
            "<script>x()</script><iframe src=x></iframe><p onclick=y>z</p>",
            &policy,
        );
        assert_eq!(out, "<p>z</p>");
    }

    #[test]
    fn narrower_policy_unwraps() {
        let mut policy = SanitizePolicy::default();
        policy.allowed_tags.remove("img");
        policy.allowed_tags.remove("b");
        let out = sanitize_html(r#"<p><b>bold</b><img src="a.png"></p>"#, &policy);
        assert_eq!(out, "<p>bold</p>");
    }
}
