//! Minimal arena DOM built by html5ever, plus an escaping serializer.
//!
//! The sanitizer and the image resolver both need a real HTML parse: regex
//! surgery on markup cannot cope with malformed tags, unquoted attributes or
//! entity-encoded payloads. html5ever applies the browser tree-building
//! algorithm; this module gives it somewhere to put the nodes and walks them
//! back out without recursion, so hostile nesting depth cannot blow the stack.

use std::borrow::Cow;
use std::cell::RefCell;

use html5ever::driver::ParseOpts;
use html5ever::parse_document;
use html5ever::tendril::{StrTendril, TendrilSink};
use html5ever::tree_builder::{ElementFlags, NodeOrText, QuirksMode, TreeSink};
use html5ever::{Attribute as Html5Attribute, QualName};

pub(crate) type NodeId = usize;

/// Elements that never have children or an end tag.
pub(crate) const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// Elements whose first newline the parser swallows.
const LEADING_NEWLINE_ELEMENTS: &[&str] = &["pre", "listing", "textarea"];

/// Elements whose text children are serialised verbatim.
const RAW_TEXT_ELEMENTS: &[&str] = &[
    "style", "script", "xmp", "iframe", "noembed", "noframes", "plaintext", "noscript",
];

#[derive(Debug, Clone)]
pub(crate) struct Attr {
    pub name: QualName,
    pub value: String,
}

impl Attr {
    /// `prefix:local` for namespaced attributes, `local` otherwise.
    pub fn qualified_name(&self) -> Cow<'_, str> {
        match &self.name.prefix {
            Some(prefix) => Cow::Owned(format!("{}:{}", prefix, self.name.local)),
            None => Cow::Borrowed(&*self.name.local),
        }
    }
}

#[derive(Debug)]
pub(crate) enum NodeData {
    Document,
    Doctype,
    Comment(String),
    Text(String),
    Element {
        // Boxed so the name keeps a stable address while `nodes` reallocates;
        // `DomSink::elem_name` hands out references to it.
        name: Box<QualName>,
        attrs: Vec<Attr>,
    },
}

#[derive(Debug)]
pub(crate) struct Node {
    pub data: NodeData,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

/// Traversal event emitted by [`Dom::walk`].
#[derive(Debug, Clone, Copy)]
pub(crate) enum Visit {
    Enter(NodeId),
    Leave(NodeId),
}

/// What [`Dom::walk`] should do after an `Enter`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    Descend,
    /// Skip the children; no `Leave` is emitted for this node.
    SkipChildren,
}

#[derive(Debug)]
pub(crate) struct Dom {
    nodes: Vec<Node>,
}

impl Dom {
    fn new() -> Self {
        Self {
            nodes: vec![Node {
                data: NodeData::Document,
                parent: None,
                children: Vec::new(),
            }],
        }
    }

    pub fn document(&self) -> NodeId {
        0
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    fn alloc(&mut self, data: NodeData) -> NodeId {
        self.nodes.push(Node {
            data,
            parent: None,
            children: Vec::new(),
        });
        self.nodes.len() - 1
    }

    fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id].parent.take() {
            self.nodes[parent].children.retain(|&c| c != id);
        }
    }

    fn append(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.nodes[child].parent = Some(parent);
        self.nodes[parent].children.push(child);
    }

    fn append_text(&mut self, parent: NodeId, text: &str) {
        if let Some(&last) = self.nodes[parent].children.last() {
            if let NodeData::Text(existing) = &mut self.nodes[last].data {
                existing.push_str(text);
                return;
            }
        }
        let id = self.alloc(NodeData::Text(text.to_string()));
        self.append(parent, id);
    }

    fn insert_before(&mut self, sibling: NodeId, child: NodeId) {
        self.detach(child);
        let Some(parent) = self.nodes[sibling].parent else {
            return;
        };
        let pos = self.nodes[parent]
            .children
            .iter()
            .position(|&c| c == sibling)
            .unwrap_or(0);
        self.nodes[child].parent = Some(parent);
        self.nodes[parent].children.insert(pos, child);
    }

    fn insert_text_before(&mut self, sibling: NodeId, text: &str) {
        if let Some(parent) = self.nodes[sibling].parent {
            let siblings = &self.nodes[parent].children;
            if let Some(pos) = siblings.iter().position(|&c| c == sibling) {
                if pos > 0 {
                    let prev = siblings[pos - 1];
                    if let NodeData::Text(existing) = &mut self.nodes[prev].data {
                        existing.push_str(text);
                        return;
                    }
                }
            }
        }
        let id = self.alloc(NodeData::Text(text.to_string()));
        self.insert_before(sibling, id);
    }

    /// Lower-case local name of an element node.
    pub fn local_name(&self, id: NodeId) -> Option<&str> {
        match &self.nodes[id].data {
            NodeData::Element { name, .. } => Some(&*name.local),
            _ => None,
        }
    }

    /// True when serialising `id` must repeat the newline the parser
    /// dropped after its start tag.
    pub fn needs_leading_newline(&self, id: NodeId) -> bool {
        self.local_name(id)
            .is_some_and(|name| LEADING_NEWLINE_ELEMENTS.contains(&name))
            && self.nodes[id]
                .children
                .first()
                .is_some_and(|&c| matches!(&self.nodes[c].data, NodeData::Text(t) if t.starts_with('\n')))
    }

    pub fn attr(&self, id: NodeId, local: &str) -> Option<&str> {
        match &self.nodes[id].data {
            NodeData::Element { attrs, .. } => attrs
                .iter()
                .find(|a| a.name.prefix.is_none() && &*a.name.local == local)
                .map(|a| a.value.as_str()),
            _ => None,
        }
    }

    /// Overwrite an existing attribute's value. Missing attributes are left alone.
    pub fn set_attr(&mut self, id: NodeId, local: &str, value: String) {
        if let NodeData::Element { attrs, .. } = &mut self.nodes[id].data {
            if let Some(a) = attrs
                .iter_mut()
                .find(|a| a.name.prefix.is_none() && &*a.name.local == local)
            {
                a.value = value;
            }
        }
    }

    /// Depth-first walk over the descendants of `root` (not `root` itself).
    pub fn walk(&self, root: NodeId, mut f: impl FnMut(Visit) -> Flow) {
        let mut stack: Vec<(NodeId, usize)> = vec![(root, 0)];
        while let Some(frame) = stack.last_mut() {
            let (node, next) = *frame;
            match self.nodes[node].children.get(next) {
                Some(&child) => {
                    frame.1 += 1;
                    if f(Visit::Enter(child)) == Flow::Descend {
                        stack.push((child, 0));
                    }
                }
                None => {
                    stack.pop();
                    if node != root {
                        f(Visit::Leave(node));
                    }
                }
            }
        }
    }

    /// All element descendants of `root` with the given local name, in document order.
    pub fn elements_named(&self, root: NodeId, local: &str) -> Vec<NodeId> {
        let mut found = Vec::new();
        self.walk(root, |visit| {
            if let Visit::Enter(id) = visit {
                if self.local_name(id) == Some(local) {
                    found.push(id);
                }
            }
            Flow::Descend
        });
        found
    }

    /// The `body` element produced by [`parse_fragment`].
    pub fn body(&self) -> NodeId {
        self.elements_named(self.document(), "body")
            .first()
            .copied()
            .unwrap_or_else(|| self.document())
    }
}

/// Parse an HTML fragment as the content of a `<body>`.
pub(crate) fn parse_fragment(html: &str) -> Dom {
    let wrapped = format!("<!DOCTYPE html><html><head></head><body>{html}</body></html>");
    parse_document(DomSink::default(), ParseOpts::default())
        .from_utf8()
        .one(wrapped.as_bytes())
        .into_dom()
}

/// Serialise the children of `root` back to markup.
pub(crate) fn serialize_children(dom: &Dom, root: NodeId) -> String {
    let mut out = String::new();
    dom.walk(root, |visit| {
        match visit {
            Visit::Enter(id) => {
                let node = dom.node(id);
                match &node.data {
                    NodeData::Text(text) => {
                        let raw = node
                            .parent
                            .and_then(|p| dom.local_name(p))
                            .is_some_and(|p| RAW_TEXT_ELEMENTS.contains(&p));
                        if raw {
                            out.push_str(text);
                        } else {
                            escape_text(text, &mut out);
                        }
                    }
                    NodeData::Comment(text) => {
                        out.push_str("<!--");
                        out.push_str(text);
                        out.push_str("-->");
                    }
                    NodeData::Element { name, attrs } => {
                        out.push('<');
                        out.push_str(&name.local);
                        for attr in attrs {
                            push_attr(&mut out, &attr.qualified_name(), &attr.value);
                        }
                        out.push('>');
                        if VOID_ELEMENTS.contains(&&*name.local) {
                            return Flow::SkipChildren;
                        }
                        if dom.needs_leading_newline(id) {
                            out.push('\n');
                        }
                    }
                    NodeData::Document | NodeData::Doctype => {}
                }
            }
            Visit::Leave(id) => {
                if let NodeData::Element { name, .. } = &dom.node(id).data {
                    out.push_str("</");
                    out.push_str(&name.local);
                    out.push('>');
                }
            }
        }
        Flow::Descend
    });
    out
}

pub(crate) fn push_attr(out: &mut String, name: &str, value: &str) {
    out.push(' ');
    out.push_str(name);
    out.push_str("=\"");
    escape_attr(value, out);
    out.push('"');
}

pub(crate) fn escape_text(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
}

pub(crate) fn escape_attr(value: &str, out: &mut String) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
}

/// Escape a plain string for use as element content.
pub(crate) fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    escape_text(text, &mut out);
    out
}

// ── TreeSink ─────────────────────────────────────────────────────────────

/// html5ever's `TreeSink` takes `&self`, so the DOM lives in a `RefCell`.
struct DomSink {
    dom: RefCell<Dom>,
}

impl Default for DomSink {
    fn default() -> Self {
        Self {
            dom: RefCell::new(Dom::new()),
        }
    }
}

impl DomSink {
    fn with<R>(&self, f: impl FnOnce(&mut Dom) -> R) -> R {
        f(&mut self.dom.borrow_mut())
    }

    fn into_dom(self) -> Dom {
        self.dom.into_inner()
    }
}

fn convert_attrs(attrs: Vec<Html5Attribute>) -> Vec<Attr> {
    attrs
        .into_iter()
        .map(|a| Attr {
            name: a.name,
            value: a.value.to_string(),
        })
        .collect()
}

impl TreeSink for DomSink {
    type Handle = NodeId;
    type Output = Self;
    type ElemName<'a>
        = &'a QualName
    where
        Self: 'a;

    fn finish(self) -> Self::Output {
        self
    }

    fn parse_error(&self, _msg: Cow<'static, str>) {}

    fn get_document(&self) -> NodeId {
        self.with(|dom| dom.document())
    }

    fn elem_name<'a>(&'a self, target: &'a NodeId) -> &'a QualName {
        static EMPTY: QualName = QualName {
            prefix: None,
            ns: html5ever::ns!(),
            local: html5ever::local_name!(""),
        };
        let ptr = self.with(|dom| match &dom.nodes[*target].data {
            NodeData::Element { name, .. } => Some(&**name as *const QualName),
            _ => None,
        });
        match ptr {
            // SAFETY: element names are boxed, never replaced and never freed
            // while the sink is alive, so the pointee outlives `&'a self`.
            Some(ptr) => unsafe { &*ptr },
            None => &EMPTY,
        }
    }

    fn create_element(
        &self,
        name: QualName,
        attrs: Vec<Html5Attribute>,
        _flags: ElementFlags,
    ) -> NodeId {
        self.with(|dom| {
            dom.alloc(NodeData::Element {
                name: Box::new(name),
                attrs: convert_attrs(attrs),
            })
        })
    }

    fn create_comment(&self, text: StrTendril) -> NodeId {
        self.with(|dom| dom.alloc(NodeData::Comment(text.to_string())))
    }

    fn create_pi(&self, _target: StrTendril, _data: StrTendril) -> NodeId {
        self.with(|dom| dom.alloc(NodeData::Comment(String::new())))
    }

    fn append(&self, parent: &NodeId, child: NodeOrText<NodeId>) {
        self.with(|dom| match child {
            NodeOrText::AppendNode(node) => dom.append(*parent, node),
            NodeOrText::AppendText(text) => dom.append_text(*parent, &text),
        })
    }

    fn append_based_on_parent_node(
        &self,
        element: &NodeId,
        prev_element: &NodeId,
        child: NodeOrText<NodeId>,
    ) {
        let has_parent = self.with(|dom| dom.nodes[*element].parent.is_some());
        if has_parent {
            self.append_before_sibling(element, child);
        } else {
            self.append(prev_element, child);
        }
    }

    fn append_doctype_to_document(
        &self,
        _name: StrTendril,
        _public_id: StrTendril,
        _system_id: StrTendril,
    ) {
        self.with(|dom| {
            let doctype = dom.alloc(NodeData::Doctype);
            let doc = dom.document();
            dom.append(doc, doctype);
        })
    }

    fn get_template_contents(&self, target: &NodeId) -> NodeId {
        *target
    }

    fn same_node(&self, x: &NodeId, y: &NodeId) -> bool {
        x == y
    }

    fn set_quirks_mode(&self, _mode: QuirksMode) {}

    fn append_before_sibling(&self, sibling: &NodeId, new_node: NodeOrText<NodeId>) {
        self.with(|dom| match new_node {
            NodeOrText::AppendNode(node) => dom.insert_before(*sibling, node),
            NodeOrText::AppendText(text) => dom.insert_text_before(*sibling, &text),
        })
    }

    fn add_attrs_if_missing(&self, target: &NodeId, attrs: Vec<Html5Attribute>) {
        self.with(|dom| {
            if let NodeData::Element {
                attrs: existing, ..
            } = &mut dom.nodes[*target].data
            {
                for attr in convert_attrs(attrs) {
                    if !existing.iter().any(|a| a.name == attr.name) {
                        existing.push(attr);
                    }
                }
            }
        })
    }

    fn remove_from_parent(&self, target: &NodeId) {
        self.with(|dom| dom.detach(*target))
    }

    fn reparent_children(&self, node: &NodeId, new_parent: &NodeId) {
        self.with(|dom| {
            let children = std::mem::take(&mut dom.nodes[*node].children);
            for child in children {
                dom.nodes[child].parent = None;
                dom.append(*new_parent, child);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fragment_into_body() {
        let dom = parse_fragment("<p>Hello <b>world</b></p>");
        let body = dom.body();
        assert_eq!(dom.local_name(body), Some("body"));
        assert_eq!(serialize_children(&dom, body), "<p>Hello <b>world</b></p>");
    }

    #[test]
    fn serializer_escapes_text_and_attributes() {
        let dom = parse_fragment(r#"<a title="say &quot;hi&quot;">1 &lt; 2 &amp; 3</a>"#);
        let html = serialize_children(&dom, dom.body());
        assert_eq!(html, r#"<a title="say &quot;hi&quot;">1 &lt; 2 &amp; 3</a>"#);
    }

    #[test]
    fn void_elements_have_no_end_tag() {
        let dom = parse_fragment(r#"<p>a<br>b<img src="x.png"></p>"#);
        assert_eq!(
            serialize_children(&dom, dom.body()),
            r#"<p>a<br>b<img src="x.png"></p>"#
        );
    }

    #[test]
    fn malformed_markup_is_repaired() {
        let dom = parse_fragment("<p><b>bold<p>next");
        let html = serialize_children(&dom, dom.body());
        assert_eq!(html, "<p><b>bold</b></p><p><b>next</b></p>");
    }

    #[test]
    fn finds_and_rewrites_attributes() {
        let mut dom = parse_fragment(r#"<div><img src="a.png"><p><img src="b.png"></p></div>"#);
        let imgs = dom.elements_named(dom.body(), "img");
        assert_eq!(imgs.len(), 2);
        assert_eq!(dom.attr(imgs[1], "src"), Some("b.png"));
        dom.set_attr(imgs[0], "src", "data:image/png;base64,AA==".into());
        let html = serialize_children(&dom, dom.body());
        assert!(html.contains(r#"src="data:image/png;base64,AA==""#));
        assert!(html.contains(r#"src="b.png""#));
    }

    #[test]
    fn pre_keeps_its_leading_newline_across_reparses() {
        let dom = parse_fragment("<pre>\n\ncode</pre>");
        let once = serialize_children(&dom, dom.body());
        assert_eq!(once, "<pre>\n\ncode</pre>");
        let again = parse_fragment(&once);
        assert_eq!(serialize_children(&again, again.body()), once);

        let plain = parse_fragment("<pre>code\n</pre>");
        assert_eq!(serialize_children(&plain, plain.body()), "<pre>code\n</pre>");
    }

    #[test]
    fn deep_nesting_does_not_recurse() {
        let html = "<div>".repeat(5_000);
        let dom = parse_fragment(&html);
        let out = serialize_children(&dom, dom.body());
        assert!(out.starts_with("<div><div>"));
    }
}
