//! Pipeline stages for portfolio export.
//!
//! Each submodule implements one transformation step, so each can be tested
//! on its own and either pagination strategy can be plugged in without
//! touching the others.
//!
//! ## Data Flow
//!
//! ```text
//! content ──▶ classify ──▶ sanitize ──▶ images ──▶ compose ──▶ render | paginate
//! (raw str)   (md/html)    (allow-list) (inline)   (sections)  (remote | local PDF)
//! ```
//!
//! 1. [`classify`] — Markdown or markup, by heuristic
//! 2. [`sanitize`] — Markdown → HTML, then the allow-list filter; yields a
//!    [`sanitize::SanitizedBlock`]
//! 3. [`images`]   — absolutise and inline small images; the only stage with
//!    per-item network I/O
//! 4. [`compose`]  — cover, About and posts in order, with page breaks
//! 5. [`render`]   — remote strategy: one HTML page with CSS break hints,
//!    posted to a renderer
//! 6. [`paginate`] — local strategy: rasterise, slice, write with [`pdf`]
//!
//! `dom` (html5ever parsing and serialisation) and [`encode`] are shared helpers.

pub mod classify;
pub mod compose;
pub(crate) mod dom;
pub mod encode;
#[cfg(test)]
pub(crate) mod http_stub;
pub mod images;
pub mod paginate;
pub mod pdf;
pub mod render;
pub mod sanitize;
