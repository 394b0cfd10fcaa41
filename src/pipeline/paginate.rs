//! Local pagination: rasterise each section into one tall bitmap, slice it
//! into page-sized strips and hand the pages to a [`PageWriter`].
//!
//! Slices are planned in source-bitmap pixels, so the strips of a section
//! cover `[0, height)` exactly with no gap or overlap. Each strip is placed
//! at `height * scale` points, where `scale = content_width / bitmap_width`,
//! and the page-capacity conversions round down so a strip never overflows
//! the content box.
//!
//! Rasterisation and PDF writing are CPU-bound and run inside
//! `spawn_blocking`.

use crate::config::{ExportConfig, PageGeometry};
use crate::error::ExportError;
use crate::output::ImageReport;
use crate::pipeline::compose::ComposedDocument;
use crate::pipeline::pdf::{LopdfPageWriter, PageWriter};
use crate::pipeline::render::{section_html, Paginator};
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Error type returned by [`Rasterizer::rasterize`].
pub type RasterError = Box<dyn std::error::Error + Send + Sync>;

/// A contiguous vertical strip of a section bitmap assigned to one page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSlice {
    /// First source row of the strip.
    pub source_offset_y: u32,
    /// Strip height in source rows.
    pub height: u32,
    /// Zero-based output page.
    pub page_index: usize,
}

/// Turns markup into pixels.
///
/// Supplied by the embedding environment (headless browser, native layout
/// engine, ...).
pub trait Rasterizer: Send + Sync {
    /// Render a standalone HTML page at `width` pixels wide, as tall as it needs.
    fn rasterize(&self, markup: &str, width: u32) -> Result<RgbaImage, RasterError>;

    /// Copy rows `y..y + height` of `bitmap`.
    fn crop(&self, bitmap: &RgbaImage, y: u32, height: u32) -> RgbaImage {
        image::imageops::crop_imm(bitmap, 0, y, bitmap.width(), height).to_image()
    }
}

/// Partition `total` rows into strips.
///
/// The first strip fits in `first_remaining` rows on page `start_page`;
/// following strips get `page_capacity` rows each on consecutive pages. A
/// new page is started only when the current one has no room left.
pub fn plan_slices(total: u32, first_remaining: u32, page_capacity: u32, start_page: usize) -> Vec<PageSlice> {
    let page_capacity = page_capacity.max(1);
    let mut slices = Vec::new();
    let mut offset = 0;
    let mut room = first_remaining;
    let mut page = start_page;
    while offset < total {
        if room == 0 {
            page += 1;
            room = page_capacity;
        }
        let height = room.min(total - offset);
        slices.push(PageSlice {
            source_offset_y: offset,
            height,
            page_index: page,
        });
        offset += height;
        room -= height;
    }
    slices
}

/// A bitmap strip positioned on a page. Coordinates are in points from the
/// top-left corner of the page.
#[derive(Debug, Clone)]
pub struct Placement {
    pub image: RgbaImage,
    pub x_pt: f32,
    pub y_pt: f32,
    pub width_pt: f32,
    pub height_pt: f32,
}

/// One output page.
#[derive(Debug, Clone, Default)]
pub struct OutputPage {
    pub placements: Vec<Placement>,
    /// Page index overlay, e.g. `"2 / 7"`.
    pub footer: Option<String>,
}

/// A rasterised section waiting to be laid out.
#[derive(Debug, Clone)]
pub struct RasterSection {
    pub bitmap: RgbaImage,
    pub page_break_before: bool,
}

/// Place every section's strips onto pages.
///
/// Never returns an empty list: the first page exists even if all bitmaps
/// are empty.
pub fn layout<R: Rasterizer + ?Sized>(
    rasterizer: &R,
    sections: &[RasterSection],
    geometry: &PageGeometry,
) -> Result<Vec<OutputPage>, ExportError> {
    let content_width = geometry.content_width();
    let content_height = geometry.content_height();
    let mut pages = vec![OutputPage::default()];
    let mut used_pt = 0.0_f32;

    for (i, section) in sections.iter().enumerate() {
        let bitmap = &section.bitmap;
        if bitmap.width() == 0 {
            return Err(ExportError::RasterisationFailed {
                section: i,
                detail: "rasterizer returned a zero-width bitmap".into(),
            });
        }

        let current_has_content = pages.last().is_some_and(|p| !p.placements.is_empty());
        if section.page_break_before && current_has_content {
            pages.push(OutputPage::default());
            used_pt = 0.0;
        }

        let scale = content_width / bitmap.width() as f32;
        let capacity = (content_height / scale).floor() as u32;
        let remaining = ((content_height - used_pt).max(0.0) / scale).floor() as u32;
        let slices = plan_slices(bitmap.height(), remaining, capacity, pages.len() - 1);
        debug!(
            "Section {}: {}x{} px, scale {:.3}, {} slice(s)",
            i,
            bitmap.width(),
            bitmap.height(),
            scale,
            slices.len()
        );

        for slice in slices {
            while pages.len() <= slice.page_index {
                pages.push(OutputPage::default());
                used_pt = 0.0;
            }
            let height_pt = slice.height as f32 * scale;
            pages[slice.page_index].placements.push(Placement {
                image: rasterizer.crop(bitmap, slice.source_offset_y, slice.height),
                x_pt: geometry.margin_pt,
                y_pt: geometry.margin_pt + used_pt,
                width_pt: content_width,
                height_pt,
            });
            used_pt += height_pt;
        }
    }
    Ok(pages)
}

/// Set the `"n / N"` footer on every page. Running it again changes nothing.
pub fn stamp_page_numbers(pages: &mut [OutputPage]) {
    let total = pages.len();
    for (i, page) in pages.iter_mut().enumerate() {
        page.footer = Some(format!("{} / {}", i + 1, total));
    }
}

/// [`Paginator`] that rasterises locally and writes the PDF itself.
pub struct LocalPaginator<R, W = LopdfPageWriter> {
    rasterizer: Arc<R>,
    writer: Arc<W>,
    geometry: PageGeometry,
    raster_width_px: u32,
}

impl<R: Rasterizer> LocalPaginator<R> {
    pub fn new(rasterizer: R, config: &ExportConfig) -> Self {
        Self::with_writer(rasterizer, LopdfPageWriter, config)
    }
}

impl<R: Rasterizer, W: PageWriter> LocalPaginator<R, W> {
    pub fn with_writer(rasterizer: R, writer: W, config: &ExportConfig) -> Self {
        Self {
            rasterizer: Arc::new(rasterizer),
            writer: Arc::new(writer),
            geometry: config.geometry,
            raster_width_px: config.raster_width_px,
        }
    }
}

impl<R, W> Paginator for LocalPaginator<R, W>
where
    R: Rasterizer + 'static,
    W: PageWriter + 'static,
{
    async fn paginate(&self, doc: &ComposedDocument, _images: &ImageReport) -> Result<Vec<u8>, ExportError> {
        let markups: Vec<(String, bool)> = doc
            .sections
            .iter()
            .map(|s| (section_html(&doc.title, s), s.page_break_before))
            .collect();
        let rasterizer = Arc::clone(&self.rasterizer);
        let writer = Arc::clone(&self.writer);
        let geometry = self.geometry;
        let width = self.raster_width_px;

        info!("Rasterising {} section(s) at {} px", markups.len(), width);
        tokio::task::spawn_blocking(move || {
            let sections = markups
                .iter()
                .enumerate()
                .map(|(i, (markup, page_break_before))| {
                    let bitmap = rasterizer.rasterize(markup, width).map_err(|e| {
                        ExportError::RasterisationFailed {
                            section: i,
                            detail: e.to_string(),
                        }
                    })?;
                    Ok(RasterSection {
                        bitmap,
                        page_break_before: *page_break_before,
                    })
                })
                .collect::<Result<Vec<_>, ExportError>>()?;

            let mut pages = layout(rasterizer.as_ref(), &sections, &geometry)?;
            stamp_page_numbers(&mut pages);
            info!("Laid out {} page(s)", pages.len());
            writer.write(&pages, &geometry)
        })
        .await
        .map_err(|e| ExportError::Internal(format!("Pagination task panicked: {}", e)))?
    }
}
