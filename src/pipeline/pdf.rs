//! PDF writing for the local strategy.
//!
//! Each placement becomes an RGB image XObject drawn with a `cm`/`Do` pair;
//! the footer is Helvetica text centred in the bottom margin. Streams are
//! zlib-compressed.

use crate::config::PageGeometry;
use crate::error::ExportError;
use crate::pipeline::paginate::{OutputPage, Placement};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use std::io::Write;
use tracing::debug;

const FOOTER_FONT_SIZE: f32 = 9.0;

/// Writes laid-out pages as a PDF.
pub trait PageWriter: Send + Sync {
    fn write(&self, pages: &[OutputPage], geometry: &PageGeometry) -> Result<Vec<u8>, ExportError>;
}

/// [`PageWriter`] built on lopdf.
#[derive(Debug, Clone, Copy, Default)]
pub struct LopdfPageWriter;

impl PageWriter for LopdfPageWriter {
    fn write(&self, pages: &[OutputPage], geometry: &PageGeometry) -> Result<Vec<u8>, ExportError> {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });

        let mut kids: Vec<Object> = Vec::with_capacity(pages.len());
        for page in pages {
            let page_id = write_page(&mut doc, page, geometry, pages_id, font_id)?;
            kids.push(page_id.into());
        }

        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => pages.len() as i64,
            }),
        );
        let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
        doc.trailer.set("Root", catalog_id);

        let mut buf = Vec::new();
        doc.save_to(&mut buf)
            .map_err(|e| ExportError::Internal(format!("Failed to serialise PDF: {}", e)))?;
        debug!("Wrote {} page(s), {} bytes", pages.len(), buf.len());
        Ok(buf)
    }
}

fn write_page(
    doc: &mut Document,
    page: &OutputPage,
    geometry: &PageGeometry,
    pages_id: ObjectId,
    font_id: ObjectId,
) -> Result<ObjectId, ExportError> {
    let mut xobjects = Dictionary::new();
    let mut operations = Vec::new();

    for (i, placement) in page.placements.iter().enumerate() {
        if placement.image.width() == 0 || placement.image.height() == 0 {
            continue;
        }
        let name = format!("Im{}", i);
        let image_id = doc.add_object(image_xobject(placement)?);
        xobjects.set(name.as_str(), image_id);

        // PDF user space grows upwards from the bottom-left corner.
        let bottom = geometry.height_pt - placement.y_pt - placement.height_pt;
        operations.push(Operation::new("q", vec![]));
        operations.push(Operation::new(
            "cm",
            vec![
                placement.width_pt.into(),
                0.into(),
                0.into(),
                placement.height_pt.into(),
                placement.x_pt.into(),
                bottom.into(),
            ],
        ));
        operations.push(Operation::new("Do", vec![Object::Name(name.into_bytes())]));
        operations.push(Operation::new("Q", vec![]));
    }

    if let Some(footer) = &page.footer {
        // Helvetica digits are about half an em wide.
        let text_width = footer.chars().count() as f32 * FOOTER_FONT_SIZE * 0.5;
        let x = (geometry.width_pt - text_width) / 2.0;
        let y = (geometry.margin_pt - FOOTER_FONT_SIZE).max(0.0) / 2.0 + 2.0;
        operations.push(Operation::new("BT", vec![]));
        operations.push(Operation::new("Tf", vec!["F1".into(), FOOTER_FONT_SIZE.into()]));
        operations.push(Operation::new("Td", vec![x.into(), y.into()]));
        operations.push(Operation::new("Tj", vec![Object::string_literal(footer.as_str())]));
        operations.push(Operation::new("ET", vec![]));
    }

    let content = Content { operations };
    let encoded = content
        .encode()
        .map_err(|e| ExportError::Internal(format!("Failed to encode page content: {}", e)))?;
    let content_id = doc.add_object(Stream::new(
        dictionary! { "Filter" => "FlateDecode" },
        deflate(&encoded)?,
    ));

    let page_dict = dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![0.into(), 0.into(), geometry.width_pt.into(), geometry.height_pt.into()],
        "Contents" => content_id,
        "Resources" => dictionary! {
            "Font" => dictionary! { "F1" => font_id },
            "XObject" => xobjects,
        },
    };
    Ok(doc.add_object(page_dict))
}

fn image_xobject(placement: &Placement) -> Result<Stream, ExportError> {
    let image = &placement.image;
    let rgb = flatten_on_white(image);
    Ok(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => image.width() as i64,
            "Height" => image.height() as i64,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
            "Filter" => "FlateDecode",
        },
        deflate(&rgb)?,
    ))
}

/// Drop the alpha channel by compositing over white.
fn flatten_on_white(image: &image::RgbaImage) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(image.width() as usize * image.height() as usize * 3);
    for pixel in image.pixels() {
        let [r, g, b, a] = pixel.0;
        let a = a as u16;
        for c in [r, g, b] {
            rgb.push(((c as u16 * a + 255 * (255 - a)) / 255) as u8);
        }
    }
    rgb
}

fn deflate(data: &[u8]) -> Result<Vec<u8>, ExportError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .and_then(|_| encoder.finish())
        .map_err(|e| ExportError::Internal(format!("Failed to compress PDF stream: {}", e)))
}
