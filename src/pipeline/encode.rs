//! Image encoding: raw bytes → `data:<mime>;base64,...` URI.
//!
//! Inlined images travel inside the HTML payload sent to the renderer, so
//! wide photos are downscaled before encoding. Only PNG and JPEG are
//! re-encoded; any other format (GIF, WebP, SVG) is inlined as fetched.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::imageops::FilterType;
use image::ImageFormat;
use std::io::Cursor;
use tracing::debug;

/// MIME type used when neither the response header nor the bytes say otherwise.
pub const FALLBACK_MIME: &str = "image/png";

/// Pick the MIME type for fetched image bytes.
///
/// A `Content-Type` header starting with `image/` wins; otherwise the
/// format is sniffed from the magic bytes, falling back to [`FALLBACK_MIME`].
pub fn detect_mime(header: Option<&str>, bytes: &[u8]) -> String {
    if let Some(mime) = header
        .and_then(|h| h.split(';').next())
        .map(|h| h.trim().to_ascii_lowercase())
        .filter(|h| h.starts_with("image/"))
    {
        return mime;
    }
    image::guess_format(bytes)
        .map(|f| f.to_mime_type().to_string())
        .unwrap_or_else(|_| FALLBACK_MIME.to_string())
}

/// Wrap bytes in a base64 data URI.
pub fn data_uri(bytes: &[u8], mime: &str) -> String {
    let b64 = STANDARD.encode(bytes);
    let mut uri = String::with_capacity(b64.len() + mime.len() + 13);
    uri.push_str("data:");
    uri.push_str(mime);
    uri.push_str(";base64,");
    uri.push_str(&b64);
    uri
}

/// Downscale a PNG or JPEG wider than `max_width`, keeping aspect ratio.
///
/// Returns the original bytes when the image is narrow enough, is another
/// format, or cannot be decoded.
pub fn downscale(bytes: Vec<u8>, max_width: u32) -> Vec<u8> {
    let format = match image::guess_format(&bytes) {
        Ok(f @ (ImageFormat::Png | ImageFormat::Jpeg)) => f,
        _ => return bytes,
    };
    let img = match image::load_from_memory_with_format(&bytes, format) {
        Ok(img) => img,
        Err(e) => {
            debug!("Could not decode image for downscaling: {e}");
            return bytes;
        }
    };
    if img.width() <= max_width {
        return bytes;
    }

    let height = ((img.height() as u64 * max_width as u64) / img.width() as u64).max(1) as u32;
    let resized = img.resize_exact(max_width, height, FilterType::Lanczos3);
    // JPEG has no alpha channel.
    let resized = match format {
        ImageFormat::Jpeg => image::DynamicImage::ImageRgb8(resized.to_rgb8()),
        _ => resized,
    };

    let mut buf = Vec::new();
    match resized.write_to(&mut Cursor::new(&mut buf), format) {
        Ok(()) => {
            debug!(
                "Downscaled {}x{} → {}x{} ({} → {} bytes)",
                img.width(),
                img.height(),
                max_width,
                height,
                bytes.len(),
                buf.len()
            );
            buf
        }
        Err(e) => {
            debug!("Re-encoding downscaled image failed: {e}");
            bytes
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgba, RgbaImage};

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, Rgba([255, 0, 0, 255])));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .expect("encode should succeed");
        buf
    }

    #[test]
    fn data_uri_is_base64() {
        let uri = data_uri(b"abc", "image/gif");
        assert_eq!(uri, "data:image/gif;base64,YWJj");
    }

    #[test]
    fn mime_prefers_image_header_then_sniffs() {
        let bytes = png(2, 2);
        assert_eq!(detect_mime(Some("image/webp; charset=x"), &bytes), "image/webp");
        assert_eq!(detect_mime(Some("application/octet-stream"), &bytes), "image/png");
        assert_eq!(detect_mime(None, &bytes), "image/png");
        assert_eq!(detect_mime(None, b"not an image"), FALLBACK_MIME);
    }

    #[test]
    fn wide_png_is_downscaled() {
        let out = downscale(png(40, 20), 16);
        let img = image::load_from_memory(&out).expect("valid png");
        assert_eq!((img.width(), img.height()), (16, 8));
    }

    #[test]
    fn narrow_or_foreign_images_are_untouched() {
        let small = png(8, 8);
        assert_eq!(downscale(small.clone(), 16), small);
        let gif_magic = b"GIF89a\x01\x00\x01\x00".to_vec();
        assert_eq!(downscale(gif_magic.clone(), 16), gif_magic);
    }
}
