//! Image normalization: fit within a width cap and re-encode for upload
//!
//! | Step | How |
//! |---|---|
//! | Decode | `image::ImageReader` with the format guessed from magic bytes |
//! | Resize | `DynamicImage::resize_exact` with `Lanczos3`, width-capped, never enlarged |
//! | Encode (native) | same format as the input, encoder defaults |
//! | Encode (thumbnail) | JPEG quality 80 / PNG best compression, chosen by declared MIME |
//!
//! Decoding and resizing are CPU-bound; async callers go through
//! [`normalize_blocking`] so the runtime's worker threads stay free.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::imageops::FilterType;
use image::{DynamicImage, ImageReader};
use tracing::debug;

use crate::config::DEFAULT_MAX_WIDTH;
use crate::error::ImageError;
use crate::types::{ImageMimeType, NormalizedImage, ResolvedImage};

/// JPEG quality used for link-card thumbnails
pub const THUMBNAIL_JPEG_QUALITY: u8 = 80;

/// How the resized image is encoded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodePolicy {
    /// Keep the input's own format with default encoder settings.
    /// Formats we cannot write fall back to PNG.
    Native,
    /// Link-card thumbnails: follow the declared MIME type, JPEG at quality 80
    /// or PNG at best compression; anything else is treated as `Native`.
    Thumbnail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizeOptions {
    pub max_width: u32,
    pub policy: EncodePolicy,
}

impl NormalizeOptions {
    pub fn native(max_width: u32) -> Self {
        Self {
            max_width,
            policy: EncodePolicy::Native,
        }
    }

    pub fn thumbnail(max_width: u32) -> Self {
        Self {
            max_width,
            policy: EncodePolicy::Thumbnail,
        }
    }
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self::native(DEFAULT_MAX_WIDTH)
    }
}

/// Dimensions after fitting `width` inside `max_width`, keeping the aspect ratio.
///
/// ```
/// # use libtripost::imaging::fit_width;
/// assert_eq!(fit_width(1600, 900, 800), (800, 450));
/// assert_eq!(fit_width(640, 480, 800), (640, 480));
/// ```
pub fn fit_width(width: u32, height: u32, max_width: u32) -> (u32, u32) {
    if width <= max_width || width == 0 {
        return (width, height);
    }
    let scaled = (height as f64 * max_width as f64 / width as f64).round() as u32;
    (max_width, scaled.max(1))
}

/// Resize and re-encode a resolved image
pub fn normalize(
    resolved: &ResolvedImage,
    options: &NormalizeOptions,
) -> Result<NormalizedImage, ImageError> {
    let reader = ImageReader::new(Cursor::new(&resolved.bytes))
        .with_guessed_format()
        .map_err(|e| ImageError::Decode(image::ImageError::IoError(e)))?;
    let source_format = reader.format();
    let decoded = reader.decode().map_err(ImageError::Decode)?;

    let (width, height) = fit_width(decoded.width(), decoded.height(), options.max_width);
    let resized = if (width, height) == (decoded.width(), decoded.height()) {
        decoded
    } else {
        decoded.resize_exact(width, height, FilterType::Lanczos3)
    };

    let native = source_format
        .and_then(ImageMimeType::from_image_format)
        .unwrap_or(ImageMimeType::Png);

    let (mime_type, bytes) = match options.policy {
        EncodePolicy::Native => (native, encode_default(&resized, native)?),
        EncodePolicy::Thumbnail => match ImageMimeType::from_mime_str(&resolved.mime_type) {
            Some(ImageMimeType::Jpeg) => (
                ImageMimeType::Jpeg,
                encode_jpeg(&resized, THUMBNAIL_JPEG_QUALITY)?,
            ),
            Some(ImageMimeType::Png) => (
                ImageMimeType::Png,
                encode_png(&resized, CompressionType::Best)?,
            ),
            _ => (native, encode_default(&resized, native)?),
        },
    };

    debug!(
        "Normalized {} → {}x{} {} ({} bytes)",
        resolved.mime_type,
        width,
        height,
        mime_type,
        bytes.len()
    );

    Ok(NormalizedImage {
        bytes,
        mime_type,
        width,
        height,
    })
}

/// [`normalize`] on the blocking thread pool
pub async fn normalize_blocking(
    resolved: ResolvedImage,
    options: NormalizeOptions,
) -> Result<NormalizedImage, ImageError> {
    tokio::task::spawn_blocking(move || normalize(&resolved, &options))
        .await
        .map_err(|e| ImageError::Task(e.to_string()))?
}

fn encode_default(img: &DynamicImage, mime: ImageMimeType) -> Result<Vec<u8>, ImageError> {
    match mime {
        ImageMimeType::Jpeg => {
            let mut buf = Vec::new();
            let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
            rgb.write_with_encoder(JpegEncoder::new(&mut buf))
                .map_err(|source| encode_error(mime, source))?;
            Ok(buf)
        }
        ImageMimeType::Png => encode_png(img, CompressionType::Default),
        ImageMimeType::Gif | ImageMimeType::WebP => {
            let mut buf = Vec::new();
            DynamicImage::ImageRgba8(img.to_rgba8())
                .write_to(&mut Cursor::new(&mut buf), mime.image_format())
                .map_err(|source| encode_error(mime, source))?;
            Ok(buf)
        }
    }
}

fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>, ImageError> {
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(img.to_rgb8())
        .write_with_encoder(JpegEncoder::new_with_quality(&mut buf, quality))
        .map_err(|source| encode_error(ImageMimeType::Jpeg, source))?;
    Ok(buf)
}

fn encode_png(img: &DynamicImage, compression: CompressionType) -> Result<Vec<u8>, ImageError> {
    let mut buf = Vec::new();
    img.write_with_encoder(PngEncoder::new_with_quality(
        &mut buf,
        compression,
        PngFilter::Adaptive,
    ))
    .map_err(|source| encode_error(ImageMimeType::Png, source))?;
    Ok(buf)
}

fn encode_error(mime: ImageMimeType, source: image::ImageError) -> ImageError {
    ImageError::Encode {
        format: mime.as_str().to_string(),
        source,
    }
}
