//! Image normalisation: raw upload bytes → bounded, embeddable image.
//!
//! Phone photos arrive at 4000+ px wide and several megabytes each. Embedding
//! them as-is would make a ten-observation report too heavy to email, so every
//! photo is decoded, downscaled to the configured pixel budget and re-encoded
//! as a baseline JPEG that the serialiser can embed with `DCTDecode` directly.
//!
//! ## Format detection
//!
//! The container format is sniffed from the magic bytes. The MIME hint sent
//! by the client is only compared against the sniffed format for logging;
//! camera apps routinely label HEIC-converted JPEGs as `image/png` and the
//! other way round.
//!
//! ## Lossless path
//!
//! The drawn signature is a small PNG with transparency. Re-encoding it as
//! JPEG would blacken the background and smear the strokes, so
//! [`normalize_lossless`] only validates it and keeps the original bytes.

use crate::config::ImageBudget;
use crate::error::{PhotoError, PhotoSlot};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageDecoder, ImageReader, RgbImage};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Cursor;
use tracing::debug;

const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G'];
const JPEG_MAGIC: &[u8] = &[0xFF, 0xD8, 0xFF];

/// Container formats the report can embed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ImageFormat {
    Png,
    Jpeg,
}

impl ImageFormat {
    /// Detect the format from the leading bytes.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(PNG_MAGIC) {
            Some(ImageFormat::Png)
        } else if bytes.starts_with(JPEG_MAGIC) {
            Some(ImageFormat::Jpeg)
        } else {
            None
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
        }
    }

    fn codec(self) -> image::ImageFormat {
        match self {
            ImageFormat::Png => image::ImageFormat::Png,
            ImageFormat::Jpeg => image::ImageFormat::Jpeg,
        }
    }
}

/// An image ready to be embedded in the PDF.
#[derive(Clone, PartialEq)]
pub struct NormalizedImage {
    /// Encoded bytes in `format`.
    pub data: Vec<u8>,
    pub format: ImageFormat,
    pub width_px: u32,
    pub height_px: u32,
}

impl NormalizedImage {
    /// Width over height. Degenerate images report a square ratio.
    pub fn aspect_ratio(&self) -> f32 {
        if self.width_px == 0 || self.height_px == 0 {
            1.0
        } else {
            self.width_px as f32 / self.height_px as f32
        }
    }
}

impl fmt::Debug for NormalizedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NormalizedImage")
            .field("format", &self.format)
            .field("width_px", &self.width_px)
            .field("height_px", &self.height_px)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// Scale factor applied to an image `src_width` pixels wide.
///
/// The smaller of the width budget and the configured ceiling, so images
/// narrower than the budget are never enlarged.
pub fn scale_factor(src_width: u32, budget: &ImageBudget) -> f32 {
    if src_width == 0 {
        return 1.0;
    }
    let to_width = budget.max_width_px as f32 / src_width as f32;
    to_width.min(budget.max_scale_factor)
}

/// Output dimensions for a `width × height` source under `budget`.
pub fn target_dimensions(width: u32, height: u32, budget: &ImageBudget) -> (u32, u32) {
    let scale = scale_factor(width, budget);
    if scale >= 1.0 {
        return (width, height);
    }
    let w = ((width as f32 * scale).round() as u32).max(1);
    let h = ((height as f32 * scale).round() as u32).max(1);
    (w, h)
}

/// Decode, downscale and re-encode a photo as JPEG.
///
/// EXIF orientation is applied before measuring, so a portrait photo shot
/// with a sideways sensor comes out portrait. Transparent pixels are
/// flattened onto white.
pub fn normalize(
    raw: &[u8],
    mime_hint: Option<&str>,
    budget: &ImageBudget,
    slot: PhotoSlot,
) -> Result<NormalizedImage, PhotoError> {
    let format = sniff_or_reject(raw, slot)?;
    if let Some(hint) = mime_hint {
        if !hint.eq_ignore_ascii_case(format.mime_type()) {
            debug!(
                "{}: MIME hint '{}' disagrees with content ({}), using content",
                slot,
                hint,
                format.mime_type()
            );
        }
    }

    let img = decode_oriented(raw, format, slot)?;
    let (src_w, src_h) = (img.width(), img.height());
    let (dst_w, dst_h) = target_dimensions(src_w, src_h, budget);

    let img = if (dst_w, dst_h) == (src_w, src_h) {
        img
    } else {
        img.resize_exact(dst_w, dst_h, FilterType::Triangle)
    };

    let rgb = flatten_onto_white(img);
    let mut data = Vec::new();
    JpegEncoder::new_with_quality(&mut data, budget.jpeg_quality)
        .encode_image(&rgb)
        .map_err(|e| PhotoError::Encode {
            slot,
            detail: e.to_string(),
        })?;

    debug!(
        "{}: {}x{} {:?} ({} B) → {}x{} JPEG q{} ({} B)",
        slot,
        src_w,
        src_h,
        format,
        raw.len(),
        dst_w,
        dst_h,
        budget.jpeg_quality,
        data.len()
    );

    Ok(NormalizedImage {
        data,
        format: ImageFormat::Jpeg,
        width_px: dst_w,
        height_px: dst_h,
    })
}

/// Validate a PNG and keep its bytes untouched.
///
/// Inputs that are not PNG are not lossless to begin with; they go through
/// [`normalize`] with `fallback` instead.
pub fn normalize_lossless(
    raw: &[u8],
    fallback: &ImageBudget,
    slot: PhotoSlot,
) -> Result<NormalizedImage, PhotoError> {
    match sniff_or_reject(raw, slot)? {
        ImageFormat::Png => {
            let img = image::load_from_memory_with_format(raw, image::ImageFormat::Png)
                .map_err(|e| PhotoError::Decode {
                    slot,
                    detail: e.to_string(),
                })?;
            Ok(NormalizedImage {
                data: raw.to_vec(),
                format: ImageFormat::Png,
                width_px: img.width(),
                height_px: img.height(),
            })
        }
        ImageFormat::Jpeg => normalize(raw, Some("image/jpeg"), fallback, slot),
    }
}

fn sniff_or_reject(raw: &[u8], slot: PhotoSlot) -> Result<ImageFormat, PhotoError> {
    ImageFormat::sniff(raw).ok_or_else(|| PhotoError::Unsupported {
        slot,
        magic: raw.iter().take(8).copied().collect(),
    })
}

fn decode_oriented(
    raw: &[u8],
    format: ImageFormat,
    slot: PhotoSlot,
) -> Result<DynamicImage, PhotoError> {
    let decode_err = |e: image::ImageError| PhotoError::Decode {
        slot,
        detail: e.to_string(),
    };
    let mut decoder = ImageReader::with_format(Cursor::new(raw), format.codec())
        .into_decoder()
        .map_err(decode_err)?;
    let orientation = decoder.orientation().map_err(decode_err)?;
    let mut img = DynamicImage::from_decoder(decoder).map_err(decode_err)?;
    img.apply_orientation(orientation);
    Ok(img)
}

fn flatten_onto_white(img: DynamicImage) -> RgbImage {
    if !img.color().has_alpha() {
        return img.to_rgb8();
    }
    let rgba = img.to_rgba8();
    let mut out = RgbImage::new(rgba.width(), rgba.height());
    for (src, dst) in rgba.pixels().zip(out.pixels_mut()) {
        let a = u16::from(src[3]);
        for c in 0..3 {
            let v = u16::from(src[c]) * a + 255 * (255 - a);
            dst[c] = (v / 255) as u8;
        }
    }
    out
}
