//! Decode and encode seam over the `image` crate.
//!
//! The [`ImageCodec`] trait keeps the render path codec-agnostic; the
//! production implementation is [`ImageRsCodec`]. Bytes in, bytes out:
//! sources may arrive from disk or HTTP, and encoded output goes to the
//! cache file and optionally into a base64 data URI, so neither side touches
//! paths.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, WebP, GIF) | `image` crate (pure Rust decoders) |
//! | Encode → JPEG | `image::codecs::jpeg::JpegEncoder` (quality applied) |
//! | Encode → WebP | `image::codecs::webp::WebPEncoder` (lossless) |
//! | Encode → PNG / GIF | `DynamicImage::write_to` |
//! | Format sniffing | `image::guess_format` |
//!
//! JPEG cannot carry alpha: the encoder flattens the buffer over the
//! request's background color first. The pure-Rust WebP encoder is
//! lossless-only, so quality only affects JPEG output.

use crate::color::Color;
use crate::request::{OutputFormat, Quality};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::webp::WebPEncoder;
use image::{DynamicImage, ImageFormat, ImageReader, RgbImage, RgbaImage};
use std::io::Cursor;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("decode failed: {0}")]
    Decode(String),
    #[error("encode failed: {0}")]
    Encode(String),
}

/// Trait for image decode/encode backends.
///
/// `Sync` so a single codec can serve rayon's batch renders.
pub trait ImageCodec: Send + Sync {
    /// Decode an image from raw bytes, sniffing the container format.
    fn decode(&self, bytes: &[u8]) -> Result<DynamicImage, CodecError>;

    /// Encode a buffer into `format`. `quality` applies to lossy formats;
    /// `background` is what alpha gets flattened over when the format cannot
    /// keep it.
    fn encode(
        &self,
        image: &RgbaImage,
        format: OutputFormat,
        quality: Quality,
        background: Color,
    ) -> Result<Vec<u8>, CodecError>;
}

/// Identify the container format of raw bytes, if it is one we can output.
pub fn sniff_format(bytes: &[u8]) -> Option<OutputFormat> {
    match image::guess_format(bytes).ok()? {
        ImageFormat::Jpeg => Some(OutputFormat::Jpeg),
        ImageFormat::Png => Some(OutputFormat::Png),
        ImageFormat::WebP => Some(OutputFormat::Webp),
        ImageFormat::Gif => Some(OutputFormat::Gif),
        _ => None,
    }
}

/// Production codec backed by the `image` crate.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct ImageRsCodec;

impl ImageRsCodec {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ImageRsCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageCodec for ImageRsCodec {
    fn decode(&self, bytes: &[u8]) -> Result<DynamicImage, CodecError> {
        ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(CodecError::Io)?
            .decode()
            .map_err(|e| CodecError::Decode(e.to_string()))
    }

    fn encode(
        &self,
        image: &RgbaImage,
        format: OutputFormat,
        quality: Quality,
        background: Color,
    ) -> Result<Vec<u8>, CodecError> {
        let mut buf = Vec::new();
        match format {
            OutputFormat::Jpeg => {
                let flat = flatten_over(image, background);
                let encoder = JpegEncoder::new_with_quality(&mut buf, quality.value() as u8);
                flat.write_with_encoder(encoder)
                    .map_err(|e| CodecError::Encode(format!("JPEG: {e}")))?;
            }
            OutputFormat::Webp => {
                let encoder = WebPEncoder::new_lossless(&mut buf);
                image
                    .write_with_encoder(encoder)
                    .map_err(|e| CodecError::Encode(format!("WebP: {e}")))?;
            }
            OutputFormat::Png => {
                DynamicImage::ImageRgba8(image.clone())
                    .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
                    .map_err(|e| CodecError::Encode(format!("PNG: {e}")))?;
            }
            OutputFormat::Gif => {
                DynamicImage::ImageRgba8(image.clone())
                    .write_to(&mut Cursor::new(&mut buf), ImageFormat::Gif)
                    .map_err(|e| CodecError::Encode(format!("GIF: {e}")))?;
            }
        }
        Ok(buf)
    }
}

/// Composite over an opaque background, dropping the alpha channel.
fn flatten_over(image: &RgbaImage, background: Color) -> RgbImage {
    let [br, bg, bb, _] = background.channels();
    let mut out = RgbImage::new(image.width(), image.height());
    for (src, dst) in image.pixels().zip(out.pixels_mut()) {
        let a = src[3] as u32;
        let inv = 255 - a;
        dst[0] = ((src[0] as u32 * a + br as u32 * inv + 127) / 255) as u8;
        dst[1] = ((src[1] as u32 * a + bg as u32 * inv + 127) / 255) as u8;
        dst[2] = ((src[2] as u32 * a + bb as u32 * inv + 127) / 255) as u8;
    }
    out
}
