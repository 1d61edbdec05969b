//! JPEG/PNG plane codec.
//!
//! Thin wrapper over the `image` crate mapping the frame model's
//! `(width, height, channels, bytes)` planes onto encoder/decoder calls.
//! Supported channel counts are 1 (gray), 3 (RGB), and 4 (RGBA).

use crate::error::{FramePipeError, Result};
use crate::frame::meta::EncodeType;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{DynamicImage, ExtendedColorType, ImageEncoder};
use std::io::Cursor;

fn color_type(channels: u32) -> Result<ExtendedColorType> {
    match channels {
        1 => Ok(ExtendedColorType::L8),
        3 => Ok(ExtendedColorType::Rgb8),
        4 => Ok(ExtendedColorType::Rgba8),
        other => Err(FramePipeError::EncodeFailed(format!(
            "unsupported channel count: {}",
            other
        ))),
    }
}

/// Map a 0..=9 compression level onto the codec's compression tiers.
fn png_compression(level: i64) -> CompressionType {
    match level {
        0..=2 => CompressionType::Fast,
        3..=6 => CompressionType::Default,
        _ => CompressionType::Best,
    }
}

/// Encode a raw plane into JPEG or PNG bytes.
///
/// The level is the JPEG quality (0..=100) or the PNG compression level
/// (0..=9); callers validate the range via `verify_encoding_level` before
/// reaching this point.
pub fn encode(
    width: u32,
    height: u32,
    channels: u32,
    bytes: &[u8],
    encode_type: EncodeType,
    encode_level: i64,
) -> Result<Vec<u8>> {
    let expected = width as usize * height as usize * channels as usize;
    if bytes.len() != expected {
        return Err(FramePipeError::EncodeFailed(format!(
            "plane is {} bytes, expected {}x{}x{} = {}",
            bytes.len(),
            width,
            height,
            channels,
            expected
        )));
    }

    let color = color_type(channels)?;
    let mut out = Cursor::new(Vec::new());

    match encode_type {
        EncodeType::None => {
            return Err(FramePipeError::EncodeFailed(
                "encode called with EncodeType::None".to_string(),
            ))
        }
        EncodeType::Jpeg => {
            let encoder = JpegEncoder::new_with_quality(&mut out, encode_level as u8);
            encoder
                .write_image(bytes, width, height, color)
                .map_err(|e| FramePipeError::EncodeFailed(e.to_string()))?;
        }
        EncodeType::Png => {
            let encoder = PngEncoder::new_with_quality(
                &mut out,
                png_compression(encode_level),
                FilterType::Adaptive,
            );
            encoder
                .write_image(bytes, width, height, color)
                .map_err(|e| FramePipeError::EncodeFailed(e.to_string()))?;
        }
    }

    Ok(out.into_inner())
}

/// Decode an encoded blob back into `(width, height, channels, bytes)`.
///
/// The source's channel layout is preserved where the frame model can
/// express it (gray, RGB, RGBA); anything else converts to RGB.
pub fn decode(bytes: &[u8]) -> Result<(u32, u32, u32, Vec<u8>)> {
    let dyn_img = image::load_from_memory(bytes)
        .map_err(|e| FramePipeError::DecodeFailed(e.to_string()))?;

    let (width, height) = (dyn_img.width(), dyn_img.height());
    let (channels, raw) = match dyn_img {
        DynamicImage::ImageLuma8(img) => (1, img.into_raw()),
        DynamicImage::ImageRgb8(img) => (3, img.into_raw()),
        DynamicImage::ImageRgba8(img) => (4, img.into_raw()),
        other => (3, other.to_rgb8().into_raw()),
    };

    Ok((width, height, channels, raw))
}
