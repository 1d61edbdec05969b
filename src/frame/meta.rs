//! Per-plane descriptor: dimensions, correlation handle, and encoding.

use crate::error::{FramePipeError, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of random bytes in a generated image handle (two hex chars each).
pub const IMG_HANDLE_BYTES: usize = 5;

/// Encoding applied to a plane when the frame is serialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EncodeType {
    /// Raw pixels, no encoding.
    #[default]
    None,
    Jpeg,
    Png,
}

impl EncodeType {
    /// The wire string for this encoding, or `None` for unencoded planes.
    pub fn wire_str(&self) -> Option<&'static str> {
        match self {
            EncodeType::None => None,
            EncodeType::Jpeg => Some("jpeg"),
            EncodeType::Png => Some("png"),
        }
    }

    /// Parse the wire string form. Fails `UnknownEncoding` for anything
    /// other than "jpeg" or "png".
    pub fn from_wire_str(s: &str) -> Result<Self> {
        match s {
            "jpeg" => Ok(EncodeType::Jpeg),
            "png" => Ok(EncodeType::Png),
            other => Err(FramePipeError::UnknownEncoding(other.to_string())),
        }
    }
}

impl fmt::Display for EncodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodeType::None => write!(f, "none"),
            EncodeType::Jpeg => write!(f, "jpeg"),
            EncodeType::Png => write!(f, "png"),
        }
    }
}

/// Check that the encoding level is valid for the encoding type.
///
/// JPEG quality runs 0..=100, PNG compression 0..=9; `None` ignores the
/// level entirely.
pub fn verify_encoding_level(encode_type: EncodeType, encode_level: i64) -> bool {
    match encode_type {
        EncodeType::Jpeg => (0..=100).contains(&encode_level),
        EncodeType::Png => (0..=9).contains(&encode_level),
        EncodeType::None => true,
    }
}

/// Generate a short random lowercase-hex correlation id.
///
/// Uniformly distributed but not cryptographic; uniqueness across a
/// process is not guaranteed.
pub fn generate_img_handle() -> String {
    let mut rng = rand::thread_rng();
    let mut handle = String::with_capacity(IMG_HANDLE_BYTES * 2);
    for _ in 0..IMG_HANDLE_BYTES {
        let byte: u8 = rng.gen();
        handle.push_str(&format!("{:02x}", byte));
    }
    handle
}

/// Descriptor for a single image plane.
///
/// The `img_handle` is assigned when the plane is created and immutable
/// thereafter; a plane deserialized from an envelope that never carried a
/// handle has none, and re-serializing keeps it absent. The remaining
/// fields mirror what the envelope carries for this plane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameMetaData {
    img_handle: Option<String>,
    width: u32,
    height: u32,
    channels: u32,
    encode_type: EncodeType,
    encode_level: i64,
}

impl FrameMetaData {
    /// Create a descriptor with a freshly generated `img_handle`.
    pub fn new(
        width: u32,
        height: u32,
        channels: u32,
        encode_type: EncodeType,
        encode_level: i64,
    ) -> Result<Self> {
        Self::with_handle(
            Some(generate_img_handle()),
            width,
            height,
            channels,
            encode_type,
            encode_level,
        )
    }

    /// Create a descriptor restoring a deserialized handle (or its absence).
    pub fn with_handle(
        img_handle: Option<String>,
        width: u32,
        height: u32,
        channels: u32,
        encode_type: EncodeType,
        encode_level: i64,
    ) -> Result<Self> {
        if !verify_encoding_level(encode_type, encode_level) {
            return Err(FramePipeError::InvalidEncoding {
                encode_type: encode_type.to_string(),
                level: encode_level,
            });
        }
        Ok(Self {
            img_handle,
            width,
            height,
            channels,
            encode_type,
            encode_level,
        })
    }

    pub fn img_handle(&self) -> Option<&str> {
        self.img_handle.as_deref()
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u32 {
        self.channels
    }

    pub fn encode_type(&self) -> EncodeType {
        self.encode_type
    }

    pub fn encode_level(&self) -> i64 {
        self.encode_level
    }

    /// Raw byte length of a plane with these dimensions.
    pub fn raw_len(&self) -> usize {
        self.width as usize * self.height as usize * self.channels as usize
    }

    pub fn set_width(&mut self, width: u32) {
        self.width = width;
    }

    pub fn set_height(&mut self, height: u32) {
        self.height = height;
    }

    pub fn set_channels(&mut self, channels: u32) {
        self.channels = channels;
    }

    /// Update the encoding, revalidating the level against the new type.
    pub fn set_encoding(&mut self, encode_type: EncodeType, encode_level: i64) -> Result<()> {
        if !verify_encoding_level(encode_type, encode_level) {
            return Err(FramePipeError::InvalidEncoding {
                encode_type: encode_type.to_string(),
                level: encode_level,
            });
        }
        self.encode_type = encode_type;
        self.encode_level = encode_level;
        Ok(())
    }
}
