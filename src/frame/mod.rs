//! Multi-plane frame abstraction.
//!
//! A [`Frame`] carries one or more image planes plus a mutable metadata
//! [`Envelope`] and is the unit of work flowing through the UDF chain:
//! ingest constructs one, UDFs mutate it, and `serialize()` turns it back
//! into a wire envelope for publishing.
//!
//! # Envelope mirror
//!
//! The envelope always reflects the in-memory plane descriptors exactly.
//! Plane 0 lives at the envelope root (`width`, `height`, `channels`,
//! `img_handle`, and `encoding_type`/`encoding_level` when an encoding is
//! set); planes 1..N-1 live as objects of the same shape inside the
//! `additional_frames` array, which is created lazily when the second
//! plane is added.
//!
//! # Serialization is one-shot
//!
//! `serialize()` permanently consumes the frame's planes: each plane's
//! storage moves into an envelope blob and the returned envelope owns
//! everything. Afterwards only the dimension accessors and destruction
//! remain legal; `data()` fails and `meta_data()` returns `None`.

pub mod codec;
pub mod data;
pub mod meta;

pub use data::FrameData;
pub use meta::{generate_img_handle, verify_encoding_level, EncodeType, FrameMetaData};

use crate::envelope::{Blob, BlobSet, Envelope, PixelStore};
use crate::error::{FramePipeError, Result};
use serde_json::{Map, Value};

const KEY_WIDTH: &str = "width";
const KEY_HEIGHT: &str = "height";
const KEY_CHANNELS: &str = "channels";
const KEY_IMG_HANDLE: &str = "img_handle";
const KEY_ENC_TYPE: &str = "encoding_type";
const KEY_ENC_LEVEL: &str = "encoding_level";
const KEY_ADDITIONAL_FRAMES: &str = "additional_frames";

/// All descriptor keys, in the order they are written.
const DESCRIPTOR_KEYS: [&str; 6] = [
    KEY_IMG_HANDLE,
    KEY_WIDTH,
    KEY_HEIGHT,
    KEY_CHANNELS,
    KEY_ENC_TYPE,
    KEY_ENC_LEVEL,
];

/// Whether `key` is an envelope key the frame maintains itself.
pub(crate) fn is_reserved_key(key: &str) -> bool {
    DESCRIPTOR_KEYS.contains(&key) || key == KEY_ADDITIONAL_FRAMES
}

/// Ordered collection of image planes plus the wire metadata envelope.
pub struct Frame {
    planes: Vec<FrameData>,
    envelope: Envelope,
    /// Descriptors retained after serialization so dimension accessors
    /// keep working on the husk.
    retained: Vec<FrameMetaData>,
    serialized: bool,
}

impl Frame {
    /// Create an empty frame with a fresh envelope.
    pub fn new() -> Self {
        Self {
            planes: Vec::new(),
            envelope: Envelope::new(),
            retained: Vec::new(),
            serialized: false,
        }
    }

    // ── Descriptor mirror helpers ──

    /// Build the detached descriptor subtree for a plane.
    fn descriptor_map(meta: &FrameMetaData) -> Map<String, Value> {
        let mut map = Map::new();
        if let Some(handle) = meta.img_handle() {
            map.insert(KEY_IMG_HANDLE.to_string(), Value::from(handle));
        }
        map.insert(KEY_WIDTH.to_string(), Value::from(meta.width()));
        map.insert(KEY_HEIGHT.to_string(), Value::from(meta.height()));
        map.insert(KEY_CHANNELS.to_string(), Value::from(meta.channels()));
        if let Some(wire) = meta.encode_type().wire_str() {
            map.insert(KEY_ENC_TYPE.to_string(), Value::from(wire));
            map.insert(KEY_ENC_LEVEL.to_string(), Value::from(meta.encode_level()));
        }
        map
    }

    /// Rewrite the envelope descriptor for plane `index` from its
    /// in-memory metadata.
    fn write_descriptor(&mut self, index: usize) -> Result<()> {
        let staged = Self::descriptor_map(self.planes[index].meta());
        self.attach_descriptor(index, staged)
    }

    /// Attach a staged descriptor subtree for plane `index`. The subtree
    /// was built detached, so a failure here leaves the envelope with its
    /// previous descriptor intact (root keys are only cleared once the
    /// attach cannot fail).
    fn attach_descriptor(&mut self, index: usize, staged: Map<String, Value>) -> Result<()> {
        if index == 0 {
            for key in DESCRIPTOR_KEYS {
                self.envelope.remove(key);
            }
            for (key, value) in staged {
                self.envelope.put(key, value);
            }
        } else {
            let arr = self.envelope.get_array_mut(KEY_ADDITIONAL_FRAMES)?;
            let slot = arr.get_mut(index - 1).ok_or(FramePipeError::Envelope(
                "additional_frames shorter than plane list".to_string(),
            ))?;
            *slot = Value::Object(staged);
        }
        Ok(())
    }

    fn check_mutable(&self) -> Result<()> {
        if self.serialized {
            return Err(FramePipeError::AfterSerialize);
        }
        Ok(())
    }

    fn check_index(&self, index: usize) -> Result<()> {
        let count = self.frame_count();
        if index >= count {
            return Err(FramePipeError::IndexOutOfRange { index, count });
        }
        Ok(())
    }

    fn plane_meta(&self, index: usize) -> Result<&FrameMetaData> {
        self.check_index(index)?;
        if self.serialized {
            Ok(&self.retained[index])
        } else {
            Ok(self.planes[index].meta())
        }
    }

    // ── Mutation ──

    /// Append a plane to the frame.
    ///
    /// The first plane writes its descriptor into the envelope root;
    /// subsequent planes append an object to the `additional_frames`
    /// array, creating the array on the first such call. The write is
    /// staged: if anything fails, neither the plane list nor the envelope
    /// changes.
    #[allow(clippy::too_many_arguments)]
    pub fn add_frame(
        &mut self,
        store: Box<dyn PixelStore>,
        width: u32,
        height: u32,
        channels: u32,
        encode_type: EncodeType,
        encode_level: i64,
    ) -> Result<()> {
        self.check_mutable()?;

        let meta = FrameMetaData::new(width, height, channels, encode_type, encode_level)?;
        let staged = Self::descriptor_map(&meta);

        if self.planes.is_empty() {
            for (key, value) in staged {
                self.envelope.put(key, value);
            }
        } else {
            if !self.envelope.contains(KEY_ADDITIONAL_FRAMES) {
                self.envelope.put(KEY_ADDITIONAL_FRAMES, Value::Array(Vec::new()));
            }
            self.envelope
                .get_array_mut(KEY_ADDITIONAL_FRAMES)?
                .push(Value::Object(staged));
        }

        self.planes.push(FrameData::new(store, meta));
        tracing::debug!(planes = self.planes.len(), "added plane to frame");
        Ok(())
    }

    /// Replace plane `index`'s storage and dimensions.
    ///
    /// The encoding fields and the plane's `img_handle` carry over from
    /// the old descriptor. The previous storage is released after the
    /// replacement succeeds.
    pub fn set_data(
        &mut self,
        index: usize,
        store: Box<dyn PixelStore>,
        width: u32,
        height: u32,
        channels: u32,
    ) -> Result<()> {
        self.check_mutable()?;
        self.check_index(index)?;

        // Stage the new descriptor before touching the plane, so a failed
        // envelope write leaves the frame unchanged.
        let mut meta = self.planes[index].meta().clone();
        meta.set_width(width);
        meta.set_height(height);
        meta.set_channels(channels);
        let staged = Self::descriptor_map(&meta);
        self.attach_descriptor(index, staged)?;

        *self.planes[index].meta_mut() = meta;
        let old = self.planes[index].replace_store(store);
        drop(old);
        Ok(())
    }

    /// Update plane `index`'s encoding descriptor.
    ///
    /// Metadata only; the actual encode runs during `serialize()`.
    /// Switching to `None` removes the encoding keys from the envelope.
    pub fn set_encoding(
        &mut self,
        encode_type: EncodeType,
        encode_level: i64,
        index: usize,
    ) -> Result<()> {
        self.check_mutable()?;
        self.check_index(index)?;

        self.planes[index]
            .meta_mut()
            .set_encoding(encode_type, encode_level)?;
        self.write_descriptor(index)
    }

    // ── Accessors ──

    /// Number of planes. Callable in every state.
    pub fn frame_count(&self) -> usize {
        if self.serialized {
            self.retained.len()
        } else {
            self.planes.len()
        }
    }

    pub fn width(&self, index: usize) -> Result<u32> {
        Ok(self.plane_meta(index)?.width())
    }

    pub fn height(&self, index: usize) -> Result<u32> {
        Ok(self.plane_meta(index)?.height())
    }

    pub fn channels(&self, index: usize) -> Result<u32> {
        Ok(self.plane_meta(index)?.channels())
    }

    pub fn encode_type(&self, index: usize) -> Result<EncodeType> {
        Ok(self.plane_meta(index)?.encode_type())
    }

    pub fn encode_level(&self, index: usize) -> Result<i64> {
        Ok(self.plane_meta(index)?.encode_level())
    }

    pub fn img_handle(&self, index: usize) -> Result<Option<&str>> {
        Ok(self.plane_meta(index)?.img_handle())
    }

    /// Plane `index`'s bytes. Unavailable once serialized.
    pub fn data(&self, index: usize) -> Result<&[u8]> {
        self.check_mutable()?;
        self.check_index(index)?;
        Ok(self.planes[index].bytes())
    }

    /// Mutable view of plane `index`'s bytes. Unavailable once serialized.
    pub fn data_mut(&mut self, index: usize) -> Result<&mut [u8]> {
        self.check_mutable()?;
        self.check_index(index)?;
        Ok(self.planes[index].bytes_mut())
    }

    /// The frame's metadata envelope; `None` once serialized.
    pub fn meta_data(&self) -> Option<&Envelope> {
        if self.serialized {
            return None;
        }
        Some(&self.envelope)
    }

    /// Mutable metadata envelope; `None` once serialized.
    ///
    /// Descriptor keys are maintained by the frame — callers should treat
    /// them as read-only and use `set_data`/`set_encoding` instead.
    pub fn meta_data_mut(&mut self) -> Option<&mut Envelope> {
        if self.serialized {
            return None;
        }
        Some(&mut self.envelope)
    }

    /// Borrow one plane and the mutable envelope at the same time, for
    /// callers that hand both to a UDF in a single call.
    pub fn plane_and_meta_mut(&mut self, index: usize) -> Result<(&FrameData, &mut Envelope)> {
        self.check_mutable()?;
        self.check_index(index)?;
        Ok((&self.planes[index], &mut self.envelope))
    }

    // ── Serialization ──

    /// Serialize the frame into a wire envelope. One-shot and terminal.
    ///
    /// Each plane is encoded per its descriptor (no-op for `None`), then
    /// its storage moves into a blob: a single blob for one plane, a blob
    /// array in plane order otherwise. The returned envelope owns every
    /// buffer; the frame husk keeps only retained descriptors for the
    /// dimension accessors.
    ///
    /// A failure after encoding has begun leaves the frame unusable — the
    /// serialized flag is set before the envelope is touched and is never
    /// rolled back.
    pub fn serialize(&mut self) -> Result<Envelope> {
        if self.serialized {
            tracing::error!("frame has already been serialized");
            return Err(FramePipeError::AlreadySerialized);
        }
        if self.planes.is_empty() {
            return Err(FramePipeError::EmptyFrame);
        }

        self.serialized = true;
        // Retained descriptors are captured before encoding so the
        // dimension accessors stay valid even when an encode fails and
        // the frame ends up in its terminal unusable state.
        self.retained = self.planes.iter().map(|p| p.meta().clone()).collect();

        for plane in &mut self.planes {
            plane.encode()?;
        }

        let planes = std::mem::take(&mut self.planes);

        let mut blobs: Vec<Blob> = planes
            .into_iter()
            .map(|p| Blob::new(p.into_parts().0))
            .collect();

        let set = if blobs.len() == 1 {
            BlobSet::Single(blobs.remove(0))
        } else {
            BlobSet::Multi(blobs)
        };

        let mut envelope = std::mem::take(&mut self.envelope);
        envelope.put_blob(set)?;
        Ok(envelope)
    }

    /// Deserialization constructor: take ownership of an envelope's
    /// blob(s) and rebuild the frame around them.
    ///
    /// A single unkeyed blob yields one plane described by the envelope
    /// root; a blob array of N yields N planes, requiring an
    /// `additional_frames` array of N-1 descriptor objects. Encoded
    /// planes are decoded immediately: the plane becomes the decoded
    /// `(width, height, channels, pixels)` with no encoding, and the
    /// envelope descriptor is rewritten to match. Unencoded planes adopt
    /// the blob's buffer without copying.
    pub fn from_envelope(mut envelope: Envelope) -> Result<Self> {
        let set = envelope
            .take_blob()
            .ok_or_else(|| FramePipeError::MissingField("blob".to_string()))?;

        let blobs = match set {
            BlobSet::Single(blob) => vec![blob],
            BlobSet::Multi(blobs) => blobs,
        };
        let count = blobs.len();

        if count > 1 {
            let arr = envelope.get_array(KEY_ADDITIONAL_FRAMES)?;
            if arr.len() != count - 1 {
                return Err(FramePipeError::Envelope(format!(
                    "additional_frames has {} entries, expected {}",
                    arr.len(),
                    count - 1
                )));
            }
        }

        let mut frame = Self {
            planes: Vec::with_capacity(count),
            envelope,
            retained: Vec::new(),
            serialized: false,
        };

        for (i, blob) in blobs.into_iter().enumerate() {
            let meta = frame.read_descriptor(i)?;

            if meta.encode_type() == EncodeType::None {
                frame
                    .planes
                    .push(FrameData::new(blob.into_store(), meta));
            } else {
                tracing::debug!(plane = i, encoding = %meta.encode_type(), "decoding plane");
                let (width, height, channels, raw) = codec::decode(blob.bytes())?;
                let decoded_meta = FrameMetaData::with_handle(
                    meta.img_handle().map(str::to_string),
                    width,
                    height,
                    channels,
                    EncodeType::None,
                    0,
                )?;
                frame
                    .planes
                    .push(FrameData::new(Box::new(raw), decoded_meta));
                // Keep the envelope mirror exact: the plane is no longer
                // encoded and may have changed dimensions.
                frame.write_descriptor(i)?;
            }
        }

        Ok(frame)
    }

    /// Parse the descriptor for plane `index` from the envelope.
    fn read_descriptor(&self, index: usize) -> Result<FrameMetaData> {
        let (fields, key_prefix): (&Map<String, Value>, &str) = if index == 0 {
            (self.envelope.fields(), "")
        } else {
            let arr = self.envelope.get_array(KEY_ADDITIONAL_FRAMES)?;
            match arr.get(index - 1) {
                Some(Value::Object(map)) => (map, "additional_frames."),
                _ => {
                    return Err(FramePipeError::WrongType {
                        key: KEY_ADDITIONAL_FRAMES.to_string(),
                        expected: "an array of objects",
                    })
                }
            }
        };

        let get_u32 = |key: &str| -> Result<u32> {
            match fields.get(key) {
                None => Err(FramePipeError::MissingField(format!("{key_prefix}{key}"))),
                Some(Value::Number(n)) => n
                    .as_i64()
                    .and_then(|v| u32::try_from(v).ok())
                    .ok_or_else(|| FramePipeError::WrongType {
                        key: key.to_string(),
                        expected: "a positive integer",
                    }),
                Some(_) => Err(FramePipeError::WrongType {
                    key: key.to_string(),
                    expected: "a positive integer",
                }),
            }
        };

        let width = get_u32(KEY_WIDTH)?;
        let height = get_u32(KEY_HEIGHT)?;
        let channels = get_u32(KEY_CHANNELS)?;

        let img_handle = match fields.get(KEY_IMG_HANDLE) {
            None => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(_) => {
                return Err(FramePipeError::WrongType {
                    key: KEY_IMG_HANDLE.to_string(),
                    expected: "a string",
                })
            }
        };

        let (encode_type, encode_level) = match fields.get(KEY_ENC_TYPE) {
            None => (EncodeType::None, 0),
            Some(Value::String(s)) => {
                let enc = EncodeType::from_wire_str(s)?;
                let level = match fields.get(KEY_ENC_LEVEL) {
                    None => {
                        return Err(FramePipeError::MissingField(format!(
                            "{key_prefix}{KEY_ENC_LEVEL}"
                        )))
                    }
                    Some(Value::Number(n)) => {
                        n.as_i64().ok_or_else(|| FramePipeError::WrongType {
                            key: KEY_ENC_LEVEL.to_string(),
                            expected: "an integer",
                        })?
                    }
                    Some(_) => {
                        return Err(FramePipeError::WrongType {
                            key: KEY_ENC_LEVEL.to_string(),
                            expected: "an integer",
                        })
                    }
                };
                (enc, level)
            }
            Some(_) => {
                return Err(FramePipeError::WrongType {
                    key: KEY_ENC_TYPE.to_string(),
                    expected: "a string",
                })
            }
        };

        FrameMetaData::with_handle(img_handle, width, height, channels, encode_type, encode_level)
    }
}

impl Default for Frame {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("planes", &self.frame_count())
            .field("serialized", &self.serialized)
            .finish()
    }
}
