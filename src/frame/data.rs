//! One image plane: pixel storage plus its descriptor.

use crate::envelope::PixelStore;
use crate::error::Result;
use crate::frame::codec;
use crate::frame::meta::{EncodeType, FrameMetaData};
use std::fmt;

/// A single plane inside a [`crate::frame::Frame`].
///
/// Owns its pixel storage exclusively; the storage's `Drop` is the release
/// hook and fires exactly once — when the plane is destroyed, when its
/// storage is replaced via `set_data`, or when serialization moves the
/// storage into a blob.
pub struct FrameData {
    store: Box<dyn PixelStore>,
    meta: FrameMetaData,
}

impl FrameData {
    pub fn new(store: Box<dyn PixelStore>, meta: FrameMetaData) -> Self {
        Self { store, meta }
    }

    pub fn meta(&self) -> &FrameMetaData {
        &self.meta
    }

    pub fn meta_mut(&mut self) -> &mut FrameMetaData {
        &mut self.meta
    }

    pub fn bytes(&self) -> &[u8] {
        self.store.bytes()
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        self.store.bytes_mut()
    }

    /// Current byte length of the plane's storage. Equals
    /// `width * height * channels` for raw planes and the encoded length
    /// after [`FrameData::encode`] has run.
    pub fn size(&self) -> usize {
        self.store.bytes().len()
    }

    /// Swap in new storage, returning the old storage to the caller.
    pub fn replace_store(&mut self, store: Box<dyn PixelStore>) -> Box<dyn PixelStore> {
        std::mem::replace(&mut self.store, store)
    }

    /// Tear the plane apart into its storage and descriptor.
    pub fn into_parts(self) -> (Box<dyn PixelStore>, FrameMetaData) {
        (self.store, self.meta)
    }

    /// Encode the plane in place according to its descriptor.
    ///
    /// No-op when the encode type is `None`. On success the raw storage is
    /// dropped and replaced by the encoded bytes; the descriptor keeps its
    /// pre-encode dimensions.
    pub fn encode(&mut self) -> Result<()> {
        if self.meta.encode_type() == EncodeType::None {
            return Ok(());
        }

        tracing::debug!(
            encoding = %self.meta.encode_type(),
            level = self.meta.encode_level(),
            "encoding plane"
        );
        let encoded = codec::encode(
            self.meta.width(),
            self.meta.height(),
            self.meta.channels(),
            self.store.bytes(),
            self.meta.encode_type(),
            self.meta.encode_level(),
        )?;
        self.store = Box::new(encoded);
        Ok(())
    }
}

impl fmt::Debug for FrameData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameData")
            .field("meta", &self.meta)
            .field("size", &self.size())
            .finish()
    }
}
