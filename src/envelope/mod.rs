//! Wire envelope: the typed key-value metadata store a frame travels in.
//!
//! An [`Envelope`] carries JSON-shaped keyed fields (integers, floats,
//! strings, arrays, objects) plus a single distinguished *unkeyed* blob
//! slot holding the frame's pixel payload — one [`Blob`] for a
//! single-plane frame, an ordered list of them for a multi-plane frame.
//!
//! The keyed side is a `serde_json` map so envelope metadata round-trips
//! through the surrounding bus layer without translation.

pub mod blob;

pub use blob::{Blob, PixelStore};

use crate::error::{FramePipeError, Result};
use serde_json::{Map, Value};

/// The envelope's unkeyed payload slot.
#[derive(Debug)]
pub enum BlobSet {
    /// Single-plane frame payload.
    Single(Blob),
    /// Multi-plane frame payload, in plane order.
    Multi(Vec<Blob>),
}

impl BlobSet {
    /// Number of blobs in the slot.
    pub fn count(&self) -> usize {
        match self {
            BlobSet::Single(_) => 1,
            BlobSet::Multi(blobs) => blobs.len(),
        }
    }
}

/// Typed key-value metadata store with an optional unkeyed blob slot.
#[derive(Debug, Default)]
pub struct Envelope {
    fields: Map<String, Value>,
    blob: Option<BlobSet>,
}

impl Envelope {
    /// Create an empty envelope.
    pub fn new() -> Self {
        Self::default()
    }

    // ── Keyed fields ──

    /// Put a value under a key, replacing any previous value.
    pub fn put(&mut self, key: impl Into<String>, value: Value) {
        self.fields.insert(key.into(), value);
    }

    /// Get a value by key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Get a mutable value by key.
    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.fields.get_mut(key)
    }

    /// Remove a value by key, returning it if present.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.fields.remove(key)
    }

    /// Whether a key is present.
    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// The keyed fields as a JSON map.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Mutable access to the keyed fields.
    pub fn fields_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.fields
    }

    // ── Typed getters ──

    /// Get a required integer field.
    pub fn get_i64(&self, key: &str) -> Result<i64> {
        match self.fields.get(key) {
            None => Err(FramePipeError::MissingField(key.to_string())),
            Some(Value::Number(n)) => n.as_i64().ok_or(FramePipeError::WrongType {
                key: key.to_string(),
                expected: "an integer",
            }),
            Some(_) => Err(FramePipeError::WrongType {
                key: key.to_string(),
                expected: "an integer",
            }),
        }
    }

    /// Get an optional integer field; `Ok(None)` when absent.
    pub fn try_i64(&self, key: &str) -> Result<Option<i64>> {
        match self.fields.get(key) {
            None => Ok(None),
            Some(_) => self.get_i64(key).map(Some),
        }
    }

    /// Get a required string field.
    pub fn get_str(&self, key: &str) -> Result<&str> {
        match self.fields.get(key) {
            None => Err(FramePipeError::MissingField(key.to_string())),
            Some(Value::String(s)) => Ok(s),
            Some(_) => Err(FramePipeError::WrongType {
                key: key.to_string(),
                expected: "a string",
            }),
        }
    }

    /// Get an optional string field; `Ok(None)` when absent.
    pub fn try_str(&self, key: &str) -> Result<Option<&str>> {
        match self.fields.get(key) {
            None => Ok(None),
            Some(_) => self.get_str(key).map(Some),
        }
    }

    /// Get a required array field.
    pub fn get_array(&self, key: &str) -> Result<&Vec<Value>> {
        match self.fields.get(key) {
            None => Err(FramePipeError::MissingField(key.to_string())),
            Some(Value::Array(items)) => Ok(items),
            Some(_) => Err(FramePipeError::WrongType {
                key: key.to_string(),
                expected: "an array",
            }),
        }
    }

    /// Get a required array field mutably.
    pub fn get_array_mut(&mut self, key: &str) -> Result<&mut Vec<Value>> {
        match self.fields.get_mut(key) {
            None => Err(FramePipeError::MissingField(key.to_string())),
            Some(Value::Array(items)) => Ok(items),
            Some(_) => Err(FramePipeError::WrongType {
                key: key.to_string(),
                expected: "an array",
            }),
        }
    }

    // ── Object fields ──

    /// Get a field inside an object-valued key.
    pub fn object_get(&self, key: &str, field: &str) -> Result<&Value> {
        match self.fields.get(key) {
            None => Err(FramePipeError::MissingField(key.to_string())),
            Some(Value::Object(map)) => map
                .get(field)
                .ok_or_else(|| FramePipeError::MissingField(format!("{key}.{field}"))),
            Some(_) => Err(FramePipeError::WrongType {
                key: key.to_string(),
                expected: "an object",
            }),
        }
    }

    /// Put a field inside an object-valued key, creating the object when
    /// the key is absent.
    pub fn object_put(&mut self, key: &str, field: impl Into<String>, value: Value) -> Result<()> {
        let slot = self
            .fields
            .entry(key.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        match slot {
            Value::Object(map) => {
                map.insert(field.into(), value);
                Ok(())
            }
            _ => Err(FramePipeError::WrongType {
                key: key.to_string(),
                expected: "an object",
            }),
        }
    }

    /// Remove a field from an object-valued key, returning it if present.
    pub fn object_remove(&mut self, key: &str, field: &str) -> Result<Option<Value>> {
        match self.fields.get_mut(key) {
            None => Ok(None),
            Some(Value::Object(map)) => Ok(map.remove(field)),
            Some(_) => Err(FramePipeError::WrongType {
                key: key.to_string(),
                expected: "an object",
            }),
        }
    }

    // ── Blob slot ──

    /// Attach the unkeyed blob payload. At most one blob slot may exist.
    pub fn put_blob(&mut self, set: BlobSet) -> Result<()> {
        if self.blob.is_some() {
            return Err(FramePipeError::Envelope(
                "envelope already carries a blob payload".to_string(),
            ));
        }
        self.blob = Some(set);
        Ok(())
    }

    /// Detach and return the blob payload, if any.
    pub fn take_blob(&mut self) -> Option<BlobSet> {
        self.blob.take()
    }

    /// Borrow the blob payload, if any.
    pub fn blob(&self) -> Option<&BlobSet> {
        self.blob.as_ref()
    }

    /// Whether the envelope carries a blob payload.
    pub fn has_blob(&self) -> bool {
        self.blob.is_some()
    }
}
