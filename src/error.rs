//! Error taxonomy for the frame model, the UDF loader, and the manager.
//!
//! One flat enum covers the whole crate: frame mutation failures carry
//! the offending index or level so callers can report them without
//! re-deriving state, and loader/script failures carry the resolved name
//! or the interpreter's message. Rhai and IO errors convert via `From`,
//! so `?` works directly on codec, filesystem, and script-engine calls.

use thiserror::Error;

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, FramePipeError>;

/// Everything that can go wrong inside the pipeline core.
#[derive(Error, Debug)]
pub enum FramePipeError {
    /// Encoding level outside the valid range for the encoding type
    #[error("Invalid encoding level {level} for {encode_type}")]
    InvalidEncoding { encode_type: String, level: i64 },

    /// Plane index outside `[0, count)`
    #[error("Plane index {index} out of range (frame has {count} planes)")]
    IndexOutOfRange { index: usize, count: usize },

    /// Mutating or reading call on a frame that has been serialized
    #[error("Operation not permitted after frame serialization")]
    AfterSerialize,

    /// Second call to `serialize()`
    #[error("Frame has already been serialized")]
    AlreadySerialized,

    /// `serialize()` on a frame with no planes
    #[error("Cannot serialize a frame with no planes")]
    EmptyFrame,

    /// Required envelope field absent during deserialization
    #[error("Missing required field: {0}")]
    MissingField(String),

    /// Envelope field present with the wrong type
    #[error("Field \"{key}\" must be {expected}")]
    WrongType { key: String, expected: &'static str },

    /// `encoding_type` string not one of "jpeg" / "png"
    #[error("Unknown encoding type: {0:?}")]
    UnknownEncoding(String),

    /// Underlying envelope put/get/remove failed
    #[error("Envelope error: {0}")]
    Envelope(String),

    /// Codec failed to encode a plane
    #[error("Encode failed: {0}")]
    EncodeFailed(String),

    /// Codec failed to decode a blob
    #[error("Decode failed: {0}")]
    DecodeFailed(String),

    /// Dynamic library or scripted module resolution failure
    #[error("Failed to load UDF: {0}")]
    LoadFailed(String),

    /// Script compilation or execution failure
    #[error("Script error: {0}")]
    Script(String),

    /// A UDF returned `Error` or raised
    #[error("UDF process error: {0}")]
    UdfProcess(String),

    /// Manager or UDF configuration rejected
    #[error("Configuration error: {0}")]
    Config(String),

    /// Filesystem failure while resolving or reading a UDF module
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<Box<rhai::EvalAltResult>> for FramePipeError {
    fn from(err: Box<rhai::EvalAltResult>) -> Self {
        FramePipeError::Script(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_error_names_the_bounds() {
        let err = FramePipeError::IndexOutOfRange { index: 3, count: 2 };
        assert_eq!(
            err.to_string(),
            "Plane index 3 out of range (frame has 2 planes)"
        );
    }

    #[test]
    fn encoding_error_names_type_and_level() {
        let err = FramePipeError::InvalidEncoding {
            encode_type: "jpeg".to_string(),
            level: 101,
        };
        assert!(err.to_string().contains("101"));
        assert!(err.to_string().contains("jpeg"));
    }

    #[test]
    fn rhai_errors_convert_through_question_mark() {
        fn eval() -> Result<i64> {
            let engine = rhai::Engine::new();
            let value = engine.eval::<i64>("1 +")?;
            Ok(value)
        }
        assert!(matches!(eval(), Err(FramePipeError::Script(_))));
    }

    #[test]
    fn io_errors_convert() {
        let err: FramePipeError =
            std::io::Error::new(std::io::ErrorKind::NotFound, "no module").into();
        assert!(matches!(err, FramePipeError::Io(_)));
        assert!(err.to_string().contains("no module"));
    }
}
