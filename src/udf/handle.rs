//! Uniform handle over the three UDF flavors.

use crate::frame::Frame;
use crate::udf::native::{NativeUdfHandle, RawUdfHandle};
use crate::udf::scripted::ScriptedUdfHandle;
use crate::udf::UdfRetCode;

/// One loaded UDF, whatever its implementation.
///
/// `process` is safe to call from multiple workers concurrently: the
/// dylib variants serialize on an internal lock, and the scripted variant
/// serializes on the global script runtime.
pub enum UdfHandle {
    /// Single-plane dylib UDF.
    Native(NativeUdfHandle),
    /// Multi-plane dylib UDF.
    Raw(RawUdfHandle),
    /// rhai module UDF.
    Scripted(ScriptedUdfHandle),
}

impl UdfHandle {
    pub fn name(&self) -> &str {
        match self {
            UdfHandle::Native(h) => h.name(),
            UdfHandle::Raw(h) => h.name(),
            UdfHandle::Scripted(h) => h.name(),
        }
    }

    /// Which flavor of UDF this handle wraps, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            UdfHandle::Native(_) => "native",
            UdfHandle::Raw(_) => "raw",
            UdfHandle::Scripted(_) => "scripted",
        }
    }

    /// Run the UDF over one frame.
    pub fn process(&self, frame: &mut Frame) -> UdfRetCode {
        match self {
            UdfHandle::Native(h) => h.process(frame),
            UdfHandle::Raw(h) => h.process(frame),
            UdfHandle::Scripted(h) => h.process(frame),
        }
    }
}

impl std::fmt::Debug for UdfHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UdfHandle")
            .field("name", &self.name())
            .field("kind", &self.kind())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scripting::builtins;
    use serde_json::json;

    #[test]
    fn test_dispatch_to_scripted() {
        let handle = UdfHandle::Scripted(
            ScriptedUdfHandle::from_source("drop", builtins::DROP_ALL, &json!({})).unwrap(),
        );
        assert_eq!(handle.kind(), "scripted");
        assert_eq!(handle.name(), "drop");

        let mut frame = Frame::new();
        frame
            .add_frame(
                Box::new(vec![1u8]),
                1,
                1,
                1,
                crate::frame::EncodeType::None,
                0,
            )
            .unwrap();
        assert_eq!(handle.process(&mut frame), UdfRetCode::DropFrame);
    }
}
