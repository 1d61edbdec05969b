//! Dynamic-library UDF handles.
//!
//! A native UDF is a `cdylib` exporting one of two constructor symbols:
//!
//! - `initialize_raw_udf(config) -> Box<dyn RawUdf>` — the UDF works on
//!   the whole multi-plane [`Frame`].
//! - `initialize_udf(config) -> Box<dyn PlaneUdf>` — the UDF works on a
//!   borrowed view of plane 0 and may hand back a replacement buffer.
//!
//! The loader probes for the raw symbol first (fixed order; a library
//! exporting both is treated as raw). The plugin's code lives inside the
//! loaded library, so each handle keeps its [`Library`] alive for as long
//! as the boxed UDF exists.

use crate::envelope::Envelope;
use crate::frame::Frame;
use crate::udf::UdfRetCode;
use libloading::Library;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Mutex;

/// Symbol name for multi-plane (raw) UDF constructors. Probed first.
pub const RAW_UDF_SYMBOL: &[u8] = b"initialize_raw_udf";

/// Symbol name for single-plane UDF constructors.
pub const PLANE_UDF_SYMBOL: &[u8] = b"initialize_udf";

/// Constructor signature exported by raw UDF libraries.
pub type RawUdfConstructor = fn(&serde_json::Value) -> Box<dyn RawUdf>;

/// Constructor signature exported by plane UDF libraries.
pub type PlaneUdfConstructor = fn(&serde_json::Value) -> Box<dyn PlaneUdf>;

/// Borrowed single-plane view handed to a [`PlaneUdf`].
#[derive(Debug, Clone, Copy)]
pub struct PlaneView<'a> {
    pub width: u32,
    pub height: u32,
    pub channels: u32,
    pub bytes: &'a [u8],
}

/// Replacement plane produced by a [`PlaneUdf`]. The buffer's ownership
/// transfers into the frame when the handle applies it.
#[derive(Debug)]
pub struct PlaneBuf {
    pub width: u32,
    pub height: u32,
    pub channels: u32,
    pub bytes: Vec<u8>,
}

/// A multi-plane UDF implementation loaded from a dynamic library.
pub trait RawUdf: Send {
    fn process(&mut self, frame: &mut Frame) -> UdfRetCode;
}

/// A single-plane UDF implementation loaded from a dynamic library.
///
/// Writing a replacement into `output` counts as modifying the frame; the
/// handle applies it to plane 0 and reports `FrameModified`. Leaving
/// `output` empty means the input buffer was used as-is.
pub trait PlaneUdf: Send {
    fn process(
        &mut self,
        input: PlaneView<'_>,
        output: &mut Option<PlaneBuf>,
        meta: &mut Envelope,
    ) -> UdfRetCode;
}

/// Handle around a loaded single-plane UDF.
pub struct NativeUdfHandle {
    name: String,
    // The UDF must drop before the library that contains its code;
    // field order is load-bearing.
    udf: Mutex<Box<dyn PlaneUdf>>,
    _lib: Option<Library>,
}

impl NativeUdfHandle {
    pub(crate) fn new(name: impl Into<String>, lib: Option<Library>, udf: Box<dyn PlaneUdf>) -> Self {
        Self {
            name: name.into(),
            udf: Mutex::new(udf),
            _lib: lib,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run the UDF over plane 0.
    pub fn process(&self, frame: &mut Frame) -> UdfRetCode {
        let mut output = None;
        let ret = {
            let (plane, meta) = match frame.plane_and_meta_mut(0) {
                Ok(split) => split,
                Err(e) => {
                    tracing::error!(udf = %self.name, error = %e, "frame has no processable plane");
                    return UdfRetCode::Error;
                }
            };
            let view = PlaneView {
                width: plane.meta().width(),
                height: plane.meta().height(),
                channels: plane.meta().channels(),
                bytes: plane.bytes(),
            };

            let mut udf = match self.udf.lock() {
                Ok(udf) => udf,
                Err(_) => {
                    tracing::error!(udf = %self.name, "UDF state poisoned by an earlier panic");
                    return UdfRetCode::Error;
                }
            };
            match catch_unwind(AssertUnwindSafe(|| udf.process(view, &mut output, meta))) {
                Ok(ret) => ret,
                Err(_) => {
                    tracing::error!(udf = %self.name, "panic in UDF process()");
                    return UdfRetCode::Error;
                }
            }
        };

        if ret == UdfRetCode::Error {
            tracing::error!(udf = %self.name, "error in UDF process() method");
            return ret;
        }

        match output {
            Some(buf) => {
                if let Err(e) =
                    frame.set_data(0, Box::new(buf.bytes), buf.width, buf.height, buf.channels)
                {
                    tracing::error!(udf = %self.name, error = %e, "failed to apply UDF output");
                    return UdfRetCode::Error;
                }
                UdfRetCode::FrameModified
            }
            // The callee reused the input buffer; a bare FrameModified
            // claim without output does not count as a change.
            None if ret == UdfRetCode::FrameModified => UdfRetCode::Ok,
            None => ret,
        }
    }
}

/// Handle around a loaded multi-plane UDF; forwards the frame directly.
pub struct RawUdfHandle {
    name: String,
    // Same drop-order constraint as NativeUdfHandle.
    udf: Mutex<Box<dyn RawUdf>>,
    _lib: Option<Library>,
}

impl RawUdfHandle {
    pub(crate) fn new(name: impl Into<String>, lib: Option<Library>, udf: Box<dyn RawUdf>) -> Self {
        Self {
            name: name.into(),
            udf: Mutex::new(udf),
            _lib: lib,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn process(&self, frame: &mut Frame) -> UdfRetCode {
        let mut udf = match self.udf.lock() {
            Ok(udf) => udf,
            Err(_) => {
                tracing::error!(udf = %self.name, "UDF state poisoned by an earlier panic");
                return UdfRetCode::Error;
            }
        };
        let ret = match catch_unwind(AssertUnwindSafe(|| udf.process(frame))) {
            Ok(ret) => ret,
            Err(_) => {
                tracing::error!(udf = %self.name, "panic in UDF process()");
                return UdfRetCode::Error;
            }
        };
        if ret == UdfRetCode::Error {
            tracing::error!(udf = %self.name, "error in UDF process() method");
        }
        ret
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::EncodeType;

    fn test_frame(bytes: &[u8]) -> Frame {
        let mut frame = Frame::new();
        frame
            .add_frame(
                Box::new(bytes.to_vec()),
                bytes.len() as u32,
                1,
                1,
                EncodeType::None,
                0,
            )
            .unwrap();
        frame
    }

    /// Doubles every byte into a fresh output buffer.
    struct DoublingUdf;
    impl PlaneUdf for DoublingUdf {
        fn process(
            &mut self,
            input: PlaneView<'_>,
            output: &mut Option<PlaneBuf>,
            _meta: &mut Envelope,
        ) -> UdfRetCode {
            let bytes = input.bytes.iter().map(|b| b.wrapping_mul(2)).collect();
            *output = Some(PlaneBuf {
                width: input.width,
                height: input.height,
                channels: input.channels,
                bytes,
            });
            UdfRetCode::FrameModified
        }
    }

    /// Inspects the frame but writes nothing.
    struct InspectUdf {
        claim_modified: bool,
    }
    impl PlaneUdf for InspectUdf {
        fn process(
            &mut self,
            _input: PlaneView<'_>,
            _output: &mut Option<PlaneBuf>,
            meta: &mut Envelope,
        ) -> UdfRetCode {
            meta.put("inspected", serde_json::json!(true));
            if self.claim_modified {
                UdfRetCode::FrameModified
            } else {
                UdfRetCode::Ok
            }
        }
    }

    struct PanickingUdf;
    impl PlaneUdf for PanickingUdf {
        fn process(
            &mut self,
            _input: PlaneView<'_>,
            _output: &mut Option<PlaneBuf>,
            _meta: &mut Envelope,
        ) -> UdfRetCode {
            panic!("udf exploded")
        }
    }

    struct DroppingRawUdf;
    impl RawUdf for DroppingRawUdf {
        fn process(&mut self, _frame: &mut Frame) -> UdfRetCode {
            UdfRetCode::DropFrame
        }
    }

    #[test]
    fn test_plane_udf_output_applied() {
        let handle = NativeUdfHandle::new("double", None, Box::new(DoublingUdf));
        let mut frame = test_frame(&[1, 2, 3]);

        assert_eq!(handle.process(&mut frame), UdfRetCode::FrameModified);
        assert_eq!(frame.data(0).unwrap(), &[2, 4, 6]);
        // Descriptor mirror follows the replacement
        assert_eq!(frame.width(0).unwrap(), 3);
    }

    #[test]
    fn test_plane_udf_no_output_is_ok() {
        let handle = NativeUdfHandle::new(
            "inspect",
            None,
            Box::new(InspectUdf {
                claim_modified: false,
            }),
        );
        let mut frame = test_frame(&[5, 6]);

        assert_eq!(handle.process(&mut frame), UdfRetCode::Ok);
        assert_eq!(frame.data(0).unwrap(), &[5, 6]);
        assert_eq!(
            frame.meta_data().unwrap().get("inspected"),
            Some(&serde_json::json!(true))
        );
    }

    #[test]
    fn test_modified_claim_without_output_downgrades_to_ok() {
        let handle = NativeUdfHandle::new(
            "inspect",
            None,
            Box::new(InspectUdf {
                claim_modified: true,
            }),
        );
        let mut frame = test_frame(&[5, 6]);
        assert_eq!(handle.process(&mut frame), UdfRetCode::Ok);
    }

    #[test]
    fn test_panicking_udf_reports_error() {
        let handle = NativeUdfHandle::new("boom", None, Box::new(PanickingUdf));
        let mut frame = test_frame(&[1]);
        assert_eq!(handle.process(&mut frame), UdfRetCode::Error);
    }

    #[test]
    fn test_empty_frame_is_error() {
        let handle = NativeUdfHandle::new(
            "inspect",
            None,
            Box::new(InspectUdf {
                claim_modified: false,
            }),
        );
        let mut frame = Frame::new();
        assert_eq!(handle.process(&mut frame), UdfRetCode::Error);
    }

    #[test]
    fn test_raw_udf_forwards() {
        let handle = RawUdfHandle::new("drop", None, Box::new(DroppingRawUdf));
        let mut frame = test_frame(&[1]);
        assert_eq!(handle.process(&mut frame), UdfRetCode::DropFrame);
    }
}
