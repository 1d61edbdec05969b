//! UDF handles, loader, and the chain manager.
//!
//! A UDF (user-defined function) consumes a [`crate::frame::Frame`] and
//! possibly mutates or drops it. UDFs come in three flavors behind one
//! uniform [`UdfHandle`]:
//!
//! - **Raw** — a dynamic library working on the whole multi-plane frame.
//! - **Native** — a dynamic library working on a single-plane view.
//! - **Scripted** — a rhai module run by the shared script runtime.
//!
//! [`UdfLoader`] resolves names to handles; [`UdfManager`] runs an ordered
//! chain of handles over a stream of frames on a worker pool.

pub mod handle;
pub mod loader;
pub mod manager;
pub mod native;
pub mod scripted;

pub use handle::UdfHandle;
pub use loader::{UdfLoader, ENV_SCRIPT_PATH, ENV_UDF_PATH};
pub use manager::{FrameQueue, UdfManager};
pub use native::{NativeUdfHandle, PlaneBuf, PlaneUdf, PlaneView, RawUdf, RawUdfHandle};
pub use scripted::ScriptedUdfHandle;

/// Result of one UDF's `process` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UdfRetCode {
    /// Frame passes through unchanged.
    #[default]
    Ok,
    /// Frame is discarded; the chain stops.
    DropFrame,
    /// Frame was modified in place; treated as `Ok` by the chain.
    FrameModified,
    /// The UDF failed; the frame is discarded and the chain stops.
    Error,
}

impl UdfRetCode {
    /// Numeric wire form of the code.
    pub fn code(&self) -> i64 {
        match self {
            UdfRetCode::Ok => 0,
            UdfRetCode::DropFrame => 1,
            UdfRetCode::FrameModified => 2,
            UdfRetCode::Error => 3,
        }
    }

    /// Parse a numeric code; `None` for out-of-range values.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(UdfRetCode::Ok),
            1 => Some(UdfRetCode::DropFrame),
            2 => Some(UdfRetCode::FrameModified),
            3 => Some(UdfRetCode::Error),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ret_code_round_trip() {
        for code in [
            UdfRetCode::Ok,
            UdfRetCode::DropFrame,
            UdfRetCode::FrameModified,
            UdfRetCode::Error,
        ] {
            assert_eq!(UdfRetCode::from_code(code.code()), Some(code));
        }
        assert_eq!(UdfRetCode::from_code(7), None);
        assert_eq!(UdfRetCode::from_code(-1), None);
    }
}
