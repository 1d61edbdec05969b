//! # framepipe: frame pipeline core
//!
//! The heart of a video/image processing pipeline: a multi-plane
//! [`Frame`] object model that rides a metadata [`Envelope`] across the
//! pipeline boundary, and a [`UdfManager`] that runs an ordered chain of
//! user-defined functions (UDFs) over a stream of frames.
//!
//! ## Architecture
//!
//! - **Frame model** (`frame`): planes + envelope mirror, deferred
//!   JPEG/PNG encoding, one-shot serialization to a wire envelope
//! - **Envelope** (`envelope`): typed key-value store with a single
//!   unkeyed blob payload carrying the pixel buffers
//! - **UDFs** (`udf`): dylib plugins (`libloading`) and rhai scripted
//!   modules behind one `UdfHandle`, resolved by `UdfLoader`
//! - **Execution** (`udf::manager`, `pool`, `queue`): a dispatch thread
//!   feeding per-frame chain jobs to a fixed worker pool over blocking
//!   MPMC queues
//!
//! ## Example
//!
//! ```no_run
//! use framepipe::{Frame, EncodeType, ManagerConfig, UdfManager, FrameQueue};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! fn main() -> framepipe::Result<()> {
//!     let config = ManagerConfig::from_json(json!({
//!         "udfs": [
//!             {"name": "filters.blur", "kernel": 5}
//!         ],
//!         "max_workers": 4,
//!         "encoding": {"type": "jpeg", "level": 85}
//!     }))?;
//!
//!     let input = Arc::new(FrameQueue::unbounded());
//!     let output = Arc::new(FrameQueue::bounded(64));
//!     let mut manager = UdfManager::new(config, input.clone(), output.clone())?;
//!     manager.start();
//!
//!     // Ingest side: build a frame and hand it to the chain
//!     let mut frame = Frame::new();
//!     frame.add_frame(Box::new(vec![0u8; 640 * 480 * 3]), 640, 480, 3,
//!                     EncodeType::None, 0)?;
//!     let _ = input.push(frame);
//!
//!     // Publish side: serialize survivors to wire envelopes
//!     if output.wait_for(std::time::Duration::from_secs(1)) {
//!         if let Some(mut frame) = output.pop() {
//!             let envelope = frame.serialize()?;
//!             let _ = envelope;
//!         }
//!     }
//!
//!     manager.stop();
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod envelope;
pub mod error;
pub mod frame;
pub mod pool;
pub mod queue;
pub mod scripting;
pub mod udf;

pub use config::{EncodingPolicy, ManagerConfig, UdfEntry};
pub use envelope::{Blob, BlobSet, Envelope, PixelStore};
pub use error::{FramePipeError, Result};
pub use frame::{verify_encoding_level, EncodeType, Frame, FrameData, FrameMetaData};
pub use pool::{JobHandle, WorkerPool};
pub use queue::ThreadSafeQueue;
pub use udf::{
    FrameQueue, NativeUdfHandle, PlaneBuf, PlaneUdf, PlaneView, RawUdf, RawUdfHandle,
    ScriptedUdfHandle, UdfHandle, UdfLoader, UdfManager, UdfRetCode,
};
