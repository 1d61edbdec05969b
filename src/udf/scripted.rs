//! Scripted UDF handle: runs a rhai module over each frame.
//!
//! Every plane is presented to the script as a map
//! `#{width, height, channels, data}` with `data` as a byte blob; frames
//! always arrive as an array of those maps so scripts are plane-count
//! agnostic. The envelope's keyed fields ride along as a `meta` map.
//!
//! To modify the frame the script returns
//! `#{code: FRAME_MODIFIED, frames: [...]}` with one entry per input
//! plane; each entry must satisfy `data.len == width * height * channels`
//! or the call fails. A returned `meta` map is merged back into the
//! envelope (descriptor keys excluded — those belong to the frame).
//! Returning a bare code means the frame was not touched.

use crate::error::{FramePipeError, Result};
use crate::frame::{is_reserved_key, Frame};
use crate::scripting::{runtime, CompiledModule, ScriptRuntime};
use crate::udf::UdfRetCode;
use rhai::{Dynamic, Map, Scope};
use serde_json::Value;

/// Handle around one compiled rhai UDF module.
pub struct ScriptedUdfHandle {
    name: String,
    module: CompiledModule,
    initialized: bool,
}

impl ScriptedUdfHandle {
    pub(crate) fn new(name: impl Into<String>, module: CompiledModule) -> Self {
        Self {
            name: name.into(),
            module,
            initialized: false,
        }
    }

    /// Compile a handle straight from source, bypassing the search path.
    /// The module must define `process`; `initialize` runs before return.
    pub fn from_source(name: &str, source: &str, config: &Value) -> Result<Self> {
        let module = {
            let rt = lock_runtime()?;
            CompiledModule::new(rt.compile(name, source)?, name)
        };
        if !module.has_process() {
            return Err(FramePipeError::LoadFailed(format!(
                "script module {name:?} does not define process(frames, meta)"
            )));
        }
        let mut handle = Self::new(name, module);
        handle.initialize(config)?;
        Ok(handle)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// One-shot initialization: runs the module's `init(config)` if it
    /// defines one. Calling again warns and does nothing.
    pub(crate) fn initialize(&mut self, config: &Value) -> Result<()> {
        if self.initialized {
            tracing::warn!(udf = %self.name, "initialize called twice for a UDF handle");
            return Ok(());
        }

        if self.module.has_init() {
            let rt = lock_runtime()?;
            let config_dyn = rhai::serde::to_dynamic(config)?;
            let mut scope = Scope::new();
            rt.engine()
                .call_fn::<Dynamic>(&mut scope, self.module.ast(), "init", (config_dyn,))
                .map_err(|e| {
                    FramePipeError::Script(format!("{}: init failed: {e}", self.name))
                })?;
        }

        self.initialized = true;
        Ok(())
    }

    /// Run the script over the frame.
    pub fn process(&self, frame: &mut Frame) -> UdfRetCode {
        let rt = match lock_runtime() {
            Ok(rt) => rt,
            Err(e) => {
                tracing::error!(udf = %self.name, error = %e, "script runtime unavailable");
                return UdfRetCode::Error;
            }
        };

        let (frames_arr, meta_map) = match self.build_inputs(frame) {
            Ok(inputs) => inputs,
            Err(e) => {
                tracing::error!(udf = %self.name, error = %e, "failed to stage script inputs");
                return UdfRetCode::Error;
            }
        };

        let mut scope = Scope::new();
        let result = rt.engine().call_fn::<Dynamic>(
            &mut scope,
            self.module.ast(),
            "process",
            (frames_arr, meta_map),
        );

        let result = match result {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(udf = %self.name, error = %e, "error in UDF process() method");
                return UdfRetCode::Error;
            }
        };

        match self.apply_result(frame, result) {
            Ok(code) => code,
            Err(e) => {
                tracing::error!(udf = %self.name, error = %e, "invalid script result");
                UdfRetCode::Error
            }
        }
    }

    /// Build the `frames` array and `meta` map passed to the script.
    fn build_inputs(&self, frame: &Frame) -> Result<(rhai::Array, Map)> {
        let mut frames_arr = rhai::Array::with_capacity(frame.frame_count());
        for i in 0..frame.frame_count() {
            let mut plane = Map::new();
            plane.insert("width".into(), Dynamic::from(frame.width(i)? as i64));
            plane.insert("height".into(), Dynamic::from(frame.height(i)? as i64));
            plane.insert("channels".into(), Dynamic::from(frame.channels(i)? as i64));
            plane.insert(
                "data".into(),
                Dynamic::from_blob(frame.data(i)?.to_vec()),
            );
            frames_arr.push(Dynamic::from_map(plane));
        }

        let env = frame
            .meta_data()
            .ok_or(FramePipeError::AfterSerialize)?;
        let meta_value = Value::Object(env.fields().clone());
        let meta_dyn = rhai::serde::to_dynamic(&meta_value)?;
        let meta_map = meta_dyn.try_cast::<Map>().ok_or_else(|| {
            FramePipeError::Script("envelope did not convert to a script map".to_string())
        })?;

        Ok((frames_arr, meta_map))
    }

    /// Interpret the script's return value and apply any modifications.
    fn apply_result(&self, frame: &mut Frame, result: Dynamic) -> Result<UdfRetCode> {
        if result.is_int() {
            let code = result.as_int().unwrap_or(UdfRetCode::Error.code());
            return Ok(match UdfRetCode::from_code(code) {
                // A bare FRAME_MODIFIED with no returned frames means the
                // input was reused; that does not count as a change.
                Some(UdfRetCode::FrameModified) => UdfRetCode::Ok,
                Some(code) => code,
                None => {
                    tracing::error!(udf = %self.name, code, "unknown return code from script");
                    UdfRetCode::Error
                }
            });
        }

        let Some(map) = result.try_cast::<Map>() else {
            return Err(FramePipeError::Script(
                "process() must return a code or a #{code, frames, meta} map".to_string(),
            ));
        };

        let code = map
            .get("code")
            .and_then(|c| c.as_int().ok())
            .and_then(UdfRetCode::from_code)
            .ok_or_else(|| {
                FramePipeError::Script("result map is missing a valid code".to_string())
            })?;

        let mut final_code = code;
        if code == UdfRetCode::FrameModified {
            if let Some(frames) = map.get("frames") {
                self.apply_frames(frame, frames.clone())?;
                // The replacement is in place; downstream sees a normal frame.
                final_code = UdfRetCode::Ok;
            } else {
                final_code = UdfRetCode::Ok;
            }
        }

        if let Some(meta) = map.get("meta") {
            self.apply_meta(frame, meta.clone())?;
        }

        Ok(final_code)
    }

    /// Replace every plane from the script's returned array.
    fn apply_frames(&self, frame: &mut Frame, frames: Dynamic) -> Result<()> {
        let frames = frames.try_cast::<rhai::Array>().ok_or_else(|| {
            FramePipeError::Script("result frames must be an array".to_string())
        })?;
        if frames.len() != frame.frame_count() {
            return Err(FramePipeError::Script(format!(
                "script returned {} planes, frame has {}",
                frames.len(),
                frame.frame_count()
            )));
        }

        for (i, item) in frames.into_iter().enumerate() {
            let plane = item.try_cast::<Map>().ok_or_else(|| {
                FramePipeError::Script(format!("returned plane {i} is not a map"))
            })?;

            let dim = |key: &str| -> Result<u32> {
                plane
                    .get(key)
                    .and_then(|v| v.as_int().ok())
                    .and_then(|v| u32::try_from(v).ok())
                    .ok_or_else(|| {
                        FramePipeError::Script(format!(
                            "returned plane {i} is missing integer {key}"
                        ))
                    })
            };
            let width = dim("width")?;
            let height = dim("height")?;
            let channels = dim("channels")?;

            let data = plane
                .get("data")
                .cloned()
                .and_then(|d| d.try_cast::<rhai::Blob>())
                .ok_or_else(|| {
                    FramePipeError::Script(format!("returned plane {i} is missing a data blob"))
                })?;

            // The shape check: a replacement plane must be exactly H x W x C.
            let expected = width as usize * height as usize * channels as usize;
            if data.len() != expected {
                return Err(FramePipeError::Script(format!(
                    "returned plane {i} is {} bytes, expected {}x{}x{} = {}",
                    data.len(),
                    width,
                    height,
                    channels,
                    expected
                )));
            }

            frame.set_data(i, Box::new(data), width, height, channels)?;
        }
        Ok(())
    }

    /// Merge the script's returned meta map back into the envelope.
    /// Descriptor keys are owned by the frame and skipped.
    fn apply_meta(&self, frame: &mut Frame, meta: Dynamic) -> Result<()> {
        let meta_value: Value = rhai::serde::from_dynamic(&meta)?;
        let Value::Object(fields) = meta_value else {
            return Err(FramePipeError::Script(
                "result meta must be a map".to_string(),
            ));
        };

        let env = frame
            .meta_data_mut()
            .ok_or(FramePipeError::AfterSerialize)?;
        for (key, value) in fields {
            if is_reserved_key(&key) {
                continue;
            }
            env.put(key, value);
        }
        Ok(())
    }
}

impl std::fmt::Debug for ScriptedUdfHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedUdfHandle")
            .field("name", &self.name)
            .field("initialized", &self.initialized)
            .finish()
    }
}

fn lock_runtime() -> Result<std::sync::MutexGuard<'static, ScriptRuntime>> {
    runtime()
        .lock()
        .map_err(|_| FramePipeError::Script("script runtime lock poisoned".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::EncodeType;
    use crate::scripting::builtins;
    use serde_json::json;

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

    #[test]
    fn test_passthrough() {
        let handle =
            ScriptedUdfHandle::from_source("passthrough", builtins::PASSTHROUGH, &json!({}))
                .unwrap();
        let mut frame = test_frame(&[1, 2, 3]);
        assert_eq!(handle.process(&mut frame), UdfRetCode::Ok);
        assert_eq!(frame.data(0).unwrap(), &[1, 2, 3]);
    }

    #[test]
    fn test_drop_all() {
        let handle =
            ScriptedUdfHandle::from_source("drop_all", builtins::DROP_ALL, &json!({})).unwrap();
        let mut frame = test_frame(&[1]);
        assert_eq!(handle.process(&mut frame), UdfRetCode::DropFrame);
    }

    #[test]
    fn test_invert_modifies_planes() {
        let handle =
            ScriptedUdfHandle::from_source("invert", builtins::INVERT, &json!({})).unwrap();
        let mut frame = test_frame(&[0, 128, 255]);

        assert_eq!(handle.process(&mut frame), UdfRetCode::Ok);
        assert_eq!(frame.data(0).unwrap(), &[255, 127, 0]);
    }

    #[test]
    fn test_meta_write_back() {
        let handle =
            ScriptedUdfHandle::from_source("tag", builtins::TAG_PLANES, &json!({})).unwrap();
        let mut frame = test_frame(&[1, 2]);

        assert_eq!(handle.process(&mut frame), UdfRetCode::Ok);
        assert_eq!(
            frame.meta_data().unwrap().get("plane_count"),
            Some(&json!(1))
        );
        // Descriptor keys survive the write-back untouched
        assert_eq!(frame.meta_data().unwrap().get_i64("width").unwrap(), 2);
    }

    #[test]
    fn test_dimension_mismatch_is_error() {
        let script = r#"
fn process(frames, meta) {
    let plane = frames[0];
    plane.width = 100;
    #{ code: FRAME_MODIFIED, frames: [plane] }
}
"#;
        let handle = ScriptedUdfHandle::from_source("bad_dims", script, &json!({})).unwrap();
        let mut frame = test_frame(&[1, 2, 3]);
        assert_eq!(handle.process(&mut frame), UdfRetCode::Error);
        // The frame is untouched after the failed replacement
        assert_eq!(frame.data(0).unwrap(), &[1, 2, 3]);
    }

    #[test]
    fn test_wrong_plane_count_is_error() {
        let script = r#"
fn process(frames, meta) {
    #{ code: FRAME_MODIFIED, frames: [] }
}
"#;
        let handle = ScriptedUdfHandle::from_source("bad_count", script, &json!({})).unwrap();
        let mut frame = test_frame(&[1]);
        assert_eq!(handle.process(&mut frame), UdfRetCode::Error);
    }

    #[test]
    fn test_init_receives_config() {
        let script = r#"
fn init(config) {
    if config.threshold != 42 {
        throw "wrong config";
    }
}

fn process(frames, meta) {
    OK
}
"#;
        let handle =
            ScriptedUdfHandle::from_source("with_init", script, &json!({"threshold": 42}));
        assert!(handle.is_ok());

        let failing =
            ScriptedUdfHandle::from_source("with_init", script, &json!({"threshold": 7}));
        assert!(matches!(failing, Err(FramePipeError::Script(_))));
    }

    #[test]
    fn test_script_runtime_error_reported() {
        let script = r#"
fn process(frames, meta) {
    frames[99].width
}
"#;
        let handle = ScriptedUdfHandle::from_source("oob", script, &json!({})).unwrap();
        let mut frame = test_frame(&[1]);
        assert_eq!(handle.process(&mut frame), UdfRetCode::Error);
    }

    #[test]
    fn test_missing_process_rejected() {
        let err = ScriptedUdfHandle::from_source("empty", "fn init(config) {}", &json!({}));
        assert!(matches!(err, Err(FramePipeError::LoadFailed(_))));
    }

    #[test]
    fn test_multi_plane_passes_all_planes() {
        let script = r#"
fn process(frames, meta) {
    if frames.len() != 2 {
        throw "expected two planes";
    }
    OK
}
"#;
        let handle = ScriptedUdfHandle::from_source("two", script, &json!({})).unwrap();
        let mut frame = test_frame(&[1, 2, 3]);
        frame
            .add_frame(Box::new(vec![4u8, 5, 6]), 3, 1, 1, EncodeType::None, 0)
            .unwrap();
        assert_eq!(handle.process(&mut frame), UdfRetCode::Ok);
    }
}
