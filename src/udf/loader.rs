//! UDF name resolution: dynamic libraries first, scripted modules second.
//!
//! A UDF named `resize` resolves to the platform dylib (`libresize.so` on
//! Linux) searched along the `FRAMEPIPE_UDF_PATH` list. When no library
//! matches, the name is treated as a scripted module path — dots become
//! directory separators — searched along `FRAMEPIPE_SCRIPT_PATH`
//! (`filters.blur` → `filters/blur.rhai`).

use crate::error::{FramePipeError, Result};
use crate::scripting::{runtime, CompiledModule};
use crate::udf::native::{
    NativeUdfHandle, PlaneUdfConstructor, RawUdfConstructor, RawUdfHandle, PLANE_UDF_SYMBOL,
    RAW_UDF_SYMBOL,
};
use crate::udf::scripted::ScriptedUdfHandle;
use crate::udf::UdfHandle;
use libloading::Library;
use serde_json::Value;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;

/// Colon-separated directory list searched for UDF dynamic libraries.
pub const ENV_UDF_PATH: &str = "FRAMEPIPE_UDF_PATH";

/// Colon-separated directory list searched for scripted UDF modules.
pub const ENV_SCRIPT_PATH: &str = "FRAMEPIPE_SCRIPT_PATH";

/// Resolves UDF names to initialized handles.
#[derive(Debug, Default)]
pub struct UdfLoader;

impl UdfLoader {
    pub fn new() -> Self {
        Self
    }

    /// Load and initialize the UDF called `name` with its config.
    pub fn load(&self, name: &str, config: &Value) -> Result<UdfHandle> {
        if let Some(lib_path) = find_dylib(name) {
            tracing::debug!(udf = name, path = %lib_path.display(), "found native UDF");
            return self.load_native(name, lib_path, config);
        }
        tracing::debug!(udf = name, "no dynamic library found, trying scripted module");
        self.load_scripted(name, config)
    }

    /// Open the dylib and construct the UDF. The raw (multi-plane)
    /// constructor is probed first; a library exporting both symbols is
    /// treated as raw.
    fn load_native(&self, name: &str, path: PathBuf, config: &Value) -> Result<UdfHandle> {
        let lib = unsafe { Library::new(&path) }.map_err(|e| {
            FramePipeError::LoadFailed(format!("{}: failed to open library: {e}", path.display()))
        })?;

        // The Symbol borrows the library, so constructor calls happen in
        // inner scopes and only the boxed UDF escapes.
        let raw_udf = {
            match unsafe { lib.get::<RawUdfConstructor>(RAW_UDF_SYMBOL) } {
                Ok(ctor) => Some(catch_unwind(AssertUnwindSafe(|| ctor(config))).map_err(
                    |_| FramePipeError::LoadFailed(format!("{name}: panic in initialize_raw_udf")),
                )?),
                Err(_) => None,
            }
        };
        if let Some(udf) = raw_udf {
            tracing::info!(udf = name, "loaded raw UDF");
            return Ok(UdfHandle::Raw(RawUdfHandle::new(name, Some(lib), udf)));
        }

        let udf = {
            let ctor =
                unsafe { lib.get::<PlaneUdfConstructor>(PLANE_UDF_SYMBOL) }.map_err(|e| {
                    FramePipeError::LoadFailed(format!(
                        "{name}: library exports neither initialize_raw_udf nor initialize_udf: {e}"
                    ))
                })?;
            catch_unwind(AssertUnwindSafe(|| ctor(config))).map_err(|_| {
                FramePipeError::LoadFailed(format!("{name}: panic in initialize_udf"))
            })?
        };
        tracing::info!(udf = name, "loaded native UDF");
        Ok(UdfHandle::Native(NativeUdfHandle::new(name, Some(lib), udf)))
    }

    /// Resolve, compile, and initialize a scripted module.
    fn load_scripted(&self, name: &str, config: &Value) -> Result<UdfHandle> {
        let path = find_script(name).ok_or_else(|| {
            FramePipeError::LoadFailed(format!(
                "UDF {name:?} not found as a dynamic library or scripted module"
            ))
        })?;
        let source = std::fs::read_to_string(&path)?;

        let module = {
            let rt = runtime().lock().map_err(|_| {
                FramePipeError::Script("script runtime lock poisoned".to_string())
            })?;
            CompiledModule::new(rt.compile(name, &source)?, name)
        };
        if !module.has_process() {
            return Err(FramePipeError::LoadFailed(format!(
                "script module {name:?} does not define process(frames, meta)"
            )));
        }

        let mut handle = ScriptedUdfHandle::new(name, module);
        handle.initialize(config)?;
        tracing::info!(udf = name, path = %path.display(), "loaded scripted UDF");
        Ok(UdfHandle::Scripted(handle))
    }
}

fn search_paths(env: &str) -> Vec<PathBuf> {
    match std::env::var_os(env) {
        Some(value) => std::env::split_paths(&value).collect(),
        None => Vec::new(),
    }
}

fn dylib_file_name(name: &str) -> String {
    format!(
        "{}{}{}",
        std::env::consts::DLL_PREFIX,
        name,
        std::env::consts::DLL_SUFFIX
    )
}

fn find_dylib(name: &str) -> Option<PathBuf> {
    let file_name = dylib_file_name(name);
    for dir in search_paths(ENV_UDF_PATH) {
        if dir.as_os_str().is_empty() {
            continue;
        }
        let candidate = dir.join(&file_name);
        tracing::trace!(path = %candidate.display(), "checking for UDF library");
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}

fn find_script(name: &str) -> Option<PathBuf> {
    let rel: PathBuf = format!("{}.rhai", name.replace('.', "/")).into();
    for dir in search_paths(ENV_SCRIPT_PATH) {
        if dir.as_os_str().is_empty() {
            continue;
        }
        let candidate = dir.join(&rel);
        tracing::trace!(path = %candidate.display(), "checking for UDF script");
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}
