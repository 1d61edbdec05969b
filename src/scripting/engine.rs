//! The process-wide rhai runtime behind the scripted UDF handles.
//!
//! One engine instance serves every scripted UDF; access is serialized
//! through the mutex returned by [`runtime()`]. The engine is configured
//! once from the environment:
//!
//! - `FRAMEPIPE_DEV_MODE` (`1`/`true`) lifts the operation budget so
//!   scripts can be stepped through or stress-tested without tripping the
//!   limiter.
//! - `FRAMEPIPE_SCRIPT_LOG` (`error`..`trace`, default `info`) sets the
//!   level at which script `log(...)` output is emitted.

use crate::error::{FramePipeError, Result};
use rhai::{Dynamic, Engine};
use std::sync::{Mutex, OnceLock};

/// Environment variable enabling development mode.
pub const ENV_DEV_MODE: &str = "FRAMEPIPE_DEV_MODE";

/// Environment variable controlling the script log level.
pub const ENV_SCRIPT_LOG: &str = "FRAMEPIPE_SCRIPT_LOG";

/// Operation budget for scripts in normal operation. Sized for per-pixel
/// loops over full frames.
const MAX_OPERATIONS: u64 = 500_000_000;

/// UDF return codes exposed to scripts as bare constants.
const SCRIPT_CONSTANTS: [(&str, i64); 4] = [
    ("OK", 0),
    ("DROP_FRAME", 1),
    ("FRAME_MODIFIED", 2),
    ("ERROR", 3),
];

static RUNTIME: OnceLock<Mutex<ScriptRuntime>> = OnceLock::new();

/// Lease on the process-wide script runtime.
///
/// Every call into rhai — compiling a module, `init`, `process`, even
/// releasing script-produced values — must hold this lock.
pub fn runtime() -> &'static Mutex<ScriptRuntime> {
    RUNTIME.get_or_init(|| Mutex::new(ScriptRuntime::from_env()))
}

/// The single-owner rhai engine with framepipe's UDF surface registered.
pub struct ScriptRuntime {
    engine: Engine,
    dev_mode: bool,
}

impl ScriptRuntime {
    /// Build the runtime from the process environment.
    pub fn from_env() -> Self {
        let dev_mode = std::env::var(ENV_DEV_MODE)
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        let log_level = std::env::var(ENV_SCRIPT_LOG).unwrap_or_else(|_| "info".to_string());

        let mut engine = Engine::new();
        Self::configure_engine(&mut engine, dev_mode, &log_level);

        tracing::debug!(dev_mode, %log_level, "script runtime initialized");
        Self { engine, dev_mode }
    }

    fn configure_engine(engine: &mut Engine, dev_mode: bool, log_level: &str) {
        engine.set_max_expr_depths(128, 128);
        engine.set_max_call_levels(64);
        engine.set_max_string_size(1_000_000);
        engine.set_max_array_size(100_000);
        engine.set_max_map_size(10_000);
        if !dev_mode {
            engine.set_max_operations(MAX_OPERATIONS);
        }

        // UDF return codes resolve as bare identifiers in any scope,
        // including inside script functions.
        engine.on_var(|name, _index, _ctx| {
            for (constant, value) in SCRIPT_CONSTANTS {
                if name == constant {
                    return Ok(Some(Dynamic::from(value)));
                }
            }
            Ok(None)
        });

        // log(msg) routed to tracing at the configured level
        let level = log_level.to_ascii_lowercase();
        engine.register_fn("log", move |msg: &str| match level.as_str() {
            "error" => tracing::error!(target: "framepipe::script", "{}", msg),
            "warn" => tracing::warn!(target: "framepipe::script", "{}", msg),
            "debug" => tracing::debug!(target: "framepipe::script", "{}", msg),
            "trace" => tracing::trace!(target: "framepipe::script", "{}", msg),
            _ => tracing::info!(target: "framepipe::script", "{}", msg),
        });
    }

    /// Compile a UDF module from source.
    pub fn compile(&self, name: &str, source: &str) -> Result<rhai::AST> {
        self.engine
            .compile(source)
            .map_err(|e| FramePipeError::Script(format!("{name}: compilation error: {e}")))
    }

    /// The underlying engine, for calls and evaluation.
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Whether development mode is active.
    pub fn dev_mode(&self) -> bool {
        self.dev_mode
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rhai::Scope;

    #[test]
    fn test_ret_code_constants_resolve() {
        let rt = ScriptRuntime::from_env();
        let mut scope = Scope::new();
        let ok: i64 = rt
            .engine()
            .eval_with_scope(&mut scope, "OK")
            .unwrap();
        assert_eq!(ok, 0);

        let code: i64 = rt
            .engine()
            .eval_with_scope(&mut scope, "DROP_FRAME + FRAME_MODIFIED + ERROR")
            .unwrap();
        assert_eq!(code, 1 + 2 + 3);
    }

    #[test]
    fn test_constants_visible_inside_functions() {
        let rt = ScriptRuntime::from_env();
        let ast = rt.compile("t", "fn f() { FRAME_MODIFIED }").unwrap();
        let mut scope = Scope::new();
        let code: i64 = rt.engine().call_fn(&mut scope, &ast, "f", ()).unwrap();
        assert_eq!(code, 2);
    }

    #[test]
    fn test_compile_error_reported() {
        let rt = ScriptRuntime::from_env();
        let err = rt.compile("broken", "fn process( {");
        assert!(matches!(err, Err(FramePipeError::Script(_))));
    }

    #[test]
    fn test_log_function_registered() {
        let rt = ScriptRuntime::from_env();
        let mut scope = Scope::new();
        // Must evaluate without error even with no subscriber installed
        rt.engine()
            .eval_with_scope::<()>(&mut scope, r#"log("hello")"#)
            .unwrap();
    }

    #[test]
    fn test_global_runtime_is_shared() {
        let a = runtime() as *const _;
        let b = runtime() as *const _;
        assert_eq!(a, b);
    }
}
