//! Rhai runtime for scripted UDFs.
//!
//! Scripted UDFs are rhai modules resolved by the loader and executed by
//! [`crate::udf::ScriptedUdfHandle`]. The runtime is a single
//! process-wide resource: every entry into rhai — compilation, `init`,
//! `process`, teardown — goes through the lease returned by [`runtime()`],
//! so script execution is serialized the way an interpreter with a global
//! lock would be.
//!
//! ## Script Interface
//!
//! A UDF module defines a `process` function and, optionally, an `init`
//! function:
//!
//! ```rhai
//! fn init(config) {
//!     // called once at load time with the UDF's config map
//! }
//!
//! fn process(frames, meta) {
//!     // frames: array of #{width, height, channels, data} maps
//!     //         (data is a byte blob; single-plane frames still arrive
//!     //          as a one-element array)
//!     // meta:   map of the frame's envelope fields
//!     OK
//! }
//! ```
//!
//! `process` returns either a bare return code (`OK`, `DROP_FRAME`,
//! `FRAME_MODIFIED`, `ERROR`) or, to modify the frame, a map:
//!
//! ```rhai
//! fn process(frames, meta) {
//!     let out = frames[0];
//!     out.data = invert(out.data);
//!     meta.processed = true;
//!     #{ code: FRAME_MODIFIED, frames: [out], meta: meta }
//! }
//! ```
//!
//! Each returned plane must satisfy `data.len == width * height * channels`.

mod engine;

pub use engine::{runtime, ScriptRuntime};

use rhai::AST;
use std::sync::Arc;

/// A compiled UDF module.
#[derive(Clone)]
pub struct CompiledModule {
    ast: Arc<AST>,
    name: String,
    /// Whether the module defines an `init` function.
    has_init: bool,
}

impl CompiledModule {
    pub fn new(ast: AST, name: impl Into<String>) -> Self {
        let has_init = ast.iter_functions().any(|f| f.name == "init");
        Self {
            ast: Arc::new(ast),
            name: name.into(),
            has_init,
        }
    }

    pub fn ast(&self) -> &AST {
        &self.ast
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn has_init(&self) -> bool {
        self.has_init
    }

    /// Whether the module defines the mandatory `process` function.
    pub fn has_process(&self) -> bool {
        self.ast.iter_functions().any(|f| f.name == "process")
    }
}

impl std::fmt::Debug for CompiledModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledModule")
            .field("name", &self.name)
            .field("has_init", &self.has_init)
            .finish()
    }
}

/// Built-in UDF scripts: ready-made chain members and test fixtures.
pub mod builtins {
    /// Pass every frame through untouched.
    pub const PASSTHROUGH: &str = r#"
fn process(frames, meta) {
    OK
}
"#;

    /// Drop every frame.
    pub const DROP_ALL: &str = r#"
fn process(frames, meta) {
    DROP_FRAME
}
"#;

    /// Invert every byte of every plane.
    pub const INVERT: &str = r#"
fn process(frames, meta) {
    let out = [];
    for plane in frames {
        let data = plane.data;
        for i in 0..data.len() {
            data[i] = 255 - data[i];
        }
        plane.data = data;
        out.push(plane);
    }
    #{ code: FRAME_MODIFIED, frames: out }
}
"#;

    /// Tag each frame's envelope with the plane count.
    pub const TAG_PLANES: &str = r#"
fn process(frames, meta) {
    meta.plane_count = frames.len();
    #{ code: OK, meta: meta }
}
"#;
}
