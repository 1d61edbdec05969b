//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

use framepipe::{EncodeType, Frame, PixelStore};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use tempfile::TempDir;

/// Pixel store that counts how many times it has been released.
pub struct CountingStore {
    bytes: Vec<u8>,
    drops: Arc<AtomicUsize>,
}

impl CountingStore {
    /// Returns the store and the shared drop counter.
    pub fn new(bytes: Vec<u8>) -> (Self, Arc<AtomicUsize>) {
        let drops = Arc::new(AtomicUsize::new(0));
        (
            Self {
                bytes,
                drops: drops.clone(),
            },
            drops,
        )
    }
}

impl PixelStore for CountingStore {
    fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }
}

impl Drop for CountingStore {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}

/// The 14-byte single-plane test payload (13 chars + NUL).
pub fn hello_world() -> Vec<u8> {
    b"Hello, World!\0".to_vec()
}

/// Build a raw single-plane frame over `bytes` laid out as `width` x 1 x 1.
pub fn raw_frame(bytes: Vec<u8>, width: u32) -> Frame {
    let mut frame = Frame::new();
    frame
        .add_frame(Box::new(bytes), width, 1, 1, EncodeType::None, 0)
        .unwrap();
    frame
}

/// A synthetic `size` x `size` RGB gradient plane.
pub fn rgb_gradient(size: u32) -> Vec<u8> {
    let mut bytes = Vec::with_capacity((size * size * 3) as usize);
    for y in 0..size {
        for x in 0..size {
            bytes.push((x * 255 / size.max(1)) as u8);
            bytes.push((y * 255 / size.max(1)) as u8);
            bytes.push(((x + y) * 127 / size.max(1)) as u8);
        }
    }
    bytes
}

static SCRIPT_DIR: OnceLock<TempDir> = OnceLock::new();

/// Write the scripted-UDF fixtures to a temp directory and point
/// `FRAMEPIPE_SCRIPT_PATH` at it. Safe to call from every test; the
/// setup runs once per test binary.
pub fn setup_script_path() {
    SCRIPT_DIR.get_or_init(|| {
        let dir = tempfile::tempdir().expect("create script dir");
        let write = |name: &str, source: &str| {
            std::fs::write(dir.path().join(name), source).expect("write script fixture");
        };
        write(
            "passthrough.rhai",
            framepipe::scripting::builtins::PASSTHROUGH,
        );
        write("drop_all.rhai", framepipe::scripting::builtins::DROP_ALL);
        write("tag_planes.rhai", framepipe::scripting::builtins::TAG_PLANES);

        std::fs::create_dir(dir.path().join("filters")).expect("create filters dir");
        std::fs::write(
            dir.path().join("filters").join("invert.rhai"),
            framepipe::scripting::builtins::INVERT,
        )
        .expect("write nested script fixture");

        std::env::set_var("FRAMEPIPE_SCRIPT_PATH", dir.path());
        dir
    });
}
