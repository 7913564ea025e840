#![allow(dead_code)]

pub use update_supervisor_test_utils::*;

use std::fs;
use std::path::Path;

/// Write `content` as the engine's ask-file / changelog / crash log would.
pub fn write_file(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}
