//! CLI command implementations.

pub mod cat;
pub mod delete;
pub mod resize;
pub mod stat;
pub mod write;

use rangestore_core::{ReadOptions, WriteOptions};

/// Applies optional CLI offsets to read options.
pub fn read_options(start: Option<i64>, end: Option<i64>) -> ReadOptions {
    let mut options = ReadOptions::new();
    if let Some(start) = start {
        options = options.start(start);
    }
    if let Some(end) = end {
        options = options.end(end);
    }
    options
}

/// Applies optional CLI offsets to write options.
pub fn write_options(start: Option<i64>, end: Option<i64>) -> WriteOptions {
    let mut options = WriteOptions::new();
    if let Some(start) = start {
        options = options.start(start);
    }
    if let Some(end) = end {
        options = options.end(end);
    }
    options
}
