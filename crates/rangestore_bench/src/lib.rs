//! Benchmarks for rangestore.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod utils;
