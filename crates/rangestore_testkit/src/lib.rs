//! # rangestore testkit
//!
//! Test utilities for rangestore.
//!
//! This crate provides:
//! - Test fixtures for in-memory and directory-backed stores
//! - Property-based generators for store operations using proptest
//! - A model-checking harness that mirrors expected store contents
//! - Concurrent stress runs that detect torn reads
//!
//! ## Usage
//!
//! ```rust,ignore
//! use rangestore_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn test_with_store() {
//!     let store = TestStore::memory();
//!     store.write_all("doc", b"hello").await;
//!     assert_eq!(store.read_all("doc").await, b"hello");
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod integration;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::integration::*;
    pub use crate::stress::*;
}

pub use fixtures::*;
pub use generators::*;
pub use integration::*;
pub use stress::*;
