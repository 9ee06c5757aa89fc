//! # rangestore storage
//!
//! Durable byte-medium trait and implementations for rangestore.
//!
//! This crate provides the lowest-level storage abstraction. Media are
//! **opaque byte sequences** - they know nothing about range locks,
//! sessions or streams.
//!
//! ## Design Principles
//!
//! - A medium is a named byte sequence (read, write, resize, unlink)
//! - Growth zero-fills; shrinking truncates
//! - Must be `Send + Sync`; the core calls media from the blocking pool
//! - The core owns all locking and ordering decisions
//!
//! ## Available Media
//!
//! - [`InMemoryMedium`] / [`InMemoryProvider`] - For testing and ephemeral stores
//! - [`FileMedium`] / [`DirectoryProvider`] - For persistent storage, one file per store
//!
//! ## Example
//!
//! ```rust
//! use rangestore_storage::{ByteMedium, InMemoryMedium};
//!
//! let medium = InMemoryMedium::new();
//! medium.write_bytes(0, b"hello world").unwrap();
//! let data = medium.read_bytes(6, 5).unwrap();
//! assert_eq!(&data, b"world");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod file;
mod medium;
mod memory;

pub use error::{StorageError, StorageResult};
pub use file::{DirectoryProvider, FileMedium};
pub use medium::{ByteMedium, MediumMetadata, MediumProvider};
pub use memory::{InMemoryMedium, InMemoryProvider};
