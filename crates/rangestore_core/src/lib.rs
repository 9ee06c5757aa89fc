//! # rangestore core
//!
//! Range-locked streaming access to named byte stores.
//!
//! This crate provides:
//! - A range lock manager with shared reads, exclusive writes and
//!   arrival-order fairness
//! - Chunked read streams and write sinks with back-pressure
//! - Read-modify-write transforms that never read their own writes
//! - Status, resize and delete coordinated with in-flight sessions
//!
//! Storage is pluggable through [`rangestore_storage::MediumProvider`]; the
//! core owns every locking and ordering decision.
//!
//! ## Guarantees
//!
//! - Overlapping write sessions never interleave
//! - A read never observes a write that is still in flight over its range
//! - Every lock is released exactly once, whether its session completes,
//!   fails, or is dropped
//! - Committed bytes are never rolled back

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod allocator;
mod config;
mod error;
mod lock;
mod registry;
mod store;
mod stream;
mod types;

pub use config::{Config, DeletePolicy, InterruptedWritePolicy, StatusPolicy};
pub use error::{CoreError, CoreResult};
pub use lock::{LockGuard, LockManager, LockSnapshot};
pub use registry::{StoreHandle, StoreRegistry};
pub use store::ByteStore;
pub use stream::{ReadStream, StoreWriter, TransformSink, TransformSource, WriteSummary};
pub use types::{ByteRange, LockMode, ReadOptions, SessionId, StoreStatus, WriteOptions};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
