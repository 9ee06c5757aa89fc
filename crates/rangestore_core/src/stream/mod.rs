//! Streaming coordinators.
//!
//! - [`ReadStream`]: chunks out of a read-locked range
//! - [`StoreWriter`]: chunks into a write-locked range
//! - [`TransformSource`] / [`TransformSink`]: read-modify-write over one
//!   write-locked range

mod read;
mod transform;
mod write;

pub use read::ReadStream;
pub use transform::{TransformSink, TransformSource};
pub use write::{StoreWriter, WriteSummary};

pub(crate) use transform::TransformSession;
pub(crate) use write::{WriteCursor, WriteSettings};
