//! Property-based test generators using proptest.
//!
//! Provides strategies for generating store names, payloads, and
//! operation sequences that can be replayed against a [`StoreHarness`].

use crate::integration::StoreHarness;
use proptest::prelude::*;
use rangestore_core::{ByteRange, LockMode};

/// Strategy for generating store names from a small pool, so operations
/// collide on the same store often.
pub fn store_name_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["alpha", "beta", "gamma"]).prop_map(str::to_string)
}

/// Strategy for generating arbitrary store names.
pub fn any_store_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z0-9_.-]{1,32}")
        .expect("Invalid regex")
        .prop_filter("Store name must not be a dot path", |s| s != "." && s != "..")
}

/// Strategy for generating payloads (arbitrary bytes).
pub fn payload_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..256)
}

/// Strategy for generating a payload split into chunks at arbitrary
/// boundaries, empty chunks included.
pub fn chunk_split_strategy() -> impl Strategy<Value = Vec<Vec<u8>>> {
    payload_strategy()
        .prop_flat_map(|data| {
            let len = data.len();
            (Just(data), prop::collection::vec(0..=len, 0..8))
        })
        .prop_map(|(data, mut cuts)| {
            cuts.sort_unstable();
            let mut chunks = Vec::with_capacity(cuts.len() + 1);
            let mut from = 0;
            for cut in cuts {
                chunks.push(data[from..cut].to_vec());
                from = cut;
            }
            chunks.push(data[from..].to_vec());
            chunks
        })
}

/// Strategy for generating byte ranges, bounded and open-ended.
pub fn byte_range_strategy() -> impl Strategy<Value = ByteRange> {
    prop_oneof![
        (0u64..1024, 0u64..1024).prop_map(|(start, len)| ByteRange::bounded(start, start + len)),
        (0u64..1024).prop_map(ByteRange::starting_at),
    ]
}

/// Strategy for generating lock modes.
pub fn lock_mode_strategy() -> impl Strategy<Value = LockMode> {
    prop_oneof![Just(LockMode::Read), Just(LockMode::Write)]
}

/// A store operation that can be replayed against a harness.
#[derive(Debug, Clone)]
pub enum StoreOp {
    /// Write a payload at an offset.
    Write {
        /// Store name.
        name: String,
        /// Start offset.
        offset: u64,
        /// Bytes to write.
        data: Vec<u8>,
    },
    /// Truncate or extend.
    Resize {
        /// Store name.
        name: String,
        /// New length.
        len: u64,
    },
    /// Invert every byte with a transform.
    Invert {
        /// Store name.
        name: String,
    },
    /// Remove the store.
    Delete {
        /// Store name.
        name: String,
    },
}

impl StoreOp {
    /// Applies this operation through `harness`.
    pub async fn apply(&self, harness: &mut StoreHarness) {
        match self {
            Self::Write { name, offset, data } => harness.write_at(name, *offset, data).await,
            Self::Resize { name, len } => harness.resize(name, *len).await,
            Self::Invert { name } => harness.transform_map(name, |b| !b).await,
            Self::Delete { name } => harness.delete(name).await,
        }
    }
}

/// Strategy for generating a single store operation.
pub fn store_op_strategy() -> impl Strategy<Value = StoreOp> {
    prop_oneof![
        4 => (store_name_strategy(), 0u64..512, payload_strategy())
            .prop_map(|(name, offset, data)| StoreOp::Write { name, offset, data }),
        2 => (store_name_strategy(), 0u64..512)
            .prop_map(|(name, len)| StoreOp::Resize { name, len }),
        1 => store_name_strategy().prop_map(|name| StoreOp::Invert { name }),
        1 => store_name_strategy().prop_map(|name| StoreOp::Delete { name }),
    ]
}

/// Strategy for generating a sequence of store operations.
pub fn store_ops_strategy(max_len: usize) -> impl Strategy<Value = Vec<StoreOp>> {
    prop::collection::vec(store_op_strategy(), 1..max_len)
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for thorough tests.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            cases: 1024,
            max_shrink_iters: 10000,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
