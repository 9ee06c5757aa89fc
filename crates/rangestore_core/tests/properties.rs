//! Property tests over arbitrary chunk boundaries.

mod common;

use common::{memory_store, read_all};
use proptest::prelude::*;
use rangestore_core::{Config, CoreError, ReadOptions, WriteOptions};

/// Data plus cut points splitting it into chunks, empty chunks included.
fn chunked_data() -> impl Strategy<Value = (Vec<u8>, Vec<usize>)> {
    prop::collection::vec(any::<u8>(), 0..512).prop_flat_map(|data| {
        let len = data.len();
        (Just(data), prop::collection::vec(0..=len, 0..8))
    })
}

fn split(data: &[u8], mut cuts: Vec<usize>) -> Vec<Vec<u8>> {
    cuts.sort_unstable();
    let mut chunks = Vec::new();
    let mut from = 0;
    for cut in cuts {
        chunks.push(data[from..cut].to_vec());
        from = cut;
    }
    chunks.push(data[from..].to_vec());
    chunks
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn chunk_boundaries_do_not_matter(
        (data, cuts) in chunked_data(),
        start in 0u64..64,
        read_chunk in 1usize..100,
    ) {
        // Nothing to allocate or commit means no store is created
        prop_assume!(start > 0 || !data.is_empty());
        let store = memory_store(Config::new().read_chunk_size(read_chunk));
        let back = runtime().block_on(async {
            let end = (start as usize + data.len()) as i64;
            let mut writer = store
                .write("doc", WriteOptions::new().start(start as i64).end(end))
                .await
                .unwrap();
            for chunk in split(&data, cuts) {
                writer.write(chunk).await.unwrap();
            }
            read_all(&store, "doc", ReadOptions::new()).await.unwrap()
        });

        prop_assert_eq!(back.len(), start as usize + data.len());
        prop_assert!(back[..start as usize].iter().all(|&b| b == 0));
        prop_assert_eq!(&back[start as usize..], &data[..]);
    }

    #[test]
    fn overflow_keeps_exactly_the_fitting_prefix(
        (data, cuts) in chunked_data(),
        limit in 1usize..256,
    ) {
        prop_assume!(data.len() > limit);
        let store = memory_store(Config::default());
        let (failure, back) = runtime().block_on(async {
            let mut writer = store
                .write("doc", WriteOptions::new().end(limit as i64))
                .await
                .unwrap();
            let mut failure = None;
            for chunk in split(&data, cuts) {
                if let Err(err) = writer.write(chunk).await {
                    failure = Some(err);
                    break;
                }
            }
            (failure, read_all(&store, "doc", ReadOptions::new()).await.unwrap())
        });

        let is_overflow = matches!(failure, Some(CoreError::WriteOverflow { .. }));
        prop_assert!(is_overflow);
        prop_assert_eq!(&back[..], &data[..limit]);
    }
}
