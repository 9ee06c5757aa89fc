//! Stress tests for rangestore.
//!
//! These runs hammer one store from many tasks and check that range
//! locks keep every observed chunk consistent.

use crate::fixtures::{read_range, write_range};
use rangestore_core::{ByteStore, ReadOptions, WriteOptions};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Successful operations.
    pub successful_ops: usize,
    /// Failed operations.
    pub failed_ops: usize,
    /// Reads that saw a slot holding bytes from more than one write.
    pub torn_reads: usize,
    /// Total duration.
    pub duration: Duration,
    /// Operations per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, failed: usize, torn_reads: usize, duration: Duration) -> Self {
        let total = successful + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            failed_ops: failed,
            torn_reads,
            duration,
            ops_per_second,
        }
    }

    /// Prints a summary of the test.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {} ===", name);
        println!("Total operations: {}", self.total_ops);
        println!("Successful: {}", self.successful_ops);
        println!("Failed: {}", self.failed_ops);
        println!("Torn reads: {}", self.torn_reads);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} ops/sec", self.ops_per_second);
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Operations per task.
    pub operations: usize,
    /// Number of concurrent writer tasks.
    pub writers: usize,
    /// Number of concurrent reader tasks.
    pub readers: usize,
    /// Number of fixed-size slots in the store.
    pub slots: usize,
    /// Size of each slot in bytes.
    pub slot_size: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 200,
            writers: 4,
            readers: 4,
            slots: 8,
            slot_size: 512,
        }
    }
}

impl StressConfig {
    fn slot_range(&self, slot: usize) -> WriteOptions {
        let start = (slot * self.slot_size) as i64;
        WriteOptions::new().start(start).end(start + self.slot_size as i64)
    }
}

#[derive(Default)]
struct Counters {
    successful: AtomicUsize,
    failed: AtomicUsize,
    torn: AtomicUsize,
}

impl Counters {
    fn record<T, E>(&self, result: &Result<T, E>) {
        let counter = if result.is_ok() {
            &self.successful
        } else {
            &self.failed
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn finish(&self, started: Instant) -> StressTestResult {
        StressTestResult::new(
            self.successful.load(Ordering::Relaxed),
            self.failed.load(Ordering::Relaxed),
            self.torn.load(Ordering::Relaxed),
            started.elapsed(),
        )
    }
}

/// Fills every slot of `name` with zeros.
pub async fn prepare_slots(store: &ByteStore, name: &str, config: &StressConfig) {
    let data = vec![0u8; config.slots * config.slot_size];
    write_range(store, name, WriteOptions::new(), &data)
        .await
        .expect("Failed to prepare slots");
}

/// Runs writers that each fill whole slots with their own byte, alongside
/// readers that check every slot they see is uniform.
///
/// Writers fill a slot in several chunks and yield between them, so any
/// gap in the range locks shows up as a torn read.
pub async fn stress_slot_writers(
    store: &ByteStore,
    name: &str,
    config: &StressConfig,
) -> StressTestResult {
    prepare_slots(store, name, config).await;
    let counters = Arc::new(Counters::default());
    let started = Instant::now();
    let mut tasks = Vec::new();

    for writer in 0..config.writers {
        let (store, name, config, counters) =
            (store.clone(), name.to_string(), config.clone(), Arc::clone(&counters));
        tasks.push(tokio::spawn(async move {
            let fill = writer as u8 + 1;
            let piece = (config.slot_size / 4).max(1);
            for op in 0..config.operations {
                let slot = (op * (writer + 1)) % config.slots;
                let result = async {
                    let mut session = store.write(&name, config.slot_range(slot)).await?;
                    let mut left = config.slot_size;
                    while left > 0 {
                        let n = piece.min(left);
                        session.write(vec![fill; n]).await?;
                        left -= n;
                        tokio::task::yield_now().await;
                    }
                    session.close().await
                }
                .await;
                counters.record(&result);
            }
        }));
    }

    for _ in 0..config.readers {
        let (store, name, config, counters) =
            (store.clone(), name.to_string(), config.clone(), Arc::clone(&counters));
        tasks.push(tokio::spawn(async move {
            for _ in 0..config.operations {
                let result = read_range(&store, &name, ReadOptions::new()).await;
                counters.record(&result);
                if let Ok(data) = result {
                    let torn = data
                        .chunks(config.slot_size)
                        .filter(|slot| slot.iter().any(|&b| b != slot[0]))
                        .count();
                    counters.torn.fetch_add(torn, Ordering::Relaxed);
                }
            }
        }));
    }

    for task in tasks {
        task.await.expect("Stress task panicked");
    }
    counters.finish(started)
}

/// Runs concurrent appenders on disjoint slots past the current end, so
/// allocation races with writes.
pub async fn stress_parallel_growth(
    store: &ByteStore,
    name: &str,
    config: &StressConfig,
) -> StressTestResult {
    let counters = Arc::new(Counters::default());
    let started = Instant::now();
    let mut tasks = Vec::new();

    for slot in 0..config.slots {
        let (store, name, config, counters) =
            (store.clone(), name.to_string(), config.clone(), Arc::clone(&counters));
        tasks.push(tokio::spawn(async move {
            let data = vec![slot as u8 + 1; config.slot_size];
            let result = write_range(&store, &name, config.slot_range(slot), &data).await;
            counters.record(&result);
        }));
    }
    for task in tasks {
        task.await.expect("Stress task panicked");
    }

    if let Ok(data) = read_range(store, name, ReadOptions::new()).await {
        let torn = data
            .chunks(config.slot_size)
            .enumerate()
            .filter(|(slot, bytes)| bytes.iter().any(|&b| b != *slot as u8 + 1))
            .count();
        counters.torn.fetch_add(torn, Ordering::Relaxed);
    }
    counters.finish(started)
}
