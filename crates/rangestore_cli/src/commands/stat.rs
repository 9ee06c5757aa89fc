//! Stat command implementation.

use rangestore_core::{ByteStore, StoreStatus};
use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};

/// Store status as printed by the CLI.
#[derive(Debug, Serialize)]
pub struct StatResult {
    /// Store name.
    pub name: String,
    /// Length in bytes.
    pub size: u64,
    /// Creation time, seconds since the Unix epoch.
    pub created: u64,
    /// Last modification time, seconds since the Unix epoch.
    pub modified: u64,
}

impl StatResult {
    fn new(name: &str, status: StoreStatus) -> Self {
        Self {
            name: name.to_string(),
            size: status.size,
            created: unix_seconds(status.created),
            modified: unix_seconds(status.modified),
        }
    }
}

fn unix_seconds(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Runs the stat command.
pub async fn run(
    store: &ByteStore,
    name: &str,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let status = store
        .status(name)
        .await?
        .ok_or_else(|| format!("No store named {name:?}"))?;
    let result = StatResult::new(name, status);

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            println!("Store:    {}", result.name);
            println!("Size:     {} bytes", result.size);
            println!("Created:  {}", result.created);
            println!("Modified: {}", result.modified);
        }
    }

    Ok(())
}
