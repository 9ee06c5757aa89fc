//! Resize command implementation.

use rangestore_core::ByteStore;

/// Runs the resize command.
pub async fn run(
    store: &ByteStore,
    name: &str,
    end: i64,
) -> Result<(), Box<dyn std::error::Error>> {
    store.resize(name, end).await?;
    let size = store.status(name).await?.map(|s| s.size).unwrap_or(0);
    println!("Resized {name} to {size} bytes");
    Ok(())
}
