//! Delete command implementation.

use rangestore_core::ByteStore;

/// Runs the delete command.
pub async fn run(store: &ByteStore, name: &str) -> Result<(), Box<dyn std::error::Error>> {
    if store.delete(name).await? {
        println!("Deleted {name}");
    } else {
        println!("No store named {name:?}");
    }
    Ok(())
}
