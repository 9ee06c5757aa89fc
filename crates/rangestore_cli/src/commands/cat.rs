//! Cat command implementation.

use super::read_options;
use futures::StreamExt;
use rangestore_core::ByteStore;
use tokio::io::{self, AsyncWrite, AsyncWriteExt};

/// Runs the cat command, streaming the range to stdout.
pub async fn run(
    store: &ByteStore,
    name: &str,
    start: Option<i64>,
    end: Option<i64>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut stdout = io::stdout();
    let copied = copy_range(store, name, start, end, &mut stdout).await?;
    tracing::debug!(store = name, bytes = copied, "cat finished");
    Ok(())
}

/// Copies a range of `name` into `out`, returning the byte count.
pub async fn copy_range<W: AsyncWrite + Unpin>(
    store: &ByteStore,
    name: &str,
    start: Option<i64>,
    end: Option<i64>,
    out: &mut W,
) -> Result<u64, Box<dyn std::error::Error>> {
    let mut stream = store.read(name, read_options(start, end)).await?;
    let mut copied = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        out.write_all(&chunk).await?;
        copied += chunk.len() as u64;
    }
    out.flush().await?;
    Ok(copied)
}
