//! Write command implementation.

use super::write_options;
use bytes::BytesMut;
use rangestore_core::{ByteStore, WriteSummary};
use tokio::io::{self, AsyncRead, AsyncReadExt};

const INPUT_CHUNK: usize = 64 * 1024;

/// Runs the write command, copying stdin into the range.
pub async fn run(
    store: &ByteStore,
    name: &str,
    start: Option<i64>,
    end: Option<i64>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut stdin = io::stdin();
    let summary = copy_into(store, name, start, end, &mut stdin).await?;
    if summary.range.end().is_some() && !summary.is_complete() {
        tracing::warn!(
            store = name,
            written = summary.bytes_written,
            range = %summary.range,
            "input ended before the range was filled"
        );
    }
    println!("Wrote {} bytes to {name}", summary.bytes_written);
    Ok(())
}

/// Copies `input` into a write session on `name`.
///
/// A read error aborts the session; bytes already committed stay.
pub async fn copy_into<R: AsyncRead + Unpin>(
    store: &ByteStore,
    name: &str,
    start: Option<i64>,
    end: Option<i64>,
    input: &mut R,
) -> Result<WriteSummary, Box<dyn std::error::Error>> {
    let mut writer = store.write(name, write_options(start, end)).await?;
    loop {
        let mut buf = BytesMut::with_capacity(INPUT_CHUNK);
        match input.read_buf(&mut buf).await {
            Ok(0) => break,
            Ok(_) => writer.write(buf.freeze()).await?,
            Err(e) => return Err(writer.abort(e.to_string()).into()),
        }
    }
    Ok(writer.close().await?)
}
