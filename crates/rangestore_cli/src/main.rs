//! rangestore CLI
//!
//! Command-line access to a directory of byte stores.
//!
//! # Commands
//!
//! - `cat` - Stream a byte range of a store to stdout
//! - `write` - Write stdin into a byte range of a store
//! - `stat` - Display size and timestamps of a store
//! - `resize` - Truncate or extend a store
//! - `delete` - Remove a store

mod commands;

use clap::{Parser, Subcommand};
use rangestore_core::{ByteStore, Config, InterruptedWritePolicy};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// rangestore command-line tools.
#[derive(Parser)]
#[command(name = "rangestore")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the store directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream a byte range of a store to stdout
    Cat {
        /// Store name
        name: String,

        /// First byte to read; negative counts back from the end
        #[arg(short, long, allow_hyphen_values = true)]
        start: Option<i64>,

        /// Byte after the last one to read; negative counts back from the end
        #[arg(short, long, allow_hyphen_values = true)]
        end: Option<i64>,

        /// Read chunk size in bytes
        #[arg(long)]
        chunk_size: Option<usize>,
    },

    /// Write stdin into a byte range of a store
    Write {
        /// Store name
        name: String,

        /// First byte to write; negative counts back from the end
        #[arg(short, long, allow_hyphen_values = true)]
        start: Option<i64>,

        /// Byte after the last one to write; negative counts back from the end
        #[arg(short, long, allow_hyphen_values = true)]
        end: Option<i64>,

        /// Zero the unwritten tail of a bounded range if input ends early
        #[arg(long)]
        zero_fill: bool,
    },

    /// Display size and timestamps of a store
    Stat {
        /// Store name
        name: String,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Truncate or extend a store
    Resize {
        /// Store name
        name: String,

        /// New length; negative counts back from the current end
        #[arg(allow_hyphen_values = true)]
        end: i64,
    },

    /// Remove a store
    Delete {
        /// Store name
        name: String,
    },

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging; stdout carries store data, so logs go to stderr
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Cat {
            name,
            start,
            end,
            chunk_size,
        } => {
            let path = cli.path.ok_or("Store path required for cat")?;
            let mut config = Config::default();
            if let Some(size) = chunk_size {
                config = config.read_chunk_size(size);
            }
            let store = ByteStore::open_dir(&path, config)?;
            commands::cat::run(&store, &name, start, end).await?;
        }
        Commands::Write {
            name,
            start,
            end,
            zero_fill,
        } => {
            let path = cli.path.ok_or("Store path required for write")?;
            let policy = if zero_fill {
                InterruptedWritePolicy::ZeroFill
            } else {
                InterruptedWritePolicy::Retain
            };
            let store = ByteStore::open_dir(&path, Config::default().interrupted_write(policy))?;
            commands::write::run(&store, &name, start, end).await?;
        }
        Commands::Stat { name, format } => {
            let path = cli.path.ok_or("Store path required for stat")?;
            let store = ByteStore::open_dir(&path, Config::default())?;
            commands::stat::run(&store, &name, &format).await?;
        }
        Commands::Resize { name, end } => {
            let path = cli.path.ok_or("Store path required for resize")?;
            let store = ByteStore::open_dir(&path, Config::default())?;
            commands::resize::run(&store, &name, end).await?;
        }
        Commands::Delete { name } => {
            let path = cli.path.ok_or("Store path required for delete")?;
            let store = ByteStore::open_dir(&path, Config::default())?;
            commands::delete::run(&store, &name).await?;
        }
        Commands::Version => {
            println!("rangestore CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("rangestore core v{}", rangestore_core::VERSION);
        }
    }

    Ok(())
}
