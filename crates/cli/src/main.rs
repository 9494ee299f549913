//! Command-line client for stitch.

mod api_client;

use anyhow::{Context, Result};
use api_client::{ApiClient, MergeRequest};
use bytes::Bytes;
use clap::{Args, Parser, Subcommand};
use futures::StreamExt;
use serde::Serialize;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncSeekExt};

const DEFAULT_CHUNK_SIZE: u64 = 8 * 1024 * 1024;

#[derive(Parser)]
#[command(name = "stitchctl")]
#[command(about = "Command-line client for the stitch upload coordinator")]
#[command(version)]
struct Cli {
    /// Server URL
    #[arg(long, env = "STITCH_SERVER", default_value = "http://127.0.0.1:8080", global = true)]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct SessionArgs {
    /// Upload session id
    #[arg(long)]
    session: String,

    /// Filename the session was uploaded under
    #[arg(long)]
    filename: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a file in chunks and merge it
    Upload {
        /// File to upload
        file: PathBuf,

        /// Chunk size in bytes
        #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
        chunk_size: u64,

        /// Number of chunks in flight at once
        #[arg(long, default_value_t = 4)]
        parallel: usize,

        /// Session id; reuse one to resume an interrupted upload (default: random)
        #[arg(long)]
        session: Option<String>,

        /// Filename to upload under (default: the file's own name)
        #[arg(long)]
        name: Option<String>,

        /// Leave the chunks in place instead of merging
        #[arg(long)]
        no_merge: bool,
    },
    /// Show uploaded or missing chunks of a session
    Status {
        #[command(flatten)]
        session: SessionArgs,

        /// Report the chunks missing from 0..expected_total
        #[arg(long)]
        expected_total: Option<u64>,
    },
    /// Merge a session's chunks into its artifact
    Merge {
        #[command(flatten)]
        session: SessionArgs,

        /// Require exactly chunks 0..expected_total
        #[arg(long, conflicts_with = "chunks")]
        expected_total: Option<u64>,

        /// Merge exactly these chunks (comma-separated)
        #[arg(long, value_delimiter = ',')]
        chunks: Vec<u64>,
    },
    /// Delete all chunks of a session
    Purge {
        #[command(flatten)]
        session: SessionArgs,
    },
    /// Check server and storage health
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let Cli { server, command } = Cli::parse();
    let client = ApiClient::new(&server)?;

    match command {
        Commands::Upload {
            file,
            chunk_size,
            parallel,
            session,
            name,
            no_merge,
        } => {
            let options = UploadOptions {
                chunk_size,
                parallel,
                session,
                name,
                merge: !no_merge,
            };
            handle_upload_command(&client, &file, options).await
        }
        Commands::Status {
            session,
            expected_total,
        } => print_json(
            &client
                .status(&session.session, &session.filename, expected_total)
                .await?,
        ),
        Commands::Merge {
            session,
            expected_total,
            chunks,
        } => print_json(
            &client
                .merge(
                    &session.session,
                    &session.filename,
                    MergeRequest {
                        expected_total,
                        chunks,
                    },
                )
                .await?,
        ),
        Commands::Purge { session } => {
            print_json(&client.purge(&session.session, &session.filename).await?)
        }
        Commands::Health => print_json(&client.health().await?),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

struct UploadOptions {
    chunk_size: u64,
    parallel: usize,
    session: Option<String>,
    name: Option<String>,
    merge: bool,
}

/// Byte layout of a file split into fixed-size chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ChunkLayout {
    file_size: u64,
    chunk_size: u64,
}

impl ChunkLayout {
    fn new(file_size: u64, chunk_size: u64) -> Result<Self> {
        if chunk_size == 0 {
            anyhow::bail!("chunk size must be at least 1 byte");
        }
        Ok(Self {
            file_size,
            chunk_size,
        })
    }

    /// Number of chunks. An empty file is still one (empty) chunk.
    fn total(&self) -> u64 {
        self.file_size.div_ceil(self.chunk_size).max(1)
    }

    /// Offset and length of chunk `index`.
    fn range(&self, index: u64) -> (u64, u64) {
        let offset = index * self.chunk_size;
        let len = self.chunk_size.min(self.file_size.saturating_sub(offset));
        (offset, len)
    }
}

async fn read_chunk(path: &Path, offset: u64, len: u64) -> Result<Bytes> {
    let mut file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("failed to open {}", path.display()))?;
    file.seek(SeekFrom::Start(offset)).await?;
    let mut data = vec![0u8; usize::try_from(len).context("chunk too large for memory")?];
    file.read_exact(&mut data).await?;
    Ok(Bytes::from(data))
}

async fn handle_upload_command(client: &ApiClient, path: &Path, options: UploadOptions) -> Result<()> {
    let file_size = tokio::fs::metadata(path)
        .await
        .with_context(|| format!("failed to stat {}", path.display()))?
        .len();
    let layout = ChunkLayout::new(file_size, options.chunk_size)?;
    let total = layout.total();

    let filename = match options.name {
        Some(name) => name,
        None => path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .context("cannot derive a filename from the path, pass --name")?,
    };
    let session_id = options
        .session
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    // Skip chunks an earlier attempt already delivered.
    let status = client.status(&session_id, &filename, Some(total)).await?;
    let missing = status.missing.unwrap_or_else(|| (0..total).collect());
    if (missing.len() as u64) < total {
        println!(
            "Resuming session {session_id}: {} of {total} chunks already uploaded",
            total - missing.len() as u64
        );
    }

    let parallel = options.parallel.max(1);
    let mut uploads = futures::stream::iter(missing.into_iter().map(|index| {
        let session_id = session_id.as_str();
        let filename = filename.as_str();
        async move {
            let (offset, len) = layout.range(index);
            let data = read_chunk(path, offset, len).await?;
            client
                .upload_chunk(session_id, filename, index, Some(total), data)
                .await
                .with_context(|| format!("failed to upload chunk {index}"))
        }
    }))
    .buffer_unordered(parallel);

    let mut uploaded = 0usize;
    while let Some(result) = uploads.next().await {
        let response = result?;
        uploaded += 1;
        tracing::debug!(index = response.chunk_index, size = response.size, "Chunk uploaded");
    }
    println!("Uploaded {uploaded} chunks to session {session_id}");

    if !options.merge {
        println!("Merge later with: stitchctl merge --session {session_id} --filename {filename} --expected-total {total}");
        return Ok(());
    }

    let merged = client
        .merge(
            &session_id,
            &filename,
            MergeRequest {
                expected_total: Some(total),
                chunks: Vec::new(),
            },
        )
        .await?;
    for failure in &merged.cleanup_failures {
        eprintln!("warning: chunk {} was not cleaned up: {}", failure.key, failure.error);
    }
    print_json(&merged)
}
