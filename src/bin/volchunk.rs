//! volchunk command line
//!
//! ## Usage
//!
//! ```bash
//! # NIfTI directories to block-chunked containers
//! volchunk encode --datapath data/nifti --savepath data/chunked
//!
//! # Back to NIfTI
//! volchunk decode --datapath data/chunked --savepath data/restored
//!
//! # Describe one container
//! volchunk inspect data/chunked/img/case_00000.vck
//! ```

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use volchunk::batch::{self, BatchConfig, Direction};
use volchunk::{CodecConfig, CompressionLevel, CompressionMethod, Container, ContainerMode};
use volchunk::{ContainerSummary, RetryPolicy};

#[derive(Parser, Debug)]
#[command(name = "volchunk")]
#[command(version)]
#[command(about = "Block-chunked storage for 3D medical volumes", long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert NIfTI files to containers
    Encode(ConvertArgs),
    /// Convert containers to NIfTI files
    Decode(ConvertArgs),
    /// Print a JSON summary of one container
    Inspect {
        /// Container file
        file: PathBuf,
    },
}

#[derive(Args, Debug)]
struct ConvertArgs {
    /// Input root holding the img/ and label/ directories
    #[arg(long)]
    datapath: PathBuf,

    /// Output root; subdirectories are created as needed
    #[arg(long)]
    savepath: PathBuf,

    /// Container layout: chunked or whole
    #[arg(long, default_value = "chunked")]
    mode: ContainerMode,

    /// Block edge length in voxels
    #[arg(long, default_value = "64")]
    block_edge: usize,

    /// Block compression: deflate, zstd or none
    #[arg(long, default_value = "deflate")]
    compression: CompressionMethod,

    /// Compression level (0-9)
    #[arg(long, default_value = "9")]
    level: u8,

    /// Files converted concurrently (defaults to available parallelism)
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Attempts per file read or write
    #[arg(long, default_value = "3")]
    retries: u32,

    /// Subdirectories to convert
    #[arg(long, value_delimiter = ',', default_value = "img,label")]
    subdirs: Vec<String>,
}

impl ConvertArgs {
    fn codec_config(&self) -> CodecConfig {
        CodecConfig::new()
            .with_mode(self.mode)
            .with_block_edge(self.block_edge)
            .with_compression(self.compression)
            .with_level(CompressionLevel::new(self.level))
    }

    fn batch_config(&self, direction: Direction) -> BatchConfig {
        let mut config = BatchConfig::new(&self.datapath, &self.savepath, direction)
            .with_subdirs(self.subdirs.clone())
            .with_retry(RetryPolicy::new(self.retries, RetryPolicy::default().backoff));
        if let Some(jobs) = self.jobs {
            config = config.with_jobs(jobs);
        }
        config
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    match cli.command {
        Command::Encode(args) => convert(args, Direction::Encode).await,
        Command::Decode(args) => convert(args, Direction::Decode).await,
        Command::Inspect { file } => inspect(file).await,
    }
}

async fn convert(args: ConvertArgs, direction: Direction) -> anyhow::Result<()> {
    let codec = args.codec_config();
    let config = args.batch_config(direction);
    info!(
        datapath = %config.datapath.display(),
        savepath = %config.savepath.display(),
        mode = %codec.mode,
        block_edge = codec.block_edge,
        compression = %codec.compression,
        jobs = config.jobs,
        "starting {:?}",
        direction
    );

    let report = batch::run(&config, codec).await?;
    if !report.is_success() {
        for failed in &report.failed {
            eprintln!(
                "failed: {}: {}",
                failed.input,
                failed.error.as_deref().unwrap_or("unknown error")
            );
        }
        bail!("{}", report.summary());
    }
    Ok(())
}

async fn inspect(file: PathBuf) -> anyhow::Result<()> {
    let bytes = tokio::fs::read(&file)
        .await
        .with_context(|| format!("reading {}", file.display()))?;
    let container = Container::from_bytes(&bytes)?;
    let summary = ContainerSummary::from_container(&container)?;
    info!("{}", summary.summary());
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
