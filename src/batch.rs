//! Batch conversion of `img/` and `label/` directories

use crate::config::CodecConfig;
use crate::container::Container;
use crate::error::{Result, VolchunkError};
use crate::io::{FileSystemIOManager, IOManager, RetryPolicy};
use crate::nifti::{Nifti1Codec, VolumeFileCodec};
use crate::pipeline::{VolumeDecoder, VolumeEncoder};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// Extension of container files written by [`crate::Container::to_bytes`]
pub const CONTAINER_EXTENSION: &str = ".vck";

/// Conversion direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// NIfTI volume files to containers
    Encode,
    /// Containers to NIfTI volume files
    Decode,
}

/// Settings for one batch run
#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub datapath: PathBuf,
    pub savepath: PathBuf,
    pub direction: Direction,
    /// Subdirectories of `datapath` to convert, mirrored under `savepath`
    pub subdirs: Vec<String>,
    /// Files converted concurrently
    pub jobs: usize,
    pub retry: RetryPolicy,
}

impl BatchConfig {
    pub fn new(
        datapath: impl AsRef<Path>,
        savepath: impl AsRef<Path>,
        direction: Direction,
    ) -> Self {
        let jobs = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self {
            datapath: datapath.as_ref().to_path_buf(),
            savepath: savepath.as_ref().to_path_buf(),
            direction,
            subdirs: vec!["img".to_string(), "label".to_string()],
            jobs,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    pub fn with_subdirs(mut self, subdirs: Vec<String>) -> Self {
        self.subdirs = subdirs;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Output file name for an input file, or `None` if the file is not converted.
///
/// AppleDouble companions (`._*`) are always skipped.
pub fn output_name(file_name: &str, direction: Direction) -> Option<String> {
    if file_name.starts_with("._") {
        return None;
    }
    match direction {
        Direction::Encode => file_name
            .strip_suffix(".nii.gz")
            .or_else(|| file_name.strip_suffix(".nii"))
            .map(|stem| format!("{}{}", stem, CONTAINER_EXTENSION)),
        Direction::Decode => file_name
            .strip_suffix(CONTAINER_EXTENSION)
            .map(|stem| format!("{}.nii.gz", stem)),
    }
}

/// Encode one NIfTI file into container bytes
pub fn encode_file(bytes: &[u8], config: CodecConfig) -> Result<Vec<u8>> {
    let source = Nifti1Codec::gzipped().read(bytes)?;
    let (container, _) = VolumeEncoder::new(config)?.encode_source(&source)?;
    container.to_bytes()
}

/// Decode container bytes into one gzipped NIfTI file
pub fn decode_file(bytes: &[u8], config: CodecConfig) -> Result<Vec<u8>> {
    let container = Container::from_bytes(bytes)?;
    let volume = VolumeDecoder::new(config)?.decode(&container)?;
    Nifti1Codec::gzipped().with_level(config.level).write(&volume)
}

/// Result for one file
#[derive(Debug, Clone, Serialize)]
pub struct FileOutcome {
    pub input: String,
    pub output: String,
    pub error: Option<String>,
}

/// Result of a batch run; one failed file never stops the others
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub converted: Vec<FileOutcome>,
    pub failed: Vec<FileOutcome>,
    pub skipped: Vec<String>,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn summary(&self) -> String {
        format!(
            "{} converted, {} failed, {} skipped",
            self.converted.len(),
            self.failed.len(),
            self.skipped.len()
        )
    }
}

struct Job {
    input: String,
    output: String,
}

/// Convert every matching file under the configured subdirectories
pub async fn run(config: &BatchConfig, codec: CodecConfig) -> Result<BatchReport> {
    codec.validate()?;
    let source = FileSystemIOManager::new(&config.datapath);
    let target = FileSystemIOManager::new(&config.savepath);

    let mut report = BatchReport::default();
    let mut jobs = Vec::new();
    for subdir in &config.subdirs {
        tokio::fs::create_dir_all(config.savepath.join(subdir)).await?;
        let files = source.list(subdir).await?;
        if files.is_empty() {
            warn!(dir = %config.datapath.join(subdir).display(), "no files to convert");
        }
        for name in files {
            let input = format!("{}/{}", subdir, name);
            match output_name(&name, config.direction) {
                Some(out) => jobs.push(Job {
                    input,
                    output: format!("{}/{}", subdir, out),
                }),
                None => report.skipped.push(input),
            }
        }
    }

    let outcomes: Vec<FileOutcome> = stream::iter(jobs)
        .map(|job| {
            let source = &source;
            let target = &target;
            async move {
                info!("Converting {} to {}", job.input, job.output);
                let result =
                    convert_one(source, target, &job, config.direction, config.retry, codec).await;
                FileOutcome {
                    input: job.input,
                    output: job.output,
                    error: result.err().map(|e| e.to_string()),
                }
            }
        })
        .buffer_unordered(config.jobs.max(1))
        .collect()
        .await;

    for outcome in outcomes {
        match &outcome.error {
            Some(err) => {
                error!(input = %outcome.input, error = %err, "conversion failed");
                report.failed.push(outcome);
            }
            None => report.converted.push(outcome),
        }
    }

    info!("{}", report.summary());
    Ok(report)
}

async fn convert_one(
    source: &dyn IOManager,
    target: &dyn IOManager,
    job: &Job,
    direction: Direction,
    retry: RetryPolicy,
    codec: CodecConfig,
) -> Result<()> {
    let bytes = retry.read(source, &job.input).await?;

    let converted = tokio::task::spawn_blocking(move || match direction {
        Direction::Encode => encode_file(&bytes, codec),
        Direction::Decode => decode_file(&bytes, codec),
    })
    .await
    .map_err(|e| VolchunkError::Io(std::io::Error::other(e)))??;

    retry.write(target, &job.output, &converted).await
}
