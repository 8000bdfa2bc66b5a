//! The batch job: plan file groups, map every image through the pipeline,
//! shuffle the encoded records by series and aggregate each series.
//!
//! Map and reduce tasks run on a rayon pool. The shuffle between them is the
//! only point where results from different groups meet.

use std::{
    collections::BTreeMap,
    hash::Hasher,
    path::{Path, PathBuf},
};

use image::GrayImage;
use log::{debug, info, warn};
use rayon::prelude::*;
use serde::Serialize;
use siphasher::sip::SipHasher13;
use thiserror::Error;

use crate::aggregate::{AggregateError, aggregate};
use crate::codec::{CodecError, Decode, Encode};
use crate::config::{ConfigError, JobConfig};
use crate::enums::FailurePolicy;
use crate::output::{self, DebugDumper, OutputError};
use crate::pipeline::{PipelineError, StagePipeline};
use crate::reader::{GroupReader, ReaderError, WholeFileRecord};
use crate::record::{ImageRecord, SeriesKey, SeriesRecord};
use crate::scan::{ScanError, ScanImage};
use crate::slice::SliceImage;
use crate::split::{FileGroup, SplitAggregator, SplitError, list_input_files};

#[derive(Debug, Error)]
pub enum JobError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Planning failed: {0}")]
    Plan(#[from] SplitError),

    #[error("Failed to start worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("Group {group} failed after {attempts} attempt(s): {source}")]
    TaskFailed {
        group: usize,
        attempts: u32,
        #[source]
        source: MapError,
    },

    #[error("Shuffle failed: {0}")]
    Shuffle(#[source] CodecError),

    #[error("Output failed: {0}")]
    Output(#[from] OutputError),
}

/// Why a map task over one file group stopped.
#[derive(Debug, Error)]
pub enum MapError {
    #[error(transparent)]
    Read(#[from] ReaderError),

    #[error("failed to encode record: {0}")]
    Encode(#[from] CodecError),

    #[error("failed to write debug images: {0}")]
    Debug(#[from] OutputError),
}

impl MapError {
    /// Only read failures are worth another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Read(err) if err.is_transient())
    }
}

/// One image after the pipeline, ready to be emitted.
#[derive(Debug, Clone)]
pub struct MappedImage {
    pub key: SeriesKey,
    pub record: ImageRecord,
    pub region: SliceImage,
    pub candidate_mask: Option<GrayImage>,
}

/// Encoded `(key, value)` pairs of one group plus what went wrong on the way.
#[derive(Debug, Default)]
pub struct MapOutput {
    pub pairs: Vec<(Vec<u8>, Vec<u8>)>,
    pub images_read: usize,
    /// Series UID of every image whose pipeline failed.
    pub failed_images: Vec<String>,
    pub undecodable: Vec<PathBuf>,
}

/// Series of one reducer partition, keyed and ordered by UID, values still
/// encoded.
pub type Partition = BTreeMap<String, (SeriesKey, Vec<Vec<u8>>)>;

#[derive(Debug, Default)]
pub struct ReduceOutput {
    pub records: Vec<SeriesRecord>,
    pub failed: Vec<(String, AggregateError)>,
}

/// What a finished job did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobReport {
    pub groups: usize,
    pub images_read: usize,
    pub images_emitted: usize,
    /// Failed images per series UID. Empty under [`FailurePolicy::Drop`].
    pub failed_images: BTreeMap<String, usize>,
    /// Files that could not be decoded. Empty under [`FailurePolicy::Drop`].
    pub undecodable_files: Vec<PathBuf>,
    pub series_written: usize,
    /// Series whose aggregation was aborted, with the reason.
    pub failed_series: BTreeMap<String, String>,
    pub output_files: Vec<PathBuf>,
}

impl JobReport {
    /// `true` when every series that reached the reducers was written.
    pub fn is_success(&self) -> bool {
        self.failed_series.is_empty()
    }

    pub fn log_summary(&self) {
        info!(
            "{} group(s), {} image(s) read, {} emitted, {} series written",
            self.groups, self.images_read, self.images_emitted, self.series_written
        );
        for (uid, count) in &self.failed_images {
            warn!("Series {uid}: {count} image(s) failed in the pipeline");
        }
        for path in &self.undecodable_files {
            warn!("Could not decode {}", path.display());
        }
        for (uid, reason) in &self.failed_series {
            warn!("Series {uid} not written: {reason}");
        }
    }
}

/// Reducer partition of a series UID: SipHash-1-3 with zero keys, so the
/// assignment is the same on every run and every machine.
pub fn partition_for(uid: &str, reducers: usize) -> usize {
    let mut hasher = SipHasher13::new_with_keys(0, 0);
    hasher.write(uid.as_bytes());
    (hasher.finish() % reducers.max(1) as u64) as usize
}

/// Route encoded pairs to their partitions, grouping values by series UID.
///
/// The first key seen for a UID is the one kept.
pub fn shuffle(
    pairs: impl IntoIterator<Item = (Vec<u8>, Vec<u8>)>,
    reducers: usize,
) -> Result<Vec<Partition>, CodecError> {
    let mut partitions: Vec<Partition> = (0..reducers.max(1)).map(|_| Partition::new()).collect();
    for (key_bytes, value) in pairs {
        let key = SeriesKey::from_bytes(&key_bytes)?;
        let uid = key.uid().to_string();
        let partition = partition_for(&uid, partitions.len());
        partitions[partition]
            .entry(uid)
            .or_insert_with(|| (key, Vec::new()))
            .1
            .push(value);
    }
    Ok(partitions)
}

/// Decode and aggregate every series of one partition.
///
/// A series with a bad image number is reported and skipped; the rest of the
/// partition is still produced.
pub fn reduce(partition: &Partition) -> Result<ReduceOutput, CodecError> {
    let mut output = ReduceOutput::default();
    for (uid, (key, values)) in partition {
        let images = values
            .iter()
            .map(|bytes| ImageRecord::from_bytes(bytes))
            .collect::<Result<Vec<_>, _>>()?;
        match aggregate(key, &images) {
            Ok(record) => output.records.push(record),
            Err(err) => {
                warn!("Dropping series {uid}: {err}");
                output.failed.push((uid.clone(), err));
            }
        }
    }
    Ok(output)
}

pub struct BatchJob {
    config: JobConfig,
    pipeline: StagePipeline,
}

impl BatchJob {
    /// # Errors
    ///
    /// Returns [`JobError::Config`] when the configuration does not validate.
    pub fn new(config: JobConfig) -> Result<Self, JobError> {
        config.validate()?;
        let pipeline = StagePipeline::from_config(&config.pipeline);
        Ok(Self { config, pipeline })
    }

    /// Run the pipeline on one decoded scan.
    pub fn map_image(&self, scan: ScanImage) -> Result<MappedImage, PipelineError> {
        let ScanImage {
            key,
            mut record,
            slice,
        } = scan;
        let output = self.pipeline.run(slice)?;
        debug!(
            "Image {} of series {}: {} candidate(s)",
            record.image_number.as_deref().unwrap_or("?"),
            key.uid(),
            output.candidates.len()
        );
        record.candidates = output.candidates;
        Ok(MappedImage {
            key,
            record,
            region: output.region,
            candidate_mask: output.candidate_mask,
        })
    }

    fn note_undecodable(&self, path: &Path, err: &ScanError, output: &mut MapOutput) {
        match self.config.failure_policy {
            FailurePolicy::Report => {
                warn!("Skipping {}: {err}", path.display());
                output.undecodable.push(path.to_path_buf());
            }
            FailurePolicy::Drop => debug!("Dropping {}: {err}", path.display()),
        }
    }

    fn note_failed(&self, uid: String, path: &Path, err: &PipelineError, output: &mut MapOutput) {
        match self.config.failure_policy {
            FailurePolicy::Report => {
                warn!("Image {} of series {uid} failed: {err}", path.display());
                output.failed_images.push(uid);
            }
            FailurePolicy::Drop => debug!("Dropping image {}: {err}", path.display()),
        }
    }

    /// Decode one whole-file record, run it through the pipeline and append
    /// the encoded pair.
    pub fn map_record(
        &self,
        record: &WholeFileRecord,
        dumper: Option<&DebugDumper>,
        output: &mut MapOutput,
    ) -> Result<(), MapError> {
        output.images_read += 1;
        let scan = match ScanImage::decode(&record.bytes) {
            Ok(scan) => scan,
            Err(err) => {
                self.note_undecodable(&record.path, &err, output);
                return Ok(());
            }
        };

        let uid = scan.key.uid().to_string();
        match self.map_image(scan) {
            Ok(mapped) => {
                if let Some(dumper) = dumper {
                    let stem = record
                        .path
                        .file_name()
                        .map(|name| name.to_string_lossy().into_owned())
                        .unwrap_or_else(|| format!("image-{}", output.images_read));
                    dumper.dump(&stem, &mapped.region, mapped.candidate_mask.as_ref())?;
                }
                output
                    .pairs
                    .push((mapped.key.to_bytes()?, mapped.record.to_bytes()?));
            }
            Err(err) => self.note_failed(uid, &record.path, &err, output),
        }
        Ok(())
    }

    /// One attempt over a whole group. Nothing is kept from a failed attempt.
    pub fn map_group(
        &self,
        group: &FileGroup,
        dumper: Option<&DebugDumper>,
    ) -> Result<MapOutput, MapError> {
        let mut output = MapOutput::default();
        for record in GroupReader::new(group) {
            self.map_record(&record?, dumper, &mut output)?;
        }
        Ok(output)
    }

    pub(crate) fn map_with_retries(
        &self,
        index: usize,
        group: &FileGroup,
        dumper: Option<&DebugDumper>,
    ) -> Result<MapOutput, JobError> {
        let mut attempt = 1;
        loop {
            match self.map_group(group, dumper) {
                Ok(output) => {
                    info!(
                        "Group {index}: {} file(s), {} pair(s) emitted",
                        group.len(),
                        output.pairs.len()
                    );
                    return Ok(output);
                }
                Err(err) if err.is_transient() && attempt < self.config.max_attempts => {
                    warn!("Group {index} attempt {attempt} failed, retrying: {err}");
                    attempt += 1;
                }
                Err(source) => {
                    return Err(JobError::TaskFailed {
                        group: index,
                        attempts: attempt,
                        source,
                    });
                }
            }
        }
    }

    fn thread_pool(&self) -> Result<rayon::ThreadPool, JobError> {
        let mut builder = rayon::ThreadPoolBuilder::new();
        if let Some(threads) = self.config.threads {
            builder = builder.num_threads(threads);
        }
        Ok(builder.build()?)
    }

    /// Plan, map, shuffle, reduce and write the output directory.
    ///
    /// # Errors
    ///
    /// Planning and output errors, and any group that still fails after
    /// `max_attempts`. Series-level data errors do not fail the run; they
    /// are listed in [`JobReport::failed_series`].
    pub fn run(&self) -> Result<JobReport, JobError> {
        let config = &self.config;
        let files = list_input_files(&config.input_dir)?;
        let groups = SplitAggregator::new(config.max_split_size).plan_paths(&files)?;
        info!(
            "Planned {} group(s) over {} file(s) from {}",
            groups.len(),
            files.len(),
            config.input_dir.display()
        );

        output::prepare_output_dir(&config.output_dir)?;
        let dumper = config
            .debug_dir
            .as_ref()
            .map(DebugDumper::create)
            .transpose()?;

        let pool = self.thread_pool()?;
        pool.install(|| self.execute(&groups, dumper.as_ref()))
    }

    fn execute(&self, groups: &[FileGroup], dumper: Option<&DebugDumper>) -> Result<JobReport, JobError> {
        let mapped = groups
            .par_iter()
            .enumerate()
            .map(|(index, group)| self.map_with_retries(index, group, dumper))
            .collect::<Result<Vec<_>, _>>()?;

        let mut report = JobReport {
            groups: groups.len(),
            ..JobReport::default()
        };
        let mut pairs = Vec::new();
        for output in mapped {
            report.images_read += output.images_read;
            report.images_emitted += output.pairs.len();
            for uid in output.failed_images {
                *report.failed_images.entry(uid).or_default() += 1;
            }
            report.undecodable_files.extend(output.undecodable);
            pairs.extend(output.pairs);
        }

        let partitions = shuffle(pairs, self.config.reducers).map_err(JobError::Shuffle)?;
        let reduced = partitions
            .par_iter()
            .map(reduce)
            .collect::<Result<Vec<_>, _>>()
            .map_err(JobError::Shuffle)?;

        for (partition, output) in reduced.into_iter().enumerate() {
            let path = output::write_partition(&self.config.output_dir, partition, &output.records)?;
            report.series_written += output.records.len();
            report.output_files.push(path);
            for (uid, err) in output.failed {
                report.failed_series.insert(uid, err.to_string());
            }
        }

        if report.is_success() {
            output::mark_success(&self.config.output_dir)?;
        }
        Ok(report)
    }
}
