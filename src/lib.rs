//! # DICOM nodule batch library
//!
//! This crate processes large collections of small DICOM files in batch: it
//! groups files for parallel work, extracts the lung region of every image,
//! detects round nodule candidates inside it and aggregates the per-image
//! results into one record per series.
//!
//! It builds on the dicom-rs ecosystem for decoding and on `imageproc` for
//! the morphology and contour work. Map and reduce phases run in parallel
//! using rayon. Every image goes through the same three stages:
//!  - Pre-processing
//!  - Region extraction (threshold, closing, border-region removal)
//!  - Candidate detection (gray band, minimum size, contour measurements)
//!
//!  DICOM files are assumed to have the following attributes:
//!   - Single-sample grayscale pixel data (only the first frame is used)
//!   - Stored values on a scale where Hounsfield units are offset by +1000
//!   - A Series Instance UID and an Instance Number per image
//!
//! # Examples
//!
//! ## Running the batch job over a directory
//!
//! Read every file in `input/`, write one JSON line per series to
//! `output/part-r-00000` and a `_SUCCESS` marker when all series made it.
//!
//! ```no_run
//! # use dicom_nodules::{BatchJob, JobConfig};
//! # use std::path::PathBuf;
//! let config = JobConfig {
//!     input_dir: PathBuf::from("input"),
//!     output_dir: PathBuf::from("output"),
//!     ..JobConfig::default()
//! };
//! let report = BatchJob::new(config)
//!     .expect("should have accepted the configuration")
//!     .run()
//!     .expect("should have finished the job");
//! report.log_summary();
//! ```
//!
//! ## Running the pipeline on a single image
//!
//! ```no_run
//! # use dicom_nodules::{PipelineConfig, ScanImage, StagePipeline};
//! let bytes = std::fs::read("scan.dcm").expect("should have read the file");
//! let scan = ScanImage::decode(&bytes).expect("should have decoded the file");
//! let output = StagePipeline::from_config(&PipelineConfig::default())
//!     .run(scan.slice)
//!     .expect("should have run every stage");
//! for candidate in output.candidates {
//!     println!("{candidate:?}");
//! }
//! ```

pub mod aggregate;
pub mod codec;
pub mod components;
pub mod config;
pub mod enums;
pub mod job;
pub mod morphology;
pub mod output;
pub mod pipeline;
pub mod reader;
pub mod record;
pub mod scan;
pub mod segment;
pub mod slice;
pub mod split;
pub mod stage;

pub use aggregate::{AggregateError, aggregate};
pub use codec::{CodecError, Decode, Encode};
pub use config::{ConfigError, JobConfig, PipelineConfig};
pub use enums::{FailurePolicy, FilterMode, PipelineState};
pub use job::{BatchJob, JobError, JobReport};
pub use pipeline::{PipelineError, PipelineOutput, StagePipeline};
pub use reader::{WholeFileReader, WholeFileRecord};
pub use record::{Candidate, ImageRecord, SeriesKey, SeriesRecord};
pub use scan::{ScanError, ScanImage};
pub use slice::SliceImage;
pub use split::{FileGroup, SplitAggregator};
pub use stage::{ImageStage, StageError};
