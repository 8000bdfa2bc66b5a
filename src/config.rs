use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::enums::{CandidateDetectorKind, FailurePolicy, PreProcessorKind, RegionExtractorKind};

/// 128 MiB, the usual block size of the distributed file systems the split
/// planner imitates.
pub const DEFAULT_MAX_SPLIT_SIZE: u64 = 128 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("bottom gray threshold {bottom} is above top threshold {top}")]
    InvertedThresholds { bottom: u8, top: u8 },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Settings of the region extraction stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegionConfig {
    /// Hounsfield-style threshold separating parenchyma from tissue.
    pub hu_threshold: i32,
    /// Offset that moves the Hounsfield scale onto the stored pixel scale.
    pub calibration_offset: i32,
    /// Radius in pixels of the circular closing element.
    pub closing_radius: u8,
    /// Value written to every pixel outside the extracted region.
    pub background_value: u16,
}

impl Default for RegionConfig {
    fn default() -> Self {
        Self {
            hu_threshold: -375,
            calibration_offset: 1000,
            closing_radius: 4,
            background_value: 2000,
        }
    }
}

impl RegionConfig {
    /// Threshold on the stored pixel scale; pixels at or below it are foreground.
    pub fn native_threshold(&self) -> i32 {
        self.hu_threshold + self.calibration_offset
    }
}

/// Settings of the candidate detection stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CandidateConfig {
    pub bottom_threshold: u8,
    pub top_threshold: u8,
    /// Assumed maximum stored pixel value, used to map 8-bit thresholds onto
    /// the native range. Not measured per image.
    pub empirical_max: u32,
    pub min_width: u32,
    pub min_height: u32,
}

impl Default for CandidateConfig {
    fn default() -> Self {
        Self {
            bottom_threshold: 110,
            top_threshold: 120,
            empirical_max: 2235,
            min_width: 5,
            min_height: 5,
        }
    }
}

/// Which implementation backs each of the three pipeline slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StageSelection {
    pub pre_processor: PreProcessorKind,
    pub region_extractor: RegionExtractorKind,
    pub candidate_detector: CandidateDetectorKind,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub stages: StageSelection,
    pub region: RegionConfig,
    pub candidates: CandidateConfig,
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let CandidateConfig {
            bottom_threshold,
            top_threshold,
            ..
        } = self.candidates;
        if bottom_threshold > top_threshold {
            return Err(ConfigError::InvertedThresholds {
                bottom: bottom_threshold,
                top: top_threshold,
            });
        }
        if self.candidates.min_width == 0 {
            return Err(ConfigError::Zero("candidates.min_width"));
        }
        if self.candidates.min_height == 0 {
            return Err(ConfigError::Zero("candidates.min_height"));
        }
        if self.candidates.empirical_max == 0 {
            return Err(ConfigError::Zero("candidates.empirical_max"));
        }
        Ok(())
    }
}

/// Everything one run of the batch job needs. Built once, then only read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobConfig {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub max_split_size: u64,
    pub reducers: usize,
    /// Attempts per file group before the job gives up, first try included.
    pub max_attempts: u32,
    /// Worker threads for the map and reduce phases; `None` lets rayon decide.
    pub threads: Option<usize>,
    pub failure_policy: FailurePolicy,
    /// When set, region and candidate images are written here as PNG.
    pub debug_dir: Option<PathBuf>,
    pub pipeline: PipelineConfig,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("input"),
            output_dir: PathBuf::from("output"),
            max_split_size: DEFAULT_MAX_SPLIT_SIZE,
            reducers: 1,
            max_attempts: 4,
            threads: None,
            failure_policy: FailurePolicy::default(),
            debug_dir: None,
            pipeline: PipelineConfig::default(),
        }
    }
}

impl JobConfig {
    /// Load a JSON config file. Missing fields keep their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_split_size == 0 {
            return Err(ConfigError::Zero("max_split_size"));
        }
        if self.reducers == 0 {
            return Err(ConfigError::Zero("reducers"));
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::Zero("max_attempts"));
        }
        if self.threads == Some(0) {
            return Err(ConfigError::Zero("threads"));
        }
        self.pipeline.validate()
    }
}
