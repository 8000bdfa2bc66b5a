//! The three pluggable steps an image goes through.
//!
//! Each step implements [`ImageStage`]. Which implementation runs is chosen
//! at runtime through the `*Kind` enums in [`crate::enums`], so new variants
//! can be added without touching [`PipelineConfig`].
//!
//! [`PipelineConfig`]: crate::config::PipelineConfig

use image::GrayImage;
use thiserror::Error;

use crate::config::{CandidateConfig, RegionConfig};
use crate::enums::{CandidateDetectorKind, PreProcessorKind, RegionExtractorKind};
use crate::record::Candidate;
use crate::segment;
use crate::slice::SliceImage;

#[derive(Error, Debug)]
pub enum StageError {
    #[error("{stage}: image has no pixels")]
    EmptyImage { stage: &'static str },
    #[error("{stage}: {message}")]
    Rejected { stage: &'static str, message: String },
}

/// The working state handed from one stage to the next.
#[derive(Debug, Clone)]
pub struct Frame {
    pub image: SliceImage,
    pub region_mask: Option<GrayImage>,
    pub candidate_mask: Option<GrayImage>,
    pub candidates: Vec<Candidate>,
}

impl Frame {
    pub fn new(image: SliceImage) -> Self {
        Self {
            image,
            region_mask: None,
            candidate_mask: None,
            candidates: Vec::new(),
        }
    }
}

/// One step of the per-image pipeline.
///
/// Stages keep no state between calls; the same stage value is shared by
/// every worker thread.
pub trait ImageStage: Send + Sync {
    fn name(&self) -> &'static str;

    fn run(&self, frame: Frame) -> Result<Frame, StageError>;
}

fn ensure_pixels(stage: &'static str, frame: &Frame) -> Result<(), StageError> {
    if frame.image.is_empty() {
        return Err(StageError::EmptyImage { stage });
    }
    Ok(())
}

/// Leaves the frame as decoded.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullPreProcessor;

impl ImageStage for NullPreProcessor {
    fn name(&self) -> &'static str {
        "NullPreProcessor"
    }

    fn run(&self, frame: Frame) -> Result<Frame, StageError> {
        Ok(frame)
    }
}

/// Replaces the image by its thresholded, border-free region.
#[derive(Debug, Clone)]
pub struct ThresholdRegionExtractor {
    config: RegionConfig,
}

impl ThresholdRegionExtractor {
    pub fn new(config: RegionConfig) -> Self {
        Self { config }
    }
}

impl ImageStage for ThresholdRegionExtractor {
    fn name(&self) -> &'static str {
        "ThresholdRegionExtractor"
    }

    fn run(&self, mut frame: Frame) -> Result<Frame, StageError> {
        ensure_pixels(self.name(), &frame)?;
        let region = segment::extract_region(&frame.image, &self.config);
        frame.image = region.image;
        frame.region_mask = Some(region.mask);
        Ok(frame)
    }
}

/// Finds candidates in a gray band of the region image.
#[derive(Debug, Clone)]
pub struct GrayLevelCandidateDetector {
    config: CandidateConfig,
}

impl GrayLevelCandidateDetector {
    pub fn new(config: CandidateConfig) -> Self {
        Self { config }
    }
}

impl ImageStage for GrayLevelCandidateDetector {
    fn name(&self) -> &'static str {
        "GrayLevelCandidateDetector"
    }

    fn run(&self, mut frame: Frame) -> Result<Frame, StageError> {
        ensure_pixels(self.name(), &frame)?;
        if self.config.bottom_threshold > self.config.top_threshold {
            return Err(StageError::Rejected {
                stage: self.name(),
                message: format!(
                    "bottom threshold {} above top threshold {}",
                    self.config.bottom_threshold, self.config.top_threshold
                ),
            });
        }
        let detected = segment::detect_candidates(&frame.image, &self.config);
        frame.candidates = detected.candidates;
        frame.candidate_mask = Some(detected.mask);
        Ok(frame)
    }
}

impl PreProcessorKind {
    pub fn build(self) -> Box<dyn ImageStage> {
        match self {
            Self::Null => Box::new(NullPreProcessor),
        }
    }
}

impl RegionExtractorKind {
    pub fn build(self, config: &RegionConfig) -> Box<dyn ImageStage> {
        match self {
            Self::Threshold => Box::new(ThresholdRegionExtractor::new(config.clone())),
        }
    }
}

impl CandidateDetectorKind {
    pub fn build(self, config: &CandidateConfig) -> Box<dyn ImageStage> {
        match self {
            Self::GrayLevel => Box::new(GrayLevelCandidateDetector::new(config.clone())),
        }
    }
}
