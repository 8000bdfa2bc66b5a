use serde::{Deserialize, Serialize};

/// Lifecycle of one image travelling through the [`StagePipeline`].
///
/// [`StagePipeline`]: crate::pipeline::StagePipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PipelineState {
    #[default]
    Idle,
    PreProcessing,
    RegionExtraction,
    CandidateDetection,
    Done,
    Failed,
}

impl PipelineState {
    /// The state that follows a successful run of the current one.
    ///
    /// Terminal states map to themselves.
    pub fn next(self) -> Self {
        match self {
            Self::Idle => Self::PreProcessing,
            Self::PreProcessing => Self::RegionExtraction,
            Self::RegionExtraction => Self::CandidateDetection,
            Self::CandidateDetection => Self::Done,
            Self::Done => Self::Done,
            Self::Failed => Self::Failed,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

/// How the connected-component filter decides which regions survive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMode {
    /// Drop every region with a pixel on the image border.
    RemoveBorder,
    /// Keep regions whose pixel-inclusive bounding box is at least this large.
    MinimumSize { width: u32, height: u32 },
}

/// What happens to an image whose pipeline ends in [`PipelineState::Failed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Count the failure against its series and list it in the job report.
    #[default]
    Report,
    /// Drop the image without surfacing it beyond a debug log line.
    Drop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreProcessorKind {
    /// Passes the decoded image through untouched.
    #[default]
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionExtractorKind {
    /// Intensity threshold, closing, border-region removal.
    #[default]
    Threshold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateDetectorKind {
    /// Gray-level band selection followed by a minimum size filter.
    #[default]
    GrayLevel,
}
