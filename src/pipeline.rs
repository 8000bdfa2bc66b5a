use image::GrayImage;
use log::debug;
use thiserror::Error;
use web_time::Instant;

use crate::config::PipelineConfig;
use crate::enums::PipelineState;
use crate::record::Candidate;
use crate::slice::SliceImage;
use crate::stage::{Frame, ImageStage, StageError};

#[derive(Error, Debug)]
#[error("{stage} failed during {state:?}")]
pub struct PipelineError {
    /// State the pipeline was in when the stage failed.
    pub state: PipelineState,
    pub stage: &'static str,
    #[source]
    pub source: StageError,
}

/// What a successful run produces for one image.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// Native-depth region image, background painted with the sentinel.
    pub region: SliceImage,
    pub region_mask: Option<GrayImage>,
    pub candidate_mask: Option<GrayImage>,
    pub candidates: Vec<Candidate>,
}

/// Runs pre-processing, region extraction and candidate detection in order.
///
/// A run walks `Idle -> PreProcessing -> RegionExtraction ->
/// CandidateDetection -> Done`. The first failing stage ends the run in
/// `Failed` and the remaining stages are skipped. Nothing is kept between
/// runs, so one pipeline can serve many threads at once.
pub struct StagePipeline {
    pre_processor: Box<dyn ImageStage>,
    region_extractor: Box<dyn ImageStage>,
    candidate_detector: Box<dyn ImageStage>,
}

impl StagePipeline {
    pub fn new(
        pre_processor: Box<dyn ImageStage>,
        region_extractor: Box<dyn ImageStage>,
        candidate_detector: Box<dyn ImageStage>,
    ) -> Self {
        Self {
            pre_processor,
            region_extractor,
            candidate_detector,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            config.stages.pre_processor.build(),
            config.stages.region_extractor.build(&config.region),
            config.stages.candidate_detector.build(&config.candidates),
        )
    }

    fn stage_for(&self, state: PipelineState) -> Option<&dyn ImageStage> {
        match state {
            PipelineState::PreProcessing => Some(self.pre_processor.as_ref()),
            PipelineState::RegionExtraction => Some(self.region_extractor.as_ref()),
            PipelineState::CandidateDetection => Some(self.candidate_detector.as_ref()),
            _ => None,
        }
    }

    pub fn run(&self, image: SliceImage) -> Result<PipelineOutput, PipelineError> {
        self.run_traced(image, |_| {})
    }

    /// Like [`run`](Self::run), reporting every state the pipeline enters.
    pub fn run_traced(
        &self,
        image: SliceImage,
        mut on_state: impl FnMut(PipelineState),
    ) -> Result<PipelineOutput, PipelineError> {
        let mut state = PipelineState::Idle;
        let mut frame = Frame::new(image);
        on_state(state);

        loop {
            state = state.next();
            on_state(state);
            let Some(stage) = self.stage_for(state) else {
                break;
            };

            let start = Instant::now();
            let result = stage.run(frame);
            debug!("{} took {:?}", stage.name(), start.elapsed());

            frame = match result {
                Ok(frame) => frame,
                Err(source) => {
                    on_state(PipelineState::Failed);
                    return Err(PipelineError {
                        state,
                        stage: stage.name(),
                        source,
                    });
                }
            };
        }

        Ok(PipelineOutput {
            region: frame.image,
            region_mask: frame.region_mask,
            candidate_mask: frame.candidate_mask,
            candidates: frame.candidates,
        })
    }
}
