use std::{path::PathBuf, process::ExitCode};

use clap::Parser;
use dicom_nodules::{BatchJob, FailurePolicy, JobConfig};
use log::{error, info};

/// Extract lung regions and nodule candidates from a directory of DICOM
/// files and write one record per series.
#[derive(Parser, Debug)]
#[command(version)]
struct Args {
    /// Bottom and top gray thresholds (0-255) of the candidate band. Give
    /// both or neither.
    #[arg(value_names = ["BOTTOM", "TOP"], num_args = 0..=2)]
    thresholds: Vec<u8>,

    /// Directory holding the input files.
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Output directory. Removed and recreated on every run.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// JSON file with job and pipeline settings.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Largest total size in bytes of the files handed to one task.
    #[arg(long, value_name = "BYTES")]
    max_split_size: Option<u64>,

    /// Number of output partitions.
    #[arg(long)]
    reducers: Option<usize>,

    /// Attempts per file group before the job fails.
    #[arg(long)]
    max_attempts: Option<u32>,

    /// Worker threads; defaults to one per core.
    #[arg(long)]
    threads: Option<usize>,

    /// What to do with images that fail in the pipeline.
    #[arg(long, value_enum)]
    failure_policy: Option<FailurePolicy>,

    /// Write PNG previews of region and candidate masks here.
    #[arg(long, value_name = "DIR")]
    debug_dir: Option<PathBuf>,
}

impl Args {
    fn into_config(self) -> Result<JobConfig, String> {
        let mut config = match &self.config {
            Some(path) => JobConfig::from_file(path).map_err(|e| e.to_string())?,
            None => JobConfig::default(),
        };

        if let Some(input) = self.input {
            config.input_dir = input;
        }
        if let Some(output) = self.output {
            config.output_dir = output;
        }
        if let Some(size) = self.max_split_size {
            config.max_split_size = size;
        }
        if let Some(reducers) = self.reducers {
            config.reducers = reducers;
        }
        if let Some(attempts) = self.max_attempts {
            config.max_attempts = attempts;
        }
        if self.threads.is_some() {
            config.threads = self.threads;
        }
        if let Some(policy) = self.failure_policy {
            config.failure_policy = policy;
        }
        if self.debug_dir.is_some() {
            config.debug_dir = self.debug_dir;
        }

        match self.thresholds.as_slice() {
            [] => {}
            &[bottom, top] => {
                config.pipeline.candidates.bottom_threshold = bottom;
                config.pipeline.candidates.top_threshold = top;
            }
            _ => return Err("expected either no thresholds or BOTTOM and TOP".to_string()),
        }

        config.validate().map_err(|e| e.to_string())?;
        Ok(config)
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            if let Err(io) = err.print() {
                error!("Could not print usage: {io}");
            }
            return if err.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    let config = match args.into_config() {
        Ok(config) => config,
        Err(message) => {
            eprintln!("error: {message}\n\nUsage: dicom-nodules [BOTTOM TOP] [OPTIONS]");
            return ExitCode::FAILURE;
        }
    };

    info!(
        "Gray thresholds: bottom {} top {}",
        config.pipeline.candidates.bottom_threshold, config.pipeline.candidates.top_threshold
    );

    let report = match BatchJob::new(config).and_then(|job| job.run()) {
        Ok(report) => report,
        Err(err) => {
            error!("{err}");
            return ExitCode::FAILURE;
        }
    };

    report.log_summary();
    if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
