//! The four pipeline stages, run strictly in order:
//! extract → load model → annotate → encode.
//!
//! Every stage leaves its output on disk for the next one; nothing is rolled
//! back when a later stage fails.

use std::fmt;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use ffmpeg_common::probe::{self, MediaInfo};
use ffmpeg_common::{EncodeOutcome, EncoderOptions, ExtractOptions, ExtractionReport};
use inference_common::annotate::{AnnotationStyle, ClassFilter};
use inference_common::detector::Detector;
use inference_common::frame_files;
use inference_common::video_meta::VideoMeta;

use crate::annotate_frames::{annotate_frames, AnnotationRun};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Extract,
    LoadModel,
    Annotate,
    Encode,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Extract => "extract",
            Stage::LoadModel => "load_model",
            Stage::Annotate => "annotate",
            Stage::Encode => "encode",
        };
        f.write_str(name)
    }
}

/// Every path the pipeline touches.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub input: PathBuf,
    /// Scratch directory for raw extracted frames.
    pub frames_dir: PathBuf,
    /// Scratch directory wiped before annotation; frames land in `project/name`.
    pub project_dir: PathBuf,
    pub run_name: String,
    pub output_video: PathBuf,
    /// Optional json file listing every detection per frame.
    pub detections_json: Option<PathBuf>,
    pub extract: ExtractOptions,
    pub encoder: EncoderOptions,
    pub filter: ClassFilter,
}

impl PipelineConfig {
    /// Default layout relative to the working directory.
    pub fn new(input: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            frames_dir: PathBuf::from("output_frames"),
            project_dir: PathBuf::from("prediction_results"),
            run_name: "pred".to_string(),
            output_video: PathBuf::from("output_video.mp4"),
            detections_json: None,
            extract: ExtractOptions::default(),
            encoder: EncoderOptions::default(),
            filter: ClassFilter::default(),
        }
    }

    pub fn predictions_dir(&self) -> PathBuf {
        self.project_dir.join(&self.run_name)
    }
}

#[derive(Debug)]
pub struct PipelineReport {
    pub media: MediaInfo,
    pub extraction: ExtractionReport,
    pub annotation: AnnotationRun,
    pub encode: EncodeOutcome,
}

impl PipelineReport {
    /// Frames in the output video, 0 if none was written.
    pub fn frames_written(&self) -> u64 {
        match &self.encode {
            EncodeOutcome::Written(report) => report.frames_written,
            EncodeOutcome::NoImages => 0,
        }
    }
}

pub struct Pipeline {
    config: PipelineConfig,
    style: AnnotationStyle,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, style: AnnotationStyle) -> Self {
        Self { config, style }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Runs all stages. `load_model` is called once, after extraction.
    ///
    /// Labels use the model's own class names unless names were configured.
    pub fn run<D, F>(&mut self, load_model: F) -> anyhow::Result<PipelineReport>
    where
        D: Detector,
        F: FnOnce() -> anyhow::Result<D>,
    {
        let config = &self.config;

        let (media, extraction) = self.stage(Stage::Extract, || {
            log::info!("Discovering media properties of {:?}", config.input);
            let media = probe::discover(&config.input)?;
            log::info!("{media:?}");
            let extraction =
                ffmpeg_common::extract_frames(&config.input, &config.frames_dir, &config.extract)?;
            Ok((media, extraction))
        })?;

        let mut detector = self.stage(Stage::LoadModel, load_model)?;
        if self.style.class_names.is_empty() && !detector.class_names().is_empty() {
            log::info!("Using class names from the model: {:?}", detector.class_names());
            self.style.class_names = detector.class_names().to_vec();
        }

        let annotation = self.stage(Stage::Annotate, || {
            frame_files::reset_dir(&config.project_dir)?;
            annotate_frames(
                &mut detector,
                &config.frames_dir,
                &config.predictions_dir(),
                &config.filter,
                &self.style,
            )
        })?;

        let encode = self.stage(Stage::Encode, || {
            Ok(ffmpeg_common::encode_directory(
                &config.project_dir,
                &config.output_video,
                &config.encoder,
            )?)
        })?;

        if let Some(path) = &config.detections_json {
            let mut video_meta = VideoMeta::new(
                config.input.clone(),
                matches!(encode, EncodeOutcome::Written(_)).then(|| config.output_video.clone()),
                media.width,
                media.height,
            );
            for frame in &annotation.frame_metas {
                video_meta.push(frame.clone());
            }
            log::info!(
                "Writing detections json file, {} frames: {path:?}",
                video_meta.frames.len()
            );
            video_meta.write_json(path)?;
        }

        Ok(PipelineReport {
            media,
            extraction,
            annotation,
            encode,
        })
    }

    fn stage<T>(&self, stage: Stage, f: impl FnOnce() -> anyhow::Result<T>) -> anyhow::Result<T> {
        let _span = tracing::info_span!("stage", name = %stage).entered();
        log::info!("Starting stage {stage}");
        let start = Instant::now();
        let result = f().with_context(|| format!("Stage {stage} failed"))?;
        log::info!("Finished stage {stage} in {:?}", start.elapsed());
        Ok(result)
    }
}
