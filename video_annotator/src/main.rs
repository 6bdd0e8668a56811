mod annotate_frames;
mod pipeline;

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use ffmpeg_common::{EncodeOutcome, EncoderOptions, ExtractOptions, VideoCodec};
use inference_common::annotate::{AnnotationStyle, ClassFilter};
use inference_common::frame_files::FrameFormat;
use ort_common::yolov8::{YoloConfig, YoloV8};
use tracing_subscriber::prelude::*;

use crate::pipeline::{Pipeline, PipelineConfig};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FrameFormatArg {
    Jpg,
    Png,
}

impl From<FrameFormatArg> for FrameFormat {
    fn from(arg: FrameFormatArg) -> Self {
        match arg {
            FrameFormatArg::Jpg => FrameFormat::Jpeg,
            FrameFormatArg::Png => FrameFormat::Png,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CodecArg {
    Mpeg4,
    H264,
}

impl From<CodecArg> for VideoCodec {
    fn from(arg: CodecArg) -> Self {
        match arg {
            CodecArg::Mpeg4 => VideoCodec::Mpeg4,
            CodecArg::H264 => VideoCodec::H264,
        }
    }
}

/// Extracts the frames of a video, draws object detections onto each of
/// them and encodes the annotated frames into a new video.
#[derive(Debug, Parser)]
pub struct Args {
    /// Path to the input video file.
    input: PathBuf,
    /// Yolov8 onnx model file to use.
    #[arg(long, short, default_value = "./weights/best.onnx")]
    model: PathBuf,
    /// Scratch directory for extracted frames, emptied on every run.
    #[arg(long, default_value = "./output_frames")]
    frames_dir: PathBuf,
    /// Scratch directory for annotated frames, emptied on every run.
    #[arg(long, default_value = "./prediction_results")]
    project: PathBuf,
    /// Run name; annotated frames are saved under `<project>/<name>`.
    #[arg(long, default_value = "pred")]
    name: String,
    /// Output video file.
    #[arg(long, short, default_value = "./output_video.mp4")]
    output: PathBuf,
    /// Keep every k-th decoded frame.
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    decimation: u32,
    /// Class indices drawn onto frames. Others are still detected.
    #[arg(long, value_delimiter = ',', default_value = "1,2,3,4")]
    classes: Vec<usize>,
    /// Draw every class, overriding `--classes`.
    #[arg(long, action, default_value = "false")]
    all_classes: bool,
    /// Class names used in labels, by class index.
    #[arg(long, value_delimiter = ',')]
    class_names: Vec<String>,
    #[arg(long, default_value_t = 0.25)]
    confidence: f32,
    #[arg(long, default_value_t = 0.7)]
    iou: f32,
    /// Side of the square model input.
    #[arg(long, default_value_t = 640, value_parser = clap::value_parser!(u32).range(32..))]
    imgsz: u32,
    #[arg(long, value_enum, default_value = "jpg")]
    frame_format: FrameFormatArg,
    /// Frame rate of the output video.
    #[arg(long, default_value_t = 30, value_parser = clap::value_parser!(u32).range(1..))]
    fps: u32,
    #[arg(long, value_enum, default_value = "mpeg4")]
    codec: CodecArg,
    /// TTF/OTF font for class labels. A common system font is used if not
    /// given; without any font, boxes are drawn without labels.
    #[arg(long)]
    font: Option<PathBuf>,
    /// Whether to attempt to use `cuda` hw acceleration.
    /// This may silently fail and fallback to cpu acceleration presently.
    #[arg(long, action, default_value = "false")]
    cuda: bool,
    /// Write every detection, per frame, to this json file.
    #[arg(long)]
    detections_json: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    // Initialize logging.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "warn,video_annotator=info,ffmpeg_common=info,ort_common=info,inference_common=info"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    log::debug!("{args:?}");

    let mut style = AnnotationStyle {
        class_names: args.class_names.clone(),
        ..AnnotationStyle::default()
    };
    if let Some(font) = &args.font {
        style.load_font(font)?;
    } else if let Some(font) = style.load_system_font() {
        log::info!("Drawing class labels with {font:?}");
    } else {
        log::warn!("No system font found, pass --font to draw class labels");
    }

    let mut config = PipelineConfig::new(&args.input);
    config.frames_dir = args.frames_dir.clone();
    config.project_dir = args.project.clone();
    config.run_name = args.name.clone();
    config.output_video = args.output.clone();
    config.detections_json = args.detections_json.clone();
    config.extract = ExtractOptions {
        decimation: args.decimation,
        format: args.frame_format.into(),
    };
    config.encoder = EncoderOptions {
        fps: args.fps,
        codec: args.codec.into(),
        ..EncoderOptions::default()
    };
    if args.all_classes {
        config.filter = ClassFilter::all();
    } else {
        config.filter = ClassFilter::only(args.classes.iter().copied());
    }

    let yolo_config = YoloConfig {
        model_path: args.model.clone(),
        confidence_threshold: args.confidence,
        iou_threshold: args.iou,
        input_size: args.imgsz,
    };
    let cuda = args.cuda;

    let mut pipeline = Pipeline::new(config, style);
    let report = pipeline.run(move || {
        let ep_name = ort_common::init_execution_provider(cuda)?;
        let model = YoloV8::load(yolo_config)?;
        log::info!(
            "Prepared ort {ep_name} session with model: {:?}",
            model.model_path()
        );
        Ok(model)
    })?;

    log::info!(
        "Extracted {} of {} decoded frames ({}x{}) into {:?}",
        report.extraction.saved,
        report.extraction.decoded,
        report.media.width,
        report.media.height,
        report.extraction.output_dir
    );
    log::info!(
        "Annotated {} frames ({} skipped) into {:?}, {} detections",
        report.annotation.frames.processed_count(),
        report.annotation.frames.skipped_count(),
        pipeline.config().predictions_dir(),
        report.annotation.detection_count()
    );
    match &report.encode {
        EncodeOutcome::Written(encoded) => log::info!(
            "Wrote {} frames ({}x{}) to {:?}",
            encoded.frames_written,
            encoded.width,
            encoded.height,
            encoded.output
        ),
        EncodeOutcome::NoImages => log::warn!("No annotated frames, output video not written"),
    }

    Ok(())
}
