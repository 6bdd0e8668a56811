use std::path::Path;
use std::time::Instant;

use inference_common::annotate::{AnnotationStyle, ClassFilter};
use inference_common::bbox;
use inference_common::detector::Detector;
use inference_common::frame_files::{self, FRAME_EXTENSIONS};
use inference_common::frame_meta::FrameMeta;
use inference_common::frame_times::{AggregatedTimes, FrameTimes};
use inference_common::report::StageReport;

/// Result of annotating a directory of frames.
#[derive(Debug, Default)]
pub struct AnnotationRun {
    pub frames: StageReport,
    /// Detections of every processed frame, in frame order.
    pub frame_metas: Vec<FrameMeta>,
    pub times: AggregatedTimes,
}

impl AnnotationRun {
    pub fn detection_count(&self) -> usize {
        self.frame_metas
            .iter()
            .map(|meta| bbox::count(&meta.bboxes_by_class))
            .sum()
    }
}

/// Runs `detector` over every frame image in `frames_dir`, in sequence order,
/// and saves the annotated copies under the same file names into a freshly
/// emptied `output_dir`.
///
/// Unreadable frames are skipped. Inference or write failures abort.
pub fn annotate_frames<D: Detector>(
    detector: &mut D,
    frames_dir: &Path,
    output_dir: &Path,
    filter: &ClassFilter,
    style: &AnnotationStyle,
) -> anyhow::Result<AnnotationRun> {
    let frames = frame_files::list_frames(frames_dir, FRAME_EXTENSIONS)?;
    frame_files::reset_dir(output_dir)?;

    log::info!(
        "Annotating {} frames from {frames_dir:?} into {output_dir:?}",
        frames.len()
    );
    let start = Instant::now();
    let mut run = AnnotationRun::default();

    for (position, path) in frames.into_iter().enumerate() {
        let mut frame_times = FrameTimes::default();

        let read_start = Instant::now();
        let image = match image::open(&path) {
            Ok(image) => image,
            Err(e) => {
                run.frames.skipped(path, e);
                continue;
            }
        };
        frame_times.frame_read = read_start.elapsed();

        let (annotated, bboxes) = detector.infer(&image, filter, style, &mut frame_times)?;

        let Some(file_name) = path.file_name() else {
            continue;
        };
        let write_start = Instant::now();
        frame_files::save_frame(&annotated, &output_dir.join(file_name))?;
        frame_times.frame_write = write_start.elapsed();

        log::debug!("{path:?}: {} detections, {frame_times:?}", bbox::count(&bboxes));
        run.frame_metas.push(FrameMeta {
            index: frame_files::frame_sequence_number(&path).unwrap_or(position as u64),
            file_name: file_name.to_string_lossy().into_owned(),
            bboxes_by_class: bboxes,
        });
        run.times.push(frame_times);
        run.frames.processed(path);
    }

    log::info!(
        "{} frames annotated in {:?} ({} skipped)",
        run.frames.processed_count(),
        start.elapsed(),
        run.frames.skipped_count()
    );

    // Print perf stats, ignoring first (outlier) frame.
    if !run.times.is_empty() {
        log::info!("Average frame times: {:?}", run.times.avg(true));
        log::info!("Min frame times: {:?}", run.times.min(true));
        log::info!("Max frame times: {:?}", run.times.max(true));
    }

    Ok(run)
}
