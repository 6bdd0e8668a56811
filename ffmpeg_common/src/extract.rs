use std::path::{Path, PathBuf};
use std::time::Instant;

use ffmpeg::format::Pixel;
use ffmpeg::software::scaling::{context::Context, flag::Flags};
use ffmpeg::util::frame::video::Video;
use image::DynamicImage;
use inference_common::frame_files::{self, FrameFormat};

use crate::conversion::{frame_to_rgb_image, Rotation};
use crate::decode::VideoDecoder;
use crate::error::MediaError;

#[derive(Debug, Clone, Copy)]
pub struct ExtractOptions {
    /// Keep every `decimation`-th frame, starting with frame 0.
    pub decimation: u32,
    pub format: FrameFormat,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            decimation: 1,
            format: FrameFormat::Jpeg,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionReport {
    pub output_dir: PathBuf,
    /// Frames decoded from the input.
    pub decoded: u64,
    /// Frames written to `output_dir`, numbered `0..saved`.
    pub saved: u64,
    /// Input packets that could not be decoded and were skipped.
    pub dropped: u64,
}

/// Writes every `decimation`-th frame of `input` to a freshly emptied
/// `output_dir` as `frame_0000.<ext>`, `frame_0001.<ext>`, ...
///
/// An input that cannot be opened, or has no video stream, is an error and
/// leaves `output_dir` untouched. Undecodable packets are skipped. Frames are
/// saved upright when the stream carries a rotation.
pub fn extract_frames(
    input: &Path,
    output_dir: &Path,
    options: &ExtractOptions,
) -> Result<ExtractionReport, MediaError> {
    if options.decimation == 0 {
        return Err(MediaError::InvalidDecimation);
    }
    let decimation = u64::from(options.decimation);

    log::info!("Starting frame extraction from {input:?}");
    let decoder = VideoDecoder::open(input)?;
    log::debug!(
        "Decoding {}x{} video stream of {:?}",
        decoder.width(),
        decoder.height(),
        decoder.path()
    );

    frame_files::reset_dir(output_dir)?;

    let mut scaler = Context::get(
        decoder.format(),
        decoder.width(),
        decoder.height(),
        Pixel::RGB24,
        decoder.width(),
        decoder.height(),
        Flags::BILINEAR,
    )?;

    let start = Instant::now();
    let mut saved = 0;

    let stats = decoder.for_each_frame(|index, frame| {
        if index % decimation != 0 {
            return Ok(());
        }

        let mut rgb_frame = Video::empty();
        scaler.run(frame, &mut rgb_frame)?;

        let image = frame_to_rgb_image(&rgb_frame).ok_or_else(|| {
            anyhow::anyhow!("Decoded frame {index} has an unexpected buffer size")
        })?;
        let image = Rotation::of_frame(frame).apply(image);
        frame_files::save_frame(
            &DynamicImage::ImageRgb8(image),
            &output_dir.join(frame_files::frame_file_name(saved, options.format)),
        )?;
        saved += 1;
        Ok(())
    })?;

    log::info!(
        "{saved} of {} frames saved to {output_dir:?} in {:?}",
        stats.decoded,
        start.elapsed()
    );

    Ok(ExtractionReport {
        output_dir: output_dir.to_path_buf(),
        decoded: stats.decoded,
        saved,
        dropped: stats.dropped_packets,
    })
}
