//! Encode a directory of still frames into a single video file.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use ffmpeg::codec::context::Context as CodecContext;
use ffmpeg::codec::Id;
use ffmpeg::format::context::Output;
use ffmpeg::format::{Flags as FormatFlags, Pixel};
use ffmpeg::software::scaling::{Context as ScalingContext, Flags as ScalingFlags};
use ffmpeg::util::frame::video::Video;
use ffmpeg::{Packet, Rational};
use inference_common::frame_files::{self, FRAME_EXTENSIONS};
use inference_common::report::StageReport;

use crate::conversion::rgb_image_to_frame;
use crate::error::MediaError;

/// Supported output video codecs.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum VideoCodec {
    /// MPEG-4 Part 2, the `mp4v` FourCC in mp4 containers.
    #[default]
    Mpeg4,
    /// H.264 / AVC, only if the linked ffmpeg ships an encoder for it.
    H264,
}

impl VideoCodec {
    fn codec_id(self) -> Id {
        match self {
            VideoCodec::Mpeg4 => Id::MPEG4,
            VideoCodec::H264 => Id::H264,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EncoderOptions {
    pub fps: u32,
    pub codec: VideoCodec,
    /// Target bitrate in bits per second, encoder default if `None`.
    pub bitrate: Option<usize>,
}

impl Default for EncoderOptions {
    fn default() -> Self {
        Self {
            fps: 30,
            codec: VideoCodec::Mpeg4,
            bitrate: Some(4_000_000),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EncodeReport {
    pub output: PathBuf,
    pub width: u32,
    pub height: u32,
    pub frames_written: u64,
    /// One outcome per collected image; skipped images are dropped frames.
    pub frames: StageReport,
}

#[derive(Debug, Clone)]
pub enum EncodeOutcome {
    /// Nothing readable to encode, no output file was created.
    NoImages,
    Written(EncodeReport),
}

/// Encodes every `.jpg`/`.jpeg`/`.png` below `image_dir` (recursively) into `output`,
/// in frame sequence order.
///
/// All images must have the same dimensions; this is checked from the image
/// headers before the output is created. Images that cannot be read are
/// skipped with a warning.
///
/// The video is written next to `output` and only renamed into place once
/// complete, so a failed encode leaves any previous `output` as it was.
pub fn encode_directory(
    image_dir: &Path,
    output: &Path,
    options: &EncoderOptions,
) -> Result<EncodeOutcome, MediaError> {
    let images = frame_files::collect_frames_recursive(image_dir, FRAME_EXTENSIONS)?;
    if images.is_empty() {
        log::warn!("No images found in {image_dir:?}, not creating {output:?}");
        return Ok(EncodeOutcome::NoImages);
    }

    let mut frames = StageReport::default();
    let mut readable = Vec::with_capacity(images.len());
    let mut dimensions = None;
    for path in images {
        match image::image_dimensions(&path) {
            Ok(found) => {
                let expected = *dimensions.get_or_insert(found);
                if found != expected {
                    return Err(MediaError::DimensionMismatch {
                        path,
                        expected,
                        found,
                    });
                }
                readable.push(path);
            }
            Err(e) => frames.skipped(path, e),
        }
    }
    let Some((width, height)) = dimensions else {
        log::warn!("None of the images in {image_dir:?} could be read, not creating {output:?}");
        return Ok(EncodeOutcome::NoImages);
    };

    log::info!(
        "Writing {} images from {image_dir:?} to {output:?} ({width}x{height}, {:?}, {} fps)",
        readable.len(),
        options.codec,
        options.fps
    );
    let start = Instant::now();

    let partial = partial_path(output);
    let result = encode_images(&partial, readable, (width, height), options, &mut frames);
    let frames_written = match result {
        Ok(frames_written) => frames_written,
        Err(e) => {
            if partial.exists() {
                if let Err(remove_err) = fs::remove_file(&partial) {
                    log::warn!("Failed to remove unfinished video {partial:?}: {remove_err}");
                }
            }
            return Err(e);
        }
    };
    fs::rename(&partial, output)?;

    log::info!("Video created in {:?}", start.elapsed());

    Ok(EncodeOutcome::Written(EncodeReport {
        output: output.to_path_buf(),
        width,
        height,
        frames_written,
        frames,
    }))
}

/// Hidden sibling of `output` keeping its extension, so the container
/// guessed from the name stays the same.
fn partial_path(output: &Path) -> PathBuf {
    let name = output
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    output.with_file_name(format!(".partial.{name}"))
}

fn encode_images(
    path: &Path,
    images: Vec<PathBuf>,
    (width, height): (u32, u32),
    options: &EncoderOptions,
    frames: &mut StageReport,
) -> Result<u64, MediaError> {
    let mut writer = FrameWriter::create(path, width, height, options)?;
    for path in images {
        let image = match image::open(&path) {
            Ok(image) => image.to_rgb8(),
            Err(e) => {
                frames.skipped(path, e);
                continue;
            }
        };
        if image.dimensions() != (width, height) {
            return Err(MediaError::DimensionMismatch {
                path,
                expected: (width, height),
                found: image.dimensions(),
            });
        }
        writer.write(&rgb_image_to_frame(&image))?;
        frames.processed(path);
    }
    writer.finish()
}

/// An open output container with a single video stream.
///
/// Dropping it without [`FrameWriter::finish`] closes the file without a
/// trailer.
pub struct FrameWriter {
    output: Output,
    encoder: ffmpeg::encoder::video::Encoder,
    scaler: ScalingContext,
    stream_index: usize,
    encoder_time_base: Rational,
    next_pts: i64,
}

impl FrameWriter {
    /// Creates `path` (container picked from the extension) and writes its header.
    pub fn create(
        path: &Path,
        width: u32,
        height: u32,
        options: &EncoderOptions,
    ) -> Result<Self, MediaError> {
        crate::init()?;

        let codec_id = options.codec.codec_id();
        let target_pixel = Pixel::YUV420P;
        let encoder_time_base = Rational::new(1, options.fps as i32);

        // Look the encoder up before the output file is created.
        let codec = ffmpeg::encoder::find(codec_id)
            .ok_or_else(|| MediaError::EncoderNotFound(format!("{codec_id:?}")))?;

        let mut output = ffmpeg::format::output(&path)?;
        let needs_global_header = output.format().flags().contains(FormatFlags::GLOBAL_HEADER);

        let mut stream = output.add_stream(codec)?;
        let stream_index = stream.index();

        let mut encoder = CodecContext::from_parameters(stream.parameters())?
            .encoder()
            .video()?;
        encoder.set_width(width);
        encoder.set_height(height);
        encoder.set_format(target_pixel);
        encoder.set_time_base(encoder_time_base);
        encoder.set_frame_rate(Some(Rational::new(options.fps as i32, 1)));
        if let Some(bitrate) = options.bitrate {
            encoder.set_bit_rate(bitrate);
        }
        if needs_global_header {
            encoder.set_flags(ffmpeg::codec::flag::Flags::GLOBAL_HEADER);
        }

        let encoder = encoder.open_as(codec)?;
        stream.set_time_base(encoder_time_base);
        stream.set_parameters(&encoder);

        output.write_header()?;

        let scaler = ScalingContext::get(
            Pixel::RGB24,
            width,
            height,
            target_pixel,
            width,
            height,
            ScalingFlags::BILINEAR,
        )?;

        Ok(Self {
            output,
            encoder,
            scaler,
            stream_index,
            encoder_time_base,
            next_pts: 0,
        })
    }

    /// Encodes one RGB24 frame as the next frame of the video.
    pub fn write(&mut self, rgb_frame: &Video) -> Result<(), MediaError> {
        let mut frame = Video::empty();
        self.scaler.run(rgb_frame, &mut frame)?;
        frame.set_pts(Some(self.next_pts));
        self.next_pts += 1;

        self.encoder.send_frame(&frame)?;
        self.write_packets()
    }

    /// Flushes the encoder and writes the trailer, returning the frame count.
    pub fn finish(mut self) -> Result<u64, MediaError> {
        self.encoder.send_eof()?;
        self.write_packets()?;
        self.output.write_trailer()?;
        Ok(self.next_pts as u64)
    }

    fn write_packets(&mut self) -> Result<(), MediaError> {
        let stream_time_base = self
            .output
            .stream(self.stream_index)
            .map(|stream| stream.time_base())
            .ok_or(ffmpeg::Error::StreamNotFound)?;

        let mut packet = Packet::empty();
        while self.encoder.receive_packet(&mut packet).is_ok() {
            packet.set_stream(self.stream_index);
            if packet.duration() == 0 {
                packet.set_duration(1);
            }
            packet.rescale_ts(self.encoder_time_base, stream_time_base);
            packet.write_interleaved(&mut self.output)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use image::{Rgb, RgbImage};
    use inference_common::frame_files::{frame_file_name, FrameFormat};

    use super::*;
    use crate::extract::{extract_frames, ExtractOptions};
    use crate::probe::{count_frames, discover};

    /// Writes `count` distinct 64x48 frames into `dir`.
    fn write_frames(dir: &Path, count: u64, format: FrameFormat) {
        fs::create_dir_all(dir).unwrap();
        for i in 0..count {
            let shade = (i * 255 / count.max(1)) as u8;
            let image = RgbImage::from_pixel(64, 48, Rgb([shade, 255 - shade, 128]));
            image.save(dir.join(frame_file_name(i, format))).unwrap();
        }
    }

    fn written(outcome: EncodeOutcome) -> EncodeReport {
        match outcome {
            EncodeOutcome::Written(report) => report,
            EncodeOutcome::NoImages => panic!("expected a video to be written"),
        }
    }

    #[test]
    fn test_empty_directory_creates_no_video() {
        let dir = tempfile::tempdir().unwrap();
        let images = dir.path().join("pred");
        fs::create_dir_all(&images).unwrap();
        fs::write(images.join("notes.txt"), b"not a frame").unwrap();
        let output = dir.path().join("out.mp4");

        let outcome = encode_directory(&images, &output, &EncoderOptions::default()).unwrap();
        assert!(matches!(outcome, EncodeOutcome::NoImages));
        assert!(!output.exists());
    }

    #[test]
    fn test_encode_90_frames_at_30_fps() {
        let dir = tempfile::tempdir().unwrap();
        let images = dir.path().join("prediction_results");
        write_frames(&images.join("pred"), 90, FrameFormat::Jpeg);
        let output = dir.path().join("output_video.mp4");

        let report = written(encode_directory(&images, &output, &EncoderOptions::default()).unwrap());
        assert_eq!(report.frames_written, 90);
        assert_eq!(report.frames.skipped_count(), 0);
        assert_eq!((report.width, report.height), (64, 48));

        assert_eq!(count_frames(&output).unwrap(), 90);
        let info = discover(&output).unwrap();
        assert_eq!((info.width, info.height), (64, 48));
        let fps = info.frame_rate.unwrap();
        assert!((fps - 30.0).abs() < 0.5, "unexpected frame rate {fps}");
    }

    #[test]
    fn test_unreadable_image_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        write_frames(dir.path(), 10, FrameFormat::Png);
        fs::write(dir.path().join(frame_file_name(10, FrameFormat::Png)), b"garbage").unwrap();
        let output = dir.path().join("out.mp4");

        let report = written(encode_directory(dir.path(), &output, &EncoderOptions::default()).unwrap());
        assert_eq!(report.frames_written, 10);
        assert_eq!(report.frames.skipped_count(), 1);
        assert_eq!(count_frames(&output).unwrap(), 10);
    }

    #[test]
    fn test_dimension_mismatch_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let images = dir.path().join("frames");
        write_frames(&images, 3, FrameFormat::Png);
        RgbImage::new(32, 32)
            .save(images.join(frame_file_name(3, FrameFormat::Png)))
            .unwrap();
        let output = dir.path().join("out.mp4");

        let err = encode_directory(&images, &output, &EncoderOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            MediaError::DimensionMismatch {
                expected: (64, 48),
                found: (32, 32),
                ..
            }
        ));
        assert!(!output.exists());
    }

    #[test]
    fn test_extract_every_frame_and_decimated() {
        let dir = tempfile::tempdir().unwrap();
        let images = dir.path().join("source");
        write_frames(&images, 90, FrameFormat::Png);
        let video = dir.path().join("input.mp4");
        written(encode_directory(&images, &video, &EncoderOptions::default()).unwrap());

        let frames_dir = dir.path().join("output_frames");
        let report = extract_frames(&video, &frames_dir, &ExtractOptions::default()).unwrap();
        assert_eq!(report.decoded, 90);
        assert_eq!(report.saved, 90);
        assert_eq!(report.dropped, 0);
        assert!(frames_dir.join("frame_0000.jpg").is_file());
        assert!(frames_dir.join("frame_0089.jpg").is_file());

        // Re-running with a stride wipes the previous 90 frames.
        for (decimation, expected) in [(3, 30), (4, 23), (7, 13), (90, 1), (200, 1)] {
            let options = ExtractOptions {
                decimation,
                format: FrameFormat::Png,
            };
            let report = extract_frames(&video, &frames_dir, &options).unwrap();
            assert_eq!(report.saved, expected, "decimation {decimation}");
            let on_disk = fs::read_dir(&frames_dir).unwrap().count() as u64;
            assert_eq!(on_disk, expected, "decimation {decimation}");
            assert!(frames_dir.join(frame_file_name(expected - 1, FrameFormat::Png)).is_file());
        }
    }

    #[test]
    fn test_extract_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let images = dir.path().join("source");
        // Alternate black and white so order is visible after lossy coding.
        fs::create_dir_all(&images).unwrap();
        for i in 0..12u64 {
            let value = if i % 2 == 0 { 0 } else { 255 };
            RgbImage::from_pixel(64, 48, Rgb([value, value, value]))
                .save(images.join(frame_file_name(i, FrameFormat::Png)))
                .unwrap();
        }
        let video = dir.path().join("input.mp4");
        written(encode_directory(&images, &video, &EncoderOptions::default()).unwrap());

        let frames_dir = dir.path().join("frames");
        let options = ExtractOptions {
            decimation: 1,
            format: FrameFormat::Png,
        };
        extract_frames(&video, &frames_dir, &options).unwrap();
        for i in 0..12u64 {
            let frame = image::open(frames_dir.join(frame_file_name(i, FrameFormat::Png)))
                .unwrap()
                .to_rgb8();
            let luma = frame.get_pixel(32, 24)[0];
            if i % 2 == 0 {
                assert!(luma < 64, "frame {i} should be dark, got {luma}");
            } else {
                assert!(luma > 192, "frame {i} should be bright, got {luma}");
            }
        }
    }

    #[test]
    fn test_extract_rejects_zero_decimation() {
        let dir = tempfile::tempdir().unwrap();
        let options = ExtractOptions {
            decimation: 0,
            ..Default::default()
        };
        let err = extract_frames(Path::new("input.mp4"), dir.path(), &options).unwrap_err();
        assert!(matches!(err, MediaError::InvalidDecimation));
    }

    #[test]
    fn test_extract_unopenable_input_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let frames_dir = dir.path().join("frames");
        fs::create_dir_all(&frames_dir).unwrap();
        fs::write(frames_dir.join("frame_0000.jpg"), b"previous run").unwrap();

        let missing = dir.path().join("missing.mov");
        let err = extract_frames(&missing, &frames_dir, &ExtractOptions::default()).unwrap_err();
        assert!(matches!(err, MediaError::Open { .. }));
        // Nothing was wiped since extraction never started.
        assert!(frames_dir.join("frame_0000.jpg").exists());
    }

    #[test]
    fn test_jpeg_extension_is_encoded() {
        let dir = tempfile::tempdir().unwrap();
        write_frames(dir.path(), 4, FrameFormat::Png);
        RgbImage::from_pixel(64, 48, Rgb([1, 2, 3]))
            .save(dir.path().join("frame_0004.jpeg"))
            .unwrap();
        let output = dir.path().join("out.mp4");

        let report = written(encode_directory(dir.path(), &output, &EncoderOptions::default()).unwrap());
        assert_eq!(report.frames_written, 5);
        assert_eq!(report.frames.skipped_count(), 0);
    }

    #[test]
    fn test_failed_encoder_setup_keeps_previous_video() {
        let dir = tempfile::tempdir().unwrap();
        let images = dir.path().join("frames");
        write_frames(&images, 3, FrameFormat::Png);
        let output = dir.path().join("out.mp4");
        fs::write(&output, b"previous run").unwrap();

        // MPEG-4 Part 2 caps the time base denominator at 65535.
        let options = EncoderOptions {
            fps: 70_000,
            ..Default::default()
        };
        assert!(encode_directory(&images, &output, &options).is_err());

        assert_eq!(fs::read(&output).unwrap(), b"previous run");
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(leftovers.len(), 2, "unexpected files {leftovers:?}");
    }

    #[test]
    fn test_successful_encode_replaces_previous_video() {
        let dir = tempfile::tempdir().unwrap();
        let images = dir.path().join("frames");
        write_frames(&images, 3, FrameFormat::Png);
        let output = dir.path().join("out.mp4");
        fs::write(&output, b"previous run").unwrap();

        written(encode_directory(&images, &output, &EncoderOptions::default()).unwrap());
        assert_eq!(count_frames(&output).unwrap(), 3);
        assert!(!dir.path().join(".partial.out.mp4").exists());
    }

    #[test]
    fn test_extract_skips_corrupt_packets() {
        let dir = tempfile::tempdir().unwrap();
        let images = dir.path().join("source");
        fs::create_dir_all(&images).unwrap();
        // Busy frames so the payload dwarfs the container index at the end.
        for i in 0..90u32 {
            let image = RgbImage::from_fn(128, 96, |x, y| {
                let v = ((x * 31 + y * 17 + i * 7) % 256) as u8;
                Rgb([v, v.wrapping_mul(5), 255 - v])
            });
            image
                .save(images.join(frame_file_name(u64::from(i), FrameFormat::Png)))
                .unwrap();
        }
        let video = dir.path().join("input.mp4");
        written(encode_directory(&images, &video, &EncoderOptions::default()).unwrap());

        let mut bytes = fs::read(&video).unwrap();
        let start = bytes.len() / 3;
        for byte in &mut bytes[start..start + 256] {
            *byte ^= 0x5a;
        }
        fs::write(&video, &bytes).unwrap();

        let frames_dir = dir.path().join("frames");
        let report = extract_frames(&video, &frames_dir, &ExtractOptions::default()).unwrap();
        assert_eq!(report.saved, report.decoded);
        assert!(report.decoded >= 45, "only {} frames decoded", report.decoded);
        assert!(report.decoded + report.dropped <= 90);
        assert_eq!(fs::read_dir(&frames_dir).unwrap().count() as u64, report.saved);
    }
}
