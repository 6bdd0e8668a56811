//! Naming, ordering and scratch-directory handling for frame image sequences.
//!
//! Frames are written as `frame_0000.jpg`, `frame_0001.jpg`, ... The sequence
//! number is zero-padded to four digits, so lexical order only matches
//! temporal order up to 10000 frames. Anything that needs frame order sorts on
//! the parsed sequence number instead, see [`sort_frames`].

use std::cmp::Ordering;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use anyhow::Context;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageResult};
use serde::{Deserialize, Serialize};

pub const FRAME_PREFIX: &str = "frame_";

/// Extensions of frame images, for both the annotator and the encoder.
pub const FRAME_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Quality used for every jpeg frame written.
pub const JPEG_QUALITY: u8 = 95;

/// Still image format used for extracted frames.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameFormat {
    #[default]
    Jpeg,
    Png,
}

impl FrameFormat {
    pub fn extension(self) -> &'static str {
        match self {
            FrameFormat::Jpeg => "jpg",
            FrameFormat::Png => "png",
        }
    }
}

/// `frame_0042.jpg` for index 42.
pub fn frame_file_name(index: u64, format: FrameFormat) -> String {
    format!("{FRAME_PREFIX}{index:04}.{}", format.extension())
}

/// Saves a frame image, picking the format from the extension of `path`.
/// Jpeg frames are written at [`JPEG_QUALITY`].
pub fn save_frame(image: &DynamicImage, path: &Path) -> ImageResult<()> {
    if !has_extension(path, &["jpg", "jpeg"]) {
        return image.save(path);
    }
    let writer = BufWriter::new(File::create(path)?);
    image
        .to_rgb8()
        .write_with_encoder(JpegEncoder::new_with_quality(writer, JPEG_QUALITY))
}

/// Parses the trailing run of digits in the file stem, e.g. 42 for `frame_0042.jpg`.
pub fn frame_sequence_number(path: &Path) -> Option<u64> {
    let stem = path.file_stem()?.to_str()?;
    let digits_start = stem
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_digit())
        .last()
        .map(|(i, _)| i)?;
    stem[digits_start..].parse().ok()
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| extensions.iter().any(|e| ext.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

fn frame_order(a: &Path, b: &Path) -> Ordering {
    match (frame_sequence_number(a), frame_sequence_number(b)) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.file_name().cmp(&b.file_name())),
        // Numbered frames go before anything without a sequence number.
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.file_name().cmp(&b.file_name()),
    }
    .then_with(|| a.cmp(b))
}

/// Sorts paths into temporal order by sequence number, then file name.
pub fn sort_frames(paths: &mut [PathBuf]) {
    paths.sort_by(|a, b| frame_order(a, b));
}

/// Lists image files directly inside `dir`, sorted into frame order.
pub fn list_frames(dir: &Path, extensions: &[&str]) -> anyhow::Result<Vec<PathBuf>> {
    let mut frames = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("Failed to read directory {dir:?}"))? {
        let path = entry?.path();
        if path.is_file() && has_extension(&path, extensions) {
            frames.push(path);
        }
    }
    sort_frames(&mut frames);
    Ok(frames)
}

/// Like [`list_frames`] but walks subdirectories too.
pub fn collect_frames_recursive(dir: &Path, extensions: &[&str]) -> anyhow::Result<Vec<PathBuf>> {
    let mut frames = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        let entries =
            fs::read_dir(&current).with_context(|| format!("Failed to read directory {current:?}"))?;
        for entry in entries {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path);
            } else if has_extension(&path, extensions) {
                frames.push(path);
            }
        }
    }
    sort_frames(&mut frames);
    Ok(frames)
}

/// Deletes `dir` with everything in it, then creates it empty.
pub fn reset_dir(dir: &Path) -> anyhow::Result<()> {
    if dir.exists() {
        log::info!("Removing previous contents of {dir:?}");
        fs::remove_dir_all(dir).with_context(|| format!("Failed to remove {dir:?}"))?;
    }
    fs::create_dir_all(dir).with_context(|| format!("Failed to create {dir:?}"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_file_name() {
        assert_eq!(frame_file_name(0, FrameFormat::Jpeg), "frame_0000.jpg");
        assert_eq!(frame_file_name(42, FrameFormat::Png), "frame_0042.png");
        assert_eq!(frame_file_name(12345, FrameFormat::Jpeg), "frame_12345.jpg");
    }

    #[test]
    fn test_frame_sequence_number() {
        assert_eq!(frame_sequence_number(Path::new("a/frame_0042.jpg")), Some(42));
        assert_eq!(frame_sequence_number(Path::new("frame_12345.png")), Some(12345));
        assert_eq!(frame_sequence_number(Path::new("cover.png")), None);
        assert_eq!(frame_sequence_number(Path::new("frame_.png")), None);
    }

    #[test]
    fn test_sort_frames_is_numeric() {
        let mut paths: Vec<PathBuf> = ["frame_10000.jpg", "frame_9999.jpg", "frame_0002.jpg", "poster.jpg", "frame_0010.jpg"]
            .iter()
            .map(PathBuf::from)
            .collect();
        sort_frames(&mut paths);
        let names: Vec<_> = paths.iter().map(|p| p.to_str().unwrap()).collect();
        assert_eq!(
            names,
            ["frame_0002.jpg", "frame_0010.jpg", "frame_9999.jpg", "frame_10000.jpg", "poster.jpg"]
        );
    }

    #[test]
    fn test_list_frames_filters_extensions() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["frame_0001.jpg", "frame_0000.png", "notes.txt", "frame_0002.JPG"] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested/frame_0003.jpg"), b"x").unwrap();

        let frames = list_frames(dir.path(), FRAME_EXTENSIONS).unwrap();
        let names: Vec<_> = frames
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, ["frame_0000.png", "frame_0001.jpg", "frame_0002.JPG"]);
    }

    #[test]
    fn test_collect_frames_recursive() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("pred/deeper")).unwrap();
        fs::write(dir.path().join("pred/frame_0001.jpg"), b"x").unwrap();
        fs::write(dir.path().join("pred/deeper/frame_0000.png"), b"x").unwrap();
        fs::write(dir.path().join("pred/frame_0002.jpeg"), b"x").unwrap();

        fs::write(dir.path().join("pred/readme.txt"), b"x").unwrap();

        let frames = collect_frames_recursive(dir.path(), FRAME_EXTENSIONS).unwrap();
        let numbers: Vec<_> = frames.iter().filter_map(|p| frame_sequence_number(p)).collect();
        assert_eq!(numbers, [0, 1, 2]);
    }

    #[test]
    fn test_save_frame_jpeg_quality() {
        let dir = tempfile::tempdir().unwrap();
        let mut noisy = image::RgbImage::new(64, 64);
        for (x, y, pixel) in noisy.enumerate_pixels_mut() {
            let v = ((x * 37 + y * 91) % 251) as u8;
            *pixel = image::Rgb([v, v.wrapping_mul(3), 255 - v]);
        }
        let noisy = DynamicImage::ImageRgb8(noisy);

        let high = dir.path().join("frame_0000.jpg");
        let default = dir.path().join("default.jpg");
        save_frame(&noisy, &high).unwrap();
        noisy.save(&default).unwrap();

        let size = |p: &Path| fs::metadata(p).unwrap().len();
        assert!(size(&high) > size(&default));
        assert_eq!(image::open(&high).unwrap().to_rgb8().dimensions(), (64, 64));

        let png = dir.path().join("frame_0001.png");
        save_frame(&noisy, &png).unwrap();
        assert_eq!(image::open(&png).unwrap(), noisy);
    }

    #[test]
    fn test_reset_dir_wipes_contents() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = dir.path().join("scratch");
        fs::create_dir_all(scratch.join("old")).unwrap();
        fs::write(scratch.join("frame_0000.jpg"), b"stale").unwrap();

        reset_dir(&scratch).unwrap();
        assert!(scratch.is_dir());
        assert_eq!(fs::read_dir(&scratch).unwrap().count(), 0);

        // Also creates missing parents.
        let fresh = dir.path().join("a/b");
        reset_dir(&fresh).unwrap();
        assert!(fresh.is_dir());
    }
}
