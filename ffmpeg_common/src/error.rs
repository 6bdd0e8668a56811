use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("Failed to open video {path:?}: {source}")]
    Open {
        path: PathBuf,
        source: ffmpeg::Error,
    },

    #[error("No video stream found in {path:?}")]
    NoVideoStream { path: PathBuf },

    #[error("Decimation factor must be at least 1")]
    InvalidDecimation,

    /// Every frame of an output video must share the first frame's size.
    #[error("Frame {path:?} is {found:?}, expected {expected:?} like the first frame")]
    DimensionMismatch {
        path: PathBuf,
        expected: (u32, u32),
        found: (u32, u32),
    },

    #[error("Encoder for {0} is not available in this ffmpeg build")]
    EncoderNotFound(String),

    #[error("FFmpeg error: {0}")]
    Ffmpeg(#[from] ffmpeg::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
