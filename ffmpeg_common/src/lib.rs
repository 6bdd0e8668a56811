//! FFmpeg side of the annotation pipeline: decoding a video into still
//! frames, and encoding still frames back into a video.

extern crate ffmpeg_next as ffmpeg;

pub mod conversion;
pub mod decode;
pub mod encode;
pub mod error;
pub mod extract;
pub mod probe;

use std::sync::Once;

pub use encode::{encode_directory, EncodeOutcome, EncodeReport, EncoderOptions, VideoCodec};
pub use error::MediaError;
pub use extract::{extract_frames, ExtractOptions, ExtractionReport};

static QUIET_LOGS: Once = Once::new();

/// Initializes ffmpeg, safe to call repeatedly.
pub fn init() -> Result<(), MediaError> {
    ffmpeg::init()?;
    QUIET_LOGS.call_once(|| ffmpeg::util::log::set_level(ffmpeg::util::log::Level::Error));
    Ok(())
}
