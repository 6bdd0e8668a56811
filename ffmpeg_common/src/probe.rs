use std::path::Path;
use std::time::Duration;

use ffmpeg::format::input;
use ffmpeg::media::Type;

use crate::decode::VideoDecoder;
use crate::error::MediaError;

/// Container level properties of a video's best video stream.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaInfo {
    pub width: u32,
    pub height: u32,
    /// Average frame rate, if the container reports one.
    pub frame_rate: Option<f64>,
    pub duration: Option<Duration>,
    /// Frame count from the container header; may be missing or approximate.
    pub frames_hint: Option<u64>,
}

/// Reads stream properties without decoding.
pub fn discover(path: &Path) -> Result<MediaInfo, MediaError> {
    crate::init()?;

    let ictx = input(&path).map_err(|source| MediaError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let stream = ictx
        .streams()
        .best(Type::Video)
        .ok_or_else(|| MediaError::NoVideoStream {
            path: path.to_path_buf(),
        })?;

    let decoder = ffmpeg::codec::context::Context::from_parameters(stream.parameters())?
        .decoder()
        .video()?;

    let rate = stream.avg_frame_rate();
    let frame_rate = (rate.numerator() > 0 && rate.denominator() > 0).then(|| f64::from(rate));
    let duration = (ictx.duration() > 0)
        .then(|| Duration::from_micros(ictx.duration() as u64));
    let frames_hint = u64::try_from(stream.frames()).ok().filter(|&n| n > 0);

    Ok(MediaInfo {
        width: decoder.width(),
        height: decoder.height(),
        frame_rate,
        duration,
        frames_hint,
    })
}

/// Decodes the whole video stream and counts its frames.
pub fn count_frames(path: &Path) -> Result<u64, MediaError> {
    Ok(VideoDecoder::open(path)?.for_each_frame(|_, _| Ok(()))?.decoded)
}
