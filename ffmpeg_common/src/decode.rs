use std::path::{Path, PathBuf};

use ffmpeg::format::{context::Input, input, Pixel};
use ffmpeg::media::Type;
use ffmpeg::util::frame::video::Video;

use crate::error::MediaError;

/// Totals of a full decode pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DecodeStats {
    pub decoded: u64,
    /// Packets the decoder rejected; their frames are missing from the output.
    pub dropped_packets: u64,
}

/// An opened input file positioned on its best video stream.
///
/// The demuxer and decoder are released on drop, whichever way decoding ends.
pub struct VideoDecoder {
    path: PathBuf,
    ictx: Input,
    decoder: ffmpeg::decoder::Video,
    stream_index: usize,
}

impl VideoDecoder {
    pub fn open(path: &Path) -> Result<Self, MediaError> {
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
        let stream_index = stream.index();

        let context_decoder = ffmpeg::codec::context::Context::from_parameters(stream.parameters())?;
        let decoder = context_decoder.decoder().video()?;

        Ok(Self {
            path: path.to_path_buf(),
            ictx,
            decoder,
            stream_index,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn width(&self) -> u32 {
        self.decoder.width()
    }

    pub fn height(&self) -> u32 {
        self.decoder.height()
    }

    pub fn format(&self) -> Pixel {
        self.decoder.format()
    }

    /// Decodes the whole stream, calling `on_frame` with each frame's decode
    /// index in presentation order.
    ///
    /// A packet the decoder rejects is logged and dropped; decoding carries on
    /// with the next one.
    pub fn for_each_frame<F>(mut self, mut on_frame: F) -> Result<DecodeStats, MediaError>
    where
        F: FnMut(u64, &Video) -> Result<(), MediaError>,
    {
        let mut frame_index = 0;
        let mut dropped_packets = 0;

        let mut receive_decoded_frames =
            |decoder: &mut ffmpeg::decoder::Video| -> Result<(), MediaError> {
                let mut decoded = Video::empty();
                while decoder.receive_frame(&mut decoded).is_ok() {
                    on_frame(frame_index, &decoded)?;
                    frame_index += 1;
                }
                Ok(())
            };

        for (stream, packet) in self.ictx.packets() {
            if stream.index() != self.stream_index {
                continue;
            }
            if let Err(e) = self.decoder.send_packet(&packet) {
                log::warn!(
                    "Dropping undecodable packet (pts {:?}) of {:?}: {e}",
                    packet.pts(),
                    self.path
                );
                dropped_packets += 1;
                continue;
            }
            receive_decoded_frames(&mut self.decoder)?;
        }
        self.decoder.send_eof()?;
        receive_decoded_frames(&mut self.decoder)?;

        if dropped_packets > 0 {
            log::warn!("{dropped_packets} packets of {:?} could not be decoded", self.path);
        }
        Ok(DecodeStats {
            decoded: frame_index,
            dropped_packets,
        })
    }
}
