//! Copies between ffmpeg RGB24 frames and `image` buffers, honoring line stride.

use ffmpeg::format::Pixel;
use ffmpeg::util::frame::side_data::Type as SideDataType;
use ffmpeg::util::frame::video::Video;
use image::{imageops, RgbImage};

const RGB_BYTES: usize = 3;

/// Clockwise rotation a player applies when showing a stream, as recorded
/// by phone cameras in the display matrix.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    #[default]
    Upright,
    Clockwise90,
    Clockwise180,
    Clockwise270,
}

impl Rotation {
    /// Reads a 3x3 display matrix of 16.16 fixed point `i32`s. Anything that
    /// is not a quarter turn is treated as upright.
    pub fn from_display_matrix(bytes: &[u8]) -> Self {
        let value = |i: usize| -> Option<f64> {
            let raw = bytes.get(i * 4..i * 4 + 4)?.try_into().ok()?;
            Some(f64::from(i32::from_ne_bytes(raw)))
        };
        let (Some(a), Some(b), Some(c), Some(d)) = (value(0), value(1), value(3), value(4)) else {
            return Self::Upright;
        };
        let (scale_x, scale_y) = (a.hypot(c), b.hypot(d));
        if scale_x == 0.0 || scale_y == 0.0 {
            return Self::Upright;
        }

        let degrees = (b / scale_y)
            .atan2(a / scale_x)
            .to_degrees()
            .round()
            .rem_euclid(360.0);
        match degrees as u32 {
            90 => Self::Clockwise90,
            180 => Self::Clockwise180,
            270 => Self::Clockwise270,
            _ => Self::Upright,
        }
    }

    /// Rotation carried in a decoded frame's side data.
    pub fn of_frame(frame: &Video) -> Self {
        frame
            .side_data(SideDataType::DisplayMatrix)
            .map_or(Self::Upright, |side_data| {
                Self::from_display_matrix(side_data.data())
            })
    }

    pub fn apply(self, image: RgbImage) -> RgbImage {
        match self {
            Self::Upright => image,
            Self::Clockwise90 => imageops::rotate90(&image),
            Self::Clockwise180 => imageops::rotate180(&image),
            Self::Clockwise270 => imageops::rotate270(&image),
        }
    }
}

/// Packs an RGB24 frame into an [`RgbImage`], dropping any row padding.
pub fn frame_to_rgb_image(frame: &Video) -> Option<RgbImage> {
    let (width, height) = (frame.width(), frame.height());
    let row_len = width as usize * RGB_BYTES;
    let stride = frame.stride(0);
    let data = frame.data(0);

    let buffer = if stride == row_len {
        data.get(..row_len * height as usize)?.to_vec()
    } else {
        let mut buffer = Vec::with_capacity(row_len * height as usize);
        for row in 0..height as usize {
            let start = row * stride;
            buffer.extend_from_slice(data.get(start..start + row_len)?);
        }
        buffer
    };

    RgbImage::from_raw(width, height, buffer)
}

/// Copies an [`RgbImage`] into a newly allocated RGB24 frame.
pub fn rgb_image_to_frame(image: &RgbImage) -> Video {
    let (width, height) = image.dimensions();
    let mut frame = Video::new(Pixel::RGB24, width, height);
    let row_len = width as usize * RGB_BYTES;
    let stride = frame.stride(0);
    let dst = frame.data_mut(0);

    for (row, src) in image.as_raw().chunks_exact(row_len).enumerate() {
        let start = row * stride;
        dst[start..start + row_len].copy_from_slice(src);
    }
    frame
}
