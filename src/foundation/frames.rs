use image::RgbImage;
use rayon::prelude::*;

use crate::foundation::error::{Text2WorldError, Text2WorldResult};

/// Interleaved channels per pixel (RGB8).
pub const CHANNELS: usize = 3;

/// A decoded video: an ordered, non-empty run of RGB8 frames sharing one resolution.
///
/// This is the frame buffer handed from the generator to the postprocessors and finally to a
/// [`VideoSink`](crate::VideoSink). The shared-shape invariant is checked on every constructor,
/// so downstream code can index any frame with the dimensions reported by
/// [`VideoFrames::width`] / [`VideoFrames::height`].
#[derive(Clone, Debug, PartialEq)]
pub struct VideoFrames {
    frames: Vec<RgbImage>,
}

impl VideoFrames {
    /// Wrap `frames`, validating that there is at least one and that all share a resolution.
    pub fn new(frames: Vec<RgbImage>) -> Text2WorldResult<Self> {
        let Some(first) = frames.first() else {
            return Err(Text2WorldError::validation(
                "video must contain at least one frame",
            ));
        };
        let (width, height) = first.dimensions();
        if width == 0 || height == 0 {
            return Err(Text2WorldError::validation(
                "video frames must have non-zero width and height",
            ));
        }
        for (i, frame) in frames.iter().enumerate().skip(1) {
            if frame.dimensions() != (width, height) {
                let (w, h) = frame.dimensions();
                return Err(Text2WorldError::validation(format!(
                    "frame {i} is {w}x{h}, expected {width}x{height}"
                )));
            }
        }
        Ok(Self { frames })
    }

    /// Split a tightly packed `rgb24` byte stream (`num_frames * height * width * 3`) into frames.
    pub fn from_rgb24_bytes(
        num_frames: usize,
        width: u32,
        height: u32,
        bytes: &[u8],
    ) -> Text2WorldResult<Self> {
        let frame_len = rgb24_frame_len(width, height)?;
        let expected = frame_len
            .checked_mul(num_frames)
            .ok_or_else(|| Text2WorldError::validation("video buffer size overflow"))?;
        if bytes.len() != expected {
            return Err(Text2WorldError::validation(format!(
                "rgb24 buffer has {} bytes, expected {expected} \
                 ({num_frames} frames of {width}x{height})",
                bytes.len()
            )));
        }

        let frames = bytes
            .chunks_exact(frame_len)
            .map(|chunk| {
                RgbImage::from_raw(width, height, chunk.to_vec())
                    .ok_or_else(|| Text2WorldError::validation("rgb24 frame size mismatch"))
            })
            .collect::<Text2WorldResult<Vec<_>>>()?;
        Self::new(frames)
    }

    /// A video where every pixel of every frame is `rgb`.
    pub fn filled(
        num_frames: usize,
        width: u32,
        height: u32,
        rgb: [u8; 3],
    ) -> Text2WorldResult<Self> {
        let frame = RgbImage::from_pixel(width, height, image::Rgb(rgb));
        Self::new(vec![frame; num_frames])
    }

    /// Number of frames; never zero.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn width(&self) -> u32 {
        self.frames[0].width()
    }

    pub fn height(&self) -> u32 {
        self.frames[0].height()
    }

    pub fn frames(&self) -> &[RgbImage] {
        &self.frames
    }

    pub fn into_frames(self) -> Vec<RgbImage> {
        self.frames
    }

    /// Concatenate all frames into one `rgb24` byte stream, frame-major.
    pub fn to_rgb24_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.frames.len() * self.frames[0].as_raw().len());
        for frame in &self.frames {
            out.extend_from_slice(frame.as_raw());
        }
        out
    }

    /// Apply `f` to every frame (in parallel) and re-validate the shared shape.
    ///
    /// Frame order is preserved. `f` may change the resolution as long as it does so uniformly.
    pub fn map_frames<F>(self, f: F) -> Text2WorldResult<Self>
    where
        F: Fn(RgbImage) -> Text2WorldResult<RgbImage> + Send + Sync,
    {
        let frames = self
            .frames
            .into_par_iter()
            .map(f)
            .collect::<Text2WorldResult<Vec<_>>>()?;
        Self::new(frames)
    }
}

pub(crate) fn rgb24_frame_len(width: u32, height: u32) -> Text2WorldResult<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(CHANNELS))
        .ok_or_else(|| Text2WorldError::validation("frame buffer size overflow"))
}
