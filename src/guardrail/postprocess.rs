use image::RgbImage;
use image::imageops::{self, GaussianBlurParameters};

use crate::foundation::error::{Text2WorldError, Text2WorldResult};
use crate::foundation::frames::VideoFrames;
use crate::guardrail::core::PostprocessingGuardrail;

/// Largest accepted blur radius, in pixels.
pub const MAX_BLUR_RADIUS_PX: u32 = 256;

/// Multiplies every channel by `factor`, saturating at 255. Shape preserving.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Brightness {
    factor: f32,
}

impl Brightness {
    pub fn new(factor: f32) -> Text2WorldResult<Self> {
        if !factor.is_finite() || factor < 0.0 {
            return Err(Text2WorldError::validation(
                "brightness factor must be finite and >= 0",
            ));
        }
        Ok(Self { factor })
    }

    pub fn factor(&self) -> f32 {
        self.factor
    }
}

impl PostprocessingGuardrail for Brightness {
    fn postprocess(&self, frames: VideoFrames) -> Text2WorldResult<VideoFrames> {
        let factor = self.factor;
        frames.map_frames(move |mut frame| {
            for v in frame.iter_mut() {
                *v = (f32::from(*v) * factor).round().min(255.0) as u8;
            }
            Ok(frame)
        })
    }

    fn name(&self) -> &str {
        "brightness"
    }
}

/// Crops every frame to a centered `width x height` window.
///
/// This transformer changes the resolution of the video by contract; frame count is kept.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CenterCrop {
    width: u32,
    height: u32,
}

impl CenterCrop {
    pub fn new(width: u32, height: u32) -> Text2WorldResult<Self> {
        if width == 0 || height == 0 {
            return Err(Text2WorldError::validation(
                "center crop width/height must be non-zero",
            ));
        }
        Ok(Self { width, height })
    }
}

impl PostprocessingGuardrail for CenterCrop {
    fn postprocess(&self, frames: VideoFrames) -> Text2WorldResult<VideoFrames> {
        let (src_w, src_h) = (frames.width(), frames.height());
        if self.width > src_w || self.height > src_h {
            return Err(Text2WorldError::guardrail(format!(
                "center crop {}x{} exceeds frame size {src_w}x{src_h}",
                self.width, self.height
            )));
        }
        let x0 = (src_w - self.width) / 2;
        let y0 = (src_h - self.height) / 2;
        let (w, h) = (self.width, self.height);
        frames.map_frames(move |frame| {
            Ok(imageops::crop_imm(&frame, x0, y0, w, h).to_image())
        })
    }

    fn name(&self) -> &str {
        "center_crop"
    }
}

/// Axis-aligned pixel rectangle; clipped to the frame when applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    fn clip(self, frame_w: u32, frame_h: u32) -> Option<Self> {
        let x1 = self.x.saturating_add(self.width).min(frame_w);
        let y1 = self.y.saturating_add(self.height).min(frame_h);
        if self.x >= x1 || self.y >= y1 {
            return None;
        }
        Some(Self::new(self.x, self.y, x1 - self.x, y1 - self.y))
    }
}

/// Gaussian blur of whole frames, or only of the configured regions (faces, logos, ...).
/// Shape preserving.
#[derive(Clone, Debug, PartialEq)]
pub struct Blur {
    radius_px: u32,
    sigma: Option<f32>,
    regions: Vec<Region>,
}

impl Blur {
    /// Without `sigma` the kernel spans `2 * radius_px + 1` pixels and sigma follows from that
    /// size. With `sigma` the kernel size follows from sigma instead.
    pub fn new(radius_px: u32, sigma: Option<f32>) -> Text2WorldResult<Self> {
        if radius_px > MAX_BLUR_RADIUS_PX {
            return Err(Text2WorldError::validation(format!(
                "blur radius_px must be <= {MAX_BLUR_RADIUS_PX}"
            )));
        }
        if let Some(sigma) = sigma
            && !(sigma.is_normal() && sigma > 0.0)
        {
            return Err(Text2WorldError::validation(
                "blur sigma must be finite and > 0",
            ));
        }
        Ok(Self {
            radius_px,
            sigma,
            regions: Vec::new(),
        })
    }

    pub fn with_regions(mut self, regions: impl IntoIterator<Item = Region>) -> Self {
        self.regions.extend(regions);
        self
    }

    fn kernel(&self) -> GaussianBlurParameters {
        match self.sigma {
            Some(sigma) => GaussianBlurParameters::new_from_sigma(sigma),
            None => GaussianBlurParameters::new_from_radius(self.radius_px as f32),
        }
    }

    /// Source pixels needed on each side of a region so its edge is blurred like the interior.
    fn reach(&self) -> u32 {
        let from_sigma = self.sigma.map_or(0, |s| (4.0 * s).ceil() as u32);
        self.radius_px.max(from_sigma)
    }

    fn blur_frame(&self, frame: RgbImage) -> RgbImage {
        let kernel = self.kernel();
        if self.regions.is_empty() {
            return imageops::blur_advanced(&frame, kernel);
        }

        let (w, h) = frame.dimensions();
        let reach = self.reach();
        let mut frame = frame;
        for region in self.regions.iter().filter_map(|r| r.clip(w, h)) {
            let x0 = region.x.saturating_sub(reach);
            let y0 = region.y.saturating_sub(reach);
            let x1 = (region.x + region.width).saturating_add(reach).min(w);
            let y1 = (region.y + region.height).saturating_add(reach).min(h);

            let window = imageops::crop_imm(&frame, x0, y0, x1 - x0, y1 - y0).to_image();
            let blurred = imageops::blur_advanced(&window, kernel);
            let patch = imageops::crop_imm(
                &blurred,
                region.x - x0,
                region.y - y0,
                region.width,
                region.height,
            )
            .to_image();
            imageops::replace(&mut frame, &patch, i64::from(region.x), i64::from(region.y));
        }
        frame
    }
}

impl PostprocessingGuardrail for Blur {
    fn postprocess(&self, frames: VideoFrames) -> Text2WorldResult<VideoFrames> {
        if self.radius_px == 0 {
            return Ok(frames);
        }
        frames.map_frames(|frame| Ok(self.blur_frame(frame)))
    }

    fn name(&self) -> &str {
        "blur"
    }
}
