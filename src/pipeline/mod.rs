//! The generation side: what the demo driver asks a text-to-video model for.
//!
//! The diffusion model is an external collaborator. This module only fixes the contract
//! ([`GenerationPipeline`]), the parameters forwarded to the model ([`GenerationParams`]), a
//! guardrail wrapper ([`GuardedPipeline`]), and a driver for an out-of-process generator
//! ([`ExternalGenerator`]).

pub mod external;
pub mod guarded;

use std::path::PathBuf;

use crate::foundation::error::{Text2WorldError, Text2WorldResult};
use crate::foundation::frames::VideoFrames;

pub use external::ExternalGenerator;
pub use guarded::GuardedPipeline;

/// Output of one successful generation.
#[derive(Clone, Debug, PartialEq)]
pub struct Generated {
    pub video: VideoFrames,
    /// The prompt the video was generated from (after upsampling, if any).
    pub prompt: String,
}

/// A text-to-video generation pipeline.
///
/// `Ok(None)` means the pipeline's own guardrail blocked the request; it is not an error.
pub trait GenerationPipeline {
    fn generate(
        &mut self,
        prompt: &str,
        negative_prompt: Option<&str>,
        word_limit_to_skip_upsampler: usize,
    ) -> Text2WorldResult<Option<Generated>>;
}

impl<P: GenerationPipeline + ?Sized> GenerationPipeline for &mut P {
    fn generate(
        &mut self,
        prompt: &str,
        negative_prompt: Option<&str>,
        word_limit_to_skip_upsampler: usize,
    ) -> Text2WorldResult<Option<Generated>> {
        (**self).generate(prompt, negative_prompt, word_limit_to_skip_upsampler)
    }
}

/// Diffusion transformer checkpoints the demo knows how to select.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum DiffusionTransformer {
    #[default]
    #[value(name = "Cosmos-1.0-Diffusion-7B-Text2World")]
    Text2World7B,
    #[value(name = "Cosmos-1.0-Diffusion-14B-Text2World")]
    Text2World14B,
}

impl DiffusionTransformer {
    /// Weights directory name relative to the checkpoint directory.
    pub fn dir_name(self) -> &'static str {
        match self {
            Self::Text2World7B => "Cosmos-1.0-Diffusion-7B-Text2World",
            Self::Text2World14B => "Cosmos-1.0-Diffusion-14B-Text2World",
        }
    }
}

/// Per-stage model offloading toggles. Forwarded to the generator untouched.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OffloadOptions {
    pub diffusion_transformer: bool,
    pub tokenizer: bool,
    pub text_encoder_model: bool,
    pub prompt_upsampler: bool,
    pub guardrail_models: bool,
}

/// Everything the model needs besides the prompt.
#[derive(Clone, Debug, PartialEq)]
pub struct GenerationParams {
    pub checkpoint_dir: PathBuf,
    pub diffusion_transformer: DiffusionTransformer,
    pub prompt_upsampler_dir: String,
    pub enable_prompt_upsampler: bool,
    pub offload: OffloadOptions,
    pub guidance: f32,
    pub num_steps: u32,
    pub height: u32,
    pub width: u32,
    pub fps: u32,
    pub num_video_frames: u32,
    pub seed: u64,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            checkpoint_dir: PathBuf::from("checkpoints"),
            diffusion_transformer: DiffusionTransformer::default(),
            prompt_upsampler_dir: "Cosmos-1.0-Prompt-Upsampler-12B-Text2World".to_string(),
            enable_prompt_upsampler: true,
            offload: OffloadOptions::default(),
            guidance: 7.0,
            num_steps: 35,
            height: 704,
            width: 1280,
            fps: 24,
            num_video_frames: 121,
            seed: 1,
        }
    }
}

impl GenerationParams {
    pub fn validate(&self) -> Text2WorldResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(Text2WorldError::validation(
                "height/width must be non-zero",
            ));
        }
        if !self.width.is_multiple_of(2) || !self.height.is_multiple_of(2) {
            return Err(Text2WorldError::validation(
                "height/width must be even (required for yuv420p mp4 output)",
            ));
        }
        if self.fps == 0 {
            return Err(Text2WorldError::validation("fps must be non-zero"));
        }
        if self.num_video_frames == 0 {
            return Err(Text2WorldError::validation(
                "num_video_frames must be non-zero",
            ));
        }
        if self.num_steps == 0 {
            return Err(Text2WorldError::validation("num_steps must be non-zero"));
        }
        if !self.guidance.is_finite() {
            return Err(Text2WorldError::validation("guidance must be finite"));
        }
        Ok(())
    }

    /// Absolute-or-relative path to the selected diffusion transformer weights.
    pub fn diffusion_transformer_path(&self) -> PathBuf {
        self.checkpoint_dir.join(self.diffusion_transformer.dir_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        GenerationParams::default().validate().unwrap();
    }

    #[test]
    fn validation_catches_bad_values() {
        let odd = GenerationParams {
            width: 1281,
            ..Default::default()
        };
        assert!(odd.validate().is_err());

        let no_frames = GenerationParams {
            num_video_frames: 0,
            ..Default::default()
        };
        assert!(no_frames.validate().is_err());

        let nan = GenerationParams {
            guidance: f32::NAN,
            ..Default::default()
        };
        assert!(nan.validate().is_err());
    }

    #[test]
    fn transformer_path_joins_checkpoint_dir() {
        let params = GenerationParams {
            diffusion_transformer: DiffusionTransformer::Text2World14B,
            ..Default::default()
        };
        assert_eq!(
            params.diffusion_transformer_path(),
            PathBuf::from("checkpoints").join("Cosmos-1.0-Diffusion-14B-Text2World")
        );
    }
}
