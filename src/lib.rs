//! Text-to-world demo driver and guardrail runner.
//!
//! The crate wraps an external text-to-video diffusion generator with two things:
//!
//! - a [`GuardrailRunner`]: an ordered list of safety checkers ([`ContentSafetyGuardrail`]) that
//!   stops at the first block, and an ordered list of frame postprocessors
//!   ([`PostprocessingGuardrail`]) composed left to right;
//! - a demo driver ([`run_demo`]) that reads prompts, calls a [`GenerationPipeline`], and saves
//!   one video and one prompt file per prompt.
//!
//! Unconfigured runners fail open (safe verdict, identity postprocessing) and log a warning.
//! Deployments that rely on the guardrails must check [`GuardrailRunner::has_safety_models`].
#![forbid(unsafe_code)]

pub mod demo;
pub mod encode;
pub mod foundation;
pub mod guardrail;
pub mod pipeline;
pub mod prompts;

pub use crate::foundation::error::{Text2WorldError, Text2WorldResult};
pub use crate::foundation::frames::VideoFrames;

pub use crate::demo::{
    DemoConfig, DemoSummary, SavedOutput, SkipReason, SkippedPrompt, run_demo,
};
pub use crate::encode::ffmpeg::{FfmpegSinkOpts, FfmpegVideoSink, is_ffmpeg_on_path};
pub use crate::encode::sink::{CapturedVideo, InMemoryVideoSink, VideoSink};
pub use crate::guardrail::blocklist::Blocklist;
pub use crate::guardrail::config::{
    GuardrailConfig, PostprocessSpec, TextGuardrailConfig, VideoGuardrailConfig,
};
pub use crate::guardrail::core::{
    ContentSafetyGuardrail, DEFAULT_SAFE_MSG, GuardrailInput, GuardrailRunner,
    GuardrailRunnerBuilder, PostprocessingGuardrail, SafetyVerdict,
};
pub use crate::guardrail::postprocess::{Blur, Brightness, CenterCrop, Region};
pub use crate::pipeline::{
    DiffusionTransformer, ExternalGenerator, Generated, GenerationParams, GenerationPipeline,
    GuardedPipeline, OffloadOptions,
};
pub use crate::prompts::{PromptEntry, read_prompts, read_prompts_from_file};
