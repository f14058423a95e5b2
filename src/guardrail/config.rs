use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use crate::foundation::error::{Text2WorldError, Text2WorldResult};
use crate::guardrail::blocklist::Blocklist;
use crate::guardrail::core::{GuardrailRunner, PostprocessingGuardrail};
use crate::guardrail::postprocess::{Blur, Brightness, CenterCrop, Region};

/// Declarative description of the text and video guardrail runners.
///
/// A missing section yields an unconfigured runner, which fails open.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GuardrailConfig {
    #[serde(default)]
    pub text: Option<TextGuardrailConfig>,
    #[serde(default)]
    pub video: Option<VideoGuardrailConfig>,
}

#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TextGuardrailConfig {
    #[serde(default)]
    pub blocklist: Vec<String>,
    #[serde(default)]
    pub generic_block_msg: String,
    #[serde(default)]
    pub generic_safe_msg: String,
}

#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VideoGuardrailConfig {
    #[serde(default)]
    pub generic_block_msg: String,
    #[serde(default)]
    pub generic_safe_msg: String,
    #[serde(default)]
    pub postprocess: Vec<PostprocessSpec>,
}

/// One postprocessing step, applied in list order.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PostprocessSpec {
    Brightness {
        factor: f32,
    },
    CenterCrop {
        width: u32,
        height: u32,
    },
    Blur {
        radius_px: u32,
        #[serde(default)]
        sigma: Option<f32>,
        #[serde(default)]
        regions: Vec<Region>,
    },
}

impl PostprocessSpec {
    pub fn build(&self) -> Text2WorldResult<Box<dyn PostprocessingGuardrail>> {
        Ok(match self {
            Self::Brightness { factor } => Box::new(Brightness::new(*factor)?),
            Self::CenterCrop { width, height } => Box::new(CenterCrop::new(*width, *height)?),
            Self::Blur {
                radius_px,
                sigma,
                regions,
            } => Box::new(Blur::new(*radius_px, *sigma)?.with_regions(regions.iter().copied())),
        })
    }
}

impl GuardrailConfig {
    pub fn from_path(path: impl AsRef<Path>) -> Text2WorldResult<Self> {
        let path = path.as_ref();
        let f = File::open(path).map_err(|e| {
            Text2WorldError::validation(format!("open guardrail config '{}': {e}", path.display()))
        })?;
        Self::from_reader(BufReader::new(f))
    }

    pub fn from_reader(r: impl Read) -> Text2WorldResult<Self> {
        serde_json::from_reader(r)
            .map_err(|e| Text2WorldError::serde(format!("parse guardrail config: {e}")))
    }

    /// Runner for prompts (checked before and after upsampling).
    pub fn build_text_runner(&self) -> Text2WorldResult<GuardrailRunner> {
        let Some(text) = &self.text else {
            return Ok(GuardrailRunner::default());
        };
        let mut builder = GuardrailRunner::builder()
            .generic_block_msg(text.generic_block_msg.clone())
            .generic_safe_msg(text.generic_safe_msg.clone());
        if !text.blocklist.is_empty() {
            builder = builder.safety_model(Blocklist::new(&text.blocklist)?);
        }
        Ok(builder.build())
    }

    /// Runner for generated video.
    pub fn build_video_runner(&self) -> Text2WorldResult<GuardrailRunner> {
        let Some(video) = &self.video else {
            return Ok(GuardrailRunner::default());
        };
        let mut builder = GuardrailRunner::builder()
            .generic_block_msg(video.generic_block_msg.clone())
            .generic_safe_msg(video.generic_safe_msg.clone());
        for spec in &video.postprocess {
            builder = builder.boxed_postprocessor(spec.build()?);
        }
        Ok(builder.build())
    }
}
