//! Text-to-world demo driver: prompts in, one video and one prompt file out per prompt.

use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::encode::sink::VideoSink;
use crate::foundation::error::{Text2WorldError, Text2WorldResult};
use crate::pipeline::{GenerationParams, GenerationPipeline};
use crate::prompts::{PromptEntry, read_prompts_from_file};

/// Default word count above which the prompt upsampler is skipped.
pub const DEFAULT_WORD_LIMIT_TO_SKIP_UPSAMPLER: usize = 250;

/// Driver settings.
#[derive(Clone, Debug, PartialEq)]
pub struct DemoConfig {
    /// Single prompt. Mutually exclusive with `batch_input_path`.
    pub prompt: Option<String>,
    /// JSONL batch file. Mutually exclusive with `prompt`.
    pub batch_input_path: Option<PathBuf>,
    pub negative_prompt: Option<String>,
    pub word_limit_to_skip_upsampler: usize,
    pub video_save_folder: PathBuf,
    /// Output base name in single-prompt mode.
    pub video_save_name: String,
    pub generation: GenerationParams,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            prompt: None,
            batch_input_path: None,
            negative_prompt: None,
            word_limit_to_skip_upsampler: DEFAULT_WORD_LIMIT_TO_SKIP_UPSAMPLER,
            video_save_folder: PathBuf::from("outputs"),
            video_save_name: "output".to_string(),
            generation: GenerationParams::default(),
        }
    }
}

impl DemoConfig {
    pub fn validate(&self) -> Text2WorldResult<()> {
        match (&self.prompt, &self.batch_input_path) {
            (Some(_), Some(_)) => {
                return Err(Text2WorldError::validation(
                    "pass either a prompt or a batch input path, not both",
                ));
            }
            (None, None) => {
                return Err(Text2WorldError::validation(
                    "either a prompt or a batch input path is required",
                ));
            }
            _ => {}
        }
        if self.batch_input_path.is_none() && self.video_save_name.trim().is_empty() {
            return Err(Text2WorldError::validation(
                "video_save_name must be non-empty",
            ));
        }
        self.generation.validate()
    }

    fn output_paths(&self, index: usize) -> (PathBuf, PathBuf) {
        let stem = if self.batch_input_path.is_some() {
            index.to_string()
        } else {
            self.video_save_name.clone()
        };
        (
            self.video_save_folder.join(format!("{stem}.mp4")),
            self.video_save_folder.join(format!("{stem}.txt")),
        )
    }
}

/// Why an entry produced no output.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    MissingPrompt,
    Blocked,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SkippedPrompt {
    pub index: usize,
    pub reason: SkipReason,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SavedOutput {
    pub index: usize,
    pub video_path: PathBuf,
    pub prompt_path: PathBuf,
}

/// What a run produced, in input order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DemoSummary {
    pub saved: Vec<SavedOutput>,
    pub skipped: Vec<SkippedPrompt>,
}

/// Run every prompt of `cfg` through `pipeline` and persist the results through `sink`.
///
/// Missing prompts and blocked generations are logged and skipped; the batch continues.
/// Pipeline, sink, and filesystem errors abort the run.
pub fn run_demo<P, S>(
    cfg: &DemoConfig,
    pipeline: &mut P,
    sink: &mut S,
) -> Text2WorldResult<DemoSummary>
where
    P: GenerationPipeline + ?Sized,
    S: VideoSink + ?Sized,
{
    cfg.validate()?;

    let prompts = match (&cfg.batch_input_path, &cfg.prompt) {
        (Some(path), _) => {
            tracing::info!("Reading batch inputs from path: {}", path.display());
            read_prompts_from_file(path)?
        }
        (None, prompt) => vec![PromptEntry {
            prompt: prompt.clone(),
        }],
    };

    std::fs::create_dir_all(&cfg.video_save_folder).with_context(|| {
        format!(
            "create video save folder '{}'",
            cfg.video_save_folder.display()
        )
    })?;

    let mut summary = DemoSummary::default();
    for (index, entry) in prompts.into_iter().enumerate() {
        let Some(current_prompt) = entry.prompt else {
            tracing::error!(index, "Prompt is missing, skipping world generation.");
            summary.skipped.push(SkippedPrompt {
                index,
                reason: SkipReason::MissingPrompt,
            });
            continue;
        };

        let generated = pipeline.generate(
            &current_prompt,
            cfg.negative_prompt.as_deref(),
            cfg.word_limit_to_skip_upsampler,
        )?;
        let Some(generated) = generated else {
            tracing::error!(index, "Guardrail blocked text2world generation.");
            summary.skipped.push(SkippedPrompt {
                index,
                reason: SkipReason::Blocked,
            });
            continue;
        };

        let (video_path, prompt_path) = cfg.output_paths(index);
        sink.write_video(&video_path, &generated.video, cfg.generation.fps)?;
        write_prompt(&prompt_path, &generated.prompt)?;

        tracing::info!("Saved video to {}", video_path.display());
        tracing::info!("Saved prompt to {}", prompt_path.display());
        summary.saved.push(SavedOutput {
            index,
            video_path,
            prompt_path,
        });
    }

    Ok(summary)
}

fn write_prompt(path: &Path, prompt: &str) -> Text2WorldResult<()> {
    std::fs::write(path, prompt.as_bytes())
        .with_context(|| format!("write prompt '{}'", path.display()))?;
    Ok(())
}
