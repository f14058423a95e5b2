use std::path::PathBuf;

use anyhow::Context as _;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use text2world::{
    DemoConfig, DiffusionTransformer, ExternalGenerator, FfmpegSinkOpts, FfmpegVideoSink,
    GenerationParams, GuardedPipeline, GuardrailConfig, OffloadOptions, run_demo,
};

/// Text to world generation demo.
#[derive(Parser, Debug)]
#[command(name = "text2world", version)]
struct Cli {
    /// Base directory containing model checkpoints.
    #[arg(long, default_value = "checkpoints")]
    checkpoint_dir: PathBuf,

    /// DiT model weights directory name relative to the checkpoint directory.
    #[arg(long, value_enum, default_value_t = DiffusionTransformer::Text2World7B)]
    diffusion_transformer_dir: DiffusionTransformer,

    /// Prompt upsampler weights directory relative to the checkpoint directory.
    #[arg(long, default_value = "Cosmos-1.0-Prompt-Upsampler-12B-Text2World")]
    prompt_upsampler_dir: String,

    /// Skip the prompt upsampler when the prompt has more words than this.
    #[arg(long, default_value_t = text2world::demo::DEFAULT_WORD_LIMIT_TO_SKIP_UPSAMPLER)]
    word_limit_to_skip_upsampler: usize,

    /// Text prompt for a single generation.
    #[arg(long, conflicts_with = "batch_input_path")]
    prompt: Option<String>,

    /// JSONL file with one `{"prompt": ...}` object per line.
    #[arg(long)]
    batch_input_path: Option<PathBuf>,

    /// Negative prompt forwarded to the model.
    #[arg(long)]
    negative_prompt: Option<String>,

    /// Output folder for videos and prompt files.
    #[arg(long, default_value = "outputs/")]
    video_save_folder: PathBuf,

    /// Output base name in single-prompt mode.
    #[arg(long, default_value = "output")]
    video_save_name: String,

    /// MP4 quality, 0 (worst) to 10 (best).
    #[arg(long, default_value_t = text2world::encode::ffmpeg::DEFAULT_VIDEO_SAVE_QUALITY)]
    video_save_quality: u8,

    /// Classifier-free guidance scale.
    #[arg(long, default_value_t = 7.0)]
    guidance: f32,

    /// Number of diffusion sampling steps.
    #[arg(long, default_value_t = 35)]
    num_steps: u32,

    #[arg(long, default_value_t = 704)]
    height: u32,

    #[arg(long, default_value_t = 1280)]
    width: u32,

    #[arg(long, default_value_t = 24)]
    fps: u32,

    #[arg(long, default_value_t = 121)]
    num_video_frames: u32,

    #[arg(long, default_value_t = 1)]
    seed: u64,

    #[arg(long)]
    disable_prompt_upsampler: bool,

    #[arg(long)]
    offload_diffusion_transformer: bool,

    #[arg(long)]
    offload_tokenizer: bool,

    #[arg(long)]
    offload_text_encoder_model: bool,

    #[arg(long)]
    offload_prompt_upsampler: bool,

    #[arg(long)]
    offload_guardrail_models: bool,

    /// Generator program implementing the stdout frame protocol.
    #[arg(long, default_value = "text2world-generator")]
    generator_cmd: PathBuf,

    /// Guardrail configuration JSON. Without it the guardrails fail open.
    #[arg(long)]
    guardrail_config: Option<PathBuf>,
}

impl Cli {
    fn generation_params(&self) -> GenerationParams {
        GenerationParams {
            checkpoint_dir: self.checkpoint_dir.clone(),
            diffusion_transformer: self.diffusion_transformer_dir,
            prompt_upsampler_dir: self.prompt_upsampler_dir.clone(),
            enable_prompt_upsampler: !self.disable_prompt_upsampler,
            offload: OffloadOptions {
                diffusion_transformer: self.offload_diffusion_transformer,
                tokenizer: self.offload_tokenizer,
                text_encoder_model: self.offload_text_encoder_model,
                prompt_upsampler: self.offload_prompt_upsampler,
                guardrail_models: self.offload_guardrail_models,
            },
            guidance: self.guidance,
            num_steps: self.num_steps,
            height: self.height,
            width: self.width,
            fps: self.fps,
            num_video_frames: self.num_video_frames,
            seed: self.seed,
        }
    }

    fn demo_config(&self) -> DemoConfig {
        DemoConfig {
            prompt: self.prompt.clone(),
            batch_input_path: self.batch_input_path.clone(),
            negative_prompt: self.negative_prompt.clone(),
            word_limit_to_skip_upsampler: self.word_limit_to_skip_upsampler,
            video_save_folder: self.video_save_folder.clone(),
            video_save_name: self.video_save_name.clone(),
            generation: self.generation_params(),
        }
    }
}

fn main() -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = cli.demo_config();
    cfg.validate()?;

    let guardrails = match &cli.guardrail_config {
        Some(path) => GuardrailConfig::from_path(path)?,
        None => {
            tracing::warn!("no guardrail config given; text and video guardrails are disabled");
            GuardrailConfig::default()
        }
    };

    let generator = ExternalGenerator::new(&cli.generator_cmd, cfg.generation.clone())?;
    let mut pipeline = GuardedPipeline::new(
        generator,
        guardrails.build_text_runner()?,
        guardrails.build_video_runner()?,
    );
    let mut sink = FfmpegVideoSink::new(FfmpegSinkOpts {
        quality: cli.video_save_quality,
        ..Default::default()
    })?;

    let summary = run_demo(&cfg, &mut pipeline, &mut sink).context("text2world demo failed")?;
    tracing::info!(
        saved = summary.saved.len(),
        skipped = summary.skipped.len(),
        "done"
    );
    Ok(())
}
