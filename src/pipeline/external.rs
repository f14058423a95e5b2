use std::ffi::OsString;
use std::io::{BufRead, BufReader, Read};
use std::path::PathBuf;
use std::process::{Child, ChildStdout, Command, ExitStatus, Stdio};

use crate::foundation::error::{Text2WorldError, Text2WorldResult};
use crate::foundation::frames::{VideoFrames, rgb24_frame_len};
use crate::pipeline::{Generated, GenerationParams, GenerationPipeline};

/// First line a generator writes to stdout.
#[derive(Debug, serde::Deserialize)]
#[serde(untagged)]
enum Header {
    Video {
        prompt: String,
        num_frames: usize,
        height: u32,
        width: u32,
    },
    Blocked {
        blocked: bool,
    },
}

/// Runs the diffusion model as a separate program, one process per prompt.
///
/// The program receives the request as `--flag value` arguments (after any fixed arguments
/// given with [`ExternalGenerator::arg`]) and answers on stdout with one JSON header line
/// followed by raw frames:
///
/// ```text
/// {"prompt": "<resolved prompt>", "num_frames": 121, "height": 704, "width": 1280}\n
/// <num_frames * height * width * 3 bytes of rgb24>
/// ```
///
/// or the single line `{"blocked": true}` when its own guardrail refused the prompt.
/// A non-zero exit status is an error and carries the program's stderr.
#[derive(Clone, Debug)]
pub struct ExternalGenerator {
    program: PathBuf,
    fixed_args: Vec<OsString>,
    params: GenerationParams,
}

impl ExternalGenerator {
    pub fn new(program: impl Into<PathBuf>, params: GenerationParams) -> Text2WorldResult<Self> {
        params.validate()?;
        Ok(Self {
            program: program.into(),
            fixed_args: Vec::new(),
            params,
        })
    }

    /// Argument placed before the per-request flags.
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.fixed_args.push(arg.into());
        self
    }

    pub fn params(&self) -> &GenerationParams {
        &self.params
    }

    fn command(
        &self,
        prompt: &str,
        negative_prompt: Option<&str>,
        word_limit_to_skip_upsampler: usize,
    ) -> Command {
        let p = &self.params;
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.fixed_args);
        cmd.args(["--prompt", prompt]);
        if let Some(negative_prompt) = negative_prompt {
            cmd.args(["--negative-prompt", negative_prompt]);
        }
        cmd.arg("--word-limit-to-skip-upsampler")
            .arg(word_limit_to_skip_upsampler.to_string())
            .arg("--checkpoint-dir")
            .arg(&p.checkpoint_dir)
            .args(["--diffusion-transformer-dir", p.diffusion_transformer.dir_name()])
            .args(["--prompt-upsampler-dir", p.prompt_upsampler_dir.as_str()]);
        let numeric = [
            ("--guidance", p.guidance.to_string()),
            ("--num-steps", p.num_steps.to_string()),
            ("--height", p.height.to_string()),
            ("--width", p.width.to_string()),
            ("--fps", p.fps.to_string()),
            ("--num-video-frames", p.num_video_frames.to_string()),
            ("--seed", p.seed.to_string()),
        ];
        for (flag, value) in numeric {
            cmd.arg(flag).arg(value);
        }

        let toggles = [
            (!p.enable_prompt_upsampler, "--disable-prompt-upsampler"),
            (p.offload.diffusion_transformer, "--offload-diffusion-transformer"),
            (p.offload.tokenizer, "--offload-tokenizer"),
            (p.offload.text_encoder_model, "--offload-text-encoder-model"),
            (p.offload.prompt_upsampler, "--offload-prompt-upsampler"),
            (p.offload.guardrail_models, "--offload-guardrail-models"),
        ];
        for (on, flag) in toggles {
            if on {
                cmd.arg(flag);
            }
        }

        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }

    fn read_output(&self, stdout: ChildStdout) -> Text2WorldResult<Option<Generated>> {
        let mut reader = BufReader::new(stdout);
        let mut line = String::new();
        let n = reader.read_line(&mut line).map_err(|e| {
            Text2WorldError::generation(format!("failed to read generator header: {e}"))
        })?;
        if n == 0 {
            return Err(Text2WorldError::generation(
                "generator produced no output",
            ));
        }

        let header: Header = serde_json::from_str(line.trim_end()).map_err(|e| {
            Text2WorldError::generation(format!("invalid generator header: {e}"))
        })?;

        match header {
            Header::Blocked { blocked: true } => Ok(None),
            Header::Blocked { blocked: false } => Err(Text2WorldError::generation(
                "generator header has `blocked: false` and no video",
            )),
            Header::Video {
                prompt,
                num_frames,
                height,
                width,
            } => {
                let p = &self.params;
                let requested = (p.num_video_frames as usize, p.height, p.width);
                if (num_frames, height, width) != requested {
                    return Err(Text2WorldError::generation(format!(
                        "generator returned {num_frames} frames of {width}x{height}, \
                         requested {} frames of {}x{}",
                        p.num_video_frames, p.width, p.height
                    )));
                }

                let len = rgb24_frame_len(width, height)?
                    .checked_mul(num_frames)
                    .ok_or_else(|| Text2WorldError::generation("video payload size overflow"))?;
                let mut payload = vec![0u8; len];
                reader.read_exact(&mut payload).map_err(|e| {
                    Text2WorldError::generation(format!(
                        "truncated video payload (expected {len} bytes): {e}"
                    ))
                })?;

                let video = VideoFrames::from_rgb24_bytes(num_frames, width, height, &payload)?;
                Ok(Some(Generated { video, prompt }))
            }
        }
    }
}

impl GenerationPipeline for ExternalGenerator {
    #[tracing::instrument(skip_all, fields(program = %self.program.display()))]
    fn generate(
        &mut self,
        prompt: &str,
        negative_prompt: Option<&str>,
        word_limit_to_skip_upsampler: usize,
    ) -> Text2WorldResult<Option<Generated>> {
        let mut child = self
            .command(prompt, negative_prompt, word_limit_to_skip_upsampler)
            .spawn()
            .map_err(|e| {
                Text2WorldError::generation(format!(
                    "failed to spawn generator '{}': {e}",
                    self.program.display()
                ))
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Text2WorldError::generation("failed to open generator stdout"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| Text2WorldError::generation("failed to open generator stderr"))?;
        let stderr_drain = std::thread::spawn(move || {
            let mut bytes = Vec::new();
            stderr.read_to_end(&mut bytes)?;
            Ok::<_, std::io::Error>(bytes)
        });

        // `stdout` is dropped inside `read_output`, so a child still writing after a protocol
        // error sees a broken pipe instead of blocking `wait`.
        let output = self.read_output(stdout);
        let (status, stderr_bytes) = finish_child(&mut child, stderr_drain)?;

        if !status.success() {
            let stderr = String::from_utf8_lossy(&stderr_bytes);
            let mut msg = format!("generator exited with status {status}: {}", stderr.trim());
            if let Err(e) = &output {
                msg.push_str(&format!(" ({e})"));
            }
            return Err(Text2WorldError::generation(msg));
        }

        let output = output?;
        if output.is_none() {
            tracing::debug!("generator reported a blocked prompt");
        }
        Ok(output)
    }
}

fn finish_child(
    child: &mut Child,
    stderr_drain: std::thread::JoinHandle<std::io::Result<Vec<u8>>>,
) -> Text2WorldResult<(ExitStatus, Vec<u8>)> {
    let status = child.wait().map_err(|e| {
        Text2WorldError::generation(format!("failed to wait for generator to finish: {e}"))
    })?;
    let stderr = stderr_drain
        .join()
        .map_err(|_| Text2WorldError::generation("generator stderr drain thread panicked"))?
        .map_err(|e| Text2WorldError::generation(format!("generator stderr read failed: {e}")))?;
    Ok((status, stderr))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_carries_request_and_toggles() {
        let params = GenerationParams {
            enable_prompt_upsampler: false,
            offload: crate::pipeline::OffloadOptions {
                tokenizer: true,
                ..Default::default()
            },
            ..Default::default()
        };
        let generator = ExternalGenerator::new("gen", params).unwrap().arg("run");
        let cmd = generator.command("a lake", Some("blurry"), 250);
        let args: Vec<String> = cmd
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();

        assert_eq!(&args[..3], ["run", "--prompt", "a lake"]);
        assert!(args.windows(2).any(|w| w == ["--negative-prompt", "blurry"]));
        assert!(args.windows(2).any(|w| w == ["--num-video-frames", "121"]));
        assert!(args.iter().any(|a| a == "--disable-prompt-upsampler"));
        assert!(args.iter().any(|a| a == "--offload-tokenizer"));
        assert!(!args.iter().any(|a| a == "--offload-guardrail-models"));
    }

    #[test]
    fn invalid_params_are_rejected_up_front() {
        let params = GenerationParams {
            fps: 0,
            ..Default::default()
        };
        assert!(ExternalGenerator::new("gen", params).is_err());
    }
}
