use std::io::{Read, Write as _};
use std::path::Path;
use std::process::{Command, Stdio};

use crate::encode::sink::VideoSink;
use crate::foundation::error::{Text2WorldError, Text2WorldResult};
use crate::foundation::frames::VideoFrames;

/// Quality used by the demo driver when none is given.
pub const DEFAULT_VIDEO_SAVE_QUALITY: u8 = 5;

/// Options for [`FfmpegVideoSink`].
#[derive(Clone, Debug)]
pub struct FfmpegSinkOpts {
    /// Overwrite output files that already exist.
    pub overwrite: bool,
    /// Quality on a `0..=10` scale; 10 is best.
    pub quality: u8,
}

impl Default for FfmpegSinkOpts {
    fn default() -> Self {
        Self {
            overwrite: true,
            quality: DEFAULT_VIDEO_SAVE_QUALITY,
        }
    }
}

impl FfmpegSinkOpts {
    pub fn validate(&self) -> Text2WorldResult<()> {
        if self.quality > 10 {
            return Err(Text2WorldError::validation(
                "video quality must be in 0..=10",
            ));
        }
        Ok(())
    }

    /// libx264 constant rate factor for `quality`: `int((1 - q / 10) * 51)`.
    pub fn crf(&self) -> u32 {
        ((1.0 - f64::from(self.quality) / 10.0) * 51.0) as u32
    }
}

/// Writes each video as an H.264 MP4 by piping rgb24 frames into the system `ffmpeg`.
#[derive(Clone, Debug, Default)]
pub struct FfmpegVideoSink {
    opts: FfmpegSinkOpts,
}

impl FfmpegVideoSink {
    pub fn new(opts: FfmpegSinkOpts) -> Text2WorldResult<Self> {
        opts.validate()?;
        Ok(Self { opts })
    }
}

impl VideoSink for FfmpegVideoSink {
    #[tracing::instrument(skip(self, video), fields(frames = video.len()))]
    fn write_video(&mut self, path: &Path, video: &VideoFrames, fps: u32) -> Text2WorldResult<()> {
        let (width, height) = (video.width(), video.height());
        if fps == 0 {
            return Err(Text2WorldError::validation("fps must be non-zero"));
        }
        if !width.is_multiple_of(2) || !height.is_multiple_of(2) {
            return Err(Text2WorldError::validation(
                "video width/height must be even (required for yuv420p mp4 output)",
            ));
        }

        ensure_parent_dir(path)?;
        if !self.opts.overwrite && path.exists() {
            return Err(Text2WorldError::validation(format!(
                "output file '{}' already exists",
                path.display()
            )));
        }

        if !is_ffmpeg_on_path() {
            return Err(Text2WorldError::encode(
                "ffmpeg is required for MP4 encoding, but was not found on PATH",
            ));
        }

        let mut cmd = Command::new("ffmpeg");
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        cmd.arg(if self.opts.overwrite { "-y" } else { "-n" });
        cmd.args([
            "-loglevel",
            "error",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgb24",
            "-s",
            &format!("{width}x{height}"),
            "-r",
            &fps.to_string(),
            "-i",
            "pipe:0",
            "-an",
            "-c:v",
            "libx264",
            "-crf",
            &self.opts.crf().to_string(),
            "-pix_fmt",
            "yuv420p",
            "-movflags",
            "+faststart",
        ])
        .arg(path);

        let mut child = cmd.spawn().map_err(|e| {
            Text2WorldError::encode(format!(
                "failed to spawn ffmpeg (is it installed and on PATH?): {e}"
            ))
        })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| Text2WorldError::encode("failed to open ffmpeg stdin (unexpected)"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| Text2WorldError::encode("failed to open ffmpeg stderr (unexpected)"))?;
        let stderr_drain = std::thread::spawn(move || {
            let mut bytes = Vec::new();
            stderr.read_to_end(&mut bytes)?;
            Ok::<_, std::io::Error>(bytes)
        });

        let mut write_result = Ok(());
        for frame in video.frames() {
            if let Err(e) = stdin.write_all(frame.as_raw()) {
                write_result = Err(e);
                break;
            }
        }
        drop(stdin);

        let status = child.wait().map_err(|e| {
            Text2WorldError::encode(format!("failed to wait for ffmpeg to finish: {e}"))
        })?;
        let stderr_bytes = stderr_drain
            .join()
            .map_err(|_| Text2WorldError::encode("ffmpeg stderr drain thread panicked"))?
            .map_err(|e| Text2WorldError::encode(format!("ffmpeg stderr read failed: {e}")))?;

        if !status.success() {
            let stderr = String::from_utf8_lossy(&stderr_bytes);
            return Err(Text2WorldError::encode(format!(
                "ffmpeg exited with status {status}: {}",
                stderr.trim()
            )));
        }
        write_result.map_err(|e| {
            Text2WorldError::encode(format!("failed to write frame to ffmpeg stdin: {e}"))
        })
    }
}

/// Ensure the parent directory of `path` exists.
pub fn ensure_parent_dir(path: &Path) -> Text2WorldResult<()> {
    if let Some(parent) = path.parent() {
        use anyhow::Context as _;
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory '{}'", parent.display()))?;
    }
    Ok(())
}

/// Return `true` when `ffmpeg` can be invoked from `PATH`.
pub fn is_ffmpeg_on_path() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}
