use std::path::{Path, PathBuf};

use crate::foundation::error::Text2WorldResult;
use crate::foundation::frames::VideoFrames;

/// Destination for finished videos, one call per saved prompt.
pub trait VideoSink {
    fn write_video(&mut self, path: &Path, video: &VideoFrames, fps: u32) -> Text2WorldResult<()>;
}

/// One video captured by [`InMemoryVideoSink`].
#[derive(Clone, Debug, PartialEq)]
pub struct CapturedVideo {
    pub path: PathBuf,
    pub video: VideoFrames,
    pub fps: u32,
}

/// Sink that keeps videos in memory, for tests and dry runs.
#[derive(Debug, Default)]
pub struct InMemoryVideoSink {
    videos: Vec<CapturedVideo>,
}

impl InMemoryVideoSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Captured videos in write order.
    pub fn videos(&self) -> &[CapturedVideo] {
        &self.videos
    }
}

impl VideoSink for InMemoryVideoSink {
    fn write_video(&mut self, path: &Path, video: &VideoFrames, fps: u32) -> Text2WorldResult<()> {
        self.videos.push(CapturedVideo {
            path: path.to_path_buf(),
            video: video.clone(),
            fps,
        });
        Ok(())
    }
}
