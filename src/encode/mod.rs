//! Persisting generated videos.

/// `ffmpeg`-based MP4 output via the system `ffmpeg` binary.
pub mod ffmpeg;
/// Sink trait and the in-memory sink.
pub mod sink;
