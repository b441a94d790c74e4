//! FFmpeg Integration Module
//!
//! Provides the FFmpeg functionality the frame sampler needs:
//! - Locating system-installed `ffmpeg`/`ffprobe` binaries
//! - Probing duration and pixel dimensions
//! - Decoding a single frame at a timeline position into raw RGB pixels

mod detection;
mod runner;

pub use detection::*;
pub use runner::{FFmpegRunner, MediaInfo, VideoStreamInfo};

/// FFmpeg-related error types
#[derive(Debug, thiserror::Error)]
pub enum FFmpegError {
    #[error("FFmpeg not found. Please install FFmpeg or set its path in settings.")]
    NotFound,

    #[error("FFmpeg execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Invalid input file: {0}")]
    InvalidInput(String),

    #[error("FFprobe error: {0}")]
    ProbeError(String),

    #[error("Process error: {0}")]
    ProcessError(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    ParseError(String),
}

pub type FFmpegResult<T> = Result<T, FFmpegError>;
