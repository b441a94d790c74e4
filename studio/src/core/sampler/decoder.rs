//! Video Decode Contexts
//!
//! A [`VideoDecoder`] turns a [`MediaBlob`] into a [`DecodeContext`] once the
//! video's metadata is readable. The context seeks to timeline positions and
//! hands back the displayed frame as RGB pixels at native resolution.
//!
//! Dropping a context releases everything it holds (for the FFmpeg decoder,
//! the temporary copy of the source bytes).

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use image::RgbImage;
use tracing::{debug, warn};

use crate::core::ffmpeg::{FFmpegError, FFmpegRunner};
use crate::core::media::MediaBlob;
use crate::core::{new_request_id, CoreError, CoreResult, TimeSec};

/// Metadata available once a video has been loaded
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoMetadata {
    pub duration_sec: TimeSec,
    pub width: u32,
    pub height: u32,
}

/// Loads videos into decode contexts
#[async_trait]
pub trait VideoDecoder: Send + Sync {
    /// Load the video and wait until its metadata is available
    async fn load(&self, video: &MediaBlob) -> CoreResult<Box<dyn DecodeContext>>;
}

/// A loaded, seekable video
#[async_trait]
pub trait DecodeContext: Send {
    fn metadata(&self) -> VideoMetadata;

    /// Seek to `position_sec` and return the frame displayed there
    async fn seek_and_capture(&mut self, position_sec: TimeSec) -> CoreResult<RgbImage>;
}

// =============================================================================
// Scoped Source
// =============================================================================

/// Temporary on-disk copy of a media blob, removed on drop
#[derive(Debug)]
pub struct ScopedSource {
    path: PathBuf,
}

impl ScopedSource {
    /// Write the blob into `dir` under a unique name
    pub async fn create(dir: &Path, blob: &MediaBlob) -> CoreResult<Self> {
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(format!(
            "genstudio-source-{}.{}",
            new_request_id(),
            blob.extension()
        ));
        tokio::fs::write(&path, blob.bytes()).await?;
        debug!("Created scoped source {}", path.display());
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScopedSource {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("Released scoped source {}", self.path.display()),
            Err(e) => warn!(
                "Failed to release scoped source {}: {}",
                self.path.display(),
                e
            ),
        }
    }
}

// =============================================================================
// FFmpeg Decoder
// =============================================================================

/// Decoder backed by the system FFmpeg installation
#[derive(Debug, Clone)]
pub struct FFmpegDecoder {
    runner: FFmpegRunner,
    scratch_dir: PathBuf,
}

impl FFmpegDecoder {
    pub fn new(runner: FFmpegRunner) -> Self {
        Self {
            runner,
            scratch_dir: std::env::temp_dir(),
        }
    }

    /// Directory that receives the temporary source copies
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = dir.into();
        self
    }
}

/// Missing binaries are an environment problem; everything else means the
/// video could not be decoded.
fn map_decode_error(error: FFmpegError) -> CoreError {
    match error {
        FFmpegError::NotFound | FFmpegError::ProcessError(_) => CoreError::FFmpeg(error),
        other => CoreError::DecodeError(other.to_string()),
    }
}

#[async_trait]
impl VideoDecoder for FFmpegDecoder {
    async fn load(&self, video: &MediaBlob) -> CoreResult<Box<dyn DecodeContext>> {
        if video.is_empty() {
            return Err(CoreError::DecodeError("Video file is empty".to_string()));
        }

        let source = ScopedSource::create(&self.scratch_dir, video).await?;
        let info = self
            .runner
            .probe(source.path())
            .await
            .map_err(map_decode_error)?;

        let stream = info.video.ok_or_else(|| {
            CoreError::DecodeError(format!("No video stream found ({})", info.format))
        })?;

        // FFmpeg applies the display rotation, so frames arrive at the
        // displayed size rather than the coded one
        let (width, height) = stream.display_size();
        debug!(
            "Loaded video: {}x{} (rotation {}) {} {:.3}s",
            width, height, stream.rotation, stream.codec, info.duration_sec
        );

        Ok(Box::new(FFmpegDecodeContext {
            source,
            runner: self.runner.clone(),
            metadata: VideoMetadata {
                duration_sec: info.duration_sec,
                width,
                height,
            },
        }))
    }
}

struct FFmpegDecodeContext {
    source: ScopedSource,
    runner: FFmpegRunner,
    metadata: VideoMetadata,
}

impl FFmpegDecodeContext {
    /// Bytes in one packed RGB24 frame
    fn frame_len(&self) -> usize {
        self.metadata.width as usize * self.metadata.height as usize * 3
    }
}

#[async_trait]
impl DecodeContext for FFmpegDecodeContext {
    fn metadata(&self) -> VideoMetadata {
        self.metadata
    }

    async fn seek_and_capture(&mut self, position_sec: TimeSec) -> CoreResult<RgbImage> {
        let mut pixels = self
            .runner
            .decode_frame_rgb(self.source.path(), position_sec)
            .await
            .map_err(map_decode_error)?;

        // Past the last video frame: show the final frame, as a player would
        if pixels.is_empty() && position_sec > 0.0 {
            debug!(
                "No frame at {:.3}s, using the last decodable frame",
                position_sec
            );
            pixels = self
                .runner
                .decode_last_frame_rgb(self.source.path(), self.frame_len())
                .await
                .map_err(map_decode_error)?;
        }

        if pixels.is_empty() {
            return Err(CoreError::DecodeError(format!(
                "No frame available at {:.3}s",
                position_sec
            )));
        }

        let received = pixels.len();
        let size_error = || {
            CoreError::DecodeError(format!(
                "Decoded frame has {} bytes, expected {}x{} RGB",
                received, self.metadata.width, self.metadata.height
            ))
        };
        if received != self.frame_len() {
            return Err(size_error());
        }
        RgbImage::from_raw(self.metadata.width, self.metadata.height, pixels).ok_or_else(size_error)
    }
}
