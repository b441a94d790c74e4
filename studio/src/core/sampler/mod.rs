//! Frame Sampler
//!
//! Converts a video into a bounded, ordered sequence of JPEG stills taken at
//! fixed timeline increments, ready to embed in a video analysis request.
//!
//! Sampling starts at position 0 and advances by the policy interval until
//! the position reaches the duration or the frame cap is hit, whichever
//! comes first. A video shorter than one interval yields exactly one frame.

mod decoder;

pub use decoder::{DecodeContext, FFmpegDecoder, ScopedSource, VideoDecoder, VideoMetadata};

use std::sync::Arc;

use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::core::media::{FrameSequence, MediaBlob, FRAME_MIME_TYPE};
use crate::core::progress::ProgressSink;
use crate::core::{CoreError, CoreResult, TimeSec};

/// JPEG quality factor for captured frames (0.8)
pub const JPEG_QUALITY: u8 = 80;

/// Default seconds between captured frames
pub const DEFAULT_INTERVAL_SECONDS: f64 = 1.0;

/// Default frame cap
pub const DEFAULT_MAX_FRAMES: usize = 16;

// =============================================================================
// Sampling Policy
// =============================================================================

/// How often to sample and how many frames to keep
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SamplingPolicy {
    interval_seconds: f64,
    max_frames: usize,
}

impl Default for SamplingPolicy {
    fn default() -> Self {
        Self {
            interval_seconds: DEFAULT_INTERVAL_SECONDS,
            max_frames: DEFAULT_MAX_FRAMES,
        }
    }
}

impl SamplingPolicy {
    pub fn new(interval_seconds: f64, max_frames: usize) -> CoreResult<Self> {
        if !interval_seconds.is_finite() || interval_seconds <= 0.0 {
            return Err(CoreError::ValidationError(format!(
                "Sampling interval must be a positive number of seconds, got {}",
                interval_seconds
            )));
        }
        if max_frames == 0 {
            return Err(CoreError::ValidationError(
                "Maximum frame count must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            interval_seconds,
            max_frames,
        })
    }

    pub fn interval_seconds(&self) -> f64 {
        self.interval_seconds
    }

    pub fn max_frames(&self) -> usize {
        self.max_frames
    }

    /// Number of frames captured from a video of `duration_sec`:
    /// `min(max_frames, ceil(duration / interval))`
    pub fn frame_count(&self, duration_sec: TimeSec) -> usize {
        if !duration_sec.is_finite() || duration_sec <= 0.0 {
            return 0;
        }
        let steps = (duration_sec / self.interval_seconds).ceil();
        (steps as usize).min(self.max_frames)
    }

    /// Timeline positions that will be captured, in order
    pub fn planned_positions(&self, duration_sec: TimeSec) -> impl Iterator<Item = TimeSec> {
        let interval = self.interval_seconds;
        (0..self.frame_count(duration_sec)).map(move |k| k as f64 * interval)
    }

    /// Denominator shown in progress messages: `min(max_frames, floor(duration))`
    pub fn expected_frames(&self, duration_sec: TimeSec) -> usize {
        if !duration_sec.is_finite() || duration_sec <= 0.0 {
            return 0;
        }
        (duration_sec.floor() as usize).min(self.max_frames)
    }
}

// =============================================================================
// Frame Sampler
// =============================================================================

/// Samples still frames out of a video
#[derive(Clone)]
pub struct FrameSampler {
    decoder: Arc<dyn VideoDecoder>,
}

impl std::fmt::Debug for FrameSampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameSampler").finish_non_exhaustive()
    }
}

impl FrameSampler {
    pub fn new(decoder: Arc<dyn VideoDecoder>) -> Self {
        Self { decoder }
    }

    /// Sample `video` according to `policy`
    ///
    /// Fails with [`CoreError::DecodeError`] when the video cannot be decoded,
    /// has zero duration or no pixel dimensions; never returns an empty
    /// sequence. The decode context is released on every path.
    pub async fn sample(
        &self,
        video: &MediaBlob,
        policy: &SamplingPolicy,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> CoreResult<FrameSequence> {
        if cancel.is_cancelled() {
            return Err(CoreError::Cancelled);
        }

        let mut context = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(CoreError::Cancelled),
            loaded = self.decoder.load(video) => loaded?,
        };

        let result = capture_frames(context.as_mut(), policy, progress, cancel).await;
        drop(context);

        if let Ok(frames) = &result {
            info!(
                "Sampled {} frame(s) every {}s (cap {})",
                frames.len(),
                policy.interval_seconds(),
                policy.max_frames()
            );
        }
        result
    }
}

async fn capture_frames(
    context: &mut dyn DecodeContext,
    policy: &SamplingPolicy,
    progress: &dyn ProgressSink,
    cancel: &CancellationToken,
) -> CoreResult<FrameSequence> {
    let metadata = context.metadata();
    validate_metadata(&metadata)?;

    let expected = policy.expected_frames(metadata.duration_sec);
    let mut frames = FrameSequence::with_capacity(policy.max_frames());
    let mut surface = RgbImage::new(metadata.width, metadata.height);

    for position in policy.planned_positions(metadata.duration_sec) {
        let frame = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(CoreError::Cancelled),
            captured = context.seek_and_capture(position) => captured?,
        };

        if frame.dimensions() != surface.dimensions() {
            return Err(CoreError::DecodeError(format!(
                "Frame at {:.3}s is {}x{}, expected {}x{}",
                position,
                frame.width(),
                frame.height(),
                metadata.width,
                metadata.height
            )));
        }
        surface.copy_from_slice(frame.as_raw());

        let jpeg = encode_jpeg(&surface)?;
        debug!("Captured frame at {:.3}s ({} bytes)", position, jpeg.len());
        frames.push(position, jpeg)?;

        progress.report(&format!(
            "Extracting frames... {}/{}",
            frames.len(),
            expected
        ));
    }

    Ok(frames)
}

fn validate_metadata(metadata: &VideoMetadata) -> CoreResult<()> {
    if !metadata.duration_sec.is_finite() || metadata.duration_sec <= 0.0 {
        return Err(CoreError::DecodeError(format!(
            "Video has no readable duration ({})",
            metadata.duration_sec
        )));
    }
    if metadata.width == 0 || metadata.height == 0 {
        return Err(CoreError::DecodeError(format!(
            "Video has no pixel dimensions ({}x{})",
            metadata.width, metadata.height
        )));
    }
    Ok(())
}

fn encode_jpeg(surface: &RgbImage) -> CoreResult<MediaBlob> {
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, JPEG_QUALITY)
        .encode_image(surface)
        .map_err(|e| CoreError::Internal(format!("JPEG encoding failed: {}", e)))?;
    Ok(MediaBlob::new(bytes, FRAME_MIME_TYPE))
}
