//! API Gateway
//!
//! Thin facade over a [`GenerativeProvider`]. Validates user input before any
//! provider call and fills in default analysis prompts. Video generation is
//! exposed as a [`LongRunningJob`] so the caller decides how it is driven.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::image::{require_image, require_prompt, AspectRatio, DEFAULT_IMAGE_ANALYSIS_PROMPT};
use super::providers::GenerativeProvider;
use super::video::{VideoGenerationParams, VideoJobHandle, DEFAULT_VIDEO_ANALYSIS_PROMPT};
use crate::core::jobs::{AsyncJobPoller, JobOutcome, LongRunningJob};
use crate::core::media::{FrameSequence, MediaBlob};
use crate::core::progress::ProgressSink;
use crate::core::{CoreError, CoreResult};

/// Entry point for every generation and analysis request
#[derive(Clone)]
pub struct ApiGateway {
    provider: Arc<dyn GenerativeProvider>,
}

impl std::fmt::Debug for ApiGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiGateway")
            .field("provider", &self.provider.name())
            .finish()
    }
}

impl ApiGateway {
    pub fn new(provider: Arc<dyn GenerativeProvider>) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &Arc<dyn GenerativeProvider> {
        &self.provider
    }

    /// Text-to-image
    pub async fn generate_image(
        &self,
        prompt: &str,
        aspect_ratio: AspectRatio,
    ) -> CoreResult<MediaBlob> {
        let prompt = require_prompt(prompt)?;
        info!("Generating image ({})", aspect_ratio);
        self.provider.generate_image(prompt, aspect_ratio).await
    }

    /// Prompt-guided edit of an existing image
    pub async fn edit_image(&self, prompt: &str, image: &MediaBlob) -> CoreResult<MediaBlob> {
        let prompt = require_prompt(prompt)?;
        require_image(image, "Source image")?;
        info!("Editing image ({} bytes)", image.len());
        self.provider.edit_image(prompt, image).await
    }

    /// Describe or answer a question about an image
    pub async fn analyze_image(&self, prompt: Option<&str>, image: &MediaBlob) -> CoreResult<String> {
        require_image(image, "Image")?;
        let prompt = analysis_prompt(prompt, DEFAULT_IMAGE_ANALYSIS_PROMPT)?;
        self.provider.analyze_image(prompt, image).await
    }

    /// Describe or answer a question about a sampled video
    ///
    /// The frame sequence is consumed by the request.
    pub async fn analyze_video(
        &self,
        prompt: Option<&str>,
        frames: FrameSequence,
        context_image: Option<&MediaBlob>,
    ) -> CoreResult<String> {
        if frames.is_empty() {
            return Err(CoreError::ValidationError(
                "Video analysis needs at least one frame".to_string(),
            ));
        }
        if let Some(context) = context_image {
            require_image(context, "Context image")?;
        }
        let prompt = analysis_prompt(prompt, DEFAULT_VIDEO_ANALYSIS_PROMPT)?;

        let blobs = frames.into_blobs();
        info!(
            "Analyzing video from {} frames (context image: {})",
            blobs.len(),
            context_image.is_some()
        );
        self.provider
            .analyze_video(prompt, &blobs, context_image)
            .await
    }

    /// Bind a validated video request to the provider
    ///
    /// Nothing is sent until the returned job is submitted.
    pub fn generate_video(&self, params: VideoGenerationParams) -> CoreResult<VideoGenerationJob> {
        params.validate()?;
        Ok(VideoGenerationJob {
            provider: Arc::clone(&self.provider),
            params,
        })
    }

    /// Generate a video and wait for its download
    pub async fn render_video(
        &self,
        params: VideoGenerationParams,
        poller: &AsyncJobPoller,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> CoreResult<JobOutcome> {
        let job = self.generate_video(params)?;
        poller.run(&job, progress, cancel).await
    }
}

fn analysis_prompt<'a>(prompt: Option<&'a str>, default: &'static str) -> CoreResult<&'a str> {
    match prompt.map(str::trim).filter(|p| !p.is_empty()) {
        Some(p) => require_prompt(p),
        None => Ok(default),
    }
}

/// A video generation request bound to its provider
pub struct VideoGenerationJob {
    provider: Arc<dyn GenerativeProvider>,
    params: VideoGenerationParams,
}

impl VideoGenerationJob {
    pub fn params(&self) -> &VideoGenerationParams {
        &self.params
    }
}

impl std::fmt::Debug for VideoGenerationJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoGenerationJob")
            .field("provider", &self.provider.name())
            .field("aspect_ratio", &self.params.aspect_ratio)
            .field("references", &self.params.reference_images.len())
            .finish()
    }
}

#[async_trait]
impl LongRunningJob for VideoGenerationJob {
    type Handle = VideoJobHandle;

    async fn submit(&self) -> CoreResult<VideoJobHandle> {
        let handle = self.provider.submit_video(&self.params).await?;
        info!("Video job submitted: {}", handle.operation);
        Ok(handle)
    }

    async fn query(&self, handle: &VideoJobHandle) -> CoreResult<VideoJobHandle> {
        let latest = self.provider.poll_video(handle).await?;
        debug!("Video job {} done={}", latest.operation, latest.done);
        Ok(latest)
    }

    async fn fetch_artifact(&self, locator: &str) -> CoreResult<MediaBlob> {
        self.provider.download_video(locator).await
    }
}
