//! Generative AI Providers
//!
//! Provider abstraction for remote generation and analysis services.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::image::AspectRatio;
use super::video::{VideoGenerationParams, VideoJobHandle};
use crate::core::media::MediaBlob;
use crate::core::{CoreError, CoreResult};

/// Capabilities supported by a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderCapability {
    /// Text-to-image
    ImageGeneration,
    /// Prompt-guided image edits
    ImageEditing,
    /// Image description and question answering
    ImageAnalysis,
    /// Analysis of sampled video frames
    VideoAnalysis,
    /// Long-running video generation
    VideoGeneration,
}

impl std::fmt::Display for ProviderCapability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderCapability::ImageGeneration => write!(f, "Image Generation"),
            ProviderCapability::ImageEditing => write!(f, "Image Editing"),
            ProviderCapability::ImageAnalysis => write!(f, "Image Analysis"),
            ProviderCapability::VideoAnalysis => write!(f, "Video Analysis"),
            ProviderCapability::VideoGeneration => write!(f, "Video Generation"),
        }
    }
}

/// Trait for generative AI providers
///
/// Inputs reaching a provider have already been validated by the gateway.
#[async_trait]
pub trait GenerativeProvider: Send + Sync {
    /// Returns the provider name
    fn name(&self) -> &str;

    /// Returns supported capabilities
    fn capabilities(&self) -> Vec<ProviderCapability>;

    /// Checks if provider supports a capability
    fn supports(&self, capability: ProviderCapability) -> bool {
        self.capabilities().contains(&capability)
    }

    /// Generates an image from a prompt
    async fn generate_image(
        &self,
        _prompt: &str,
        _aspect_ratio: AspectRatio,
    ) -> CoreResult<MediaBlob> {
        Err(CoreError::NotSupported(format!(
            "{} does not support image generation",
            self.name()
        )))
    }

    /// Edits an image according to a prompt
    async fn edit_image(&self, _prompt: &str, _image: &MediaBlob) -> CoreResult<MediaBlob> {
        Err(CoreError::NotSupported(format!(
            "{} does not support image editing",
            self.name()
        )))
    }

    /// Answers a prompt about an image
    async fn analyze_image(&self, _prompt: &str, _image: &MediaBlob) -> CoreResult<String> {
        Err(CoreError::NotSupported(format!(
            "{} does not support image analysis",
            self.name()
        )))
    }

    /// Answers a prompt about an ordered set of video frames
    async fn analyze_video(
        &self,
        _prompt: &str,
        _frames: &[MediaBlob],
        _context_image: Option<&MediaBlob>,
    ) -> CoreResult<String> {
        Err(CoreError::NotSupported(format!(
            "{} does not support video analysis",
            self.name()
        )))
    }

    /// Submits a video generation job
    async fn submit_video(&self, _params: &VideoGenerationParams) -> CoreResult<VideoJobHandle> {
        Err(CoreError::NotSupported(format!(
            "{} does not support video generation",
            self.name()
        )))
    }

    /// Returns the current state of a submitted job
    async fn poll_video(&self, _handle: &VideoJobHandle) -> CoreResult<VideoJobHandle> {
        Err(CoreError::NotSupported(format!(
            "{} does not support video generation",
            self.name()
        )))
    }

    /// Downloads a finished video
    async fn download_video(&self, _uri: &str) -> CoreResult<MediaBlob> {
        Err(CoreError::NotSupported(format!(
            "{} does not support video generation",
            self.name()
        )))
    }
}
