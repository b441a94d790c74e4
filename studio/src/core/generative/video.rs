//! Video Generation and Analysis Types
//!
//! Data models for reference-guided video generation and frame-based video
//! analysis.

use serde::{Deserialize, Serialize};

use super::image::{require_image, require_prompt, AspectRatio};
use crate::core::jobs::JobState;
use crate::core::media::MediaBlob;
use crate::core::{CoreError, CoreResult};

/// Prompt used when a video is analyzed without one
pub const DEFAULT_VIDEO_ANALYSIS_PROMPT: &str =
    "Describe what happens in this video, frame by frame.";

/// Maximum number of reference images per generation request
pub const MAX_REFERENCE_IMAGES: usize = 3;

// =============================================================================
// Reference Images
// =============================================================================

/// What a reference image is used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReferencePurpose {
    /// An object, scene or style to include
    #[default]
    Asset,
    /// A character whose appearance must be kept
    Character,
}

impl ReferencePurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferencePurpose::Asset => "asset",
            ReferencePurpose::Character => "character",
        }
    }
}

impl std::fmt::Display for ReferencePurpose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ReferencePurpose {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asset" => Ok(ReferencePurpose::Asset),
            "character" => Ok(ReferencePurpose::Character),
            other => Err(CoreError::ValidationError(format!(
                "Invalid reference purpose '{}'. Valid: asset, character",
                other
            ))),
        }
    }
}

/// Image guiding a video generation
#[derive(Debug, Clone)]
pub struct ReferenceImage {
    pub image: MediaBlob,
    pub purpose: ReferencePurpose,
}

impl ReferenceImage {
    pub fn new(image: MediaBlob, purpose: ReferencePurpose) -> Self {
        Self { image, purpose }
    }
}

// =============================================================================
// Generation Parameters
// =============================================================================

/// Parameters for video generation
#[derive(Debug, Clone)]
pub struct VideoGenerationParams {
    /// Text prompt describing the desired video
    pub prompt: String,
    /// Output aspect ratio
    pub aspect_ratio: AspectRatio,
    /// Optional reference images
    pub reference_images: Vec<ReferenceImage>,
}

impl VideoGenerationParams {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            aspect_ratio: AspectRatio::Landscape16x9,
            reference_images: Vec::new(),
        }
    }

    pub fn with_aspect_ratio(mut self, ratio: AspectRatio) -> Self {
        self.aspect_ratio = ratio;
        self
    }

    pub fn with_reference_image(mut self, image: MediaBlob, purpose: ReferencePurpose) -> Self {
        self.reference_images.push(ReferenceImage::new(image, purpose));
        self
    }

    /// Validate parameters
    pub fn validate(&self) -> CoreResult<()> {
        require_prompt(&self.prompt)?;

        if !self.aspect_ratio.supports_video() {
            return Err(CoreError::ValidationError(format!(
                "Video generation supports 16:9 or 9:16, got {}",
                self.aspect_ratio
            )));
        }

        if self.reference_images.len() > MAX_REFERENCE_IMAGES {
            return Err(CoreError::ValidationError(format!(
                "Too many reference images: {} (max {})",
                self.reference_images.len(),
                MAX_REFERENCE_IMAGES
            )));
        }
        for reference in &self.reference_images {
            require_image(&reference.image, "Reference image")?;
        }

        Ok(())
    }
}

// =============================================================================
// Job Handle
// =============================================================================

/// Handle for a submitted video generation operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoJobHandle {
    /// Provider identifier (e.g., "gemini")
    pub provider: String,
    /// Provider-assigned operation name
    pub operation: String,
    /// Whether the provider reports the operation finished
    pub done: bool,
    /// Provider error message for a failed operation
    pub error: Option<String>,
    /// Download URI of the generated video
    pub video_uri: Option<String>,
    /// Unix timestamp when submitted
    pub submitted_at: i64,
}

impl JobState for VideoJobHandle {
    fn is_done(&self) -> bool {
        self.done
    }

    fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    fn artifact_locator(&self) -> Option<&str> {
        self.video_uri.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png() -> MediaBlob {
        MediaBlob::new(vec![0x89u8, b'P', b'N', b'G'], "image/png")
    }

    #[test]
    fn test_purpose_parsing() {
        assert_eq!(
            "Character".parse::<ReferencePurpose>().unwrap(),
            ReferencePurpose::Character
        );
        assert_eq!(
            "asset".parse::<ReferencePurpose>().unwrap(),
            ReferencePurpose::Asset
        );
        assert!("style".parse::<ReferencePurpose>().is_err());
        assert_eq!(
            serde_json::to_string(&ReferencePurpose::Character).unwrap(),
            "\"character\""
        );
    }

    #[test]
    fn test_params_defaults() {
        let params = VideoGenerationParams::new("A sunset timelapse");
        assert_eq!(params.aspect_ratio, AspectRatio::Landscape16x9);
        assert!(params.reference_images.is_empty());
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_params_validate_empty_prompt() {
        let params = VideoGenerationParams::new("   ");
        assert!(matches!(
            params.validate(),
            Err(CoreError::ValidationError(_))
        ));
    }

    #[test]
    fn test_params_validate_ratio() {
        let params =
            VideoGenerationParams::new("Ocean waves").with_aspect_ratio(AspectRatio::Square);
        assert!(params.validate().unwrap_err().to_string().contains("16:9"));
    }

    #[test]
    fn test_params_validate_reference_limits() {
        let mut params = VideoGenerationParams::new("Test");
        for _ in 0..=MAX_REFERENCE_IMAGES {
            params = params.with_reference_image(png(), ReferencePurpose::Asset);
        }
        assert!(params
            .validate()
            .unwrap_err()
            .to_string()
            .contains("Too many reference images"));
    }

    #[test]
    fn test_params_validate_reference_must_be_image() {
        let params = VideoGenerationParams::new("Test").with_reference_image(
            MediaBlob::new(vec![0u8], "video/mp4"),
            ReferencePurpose::Character,
        );
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_job_handle_state() {
        let handle = VideoJobHandle {
            provider: "gemini".to_string(),
            operation: "models/veo/operations/abc".to_string(),
            done: true,
            error: None,
            video_uri: Some("https://example.com/v.mp4".to_string()),
            submitted_at: 1_700_000_000,
        };
        assert!(handle.is_done());
        assert_eq!(handle.artifact_locator(), Some("https://example.com/v.mp4"));

        let json = serde_json::to_string(&handle).unwrap();
        assert!(json.contains("\"videoUri\""));
        let back: VideoJobHandle = serde_json::from_str(&json).unwrap();
        assert_eq!(back, handle);
    }
}
