//! Image Generation
//!
//! Parameters for image generation, editing and analysis.

use serde::{Deserialize, Serialize};

use crate::core::media::MediaBlob;
use crate::core::{CoreError, CoreResult};

/// Prompt used when an image is analyzed without one
pub const DEFAULT_IMAGE_ANALYSIS_PROMPT: &str = "Describe this image in detail.";

/// Maximum prompt length accepted by the gateway
pub const MAX_PROMPT_CHARS: usize = 4096;

/// Output aspect ratio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum AspectRatio {
    #[default]
    #[serde(rename = "1:1")]
    Square,
    #[serde(rename = "3:4")]
    Portrait3x4,
    #[serde(rename = "4:3")]
    Landscape4x3,
    #[serde(rename = "9:16")]
    Portrait9x16,
    #[serde(rename = "16:9")]
    Landscape16x9,
}

impl AspectRatio {
    /// Returns all supported ratios
    pub fn all() -> [AspectRatio; 5] {
        [
            AspectRatio::Square,
            AspectRatio::Portrait3x4,
            AspectRatio::Landscape4x3,
            AspectRatio::Portrait9x16,
            AspectRatio::Landscape16x9,
        ]
    }

    /// Wire representation (e.g., "16:9")
    pub fn as_str(&self) -> &'static str {
        match self {
            AspectRatio::Square => "1:1",
            AspectRatio::Portrait3x4 => "3:4",
            AspectRatio::Landscape4x3 => "4:3",
            AspectRatio::Portrait9x16 => "9:16",
            AspectRatio::Landscape16x9 => "16:9",
        }
    }

    /// Whether the video model accepts this ratio
    pub fn supports_video(&self) -> bool {
        matches!(self, AspectRatio::Landscape16x9 | AspectRatio::Portrait9x16)
    }
}

impl std::fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AspectRatio {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AspectRatio::all()
            .into_iter()
            .find(|ratio| ratio.as_str() == s.trim())
            .ok_or_else(|| {
                CoreError::ValidationError(format!(
                    "Invalid aspect ratio '{}'. Valid: 1:1, 3:4, 4:3, 9:16, 16:9",
                    s
                ))
            })
    }
}

/// Trim and check a prompt that must be present
pub fn require_prompt(prompt: &str) -> CoreResult<&str> {
    let trimmed = prompt.trim();
    if trimmed.is_empty() {
        return Err(CoreError::ValidationError(
            "Prompt cannot be empty".to_string(),
        ));
    }
    if trimmed.chars().count() > MAX_PROMPT_CHARS {
        return Err(CoreError::ValidationError(format!(
            "Prompt too long (max {} characters)",
            MAX_PROMPT_CHARS
        )));
    }
    Ok(trimmed)
}

/// Check that a blob is a non-empty image
pub fn require_image(image: &MediaBlob, what: &str) -> CoreResult<()> {
    if image.is_empty() {
        return Err(CoreError::ValidationError(format!("{} is empty", what)));
    }
    if !image.is_image() {
        return Err(CoreError::ValidationError(format!(
            "{} must be an image, got {}",
            what,
            image.mime_type()
        )));
    }
    Ok(())
}
