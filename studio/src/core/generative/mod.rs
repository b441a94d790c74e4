//! Generative AI Integration
//!
//! Image generation, editing and analysis, frame-based video analysis and
//! long-running video generation behind a single gateway.

pub mod gateway;
pub mod image;
pub mod provider_impls;
pub mod providers;
pub mod video;

// Re-export main types
pub use gateway::{ApiGateway, VideoGenerationJob};
pub use image::{AspectRatio, DEFAULT_IMAGE_ANALYSIS_PROMPT};
pub use provider_impls::GeminiProvider;
pub use providers::{GenerativeProvider, ProviderCapability};
pub use video::{
    ReferenceImage, ReferencePurpose, VideoGenerationParams, VideoJobHandle,
    DEFAULT_VIDEO_ANALYSIS_PROMPT,
};
