//! Generative Provider Implementations
//!
//! Concrete provider adapters for different AI generation services.

pub mod gemini;

pub use gemini::GeminiProvider;
