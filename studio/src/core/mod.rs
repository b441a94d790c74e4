//! GenStudio Core
//!
//! Frame sampling, long-running job polling, the provider gateway and the
//! settings and credentials they are configured with.

pub mod credentials;
pub mod ffmpeg;
pub mod generative;
pub mod jobs;
pub mod media;
pub mod progress;
pub mod sampler;
pub mod settings;

// Re-export common types
mod types;
pub use types::*;

mod error;
pub use error::*;
