//! GenStudio Error Definitions
//!
//! Defines error types used throughout the project.

use thiserror::Error;

use super::ffmpeg::FFmpegError;

/// Core engine error types
#[derive(Error, Debug)]
pub enum CoreError {
    // =========================================================================
    // Input Errors
    // =========================================================================
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Could not decode video: {0}")]
    DecodeError(String),

    // =========================================================================
    // Provider Errors
    // =========================================================================
    #[error("Provider request failed: {0}")]
    UpstreamError(String),

    #[error("Generation job failed: {0}")]
    JobFailed(String),

    #[error("Generation job finished without a downloadable artifact")]
    MissingArtifact,

    #[error("Artifact download failed ({status}): {body}")]
    DownloadError { status: u16, body: String },

    // =========================================================================
    // Startup Errors
    // =========================================================================
    #[error("Configuration error: {0}")]
    ConfigError(String),

    // =========================================================================
    // General Errors
    // =========================================================================
    #[error("Operation cancelled")]
    Cancelled,

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("FFmpeg error: {0}")]
    FFmpeg(#[from] FFmpegError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Core engine result type
pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    /// Whether the error must abort the process instead of being shown to the user
    pub fn is_fatal(&self) -> bool {
        matches!(self, CoreError::ConfigError(_))
    }

    /// Convert to a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            CoreError::DecodeError(_) => {
                format!("{}. Try again with a different video file.", self)
            }
            _ => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_config_errors_are_fatal() {
        assert!(CoreError::ConfigError("missing key".to_string()).is_fatal());
        assert!(!CoreError::ValidationError("x".to_string()).is_fatal());
        assert!(!CoreError::DecodeError("x".to_string()).is_fatal());
        assert!(!CoreError::MissingArtifact.is_fatal());
        assert!(!CoreError::Cancelled.is_fatal());
    }

    #[test]
    fn test_download_error_display_carries_status_and_body() {
        let err = CoreError::DownloadError {
            status: 403,
            body: "forbidden".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("403"));
        assert!(msg.contains("forbidden"));
    }

    #[test]
    fn test_decode_error_user_message_suggests_retry() {
        let err = CoreError::DecodeError("no video stream".to_string());
        assert!(err.user_message().contains("different video file"));
    }
}
