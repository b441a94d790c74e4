//! Media Buffers
//!
//! Immutable media payloads exchanged between the sampler, the gateway and
//! the provider. Bytes are shared, never mutated after creation.

use std::path::Path;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};

use crate::core::{CoreError, CoreResult, TimeSec};

/// MIME type of every captured frame
pub const FRAME_MIME_TYPE: &str = "image/jpeg";

// =============================================================================
// MediaBlob
// =============================================================================

/// Opaque byte buffer tagged with a MIME type
#[derive(Clone, PartialEq, Eq)]
pub struct MediaBlob {
    bytes: Arc<[u8]>,
    mime_type: String,
}

impl std::fmt::Debug for MediaBlob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaBlob")
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl MediaBlob {
    /// Create a blob from raw bytes
    pub fn new(bytes: impl Into<Arc<[u8]>>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            mime_type: mime_type.into(),
        }
    }

    /// Decode a blob from standard base64 text
    pub fn from_base64(data: &str, mime_type: impl Into<String>) -> CoreResult<Self> {
        let bytes = BASE64
            .decode(data.trim().as_bytes())
            .map_err(|e| CoreError::UpstreamError(format!("Invalid base64 payload: {}", e)))?;
        Ok(Self::new(bytes, mime_type))
    }

    /// Parse a `data:<mime>;base64,<payload>` URI
    pub fn from_data_uri(uri: &str) -> CoreResult<Self> {
        let rest = uri
            .strip_prefix("data:")
            .ok_or_else(|| CoreError::ValidationError("Not a data URI".to_string()))?;
        let (header, payload) = rest.split_once(',').ok_or_else(|| {
            CoreError::ValidationError("Data URI is missing its payload".to_string())
        })?;
        let mime_type = header.strip_suffix(";base64").ok_or_else(|| {
            CoreError::ValidationError("Only base64 data URIs are supported".to_string())
        })?;

        let bytes = BASE64
            .decode(payload.as_bytes())
            .map_err(|e| CoreError::ValidationError(format!("Invalid data URI payload: {}", e)))?;
        Ok(Self::new(bytes, mime_type))
    }

    /// Read a file, inferring the MIME type from its extension
    pub async fn from_path(path: &Path) -> CoreResult<Self> {
        let mime_type = mime_type_for_path(path).ok_or_else(|| {
            CoreError::ValidationError(format!(
                "Unsupported media file type: {}",
                path.display()
            ))
        })?;
        let bytes = tokio::fs::read(path).await?;
        Ok(Self::new(bytes, mime_type))
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }

    pub fn is_video(&self) -> bool {
        self.mime_type.starts_with("video/")
    }

    /// Standard base64 encoding of the bytes
    pub fn to_base64(&self) -> String {
        BASE64.encode(&self.bytes)
    }

    /// Encode as a `data:` URI
    pub fn to_data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.to_base64())
    }

    /// File extension matching the MIME type
    pub fn extension(&self) -> &'static str {
        extension_for_mime(&self.mime_type)
    }

    /// Write the bytes to disk, creating the parent directory if needed
    pub async fn write_to(&self, path: &Path) -> CoreResult<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(path, &self.bytes).await?;
        Ok(())
    }
}

/// Infer a MIME type from a file extension
pub fn mime_type_for_path(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    let mime = match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "mp4" | "m4v" => "video/mp4",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        "avi" => "video/x-msvideo",
        _ => return None,
    };
    Some(mime)
}

fn extension_for_mime(mime: &str) -> &'static str {
    match mime {
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/webp" => "webp",
        "image/gif" => "gif",
        "video/mp4" => "mp4",
        "video/quicktime" => "mov",
        "video/webm" => "webm",
        "video/x-matroska" => "mkv",
        "video/x-msvideo" => "avi",
        _ => "bin",
    }
}

// =============================================================================
// FrameSequence
// =============================================================================

/// One JPEG still captured from a video
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    /// Capture order, starting at 0
    pub index: usize,
    /// Timeline position the frame was captured at
    pub position_sec: TimeSec,
    /// Encoded frame (`image/jpeg`)
    pub image: MediaBlob,
}

/// Capture summary for logs and JSON output
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameSequenceSummary {
    pub frame_count: usize,
    pub max_frames: usize,
    pub total_bytes: usize,
}

/// Ordered, bounded sequence of captured frames
#[derive(Debug, Clone)]
pub struct FrameSequence {
    frames: Vec<CapturedFrame>,
    max_frames: usize,
}

impl FrameSequence {
    pub fn with_capacity(max_frames: usize) -> Self {
        Self {
            frames: Vec::with_capacity(max_frames),
            max_frames,
        }
    }

    /// Append the next frame in capture order
    pub fn push(&mut self, position_sec: TimeSec, image: MediaBlob) -> CoreResult<()> {
        if self.frames.len() >= self.max_frames {
            return Err(CoreError::Internal(format!(
                "Frame sequence is full ({} frames)",
                self.max_frames
            )));
        }
        if image.mime_type() != FRAME_MIME_TYPE {
            return Err(CoreError::Internal(format!(
                "Captured frames must be {}, got {}",
                FRAME_MIME_TYPE,
                image.mime_type()
            )));
        }
        if let Some(last) = self.frames.last() {
            if position_sec <= last.position_sec {
                return Err(CoreError::Internal(format!(
                    "Frame at {:.3}s is not after previous frame at {:.3}s",
                    position_sec, last.position_sec
                )));
            }
        }

        self.frames.push(CapturedFrame {
            index: self.frames.len(),
            position_sec,
            image,
        });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn max_frames(&self) -> usize {
        self.max_frames
    }

    pub fn iter(&self) -> impl Iterator<Item = &CapturedFrame> {
        self.frames.iter()
    }

    /// Capture positions in order
    pub fn positions(&self) -> Vec<TimeSec> {
        self.frames.iter().map(|f| f.position_sec).collect()
    }

    pub fn into_blobs(self) -> Vec<MediaBlob> {
        self.frames.into_iter().map(|f| f.image).collect()
    }

    pub fn summary(&self) -> FrameSequenceSummary {
        FrameSequenceSummary {
            frame_count: self.frames.len(),
            max_frames: self.max_frames,
            total_bytes: self.frames.iter().map(|f| f.image.len()).sum(),
        }
    }
}
