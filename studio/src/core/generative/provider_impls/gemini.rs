//! Gemini API Provider
//!
//! REST adapter for the Gemini API (`generativelanguage.googleapis.com`).
//!
//! - Imagen `:predict` for text-to-image
//! - `:generateContent` with inline image data for edits and analysis
//! - Veo `:predictLongRunning` + operation GET for video generation
//! - Authenticated GET for the generated video file
//!
//! Requests are sent once. Transport and provider failures surface as
//! `UpstreamError` carrying the provider message.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::core::credentials::ApiKey;
use crate::core::generative::image::AspectRatio;
use crate::core::generative::providers::{GenerativeProvider, ProviderCapability};
use crate::core::generative::video::{VideoGenerationParams, VideoJobHandle};
use crate::core::media::MediaBlob;
use crate::core::settings::ProviderSettings;
use crate::core::{CoreError, CoreResult};

/// Header carrying the API key
const API_KEY_HEADER: &str = "x-goog-api-key";

/// Longest provider error body kept in messages
const MAX_ERROR_BODY_CHARS: usize = 500;

// =============================================================================
// API Request/Response Types
// =============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PredictRequest {
    instances: Vec<PredictInstance>,
    parameters: PredictParameters,
}

#[derive(Debug, Serialize)]
struct PredictInstance {
    prompt: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PredictParameters {
    sample_count: u32,
    aspect_ratio: String,
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    #[serde(default)]
    predictions: Vec<Prediction>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Prediction {
    #[serde(default)]
    bytes_base64_encoded: Option<String>,
    #[serde(default)]
    mime_type: Option<String>,
    #[serde(default)]
    rai_filtered_reason: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

impl Part {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            inline_data: None,
        }
    }

    fn blob(blob: &MediaBlob) -> Self {
        Self {
            text: None,
            inline_data: Some(InlineData {
                mime_type: blob.mime_type().to_string(),
                data: blob.to_base64(),
            }),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_modalities: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Serialize)]
struct VideoRequest {
    instances: Vec<VideoInstance>,
    parameters: VideoParameters,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VideoInstance {
    prompt: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    reference_images: Vec<VideoReference>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VideoReference {
    image: EncodedImage,
    reference_type: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EncodedImage {
    bytes_base64_encoded: String,
    mime_type: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VideoParameters {
    aspect_ratio: String,
}

#[derive(Debug, Deserialize)]
struct OperationResponse {
    name: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<ApiErrorDetail>,
    #[serde(default)]
    response: Option<OperationResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OperationResult {
    #[serde(default)]
    generate_video_response: Option<GenerateVideoResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateVideoResponse {
    #[serde(default)]
    generated_samples: Vec<GeneratedSample>,
    #[serde(default)]
    rai_media_filtered_reasons: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct GeneratedSample {
    #[serde(default)]
    video: Option<GeneratedVideo>,
}

#[derive(Debug, Deserialize)]
struct GeneratedVideo {
    #[serde(default)]
    uri: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    #[serde(default)]
    error: Option<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

// =============================================================================
// GeminiProvider
// =============================================================================

/// Model IDs used per operation
#[derive(Debug, Clone, PartialEq, Eq)]
struct GeminiModels {
    image: String,
    edit: String,
    analysis: String,
    video: String,
}

/// Gemini API provider
pub struct GeminiProvider {
    /// HTTP client with configured timeout, shared by every call
    client: reqwest::Client,
    api_key: ApiKey,
    base_url: String,
    models: GeminiModels,
    max_download_bytes: u64,
}

impl std::fmt::Debug for GeminiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiProvider")
            .field("base_url", &self.base_url)
            .field("models", &self.models)
            .finish_non_exhaustive()
    }
}

impl GeminiProvider {
    /// Create a provider with default endpoint and models
    pub fn new(api_key: ApiKey) -> CoreResult<Self> {
        Self::from_settings(api_key, &ProviderSettings::default())
    }

    /// Create a provider from settings
    pub fn from_settings(api_key: ApiKey, settings: &ProviderSettings) -> CoreResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(settings.request_timeout_secs))
            .build()
            .map_err(|e| CoreError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            "Gemini provider ready: base_url={}, key={}",
            settings.base_url,
            api_key.redacted()
        );

        Ok(Self {
            client,
            api_key,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            models: GeminiModels {
                image: settings.image_model.clone(),
                edit: settings.edit_model.clone(),
                analysis: settings.analysis_model.clone(),
                video: settings.video_model.clone(),
            },
            max_download_bytes: settings.max_download_bytes,
        })
    }

    /// Set custom base URL
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the download size cap
    pub fn with_max_download_bytes(mut self, max: u64) -> Self {
        self.max_download_bytes = max;
        self
    }

    /// `{base}/models/{model}:{method}`
    fn model_url(&self, model: &str, method: &str) -> String {
        format!("{}/models/{}:{}", self.base_url, model, method)
    }

    /// `{base}/{operation name}`
    fn operation_url(&self, name: &str) -> String {
        format!("{}/{}", self.base_url, name.trim_start_matches('/'))
    }

    /// POST a JSON body and parse the JSON reply
    async fn post_json<B, R>(&self, operation: &str, url: &str, body: &B) -> CoreResult<R>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        debug!("Gemini {} request: {}", operation, url);
        let resp = self
            .client
            .post(url)
            .header(API_KEY_HEADER, self.api_key.expose())
            .json(body)
            .send()
            .await
            .map_err(|e| {
                CoreError::UpstreamError(format!("Gemini {} request failed: {}", operation, e))
            })?;

        Self::read_json(operation, resp).await
    }

    /// GET a JSON resource
    async fn get_json<R: DeserializeOwned>(&self, operation: &str, url: &str) -> CoreResult<R> {
        debug!("Gemini {} request: {}", operation, url);
        let resp = self
            .client
            .get(url)
            .header(API_KEY_HEADER, self.api_key.expose())
            .send()
            .await
            .map_err(|e| {
                CoreError::UpstreamError(format!("Gemini {} request failed: {}", operation, e))
            })?;

        Self::read_json(operation, resp).await
    }

    async fn read_json<R: DeserializeOwned>(
        operation: &str,
        resp: reqwest::Response,
    ) -> CoreResult<R> {
        let status = resp.status();
        let body = resp.text().await.map_err(|e| {
            CoreError::UpstreamError(format!("Failed to read Gemini {} response: {}", operation, e))
        })?;

        if !status.is_success() {
            return Err(Self::parse_api_error(status, &body));
        }

        serde_json::from_str(&body).map_err(|e| {
            CoreError::UpstreamError(format!(
                "Failed to parse Gemini {} response: {}",
                operation, e
            ))
        })
    }

    /// Parse an error response body
    fn parse_api_error(status: StatusCode, body: &str) -> CoreError {
        if let Ok(err_resp) = serde_json::from_str::<ApiErrorResponse>(body) {
            if let Some(detail) = err_resp.error {
                return CoreError::UpstreamError(format!(
                    "Gemini API error ({}): {} ({})",
                    status,
                    detail.message.unwrap_or_default(),
                    detail.status.unwrap_or_default(),
                ));
            }
        }

        CoreError::UpstreamError(format!(
            "Gemini API error ({}): {}",
            status,
            truncate(body)
        ))
    }

    /// Validate that the download URL is a safe HTTP(S) URL.
    fn validate_download_url(url: &str) -> CoreResult<reqwest::Url> {
        let parsed = reqwest::Url::parse(url).map_err(|e| {
            CoreError::ValidationError(format!("Invalid download URL '{}': {}", url, e))
        })?;

        match parsed.scheme() {
            "http" | "https" => Ok(parsed),
            scheme => Err(CoreError::ValidationError(format!(
                "Unsupported download URL scheme '{}'. Only http/https are allowed.",
                scheme
            ))),
        }
    }

    fn image_request(prompt: &str, aspect_ratio: AspectRatio) -> PredictRequest {
        PredictRequest {
            instances: vec![PredictInstance {
                prompt: prompt.to_string(),
            }],
            parameters: PredictParameters {
                sample_count: 1,
                aspect_ratio: aspect_ratio.as_str().to_string(),
            },
        }
    }

    fn edit_request(prompt: &str, image: &MediaBlob) -> GenerateContentRequest {
        GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part::blob(image), Part::text(prompt)],
            }],
            generation_config: Some(GenerationConfig {
                response_modalities: vec!["TEXT".to_string(), "IMAGE".to_string()],
            }),
        }
    }

    fn analysis_request(
        prompt: &str,
        frames: &[MediaBlob],
        context_image: Option<&MediaBlob>,
    ) -> GenerateContentRequest {
        let mut parts = Vec::with_capacity(frames.len() + 4);
        if let Some(context) = context_image {
            parts.push(Part::text("Reference image:"));
            parts.push(Part::blob(context));
        }
        if frames.len() > 1 {
            parts.push(Part::text("Video frames, in playback order:"));
        }
        parts.extend(frames.iter().map(Part::blob));
        parts.push(Part::text(prompt));

        GenerateContentRequest {
            contents: vec![Content { parts }],
            generation_config: None,
        }
    }

    fn video_request(params: &VideoGenerationParams) -> VideoRequest {
        VideoRequest {
            instances: vec![VideoInstance {
                prompt: params.prompt.trim().to_string(),
                reference_images: params
                    .reference_images
                    .iter()
                    .map(|reference| VideoReference {
                        image: EncodedImage {
                            bytes_base64_encoded: reference.image.to_base64(),
                            mime_type: reference.image.mime_type().to_string(),
                        },
                        reference_type: reference.purpose.as_str().to_string(),
                    })
                    .collect(),
            }],
            parameters: VideoParameters {
                aspect_ratio: params.aspect_ratio.as_str().to_string(),
            },
        }
    }

    fn image_from_predictions(resp: PredictResponse) -> CoreResult<MediaBlob> {
        let mut filtered = None;
        for prediction in resp.predictions {
            if let Some(data) = prediction.bytes_base64_encoded {
                let mime = prediction.mime_type.unwrap_or_else(|| "image/png".to_string());
                return MediaBlob::from_base64(&data, mime);
            }
            if prediction.rai_filtered_reason.is_some() {
                filtered = prediction.rai_filtered_reason;
            }
        }

        Err(CoreError::UpstreamError(match filtered {
            Some(reason) => format!("Image was filtered by the provider: {}", reason),
            None => "Provider returned no image".to_string(),
        }))
    }

    fn image_from_content(resp: GenerateContentResponse) -> CoreResult<MediaBlob> {
        let blocked = Self::block_reason(&resp);
        let mut text = String::new();

        for candidate in resp.candidates {
            for part in candidate.content.unwrap_or_default().parts {
                if let Some(inline) = part.inline_data {
                    return MediaBlob::from_base64(&inline.data, inline.mime_type);
                }
                if let Some(t) = part.text {
                    text.push_str(&t);
                }
            }
        }

        Err(CoreError::UpstreamError(match (blocked, text.trim()) {
            (Some(reason), _) => reason,
            (None, "") => "Provider returned no image".to_string(),
            (None, said) => format!("Provider returned no image: {}", truncate(said)),
        }))
    }

    fn text_from_content(resp: GenerateContentResponse) -> CoreResult<String> {
        let blocked = Self::block_reason(&resp);
        let text: String = resp
            .candidates
            .into_iter()
            .take(1)
            .flat_map(|c| c.content.unwrap_or_default().parts)
            .filter_map(|p| p.text)
            .collect();

        if text.trim().is_empty() {
            return Err(CoreError::UpstreamError(
                blocked.unwrap_or_else(|| "Provider returned an empty response".to_string()),
            ));
        }
        Ok(text)
    }

    fn block_reason(resp: &GenerateContentResponse) -> Option<String> {
        if let Some(reason) = resp
            .prompt_feedback
            .as_ref()
            .and_then(|f| f.block_reason.as_deref())
        {
            return Some(format!("Request was blocked by the provider: {}", reason));
        }
        resp.candidates
            .iter()
            .filter_map(|c| c.finish_reason.as_deref())
            .find(|r| matches!(*r, "SAFETY" | "PROHIBITED_CONTENT" | "IMAGE_SAFETY"))
            .map(|r| format!("Response was blocked by the provider: {}", r))
    }

    fn handle_from_operation(&self, op: OperationResponse, submitted_at: i64) -> VideoJobHandle {
        let mut error = op.error.map(|e| match (e.message, e.code) {
            (Some(message), _) => message,
            (None, Some(code)) => format!("Operation failed with code {}", code),
            (None, None) => "Unknown error".to_string(),
        });

        let generated = op.response.and_then(|r| r.generate_video_response);
        let video_uri = generated.as_ref().and_then(|g| {
            g.generated_samples
                .iter()
                .find_map(|s| s.video.as_ref().and_then(|v| v.uri.clone()))
        });

        if op.done && error.is_none() && video_uri.is_none() {
            if let Some(reasons) = generated
                .map(|g| g.rai_media_filtered_reasons)
                .filter(|r| !r.is_empty())
            {
                error = Some(format!("Video was filtered by the provider: {}", reasons.join("; ")));
            }
        }

        VideoJobHandle {
            provider: self.name().to_string(),
            operation: op.name,
            done: op.done,
            error,
            video_uri,
            submitted_at,
        }
    }
}

fn truncate(body: &str) -> String {
    body.chars().take(MAX_ERROR_BODY_CHARS).collect()
}

#[async_trait]
impl GenerativeProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn capabilities(&self) -> Vec<ProviderCapability> {
        vec![
            ProviderCapability::ImageGeneration,
            ProviderCapability::ImageEditing,
            ProviderCapability::ImageAnalysis,
            ProviderCapability::VideoAnalysis,
            ProviderCapability::VideoGeneration,
        ]
    }

    async fn generate_image(&self, prompt: &str, aspect_ratio: AspectRatio) -> CoreResult<MediaBlob> {
        let url = self.model_url(&self.models.image, "predict");
        let resp: PredictResponse = self
            .post_json("image generation", &url, &Self::image_request(prompt, aspect_ratio))
            .await?;

        let image = Self::image_from_predictions(resp)?;
        info!(
            "Gemini generated image: {} bytes ({})",
            image.len(),
            image.mime_type()
        );
        Ok(image)
    }

    async fn edit_image(&self, prompt: &str, image: &MediaBlob) -> CoreResult<MediaBlob> {
        let url = self.model_url(&self.models.edit, "generateContent");
        let resp: GenerateContentResponse = self
            .post_json("image edit", &url, &Self::edit_request(prompt, image))
            .await?;

        let edited = Self::image_from_content(resp)?;
        info!("Gemini edited image: {} bytes", edited.len());
        Ok(edited)
    }

    async fn analyze_image(&self, prompt: &str, image: &MediaBlob) -> CoreResult<String> {
        let url = self.model_url(&self.models.analysis, "generateContent");
        let body = Self::analysis_request(prompt, std::slice::from_ref(image), None);
        let resp: GenerateContentResponse = self.post_json("image analysis", &url, &body).await?;
        Self::text_from_content(resp)
    }

    async fn analyze_video(
        &self,
        prompt: &str,
        frames: &[MediaBlob],
        context_image: Option<&MediaBlob>,
    ) -> CoreResult<String> {
        let url = self.model_url(&self.models.analysis, "generateContent");
        let body = Self::analysis_request(prompt, frames, context_image);
        let resp: GenerateContentResponse = self.post_json("video analysis", &url, &body).await?;
        Self::text_from_content(resp)
    }

    async fn submit_video(&self, params: &VideoGenerationParams) -> CoreResult<VideoJobHandle> {
        let url = self.model_url(&self.models.video, "predictLongRunning");
        let op: OperationResponse = self
            .post_json("video submit", &url, &Self::video_request(params))
            .await?;

        info!("Gemini video generation submitted: operation={}", op.name);
        Ok(self.handle_from_operation(op, chrono::Utc::now().timestamp()))
    }

    async fn poll_video(&self, handle: &VideoJobHandle) -> CoreResult<VideoJobHandle> {
        let url = self.operation_url(&handle.operation);
        let op: OperationResponse = self.get_json("video poll", &url).await?;

        debug!(
            "Gemini poll for operation {}: done={}",
            handle.operation, op.done
        );
        Ok(self.handle_from_operation(op, handle.submitted_at))
    }

    async fn download_video(&self, uri: &str) -> CoreResult<MediaBlob> {
        let validated_url = Self::validate_download_url(uri)?;

        let mut resp = self
            .client
            .get(validated_url)
            .header(API_KEY_HEADER, self.api_key.expose())
            .send()
            .await
            .map_err(|e| CoreError::UpstreamError(format!("Download failed: {}", e)))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!("Video download failed with status {}", status);
            return Err(CoreError::DownloadError {
                status: status.as_u16(),
                body: truncate(&body),
            });
        }

        if let Some(content_len) = resp.content_length() {
            if content_len > self.max_download_bytes {
                return Err(CoreError::UpstreamError(format!(
                    "Downloaded video is too large ({} bytes > {} bytes limit)",
                    content_len, self.max_download_bytes
                )));
            }
        }

        let mime_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
            .filter(|v| v.starts_with("video/"))
            .unwrap_or_else(|| "video/mp4".to_string());

        let mut bytes = Vec::new();
        while let Some(chunk) = resp
            .chunk()
            .await
            .map_err(|e| CoreError::UpstreamError(format!("Failed to read chunk: {}", e)))?
        {
            if (bytes.len() + chunk.len()) as u64 > self.max_download_bytes {
                return Err(CoreError::UpstreamError(format!(
                    "Downloaded video is too large (exceeded {} bytes limit)",
                    self.max_download_bytes
                )));
            }
            bytes.extend_from_slice(&chunk);
        }

        info!("Downloaded generated video ({} bytes)", bytes.len());
        Ok(MediaBlob::new(bytes, mime_type))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::generative::video::ReferencePurpose;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn provider() -> GeminiProvider {
        GeminiProvider::new(ApiKey::new("AIzaTestKey0000000000").unwrap()).unwrap()
    }

    /// Serve one canned HTTP response; resolves to the raw request text
    async fn serve_once(response: String) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let task = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                if let Some(header_end) = request.windows(4).position(|w| w == b"\r\n\r\n") {
                    let head = String::from_utf8_lossy(&request[..header_end]).to_ascii_lowercase();
                    let body_len = head
                        .lines()
                        .find_map(|l| l.strip_prefix("content-length:"))
                        .and_then(|v| v.trim().parse::<usize>().ok())
                        .unwrap_or(0);
                    if request.len() >= header_end + 4 + body_len {
                        break;
                    }
                }
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&request).to_string()
        });
        (format!("http://{}", addr), task)
    }

    fn http_response(status: &str, content_type: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            content_type,
            body.len(),
            body
        )
    }

    #[test]
    fn test_provider_name_and_capabilities() {
        let provider = provider();
        assert_eq!(provider.name(), "gemini");
        assert!(provider.supports(ProviderCapability::VideoGeneration));
        assert!(provider.supports(ProviderCapability::ImageEditing));
    }

    #[test]
    fn test_debug_hides_key() {
        let printed = format!("{:?}", provider());
        assert!(!printed.contains("AIzaTestKey"));
    }

    #[test]
    fn test_url_building() {
        let provider = provider();
        assert_eq!(
            provider.model_url("imagen-4.0-generate-001", "predict"),
            "https://generativelanguage.googleapis.com/v1beta/models/imagen-4.0-generate-001:predict"
        );
        assert_eq!(
            provider.operation_url("models/veo/operations/abc"),
            "https://generativelanguage.googleapis.com/v1beta/models/veo/operations/abc"
        );

        let custom = provider.with_base_url("http://localhost:9000/v1beta/");
        assert_eq!(
            custom.model_url("m", "generateContent"),
            "http://localhost:9000/v1beta/models/m:generateContent"
        );
    }

    #[test]
    fn test_validate_download_url() {
        assert!(GeminiProvider::validate_download_url("https://example.com/video.mp4").is_ok());
        assert!(GeminiProvider::validate_download_url("http://example.com/video.mp4").is_ok());
        assert!(GeminiProvider::validate_download_url("file:///tmp/video.mp4").is_err());
        assert!(GeminiProvider::validate_download_url("not a url").is_err());
    }

    #[test]
    fn test_image_request_serialization() {
        let req = GeminiProvider::image_request("A red fox", AspectRatio::Portrait9x16);
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["instances"][0]["prompt"], "A red fox");
        assert_eq!(json["parameters"]["sampleCount"], 1);
        assert_eq!(json["parameters"]["aspectRatio"], "9:16");
    }

    #[test]
    fn test_edit_request_serialization() {
        let image = MediaBlob::new(vec![1u8, 2, 3], "image/png");
        let req = GeminiProvider::edit_request("Make it blue", &image);
        let json = serde_json::to_value(&req).unwrap();

        let parts = &json["contents"][0]["parts"];
        assert_eq!(parts[0]["inlineData"]["mimeType"], "image/png");
        assert_eq!(parts[0]["inlineData"]["data"], "AQID");
        assert_eq!(parts[1]["text"], "Make it blue");
        assert!(parts[0].get("text").is_none());
        assert_eq!(json["generationConfig"]["responseModalities"][1], "IMAGE");
    }

    #[test]
    fn test_analysis_request_keeps_frame_order() {
        let frames: Vec<MediaBlob> = (0..3u8)
            .map(|i| MediaBlob::new(vec![i], "image/jpeg"))
            .collect();
        let context = MediaBlob::new(vec![9u8], "image/png");
        let req = GeminiProvider::analysis_request("What happens?", &frames, Some(&context));
        let json = serde_json::to_value(&req).unwrap();
        let parts = json["contents"][0]["parts"].as_array().unwrap();

        assert_eq!(parts[1]["inlineData"]["mimeType"], "image/png");
        let frame_data: Vec<&str> = parts
            .iter()
            .filter(|p| p["inlineData"]["mimeType"] == "image/jpeg")
            .map(|p| p["inlineData"]["data"].as_str().unwrap())
            .collect();
        assert_eq!(frame_data, vec!["AA==", "AQ==", "Ag=="]);
        assert_eq!(parts.last().unwrap()["text"], "What happens?");
        assert!(json.get("generationConfig").is_none());
    }

    #[test]
    fn test_video_request_serialization() {
        let params = VideoGenerationParams::new("A dragon flying")
            .with_aspect_ratio(AspectRatio::Portrait9x16)
            .with_reference_image(
                MediaBlob::new(vec![1u8], "image/png"),
                ReferencePurpose::Character,
            );
        let json = serde_json::to_value(GeminiProvider::video_request(&params)).unwrap();

        let instance = &json["instances"][0];
        assert_eq!(instance["prompt"], "A dragon flying");
        assert_eq!(instance["referenceImages"][0]["referenceType"], "character");
        assert_eq!(
            instance["referenceImages"][0]["image"]["bytesBase64Encoded"],
            "AQ=="
        );
        assert_eq!(json["parameters"]["aspectRatio"], "9:16");

        let bare = VideoGenerationParams::new("Plain");
        let json = serde_json::to_value(GeminiProvider::video_request(&bare)).unwrap();
        assert!(json["instances"][0].get("referenceImages").is_none());
    }

    #[test]
    fn test_image_from_predictions() {
        let resp: PredictResponse = serde_json::from_str(
            r#"{"predictions":[{"bytesBase64Encoded":"AQID","mimeType":"image/png"}]}"#,
        )
        .unwrap();
        let image = GeminiProvider::image_from_predictions(resp).unwrap();
        assert_eq!(image.bytes(), &[1, 2, 3]);
        assert_eq!(image.mime_type(), "image/png");

        let filtered: PredictResponse = serde_json::from_str(
            r#"{"predictions":[{"raiFilteredReason":"unsafe content"}]}"#,
        )
        .unwrap();
        let err = GeminiProvider::image_from_predictions(filtered).unwrap_err();
        assert!(err.to_string().contains("unsafe content"));

        let empty: PredictResponse = serde_json::from_str("{}").unwrap();
        assert!(matches!(
            GeminiProvider::image_from_predictions(empty),
            Err(CoreError::UpstreamError(_))
        ));
    }

    #[test]
    fn test_image_from_content() {
        let resp: GenerateContentResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[
                {"text":"Here you go"},
                {"inlineData":{"mimeType":"image/png","data":"AQ=="}}
            ]}}]}"#,
        )
        .unwrap();
        let image = GeminiProvider::image_from_content(resp).unwrap();
        assert_eq!(image.bytes(), &[1]);

        let text_only: GenerateContentResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"I cannot edit that"}]}}]}"#,
        )
        .unwrap();
        let err = GeminiProvider::image_from_content(text_only).unwrap_err();
        assert!(err.to_string().contains("I cannot edit that"));
    }

    #[test]
    fn test_text_from_content() {
        let resp: GenerateContentResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"A cat "},{"text":"on a mat."}]}}]}"#,
        )
        .unwrap();
        assert_eq!(
            GeminiProvider::text_from_content(resp).unwrap(),
            "A cat on a mat."
        );

        let blocked: GenerateContentResponse =
            serde_json::from_str(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#).unwrap();
        let err = GeminiProvider::text_from_content(blocked).unwrap_err();
        assert!(err.to_string().contains("blocked"));
    }

    #[test]
    fn test_handle_from_operation() {
        let provider = provider();

        let pending: OperationResponse =
            serde_json::from_str(r#"{"name":"models/veo/operations/op1"}"#).unwrap();
        let handle = provider.handle_from_operation(pending, 42);
        assert!(!handle.done);
        assert_eq!(handle.operation, "models/veo/operations/op1");
        assert_eq!(handle.submitted_at, 42);

        let finished: OperationResponse = serde_json::from_str(
            r#"{"name":"op1","done":true,"response":{"generateVideoResponse":{
                "generatedSamples":[{"video":{"uri":"https://files.example.com/v.mp4"}}]}}}"#,
        )
        .unwrap();
        let handle = provider.handle_from_operation(finished, 42);
        assert!(handle.done);
        assert!(handle.error.is_none());
        assert_eq!(
            handle.video_uri.as_deref(),
            Some("https://files.example.com/v.mp4")
        );

        let failed: OperationResponse = serde_json::from_str(
            r#"{"name":"op1","done":true,"error":{"code":3,"message":"Prompt rejected"}}"#,
        )
        .unwrap();
        let handle = provider.handle_from_operation(failed, 42);
        assert_eq!(handle.error.as_deref(), Some("Prompt rejected"));

        let filtered: OperationResponse = serde_json::from_str(
            r#"{"name":"op1","done":true,"response":{"generateVideoResponse":{
                "raiMediaFilteredReasons":["celebrity likeness"]}}}"#,
        )
        .unwrap();
        let handle = provider.handle_from_operation(filtered, 42);
        assert!(handle.error.unwrap().contains("celebrity likeness"));
        assert!(handle.video_uri.is_none());
    }

    #[test]
    fn test_parse_api_error_structured() {
        let body = r#"{"error":{"code":400,"message":"API key not valid","status":"INVALID_ARGUMENT"}}"#;
        let err = GeminiProvider::parse_api_error(StatusCode::BAD_REQUEST, body);
        match err {
            CoreError::UpstreamError(msg) => {
                assert!(msg.contains("API key not valid"));
                assert!(msg.contains("INVALID_ARGUMENT"));
            }
            _ => panic!("Expected UpstreamError"),
        }
    }

    #[test]
    fn test_parse_api_error_unstructured() {
        let body = "x".repeat(2000);
        let err = GeminiProvider::parse_api_error(StatusCode::BAD_GATEWAY, &body);
        match err {
            CoreError::UpstreamError(msg) => {
                assert!(msg.contains("502"));
                assert!(msg.len() < 600);
            }
            _ => panic!("Expected UpstreamError"),
        }
    }

    #[tokio::test]
    async fn test_generate_image_against_local_server() {
        let body = r#"{"predictions":[{"bytesBase64Encoded":"AQID","mimeType":"image/png"}]}"#;
        let (base, server) = serve_once(http_response("200 OK", "application/json", body)).await;

        let provider = provider().with_base_url(base);
        let image = provider
            .generate_image("A lighthouse", AspectRatio::Landscape16x9)
            .await
            .unwrap();
        assert_eq!(image.bytes(), &[1, 2, 3]);

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /models/imagen-4.0-generate-001:predict"));
        assert!(request.to_ascii_lowercase().contains("x-goog-api-key: aizatestkey"));
    }

    #[tokio::test]
    async fn test_provider_error_becomes_upstream_error() {
        let body = r#"{"error":{"code":429,"message":"Quota exceeded","status":"RESOURCE_EXHAUSTED"}}"#;
        let (base, _server) =
            serve_once(http_response("429 Too Many Requests", "application/json", body)).await;

        let provider = provider().with_base_url(base);
        let err = provider
            .analyze_image("What is this?", &MediaBlob::new(vec![1u8], "image/png"))
            .await
            .unwrap_err();
        match err {
            CoreError::UpstreamError(msg) => assert!(msg.contains("Quota exceeded")),
            other => panic!("Expected UpstreamError, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_download_video() {
        let (base, server) = serve_once(http_response("200 OK", "video/mp4", "MP4DATA")).await;

        let video = provider()
            .download_video(&format!("{}/files/v.mp4?alt=media", base))
            .await
            .unwrap();
        assert_eq!(video.bytes(), b"MP4DATA");
        assert_eq!(video.mime_type(), "video/mp4");

        let request = server.await.unwrap();
        assert!(request.starts_with("GET /files/v.mp4?alt=media"));
        assert!(request.to_ascii_lowercase().contains("x-goog-api-key"));
    }

    #[tokio::test]
    async fn test_download_failure_is_download_error() {
        let (base, _server) =
            serve_once(http_response("403 Forbidden", "text/plain", "denied")).await;

        let err = provider()
            .download_video(&format!("{}/files/v.mp4", base))
            .await
            .unwrap_err();
        match err {
            CoreError::DownloadError { status, body } => {
                assert_eq!(status, 403);
                assert_eq!(body, "denied");
            }
            other => panic!("Expected DownloadError, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_download_size_cap() {
        let (base, _server) =
            serve_once(http_response("200 OK", "video/mp4", "0123456789")).await;

        let err = provider()
            .with_max_download_bytes(4)
            .download_video(&format!("{}/v.mp4", base))
            .await
            .unwrap_err();
        match err {
            CoreError::UpstreamError(msg) => assert!(msg.contains("too large")),
            other => panic!("Expected UpstreamError, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_download_size_cap_without_content_length() {
        let response = "HTTP/1.1 200 OK
Content-Type: video/mp4
Connection: close

0123456789";
        let (base, _server) = serve_once(response.to_string()).await;

        let err = provider()
            .with_max_download_bytes(4)
            .download_video(&format!("{}/v.mp4", base))
            .await
            .unwrap_err();
        match err {
            CoreError::UpstreamError(msg) => assert!(msg.contains("too large")),
            other => panic!("Expected UpstreamError, got {:?}", other),
        }
    }
}
