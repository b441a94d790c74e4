//! FFmpeg Runner Module
//!
//! Executes FFmpeg/FFprobe commands for probing and frame decoding.

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;

use tokio::io::AsyncReadExt;

use super::{FFmpegError, FFmpegInfo, FFmpegResult};

/// Media information extracted by FFprobe
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct MediaInfo {
    /// Duration in seconds
    pub duration_sec: f64,
    /// Video stream info (if present)
    pub video: Option<VideoStreamInfo>,
    /// Container format
    pub format: String,
}

/// Video stream information
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct VideoStreamInfo {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Frame rate (frames per second)
    pub fps: f64,
    /// Codec name (e.g., "h264", "vp9")
    pub codec: String,
    /// Display rotation in degrees, normalized to 0..360
    pub rotation: u32,
}

impl VideoStreamInfo {
    /// Size of the frame as displayed, after rotation is applied
    pub fn display_size(&self) -> (u32, u32) {
        if self.rotation % 180 == 90 {
            (self.height, self.width)
        } else {
            (self.width, self.height)
        }
    }
}

/// FFmpeg command runner
#[derive(Debug, Clone)]
pub struct FFmpegRunner {
    info: Arc<FFmpegInfo>,
}

impl FFmpegRunner {
    /// Create a new FFmpegRunner from detected FFmpeg installation
    pub fn new(info: FFmpegInfo) -> Self {
        Self {
            info: Arc::new(info),
        }
    }

    /// Probe media file to get information
    pub async fn probe(&self, input: &Path) -> FFmpegResult<MediaInfo> {
        ensure_input_exists(input)?;

        let output = tokio::process::Command::new(&self.info.ffprobe_path)
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
                &input.to_string_lossy(),
            ])
            .output()
            .await
            .map_err(FFmpegError::ProcessError)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FFmpegError::ProbeError(format!("FFprobe failed: {}", stderr)));
        }

        let json_str = String::from_utf8_lossy(&output.stdout);
        parse_probe_output(&json_str)
    }

    /// Decode the frame displayed at `time_sec` as packed RGB24 pixels
    ///
    /// The frame is returned at native resolution; no scaling filter is applied.
    /// Returns an empty buffer when the position is past the last decodable frame.
    pub async fn decode_frame_rgb(&self, input: &Path, time_sec: f64) -> FFmpegResult<Vec<u8>> {
        ensure_input_exists(input)?;

        // -ss before -i for fast (keyframe + decode-forward) seeking
        let output = tokio::process::Command::new(&self.info.ffmpeg_path)
            .args([
                "-v",
                "error",
                "-ss",
                &format!("{:.3}", time_sec),
                "-i",
                &input.to_string_lossy(),
                "-frames:v",
                "1",
                "-f",
                "rawvideo",
                "-pix_fmt",
                "rgb24",
                "pipe:1",
            ])
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(FFmpegError::ProcessError)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FFmpegError::ExecutionFailed(format!(
                "Frame decode at {:.3}s failed: {}",
                time_sec, stderr
            )));
        }

        Ok(output.stdout)
    }

    /// Decode the last frame of the video stream as packed RGB24 pixels
    ///
    /// Decodes the final second and keeps only the last complete frame of
    /// `frame_len` bytes. Returns an empty buffer when nothing was decoded.
    pub async fn decode_last_frame_rgb(&self, input: &Path, frame_len: usize) -> FFmpegResult<Vec<u8>> {
        ensure_input_exists(input)?;
        if frame_len == 0 {
            return Ok(Vec::new());
        }

        let mut child = tokio::process::Command::new(&self.info.ffmpeg_path)
            .args([
                "-v",
                "error",
                "-sseof",
                "-1",
                "-i",
                &input.to_string_lossy(),
                "-f",
                "rawvideo",
                "-pix_fmt",
                "rgb24",
                "pipe:1",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(FFmpegError::ProcessError)?;

        let mut stdout = child.stdout.take().ok_or_else(|| {
            FFmpegError::ExecutionFailed("FFmpeg stdout was not captured".to_string())
        })?;

        let mut frame = vec![0u8; frame_len];
        let mut last = Vec::new();
        loop {
            match stdout.read_exact(&mut frame).await {
                Ok(_) => {
                    std::mem::swap(&mut last, &mut frame);
                    frame.resize(frame_len, 0);
                }
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(FFmpegError::ProcessError(e)),
            }
        }
        drop(stdout);

        let output = child
            .wait_with_output()
            .await
            .map_err(FFmpegError::ProcessError)?;
        if !output.status.success() && last.is_empty() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FFmpegError::ExecutionFailed(format!(
                "Last frame decode failed: {}",
                stderr
            )));
        }

        Ok(last)
    }
}

fn ensure_input_exists(input: &Path) -> FFmpegResult<()> {
    if input.exists() {
        Ok(())
    } else {
        Err(FFmpegError::InvalidInput(format!(
            "Input file does not exist: {}",
            input.display()
        )))
    }
}

/// Parse FFprobe JSON output
fn parse_probe_output(json_str: &str) -> FFmpegResult<MediaInfo> {
    let json: serde_json::Value = serde_json::from_str(json_str)
        .map_err(|e| FFmpegError::ParseError(format!("Failed to parse FFprobe output: {}", e)))?;

    let format = json
        .get("format")
        .ok_or_else(|| FFmpegError::ParseError("Missing format info".to_string()))?;

    let format_name = format
        .get("format_name")
        .and_then(|f| f.as_str())
        .unwrap_or("unknown")
        .to_string();

    let streams = json
        .get("streams")
        .and_then(|s| s.as_array())
        .cloned()
        .unwrap_or_default();

    let video_stream = streams
        .iter()
        .find(|s| s.get("codec_type").and_then(|c| c.as_str()) == Some("video"));

    // The container duration also covers audio that may outlast the video,
    // so it is only used when the stream has none (some webm/mkv files)
    let duration_sec = video_stream
        .and_then(|s| parse_seconds(s.get("duration")))
        .or_else(|| parse_seconds(format.get("duration")))
        .unwrap_or(0.0);

    Ok(MediaInfo {
        duration_sec,
        video: video_stream.map(parse_video_stream),
        format: format_name,
    })
}

fn parse_seconds(value: Option<&serde_json::Value>) -> Option<f64> {
    value
        .and_then(|d| d.as_str())
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|d| d.is_finite())
}

fn parse_video_stream(stream: &serde_json::Value) -> VideoStreamInfo {
    let width = stream.get("width").and_then(|w| w.as_u64()).unwrap_or(0) as u32;
    let height = stream.get("height").and_then(|h| h.as_u64()).unwrap_or(0) as u32;

    // Parse frame rate from r_frame_rate (e.g., "30/1" or "30000/1001")
    let fps = stream
        .get("r_frame_rate")
        .and_then(|f| f.as_str())
        .and_then(|s| match s.split_once('/') {
            Some((num, den)) => {
                let num: f64 = num.parse().ok()?;
                let den: f64 = den.parse().ok()?;
                (den > 0.0).then(|| num / den)
            }
            None => s.parse().ok(),
        })
        .unwrap_or(30.0);

    let codec = stream
        .get("codec_name")
        .and_then(|c| c.as_str())
        .unwrap_or("unknown")
        .to_string();

    VideoStreamInfo {
        width,
        height,
        fps,
        codec,
        rotation: parse_rotation(stream),
    }
}

/// Rotation from the display matrix side data, or the legacy `rotate` tag
fn parse_rotation(stream: &serde_json::Value) -> u32 {
    let side_data = stream
        .get("side_data_list")
        .and_then(|list| list.as_array())
        .and_then(|list| {
            list.iter().find_map(|entry| {
                let rotation = entry.get("rotation")?;
                rotation
                    .as_i64()
                    .or_else(|| rotation.as_f64().map(|r| r.round() as i64))
            })
        });
    let tag = stream
        .get("tags")
        .and_then(|tags| tags.get("rotate"))
        .and_then(|r| r.as_str())
        .and_then(|r| r.trim().parse::<i64>().ok());

    side_data
        .or(tag)
        .map(|r| r.rem_euclid(360) as u32)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_parse_probe_output() {
        let json = r#"{
            "streams": [
                {"codec_type": "audio", "codec_name": "aac"},
                {"codec_type": "video", "codec_name": "h264", "width": 1280, "height": 720, "r_frame_rate": "30000/1001"}
            ],
            "format": {"format_name": "mov,mp4,m4a,3gp,3g2,mj2", "duration": "3.400000"}
        }"#;

        let info = parse_probe_output(json).unwrap();
        assert!((info.duration_sec - 3.4).abs() < 1e-9);
        let video = info.video.unwrap();
        assert_eq!(video.width, 1280);
        assert_eq!(video.height, 720);
        assert_eq!(video.codec, "h264");
        assert!((video.fps - 29.97).abs() < 0.01);
    }

    #[test]
    fn test_parse_probe_output_prefers_stream_duration() {
        let json = r#"{
            "streams": [
                {"codec_type": "video", "width": 640, "height": 360, "duration": "3.000000"},
                {"codec_type": "audio", "duration": "3.050000"}
            ],
            "format": {"format_name": "mov,mp4", "duration": "3.050000"}
        }"#;

        let info = parse_probe_output(json).unwrap();
        assert_eq!(info.duration_sec, 3.0);
    }

    #[test]
    fn test_parse_rotation() {
        let json = r#"{
            "streams": [{"codec_type": "video", "width": 1920, "height": 1080,
                "side_data_list": [{"side_data_type": "Display Matrix", "rotation": -90}]}],
            "format": {"format_name": "mov,mp4", "duration": "2.0"}
        }"#;
        let video = parse_probe_output(json).unwrap().video.unwrap();
        assert_eq!(video.rotation, 270);
        assert_eq!(video.display_size(), (1080, 1920));

        let json = r#"{
            "streams": [{"codec_type": "video", "width": 1920, "height": 1080,
                "tags": {"rotate": "180"}}],
            "format": {"format_name": "mov,mp4", "duration": "2.0"}
        }"#;
        let video = parse_probe_output(json).unwrap().video.unwrap();
        assert_eq!(video.rotation, 180);
        assert_eq!(video.display_size(), (1920, 1080));
    }

    #[test]
    fn test_parse_probe_output_container_duration_fallback() {
        let json = r#"{
            "streams": [{"codec_type": "video", "width": 640, "height": 360}],
            "format": {"format_name": "matroska,webm", "duration": "12.5"}
        }"#;

        let info = parse_probe_output(json).unwrap();
        assert_eq!(info.duration_sec, 12.5);
    }

    #[test]
    fn test_parse_probe_output_without_video() {
        let json = r#"{"streams": [], "format": {"format_name": "mp3", "duration": "N/A"}}"#;
        let info = parse_probe_output(json).unwrap();
        assert!(info.video.is_none());
        assert_eq!(info.duration_sec, 0.0);
    }

    #[test]
    fn test_parse_probe_output_invalid() {
        assert!(matches!(
            parse_probe_output("not json"),
            Err(FFmpegError::ParseError(_))
        ));
        assert!(parse_probe_output("{}").is_err());
    }

    #[tokio::test]
    async fn test_missing_input_is_rejected() {
        let runner = FFmpegRunner::new(FFmpegInfo {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
            version: "test".to_string(),
        });
        let missing = PathBuf::from("/nonexistent/genstudio/clip.mp4");

        assert!(matches!(
            runner.probe(&missing).await,
            Err(FFmpegError::InvalidInput(_))
        ));
        assert!(matches!(
            runner.decode_frame_rgb(&missing, 0.0).await,
            Err(FFmpegError::InvalidInput(_))
        ));
        assert!(matches!(
            runner.decode_last_frame_rgb(&missing, 12).await,
            Err(FFmpegError::InvalidInput(_))
        ));
    }
}
