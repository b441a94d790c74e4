//! GenStudio CLI - headless image/video generation and analysis.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use genstudio_lib::core::credentials::ApiKey;
use genstudio_lib::core::ffmpeg::{detect_ffmpeg, FFmpegInfo, FFmpegRunner};
use genstudio_lib::core::generative::{
    ApiGateway, AspectRatio, GeminiProvider, ReferencePurpose, VideoGenerationParams,
};
use genstudio_lib::core::jobs::AsyncJobPoller;
use genstudio_lib::core::media::{FrameSequenceSummary, MediaBlob};
use genstudio_lib::core::progress::ProgressSlot;
use genstudio_lib::core::sampler::{FFmpegDecoder, FrameSampler, SamplingPolicy};
use genstudio_lib::core::settings::StudioSettings;
use genstudio_lib::core::CoreResult;

/// Exit status for fatal startup errors (missing credentials, bad config)
const EXIT_CONFIG: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "genstudio")]
#[command(version)]
#[command(about = "Generate, edit and analyze images and videos")]
#[command(long_about = "GenStudio generates and edits images, analyzes images and videos, \
    and generates videos from prompts and reference images.\n\n\
    The API key is read from GEMINI_API_KEY (or API_KEY).\n\n\
    EXAMPLES:\n    \
    genstudio generate-image --prompt \"a lighthouse at dusk\" --output out.png\n    \
    genstudio analyze-video --video clip.mp4 --prompt \"What happens?\"\n    \
    genstudio generate-video --prompt \"a comet\" --reference hero.png:character --output comet.mp4")]
struct Cli {
    /// Settings file (default: $GENSTUDIO_CONFIG or the per-user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Also write daily rolling logs to this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate an image from a prompt
    GenerateImage {
        #[arg(long)]
        prompt: String,

        /// 1:1, 3:4, 4:3, 9:16 or 16:9
        #[arg(long, default_value = "1:1")]
        aspect_ratio: AspectRatio,

        #[arg(long, short)]
        output: PathBuf,
    },

    /// Edit an image according to a prompt
    EditImage {
        #[arg(long)]
        prompt: String,

        #[arg(long)]
        image: PathBuf,

        #[arg(long, short)]
        output: PathBuf,
    },

    /// Describe an image or answer a question about it
    AnalyzeImage {
        #[arg(long)]
        image: PathBuf,

        #[arg(long)]
        prompt: Option<String>,
    },

    /// Sample frames from a video and analyze them
    AnalyzeVideo {
        #[arg(long)]
        video: PathBuf,

        #[arg(long)]
        prompt: Option<String>,

        /// Extra image sent along with the frames
        #[arg(long)]
        context_image: Option<PathBuf>,

        /// Seconds between sampled frames
        #[arg(long)]
        interval: Option<f64>,

        /// Maximum number of frames
        #[arg(long)]
        max_frames: Option<usize>,
    },

    /// Generate a video and download it
    GenerateVideo {
        #[arg(long)]
        prompt: String,

        /// Reference image as FILE[:asset|character] (repeatable)
        #[arg(long = "reference", value_parser = parse_reference)]
        references: Vec<ReferenceArg>,

        /// 16:9 or 9:16
        #[arg(long, default_value = "16:9")]
        aspect_ratio: AspectRatio,

        #[arg(long, short)]
        output: PathBuf,
    },
}

/// `FILE[:asset|character]`
#[derive(Debug, Clone, PartialEq)]
struct ReferenceArg {
    path: PathBuf,
    purpose: ReferencePurpose,
}

fn parse_reference(value: &str) -> Result<ReferenceArg, String> {
    if value.trim().is_empty() {
        return Err("reference path cannot be empty".to_string());
    }

    // A trailing `:tag` only counts when it names a purpose, so paths with
    // colons (e.g. `C:\refs\a.png`) still work.
    if let Some((path, tag)) = value.rsplit_once(':') {
        if let Ok(purpose) = tag.parse::<ReferencePurpose>() {
            if path.is_empty() {
                return Err(format!("missing file before ':{}'", tag));
            }
            return Ok(ReferenceArg {
                path: PathBuf::from(path),
                purpose,
            });
        }
    }

    Ok(ReferenceArg {
        path: PathBuf::from(value),
        purpose: ReferencePurpose::Asset,
    })
}

/// Everything loaded before a command runs
struct Startup {
    settings: StudioSettings,
    gateway: ApiGateway,
}

impl Startup {
    fn load(config: Option<&Path>) -> CoreResult<Self> {
        let settings = StudioSettings::load(config)?;
        let api_key = ApiKey::from_env()?;
        let provider = GeminiProvider::from_settings(api_key, &settings.provider)?;

        Ok(Self {
            settings,
            gateway: ApiGateway::new(Arc::new(provider)),
        })
    }
}

/// Prints progress slot updates to stderr until the slot is dropped
struct ProgressDisplay {
    slot: ProgressSlot,
    task: JoinHandle<()>,
}

impl ProgressDisplay {
    fn start() -> Self {
        let slot = ProgressSlot::new();
        let mut rx = slot.subscribe();
        let task = tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let message = rx.borrow_and_update().message.clone();
                if let Some(message) = message {
                    eprintln!("{}", message);
                }
            }
        });
        Self { slot, task }
    }

    fn slot(&self) -> &ProgressSlot {
        &self.slot
    }

    /// Flush the remaining messages
    async fn finish(self) {
        drop(self.slot);
        if let Err(e) = self.task.await {
            debug!("Progress display task ended abnormally: {}", e);
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SavedOutput<'a> {
    path: &'a Path,
    mime_type: &'a str,
    bytes: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    polls: Option<u32>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AnalysisOutput<'a> {
    answer: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    frames: Option<FrameSequenceSummary>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    genstudio_lib::init_logging(cli.log_dir.as_deref());

    let startup = match Startup::load(cli.config.as_deref()) {
        Ok(startup) => startup,
        Err(e) => {
            eprintln!("error: {}", e.user_message());
            return if e.is_fatal() {
                ExitCode::from(EXIT_CONFIG)
            } else {
                ExitCode::FAILURE
            };
        }
    };

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling");
            on_ctrl_c.cancel();
        }
    });

    match run(cli.command, cli.json, &startup, &cancel).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(
    command: Command,
    json: bool,
    startup: &Startup,
    cancel: &CancellationToken,
) -> Result<()> {
    let gateway = &startup.gateway;
    let settings = &startup.settings;

    match command {
        Command::GenerateImage {
            prompt,
            aspect_ratio,
            output,
        } => {
            let image = gateway.generate_image(&prompt, aspect_ratio).await?;
            save(&image, &output, None, json).await
        }

        Command::EditImage {
            prompt,
            image,
            output,
        } => {
            let source = read_media(&image).await?;
            let edited = gateway.edit_image(&prompt, &source).await?;
            save(&edited, &output, None, json).await
        }

        Command::AnalyzeImage { image, prompt } => {
            let source = read_media(&image).await?;
            let answer = gateway.analyze_image(prompt.as_deref(), &source).await?;
            print_analysis(&answer, None, json)
        }

        Command::AnalyzeVideo {
            video,
            prompt,
            context_image,
            interval,
            max_frames,
        } => {
            let defaults = settings.sampling_policy()?;
            let policy = SamplingPolicy::new(
                interval.unwrap_or(defaults.interval_seconds()),
                max_frames.unwrap_or(defaults.max_frames()),
            )?;
            let source = read_media(&video).await?;
            if !source.is_video() {
                bail!("{} is not a video file", video.display());
            }
            let context = match context_image {
                Some(path) => Some(read_media(&path).await?),
                None => None,
            };

            let ffmpeg = locate_ffmpeg(settings.ffmpeg_dir.clone()).await?;
            info!("Using FFmpeg {}", ffmpeg.version);
            let sampler = FrameSampler::new(Arc::new(FFmpegDecoder::new(FFmpegRunner::new(ffmpeg))));

            let display = ProgressDisplay::start();
            let sampled = {
                let reporter = display.slot().reporter();
                sampler.sample(&source, &policy, &reporter, cancel).await
            };
            display.finish().await;
            let frames = sampled?;
            let summary = frames.summary();

            let answer = gateway
                .analyze_video(prompt.as_deref(), frames, context.as_ref())
                .await?;
            print_analysis(&answer, Some(summary), json)
        }

        Command::GenerateVideo {
            prompt,
            references,
            aspect_ratio,
            output,
        } => {
            let mut params = VideoGenerationParams::new(prompt).with_aspect_ratio(aspect_ratio);
            for reference in &references {
                let image = read_media(&reference.path).await?;
                params = params.with_reference_image(image, reference.purpose);
            }

            let poller = AsyncJobPoller::new(settings.poll_schedule());
            let display = ProgressDisplay::start();
            let rendered = {
                let _ticker = display
                    .slot()
                    .start_ticker(settings.ticker.messages.clone(), settings.ticker_period());
                let reporter = display.slot().reporter();
                gateway
                    .render_video(params, &poller, &reporter, cancel)
                    .await
            };
            display.finish().await;
            let outcome = rendered?;

            save(&outcome.artifact, &output, Some(outcome.polls), json).await
        }
    }
}

/// Probe for FFmpeg off the async runtime; detection runs `ffmpeg -version`
async fn locate_ffmpeg(configured_dir: Option<PathBuf>) -> Result<FFmpegInfo> {
    let info = tokio::task::spawn_blocking(move || detect_ffmpeg(configured_dir.as_deref()))
        .await
        .context("FFmpeg detection task failed")??;
    Ok(info)
}

async fn read_media(path: &Path) -> Result<MediaBlob> {
    MediaBlob::from_path(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))
}

async fn save(blob: &MediaBlob, output: &Path, polls: Option<u32>, json: bool) -> Result<()> {
    if let Some(expected) = output.extension().and_then(|e| e.to_str()) {
        if !expected.eq_ignore_ascii_case(blob.extension()) {
            warn!(
                "Output is {} but {} was requested",
                blob.mime_type(),
                output.display()
            );
        }
    }

    blob.write_to(output)
        .await
        .with_context(|| format!("Failed to write {}", output.display()))?;

    if json {
        let saved = SavedOutput {
            path: output,
            mime_type: blob.mime_type(),
            bytes: blob.len(),
            polls,
        };
        println!("{}", serde_json::to_string_pretty(&saved)?);
    } else {
        println!(
            "Saved {} ({}, {} bytes)",
            output.display(),
            blob.mime_type(),
            blob.len()
        );
    }
    Ok(())
}

fn print_analysis(answer: &str, frames: Option<FrameSequenceSummary>, json: bool) -> Result<()> {
    if json {
        let out = AnalysisOutput { answer, frames };
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("{}", answer.trim());
    }
    Ok(())
}
