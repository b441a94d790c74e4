//! Async Job Poller
//!
//! State machine: Submitting → Waiting ⇄ Polling → Resolving → Fetching → Done,
//! with Failed reachable from every non-Done stage. Only the side-effect free
//! status query is repeated; submission and download run once.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{JobStage, JobState, LongRunningJob};
use crate::core::media::MediaBlob;
use crate::core::progress::ProgressSink;
use crate::core::{CoreError, CoreResult};

/// Default delay between status queries
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

// =============================================================================
// Poll Schedule
// =============================================================================

/// Delay before each status query
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PollSchedule {
    /// Same delay before every query
    Fixed { interval: Duration },
    /// `initial * factor^n`, capped at `max`
    Exponential {
        initial: Duration,
        factor: f64,
        max: Duration,
    },
}

impl Default for PollSchedule {
    fn default() -> Self {
        PollSchedule::Fixed {
            interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl PollSchedule {
    pub fn fixed(interval: Duration) -> Self {
        PollSchedule::Fixed { interval }
    }

    pub fn exponential(initial: Duration, factor: f64, max: Duration) -> Self {
        PollSchedule::Exponential {
            initial,
            factor: factor.max(1.0),
            max: max.max(initial),
        }
    }

    /// Delay before the query numbered `attempt` (0-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            PollSchedule::Fixed { interval } => interval,
            PollSchedule::Exponential {
                initial,
                factor,
                max,
            } => {
                let scaled = initial.as_secs_f64() * factor.powi(attempt.min(64) as i32);
                if scaled.is_finite() && scaled < max.as_secs_f64() {
                    Duration::from_secs_f64(scaled)
                } else {
                    max
                }
            }
        }
    }
}

// =============================================================================
// Poller
// =============================================================================

/// Result of a completed job
#[derive(Debug, Clone)]
pub struct JobOutcome {
    /// Downloaded artifact
    pub artifact: MediaBlob,
    /// Number of status queries issued
    pub polls: u32,
}

/// Drives a [`LongRunningJob`] to completion
#[derive(Debug, Clone, Default)]
pub struct AsyncJobPoller {
    schedule: PollSchedule,
}

impl AsyncJobPoller {
    pub fn new(schedule: PollSchedule) -> Self {
        Self { schedule }
    }

    pub fn schedule(&self) -> &PollSchedule {
        &self.schedule
    }

    /// Submit the job, poll until it is done, then download its artifact
    pub async fn run<J>(
        &self,
        job: &J,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> CoreResult<JobOutcome>
    where
        J: LongRunningJob + ?Sized,
    {
        let mut stage = JobStage::Submitting;
        let result = self.drive(job, progress, cancel, &mut stage).await;

        if let Err(e) = &result {
            warn!("Generation job failed while {}: {}", stage, e);
            stage = JobStage::Failed;
            debug!("Job stage -> {}", stage);
        }
        result
    }

    async fn drive<J>(
        &self,
        job: &J,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
        stage: &mut JobStage,
    ) -> CoreResult<JobOutcome>
    where
        J: LongRunningJob + ?Sized,
    {
        if cancel.is_cancelled() {
            return Err(CoreError::Cancelled);
        }

        progress.report("Starting video generation...");
        let mut handle = job.submit().await?;
        transition(stage, JobStage::Waiting);

        let mut polls: u32 = 0;
        while !handle.is_done() {
            let delay = self.schedule.delay(polls);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(CoreError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }

            transition(stage, JobStage::Polling);
            polls += 1;
            progress.report(&format!(
                "Checking generation status (attempt {})...",
                polls
            ));

            handle = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(CoreError::Cancelled),
                queried = job.query(&handle) => queried?,
            };
            debug!("Status query {} done={}", polls, handle.is_done());

            if !handle.is_done() {
                transition(stage, JobStage::Waiting);
            }
        }

        transition(stage, JobStage::Resolving);
        if let Some(error) = handle.error() {
            return Err(CoreError::JobFailed(error.to_string()));
        }
        let locator = handle
            .artifact_locator()
            .ok_or(CoreError::MissingArtifact)?
            .to_string();

        transition(stage, JobStage::Fetching);
        progress.report("Downloading video...");
        let artifact = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(CoreError::Cancelled),
            fetched = job.fetch_artifact(&locator) => fetched?,
        };

        transition(stage, JobStage::Done);
        progress.report("Download complete");
        info!(
            "Generation job finished after {} status queries ({} bytes)",
            polls,
            artifact.len()
        );

        Ok(JobOutcome { artifact, polls })
    }
}

fn transition(stage: &mut JobStage, next: JobStage) {
    if *stage != next {
        debug!("Job stage {} -> {}", stage, next);
        *stage = next;
    }
}
