//! Long-Running Job Module
//!
//! Drives remote generation jobs through submit → poll → resolve → fetch.

mod poller;

pub use poller::*;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::media::MediaBlob;
use crate::core::CoreResult;

// =============================================================================
// Job Stages
// =============================================================================

/// Stage of a long-running job
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum JobStage {
    /// Submitting the job to the provider
    Submitting,
    /// Holding a handle, waiting before the next status query
    Waiting,
    /// Querying job status
    Polling,
    /// Job finished; extracting the artifact locator
    Resolving,
    /// Downloading the artifact
    Fetching,
    /// Artifact downloaded
    Done,
    /// Terminal failure
    Failed,
}

impl JobStage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStage::Done | JobStage::Failed)
    }
}

impl std::fmt::Display for JobStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStage::Submitting => write!(f, "submitting"),
            JobStage::Waiting => write!(f, "waiting"),
            JobStage::Polling => write!(f, "polling"),
            JobStage::Resolving => write!(f, "resolving"),
            JobStage::Fetching => write!(f, "fetching"),
            JobStage::Done => write!(f, "done"),
            JobStage::Failed => write!(f, "failed"),
        }
    }
}

// =============================================================================
// Job Traits
// =============================================================================

/// The parts of a provider job handle the poller is allowed to inspect
pub trait JobState: Send + Sync {
    fn is_done(&self) -> bool;

    /// Provider error message, if the job failed
    fn error(&self) -> Option<&str>;

    /// Where the finished artifact can be fetched from
    fn artifact_locator(&self) -> Option<&str>;
}

/// A remote job bound to its request: submit once, query repeatedly, fetch once
///
/// `query` must be side-effect free; the poller calls it until the job is done.
#[async_trait]
pub trait LongRunningJob: Send + Sync {
    type Handle: JobState;

    async fn submit(&self) -> CoreResult<Self::Handle>;

    async fn query(&self, handle: &Self::Handle) -> CoreResult<Self::Handle>;

    async fn fetch_artifact(&self, locator: &str) -> CoreResult<MediaBlob>;
}
