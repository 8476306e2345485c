//! Job document and state machine.
//!
//! A [`Job`] is a structured record with a fixed set of well-known fields
//! plus one open extension map. Arbitrary attributes supplied at creation
//! time land in the extension map and round-trip through serialization
//! verbatim; the item payload itself lives in that map under a configurable
//! key.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

use crate::error::{ConveyorError, Result};

// ═══════════════════════════════════════════════════════════════════════════════
// Job Identification
// ═══════════════════════════════════════════════════════════════════════════════

/// Unique identifier for a job document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    /// Create a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for JobId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl std::str::FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Job Status
// ═══════════════════════════════════════════════════════════════════════════════

/// Status of a job.
///
/// Transitions move strictly forward: `Queued → Processing → Completed`
/// or `Failed`. There is no valid transition back to `Queued`, and a
/// terminal job never transitions again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Job is waiting in the queue
    Queued,
    /// Job is being worked through by an invocation
    Processing,
    /// All payload items were consumed
    Completed,
    /// Job failed and will not be picked up again
    Failed,
}

impl JobStatus {
    /// Check if the job is in a terminal state.
    ///
    /// Terminal jobs are excluded from queue scans.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Ordering rank used to enforce forward-only transitions.
    fn rank(&self) -> u8 {
        match self {
            Self::Queued => 0,
            Self::Processing => 1,
            Self::Completed | Self::Failed => 2,
        }
    }

    /// Check whether a transition to `to` is a valid forward move.
    pub fn can_transition_to(&self, to: JobStatus) -> bool {
        !self.is_terminal() && to.rank() > self.rank()
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queued => write!(f, "queued"),
            Self::Processing => write!(f, "processing"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = ConveyorError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "queued" => Ok(Self::Queued),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(ConveyorError::validation(format!(
                "Unknown job status: {}",
                other
            ))),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Job Document
// ═══════════════════════════════════════════════════════════════════════════════

/// A unit of deferred work: status, timestamps, progress, and an open
/// extension map carrying the item payload and any creator-supplied
/// attributes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Unique identifier, generated at creation, never changed
    pub id: JobId,

    /// Current status
    pub status: JobStatus,

    /// When the job was created
    pub created_at: DateTime<Utc>,

    /// Who created the job
    pub created_by: String,

    /// When the job was last mutated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,

    /// When the first invocation picked the job up
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_processing_at: Option<DateTime<Utc>>,

    /// When the job completed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    /// When the job failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<DateTime<Utc>>,

    /// Why the job failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,

    /// Count of payload items processed so far.
    ///
    /// Not an index into the payload: purely a count, used to skip already
    /// processed items on resume and to detect completion
    /// (`progress >= payload length`).
    #[serde(default)]
    pub progress: u64,

    /// Creator-supplied attributes, preserved verbatim.
    ///
    /// The item payload lives here under the deployment's payload key.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl Job {
    /// Resolve the item payload under `key`.
    ///
    /// # Errors
    ///
    /// `MissingPayload` when the key is absent, `MalformedPayload` when the
    /// value is not an array. Both are fatal for the invocation that hits
    /// them.
    pub fn payload(&self, key: &str) -> Result<&[Value]> {
        let value = self
            .extra
            .get(key)
            .ok_or_else(|| ConveyorError::missing_payload(key, self.id))?;

        value
            .as_array()
            .map(|items| items.as_slice())
            .ok_or_else(|| ConveyorError::malformed_payload(key, self.id))
    }

    /// Number of items in the payload under `key`.
    pub fn payload_len(&self, key: &str) -> Result<u64> {
        Ok(self.payload(key)?.len() as u64)
    }

    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Stamp `updated_at`. Called by the store on every mutation.
    pub fn touch(&mut self) {
        self.updated_at = Some(Utc::now());
    }

    /// Count one more item as processed.
    pub fn advance_progress(&mut self) {
        self.progress += 1;
    }

    /// Transition to `Processing`, stamping `started_processing_at` on the
    /// first pickup only.
    ///
    /// Returns false when the transition is not a valid forward move.
    pub fn mark_processing(&mut self) -> bool {
        if !self.status.can_transition_to(JobStatus::Processing) {
            return false;
        }
        self.status = JobStatus::Processing;
        if self.started_processing_at.is_none() {
            self.started_processing_at = Some(Utc::now());
        }
        true
    }

    /// Transition to `Completed`, stamping `completed_at` once.
    ///
    /// Returns false when the job is already terminal.
    pub fn mark_completed(&mut self) -> bool {
        if !self.status.can_transition_to(JobStatus::Completed) {
            return false;
        }
        self.status = JobStatus::Completed;
        if self.completed_at.is_none() {
            self.completed_at = Some(Utc::now());
        }
        true
    }

    /// Transition to `Failed`, recording the reason and stamping
    /// `failed_at` once.
    ///
    /// Returns false when the job is already terminal.
    pub fn mark_failed(&mut self, reason: impl Into<String>) -> bool {
        if !self.status.can_transition_to(JobStatus::Failed) {
            return false;
        }
        self.status = JobStatus::Failed;
        self.failure_reason = Some(reason.into());
        if self.failed_at.is_none() {
            self.failed_at = Some(Utc::now());
        }
        true
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
