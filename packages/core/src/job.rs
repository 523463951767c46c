//! Job domain types for work items in the queue.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Largest accepted magnitude for a job priority.
pub const PRIORITY_LIMIT: i32 = 900;

/// Multiplier separating priority bands in a group's sort score.
///
/// `priority * PRIORITY_STRIDE + not_before_ms` stays below 2^53 for every
/// accepted priority, so the score is exact as a double in the store.
pub const PRIORITY_STRIDE: i64 = 10_000_000_000_000;

/// Longest accepted delay or ttl, about 95 years.
///
/// Keeps `not_before_ms` well under `PRIORITY_STRIDE` for the next century,
/// so scores stay ordered and exact.
pub const MAX_WAIT: Duration = Duration::from_millis(3_000_000_000_000);

/// Store-generated identifier for a job.
///
/// Ids are zero-padded sequence numbers so that lexicographic order matches
/// admission order when two jobs share a score.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Build the id for the given sequence number.
    pub fn from_sequence(seq: u64) -> Self {
        Self(format!("{seq:016}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for JobId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Priority of a job within its group. Lower values are more urgent.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Priority(i32);

impl Priority {
    /// Create a priority, rejecting values the score cannot represent exactly.
    pub fn new(value: i32) -> Result<Self, ValidationError> {
        if value.abs() > PRIORITY_LIMIT {
            return Err(ValidationError::PriorityOutOfRange(value));
        }
        Ok(Self(value))
    }

    pub fn value(self) -> i32 {
        self.0
    }

    /// Sort score for a job with this priority becoming eligible at `not_before_ms`.
    pub fn score(self, not_before_ms: i64) -> i64 {
        (i64::from(self.0) * PRIORITY_STRIDE).saturating_add(not_before_ms)
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Current status of a job in its lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Job is waiting in its group.
    #[default]
    Queued,
    /// Job was popped and handed to a consumer.
    Processing,
    /// The consumer reported success.
    Completed,
    /// The consumer reported failure, or the job expired before pickup.
    Failed,
}

impl JobStatus {
    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Status string as stored in the job record.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl FromStr for JobStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(ValidationError::UnknownStatus(other.to_string())),
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Admission options for a new job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobOptions {
    /// Ordering priority within the group.
    pub priority: Priority,
    /// Time to wait before the job becomes eligible.
    pub delay: Duration,
    /// Lifetime after admission; `None` never expires.
    pub ttl: Option<Duration>,
}

impl JobOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the priority for this job.
    pub fn with_priority(mut self, priority: i32) -> Result<Self, ValidationError> {
        self.priority = Priority::new(priority)?;
        Ok(self)
    }

    /// Delay eligibility by `delay`, at most `MAX_WAIT`.
    pub fn with_delay(mut self, delay: Duration) -> Result<Self, ValidationError> {
        self.delay = check_wait("delay", delay)?;
        Ok(self)
    }

    /// Discard the job if it is not picked up within `ttl`, at most `MAX_WAIT`.
    ///
    /// A zero ttl means the job never expires.
    pub fn with_ttl(mut self, ttl: Duration) -> Result<Self, ValidationError> {
        let ttl = check_wait("ttl", ttl)?;
        self.ttl = (!ttl.is_zero()).then_some(ttl);
        Ok(self)
    }

    /// Delay in whole milliseconds. Fields set directly are capped at `MAX_WAIT`.
    pub fn delay_ms(&self) -> i64 {
        duration_ms(self.delay)
    }

    /// Ttl in whole milliseconds, zero when unset. Capped like the delay.
    pub fn ttl_ms(&self) -> i64 {
        self.ttl.map(duration_ms).unwrap_or(0)
    }
}

fn check_wait(kind: &'static str, wait: Duration) -> Result<Duration, ValidationError> {
    if wait > MAX_WAIT {
        return Err(ValidationError::WaitOutOfRange { kind, wait });
    }
    Ok(wait)
}

fn duration_ms(duration: Duration) -> i64 {
    let capped = duration.min(MAX_WAIT);
    i64::try_from(capped.as_millis()).unwrap_or(i64::MAX)
}

/// A job handed to a consumer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job<P> {
    /// Unique identifier for this job.
    pub id: JobId,
    /// Queue the job was admitted to.
    pub queue: String,
    /// Group within the queue.
    pub group: String,
    /// Caller payload.
    pub payload: P,
}

impl<P> Job<P> {
    pub fn new(id: JobId, queue: impl Into<String>, group: impl Into<String>, payload: P) -> Self {
        Self {
            id,
            queue: queue.into(),
            group: group.into(),
            payload,
        }
    }
}
