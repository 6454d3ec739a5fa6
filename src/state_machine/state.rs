use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::job::Job;
use crate::error::{BoardError, Result};

/// The four states of a job on the board.
///
/// Each job flows through: OPEN → CLAIMED → SUBMITTED → APPROVED.
/// The derived ordering follows that sequence, so a status never compares
/// lower than any status the job held before.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Open,
    Claimed,
    Submitted,
    Approved,
}

impl JobStatus {
    pub const ALL: [JobStatus; 4] = [
        JobStatus::Open,
        JobStatus::Claimed,
        JobStatus::Submitted,
        JobStatus::Approved,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Open => "OPEN",
            JobStatus::Claimed => "CLAIMED",
            JobStatus::Submitted => "SUBMITTED",
            JobStatus::Approved => "APPROVED",
        }
    }

    /// The status directly after this one, or `None` for `Approved`.
    pub fn next(self) -> Option<JobStatus> {
        match self {
            JobStatus::Open => Some(JobStatus::Claimed),
            JobStatus::Claimed => Some(JobStatus::Submitted),
            JobStatus::Submitted => Some(JobStatus::Approved),
            JobStatus::Approved => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        self.next().is_none()
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = BoardError;

    fn from_str(s: &str) -> Result<Self> {
        JobStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| BoardError::Validation(format!("unknown job status: {s:?}")))
    }
}

/// A requested move along the lifecycle, carrying the data it records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Claim { editor_id: String },
    Submit { submission_url: String },
    Approve,
}

impl Transition {
    /// The status a job must hold for this transition to apply.
    pub fn requires(&self) -> JobStatus {
        match self {
            Transition::Claim { .. } => JobStatus::Open,
            Transition::Submit { .. } => JobStatus::Claimed,
            Transition::Approve => JobStatus::Submitted,
        }
    }

    /// The status a job holds after this transition.
    pub fn produces(&self) -> JobStatus {
        match self {
            Transition::Claim { .. } => JobStatus::Claimed,
            Transition::Submit { .. } => JobStatus::Submitted,
            Transition::Approve => JobStatus::Approved,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Transition::Claim { .. } => "claim",
            Transition::Submit { .. } => "submit",
            Transition::Approve => "approve",
        }
    }
}

/// Drives a `Job` through the lifecycle.
pub struct StateMachine;

impl StateMachine {
    /// Apply `transition` to `job`, stamping it with `now`.
    ///
    /// - `Claim` records the editor and `claimed_at`.
    /// - `Submit` records the submission URL and `submitted_at`.
    /// - `Approve` records `approved_at`.
    ///
    /// If the job is not in `transition.requires()` it is left untouched and
    /// `InvalidTransition` is returned with the observed status.
    pub fn apply(job: &mut Job, transition: &Transition, now: DateTime<Utc>) -> Result<()> {
        let expected = transition.requires();
        if job.status != expected {
            return Err(BoardError::InvalidTransition {
                job_id: job.id.clone(),
                current: job.status,
                expected,
            });
        }

        match transition {
            Transition::Claim { editor_id } => {
                job.editor_id = Some(editor_id.clone());
                job.claimed_at = Some(now);
            }
            Transition::Submit { submission_url } => {
                job.submission_url = Some(submission_url.clone());
                job.submitted_at = Some(now);
            }
            Transition::Approve => {
                job.approved_at = Some(now);
            }
        }

        job.status = transition.produces();
        job.updated_at = now;
        Ok(())
    }
}
