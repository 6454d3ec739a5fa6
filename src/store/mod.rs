//! Job persistence behind a single [`JobRepository`] contract.
//!
//! The engine only ever talks to the trait; which backend sits behind it is
//! decided once at startup:
//!
//! - [`MemoryJobStore`] keeps jobs in a mutex-guarded vector (tests, demos).
//! - [`FileJobStore`] keeps a JSON array on disk.
//! - [`SqliteJobStore`] keeps a `jobs` table in SQLite.
//!
//! Every backend runs [`JobRepository::update`] as one atomic
//! read-modify-write, which is what makes concurrent claims safe.

mod file;
mod memory;
mod sqlite;

pub use file::FileJobStore;
pub use memory::MemoryJobStore;
pub use sqlite::SqliteJobStore;

pub(crate) use file::{lock_file, read_json_file, write_json_file};

use crate::error::Result;
use crate::state_machine::{Job, JobId, JobStatus};

/// Closure applied to a job inside an atomic update.
pub type JobMutation<'a> = dyn FnMut(&mut Job) -> Result<()> + 'a;

/// Storage contract the lifecycle engine depends on.
pub trait JobRepository: Send + Sync {
    /// Fetch one job, `NotFound` if the id is unknown.
    fn get(&self, id: &JobId) -> Result<Job>;

    /// All jobs matching `filter`, newest first.
    fn list(&self, filter: &JobFilter) -> Result<Vec<Job>>;

    /// Persist a new job. Fails if the id is already taken.
    fn insert(&self, job: Job) -> Result<Job>;

    /// Atomically load the job, run `mutate` on it and persist the result.
    ///
    /// If `mutate` fails nothing is written and its error is returned.
    /// No other update of the same id may interleave with this one.
    fn update(&self, id: &JobId, mutate: &mut JobMutation<'_>) -> Result<Job>;
}

/// Optional criteria for [`JobRepository::list`]. All given criteria must match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub creator_id: Option<String>,
    pub editor_id: Option<String>,
}

impl JobFilter {
    pub fn status(status: JobStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn creator(creator_id: impl Into<String>) -> Self {
        Self {
            creator_id: Some(creator_id.into()),
            ..Default::default()
        }
    }

    pub fn editor(editor_id: impl Into<String>) -> Self {
        Self {
            editor_id: Some(editor_id.into()),
            ..Default::default()
        }
    }

    pub fn matches(&self, job: &Job) -> bool {
        self.status.is_none_or(|s| job.status == s)
            && self
                .creator_id
                .as_deref()
                .is_none_or(|c| job.creator_id == c)
            && self
                .editor_id
                .as_deref()
                .is_none_or(|e| job.editor_id.as_deref() == Some(e))
    }
}

/// Filter jobs held in insertion order and return them newest first.
///
/// Ties on `created_at` put the most recently inserted job first.
pub(crate) fn newest_first<'a>(
    jobs_in_insertion_order: impl DoubleEndedIterator<Item = &'a Job>,
    filter: &JobFilter,
) -> Vec<Job> {
    let mut out: Vec<Job> = jobs_in_insertion_order
        .rev()
        .filter(|job| filter.matches(job))
        .cloned()
        .collect();
    // Stable sort keeps the reversed insertion order for equal timestamps.
    out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    out
}


#[cfg(test)]
mod tests {
    use super::testing::sample_job;
    use super::*;

    #[test]
    fn filter_matches_all_given_criteria() {
        let job = sample_job("creator-1", "a");
        assert!(JobFilter::default().matches(&job));
        assert!(JobFilter::status(JobStatus::Open).matches(&job));
        assert!(!JobFilter::status(JobStatus::Claimed).matches(&job));
        assert!(JobFilter::creator("creator-1").matches(&job));
        assert!(!JobFilter::editor("editor-1").matches(&job));

        let both = JobFilter {
            status: Some(JobStatus::Open),
            creator_id: Some("creator-2".into()),
            editor_id: None,
        };
        assert!(!both.matches(&job));
    }

    #[test]
    fn newest_first_breaks_ties_by_insertion() {
        let a = sample_job("c", "a");
        let mut b = sample_job("c", "b");
        b.created_at = a.created_at;
        let jobs = vec![a, b];
        let ordered = newest_first(jobs.iter(), &JobFilter::default());
        assert_eq!(ordered[0].title, "b");
        assert_eq!(ordered[1].title, "a");
    }
}
