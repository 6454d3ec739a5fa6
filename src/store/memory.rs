use std::sync::{Mutex, MutexGuard};

use super::{newest_first, JobFilter, JobMutation, JobRepository};
use crate::error::{Result, StoreError};
use crate::state_machine::{Job, JobId};

/// In-process job store. Jobs live in insertion order behind one mutex, and
/// every update runs entirely under that lock.
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    jobs: Mutex<Vec<Job>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store pre-populated with `jobs`, kept in the given order.
    pub fn with_jobs(jobs: Vec<Job>) -> Self {
        Self {
            jobs: Mutex::new(jobs),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Job>> {
        // Updates mutate a clone, so a poisoned vector is still consistent.
        self.jobs.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl JobRepository for MemoryJobStore {
    fn get(&self, id: &JobId) -> Result<Job> {
        self.lock()
            .iter()
            .find(|j| &j.id == id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.clone()).into())
    }

    fn list(&self, filter: &JobFilter) -> Result<Vec<Job>> {
        Ok(newest_first(self.lock().iter(), filter))
    }

    fn insert(&self, job: Job) -> Result<Job> {
        let mut jobs = self.lock();
        if jobs.iter().any(|j| j.id == job.id) {
            return Err(StoreError::Duplicate(job.id).into());
        }
        jobs.push(job.clone());
        Ok(job)
    }

    fn update(&self, id: &JobId, mutate: &mut JobMutation<'_>) -> Result<Job> {
        let mut jobs = self.lock();
        let slot = jobs
            .iter_mut()
            .find(|j| &j.id == id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;

        let mut next = slot.clone();
        mutate(&mut next)?;
        *slot = next.clone();
        Ok(next)
    }
}
