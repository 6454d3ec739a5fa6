//! The job lifecycle engine.
//!
//! [`JobEngine`] owns every mutation entry point. Transitions are applied
//! through [`JobRepository::update`], so the status check and the write
//! happen atomically per job id. Ledger side effects of an approval happen
//! after the transition commits; if they fail the approval still stands and
//! the outstanding work is parked in a [`CreditQueue`].

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error, info, warn};

pub use crate::credits::PendingCredit;
use crate::credits::{CreditQueue, MemoryCreditQueue};
use crate::error::{BoardError, LedgerError, Result, StoreError};
use crate::ledger::{UserLedger, UserStats};
use crate::state_machine::{Job, JobId, Money, NewJob, StateMachine, Transition};
use crate::store::{JobFilter, JobRepository};

/// Share of every bounty kept by the platform, in basis points (15%).
pub const PLATFORM_FEE_BPS: i64 = 1_500;

/// What an editor receives for an approved job: the bounty minus the
/// platform fee, rounded to the nearest cent (halves up).
pub fn editor_payout(bounty: Money) -> Money {
    bounty.share_bps(10_000 - PLATFORM_FEE_BPS)
}

/// How the ledger side of an approval went.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LedgerOutcome {
    Credited,
    /// The approval stands; the credit is queued for [`JobEngine::reconcile`].
    Pending { reason: String },
}

/// Result of [`JobEngine::approve_job`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Approval {
    pub job: Job,
    pub payout: Money,
    pub ledger: LedgerOutcome,
}

/// Result of [`JobEngine::reconcile`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub settled: Vec<PendingCredit>,
    pub still_pending: Vec<PendingCredit>,
}

#[derive(Clone)]
pub struct JobEngine {
    jobs: Arc<dyn JobRepository>,
    ledger: Arc<dyn UserLedger>,
    credits: Arc<dyn CreditQueue>,
    max_attempts: u32,
}

impl JobEngine {
    pub fn new(jobs: Arc<dyn JobRepository>, ledger: Arc<dyn UserLedger>) -> Self {
        Self {
            jobs,
            ledger,
            credits: Arc::new(MemoryCreditQueue::new()),
            max_attempts: 3,
        }
    }

    /// Keep credits owed after a ledger failure in `credits` instead of
    /// process memory.
    pub fn with_credit_queue(mut self, credits: Arc<dyn CreditQueue>) -> Self {
        self.credits = credits;
        self
    }

    /// How many times each ledger step is tried before it is queued.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn create_job(&self, creator_id: &str, fields: NewJob) -> Result<Job> {
        let job = self.jobs.insert(Job::new(creator_id, fields)?)?;
        info!(job_id = %job.id, creator_id = %job.creator_id, bounty = %job.bounty, "job posted");

        if let Err(e) = self.ledger.increment_posted(&job.creator_id) {
            warn!(job_id = %job.id, creator_id = %job.creator_id, error = %e, "failed to count posted job");
        }
        Ok(job)
    }

    pub fn claim_job(&self, job_id: &JobId, editor_id: &str) -> Result<Job> {
        let editor_id = required("editorId", editor_id)?;
        self.transition(job_id, Transition::Claim { editor_id })
    }

    pub fn submit_job(&self, job_id: &JobId, submission_url: &str) -> Result<Job> {
        let submission_url = required("submissionUrl", submission_url)?;
        self.transition(job_id, Transition::Submit { submission_url })
    }

    /// Approve a submitted job and pay its editor.
    ///
    /// A ledger failure does not undo the approval: the result carries
    /// `LedgerOutcome::Pending` and the credit waits in the reconciliation
    /// queue.
    pub fn approve_job(&self, job_id: &JobId) -> Result<Approval> {
        let job = self.transition(job_id, Transition::Approve)?;
        let editor_id = job.editor_id.clone().ok_or_else(|| {
            StoreError::Corrupt(format!("approved job {} has no editor", job.id))
        })?;
        let payout = editor_payout(job.bounty);

        let mut credit = PendingCredit::new(job.id.clone(), editor_id, payout);
        let ledger = match self.settle(&mut credit) {
            Ok(()) => {
                info!(job_id = %job.id, editor_id = %credit.editor_id, amount = %payout, "editor credited");
                LedgerOutcome::Credited
            }
            Err(e) => {
                let err = BoardError::LedgerUpdateFailed {
                    user_id: credit.editor_id.clone(),
                    reason: e.to_string(),
                };
                warn!(job_id = %job.id, error = %err, "approval kept, ledger credit queued");
                if let Err(e) = self.credits.push(credit.clone()) {
                    error!(job_id = %job.id, editor_id = %credit.editor_id, amount = %payout, error = %e, "failed to queue ledger credit");
                }
                LedgerOutcome::Pending {
                    reason: err.to_string(),
                }
            }
        };

        Ok(Approval {
            job,
            payout,
            ledger,
        })
    }

    pub fn get_job(&self, job_id: &JobId) -> Result<Job> {
        self.jobs.get(job_id)
    }

    pub fn list_jobs(&self, filter: &JobFilter) -> Result<Vec<Job>> {
        self.jobs.list(filter)
    }

    pub fn user_stats(&self, user_id: &str) -> Result<UserStats> {
        self.ledger
            .stats(user_id)
            .map_err(|e| BoardError::LedgerUpdateFailed {
                user_id: user_id.to_string(),
                reason: e.to_string(),
            })
    }

    /// Snapshot of ledger work still owed.
    pub fn pending_credits(&self) -> Result<Vec<PendingCredit>> {
        Ok(self.credits.list()?)
    }

    /// Retry every queued credit once. Entries that settle leave the queue.
    ///
    /// Each entry is taken off the queue before its ledger steps run and put
    /// back with its progress if they fail, so two reconcilers never settle
    /// the same credit.
    pub fn reconcile(&self) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::default();

        for queued in self.credits.list()? {
            let Some(mut credit) = self.credits.take(&queued.job_id)? else {
                continue;
            };
            match self.settle(&mut credit) {
                Ok(()) => {
                    info!(job_id = %credit.job_id, editor_id = %credit.editor_id, amount = %credit.amount, "queued credit settled");
                    report.settled.push(credit);
                }
                Err(e) => {
                    warn!(job_id = %credit.job_id, editor_id = %credit.editor_id, error = %e, "queued credit still failing");
                    if let Err(e) = self.credits.push(credit.clone()) {
                        error!(job_id = %credit.job_id, editor_id = %credit.editor_id, amount = %credit.amount, error = %e, "failed to requeue ledger credit");
                        return Err(e.into());
                    }
                    report.still_pending.push(credit);
                }
            }
        }

        Ok(report)
    }

    fn transition(&self, job_id: &JobId, transition: Transition) -> Result<Job> {
        let job = self.jobs.update(job_id, &mut |job| {
            StateMachine::apply(job, &transition, Utc::now())
        });
        match &job {
            Ok(job) => info!(job_id = %job.id, transition = transition.name(), status = %job.status, "job transitioned"),
            Err(e) => debug!(job_id = %job_id, transition = transition.name(), error = %e, "transition rejected"),
        }
        job
    }

    fn settle(&self, credit: &mut PendingCredit) -> std::result::Result<(), LedgerError> {
        if !credit.earnings_applied {
            self.attempt(|| self.ledger.credit_earnings(&credit.editor_id, credit.amount))?;
            credit.earnings_applied = true;
        }
        if !credit.completed_applied {
            self.attempt(|| self.ledger.increment_completed(&credit.editor_id))?;
            credit.completed_applied = true;
        }
        Ok(())
    }

    fn attempt(
        &self,
        mut op: impl FnMut() -> std::result::Result<(), LedgerError>,
    ) -> std::result::Result<(), LedgerError> {
        let mut attempt = 1;
        loop {
            match op() {
                Ok(()) => return Ok(()),
                Err(e) if attempt < self.max_attempts => {
                    debug!(attempt, max = self.max_attempts, error = %e, "ledger call failed, retrying");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn required(field: &str, value: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(BoardError::Validation(format!("{field} is required")));
    }
    Ok(value.to_string())
}
