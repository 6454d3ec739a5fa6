//! Job lifecycle engine for a video-editing bounty marketplace.
//!
//! Creators post jobs with a bounty, editors claim and submit them, and
//! creators approve the result. Approval credits the editor's ledger with the
//! bounty minus the platform fee.

pub mod api;
pub mod config;
pub mod credits;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod seed;
pub mod state_machine;
pub mod store;

pub use engine::{Approval, JobEngine, LedgerOutcome};
pub use error::{BoardError, Result};
