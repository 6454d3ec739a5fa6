mod job;
mod state;

pub use job::{Job, JobId, JobKind, Money, NewJob};
pub use state::{JobStatus, StateMachine, Transition};
