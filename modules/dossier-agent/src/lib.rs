pub mod adapter;
pub mod controller;
pub mod infra;
pub mod investigator;
pub mod jobs;
pub mod pipeline;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod traits;

pub use adapter::{state_from_payload, state_to_payload};
pub use controller::{IterationController, PassStages, RunOutcome, Termination};
pub use investigator::Investigator;
pub use jobs::{JobRecord, JobRegistry, JobStatus};
