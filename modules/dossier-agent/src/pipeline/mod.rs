//! The five stages of one investigation pass.
//!
//! Each stage owns its failure handling: collaborator errors, timeouts and
//! malformed payloads are logged into the investigation's event log and the
//! stage returns `Ok(())` with state left as it was. A stage returns `Err`
//! only for a contract violation, which aborts the investigation.

pub mod extraction;
pub mod planner;
pub mod reporting;
pub mod search;
pub mod validation;

use std::fmt;

use async_trait::async_trait;

use dossier_common::{DossierError, InvestigationState};

pub use extraction::{ExtractionPayload, ExtractionStage};
pub use planner::{PlanningStage, QueryPlanner};
pub use reporting::ReportingStage;
pub use search::SearchStage;
pub use validation::ValidationStage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassPhase {
    Planning,
    Searching,
    Extracting,
    Validating,
    Reporting,
}

impl PassPhase {
    /// Execution order within a pass.
    pub const ORDER: [PassPhase; 5] = [
        PassPhase::Planning,
        PassPhase::Searching,
        PassPhase::Extracting,
        PassPhase::Validating,
        PassPhase::Reporting,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PassPhase::Planning => "planning",
            PassPhase::Searching => "searching",
            PassPhase::Extracting => "extracting",
            PassPhase::Validating => "validating",
            PassPhase::Reporting => "reporting",
        }
    }
}

impl fmt::Display for PassPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[async_trait]
pub trait Stage: Send + Sync {
    fn phase(&self) -> PassPhase;

    async fn run(&self, state: &mut InvestigationState) -> Result<(), DossierError>;
}

/// First `max_chars` characters, for log excerpts.
pub(crate) fn excerpt(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
