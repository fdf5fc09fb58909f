use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::{info, warn};

use dossier_common::{DossierError, InvestigationState};

use super::{excerpt, PassPhase, Stage};
use crate::traits::{GenerationRequest, TextGenerator};

/// Leads turned into queries per refinement. The rest are still marked
/// processed.
pub const MAX_REFINED_LEADS: usize = 5;

const PLANNER_SYSTEM: &str = "\
You are an elite risk-intelligence analyst. \
Produce structured investigation plans with actionable next steps.";

/// Derives search queries from the subject, objectives and surfaced leads.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryPlanner;

impl QueryPlanner {
    pub fn initial_queries(&self, subject: &str, objectives: &[String]) -> Vec<String> {
        vec![
            format!("{subject} biography"),
            format!("{subject} controversy"),
            format!("{subject} financial connections"),
            format!("{subject} affiliations"),
            format!("{subject} risk factors {}", objectives.join(", ")),
        ]
    }

    /// Two queries per lead for at most [`MAX_REFINED_LEADS`] leads.
    pub fn refine_queries(&self, subject: &str, leads: &[String]) -> Vec<String> {
        leads
            .iter()
            .take(MAX_REFINED_LEADS)
            .flat_map(|lead| {
                [
                    format!("{subject} {lead} investigation"),
                    format!("{lead} relation to {subject}"),
                ]
            })
            .collect()
    }
}

/// Drafts the investigation plan and chooses the pass's search queries.
pub struct PlanningStage {
    generator: Arc<dyn TextGenerator>,
    planner: QueryPlanner,
    llm_timeout: Duration,
}

impl PlanningStage {
    pub fn new(generator: Arc<dyn TextGenerator>, llm_timeout: Duration) -> Self {
        Self {
            generator,
            planner: QueryPlanner,
            llm_timeout,
        }
    }

    fn compose_prompt(state: &InvestigationState) -> String {
        let objectives: Vec<String> = state.objectives.iter().map(|o| format!("- {o}")).collect();
        format!(
            "Create a concise, step-by-step investigation plan.\n\
             Subject: {}\n\
             Objectives:\n{}\n\
             Outline key focus areas, immediate queries, and data sources to pursue.",
            state.subject,
            objectives.join("\n")
        )
    }

    async fn draft_plan(&self, state: &InvestigationState) -> Result<String, DossierError> {
        let request = GenerationRequest::new(Self::compose_prompt(state), PLANNER_SYSTEM).temperature(0.2);
        match tokio::time::timeout(self.llm_timeout, self.generator.generate(request)).await {
            Ok(result) => result,
            Err(_) => Err(DossierError::Timeout(format!(
                "plan generation exceeded {}s",
                self.llm_timeout.as_secs()
            ))),
        }
    }
}

#[async_trait]
impl Stage for PlanningStage {
    fn phase(&self) -> PassPhase {
        PassPhase::Planning
    }

    async fn run(&self, state: &mut InvestigationState) -> Result<(), DossierError> {
        info!(subject = state.subject.as_str(), "Planning pass");

        match self.draft_plan(state).await {
            Ok(plan) => {
                state.record_log("planning.plan", json!({"excerpt": excerpt(&plan, 200)}));
                state.context.investigation_plan = Some(plan);
            }
            Err(e) => {
                warn!(error = %e, "Plan generation failed");
                state.record_log("planning.plan_error", json!({"error": e.to_string()}));
            }
        }

        let seeded = !state.context.query_seed.is_empty();
        let queries = if seeded {
            std::mem::take(&mut state.context.query_seed)
        } else {
            self.planner.initial_queries(&state.subject, &state.objectives)
        };

        state.record_log(
            "planning.complete",
            json!({"query_count": queries.len(), "seeded": seeded}),
        );
        state.context.active_queries = queries;
        Ok(())
    }
}
