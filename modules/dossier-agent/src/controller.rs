//! Runs investigation passes until the iteration budget is spent or no
//! unprocessed leads remain.

use std::sync::Arc;

use serde_json::{json, Value};
use tokio::time::Instant;
use tracing::{info, warn};
use typed_builder::TypedBuilder;

use dossier_common::{Config, DossierError, InvestigationState};

use crate::adapter::{state_from_payload, state_to_payload};
use crate::infra::{NoopTelemetry, TelemetrySink};
use crate::pipeline::{
    ExtractionStage, PlanningStage, QueryPlanner, ReportingStage, SearchStage, Stage, ValidationStage,
};
use crate::traits::{ReportSink, SearchProvider, TextGenerator};

pub const DEFAULT_MAX_ITERATIONS: u32 = 2;

/// The stages of one pass, in execution order.
#[derive(Clone)]
pub struct PassStages {
    stages: Vec<Arc<dyn Stage>>,
}

impl PassStages {
    pub fn new(
        planning: Arc<dyn Stage>,
        searching: Arc<dyn Stage>,
        extracting: Arc<dyn Stage>,
        validating: Arc<dyn Stage>,
        reporting: Arc<dyn Stage>,
    ) -> Self {
        Self {
            stages: vec![planning, searching, extracting, validating, reporting],
        }
    }

    /// The stock pipeline over the given collaborators.
    pub fn standard(
        search: Arc<dyn SearchProvider>,
        generator: Arc<dyn TextGenerator>,
        sink: Option<Arc<dyn ReportSink>>,
        config: &Config,
    ) -> Self {
        Self::new(
            Arc::new(PlanningStage::new(generator.clone(), config.llm_timeout)),
            Arc::new(SearchStage::new(search, config.search_results_per_query)),
            Arc::new(ExtractionStage::new(generator.clone(), config.llm_timeout)),
            Arc::new(ValidationStage::default()),
            Arc::new(ReportingStage::new(generator, sink, config.llm_timeout)),
        )
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Stage>> {
        self.stages.iter()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    MaxIterations,
    NoPendingLeads,
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub state: InvestigationState,
    pub iterations: u32,
    pub termination: Termination,
}

#[derive(Clone, TypedBuilder)]
pub struct IterationController {
    stages: PassStages,
    #[builder(default = DEFAULT_MAX_ITERATIONS)]
    max_iterations: u32,
    #[builder(default = Arc::new(NoopTelemetry) as Arc<dyn TelemetrySink>)]
    telemetry: Arc<dyn TelemetrySink>,
    #[builder(default)]
    planner: QueryPlanner,
}

impl IterationController {
    pub async fn run(&self, mut state: InvestigationState) -> Result<RunOutcome, DossierError> {
        let max_iterations = self.max_iterations.max(1);
        info!(subject = state.subject.as_str(), max_iterations, "Investigation started");

        let mut iteration = 0;
        let termination = loop {
            iteration += 1;
            state.context.iteration = iteration;
            self.record(&mut state, "controller.iteration_start", json!({"iteration": iteration}));

            self.run_pass(&mut state, iteration).await?;

            let pending = state.pending_leads();
            self.record(
                &mut state,
                "controller.iteration_end",
                json!({"iteration": iteration, "pending_leads": pending.len()}),
            );

            if iteration >= max_iterations {
                break Termination::MaxIterations;
            }
            if pending.is_empty() {
                break Termination::NoPendingLeads;
            }
            self.prepare_next_pass(&mut state, pending);
        };

        info!(
            subject = state.subject.as_str(),
            iterations = iteration,
            termination = ?termination,
            findings = state.findings.len(),
            "Investigation finished"
        );
        Ok(RunOutcome {
            state,
            iterations: iteration,
            termination,
        })
    }

    /// Run against a map-shaped state and hand back the same shape.
    pub async fn run_payload(&self, payload: Value) -> Result<Value, DossierError> {
        let state = state_from_payload(payload)?;
        let outcome = self.run(state).await?;
        state_to_payload(&outcome.state)
    }

    async fn run_pass(&self, state: &mut InvestigationState, iteration: u32) -> Result<(), DossierError> {
        for stage in self.stages.iter() {
            let phase = stage.phase();
            self.telemetry.stage_started(phase, iteration);
            let started = Instant::now();
            let result = stage.run(state).await;
            self.telemetry.stage_finished(phase, iteration, started.elapsed());

            match result {
                Ok(()) => {}
                Err(e) if e.is_fatal() => {
                    warn!(phase = phase.as_str(), error = %e, "Stage aborted the investigation");
                    return Err(e);
                }
                Err(e) => {
                    warn!(phase = phase.as_str(), error = %e, "Stage failed");
                    self.record(
                        state,
                        "controller.stage_error",
                        json!({"phase": phase.as_str(), "error": e.to_string()}),
                    );
                }
            }
        }
        Ok(())
    }

    /// Queue refined queries for the next pass and mark every pending lead
    /// processed, including those past the refinement cap.
    fn prepare_next_pass(&self, state: &mut InvestigationState, pending: Vec<String>) {
        let refined = self.planner.refine_queries(&state.subject, &pending);
        self.record(
            state,
            "controller.prepare_next_iteration",
            json!({"pending_leads": pending, "refined_queries": refined}),
        );
        if !refined.is_empty() {
            state.context.query_seed = refined;
        }
        state.context.processed_leads.extend(pending);
    }

    fn record(&self, state: &mut InvestigationState, event: &str, payload: Value) {
        self.telemetry.event(event, &payload);
        state.record_log(event, payload);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    use crate::pipeline::PassPhase;
    use crate::testing::{RecordingTelemetry, TelemetryRecord};

    /// Records its phase and optionally surfaces leads or fails.
    struct ScriptedStage {
        phase: PassPhase,
        leads_per_pass: Vec<Vec<&'static str>>,
        error: Option<fn() -> DossierError>,
        seen: Arc<Mutex<Vec<(PassPhase, u32)>>>,
    }

    #[async_trait]
    impl Stage for ScriptedStage {
        fn phase(&self) -> PassPhase {
            self.phase
        }

        async fn run(&self, state: &mut InvestigationState) -> Result<(), DossierError> {
            let iteration = state.context.iteration;
            self.seen.lock().unwrap().push((self.phase, iteration));
            if let Some(leads) = self.leads_per_pass.get(iteration as usize - 1) {
                for lead in leads {
                    state.context.identified_leads.push(lead.to_string());
                }
            }
            match self.error {
                Some(make) => Err(make()),
                None => Ok(()),
            }
        }
    }

    fn stages(
        leads_per_pass: Vec<Vec<&'static str>>,
        error: Option<fn() -> DossierError>,
    ) -> (PassStages, Arc<Mutex<Vec<(PassPhase, u32)>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let make = |phase: PassPhase, leads: Vec<Vec<&'static str>>, error| -> Arc<dyn Stage> {
            Arc::new(ScriptedStage {
                phase,
                leads_per_pass: leads,
                error,
                seen: seen.clone(),
            })
        };
        let stages = PassStages::new(
            make(PassPhase::Planning, vec![], None),
            make(PassPhase::Searching, vec![], None),
            make(PassPhase::Extracting, leads_per_pass, error),
            make(PassPhase::Validating, vec![], None),
            make(PassPhase::Reporting, vec![], None),
        );
        (stages, seen)
    }

    fn state() -> InvestigationState {
        InvestigationState::new("Acme", vec!["risk".into()])
    }

    #[tokio::test]
    async fn no_leads_stops_after_one_pass() {
        let (stages, seen) = stages(vec![], None);
        let controller = IterationController::builder().stages(stages).max_iterations(3).build();
        let outcome = controller.run(state()).await.unwrap();

        assert_eq!(outcome.iterations, 1);
        assert_eq!(outcome.termination, Termination::NoPendingLeads);
        let phases: Vec<PassPhase> = seen.lock().unwrap().iter().map(|(p, _)| *p).collect();
        assert_eq!(phases, PassPhase::ORDER.to_vec());
    }

    #[tokio::test]
    async fn iteration_budget_wins_over_pending_leads() {
        let (stages, _) = stages(vec![vec!["Beta"], vec!["Gamma"]], None);
        let controller = IterationController::builder().stages(stages).max_iterations(2).build();
        let outcome = controller.run(state()).await.unwrap();

        assert_eq!(outcome.iterations, 2);
        assert_eq!(outcome.termination, Termination::MaxIterations);
        assert_eq!(outcome.state.context.processed_leads, vec!["Beta"]);
        assert_eq!(outcome.state.pending_leads(), vec!["Gamma"]);
    }

    #[tokio::test]
    async fn next_pass_is_seeded_from_at_most_five_leads() {
        let leads = vec!["L1", "L2", "L3", "L4", "L5", "L6", "L7"];
        let (stages, _) = stages(vec![leads], None);
        let controller = IterationController::builder().stages(stages).max_iterations(2).build();
        let outcome = controller.run(state()).await.unwrap();
        let ctx = &outcome.state.context;

        // the scripted planner never consumes the seed
        assert_eq!(ctx.query_seed.len(), 10);
        assert_eq!(ctx.query_seed[0], "Acme L1 investigation");
        assert_eq!(ctx.processed_leads.len(), 7);
        assert_eq!(outcome.state.events_named("controller.prepare_next_iteration").count(), 1);
    }

    #[tokio::test]
    async fn recoverable_stage_errors_are_logged() {
        let (stages, seen) = stages(vec![], Some(|| DossierError::Provider("flaky".into())));
        let controller = IterationController::builder().stages(stages).build();
        let outcome = controller.run(state()).await.unwrap();

        assert_eq!(outcome.state.events_named("controller.stage_error").count(), 1);
        assert_eq!(seen.lock().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn contract_violations_abort() {
        let (stages, seen) = stages(vec![], Some(|| DossierError::Contract("no subject".into())));
        let controller = IterationController::builder().stages(stages).build();
        let err = controller.run(state()).await.unwrap_err();

        assert!(matches!(err, DossierError::Contract(_)));
        assert_eq!(seen.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn telemetry_sees_every_stage() {
        let (stages, _) = stages(vec![], None);
        let telemetry = Arc::new(RecordingTelemetry::new());
        let controller = IterationController::builder()
            .stages(stages)
            .telemetry(telemetry.clone())
            .build();
        controller.run(state()).await.unwrap();

        let records = telemetry.records();
        let started = records
            .iter()
            .filter(|r| matches!(r, TelemetryRecord::Started(_, 1)))
            .count();
        assert_eq!(started, 5);
        assert!(records.contains(&TelemetryRecord::Event("controller.iteration_end".into())));
    }

    #[tokio::test]
    async fn payloads_are_adapted_at_the_boundary() {
        let (stages, _) = stages(vec![], None);
        let controller = IterationController::builder().stages(stages).build();

        let out = controller
            .run_payload(json!({"state": {"subject": "Acme", "objectives": ["risk"]}}))
            .await
            .unwrap();
        assert_eq!(out["subject"], "Acme");
        assert_eq!(out["context"]["iteration"], 1);

        let err = controller.run_payload(json!(["not", "a", "state"])).await.unwrap_err();
        assert!(matches!(err, DossierError::Contract(_)));
    }
}
