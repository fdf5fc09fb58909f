use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use dossier_common::{Config, DossierError, InvestigationState};

use crate::adapter::state_to_payload;
use crate::controller::{IterationController, PassStages, RunOutcome};
use crate::infra::{LimitedGenerator, LimitedSearch, TelemetrySink, TracingTelemetry};
use crate::jobs::{JobRegistry, JobStatus};
use crate::traits::{ReportSink, SearchProvider, TextGenerator};

/// Entry point for running an investigation end to end.
pub struct Investigator {
    controller: IterationController,
}

impl Investigator {
    pub fn new(controller: IterationController) -> Self {
        Self { controller }
    }

    /// Wire the standard pipeline over the given providers.
    pub fn from_config(
        config: &Config,
        search: Arc<dyn SearchProvider>,
        generator: Arc<dyn TextGenerator>,
        sink: Option<Arc<dyn ReportSink>>,
    ) -> Result<Self, DossierError> {
        let llm = config.llm_provider()?;
        let engine = config.search_provider();
        info!(llm = ?llm, search = engine.as_str(), max_iterations = config.max_iterations, "Investigator configured");

        let (search, generator) = limited_providers(config, search, generator);
        let telemetry: Arc<dyn TelemetrySink> = Arc::new(TracingTelemetry);
        let controller = IterationController::builder()
            .stages(PassStages::standard(search, generator, sink, config))
            .max_iterations(config.max_iterations)
            .telemetry(telemetry)
            .build();
        Ok(Self::new(controller))
    }

    pub async fn run(&self, subject: &str, objectives: Vec<String>) -> Result<RunOutcome, DossierError> {
        let subject = subject.trim();
        if subject.is_empty() {
            return Err(DossierError::Contract("subject must not be empty".to_string()));
        }
        let objectives: Vec<String> = objectives
            .into_iter()
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty())
            .collect();
        if objectives.is_empty() {
            return Err(DossierError::Contract("at least one objective is required".to_string()));
        }

        self.controller.run(InvestigationState::new(subject, objectives)).await
    }

    /// Run and record progress, result or failure under `job_id`.
    pub async fn run_tracked(
        &self,
        registry: &JobRegistry,
        job_id: Uuid,
        subject: &str,
        objectives: Vec<String>,
    ) -> Result<RunOutcome, DossierError> {
        registry.set_status(&job_id, JobStatus::Running);
        registry.append_log(&job_id, format!("investigation of {subject} started"));

        let outcome = self.run(subject, objectives).await.and_then(|outcome| {
            let payload = state_to_payload(&outcome.state)?;
            Ok((outcome, payload))
        });

        match outcome {
            Ok((outcome, payload)) => {
                registry.append_log(
                    &job_id,
                    format!("finished after {} pass(es): {:?}", outcome.iterations, outcome.termination),
                );
                registry.complete(&job_id, payload);
                Ok(outcome)
            }
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "Investigation failed");
                registry.fail(&job_id, e.to_string());
                Err(e)
            }
        }
    }
}

/// Each provider gets its own rate limiter, so search traffic never spends
/// generation budget or the reverse.
fn limited_providers(
    config: &Config,
    search: Arc<dyn SearchProvider>,
    generator: Arc<dyn TextGenerator>,
) -> (Arc<dyn SearchProvider>, Arc<dyn TextGenerator>) {
    (
        Arc::new(LimitedSearch::from_config(search, config)),
        Arc::new(LimitedGenerator::from_config(generator, config)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockGenerator, MockSearch};
    use crate::traits::GenerationRequest;

    fn config() -> Config {
        Config {
            openai_api_key: Some("sk-test".into()),
            max_iterations: 1,
            ..Config::default()
        }
    }

    fn investigator() -> Investigator {
        Investigator::from_config(&config(), Arc::new(MockSearch::new()), Arc::new(MockGenerator::new()), None)
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn search_and_generation_are_limited_independently() {
        let config = Config {
            max_concurrent_requests: 1,
            ..config()
        };
        let (search, generator) = limited_providers(
            &config,
            Arc::new(MockSearch::new()),
            Arc::new(MockGenerator::new().on_prompt_containing("plan", "1. search")),
        );

        let start = tokio::time::Instant::now();
        search.search("Acme", 5).await.unwrap();
        generator
            .generate(GenerationRequest::new("make a plan", "system"))
            .await
            .unwrap();
        assert_eq!(start.elapsed(), std::time::Duration::ZERO);

        // a second search waits for its own bucket to refill
        search.search("Acme", 5).await.unwrap();
        assert!(start.elapsed() >= std::time::Duration::from_millis(999));
    }

    #[test]
    fn missing_llm_credentials_fail_construction() {
        let result = Investigator::from_config(
            &Config::default(),
            Arc::new(MockSearch::new()),
            Arc::new(MockGenerator::new()),
            None,
        );
        assert!(matches!(result, Err(DossierError::Config(_))));
    }

    #[tokio::test]
    async fn blank_objectives_are_rejected() {
        let err = investigator().run("Acme", vec!["  ".into()]).await.unwrap_err();
        assert!(matches!(err, DossierError::Contract(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn tracked_runs_land_in_the_registry() {
        let registry = JobRegistry::default();
        let id = registry.create("Acme");
        let outcome = investigator()
            .run_tracked(&registry, id, "Acme", vec!["fraud".into()])
            .await
            .unwrap();

        assert_eq!(outcome.iterations, 1);
        let job = registry.get(&id).unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.result.unwrap()["subject"], "Acme");
        assert_eq!(job.logs.len(), 2);
    }

    #[tokio::test]
    async fn tracked_contract_failures_mark_the_job_failed() {
        let registry = JobRegistry::default();
        let id = registry.create("Acme");
        let err = investigator().run_tracked(&registry, id, "Acme", vec![]).await.unwrap_err();

        assert!(matches!(err, DossierError::Contract(_)));
        assert_eq!(registry.get(&id).unwrap().status, JobStatus::Failed);
    }
}
