use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::{info, warn};

use dossier_common::{
    ConnectionGraphSummary, DossierError, InvestigationState, RiskScoreSummary, RiskSignal,
    ValidationResult,
};

use super::{PassPhase, Stage};
use crate::traits::{GenerationRequest, ReportBundle, ReportSink, TextGenerator};

const MAX_REPORTED_FACTS: usize = 6;
const MAX_REPORTED_SIGNALS: usize = 6;
const MAX_REPORTED_INFLUENCERS: usize = 5;
const MAX_REPORTED_LEADS: usize = 8;

const REPORTING_SYSTEM: &str = "\
You are generating a due-diligence briefing. \
Synthesize validated facts, risks, and connections into a concise narrative. \
Highlight confidence levels, unresolved questions, and recommended next steps.";

/// Drafts the narrative briefing and hands the final context to the
/// report sink, if one is configured.
pub struct ReportingStage {
    generator: Arc<dyn TextGenerator>,
    sink: Option<Arc<dyn ReportSink>>,
    llm_timeout: Duration,
}

impl ReportingStage {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        sink: Option<Arc<dyn ReportSink>>,
        llm_timeout: Duration,
    ) -> Self {
        Self {
            generator,
            sink,
            llm_timeout,
        }
    }

    pub(crate) fn compose_prompt(state: &InvestigationState) -> String {
        let ctx = &state.context;
        let leads = if state.leads.is_empty() {
            &ctx.identified_leads
        } else {
            &state.leads
        };
        format!(
            "Subject: {}\n\
             Objectives: {}\n\
             Validated Facts:\n{}\n\
             Risk Assessment:\n{}\n\
             Connection Highlights:\n{}\n\
             Recommended Next Leads:\n{}\n\
             Draft a structured briefing with sections:\n\
             1. Executive Overview\n\
             2. Validated Findings (with confidence)\n\
             3. Risk Outlook (severity + confidence)\n\
             4. Relationship Insights\n\
             5. Recommended Analyst Actions\n\
             Keep it under 450 words.",
            state.subject,
            state.objectives.join(", "),
            format_facts(&ctx.validated_facts),
            format_risks(&ctx.risk_signals, &ctx.risk_summary),
            format_connections(&ctx.connection_graph),
            format_items(leads, MAX_REPORTED_LEADS),
        )
    }

    async fn draft(&self, state: &InvestigationState) -> Result<String, DossierError> {
        let request = GenerationRequest::new(Self::compose_prompt(state), REPORTING_SYSTEM).temperature(0.25);
        match tokio::time::timeout(self.llm_timeout, self.generator.generate(request)).await {
            Ok(result) => result,
            Err(_) => Err(DossierError::Timeout(format!(
                "briefing generation exceeded {}s",
                self.llm_timeout.as_secs()
            ))),
        }
    }

    async fn persist(&self, state: &mut InvestigationState) -> usize {
        let Some(sink) = &self.sink else {
            return 0;
        };
        let bundle = ReportBundle {
            subject: state.subject.clone(),
            objectives: state.objectives.clone(),
            iteration: state.context.iteration,
            briefing: state.context.report_draft.clone(),
            context: state.context.clone(),
        };
        match sink.persist(&bundle).await {
            Ok(artifacts) if artifacts.is_empty() => 0,
            Ok(artifacts) => {
                state.record_log("reporting.artifacts", json!({"artifacts": artifacts}));
                let count = artifacts.len();
                state.context.report_artifacts.extend(artifacts);
                count
            }
            Err(e) => {
                warn!(error = %e, "Report persistence failed");
                state.record_log("reporting.persist_failed", json!({"error": e.to_string()}));
                0
            }
        }
    }
}

fn format_facts(facts: &[ValidationResult]) -> String {
    let lines: Vec<String> = facts
        .iter()
        .take(MAX_REPORTED_FACTS)
        .map(|f| {
            format!(
                "- {} (confidence: {}, mentions: {}, domains: {})",
                f.fact, f.confidence, f.support_mentions, f.unique_domains
            )
        })
        .collect();
    if lines.is_empty() {
        "- No validated facts available.".to_string()
    } else {
        lines.join("\n")
    }
}

fn format_risks(signals: &[RiskSignal], summary: &RiskScoreSummary) -> String {
    let mut lines = Vec::new();
    if !summary.signals.is_empty() {
        lines.push(format!(
            "*Overall score:* {:.2} | *Peak severity:* {}",
            summary.overall_score,
            summary.highest_severity_label()
        ));
    }
    for signal in signals.iter().take(MAX_REPORTED_SIGNALS) {
        lines.push(format!(
            "- {} [{}] severity={}, confidence={}. {}",
            signal.label, signal.category, signal.severity, signal.confidence, signal.rationale
        ));
    }
    if lines.is_empty() {
        "- No discrete risk signals recorded.".to_string()
    } else {
        lines.join("\n")
    }
}

fn format_connections(graph: &ConnectionGraphSummary) -> String {
    if graph.nodes.is_empty() && graph.edges.is_empty() {
        return "- No relationship data.".to_string();
    }
    let mut lines = vec![format!(
        "- Nodes: {}, Edges: {}, Density: {:.3}",
        graph.nodes.len(),
        graph.edges.len(),
        graph.density
    )];
    let top = graph.top_central(MAX_REPORTED_INFLUENCERS);
    if !top.is_empty() {
        lines.push("- Key influencers:".to_string());
        for (name, score) in top {
            lines.push(format!("  - {name} (centrality {score:.3})"));
        }
    }
    lines.join("\n")
}

fn format_items(items: &[String], limit: usize) -> String {
    let lines: Vec<String> = items
        .iter()
        .filter(|item| !item.trim().is_empty())
        .take(limit)
        .map(|item| format!("- {item}"))
        .collect();
    if lines.is_empty() {
        "- No items.".to_string()
    } else {
        lines.join("\n")
    }
}

#[async_trait]
impl Stage for ReportingStage {
    fn phase(&self) -> PassPhase {
        PassPhase::Reporting
    }

    async fn run(&self, state: &mut InvestigationState) -> Result<(), DossierError> {
        state.record_log(
            "reporting.start",
            json!({
                "findings": state.findings.len(),
                "validated": state.context.validated_facts.len(),
                "risks": state.risks.len(),
            }),
        );

        match self.draft(state).await {
            Ok(summary) => {
                state.record_log("reporting.summary", json!({"length": summary.chars().count()}));
                state.context.report_draft = Some(summary);
            }
            Err(e) => {
                warn!(error = %e, "Briefing generation failed");
                state.record_log("reporting.summary_error", json!({"error": e.to_string()}));
            }
        }

        let artifact_count = self.persist(state).await;
        let summary_length = state.context.report_draft.as_deref().map_or(0, |d| d.chars().count());
        info!(summary_length, artifact_count, "Reporting complete");
        state.record_log(
            "reporting.complete",
            json!({"summary_length": summary_length, "artifact_count": artifact_count}),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockGenerator, RecordingReportSink};
    use dossier_common::{Confidence, GraphEdge, GraphNode, Severity};

    fn reported_state() -> InvestigationState {
        let mut state = InvestigationState::new("Acme", vec!["sanctions".into(), "fraud".into()]);
        state.context.validated_facts = (0..8)
            .map(|i| ValidationResult {
                fact: format!("fact {i}"),
                normalized_fact: format!("fact {i}"),
                confidence: Confidence::Low,
                support_mentions: 1,
                unique_domains: 1,
                evidence: Vec::new(),
            })
            .collect();
        state.context.risk_signals = vec![RiskSignal {
            label: "fraud inquiry".into(),
            category: "legal".into(),
            severity: Severity::High,
            confidence: Confidence::Low,
            rationale: "Identified as legal risk with high severity.".into(),
            supporting_facts: Vec::new(),
            sources: Vec::new(),
        }];
        state.context.risk_summary = dossier_fusion::aggregate_risk_scores(&state.context.risk_signals);
        state.context.connection_graph = ConnectionGraphSummary {
            nodes: vec![GraphNode::new("Acme"), GraphNode::new("Beta")],
            edges: vec![GraphEdge {
                source: "Acme".into(),
                target: "Beta".into(),
                relation: "owns".into(),
                weight: 1.0,
                metadata: Default::default(),
            }],
            centrality: [("Acme".to_string(), 1.0), ("Beta".to_string(), 1.0)].into(),
            density: 1.0,
        };
        state.context.identified_leads = vec!["Beta".into()];
        state
    }

    #[test]
    fn prompt_caps_each_section() {
        let prompt = ReportingStage::compose_prompt(&reported_state());
        assert!(prompt.contains("Objectives: sanctions, fraud"));
        assert!(prompt.contains("- fact 5 (confidence: low, mentions: 1, domains: 1)"));
        assert!(!prompt.contains("fact 6"));
        assert!(prompt.contains("*Overall score:* 0.26 | *Peak severity:* high"));
        assert!(prompt.contains("- fraud inquiry [legal] severity=high, confidence=low."));
        assert!(prompt.contains("- Nodes: 2, Edges: 1, Density: 1.000"));
        assert!(prompt.contains("  - Acme (centrality 1.000)"));
        assert!(prompt.contains("Recommended Next Leads:\n- Beta\n"));
    }

    #[test]
    fn empty_context_uses_placeholders() {
        let prompt = ReportingStage::compose_prompt(&InvestigationState::new("Acme", vec![]));
        assert!(prompt.contains("- No validated facts available."));
        assert!(prompt.contains("- No discrete risk signals recorded."));
        assert!(prompt.contains("- No relationship data."));
        assert!(prompt.contains("- No items."));
    }

    #[tokio::test]
    async fn briefing_and_artifacts_are_stored() {
        let generator = Arc::new(MockGenerator::new().on_prompt_containing("Draft a structured briefing", "Briefing"));
        let sink = Arc::new(RecordingReportSink::new());
        let stage = ReportingStage::new(generator, Some(sink.clone()), Duration::from_secs(5));
        let mut state = reported_state();
        stage.run(&mut state).await.unwrap();

        assert_eq!(state.context.report_draft.as_deref(), Some("Briefing"));
        let bundles = sink.bundles();
        assert_eq!(bundles.len(), 1);
        assert_eq!(bundles[0].briefing.as_deref(), Some("Briefing"));
        assert_eq!(state.context.report_artifacts.len(), 1);
        assert_eq!(state.events_named("reporting.artifacts").count(), 1);
    }

    #[tokio::test]
    async fn failed_briefing_and_sink_are_logged() {
        let sink = Arc::new(RecordingReportSink::failing());
        let stage = ReportingStage::new(Arc::new(MockGenerator::new()), Some(sink), Duration::from_secs(5));
        let mut state = reported_state();
        stage.run(&mut state).await.unwrap();

        assert!(state.context.report_draft.is_none());
        assert!(state.context.report_artifacts.is_empty());
        assert_eq!(state.events_named("reporting.summary_error").count(), 1);
        assert_eq!(state.events_named("reporting.persist_failed").count(), 1);
        assert_eq!(state.events_named("reporting.complete").count(), 1);
    }
}
