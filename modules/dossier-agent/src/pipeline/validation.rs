use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{info, warn};

use dossier_common::{
    ConnectionGraphSummary, DossierError, EntityCandidate, InvestigationState, RawConnection,
    RiskScoreSummary, RiskSignal, ValidationResult,
};
use dossier_fusion::{
    aggregate_risk_scores, augment_with_co_mentions, build_connection_graph, build_entity_index,
    build_risk_signals, domain_counts, resolve_entities, summarize_source_quality, validate_facts,
    GraphOptions, ResolverOptions,
};

use super::{PassPhase, Stage};

/// Validated facts echoed into the event log per pass.
const MAX_FACT_LOGS: usize = 10;

const TOP_ENTITY_LOGS: usize = 10;

/// Cross-checks extracted intelligence against the findings and derives
/// risk scores, the connection graph, resolved entities and source quality.
#[derive(Debug, Clone, Default)]
pub struct ValidationStage {
    graph: GraphOptions,
    resolver: ResolverOptions,
}

impl ValidationStage {
    pub fn new(graph: GraphOptions, resolver: ResolverOptions) -> Self {
        Self { graph, resolver }
    }

    fn validate_facts(state: &mut InvestigationState) -> Vec<ValidationResult> {
        let results = validate_facts(&state.findings, &state.context.extracted_facts);
        for result in results.iter().take(MAX_FACT_LOGS) {
            state.record_log(
                "validation.fact",
                json!({
                    "fact": result.fact,
                    "confidence": result.confidence,
                    "support_mentions": result.support_mentions,
                    "unique_domains": result.unique_domains,
                }),
            );
        }
        results
    }

    fn score_risks(
        risks: &[String],
        validated: &[ValidationResult],
    ) -> Result<(Vec<RiskSignal>, RiskScoreSummary), DossierError> {
        let signals = build_risk_signals(risks, validated);
        let summary = aggregate_risk_scores(&signals);
        check_unit("overall risk score", summary.overall_score)?;
        for category in &summary.category_breakdown {
            check_unit(&category.category, category.score)?;
        }
        Ok((signals, summary))
    }

    fn build_graph(&self, state: &InvestigationState) -> Result<(ConnectionGraphSummary, usize), DossierError> {
        let mut graph = build_connection_graph(&state.connections, &self.graph);
        check_unit("graph density", graph.density)?;
        for (name, score) in &graph.centrality {
            check_unit(name, *score)?;
        }
        let fallback = augment_with_co_mentions(&mut graph, &state.findings);
        Ok((graph, fallback))
    }

    fn resolve(&self, state: &InvestigationState) -> Result<Vec<EntityCandidate>, DossierError> {
        let mut mentions: Vec<&str> = Vec::new();
        let names = state
            .leads
            .iter()
            .chain(&state.context.identified_leads)
            .chain(state.context.connection_graph.nodes.iter().map(|n| &n.name));
        for name in names {
            if !mentions.contains(&name.as_str()) {
                mentions.push(name);
            }
        }

        let options = ResolverOptions {
            source_index: evidence_index(&state.connections),
            ..self.resolver.clone()
        };
        let entities = resolve_entities(mentions, &options);
        for entity in &entities {
            check_unit(&entity.canonical_name, entity.score)?;
        }
        Ok(entities)
    }
}

/// Endpoint name → evidence strings of the connections that mention it.
fn evidence_index(connections: &[RawConnection]) -> HashMap<String, Vec<String>> {
    let mut index: HashMap<String, Vec<String>> = HashMap::new();
    for connection in connections {
        let evidence = match connection.get("evidence") {
            Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
            Some(Value::Null) | None => continue,
            Some(Value::String(_)) => continue,
            Some(other) => other.to_string(),
        };
        for keys in [["source", "from"], ["target", "to"]] {
            let endpoint = keys
                .iter()
                .find_map(|key| connection.get(*key).and_then(Value::as_str))
                .map(str::trim)
                .unwrap_or_default();
            if !endpoint.is_empty() {
                index.entry(endpoint.to_string()).or_default().push(evidence.clone());
            }
        }
    }
    index
}

fn check_unit(what: &str, value: f64) -> Result<(), DossierError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(DossierError::Analysis(format!("{what} out of range: {value}")))
    }
}

#[async_trait]
impl Stage for ValidationStage {
    fn phase(&self) -> PassPhase {
        PassPhase::Validating
    }

    async fn run(&self, state: &mut InvestigationState) -> Result<(), DossierError> {
        state.record_log(
            "validation.start",
            json!({
                "findings": state.findings.len(),
                "candidate_facts": state.context.extracted_facts.len(),
                "risks": state.risks.len(),
                "connections": state.connections.len(),
            }),
        );

        let validated = Self::validate_facts(state);

        match Self::score_risks(&state.risks, &validated) {
            Ok((signals, summary)) => {
                state.record_log(
                    "validation.risk_summary",
                    json!({
                        "overall_score": summary.overall_score,
                        "highest_severity": summary.highest_severity_label(),
                        "signal_count": signals.len(),
                    }),
                );
                state.context.risk_signals = signals;
                state.context.risk_summary = summary;
            }
            Err(e) => {
                warn!(error = %e, "Risk scoring failed");
                state.record_log("validation.risk_scoring_error", json!({"error": e.to_string()}));
                state.context.risk_signals = Vec::new();
                state.context.risk_summary = RiskScoreSummary::default();
            }
        }
        state.context.validated_facts = validated;

        match self.build_graph(state) {
            Ok((graph, fallback)) => {
                state.record_log(
                    "validation.connection_graph_summary",
                    json!({
                        "nodes": graph.nodes.len(),
                        "edges": graph.edges.len(),
                        "density": graph.density,
                    }),
                );
                if fallback > 0 {
                    info!(added = fallback, "Connection graph populated from co-mentions");
                    state.record_log(
                        "validation.connection_graph.fallback_populated",
                        json!({"added_edges": fallback}),
                    );
                }
                state.context.connection_graph = graph;
            }
            Err(e) => {
                warn!(error = %e, "Connection graph failed");
                state.record_log("validation.connection_graph_error", json!({"error": e.to_string()}));
                state.context.connection_graph = ConnectionGraphSummary::default();
            }
        }

        match self.resolve(state) {
            Ok(entities) => {
                let top: Vec<&str> = entities
                    .iter()
                    .take(TOP_ENTITY_LOGS)
                    .map(|e| e.canonical_name.as_str())
                    .collect();
                state.record_log(
                    "validation.entities_resolved",
                    json!({"count": entities.len(), "top": top}),
                );
                state.context.entity_index = build_entity_index(&entities);
                state.context.resolved_entities = entities;
            }
            Err(e) => {
                warn!(error = %e, "Entity resolution failed");
                state.record_log("validation.entity_resolution_error", json!({"error": e.to_string()}));
                state.context.resolved_entities = Vec::new();
                state.context.entity_index.clear();
            }
        }

        let counts = domain_counts(&state.findings);
        state.context.source_quality = summarize_source_quality(&counts);
        state.context.source_domain_counts = counts;

        info!(
            validated = state.context.validated_facts.len(),
            risk_signals = state.context.risk_signals.len(),
            entities = state.context.resolved_entities.len(),
            domains = state.context.source_domain_counts.len(),
            "Validation complete"
        );
        state.record_log(
            "validation.complete",
            json!({
                "validated": state.context.validated_facts.len(),
                "risk_signals": state.context.risk_signals.len(),
                "entities": state.context.resolved_entities.len(),
                "domains": state.context.source_domain_counts.len(),
            }),
        );
        Ok(())
    }
}
