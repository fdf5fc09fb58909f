//! Investigation state handed from stage to stage within a pass.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{
    Artifact, CandidateFact, ConnectionGraphSummary, DomainCount, EntityCandidate, RawConnection,
    RiskScoreSummary, RiskSignal, SourceQuality, ValidationResult,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub seq: u32,
    pub ts: DateTime<Utc>,
    pub event: String,
    pub payload: serde_json::Value,
}

/// Derived artifacts each stage accumulates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InvestigationContext {
    pub iteration: u32,
    pub investigation_plan: Option<String>,
    /// Refined queries queued for the next pass.
    pub query_seed: Vec<String>,
    /// Queries the current pass searches.
    pub active_queries: Vec<String>,

    pub extracted_facts: Vec<CandidateFact>,
    pub identified_leads: Vec<String>,
    pub identified_risks: Vec<String>,
    pub processed_leads: Vec<String>,

    pub validated_facts: Vec<ValidationResult>,
    pub risk_signals: Vec<RiskSignal>,
    pub risk_summary: RiskScoreSummary,
    pub connection_graph: ConnectionGraphSummary,
    pub resolved_entities: Vec<EntityCandidate>,
    /// Alias or canonical name → canonical name.
    pub entity_index: BTreeMap<String, String>,
    pub source_domain_counts: Vec<DomainCount>,
    pub source_quality: SourceQuality,

    pub report_draft: Option<String>,
    pub report_artifacts: BTreeMap<String, String>,

    /// Anything a caller attaches that no stage owns.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestigationState {
    pub subject: String,
    pub objectives: Vec<String>,
    #[serde(default)]
    pub findings: Vec<Artifact>,
    #[serde(default)]
    pub leads: Vec<String>,
    #[serde(default)]
    pub risks: Vec<String>,
    #[serde(default)]
    pub connections: Vec<RawConnection>,
    #[serde(default)]
    pub context: InvestigationContext,
    #[serde(default)]
    pub logs: Vec<LogEntry>,
}

impl InvestigationState {
    pub fn new(subject: impl Into<String>, objectives: Vec<String>) -> Self {
        Self {
            subject: subject.into(),
            objectives,
            findings: Vec::new(),
            leads: Vec::new(),
            risks: Vec::new(),
            connections: Vec::new(),
            context: InvestigationContext::default(),
            logs: Vec::new(),
        }
    }

    /// Append a finding unless one with the same non-empty URL is already
    /// present. Returns whether it was added.
    pub fn add_finding(&mut self, artifact: Artifact) -> bool {
        if !artifact.url.is_empty() && self.findings.iter().any(|f| f.url == artifact.url) {
            return false;
        }
        self.findings.push(artifact);
        true
    }

    pub fn add_lead(&mut self, lead: &str) {
        let lead = lead.trim();
        if !lead.is_empty() && !self.leads.iter().any(|l| l == lead) {
            self.leads.push(lead.to_string());
        }
    }

    pub fn add_risk(&mut self, risk: &str) {
        self.risks.push(risk.to_string());
    }

    pub fn add_connection(&mut self, connection: RawConnection) {
        self.connections.push(connection);
    }

    /// Append an entry to the stage event log.
    pub fn record_log(&mut self, event: &str, payload: serde_json::Value) {
        let seq = self.logs.len() as u32;
        self.logs.push(LogEntry {
            seq,
            ts: Utc::now(),
            event: event.to_string(),
            payload,
        });
    }

    pub fn events_named<'a>(&'a self, event: &'a str) -> impl Iterator<Item = &'a LogEntry> + 'a {
        self.logs.iter().filter(move |entry| entry.event == event)
    }

    /// Leads surfaced by extraction that no pass has chased yet, in
    /// first-seen order.
    pub fn pending_leads(&self) -> Vec<String> {
        let mut pending: Vec<String> = Vec::new();
        for lead in &self.context.identified_leads {
            if !self.context.processed_leads.contains(lead) && !pending.contains(lead) {
                pending.push(lead.clone());
            }
        }
        pending
    }
}
