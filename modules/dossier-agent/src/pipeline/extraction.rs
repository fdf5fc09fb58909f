use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use dossier_common::{Artifact, CandidateFact, DossierError, InvestigationState, RawConnection};

use super::{excerpt, PassPhase, Stage};
use crate::adapter::json_kind;
use crate::traits::{GenerationRequest, TextGenerator};

/// Most recent findings shown to the analyst model per pass.
pub const DEFAULT_EXTRACTION_WINDOW: usize = 4;

const SNIPPET_CHARS: usize = 200;

const EXTRACTION_SYSTEM: &str = "\
You are a due-diligence analyst. \
Return strict JSON with keys facts, leads, risks, connections.";

/// What the model returns for a window of findings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ExtractionPayload {
    /// Verifiable statements about the subject
    #[serde(default, deserialize_with = "lenient_facts")]
    pub facts: Vec<CandidateFact>,
    /// Follow-up search phrases or entity names
    #[serde(default, deserialize_with = "lenient_strings")]
    pub leads: Vec<String>,
    /// Potential risk indicators
    #[serde(default, deserialize_with = "lenient_strings")]
    pub risks: Vec<String>,
    /// Relationship objects, e.g. {"source": "...", "target": "...", "relation": "..."}
    #[serde(default, deserialize_with = "lenient_objects")]
    pub connections: Vec<RawConnection>,
}

impl ExtractionPayload {
    /// Parse a model response, tolerating Markdown code fences.
    pub fn parse(raw: &str) -> Result<Self, DossierError> {
        let cleaned = strip_code_fence(raw);
        if cleaned.is_empty() {
            return Err(DossierError::MalformedPayload("empty response".to_string()));
        }
        Ok(serde_json::from_str(cleaned)?)
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty() && self.leads.is_empty() && self.risks.is_empty() && self.connections.is_empty()
    }
}

fn strip_code_fence(raw: &str) -> &str {
    let mut cleaned = raw.trim();
    if let Some(rest) = cleaned.strip_prefix("```") {
        // Drop the language tag line, if any.
        cleaned = match rest.split_once('\n') {
            Some((_, body)) => body,
            None => rest,
        };
    }
    if let Some(body) = cleaned.trim_end().strip_suffix("```") {
        cleaned = body;
    }
    cleaned.trim()
}

/// Accept an array, a stringified array, or null. Any other shape counts as
/// empty so the remaining keys still parse.
fn lenient_array<'de, D>(deserializer: D) -> Result<Vec<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::Array(items) => Ok(items),
        Value::Null => Ok(Vec::new()),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return Ok(Vec::new());
            }
            match serde_json::from_str::<Value>(trimmed) {
                Ok(Value::Array(items)) => Ok(items),
                _ => Ok(vec![Value::String(s)]),
            }
        }
        other => {
            debug!(kind = json_kind(&other), "Ignoring non-array extraction field");
            Ok(Vec::new())
        }
    }
}

fn lenient_strings<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_array(deserializer)?
        .into_iter()
        .filter_map(|item| match item {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            _ => None,
        })
        .collect())
}

fn lenient_facts<'de, D>(deserializer: D) -> Result<Vec<CandidateFact>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_array(deserializer)?
        .into_iter()
        .filter_map(|item| match item {
            Value::String(s) if !s.trim().is_empty() => Some(CandidateFact::Text(s)),
            Value::Object(map) => Some(CandidateFact::Structured(map)),
            _ => None,
        })
        .collect())
}

fn lenient_objects<'de, D>(deserializer: D) -> Result<Vec<RawConnection>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_array(deserializer)?
        .into_iter()
        .filter_map(|item| match item {
            Value::Object(map) => Some(map),
            _ => None,
        })
        .collect())
}

/// Asks the model for facts, leads, risks and connections in the latest
/// findings and merges them into the investigation.
pub struct ExtractionStage {
    generator: Arc<dyn TextGenerator>,
    window: usize,
    llm_timeout: Duration,
}

impl ExtractionStage {
    pub fn new(generator: Arc<dyn TextGenerator>, llm_timeout: Duration) -> Self {
        Self {
            generator,
            window: DEFAULT_EXTRACTION_WINDOW,
            llm_timeout,
        }
    }

    pub fn with_window(mut self, window: usize) -> Self {
        self.window = window.max(1);
        self
    }

    fn compose_prompt(subject: &str, findings: &[Artifact]) -> String {
        let entries: Vec<String> = findings
            .iter()
            .map(|f| format!("- {} :: {} (source: {})", f.title, excerpt(&f.snippet, SNIPPET_CHARS), f.url))
            .collect();
        format!(
            "Subject: {subject}\n\
             Context findings:\n{}\n\
             Return JSON with keys:\n\
             facts: list of strings describing verifiable facts.\n\
             leads: list of follow-up search phrases or entities.\n\
             risks: list of potential risk indicators.\n\
             connections: list of objects describing relationships.\n",
            entries.join("\n")
        )
    }

    fn merge(state: &mut InvestigationState, payload: ExtractionPayload) {
        for fact in &payload.facts {
            state.record_log("extraction.fact", json!({"fact": fact.text()}));
        }
        state.context.extracted_facts.extend(payload.facts);

        for lead in payload.leads {
            state.add_lead(&lead);
            if !state.context.identified_leads.contains(&lead) {
                state.context.identified_leads.push(lead);
            }
        }
        for risk in payload.risks {
            state.add_risk(&risk);
            state.context.identified_risks.push(risk);
        }
        for connection in payload.connections {
            state.add_connection(connection);
        }
    }
}

#[async_trait]
impl Stage for ExtractionStage {
    fn phase(&self) -> PassPhase {
        PassPhase::Extracting
    }

    async fn run(&self, state: &mut InvestigationState) -> Result<(), DossierError> {
        let start = state.findings.len().saturating_sub(self.window);
        let window = &state.findings[start..];
        if window.is_empty() {
            state.record_log("extraction.no_findings", json!({}));
            return Ok(());
        }

        let request = GenerationRequest::new(Self::compose_prompt(&state.subject, window), EXTRACTION_SYSTEM)
            .temperature(0.05)
            .max_tokens(500);
        let window_len = window.len();

        let raw = match tokio::time::timeout(self.llm_timeout, self.generator.generate(request)).await {
            Err(_) => {
                warn!(timeout_secs = self.llm_timeout.as_secs(), "Extraction timed out");
                state.record_log("extraction.invoke_timeout", json!({}));
                return Ok(());
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Extraction call failed");
                state.record_log("extraction.invoke_error", json!({"error": e.to_string()}));
                return Ok(());
            }
            Ok(Ok(raw)) if raw.trim().is_empty() => {
                state.record_log("extraction.empty_response", json!({}));
                return Ok(());
            }
            Ok(Ok(raw)) => raw,
        };

        let payload = match ExtractionPayload::parse(&raw) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, raw = %excerpt(&raw, 200), "Extraction response was not JSON");
                state.record_log(
                    "extraction.parse_error",
                    json!({"error": e.to_string(), "raw": excerpt(&raw, 200)}),
                );
                ExtractionPayload::default()
            }
        };

        let (facts, leads, risks, connections) = (
            payload.facts.len(),
            payload.leads.len(),
            payload.risks.len(),
            payload.connections.len(),
        );
        Self::merge(state, payload);

        info!(window = window_len, facts, leads, risks, connections, "Extraction complete");
        state.record_log(
            "extraction.complete",
            json!({"facts": facts, "leads": leads, "risks": risks, "connections": connections}),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockGenerator;

    fn state_with_findings(n: usize) -> InvestigationState {
        let mut state = InvestigationState::new("Acme", vec!["risk".into()]);
        for i in 0..n {
            state.add_finding(Artifact::new(
                format!("Finding {i}"),
                format!("https://news.example/{i}"),
                "snippet",
            ));
        }
        state
    }

    #[test]
    fn fenced_json_is_accepted() {
        let raw = "```json\n{\"facts\": [\"Acme was fined\"], \"leads\": [\"Beta\"]}\n```";
        let payload = ExtractionPayload::parse(raw).unwrap();
        assert_eq!(payload.facts, vec![CandidateFact::Text("Acme was fined".into())]);
        assert_eq!(payload.leads, vec!["Beta"]);
        assert!(payload.risks.is_empty());
    }

    #[test]
    fn wrong_typed_entries_are_dropped() {
        let raw = r#"{
            "facts": ["a", 3, {"claim": "b"}],
            "leads": ["Beta", null, " ", 7],
            "risks": "[\"fraud inquiry\"]",
            "connections": [{"source": "Acme", "target": "Beta"}, "Acme-Beta"]
        }"#;
        let payload = ExtractionPayload::parse(raw).unwrap();
        assert_eq!(payload.facts.len(), 2);
        assert_eq!(payload.leads, vec!["Beta"]);
        assert_eq!(payload.risks, vec!["fraud inquiry"]);
        assert_eq!(payload.connections.len(), 1);
    }

    #[test]
    fn one_wrong_typed_key_does_not_empty_the_payload() {
        let raw = r#"{
            "facts": ["Acme was fined"],
            "leads": 5,
            "risks": {"level": "high"},
            "connections": true
        }"#;
        let payload = ExtractionPayload::parse(raw).unwrap();
        assert_eq!(payload.facts, vec![CandidateFact::Text("Acme was fined".into())]);
        assert!(payload.leads.is_empty());
        assert!(payload.risks.is_empty());
        assert!(payload.connections.is_empty());
    }

    #[test]
    fn non_json_is_malformed() {
        assert!(matches!(
            ExtractionPayload::parse("Sure! Here are the facts..."),
            Err(DossierError::MalformedPayload(_))
        ));
        assert!(ExtractionPayload::parse("[1, 2]").is_err());
    }

    #[tokio::test]
    async fn prompt_covers_only_the_latest_window() {
        let generator = Arc::new(MockGenerator::new().on_prompt_containing("Subject: Acme", "{}"));
        let stage = ExtractionStage::new(generator.clone(), Duration::from_secs(5));
        let mut state = state_with_findings(6);
        stage.run(&mut state).await.unwrap();

        let prompt = &generator.requests()[0].prompt;
        assert!(!prompt.contains("Finding 1 "));
        assert!(prompt.contains("Finding 2 "));
        assert!(prompt.contains("Finding 5 "));
    }

    #[tokio::test]
    async fn extracted_items_are_merged_into_state() {
        let response = r#"{"facts": ["Acme was fined"], "leads": ["Beta Holdings", "Beta Holdings"],
            "risks": ["fraud inquiry"], "connections": [{"source": "Acme", "target": "Beta Holdings"}]}"#;
        let generator = Arc::new(MockGenerator::new().on_prompt_containing("Subject: Acme", response));
        let stage = ExtractionStage::new(generator, Duration::from_secs(5));
        let mut state = state_with_findings(2);
        stage.run(&mut state).await.unwrap();

        assert_eq!(state.context.extracted_facts.len(), 1);
        assert_eq!(state.leads, vec!["Beta Holdings"]);
        assert_eq!(state.context.identified_leads, vec!["Beta Holdings"]);
        assert_eq!(state.risks, vec!["fraud inquiry"]);
        assert_eq!(state.context.identified_risks, vec!["fraud inquiry"]);
        assert_eq!(state.connections.len(), 1);
        assert_eq!(state.events_named("extraction.fact").count(), 1);
    }

    #[tokio::test]
    async fn malformed_response_degrades_to_empty() {
        let generator = Arc::new(MockGenerator::new().on_prompt_containing("Subject: Acme", "not json at all"));
        let stage = ExtractionStage::new(generator, Duration::from_secs(5));
        let mut state = state_with_findings(1);
        stage.run(&mut state).await.unwrap();

        assert_eq!(state.events_named("extraction.parse_error").count(), 1);
        assert!(state.context.extracted_facts.is_empty());
        assert_eq!(state.events_named("extraction.complete").count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_leaves_state_unchanged() {
        let generator = Arc::new(
            MockGenerator::new()
                .on_prompt_containing("Subject: Acme", r#"{"leads": ["Beta"]}"#)
                .with_delay(Duration::from_secs(30)),
        );
        let stage = ExtractionStage::new(generator, Duration::from_secs(20));
        let mut state = state_with_findings(1);
        stage.run(&mut state).await.unwrap();

        assert_eq!(state.events_named("extraction.invoke_timeout").count(), 1);
        assert!(state.leads.is_empty());
        assert!(state.context.identified_leads.is_empty());
    }

    #[tokio::test]
    async fn no_findings_skips_the_model() {
        let generator = Arc::new(MockGenerator::new());
        let stage = ExtractionStage::new(generator.clone(), Duration::from_secs(5));
        let mut state = state_with_findings(0);
        stage.run(&mut state).await.unwrap();

        assert!(generator.requests().is_empty());
        assert_eq!(state.events_named("extraction.no_findings").count(), 1);
    }
}
