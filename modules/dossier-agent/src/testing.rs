// Test mocks for the investigation pipeline.
//
// One mock per collaborator boundary:
// - MockSearch (SearchProvider): query→hits map with scripted failures
// - MockGenerator (TextGenerator): prompt-substring→response rules
// - RecordingReportSink (ReportSink): keeps every bundle it is handed
// - RecordingTelemetry (TelemetrySink): keeps every notification

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use dossier_common::DossierError;

use crate::infra::TelemetrySink;
use crate::pipeline::PassPhase;
use crate::traits::{GenerationRequest, ReportBundle, ReportSink, SearchHit, SearchProvider, TextGenerator};

// ---------------------------------------------------------------------------
// MockSearch
// ---------------------------------------------------------------------------

/// Map-based search provider. Unregistered queries return no hits.
/// Builder pattern: `.on_query()`, `.fail_query()`, `.fail_times()`.
pub struct MockSearch {
    results: HashMap<String, Vec<SearchHit>>,
    failing_queries: HashSet<String>,
    transient_failures: Mutex<u32>,
    delay: Option<Duration>,
    calls: Mutex<Vec<String>>,
}

impl MockSearch {
    pub fn new() -> Self {
        Self {
            results: HashMap::new(),
            failing_queries: HashSet::new(),
            transient_failures: Mutex::new(0),
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn on_query(mut self, query: &str, hits: Vec<SearchHit>) -> Self {
        self.results.insert(query.to_string(), hits);
        self
    }

    /// Permanent provider error for this query.
    pub fn fail_query(mut self, query: &str) -> Self {
        self.failing_queries.insert(query.to_string());
        self
    }

    /// The next `n` calls fail with a connection error, whatever the query.
    pub fn fail_times(self, n: u32) -> Self {
        *self.transient_failures.lock().unwrap() = n;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queries in call order, including failed and timed-out calls.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl Default for MockSearch {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SearchProvider for MockSearch {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>, DossierError> {
        self.calls.lock().unwrap().push(query.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        {
            let mut remaining = self.transient_failures.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(DossierError::Connection("connection reset".to_string()));
            }
        }
        if self.failing_queries.contains(query) {
            return Err(DossierError::Provider(format!("search rejected {query:?}")));
        }

        let mut hits = self.results.get(query).cloned().unwrap_or_default();
        hits.truncate(max_results);
        Ok(hits)
    }
}

// ---------------------------------------------------------------------------
// MockGenerator
// ---------------------------------------------------------------------------

/// Rule-based text generator: the first rule whose needle occurs in the
/// prompt answers. Returns `Err` when no rule matches.
pub struct MockGenerator {
    rules: Vec<(String, String)>,
    delay: Option<Duration>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl MockGenerator {
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            delay: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn on_prompt_containing(mut self, needle: &str, response: &str) -> Self {
        self.rules.push((needle.to_string(), response.to_string()));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Default for MockGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TextGenerator for MockGenerator {
    async fn generate(&self, request: GenerationRequest) -> Result<String, DossierError> {
        let response = self
            .rules
            .iter()
            .find(|(needle, _)| request.prompt.contains(needle.as_str()))
            .map(|(_, response)| response.clone());
        self.requests.lock().unwrap().push(request);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        response.ok_or_else(|| DossierError::Provider("no scripted response for prompt".to_string()))
    }
}

// ---------------------------------------------------------------------------
// RecordingReportSink
// ---------------------------------------------------------------------------

pub struct RecordingReportSink {
    bundles: Mutex<Vec<ReportBundle>>,
    fail: bool,
}

impl RecordingReportSink {
    pub fn new() -> Self {
        Self {
            bundles: Mutex::new(Vec::new()),
            fail: false,
        }
    }

    /// A sink whose every write fails.
    pub fn failing() -> Self {
        Self {
            bundles: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn bundles(&self) -> Vec<ReportBundle> {
        self.bundles.lock().unwrap().clone()
    }
}

impl Default for RecordingReportSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReportSink for RecordingReportSink {
    async fn persist(&self, bundle: &ReportBundle) -> Result<BTreeMap<String, String>, DossierError> {
        if self.fail {
            return Err(DossierError::Connection("report store unavailable".to_string()));
        }
        let mut bundles = self.bundles.lock().unwrap();
        bundles.push(bundle.clone());
        let location = format!("memory://reports/{}/{}", bundle.subject, bundles.len());
        Ok(BTreeMap::from([("json".to_string(), location)]))
    }
}

// ---------------------------------------------------------------------------
// RecordingTelemetry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryRecord {
    Started(PassPhase, u32),
    Finished(PassPhase, u32),
    Event(String),
}

#[derive(Default)]
pub struct RecordingTelemetry {
    records: Mutex<Vec<TelemetryRecord>>,
}

impl RecordingTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<TelemetryRecord> {
        self.records.lock().unwrap().clone()
    }
}

impl TelemetrySink for RecordingTelemetry {
    fn stage_started(&self, phase: PassPhase, iteration: u32) {
        self.records.lock().unwrap().push(TelemetryRecord::Started(phase, iteration));
    }

    fn stage_finished(&self, phase: PassPhase, iteration: u32, _elapsed: Duration) {
        self.records.lock().unwrap().push(TelemetryRecord::Finished(phase, iteration));
    }

    fn event(&self, name: &str, _payload: &serde_json::Value) {
        self.records.lock().unwrap().push(TelemetryRecord::Event(name.to_string()));
    }
}
