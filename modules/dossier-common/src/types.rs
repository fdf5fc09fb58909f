use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Free-form metadata attached to findings, nodes and edges.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// A relationship record as proposed by extraction, before normalization.
pub type RawConnection = serde_json::Map<String, serde_json::Value>;

// --- Tiers ---

/// Ordinal rating of evidentiary support: `none < low < medium < high`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    #[default]
    None,
    Low,
    Medium,
    High,
}

impl Confidence {
    pub fn weight(self) -> f64 {
        match self {
            Confidence::High => 1.0,
            Confidence::Medium => 0.6,
            Confidence::Low => 0.35,
            Confidence::None => 0.1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Confidence::High => "high",
            Confidence::Medium => "medium",
            Confidence::Low => "low",
            Confidence::None => "none",
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Confidence {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "high" => Ok(Confidence::High),
            "medium" => Ok(Confidence::Medium),
            "low" => Ok(Confidence::Low),
            "none" => Ok(Confidence::None),
            other => Err(format!("unknown confidence tier: {other}")),
        }
    }
}

/// Ordinal rating of a risk's seriousness: `low < medium < high < critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn weight(self) -> f64 {
        match self {
            Severity::Critical => 1.0,
            Severity::High => 0.75,
            Severity::Medium => 0.5,
            Severity::Low => 0.25,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "critical" => Ok(Severity::Critical),
            "high" => Ok(Severity::High),
            "medium" => Ok(Severity::Medium),
            "low" => Ok(Severity::Low),
            other => Err(format!("unknown severity tier: {other}")),
        }
    }
}

// --- Findings ---

/// One raw search result. Immutable once added to an investigation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub title: String,
    pub url: String,
    pub snippet: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Artifact {
    pub fn new(title: impl Into<String>, url: impl Into<String>, snippet: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            snippet: snippet.into(),
            timestamp: None,
            confidence: None,
            metadata: Metadata::new(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// Source domain: the `domain` metadata entry when present, otherwise the
    /// URL host without a leading `www.`. Empty when neither is available.
    pub fn domain(&self) -> String {
        if let Some(domain) = self.metadata.get("domain").and_then(|v| v.as_str()) {
            let domain = domain.trim().to_lowercase();
            if !domain.is_empty() {
                return domain;
            }
        }
        url::Url::parse(&self.url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_lowercase()))
            .map(|h| h.strip_prefix("www.").map(str::to_string).unwrap_or(h))
            .unwrap_or_default()
    }

    /// Title and snippet joined, the text every lexical matcher scans.
    pub fn text(&self) -> String {
        format!("{} {}", self.title, self.snippet)
    }
}

// --- Fact validation ---

/// A fact proposed by extraction: free text, or an object the model
/// returned instead of a string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum CandidateFact {
    Text(String),
    Structured(serde_json::Map<String, serde_json::Value>),
}

impl CandidateFact {
    const TEXT_KEYS: [&'static str; 4] = ["fact", "text", "statement", "claim"];

    /// The statement to validate. Structured fragments use their first
    /// textual field and fall back to compact JSON.
    pub fn text(&self) -> String {
        match self {
            CandidateFact::Text(s) => s.trim().to_string(),
            CandidateFact::Structured(map) => Self::TEXT_KEYS
                .iter()
                .find_map(|key| map.get(*key).and_then(|v| v.as_str()))
                .map(|s| s.trim().to_string())
                .unwrap_or_else(|| serde_json::Value::Object(map.clone()).to_string()),
        }
    }
}

impl From<&str> for CandidateFact {
    fn from(s: &str) -> Self {
        CandidateFact::Text(s.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceRef {
    pub title: String,
    pub url: String,
    pub domain: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub fact: String,
    pub normalized_fact: String,
    pub confidence: Confidence,
    pub support_mentions: u32,
    pub unique_domains: u32,
    #[serde(default)]
    pub evidence: Vec<EvidenceRef>,
}

// --- Entity resolution ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityMetadata {
    pub mention_count: usize,
    pub average_similarity: f64,
}

/// Canonical entity derived from a cluster of raw name mentions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityCandidate {
    pub canonical_name: String,
    pub aliases: Vec<String>,
    pub score: f64,
    pub sources: Vec<String>,
    pub metadata: EntityMetadata,
}

// --- Connection graph ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub name: String,
    pub kind: String,
    pub count: u32,
    #[serde(default)]
    pub metadata: Metadata,
}

impl GraphNode {
    pub const DEFAULT_KIND: &'static str = "entity";

    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: Self::DEFAULT_KIND.to_string(),
            count: 0,
            metadata: Metadata::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    pub relation: String,
    pub weight: f64,
    #[serde(default)]
    pub metadata: Metadata,
}

impl GraphEdge {
    pub const DEFAULT_RELATION: &'static str = "associated_with";
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectionGraphSummary {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    /// Node name → normalized degree centrality. Serialized sorted by name.
    pub centrality: std::collections::BTreeMap<String, f64>,
    pub density: f64,
}

impl ConnectionGraphSummary {
    /// Nodes ranked by centrality, highest first, ties by name.
    pub fn top_central(&self, limit: usize) -> Vec<(&str, f64)> {
        let mut ranked: Vec<(&str, f64)> = self
            .centrality
            .iter()
            .map(|(name, score)| (name.as_str(), *score))
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked.truncate(limit);
        ranked
    }
}

// --- Risk scoring ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskSignal {
    pub label: String,
    pub category: String,
    pub severity: Severity,
    pub confidence: Confidence,
    pub rationale: String,
    #[serde(default)]
    pub supporting_facts: Vec<String>,
    #[serde(default)]
    pub sources: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryScore {
    pub category: String,
    pub score: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskScoreSummary {
    pub overall_score: f64,
    /// Severity of the highest-scoring signal; serialized as `"none"` when
    /// there are no signals.
    #[serde(with = "severity_or_none")]
    pub highest_severity: Option<Severity>,
    /// Sorted by score, highest first.
    pub category_breakdown: Vec<CategoryScore>,
    pub signals: Vec<RiskSignal>,
}

impl RiskScoreSummary {
    pub fn highest_severity_label(&self) -> &'static str {
        self.highest_severity.map(Severity::as_str).unwrap_or("none")
    }
}

mod severity_or_none {
    use super::Severity;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Severity>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(value.map(Severity::as_str).unwrap_or("none"))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Severity>, D::Error> {
        let label = String::deserialize(d)?;
        if label == "none" {
            return Ok(None);
        }
        label.parse().map(Some).map_err(serde::de::Error::custom)
    }
}

// --- Source quality ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainCount {
    pub domain: String,
    pub count: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceQuality {
    pub unique_domains: u32,
    pub top_domains: Vec<DomainCount>,
    pub diversity_score: f64,
}
