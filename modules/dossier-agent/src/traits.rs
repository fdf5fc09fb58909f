// Trait abstractions for the collaborators an investigation pass calls out to.
//
// SearchProvider: query in, result records out.
// TextGenerator: plan, extraction and briefing text from a prompt.
// ReportSink: write-only persistence of the final context.
//
// Hosted implementations live outside this crate. Tests use the mocks in
// `crate::testing`.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use dossier_common::{Artifact, DossierError, InvestigationContext, Metadata};

/// One discovery result as a provider returns it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub snippet: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl SearchHit {
    pub fn new(title: &str, url: &str, snippet: &str) -> Self {
        Self {
            title: title.to_string(),
            url: url.to_string(),
            snippet: snippet.to_string(),
            metadata: Metadata::new(),
        }
    }

    /// Artifact for the investigation, `untitled` when the provider gave no
    /// title.
    pub fn into_artifact(self) -> Artifact {
        let title = if self.title.trim().is_empty() {
            "untitled".to_string()
        } else {
            self.title
        };
        Artifact {
            title,
            url: self.url,
            snippet: self.snippet,
            timestamp: None,
            confidence: None,
            metadata: self.metadata,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub system: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>, system: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system: system.into(),
            temperature: 0.2,
            max_tokens: 800,
        }
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// What the reporting stage hands to persistence.
#[derive(Debug, Clone, Serialize)]
pub struct ReportBundle {
    pub subject: String,
    pub objectives: Vec<String>,
    pub iteration: u32,
    pub briefing: Option<String>,
    pub context: InvestigationContext,
}

#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>, DossierError>;
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, request: GenerationRequest) -> Result<String, DossierError>;
}

#[async_trait]
pub trait ReportSink: Send + Sync {
    /// Persist the bundle. Returns artifact name → location.
    async fn persist(&self, bundle: &ReportBundle) -> Result<BTreeMap<String, String>, DossierError>;
}
