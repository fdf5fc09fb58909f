use std::env;
use std::time::Duration;

use tracing::{info, warn};

use crate::error::DossierError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    OpenAi,
    Gemini,
    Ollama,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchEngine {
    Tavily,
    SerpApi,
    Web,
}

impl SearchEngine {
    pub fn as_str(self) -> &'static str {
        match self {
            SearchEngine::Tavily => "tavily",
            SearchEngine::SerpApi => "serpapi",
            SearchEngine::Web => "web",
        }
    }
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Provider credentials
    pub openai_api_key: Option<String>,
    pub google_api_key: Option<String>,
    pub llama_model_path: Option<String>,
    pub tavily_api_key: Option<String>,
    pub serpapi_api_key: Option<String>,

    // Runtime
    pub request_timeout: Duration,
    pub llm_timeout: Duration,
    pub max_concurrent_requests: u32,
    pub default_search_engine: String,
    pub max_iterations: u32,
    pub search_results_per_query: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            google_api_key: None,
            llama_model_path: None,
            tavily_api_key: None,
            serpapi_api_key: None,
            request_timeout: Duration::from_secs(30),
            llm_timeout: Duration::from_secs(20),
            max_concurrent_requests: 5,
            default_search_engine: "web".to_string(),
            max_iterations: 2,
            search_results_per_query: 10,
        }
    }
}

impl Config {
    /// Load configuration from environment variables. Secrets are optional
    /// here; a missing provider credential fails when the provider is chosen.
    pub fn from_env() -> Result<Self, DossierError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load from an arbitrary key lookup so tests need not touch the process
    /// environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, DossierError> {
        let defaults = Self::default();
        let secret = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let max_concurrent_requests =
            parse_or(&lookup, "MAX_CONCURRENT_REQUESTS", defaults.max_concurrent_requests)?;
        if max_concurrent_requests == 0 {
            return Err(DossierError::Config(
                "MAX_CONCURRENT_REQUESTS must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            openai_api_key: secret("OPENAI_API_KEY"),
            google_api_key: secret("GOOGLE_API_KEY"),
            llama_model_path: secret("LLAMA_MODEL_PATH"),
            tavily_api_key: secret("TAVILY_API_KEY"),
            serpapi_api_key: secret("SERPAPI_API_KEY"),
            request_timeout: Duration::from_secs(parse_or(
                &lookup,
                "REQUEST_TIMEOUT",
                defaults.request_timeout.as_secs(),
            )?),
            llm_timeout: Duration::from_secs(parse_or(
                &lookup,
                "LLM_TIMEOUT",
                defaults.llm_timeout.as_secs(),
            )?),
            max_concurrent_requests,
            default_search_engine: lookup("DEFAULT_SEARCH_ENGINE")
                .map(|v| v.trim().to_lowercase())
                .unwrap_or(defaults.default_search_engine),
            max_iterations: parse_or(&lookup, "MAX_ITERATIONS", defaults.max_iterations)?,
            search_results_per_query: parse_or(
                &lookup,
                "SEARCH_RESULTS_PER_QUERY",
                max_concurrent_requests as usize * 2,
            )?,
        })
    }

    /// Pick the text-generation provider by available credential.
    pub fn llm_provider(&self) -> Result<LlmProvider, DossierError> {
        if self.openai_api_key.is_some() {
            return Ok(LlmProvider::OpenAi);
        }
        if self.google_api_key.is_some() {
            return Ok(LlmProvider::Gemini);
        }
        if self.llama_model_path.is_some() {
            return Ok(LlmProvider::Ollama);
        }
        Err(DossierError::Config(
            "no LLM provider is configured (set OPENAI_API_KEY, GOOGLE_API_KEY or LLAMA_MODEL_PATH)"
                .to_string(),
        ))
    }

    /// Map the configured search engine to a provider, falling back when the
    /// requested provider has no credential.
    pub fn search_provider(&self) -> SearchEngine {
        let requested = self.default_search_engine.as_str();
        let mut engine = match requested {
            "tavily" => SearchEngine::Tavily,
            "serpapi" | "google" => SearchEngine::SerpApi,
            "web" => SearchEngine::Web,
            _ => SearchEngine::Tavily,
        };

        if engine == SearchEngine::Tavily && self.tavily_api_key.is_none() {
            warn!(requested, missing_secret = "TAVILY_API_KEY", fallback = "serpapi", "Search provider fallback");
            engine = SearchEngine::SerpApi;
        }
        if engine == SearchEngine::SerpApi && self.serpapi_api_key.is_none() {
            warn!(requested, missing_secret = "SERPAPI_API_KEY", fallback = "web", "Search provider fallback");
            engine = SearchEngine::Web;
        }
        engine
    }

    /// Log which credentials are present without their values.
    pub fn log_redacted(&self) {
        info!(
            openai = self.openai_api_key.is_some(),
            google = self.google_api_key.is_some(),
            llama = self.llama_model_path.is_some(),
            tavily = self.tavily_api_key.is_some(),
            serpapi = self.serpapi_api_key.is_some(),
            request_timeout_secs = self.request_timeout.as_secs(),
            llm_timeout_secs = self.llm_timeout.as_secs(),
            max_concurrent_requests = self.max_concurrent_requests,
            search_engine = self.default_search_engine.as_str(),
            max_iterations = self.max_iterations,
            search_results_per_query = self.search_results_per_query,
            "Configuration loaded"
        );
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T, DossierError>
where
    T: std::str::FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) if raw.trim().is_empty() => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| DossierError::Config(format!("{key} must be a number, got {raw:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.max_concurrent_requests, 5);
        assert_eq!(config.search_results_per_query, 10);
        assert_eq!(config.max_iterations, 2);
        assert_eq!(config.llm_timeout, Duration::from_secs(20));
    }

    #[test]
    fn results_per_query_follow_concurrency_unless_set() {
        let config = Config::from_lookup(lookup(&[("MAX_CONCURRENT_REQUESTS", "3")])).unwrap();
        assert_eq!(config.search_results_per_query, 6);

        let config = Config::from_lookup(lookup(&[
            ("MAX_CONCURRENT_REQUESTS", "3"),
            ("SEARCH_RESULTS_PER_QUERY", "4"),
        ]))
        .unwrap();
        assert_eq!(config.search_results_per_query, 4);
    }

    #[test]
    fn malformed_numbers_are_configuration_errors() {
        let err = Config::from_lookup(lookup(&[("REQUEST_TIMEOUT", "soon")])).unwrap_err();
        assert!(matches!(err, DossierError::Config(_)));

        let err = Config::from_lookup(lookup(&[("MAX_CONCURRENT_REQUESTS", "0")])).unwrap_err();
        assert!(matches!(err, DossierError::Config(_)));
    }

    #[test]
    fn missing_llm_credentials_fail_provider_selection() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert!(matches!(config.llm_provider(), Err(DossierError::Config(_))));

        let config = Config::from_lookup(lookup(&[
            ("GOOGLE_API_KEY", "g"),
            ("LLAMA_MODEL_PATH", "/models/llama.gguf"),
        ]))
        .unwrap();
        assert_eq!(config.llm_provider().unwrap(), LlmProvider::Gemini);
    }

    #[test]
    fn search_provider_falls_back_without_credentials() {
        let config = Config::from_lookup(lookup(&[("DEFAULT_SEARCH_ENGINE", "tavily")])).unwrap();
        assert_eq!(config.search_provider(), SearchEngine::Web);

        let config = Config::from_lookup(lookup(&[
            ("DEFAULT_SEARCH_ENGINE", "google"),
            ("SERPAPI_API_KEY", "s"),
        ]))
        .unwrap();
        assert_eq!(config.search_provider(), SearchEngine::SerpApi);

        let config = Config::from_lookup(lookup(&[
            ("DEFAULT_SEARCH_ENGINE", "tavily"),
            ("TAVILY_API_KEY", "t"),
        ]))
        .unwrap();
        assert_eq!(config.search_provider(), SearchEngine::Tavily);
    }
}
