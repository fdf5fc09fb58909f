// Provider wrappers that apply a rate limiter, a per-call timeout and the
// retry policy before delegating.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use dossier_common::{Config, DossierError};

use super::rate_limiter::RateLimiter;
use super::retry::RetryPolicy;
use crate::traits::{GenerationRequest, SearchHit, SearchProvider, TextGenerator};

pub struct LimitedSearch {
    inner: Arc<dyn SearchProvider>,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
    timeout: Duration,
}

impl LimitedSearch {
    pub fn new(
        inner: Arc<dyn SearchProvider>,
        limiter: Arc<RateLimiter>,
        retry: RetryPolicy,
        timeout: Duration,
    ) -> Self {
        Self {
            inner,
            limiter,
            retry,
            timeout,
        }
    }

    /// Rate and timeout from configuration, default retry policy.
    pub fn from_config(inner: Arc<dyn SearchProvider>, config: &Config) -> Self {
        Self::new(
            inner,
            Arc::new(RateLimiter::per_second(config.max_concurrent_requests)),
            RetryPolicy::default(),
            config.request_timeout,
        )
    }
}

#[async_trait]
impl SearchProvider for LimitedSearch {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>, DossierError> {
        self.retry
            .run("search", move || async move {
                self.limiter.acquire().await;
                match tokio::time::timeout(self.timeout, self.inner.search(query, max_results)).await {
                    Ok(result) => result,
                    Err(_) => Err(DossierError::Timeout(format!(
                        "search for {query:?} exceeded {}s",
                        self.timeout.as_secs()
                    ))),
                }
            })
            .await
    }
}

pub struct LimitedGenerator {
    inner: Arc<dyn TextGenerator>,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
}

impl LimitedGenerator {
    pub fn new(inner: Arc<dyn TextGenerator>, limiter: Arc<RateLimiter>, retry: RetryPolicy) -> Self {
        Self {
            inner,
            limiter,
            retry,
        }
    }

    pub fn from_config(inner: Arc<dyn TextGenerator>, config: &Config) -> Self {
        Self::new(
            inner,
            Arc::new(RateLimiter::per_second(config.max_concurrent_requests)),
            RetryPolicy::default(),
        )
    }
}

// Generation timeouts belong to the calling stage, which bounds the whole
// retried call with the configured LLM timeout.
#[async_trait]
impl TextGenerator for LimitedGenerator {
    async fn generate(&self, request: GenerationRequest) -> Result<String, DossierError> {
        self.retry
            .run("generate", move || {
                let request = request.clone();
                async move {
                    self.limiter.acquire().await;
                    self.inner.generate(request).await
                }
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockGenerator, MockSearch};

    #[tokio::test(start_paused = true)]
    async fn transient_search_failures_are_retried_through_the_limiter() {
        let mock = Arc::new(
            MockSearch::new()
                .fail_times(2)
                .on_query("acme", vec![SearchHit::new("Acme", "https://a.com", "s")]),
        );
        let search = LimitedSearch::new(
            mock.clone(),
            Arc::new(RateLimiter::per_second(5)),
            RetryPolicy::default(),
            Duration::from_secs(30),
        );
        let hits = search.search("acme", 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(mock.calls().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_searches_time_out_as_transient_errors() {
        let mock = Arc::new(MockSearch::new().with_delay(Duration::from_secs(60)));
        let search = LimitedSearch::new(
            mock.clone(),
            Arc::new(RateLimiter::per_second(5)),
            RetryPolicy::default(),
            Duration::from_secs(1),
        );
        let err = search.search("acme", 5).await.unwrap_err();
        assert!(matches!(err, DossierError::Timeout(_)));
        assert_eq!(mock.calls().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn generator_passes_requests_through() {
        let mock = Arc::new(MockGenerator::new().on_prompt_containing("plan", "1. search"));
        let generator = LimitedGenerator::new(
            mock.clone(),
            Arc::new(RateLimiter::per_second(5)),
            RetryPolicy::none(),
        );
        let text = generator
            .generate(GenerationRequest::new("make a plan", "system"))
            .await
            .unwrap();
        assert_eq!(text, "1. search");
        assert_eq!(mock.requests().len(), 1);
    }
}
