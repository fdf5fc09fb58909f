use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{info, warn};

use dossier_common::{DossierError, InvestigationState};

use super::{PassPhase, Stage};
use crate::traits::SearchProvider;

/// Runs the pass's active queries and collects hits as findings.
pub struct SearchStage {
    provider: Arc<dyn SearchProvider>,
    max_results: usize,
}

impl SearchStage {
    pub fn new(provider: Arc<dyn SearchProvider>, max_results: usize) -> Self {
        Self {
            provider,
            max_results,
        }
    }
}

#[async_trait]
impl Stage for SearchStage {
    fn phase(&self) -> PassPhase {
        PassPhase::Searching
    }

    async fn run(&self, state: &mut InvestigationState) -> Result<(), DossierError> {
        let queries = state.context.active_queries.clone();
        if queries.is_empty() {
            info!("No queries to search");
            state.record_log("search.no_queries", json!({}));
            return Ok(());
        }

        let before = state.findings.len();
        for query in &queries {
            let hits = match self.provider.search(query, self.max_results).await {
                Ok(hits) => hits,
                Err(e) => {
                    warn!(query = query.as_str(), error = %e, "Search failed");
                    state.record_log("search.error", json!({"query": query, "error": e.to_string()}));
                    continue;
                }
            };

            if hits.is_empty() {
                state.record_log("search.no_results", json!({"query": query}));
                continue;
            }

            let returned = hits.len();
            let mut added = 0;
            for hit in hits {
                if state.add_finding(hit.into_artifact()) {
                    added += 1;
                }
            }
            info!(query = query.as_str(), returned, added, "Search completed");
        }

        let total = state.findings.len();
        state.record_log(
            "search.summary",
            json!({"total_findings": total, "new_findings": total - before}),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockSearch;
    use crate::traits::SearchHit;

    fn state_with_queries(queries: &[&str]) -> InvestigationState {
        let mut state = InvestigationState::new("Acme", vec!["risk".into()]);
        state.context.active_queries = queries.iter().map(|q| q.to_string()).collect();
        state
    }

    #[tokio::test]
    async fn hits_become_findings_without_url_duplicates() {
        let search = Arc::new(
            MockSearch::new()
                .on_query("acme biography", vec![
                    SearchHit::new("", "https://a.com/1", "Founded in 1990"),
                    SearchHit::new("Acme profile", "https://b.com/2", "Profile"),
                ])
                .on_query("acme controversy", vec![SearchHit::new("Dup", "https://a.com/1", "again")]),
        );
        let stage = SearchStage::new(search.clone(), 4);
        let mut state = state_with_queries(&["acme biography", "acme controversy"]);
        stage.run(&mut state).await.unwrap();

        assert_eq!(state.findings.len(), 2);
        assert_eq!(state.findings[0].title, "untitled");
        assert_eq!(search.calls(), vec!["acme biography", "acme controversy"]);
        let summary = state.events_named("search.summary").next().unwrap();
        assert_eq!(summary.payload["new_findings"], 2);
    }

    #[tokio::test]
    async fn failed_and_empty_queries_are_logged_and_skipped() {
        let search = Arc::new(
            MockSearch::new()
                .fail_query("broken")
                .on_query("works", vec![SearchHit::new("t", "https://a.com", "s")]),
        );
        let stage = SearchStage::new(search, 4);
        let mut state = state_with_queries(&["broken", "empty", "works"]);
        stage.run(&mut state).await.unwrap();

        assert_eq!(state.findings.len(), 1);
        assert_eq!(state.events_named("search.error").count(), 1);
        assert_eq!(state.events_named("search.no_results").count(), 1);
    }

    #[tokio::test]
    async fn no_queries_is_a_logged_no_op() {
        let stage = SearchStage::new(Arc::new(MockSearch::new()), 4);
        let mut state = state_with_queries(&[]);
        stage.run(&mut state).await.unwrap();
        assert_eq!(state.events_named("search.no_queries").count(), 1);
        assert!(state.events_named("search.summary").next().is_none());
    }
}
