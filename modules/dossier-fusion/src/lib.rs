//! Lexical intelligence fusion: turns raw findings, candidate facts, risk
//! statements and relationship mentions into scored, explainable records.
//!
//! Every function here is pure and infallible on well-typed input.

pub mod connection_graph;
pub mod entity_resolution;
pub mod fact_validation;
pub mod normalize;
pub mod risk_scoring;
pub mod sequence;
pub mod source_quality;

pub use connection_graph::{augment_with_co_mentions, build_connection_graph, GraphOptions};
pub use entity_resolution::{build_entity_index, resolve_entities, ClusteringStrategy, ResolverOptions};
pub use fact_validation::validate_facts;
pub use normalize::{normalize_name, normalize_text};
pub use risk_scoring::{aggregate_risk_scores, build_risk_signals, score_signal};
pub use source_quality::{domain_counts, summarize_source_quality};

/// Round to `places` decimals, correctly rounded from the exact binary value
/// with exact ties going to the even digit.
pub(crate) fn round_to(value: f64, places: usize) -> f64 {
    format!("{value:.places$}").parse().unwrap_or(value)
}
