//! Connection graph: normalize raw relationship records into nodes and edges
//! and compute degree centrality and density.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde_json::Value;
use tracing::debug;

use dossier_common::{Artifact, ConnectionGraphSummary, GraphEdge, GraphNode, Metadata, RawConnection};

use crate::round_to;

/// Findings scanned by the co-mention fallback.
pub const CO_MENTION_SCAN_LIMIT: usize = 50;

pub const CO_MENTION_RELATION: &str = "co_mentioned";

const TOKEN_TRIM: &[char] = &['.', ',', '(', ')', '[', ']', '{', '}', ':', ';', '"', '\''];

#[derive(Debug, Clone)]
pub struct GraphOptions {
    pub compute_metrics: bool,
    /// Node name → kind, replacing the default `entity`.
    pub node_kinds: HashMap<String, String>,
}

impl Default for GraphOptions {
    fn default() -> Self {
        Self {
            compute_metrics: true,
            node_kinds: HashMap::new(),
        }
    }
}

/// First non-blank scalar under any of `keys`, trimmed.
fn first_text(record: &RawConnection, keys: &[&str]) -> String {
    for key in keys {
        let text = match record.get(*key) {
            Some(Value::String(s)) => s.trim().to_string(),
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::Bool(b)) => b.to_string(),
            _ => continue,
        };
        if !text.is_empty() {
            return text;
        }
    }
    String::new()
}

fn parse_weight(record: &RawConnection) -> f64 {
    let raw = ["weight", "score"]
        .iter()
        .find_map(|key| record.get(*key).filter(|v| !v.is_null()));
    let weight = match raw {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(1.0),
        Some(Value::String(s)) => s.trim().parse::<f64>().unwrap_or(1.0),
        _ => 1.0,
    };
    if weight.is_finite() {
        weight.max(0.0)
    } else {
        1.0
    }
}

/// Coerce one raw record into an edge. `None` for a missing endpoint or a
/// self-loop.
pub fn normalize_connection(record: &RawConnection) -> Option<GraphEdge> {
    let source = first_text(record, &["source", "from"]);
    let target = first_text(record, &["target", "to"]);
    if source.is_empty() || target.is_empty() || source == target {
        return None;
    }

    let relation = first_text(record, &["relation", "type"]);
    let relation = if relation.is_empty() {
        GraphEdge::DEFAULT_RELATION.to_string()
    } else {
        relation
    };

    let mut metadata: Metadata = record
        .get("metadata")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    if let Some(evidence) = record.get("evidence").filter(|v| is_present(v)) {
        metadata
            .entry("evidence".to_string())
            .or_insert_with(|| evidence.clone());
    }

    Some(GraphEdge {
        source,
        target,
        relation,
        weight: parse_weight(record),
        metadata,
    })
}

fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
        _ => true,
    }
}

pub fn parse_connection_records<'a, I>(records: I) -> Vec<GraphEdge>
where
    I: IntoIterator<Item = &'a RawConnection>,
{
    records.into_iter().filter_map(normalize_connection).collect()
}

/// Degree ÷ max degree per node. Parallel edges each count.
fn degree_centrality(edges: &[GraphEdge]) -> BTreeMap<String, f64> {
    let mut degree: BTreeMap<String, u32> = BTreeMap::new();
    for edge in edges {
        *degree.entry(edge.source.clone()).or_default() += 1;
        *degree.entry(edge.target.clone()).or_default() += 1;
    }
    let max_degree = degree.values().copied().max().unwrap_or(0).max(1) as f64;
    degree
        .into_iter()
        .map(|(node, count)| (node, round_to(count as f64 / max_degree, 4)))
        .collect()
}

fn density(node_count: usize, edges: &[GraphEdge]) -> f64 {
    if node_count <= 1 {
        return 0.0;
    }
    let possible = (node_count * (node_count - 1)) as f64 / 2.0;
    if possible <= 0.0 {
        return 0.0;
    }
    let pairs: BTreeSet<(&str, &str)> = edges
        .iter()
        .map(|e| {
            let (a, b) = (e.source.as_str(), e.target.as_str());
            if a <= b {
                (a, b)
            } else {
                (b, a)
            }
        })
        .collect();
    round_to((pairs.len() as f64 / possible).min(1.0), 4)
}

pub fn build_connection_graph<'a, I>(connections: I, options: &GraphOptions) -> ConnectionGraphSummary
where
    I: IntoIterator<Item = &'a RawConnection>,
{
    let edges = parse_connection_records(connections);

    let mut nodes: Vec<GraphNode> = Vec::new();
    let mut position: HashMap<String, usize> = HashMap::new();
    for edge in &edges {
        for endpoint in [&edge.source, &edge.target] {
            let idx = *position.entry(endpoint.clone()).or_insert_with(|| {
                nodes.push(GraphNode::new(endpoint.clone()));
                nodes.len() - 1
            });
            let node = &mut nodes[idx];
            node.count += 1;
            if let Some(kind) = options.node_kinds.get(endpoint) {
                node.kind = kind.clone();
            }
        }
    }

    if !options.compute_metrics {
        return ConnectionGraphSummary {
            nodes,
            edges,
            centrality: BTreeMap::new(),
            density: 0.0,
        };
    }

    let centrality = degree_centrality(&edges);
    let density = density(nodes.len(), &edges);
    debug!(nodes = nodes.len(), edges = edges.len(), density, "Connection graph built");

    ConnectionGraphSummary {
        nodes,
        edges,
        centrality,
        density,
    }
}

/// Edges at or above `min_weight`, optionally restricted to one relation.
pub fn filter_graph_edges(edges: &[GraphEdge], min_weight: f64, relation: Option<&str>) -> Vec<GraphEdge> {
    edges
        .iter()
        .filter(|edge| edge.weight >= min_weight)
        .filter(|edge| relation.map_or(true, |r| edge.relation == r))
        .cloned()
        .collect()
}

/// Distinct capitalized words of a finding's title and snippet, in order.
fn capitalized_words(finding: &Artifact) -> Vec<String> {
    let text = finding.text();
    let mut words: Vec<String> = Vec::new();
    for token in text.split_whitespace() {
        if !token.chars().next().is_some_and(char::is_uppercase) {
            continue;
        }
        let word = token.trim_matches(TOKEN_TRIM).trim();
        if word.chars().count() > 1 && !words.iter().any(|w| w == word) {
            words.push(word.to_string());
        }
    }
    words
}

/// Heuristic edges for a graph with no structured edges: each finding whose
/// text has two or more distinct capitalized words links the first two.
/// Centrality and density are left as computed from structured edges.
/// Returns how many edges were added.
pub fn augment_with_co_mentions(summary: &mut ConnectionGraphSummary, findings: &[Artifact]) -> usize {
    if !summary.edges.is_empty() || findings.is_empty() {
        return 0;
    }

    let mut added = 0;
    for finding in findings.iter().take(CO_MENTION_SCAN_LIMIT) {
        let words = capitalized_words(finding);
        let [source, target, ..] = words.as_slice() else {
            continue;
        };

        for endpoint in [source, target] {
            match summary.nodes.iter_mut().find(|n| &n.name == endpoint) {
                Some(node) => node.count += 1,
                None => {
                    let mut node = GraphNode::new(endpoint.clone());
                    node.count = 1;
                    summary.nodes.push(node);
                }
            }
        }

        let mut metadata = Metadata::new();
        metadata.insert("heuristic".to_string(), Value::Bool(true));
        metadata.insert("confidence".to_string(), Value::String("low".to_string()));
        summary.edges.push(GraphEdge {
            source: source.clone(),
            target: target.clone(),
            relation: CO_MENTION_RELATION.to_string(),
            weight: 1.0,
            metadata,
        });
        added += 1;
    }
    added
}
