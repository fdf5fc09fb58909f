//! Entity resolution: cluster raw name mentions into canonical entities.
//!
//! Clustering compares normalized forms with a combined score of
//! Ratcliff/Obershelp sequence similarity (70%) and token Jaccard overlap
//! (30%). The default greedy strategy seeds clusters in first-seen order and
//! is not transitive: if A~B and B~C, C only joins when it passes against the
//! seed. Use [`ClusteringStrategy::SymmetricClosure`] when input order must
//! not matter.

use std::collections::{BTreeSet, HashMap, HashSet};

use dossier_common::{EntityCandidate, EntityMetadata};

use crate::normalize::{initials, normalize_name, tokenize};
use crate::round_to;
use crate::sequence::sequence_ratio;

/// Default combined-score threshold for merging two normalized forms.
pub const DEFAULT_THRESHOLD: f64 = 0.68;

const CLUSTER_SEQUENCE_WEIGHT: f64 = 0.7;
const CLUSTER_TOKEN_WEIGHT: f64 = 0.3;

const ALIAS_SEQUENCE_WEIGHT: f64 = 0.6;
const ALIAS_TOKEN_WEIGHT: f64 = 0.3;
const ALIAS_INITIALS_WEIGHT: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClusteringStrategy {
    /// Seed-and-scan in first-seen order. Output depends on input order.
    #[default]
    Greedy,
    /// Connected components of the "passes threshold" relation. Order-free.
    SymmetricClosure,
}

#[derive(Debug, Clone)]
pub struct ResolverOptions {
    pub threshold: f64,
    pub strategy: ClusteringStrategy,
    /// Per-token weight; tokens not listed weigh 1.0.
    pub word_weights: HashMap<String, f64>,
    /// Original mention → evidence identifiers.
    pub source_index: HashMap<String, Vec<String>>,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            strategy: ClusteringStrategy::default(),
            word_weights: HashMap::new(),
            source_index: HashMap::new(),
        }
    }
}

/// Ratcliff/Obershelp ratio; 0.0 when either side is empty.
fn sequence_similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    sequence_ratio(a, b)
}

fn token_overlap<S: AsRef<str>>(a: &[S], b: &[S]) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let set_a: HashSet<&str> = a.iter().map(AsRef::as_ref).collect();
    let set_b: HashSet<&str> = b.iter().map(AsRef::as_ref).collect();
    let union = set_a.union(&set_b).count();
    if union == 0 {
        return 0.0;
    }
    set_a.intersection(&set_b).count() as f64 / union as f64
}

fn combined_score(a: &str, b: &str) -> f64 {
    let tokens_a: Vec<&str> = a.split_whitespace().collect();
    let tokens_b: Vec<&str> = b.split_whitespace().collect();
    sequence_similarity(a, b) * CLUSTER_SEQUENCE_WEIGHT
        + token_overlap(&tokens_a, &tokens_b) * CLUSTER_TOKEN_WEIGHT
}

/// How well `alias` names the same thing as `candidate`, in [0, 1].
pub fn score_alias_similarity(alias: &str, candidate: &str) -> f64 {
    let tokens_alias = tokenize(alias);
    let tokens_candidate = tokenize(candidate);
    let base = sequence_similarity(&normalize_name(alias), &normalize_name(candidate));
    let overlap = token_overlap(&tokens_alias, &tokens_candidate);
    let initials_match = if initials(&tokens_alias) == initials(&tokens_candidate) {
        1.0
    } else {
        0.0
    };
    let score = base * ALIAS_SEQUENCE_WEIGHT
        + overlap * ALIAS_TOKEN_WEIGHT
        + initials_match * ALIAS_INITIALS_WEIGHT;
    round_to(score.min(1.0), 3)
}

/// Surface forms a mention is likely to appear under: the trimmed mention,
/// its first and last two tokens, its initials, and each token. Sorted.
pub fn generate_aliases(name: &str) -> Vec<String> {
    let tokens = tokenize(name);
    if tokens.is_empty() {
        return Vec::new();
    }

    let mut aliases = BTreeSet::new();
    aliases.insert(name.trim().to_string());
    if tokens.len() >= 2 {
        aliases.insert(tokens[..2].join(" "));
        aliases.insert(tokens[tokens.len() - 2..].join(" "));
    }
    aliases.insert(initials(&tokens));
    aliases.extend(tokens.iter().cloned());
    aliases.retain(|alias| !alias.is_empty());
    aliases.into_iter().collect()
}

fn word_weight_factor(tokens: &[String], weights: &HashMap<String, f64>) -> f64 {
    if tokens.is_empty() {
        return 1.0;
    }
    let total: f64 = tokens
        .iter()
        .map(|token| weights.get(token).copied().unwrap_or(1.0))
        .sum();
    total / tokens.len() as f64
}

/// Normalized forms in first-seen order, each with its original mentions.
fn group_mentions<I, S>(mentions: I) -> Vec<(String, Vec<String>)>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut groups: Vec<(String, Vec<String>)> = Vec::new();
    let mut position: HashMap<String, usize> = HashMap::new();
    for mention in mentions {
        let mention = mention.as_ref().trim();
        if mention.is_empty() {
            continue;
        }
        let normalized = normalize_name(mention);
        if normalized.is_empty() {
            continue;
        }
        match position.get(&normalized) {
            Some(&idx) => groups[idx].1.push(mention.to_string()),
            None => {
                position.insert(normalized.clone(), groups.len());
                groups.push((normalized, vec![mention.to_string()]));
            }
        }
    }
    groups
}

fn greedy_clusters(forms: &[&str], threshold: f64) -> Vec<Vec<usize>> {
    let mut assigned = vec![false; forms.len()];
    let mut clusters = Vec::new();
    for seed in 0..forms.len() {
        if assigned[seed] {
            continue;
        }
        assigned[seed] = true;
        let mut cluster = vec![seed];
        for other in 0..forms.len() {
            if assigned[other] {
                continue;
            }
            if combined_score(forms[seed], forms[other]) >= threshold {
                assigned[other] = true;
                cluster.push(other);
            }
        }
        clusters.push(cluster);
    }
    clusters
}

fn find(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}

fn closure_clusters(forms: &[&str], threshold: f64) -> Vec<Vec<usize>> {
    let mut parent: Vec<usize> = (0..forms.len()).collect();
    for i in 0..forms.len() {
        for j in (i + 1)..forms.len() {
            if combined_score(forms[i], forms[j]) >= threshold {
                let (ri, rj) = (find(&mut parent, i), find(&mut parent, j));
                if ri != rj {
                    // Keep the earliest index as root so clusters order by first mention.
                    parent[ri.max(rj)] = ri.min(rj);
                }
            }
        }
    }

    let mut clusters: Vec<Vec<usize>> = Vec::new();
    let mut root_slot: HashMap<usize, usize> = HashMap::new();
    for i in 0..forms.len() {
        let root = find(&mut parent, i);
        match root_slot.get(&root) {
            Some(&slot) => clusters[slot].push(i),
            None => {
                root_slot.insert(root, clusters.len());
                clusters.push(vec![i]);
            }
        }
    }
    clusters
}

fn candidate_from_cluster(originals: Vec<String>, options: &ResolverOptions) -> EntityCandidate {
    let tokens = tokenize(&originals[0]);
    let canonical = if tokens.is_empty() {
        originals[0].clone()
    } else {
        tokens.join(" ")
    };

    let mut alias_set: BTreeSet<String> = BTreeSet::new();
    for mention in &originals {
        alias_set.extend(generate_aliases(mention));
    }
    alias_set.extend(generate_aliases(&canonical));
    alias_set.remove("");

    let weight_factor = word_weight_factor(&tokens, &options.word_weights);
    let similarity_total: f64 = originals
        .iter()
        .map(|mention| score_alias_similarity(mention, &canonical))
        .sum();
    let average_similarity = similarity_total / originals.len().max(1) as f64;
    let score = round_to((weight_factor * average_similarity).sqrt(), 3).min(1.0);

    let mut sources: Vec<String> = Vec::new();
    for mention in &originals {
        for source in options.source_index.get(mention).into_iter().flatten() {
            if !source.is_empty() && !sources.contains(source) {
                sources.push(source.clone());
            }
        }
    }

    EntityCandidate {
        canonical_name: canonical,
        aliases: alias_set.into_iter().collect(),
        score,
        sources,
        metadata: EntityMetadata {
            mention_count: originals.len(),
            average_similarity: round_to(average_similarity, 3),
        },
    }
}

/// Resolve raw mentions into canonical entities, highest score first.
/// Blank mentions are skipped; an empty or all-blank input yields `[]`.
pub fn resolve_entities<I, S>(mentions: I, options: &ResolverOptions) -> Vec<EntityCandidate>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let groups = group_mentions(mentions);
    if groups.is_empty() {
        return Vec::new();
    }

    let forms: Vec<&str> = groups.iter().map(|(normalized, _)| normalized.as_str()).collect();
    let clusters = match options.strategy {
        ClusteringStrategy::Greedy => greedy_clusters(&forms, options.threshold),
        ClusteringStrategy::SymmetricClosure => closure_clusters(&forms, options.threshold),
    };

    let mut candidates: Vec<EntityCandidate> = clusters
        .into_iter()
        .map(|members| {
            let originals: Vec<String> = members
                .iter()
                .flat_map(|&idx| groups[idx].1.iter().cloned())
                .collect();
            candidate_from_cluster(originals, options)
        })
        .collect();

    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
    candidates
}

/// Lookup from canonical name or alias to canonical name. Canonical names
/// always map to themselves; among aliases the higher-ranked entity wins.
pub fn build_entity_index(
    candidates: &[EntityCandidate],
) -> std::collections::BTreeMap<String, String> {
    let mut index = std::collections::BTreeMap::new();
    for candidate in candidates {
        index.insert(
            candidate.canonical_name.clone(),
            candidate.canonical_name.clone(),
        );
    }
    for candidate in candidates {
        for alias in &candidate.aliases {
            index
                .entry(alias.clone())
                .or_insert_with(|| candidate.canonical_name.clone());
        }
    }
    index
}
