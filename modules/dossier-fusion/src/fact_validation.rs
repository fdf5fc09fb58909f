//! Fact validation: corroborate candidate facts against collected findings.
//!
//! Support is lexical. A finding supports a fact when its normalized text
//! contains the normalized fact as a phrase, or when it covers at least
//! [`KEY_TOKEN_COVERAGE`] of the fact's key tokens.

use std::collections::HashSet;

use dossier_common::{Artifact, CandidateFact, Confidence, EvidenceRef, ValidationResult};

use crate::normalize::normalize_text;

/// Share of a fact's key tokens a finding must contain to count as support.
pub const KEY_TOKEN_COVERAGE: f64 = 0.6;

const MIN_KEY_TOKEN_LEN: usize = 3;

const FILLER_WORDS: &[&str] = &[
    "the", "and", "for", "with", "was", "were", "has", "have", "had", "that", "this", "from",
    "into", "are", "its", "his", "her", "their", "been", "which", "who", "not", "but", "also",
];

fn key_tokens(normalized: &str) -> Vec<&str> {
    let mut tokens: Vec<&str> = Vec::new();
    for token in normalized.split_whitespace() {
        if token.len() >= MIN_KEY_TOKEN_LEN && !FILLER_WORDS.contains(&token) && !tokens.contains(&token) {
            tokens.push(token);
        }
    }
    tokens
}

/// Normalized text and token set of one finding, computed once per call.
struct IndexedFinding<'a> {
    artifact: &'a Artifact,
    text: String,
    domain: String,
}

impl IndexedFinding<'_> {
    fn supports(&self, normalized_fact: &str, keys: &[&str]) -> bool {
        if keys.is_empty() {
            return false;
        }
        if contains_phrase(&self.text, normalized_fact) {
            return true;
        }
        let tokens: HashSet<&str> = self.text.split_whitespace().collect();
        let hits = keys.iter().filter(|k| tokens.contains(*k)).count();
        hits as f64 / keys.len() as f64 >= KEY_TOKEN_COVERAGE
    }
}

/// Whole-word phrase containment on space-normalized text.
fn contains_phrase(haystack: &str, phrase: &str) -> bool {
    if phrase.is_empty() {
        return false;
    }
    format!(" {haystack} ").contains(&format!(" {phrase} "))
}

fn tier(support_mentions: u32, unique_domains: u32) -> Confidence {
    if unique_domains >= 3 {
        Confidence::High
    } else if unique_domains >= 2 || support_mentions >= 3 {
        Confidence::Medium
    } else if support_mentions >= 1 {
        Confidence::Low
    } else {
        Confidence::None
    }
}

/// One result per candidate, in candidate order. Empty when either input is
/// empty.
pub fn validate_facts(findings: &[Artifact], candidates: &[CandidateFact]) -> Vec<ValidationResult> {
    if findings.is_empty() || candidates.is_empty() {
        return Vec::new();
    }

    let indexed: Vec<IndexedFinding> = findings
        .iter()
        .map(|artifact| IndexedFinding {
            artifact,
            text: normalize_text(&artifact.text()),
            domain: artifact.domain(),
        })
        .collect();

    candidates
        .iter()
        .map(|candidate| {
            let fact = candidate.text();
            let normalized_fact = normalize_text(&fact);
            let keys = key_tokens(&normalized_fact);

            let mut evidence = Vec::new();
            let mut domains: Vec<&str> = Vec::new();
            for finding in indexed.iter().filter(|f| f.supports(&normalized_fact, &keys)) {
                if !finding.domain.is_empty() && !domains.contains(&finding.domain.as_str()) {
                    domains.push(&finding.domain);
                }
                evidence.push(EvidenceRef {
                    title: finding.artifact.title.clone(),
                    url: finding.artifact.url.clone(),
                    domain: finding.domain.clone(),
                });
            }

            let support_mentions = evidence.len() as u32;
            let unique_domains = domains.len() as u32;
            ValidationResult {
                confidence: tier(support_mentions, unique_domains),
                fact,
                normalized_fact,
                support_mentions,
                unique_domains,
                evidence,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finding(url: &str, snippet: &str) -> Artifact {
        Artifact::new("Report", url, snippet)
    }

    #[test]
    fn empty_inputs_yield_no_results() {
        assert!(validate_facts(&[], &["Acme was fined".into()]).is_empty());
        assert!(validate_facts(&[finding("https://a.com", "x")], &[]).is_empty());
    }

    #[test]
    fn tiers_follow_distinct_domains() {
        let findings = vec![
            finding("https://a.com/1", "Regulators said Acme was fined in 2021."),
            finding("https://www.b.com/2", "In 2021 Acme was fined by the regulator"),
            finding("https://c.org/3", "acme was FINED, officials confirmed"),
        ];
        let results = validate_facts(&findings, &["Acme was fined".into()]);
        assert_eq!(results[0].confidence, Confidence::High);
        assert_eq!(results[0].support_mentions, 3);
        assert_eq!(results[0].unique_domains, 3);
        assert_eq!(results[0].evidence[1].domain, "b.com");
    }

    #[test]
    fn repeated_single_domain_support_is_medium() {
        let findings = vec![
            finding("https://a.com/1", "Acme fined"),
            finding("https://a.com/2", "Acme fined again"),
            finding("https://a.com/3", "Acme fined twice"),
        ];
        let results = validate_facts(&findings, &["Acme fined".into()]);
        assert_eq!(results[0].confidence, Confidence::Medium);
        assert_eq!(results[0].unique_domains, 1);
    }

    #[test]
    fn partial_token_coverage_counts_as_support() {
        let findings = vec![finding("https://a.com/1", "Acme subsidiary opened offshore accounts")];
        let results = validate_facts(&findings, &["Acme opened offshore accounts in Malta".into()]);
        // acme, opened, offshore, accounts of five key tokens
        assert_eq!(results[0].confidence, Confidence::Low);
    }

    #[test]
    fn uncorroborated_and_degenerate_facts_get_none() {
        let findings = vec![finding("https://a.com/1", "Acme opened a new office")];
        let results = validate_facts(&findings, &["Beta Holdings collapsed".into(), "  ".into(), "a b".into()]);
        assert_eq!(results.len(), 3);
        for result in &results {
            assert_eq!(result.confidence, Confidence::None);
            assert_eq!(result.support_mentions, 0);
            assert!(result.unique_domains <= result.support_mentions);
        }
    }
}
