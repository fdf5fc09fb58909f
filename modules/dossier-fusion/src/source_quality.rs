use dossier_common::{Artifact, DomainCount, SourceQuality};

use crate::round_to;

pub const TOP_DOMAIN_LIMIT: usize = 5;

/// Findings per source domain in first-seen order. Findings without a
/// resolvable domain are not counted.
pub fn domain_counts(findings: &[Artifact]) -> Vec<DomainCount> {
    let mut counts: Vec<DomainCount> = Vec::new();
    for finding in findings {
        let domain = finding.domain();
        if domain.is_empty() {
            continue;
        }
        match counts.iter_mut().find(|c| c.domain == domain) {
            Some(entry) => entry.count += 1,
            None => counts.push(DomainCount { domain, count: 1 }),
        }
    }
    counts
}

/// Diversity is unique domains over total counted findings, so 1.0 means
/// every finding came from a different domain.
pub fn summarize_source_quality(counts: &[DomainCount]) -> SourceQuality {
    let total: u32 = counts.iter().map(|c| c.count).sum();
    if counts.is_empty() || total == 0 {
        return SourceQuality::default();
    }

    let mut top = counts.to_vec();
    // Stable, so equal counts keep first-seen order.
    top.sort_by(|a, b| b.count.cmp(&a.count));
    top.truncate(TOP_DOMAIN_LIMIT);

    SourceQuality {
        unique_domains: counts.len() as u32,
        top_domains: top,
        diversity_score: round_to(counts.len() as f64 / total as f64, 3),
    }
}
