//! Risk scoring: classify raw risk statements, attach corroborating facts,
//! and roll signals up into a bounded summary.

use std::collections::HashMap;

use dossier_common::{CategoryScore, Confidence, RiskScoreSummary, RiskSignal, Severity, ValidationResult};

use crate::round_to;

/// Ordered `(category, keywords)` table. Earlier categories win ties.
pub type CategoryTable<'a> = &'a [(&'a str, &'a [&'a str])];

pub const DEFAULT_CATEGORY_KEYWORDS: CategoryTable<'static> = &[
    ("legal", &["lawsuit", "litigation", "fraud", "indictment", "regulatory"]),
    ("financial", &["bankruptcy", "insolvency", "money laundering", "tax", "embezzle"]),
    ("reputation", &["controversy", "scandal", "misconduct", "criticism"]),
    ("security", &["breach", "hack", "espionage", "leak"]),
    ("compliance", &["sanction", "violation", "non-compliance"]),
];

pub const GENERAL_CATEGORY: &str = "general";

/// Weight for labels outside the known tiers.
pub const UNKNOWN_WEIGHT: f64 = 0.2;

const CRITICAL_TERMS: &[&str] = &["arrest", "felony", "major breach", "criminal charge"];
const HIGH_TERMS: &[&str] = &["regulator", "lawsuit", "whistleblower", "fraud", "sanction"];
const MEDIUM_TERMS: &[&str] = &["investigation", "audit", "controversy", "breach", "dispute"];

pub fn classify_category(text: &str) -> String {
    classify_category_with(text, DEFAULT_CATEGORY_KEYWORDS)
}

/// Category with the most keyword hits; `general` when nothing hits.
pub fn classify_category_with(text: &str, table: CategoryTable<'_>) -> String {
    let text = text.to_lowercase();
    let mut best = GENERAL_CATEGORY;
    let mut best_hits = 0;
    for (category, keywords) in table {
        let hits = keywords.iter().filter(|k| text.contains(*k)).count();
        if hits > best_hits {
            best = *category;
            best_hits = hits;
        }
    }
    best.to_string()
}

pub fn infer_severity(text: &str) -> Severity {
    let text = text.to_lowercase();
    let any = |terms: &[&str]| terms.iter().any(|t| text.contains(t));
    if any(CRITICAL_TERMS) {
        Severity::Critical
    } else if any(HIGH_TERMS) {
        Severity::High
    } else if any(MEDIUM_TERMS) {
        Severity::Medium
    } else {
        Severity::Low
    }
}

pub fn severity_weight_label(label: &str) -> f64 {
    label.parse::<Severity>().map(Severity::weight).unwrap_or(UNKNOWN_WEIGHT)
}

/// Confidence weight for a label; `none` is a known tier here.
pub fn confidence_weight_label(label: &str) -> f64 {
    label.parse::<Confidence>().map(Confidence::weight).unwrap_or(UNKNOWN_WEIGHT)
}

/// Severity weight × confidence weight × (1 + amplifier), rounded to three
/// decimals and capped at 1.0.
pub fn score_signal(severity: Severity, confidence: Confidence, amplifier: Option<f64>) -> f64 {
    let mut score = severity.weight() * confidence.weight();
    if let Some(amplifier) = amplifier {
        score *= 1.0 + amplifier;
    }
    round_to(score, 3).min(1.0)
}

fn push_unique(into: &mut Vec<String>, value: &str) {
    if !value.is_empty() && !into.iter().any(|v| v == value) {
        into.push(value.to_string());
    }
}

pub fn build_risk_signals<S: AsRef<str>>(raw_risks: &[S], validated: &[ValidationResult]) -> Vec<RiskSignal> {
    build_risk_signals_with(raw_risks, validated, DEFAULT_CATEGORY_KEYWORDS)
}

/// One signal per non-blank risk statement, in input order.
///
/// A validated fact whose text equals the risk statement supports it
/// directly. Otherwise every fact whose normalized form contains one of the
/// statement's words supports it, and confidence rises to the strongest
/// supporting tier.
pub fn build_risk_signals_with<S: AsRef<str>>(
    raw_risks: &[S],
    validated: &[ValidationResult],
    table: CategoryTable<'_>,
) -> Vec<RiskSignal> {
    let by_fact: HashMap<&str, &ValidationResult> =
        validated.iter().map(|v| (v.fact.as_str(), v)).collect();

    let mut signals = Vec::new();
    for risk in raw_risks {
        let risk = risk.as_ref();
        if risk.trim().is_empty() {
            continue;
        }

        let category = classify_category_with(risk, table);
        let severity = infer_severity(risk);
        let mut confidence = Confidence::Low;
        let mut supporting_facts: Vec<String> = Vec::new();
        let mut sources: Vec<String> = Vec::new();

        if let Some(exact) = by_fact.get(risk) {
            confidence = exact.confidence;
            supporting_facts.push(exact.fact.clone());
            for evidence in &exact.evidence {
                push_unique(&mut sources, &evidence.url);
            }
        }

        if supporting_facts.is_empty() {
            let lowered = risk.to_lowercase();
            let words: Vec<&str> = lowered.split_whitespace().collect();
            for result in validated {
                if words.iter().any(|w| result.normalized_fact.contains(w)) {
                    supporting_facts.push(result.fact.clone());
                    for evidence in &result.evidence {
                        push_unique(&mut sources, &evidence.url);
                    }
                    confidence = confidence.max(result.confidence);
                }
            }
        }

        let mut rationale = format!("Identified as {category} risk with {severity} severity.");
        if !supporting_facts.is_empty() {
            rationale.push_str(&format!(
                " Supported by {} validated fact(s).",
                supporting_facts.len()
            ));
        }

        signals.push(RiskSignal {
            label: risk.trim().to_string(),
            category,
            severity,
            confidence,
            rationale,
            supporting_facts,
            sources,
        });
    }
    signals
}

/// Mean score, severity of the top-scoring signal (first wins ties) and
/// capped per-category sums sorted highest first.
pub fn aggregate_risk_scores(signals: &[RiskSignal]) -> RiskScoreSummary {
    if signals.is_empty() {
        return RiskScoreSummary::default();
    }

    let mut totals: Vec<CategoryScore> = Vec::new();
    let mut highest: Option<(f64, Severity)> = None;
    let mut overall = 0.0;

    for signal in signals {
        let score = score_signal(signal.severity, signal.confidence, None);
        overall += score;

        match totals.iter_mut().find(|c| c.category == signal.category) {
            Some(entry) => entry.score += score,
            None => totals.push(CategoryScore {
                category: signal.category.clone(),
                score,
            }),
        }

        if highest.map_or(true, |(best, _)| score > best) {
            highest = Some((score, signal.severity));
        }
    }

    for entry in &mut totals {
        entry.score = round_to(entry.score, 3).min(1.0);
    }
    totals.sort_by(|a, b| b.score.total_cmp(&a.score));

    RiskScoreSummary {
        overall_score: round_to(overall / signals.len() as f64, 3).min(1.0),
        highest_severity: highest.map(|(_, severity)| severity),
        category_breakdown: totals,
        signals: signals.to_vec(),
    }
}
