//! Tiered search-strategy planning.
//!
//! Turns a `QueryAnalysis` into an ordered list of `SearchTier`s, each broader
//! than the last: controlled-vocabulary precision search, a balanced mix,
//! broad keyword search and, when it makes sense, one specialized source.
//! Thresholds relax as query complexity rises. The plan is declarative; the
//! pipeline executes it.

use crate::analysis::{Complexity, EvidenceFocus, QueryAnalysis, QueryType};
use crate::types::{SourceKind, SourceProfile};
use crate::vocabulary::{Vocabulary, contains_term};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

pub const TIER_HIGH_PRECISION: &str = "High-Precision Search";
pub const TIER_BALANCED: &str = "Balanced Search";
pub const TIER_BROAD: &str = "Broad Semantic Search";
pub const TIER_SPECIALIZED: &str = "Specialized Search";

/// Relevance thresholds (0-100) per tier, indexed by complexity.
const THRESHOLDS: [[f64; 4]; 4] = [
    [85.0, 80.0, 75.0, 70.0],
    [60.0, 55.0, 50.0, 45.0],
    [40.0, 35.0, 30.0, 25.0],
    [25.0, 20.0, 15.0, 10.0],
];

/// One step of an escalating strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchTier {
    pub name: String,
    pub sources: Vec<String>,
    pub query_variants: Vec<String>,
    /// Minimum mean relevance (0-100) for the tier to be accepted.
    pub relevance_threshold: f64,
}

/// Ordered tiers, tried first to last.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Strategy {
    pub tiers: Vec<SearchTier>,
}

impl Strategy {
    pub fn len(&self) -> usize {
        self.tiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }

    /// Whether every tier's threshold is at most the previous tier's.
    pub fn is_monotonic(&self) -> bool {
        self.tiers
            .windows(2)
            .all(|w| w[0].relevance_threshold >= w[1].relevance_threshold)
    }
}

/// Builds strategies from query analyses.
#[derive(Debug, Clone)]
pub struct StrategyPlanner {
    vocabulary: Arc<Vocabulary>,
}

impl StrategyPlanner {
    pub fn new(vocabulary: Arc<Vocabulary>) -> Self {
        Self { vocabulary }
    }

    /// Plan 3-4 tiers over the available sources. Returns an empty strategy
    /// only when no sources are available.
    pub fn plan(
        &self,
        analysis: &QueryAnalysis,
        query: &str,
        available: &[SourceProfile],
    ) -> Strategy {
        if available.is_empty() {
            return Strategy::default();
        }
        let ranked = rank_sources(available);
        let level = complexity_index(analysis.complexity);
        let keywords = self.extract_keywords(query, usize::MAX);

        let mut tiers = Vec::with_capacity(4);

        let precision_sources = pick_kinds(&ranked, &[SourceKind::Bibliographic])
            .unwrap_or_else(|| ranked.iter().take(2).map(|p| p.name.clone()).collect());
        tiers.push(SearchTier {
            name: TIER_HIGH_PRECISION.to_string(),
            sources: precision_sources.clone(),
            query_variants: self.precision_variants(analysis, query, &keywords),
            relevance_threshold: THRESHOLDS[0][level],
        });

        let balanced_sources =
            pick_kinds(&ranked, &[SourceKind::Bibliographic, SourceKind::Aggregator])
                .unwrap_or_else(|| ranked.iter().map(|p| p.name.clone()).collect());
        tiers.push(SearchTier {
            name: TIER_BALANCED.to_string(),
            sources: balanced_sources,
            query_variants: self.balanced_variants(analysis, query, &keywords),
            relevance_threshold: THRESHOLDS[1][level],
        });

        tiers.push(SearchTier {
            name: TIER_BROAD.to_string(),
            sources: ranked.iter().map(|p| p.name.clone()).collect(),
            query_variants: fallback_if_empty(vec![keywords_query(&keywords, 4)], query),
            relevance_threshold: THRESHOLDS[2][level],
        });

        if let Some(source) =
            self.specialized_source(analysis, &ranked, &precision_sources)
        {
            tiers.push(SearchTier {
                name: TIER_SPECIALIZED.to_string(),
                sources: vec![source],
                query_variants: fallback_if_empty(vec![keywords_query(&keywords, 3)], query),
                relevance_threshold: THRESHOLDS[3][level],
            });
        }

        let strategy = Strategy { tiers };
        tracing::debug!(
            tiers = strategy.len(),
            complexity = ?analysis.complexity,
            "Search strategy planned"
        );
        strategy
    }

    /// Simplified keyword query used by the emergency fallback.
    pub fn emergency_query(&self, query: &str) -> String {
        let keywords = self.extract_keywords(query, 3);
        if keywords.is_empty() {
            plain_query(query)
        } else {
            keywords.join(" ")
        }
    }

    /// Distinct non-stop-word terms in query order, at most `max`.
    pub fn extract_keywords(&self, query: &str, max: usize) -> Vec<String> {
        let lower = plain_query(query).to_lowercase();
        let mut out: Vec<String> = Vec::new();
        for token in lower.split(|c: char| !(c.is_alphanumeric() || c == '-')) {
            let token = token.trim_matches('-');
            if token.len() < 3 || self.vocabulary.is_stopword(token) {
                continue;
            }
            if !out.iter().any(|t| t == token) {
                out.push(token.to_string());
            }
            if out.len() >= max {
                break;
            }
        }
        out
    }

    fn precision_variants(
        &self,
        analysis: &QueryAnalysis,
        query: &str,
        keywords: &[String],
    ) -> Vec<String> {
        let lower = query.to_lowercase();
        let mesh = self.vocabulary.mesh_matches(&lower);

        let base = if mesh.is_empty() {
            keywords.join(" AND ")
        } else {
            let leftovers: Vec<&String> = keywords
                .iter()
                .filter(|k| !mesh.iter().any(|(phrase, _)| contains_term(phrase, k)))
                .collect();
            let mut clauses: Vec<String> = mesh
                .iter()
                .map(|(_, heading)| format!("\"{heading}\"[MeSH Terms]"))
                .collect();
            clauses.extend(leftovers.into_iter().cloned());
            clauses.join(" AND ")
        };

        let mut variants = vec![base.clone()];
        if let Some(filter) = evidence_filter(analysis)
            && !base.is_empty()
        {
            variants.push(format!("{base} AND {filter}"));
        }
        fallback_if_empty(variants, query)
    }

    fn balanced_variants(
        &self,
        analysis: &QueryAnalysis,
        query: &str,
        keywords: &[String],
    ) -> Vec<String> {
        let mut variants = vec![query.trim().to_string()];
        if !analysis.mesh_headings.is_empty() {
            let lower = query.to_lowercase();
            let mesh = self.vocabulary.mesh_matches(&lower);
            let mut parts: Vec<String> = analysis
                .mesh_headings
                .iter()
                .map(|h| format!("\"{h}\""))
                .collect();
            parts.extend(
                keywords
                    .iter()
                    .filter(|k| !mesh.iter().any(|(phrase, _)| contains_term(phrase, k)))
                    .cloned(),
            );
            variants.push(parts.join(" "));
        }
        fallback_if_empty(variants, query)
    }

    fn specialized_source(
        &self,
        analysis: &QueryAnalysis,
        ranked: &[&SourceProfile],
        precision_sources: &[String],
    ) -> Option<String> {
        let specialized_kind = match analysis.query_type {
            QueryType::Treatment => Some(SourceKind::TrialRegistry),
            QueryType::Mechanism => Some(SourceKind::Preprint),
            QueryType::Epidemiology => Some(SourceKind::Regulatory),
            _ => None,
        };
        if let Some(kind) = specialized_kind
            && let Some(profile) = ranked.iter().find(|p| p.kind == kind)
        {
            return Some(profile.name.clone());
        }
        if analysis.complexity < Complexity::Complex {
            return None;
        }
        ranked
            .iter()
            .find(|p| !precision_sources.contains(&p.name))
            .or_else(|| ranked.first())
            .map(|p| p.name.clone())
    }
}

/// Strip field tags, quotes, parentheses and boolean operators so the query
/// reads as plain keywords for sources without controlled-vocabulary syntax.
pub fn plain_query(query: &str) -> String {
    let mut stripped = String::with_capacity(query.len());
    let mut in_tag = false;
    for ch in query.chars() {
        match ch {
            '[' => in_tag = true,
            ']' => in_tag = false,
            '"' | '(' | ')' if !in_tag => stripped.push(' '),
            _ if !in_tag => stripped.push(ch),
            _ => {}
        }
    }
    stripped
        .split_whitespace()
        .filter(|w| !matches!(*w, "AND" | "OR" | "NOT"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn complexity_index(complexity: Complexity) -> usize {
    match complexity {
        Complexity::Simple => 0,
        Complexity::Moderate => 1,
        Complexity::Complex => 2,
        Complexity::Expert => 3,
    }
}

fn evidence_filter(analysis: &QueryAnalysis) -> Option<&'static str> {
    match (analysis.evidence_focus, analysis.query_type) {
        (Some(EvidenceFocus::SystematicReview), _) => {
            Some("(meta-analysis[pt] OR systematic review[pt])")
        }
        (Some(EvidenceFocus::RandomizedTrials), _) | (_, QueryType::Treatment) => Some(
            "(randomized controlled trial[pt] OR meta-analysis[pt] OR systematic review[pt])",
        ),
        (_, QueryType::Diagnosis) => Some("(\"sensitivity and specificity\"[MeSH Terms])"),
        _ => None,
    }
}

/// Sources sorted by reliability (descending), then name. A repeated name
/// keeps its first profile.
fn rank_sources(available: &[SourceProfile]) -> Vec<&SourceProfile> {
    let mut seen = HashSet::new();
    let mut ranked: Vec<&SourceProfile> = available
        .iter()
        .filter(|p| seen.insert(p.name.as_str()))
        .collect();
    ranked.sort_by(|a, b| {
        b.reliability
            .partial_cmp(&a.reliability)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.name.cmp(&b.name))
    });
    ranked
}

fn pick_kinds(ranked: &[&SourceProfile], kinds: &[SourceKind]) -> Option<Vec<String>> {
    let picked: Vec<String> = ranked
        .iter()
        .filter(|p| kinds.contains(&p.kind))
        .map(|p| p.name.clone())
        .collect();
    (!picked.is_empty()).then_some(picked)
}

fn keywords_query(keywords: &[String], max: usize) -> String {
    keywords
        .iter()
        .take(max)
        .cloned()
        .collect::<Vec<_>>()
        .join(" ")
}

fn fallback_if_empty(variants: Vec<String>, query: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(variants.len());
    for v in variants {
        let v = v.trim().to_string();
        if !v.is_empty() && !out.contains(&v) {
            out.push(v);
        }
    }
    if out.is_empty() {
        out.push(query.trim().to_string());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::QueryAnalyzer;

    fn sources() -> Vec<SourceProfile> {
        vec![
            SourceProfile::new("pubmed", SourceKind::Bibliographic, 0.95),
            SourceProfile::new("europe_pmc", SourceKind::Bibliographic, 0.9),
            SourceProfile::new("semantic_scholar", SourceKind::Aggregator, 0.8),
            SourceProfile::new("crossref", SourceKind::Aggregator, 0.7),
            SourceProfile::new("clinical_trials", SourceKind::TrialRegistry, 0.85),
        ]
    }

    fn plan(query: &str) -> Strategy {
        let vocab = Arc::new(Vocabulary::builtin());
        let analysis = QueryAnalyzer::new(vocab.clone()).analyze(query);
        StrategyPlanner::new(vocab).plan(&analysis, query, &sources())
    }

    #[test]
    fn test_treatment_plan_has_four_tiers() {
        let strategy = plan("metformin type 2 diabetes treatment");
        assert_eq!(strategy.len(), 4);
        assert_eq!(strategy.tiers[0].name, TIER_HIGH_PRECISION);
        assert_eq!(strategy.tiers[0].sources, vec!["pubmed", "europe_pmc"]);
        assert_eq!(strategy.tiers[3].sources, vec!["clinical_trials"]);
        assert!(strategy.is_monotonic());
    }

    #[test]
    fn test_precision_variant_uses_mesh() {
        let strategy = plan("metformin type 2 diabetes treatment");
        let first = &strategy.tiers[0].query_variants[0];
        assert!(first.contains("\"Diabetes Mellitus, Type 2\"[MeSH Terms]"));
        assert!(first.contains("\"Metformin\"[MeSH Terms]"));
        assert!(first.ends_with("AND treatment"));
        assert_eq!(strategy.tiers[0].query_variants.len(), 2);
    }

    #[test]
    fn test_general_simple_query_has_three_tiers() {
        let strategy = plan("hand hygiene compliance");
        assert_eq!(strategy.len(), 3);
        assert_eq!(strategy.tiers[0].relevance_threshold, 85.0);
        assert_eq!(strategy.tiers[2].sources.len(), 5);
        assert_eq!(strategy.tiers[2].query_variants, vec!["hand hygiene compliance"]);
    }

    #[test]
    fn test_thresholds_relax_with_complexity() {
        let simple = plan("asthma");
        let complex = plan(
            "impact of prior depression on heart failure outcomes in patients with diabetes",
        );
        assert!(complex.tiers[0].relevance_threshold < simple.tiers[0].relevance_threshold);
        assert!(complex.is_monotonic());
    }

    #[test]
    fn test_repeated_source_name_planned_once() {
        let mut profiles = sources();
        profiles.push(SourceProfile::new("pubmed", SourceKind::Bibliographic, 0.1));
        let ranked = rank_sources(&profiles);
        let pubmed: Vec<_> = ranked.iter().filter(|p| p.name == "pubmed").collect();
        assert_eq!(pubmed.len(), 1);
        assert_eq!(pubmed[0].reliability, 0.95);

        let vocab = Arc::new(Vocabulary::builtin());
        let query = "hand hygiene compliance";
        let analysis = QueryAnalyzer::new(vocab.clone()).analyze(query);
        let strategy = StrategyPlanner::new(vocab).plan(&analysis, query, &profiles);
        for tier in &strategy.tiers {
            let unique: HashSet<&String> = tier.sources.iter().collect();
            assert_eq!(unique.len(), tier.sources.len(), "{}", tier.name);
        }
    }

    #[test]
    fn test_no_sources_yields_empty_strategy() {
        let vocab = Arc::new(Vocabulary::builtin());
        let analysis = QueryAnalysis::general();
        let strategy = StrategyPlanner::new(vocab).plan(&analysis, "x", &[]);
        assert!(strategy.is_empty());
    }

    #[test]
    fn test_plain_query_strips_syntax() {
        assert_eq!(
            plain_query("\"Metformin\"[MeSH Terms] AND (treatment OR therapy)"),
            "Metformin treatment therapy"
        );
    }

    #[test]
    fn test_emergency_query_is_short() {
        let planner = StrategyPlanner::new(Arc::new(Vocabulary::builtin()));
        assert_eq!(
            planner.emergency_query("what is the best treatment for chronic migraine in adults"),
            "treatment chronic migraine"
        );
    }
}
