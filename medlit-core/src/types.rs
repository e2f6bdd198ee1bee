//! Fundamental types shared across the pipeline.
//!
//! Records move through three shapes: `RawRecord` (whatever a connector could
//! parse), `UnifiedRecord` (canonical, de-duplicated) and `ScoredRecord`
//! (unified record plus composite score, rationale and optional GRADE rating).

use crate::grade::GradeAssessment;
use crate::scoring::ScoreComponents;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Strategy label reported when the emergency query produced the results.
pub const EMERGENCY_STRATEGY: &str = "Emergency Fallback";

/// A caller request into the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    /// Free-text query as typed by the user.
    pub query: String,
    /// Maximum number of ranked results to return.
    pub max_results: usize,
    /// Optional restriction to a subset of source names.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<String>>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>, max_results: usize) -> Self {
        Self {
            query: query.into(),
            max_results,
            sources: None,
        }
    }

    /// Restrict the request to the named sources.
    pub fn with_sources(mut self, sources: Vec<String>) -> Self {
        self.sources = Some(sources);
        self
    }
}

/// Broad category of an external literature source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Curated bibliographic database (PubMed, Europe PMC).
    Bibliographic,
    /// Cross-publisher metadata aggregator (Crossref, OpenAlex, Semantic Scholar).
    Aggregator,
    /// Preprint server.
    Preprint,
    /// Clinical trial registry.
    TrialRegistry,
    /// Regulatory or safety feed.
    Regulatory,
}

/// Static description of a source, used by the strategy planner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceProfile {
    /// Stable source name (e.g. `pubmed`).
    pub name: String,
    pub kind: SourceKind,
    /// Reliability in [0, 1]; the most reliable source serves the emergency query.
    pub reliability: f64,
}

impl SourceProfile {
    pub fn new(name: impl Into<String>, kind: SourceKind, reliability: f64) -> Self {
        Self {
            name: name.into(),
            kind,
            reliability: reliability.clamp(0.0, 1.0),
        }
    }
}

/// A record as parsed from one source. Every field except `source` may be missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub source: String,
    pub title: Option<String>,
    #[serde(default)]
    pub authors: Vec<String>,
    pub abstract_text: Option<String>,
    pub venue: Option<String>,
    pub year: Option<i32>,
    pub doi: Option<String>,
    pub pmid: Option<String>,
    pub url: Option<String>,
    pub citation_count: Option<u64>,
    pub is_open_access: Option<bool>,
    /// Source-declared study type (e.g. "Randomized Controlled Trial").
    pub study_type: Option<String>,
    #[serde(default)]
    pub publication_types: Vec<String>,
}

impl RawRecord {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ..Default::default()
        }
    }
}

/// Canonical record shape produced by the unifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnifiedRecord {
    pub title: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub authors: Vec<String>,
    pub journal: String,
    pub year: Option<i32>,
    pub url: String,
    pub doi: Option<String>,
    pub source_name: String,
    pub citation_count: u64,
    pub is_open_access: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub study_type: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub publication_types: Vec<String>,
}

impl UnifiedRecord {
    /// Identity key: the DOI when present, otherwise normalized `title|journal`.
    pub fn dedup_key(&self) -> String {
        match &self.doi {
            Some(doi) if !doi.is_empty() => format!("doi:{}", doi.to_lowercase()),
            _ => format!(
                "tj:{}|{}",
                normalize_key_text(&self.title),
                normalize_key_text(&self.journal)
            ),
        }
    }

    /// Title, abstract, declared study type and publication types joined for
    /// keyword scans.
    pub fn searchable_text(&self) -> String {
        let mut text = String::with_capacity(self.title.len() + self.abstract_text.len() + 64);
        text.push_str(&self.title);
        text.push('\n');
        text.push_str(&self.abstract_text);
        if let Some(study_type) = &self.study_type {
            text.push('\n');
            text.push_str(study_type);
        }
        for pt in &self.publication_types {
            text.push('\n');
            text.push_str(pt);
        }
        text
    }
}

/// Lowercase, keep alphanumerics, collapse everything else to single spaces.
pub(crate) fn normalize_key_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;
    for ch in text.chars() {
        if ch.is_alphanumeric() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.extend(ch.to_lowercase());
        } else {
            pending_space = true;
        }
    }
    out
}

/// Study design hierarchy, strongest evidence first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StudyDesign {
    MetaAnalysis,
    SystematicReview,
    RandomizedControlledTrial,
    Cohort,
    CaseControl,
    CrossSectional,
    CaseSeries,
    CaseReport,
    Unclear,
}

impl StudyDesign {
    /// Priority order used when classifying a record.
    pub const PRIORITY: [StudyDesign; 8] = [
        StudyDesign::MetaAnalysis,
        StudyDesign::SystematicReview,
        StudyDesign::RandomizedControlledTrial,
        StudyDesign::Cohort,
        StudyDesign::CaseControl,
        StudyDesign::CrossSectional,
        StudyDesign::CaseSeries,
        StudyDesign::CaseReport,
    ];

    /// Evidence-quality sub-score for this design.
    pub fn evidence_score(&self) -> f64 {
        match self {
            StudyDesign::MetaAnalysis => 1.0,
            StudyDesign::SystematicReview => 0.95,
            StudyDesign::RandomizedControlledTrial => 0.9,
            StudyDesign::Cohort => 0.75,
            StudyDesign::CaseControl => 0.7,
            StudyDesign::CrossSectional => 0.6,
            StudyDesign::CaseSeries => 0.4,
            StudyDesign::CaseReport => 0.2,
            StudyDesign::Unclear => 0.5,
        }
    }

    /// Whether the GRADE assessor applies to this design.
    pub fn is_evidence_synthesis(&self) -> bool {
        matches!(self, StudyDesign::MetaAnalysis | StudyDesign::SystematicReview)
    }

    /// Key used in vocabulary tables.
    pub fn key(&self) -> &'static str {
        match self {
            StudyDesign::MetaAnalysis => "meta_analysis",
            StudyDesign::SystematicReview => "systematic_review",
            StudyDesign::RandomizedControlledTrial => "rct",
            StudyDesign::Cohort => "cohort",
            StudyDesign::CaseControl => "case_control",
            StudyDesign::CrossSectional => "cross_sectional",
            StudyDesign::CaseSeries => "case_series",
            StudyDesign::CaseReport => "case_report",
            StudyDesign::Unclear => "unclear",
        }
    }
}

impl fmt::Display for StudyDesign {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            StudyDesign::MetaAnalysis => "Meta-analysis",
            StudyDesign::SystematicReview => "Systematic review",
            StudyDesign::RandomizedControlledTrial => "RCT",
            StudyDesign::Cohort => "Cohort study",
            StudyDesign::CaseControl => "Case-control study",
            StudyDesign::CrossSectional => "Cross-sectional study",
            StudyDesign::CaseSeries => "Case series",
            StudyDesign::CaseReport => "Case report",
            StudyDesign::Unclear => "Unclear design",
        };
        write!(f, "{label}")
    }
}

/// A unified record with its composite score.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredRecord {
    #[serde(flatten)]
    pub record: UnifiedRecord,
    /// Composite score in [0, 1].
    pub score: f64,
    pub components: ScoreComponents,
    pub study_design: StudyDesign,
    /// Human-readable explanation of the score.
    pub rationale: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grade: Option<GradeAssessment>,
    /// Set for records produced by the emergency query.
    #[serde(default)]
    pub emergency: bool,
}

/// Aggregate statistics over the returned results.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Insights {
    pub total_results: usize,
    pub high_confidence_count: usize,
    pub recent_count: usize,
    pub open_access_count: usize,
    pub average_citation_count: f64,
    pub source_breakdown: BTreeMap<String, usize>,
    /// Counts per study design (keys from `StudyDesign::key`).
    #[serde(default)]
    pub evidence_breakdown: BTreeMap<String, usize>,
}

/// Final pipeline output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedResultSet {
    pub results: Vec<ScoredRecord>,
    pub insights: Insights,
    /// Name of the tier (or emergency fallback) that produced the results.
    pub strategy_used: String,
    /// 1-based tier index; `tiers + 1` for the emergency query.
    pub fallback_tier_reached: usize,
}

impl RankedResultSet {
    /// An empty result set annotated as an emergency fallback.
    pub fn empty_emergency(fallback_tier_reached: usize) -> Self {
        Self {
            results: Vec::new(),
            insights: Insights::default(),
            strategy_used: EMERGENCY_STRATEGY.to_string(),
            fallback_tier_reached,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(title: &str, journal: &str, doi: Option<&str>) -> UnifiedRecord {
        UnifiedRecord {
            title: title.to_string(),
            abstract_text: String::new(),
            authors: vec![],
            journal: journal.to_string(),
            year: Some(2024),
            url: String::new(),
            doi: doi.map(str::to_string),
            source_name: "pubmed".to_string(),
            citation_count: 0,
            is_open_access: false,
            study_type: None,
            publication_types: vec![],
        }
    }

    #[test]
    fn test_dedup_key_prefers_doi() {
        let a = record("A Title", "BMJ", Some("10.1136/BMJ.1"));
        let b = record("Different", "Lancet", Some("10.1136/bmj.1"));
        assert_eq!(a.dedup_key(), b.dedup_key());
    }

    #[test]
    fn test_dedup_key_normalizes_title_and_journal() {
        let a = record("Metformin: A Review!", "The  Lancet", None);
        let b = record("metformin a review", "the lancet", None);
        assert_eq!(a.dedup_key(), b.dedup_key());
        assert_eq!(a.dedup_key(), "tj:metformin a review|the lancet");
    }

    #[test]
    fn test_study_design_scores_are_ordered() {
        let scores: Vec<f64> = StudyDesign::PRIORITY
            .iter()
            .map(|d| d.evidence_score())
            .collect();
        assert!(scores.windows(2).all(|w| w[0] >= w[1]));
        assert_eq!(StudyDesign::Unclear.evidence_score(), 0.5);
    }

    #[test]
    fn test_result_set_serializes_camel_case() {
        let set = RankedResultSet::empty_emergency(4);
        let json = serde_json::to_value(&set).unwrap();
        assert_eq!(json["strategyUsed"], EMERGENCY_STRATEGY);
        assert_eq!(json["fallbackTierReached"], 4);
        assert_eq!(json["insights"]["totalResults"], 0);
    }

    #[test]
    fn test_source_profile_clamps_reliability() {
        let profile = SourceProfile::new("x", SourceKind::Aggregator, 1.7);
        assert_eq!(profile.reliability, 1.0);
    }
}
