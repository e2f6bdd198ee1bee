//! Composite relevance and evidence scoring.

use super::components::{
    self, Component, ScoreComponents, citation_impact, classify_study_design, is_top_journal,
    medical_relevance, query_alignment, recency, term_density,
};
use super::weights::WeightVector;
use crate::analysis::{Complexity, QueryAnalysis};
use crate::cache::{TermCache, TermSet};
use crate::config::ScoringConfig;
use crate::grade::{GradeAssessor, GradeEvidence};
use crate::types::{ScoredRecord, StudyDesign, UnifiedRecord};
use crate::vocabulary::Vocabulary;
use chrono::Datelike;
use std::sync::Arc;

/// Per-request scoring inputs, derived once from the query.
#[derive(Debug, Clone)]
pub struct ScoringContext {
    pub query_terms: Vec<String>,
    pub weights: WeightVector,
    pub complexity: Complexity,
}

/// Scores unified records against a query.
#[derive(Debug, Clone)]
pub struct RelevanceScorer {
    vocabulary: Arc<Vocabulary>,
    config: ScoringConfig,
    cache: Option<Arc<TermCache>>,
    assessor: GradeAssessor,
    reference_year: i32,
}

impl RelevanceScorer {
    pub fn new(vocabulary: Arc<Vocabulary>, config: ScoringConfig) -> Self {
        Self {
            vocabulary,
            config,
            cache: None,
            assessor: GradeAssessor::new(),
            reference_year: chrono::Utc::now().year(),
        }
    }

    /// Memoize tokenized titles and abstracts in a shared cache.
    pub fn with_cache(mut self, cache: Arc<TermCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Pin "now" for recency scoring.
    pub fn with_reference_year(mut self, year: i32) -> Self {
        self.reference_year = year;
        self
    }

    pub fn context(
        &self,
        query: &str,
        analysis: &QueryAnalysis,
        weights: WeightVector,
    ) -> ScoringContext {
        ScoringContext {
            query_terms: components::query_terms(query, &self.vocabulary),
            weights,
            complexity: analysis.complexity,
        }
    }

    fn terms(&self, text: &str) -> TermSet {
        let vocabulary = &self.vocabulary;
        match &self.cache {
            Some(cache) => {
                cache.get_or_insert_with(text, |t| components::tokenize(t, vocabulary))
            }
            None => Arc::new(components::tokenize(text, vocabulary)),
        }
    }

    /// Compute the sub-scores of a record. Optional components are only
    /// computed when `weights` gives them positive weight.
    pub fn components(
        &self,
        record: &UnifiedRecord,
        ctx: &ScoringContext,
    ) -> (ScoreComponents, StudyDesign) {
        let vocab = &self.vocabulary;
        let text = record.searchable_text().to_lowercase();
        let design = classify_study_design(record, vocab);

        let title_terms = self.terms(&record.title);
        let abstract_terms = self.terms(&record.abstract_text);

        let active = |c: Component| ctx.weights.is_active(c);
        let components = ScoreComponents {
            medical_relevance: medical_relevance(&record.journal, &text, vocab),
            semantic: query_alignment(&ctx.query_terms, &title_terms, &abstract_terms),
            evidence: design.evidence_score(),
            recency: recency(record.year, self.reference_year),
            citations: citation_impact(record.citation_count),
            diagnostic: active(Component::Diagnostic)
                .then(|| term_density(&text, &vocab.diagnostic_terms)),
            mechanistic: active(Component::Mechanistic)
                .then(|| term_density(&text, &vocab.mechanistic_terms)),
            methodology: active(Component::Methodology)
                .then(|| term_density(&text, &vocab.methodology_terms)),
        };
        (components, design)
    }

    /// Score one record. Evidence syntheses also get a GRADE assessment.
    pub fn score(&self, record: UnifiedRecord, ctx: &ScoringContext) -> ScoredRecord {
        let (components, design) = self.components(&record, ctx);

        let mut score: f64 = ctx
            .weights
            .iter()
            .filter_map(|(c, w)| components.get(c).map(|v| v * w))
            .sum();
        let top_journal = is_top_journal(&record.journal, &self.vocabulary);
        let bonus = top_journal && ctx.complexity == Complexity::Expert;
        if bonus {
            score *= self.config.expert_journal_bonus;
        }
        let score = if score.is_finite() {
            score.clamp(0.0, 1.0)
        } else {
            0.0
        };

        let grade = design.is_evidence_synthesis().then(|| {
            let text = format!("{}\n{}", record.title, record.abstract_text);
            self.assessor
                .assess(&GradeEvidence::from_text(&text, &self.vocabulary))
        });

        let rationale = self.rationale(&record, &components, design, top_journal, bonus, score);

        ScoredRecord {
            record,
            score,
            components,
            study_design: design,
            rationale,
            grade,
            emergency: false,
        }
    }

    pub fn score_all(&self, records: Vec<UnifiedRecord>, ctx: &ScoringContext) -> Vec<ScoredRecord> {
        records.into_iter().map(|r| self.score(r, ctx)).collect()
    }

    fn rationale(
        &self,
        record: &UnifiedRecord,
        components: &ScoreComponents,
        design: StudyDesign,
        top_journal: bool,
        bonus: bool,
        score: f64,
    ) -> String {
        let mut drivers: Vec<String> = vec![design.to_string()];
        if top_journal {
            drivers.push(format!("top-tier journal ({})", record.journal));
        }
        if let Some(year) = record.year
            && self.reference_year - year <= self.config.recent_window_years
        {
            drivers.push(format!("recent ({year})"));
        }
        if record.citation_count > 0 {
            drivers.push(format!("{} citations", record.citation_count));
        }
        match components.semantic {
            s if s >= 0.7 => drivers.push("strong query match".to_string()),
            s if s < 0.3 => drivers.push("weak query match".to_string()),
            _ => {}
        }
        if components.medical_relevance < 0.3 {
            drivers.push("low medical relevance".to_string());
        }
        if bonus {
            drivers.push("expert-query journal bonus".to_string());
        }
        format!("Score {score:.2}: {}", drivers.join("; "))
    }
}

/// Drop records whose medical-relevance sub-score is below `threshold`.
pub fn filter_by_medical_relevance(records: Vec<ScoredRecord>, threshold: f64) -> Vec<ScoredRecord> {
    let before = records.len();
    let kept: Vec<ScoredRecord> = records
        .into_iter()
        .filter(|r| r.components.medical_relevance >= threshold)
        .collect();
    if kept.len() < before {
        tracing::debug!(
            dropped = before - kept.len(),
            threshold,
            "Filtered records by medical relevance"
        );
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::QueryAnalyzer;
    use crate::grade::Certainty;
    use crate::scoring::AdaptiveWeightEngine;

    const YEAR: i32 = 2026;

    fn vocab() -> Arc<Vocabulary> {
        Arc::new(Vocabulary::builtin())
    }

    fn base_record() -> UnifiedRecord {
        UnifiedRecord {
            title: String::new(),
            abstract_text: String::new(),
            authors: vec!["A. Author".into()],
            journal: "Unknown journal".into(),
            year: Some(YEAR),
            url: String::new(),
            doi: None,
            source_name: "pubmed".into(),
            citation_count: 0,
            is_open_access: false,
            study_type: None,
            publication_types: vec![],
        }
    }

    fn setup(query: &str) -> (RelevanceScorer, ScoringContext) {
        let vocab = vocab();
        let analysis = QueryAnalyzer::new(vocab.clone()).analyze(query);
        let weights = AdaptiveWeightEngine::default().weights_for(&analysis);
        let scorer =
            RelevanceScorer::new(vocab, ScoringConfig::default()).with_reference_year(YEAR);
        let ctx = scorer.context(query, &analysis, weights);
        (scorer, ctx)
    }

    #[test]
    fn test_high_impact_rct_scores_high() {
        let (scorer, ctx) = setup("metformin type 2 diabetes treatment");
        let record = UnifiedRecord {
            title: "Metformin for type 2 diabetes: a randomized controlled trial".into(),
            abstract_text: "In this randomized controlled trial, 1200 patients with type 2 \
                            diabetes received metformin treatment or placebo. I2=10%. \
                            Metformin improved glycemic control."
                .into(),
            journal: "The Lancet".into(),
            citation_count: 300,
            ..base_record()
        };
        let scored = scorer.score(record, &ctx);
        assert_eq!(scored.study_design, StudyDesign::RandomizedControlledTrial);
        assert_eq!(scored.components.evidence, 0.9);
        assert_eq!(scored.components.recency, 1.0);
        assert!(scored.components.citations >= 0.9);
        assert!(scored.score > 0.7, "score was {}", scored.score);
        assert!(scored.grade.is_none());
        assert!(scored.rationale.contains("top-tier journal"));
    }

    #[test]
    fn test_non_medical_record_is_filtered() {
        let (scorer, ctx) = setup("metformin type 2 diabetes treatment");
        let record = UnifiedRecord {
            title: "A machine learning business model for retail".into(),
            abstract_text: "We study how a business model based on machine learning \
                            changes revenue in e-commerce."
                .into(),
            journal: "Journal of Commerce".into(),
            ..base_record()
        };
        let scored = scorer.score(record, &ctx);
        assert!(scored.components.medical_relevance <= 0.1);
        assert!(filter_by_medical_relevance(vec![scored], 0.5).is_empty());
    }

    #[test]
    fn test_optional_components_follow_weights() {
        let (scorer, ctx) = setup("diagnostic accuracy of screening for lung cancer");
        let record = UnifiedRecord {
            title: "Low-dose CT screening for lung cancer".into(),
            abstract_text: "Sensitivity and specificity against the reference standard.".into(),
            ..base_record()
        };
        let scored = scorer.score(record, &ctx);
        assert!(scored.components.diagnostic.is_some_and(|d| d > 0.5));
        assert!(scored.components.mechanistic.is_none());
    }

    #[test]
    fn test_meta_analysis_gets_grade() {
        let (scorer, ctx) = setup("statin therapy stroke prevention");
        let record = UnifiedRecord {
            title: "Statins for stroke prevention: a meta-analysis".into(),
            abstract_text: "Meta-analysis of randomized controlled trials. I²=85%. \
                            150 participants."
                .into(),
            ..base_record()
        };
        let scored = scorer.score(record, &ctx);
        let grade = scored.grade.expect("meta-analysis should be graded");
        assert!(grade.overall <= Certainty::Low);
    }

    #[test]
    fn test_expert_bonus_is_capped() {
        let vocab = vocab();
        let scorer = RelevanceScorer::new(vocab, ScoringConfig::default()).with_reference_year(YEAR);
        let weights = WeightVector::from_pairs(&[(Component::Evidence, 1.0)]);
        let ctx = ScoringContext {
            query_terms: vec![],
            weights,
            complexity: Complexity::Expert,
        };
        let record = UnifiedRecord {
            title: "Umbrella meta-analysis".into(),
            journal: "BMJ".into(),
            ..base_record()
        };
        let scored = scorer.score(record, &ctx);
        assert_eq!(scored.score, 1.0);
        assert!(scored.rationale.contains("bonus"));
    }

    #[test]
    fn test_cache_is_used() {
        let cache = Arc::new(TermCache::new(16));
        let (scorer, ctx) = setup("asthma inhaler");
        let scorer = scorer.with_cache(cache.clone());
        let record = UnifiedRecord {
            title: "Asthma inhaler adherence".into(),
            ..base_record()
        };
        scorer.score(record.clone(), &ctx);
        scorer.score(record, &ctx);
        assert!(cache.stats().hits >= 2);
    }
}
