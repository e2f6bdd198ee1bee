//! Final ordering, truncation and aggregate insights.

use crate::config::ScoringConfig;
use crate::types::{Insights, RankedResultSet, ScoredRecord};
use std::cmp::Ordering;

/// Sorts scored records and summarizes them.
#[derive(Debug, Clone)]
pub struct RankingAggregator {
    config: ScoringConfig,
    reference_year: i32,
}

impl RankingAggregator {
    pub fn new(config: ScoringConfig, reference_year: i32) -> Self {
        Self {
            config,
            reference_year,
        }
    }

    /// Sort by score, then citations, then year (all descending) and keep
    /// the first `max_results`.
    pub fn rank(&self, mut records: Vec<ScoredRecord>, max_results: usize) -> Vec<ScoredRecord> {
        records.sort_by(compare);
        records.truncate(max_results);
        records
    }

    pub fn insights(&self, results: &[ScoredRecord]) -> Insights {
        let mut insights = Insights {
            total_results: results.len(),
            ..Insights::default()
        };
        let mut citations: u64 = 0;
        for r in results {
            if r.score >= self.config.high_confidence_cutoff {
                insights.high_confidence_count += 1;
            }
            if r
                .record
                .year
                .is_some_and(|y| self.reference_year - y <= self.config.recent_window_years)
            {
                insights.recent_count += 1;
            }
            if r.record.is_open_access {
                insights.open_access_count += 1;
            }
            citations = citations.saturating_add(r.record.citation_count);
            *insights
                .source_breakdown
                .entry(r.record.source_name.clone())
                .or_insert(0) += 1;
            *insights
                .evidence_breakdown
                .entry(r.study_design.key().to_string())
                .or_insert(0) += 1;
        }
        if !results.is_empty() {
            insights.average_citation_count = citations as f64 / results.len() as f64;
        }
        insights
    }

    /// Rank and wrap into the pipeline's output shape.
    pub fn aggregate(
        &self,
        records: Vec<ScoredRecord>,
        max_results: usize,
        strategy_used: impl Into<String>,
        fallback_tier_reached: usize,
    ) -> RankedResultSet {
        let results = self.rank(records, max_results);
        let insights = self.insights(&results);
        RankedResultSet {
            results,
            insights,
            strategy_used: strategy_used.into(),
            fallback_tier_reached,
        }
    }
}

fn compare(a: &ScoredRecord, b: &ScoredRecord) -> Ordering {
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| b.record.citation_count.cmp(&a.record.citation_count))
        .then_with(|| b.record.year.cmp(&a.record.year))
}
