//! End-to-end pipeline tests over scripted in-memory sources.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use medlit_core::config::{DuplicatePolicy, MedlitConfig, RetryConfig};
use medlit_core::strategy::{StrategyPlanner, TIER_HIGH_PRECISION};
use medlit_core::{
    EMERGENCY_STRATEGY, LiteraturePipeline, LiteratureSource, RawRecord, SearchRequest,
    SourceError, SourceKind, SourceProfile, TierState, Vocabulary,
};

const YEAR: i32 = 2026;

/// Returns a fixed response per exact query, or the default response.
struct ScriptedSource {
    profile: SourceProfile,
    default: Vec<RawRecord>,
    by_query: HashMap<String, Vec<RawRecord>>,
    fail: bool,
    calls: AtomicUsize,
}

impl ScriptedSource {
    fn new(name: &str, kind: SourceKind, reliability: f64) -> Self {
        Self {
            profile: SourceProfile::new(name, kind, reliability),
            default: Vec::new(),
            by_query: HashMap::new(),
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    fn returning(mut self, records: Vec<RawRecord>) -> Self {
        self.default = records;
        self
    }

    fn on_query(mut self, query: &str, records: Vec<RawRecord>) -> Self {
        self.by_query.insert(query.to_string(), records);
        self
    }

    fn failing(mut self) -> Self {
        self.fail = true;
        self
    }
}

#[async_trait]
impl LiteratureSource for ScriptedSource {
    fn profile(&self) -> SourceProfile {
        self.profile.clone()
    }

    async fn search(&self, query: &str, _limit: usize) -> Result<Vec<RawRecord>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(SourceError::Http {
                source_name: self.profile.name.clone(),
                message: "connection refused".into(),
            });
        }
        Ok(self
            .by_query
            .get(query)
            .cloned()
            .unwrap_or_else(|| self.default.clone()))
    }
}

fn config() -> MedlitConfig {
    MedlitConfig {
        retry: RetryConfig::none(),
        ..MedlitConfig::default()
    }
}

fn pipeline(sources: Vec<Arc<dyn LiteratureSource>>, config: MedlitConfig) -> LiteraturePipeline {
    LiteraturePipeline::with_vocabulary(sources, config, Arc::new(Vocabulary::builtin()))
        .with_reference_year(YEAR)
}

/// A record that scores near the top of the scale for an asthma inhaler query.
fn strong(source: &str, n: usize) -> RawRecord {
    RawRecord {
        title: Some(format!("Asthma inhaler therapy: a meta-analysis ({n})")),
        abstract_text: Some(
            "Meta-analysis of randomized trials in patients with asthma using an inhaler. \
             Clinical disease outcomes improved with treatment."
                .into(),
        ),
        authors: vec!["R. Author".into()],
        venue: Some("The Lancet".into()),
        year: Some(YEAR),
        doi: Some(format!("10.1000/asthma.{n}")),
        citation_count: Some(1000),
        ..RawRecord::new(source)
    }
}

fn weak(source: &str, doi: &str) -> RawRecord {
    RawRecord {
        title: Some("Asthma in adolescents".into()),
        abstract_text: Some("Patients with asthma were described.".into()),
        venue: Some("Regional Medical Bulletin".into()),
        year: Some(1990),
        doi: Some(doi.into()),
        ..RawRecord::new(source)
    }
}

#[tokio::test]
async fn test_first_tier_satisfied_stops_escalation() {
    let pubmed = Arc::new(
        ScriptedSource::new("pubmed", SourceKind::Bibliographic, 0.95)
            .returning((0..3).map(|n| strong("pubmed", n)).collect()),
    );
    let crossref = Arc::new(ScriptedSource::new("crossref", SourceKind::Aggregator, 0.7));
    let p = pipeline(vec![pubmed, crossref.clone()], config());

    let outcome = p.search_traced(SearchRequest::new("asthma inhaler", 3)).await;

    assert_eq!(outcome.result.strategy_used, TIER_HIGH_PRECISION);
    assert_eq!(outcome.result.fallback_tier_reached, 1);
    assert_eq!(outcome.result.results.len(), 3);
    assert!(outcome.result.results.iter().all(|r| !r.emergency));
    assert_eq!(
        outcome.trace.states(),
        vec![
            TierState::Pending,
            TierState::Running,
            TierState::Satisfied,
            TierState::Done
        ]
    );
    // The precision tier only uses bibliographic sources.
    assert_eq!(crossref.calls.load(Ordering::SeqCst), 0);
    let scores: Vec<f64> = outcome.result.results.iter().map(|r| r.score).collect();
    assert!(scores.windows(2).all(|w| w[0] >= w[1]));
    assert_eq!(outcome.result.insights.total_results, 3);
    assert_eq!(outcome.result.insights.evidence_breakdown["meta_analysis"], 3);

    // Final ranking rescoring reuses the term sets cached during the tier.
    let stats = p.term_cache().map(|c| c.stats()).unwrap_or_default();
    assert!(stats.entries > 0);
    assert!(stats.hits > 0);
}

#[tokio::test]
async fn test_same_doi_from_two_sources_is_returned_once() {
    let pubmed = Arc::new(
        ScriptedSource::new("pubmed", SourceKind::Bibliographic, 0.95)
            .returning(vec![weak("pubmed", "10.1000/XYZ")]),
    );
    let europe_pmc = Arc::new(
        ScriptedSource::new("europe_pmc", SourceKind::Bibliographic, 0.9)
            .returning(vec![weak("europe_pmc", "https://doi.org/10.1000/xyz")]),
    );
    let p = pipeline(vec![pubmed, europe_pmc], config());

    let result = p.search(SearchRequest::new("asthma adolescents", 10)).await;

    assert_eq!(result.results.len(), 1);
    let record = &result.results[0].record;
    assert_eq!(record.doi.as_deref(), Some("10.1000/xyz"));
    assert_eq!(record.source_name, "pubmed");
}

#[tokio::test]
async fn test_exhausted_tiers_run_emergency_query_on_most_reliable_source() {
    let query = "asthma inhaler adherence adolescents school outcomes";
    let emergency_query =
        StrategyPlanner::new(Arc::new(Vocabulary::builtin())).emergency_query(query);

    let pubmed = Arc::new(
        ScriptedSource::new("pubmed", SourceKind::Bibliographic, 0.95)
            .on_query(&emergency_query, vec![weak("pubmed", "10.1000/emergency")]),
    );
    let crossref = Arc::new(ScriptedSource::new("crossref", SourceKind::Aggregator, 0.6));
    let p = pipeline(vec![crossref, pubmed], config());

    let outcome = p.search_traced(SearchRequest::new(query, 10)).await;
    let tiers = outcome.strategy.len();

    assert_eq!(outcome.result.strategy_used, EMERGENCY_STRATEGY);
    assert_eq!(outcome.result.fallback_tier_reached, tiers + 1);
    assert_eq!(outcome.result.results.len(), 1);
    let only = &outcome.result.results[0];
    assert!(only.emergency);
    assert_eq!(only.record.source_name, "pubmed");
    assert!(outcome.trace.reached(TierState::Exhausted));
    assert!(outcome.trace.reached(TierState::Emergency));
    assert_eq!(outcome.trace.states().last(), Some(&TierState::Done));
}

#[tokio::test]
async fn test_earlier_tier_records_survive_escalation() {
    let pubmed = Arc::new(
        ScriptedSource::new("pubmed", SourceKind::Bibliographic, 0.95)
            .returning(vec![weak("pubmed", "10.1000/only")]),
    );
    let p = pipeline(vec![pubmed], config());

    let result = p.search(SearchRequest::new("asthma adolescents", 10)).await;

    assert_eq!(result.strategy_used, EMERGENCY_STRATEGY);
    assert_eq!(result.results.len(), 1);
    // Found by a regular tier first, so not marked as an emergency record.
    assert!(!result.results[0].emergency);
}

#[tokio::test]
async fn test_failing_source_does_not_sink_the_tier() {
    let pubmed = Arc::new(ScriptedSource::new("pubmed", SourceKind::Bibliographic, 0.95).failing());
    let europe_pmc = Arc::new(
        ScriptedSource::new("europe_pmc", SourceKind::Bibliographic, 0.9)
            .returning((0..3).map(|n| strong("europe_pmc", n)).collect()),
    );
    let p = pipeline(vec![pubmed.clone(), europe_pmc], config());

    let result = p.search(SearchRequest::new("asthma inhaler", 3)).await;

    assert!(pubmed.calls.load(Ordering::SeqCst) >= 1);
    assert_eq!(result.strategy_used, TIER_HIGH_PRECISION);
    assert_eq!(result.results.len(), 3);
    assert!(result.results.iter().all(|r| r.record.source_name == "europe_pmc"));
}

#[tokio::test]
async fn test_source_filter_limits_calls() {
    let pubmed = Arc::new(
        ScriptedSource::new("pubmed", SourceKind::Bibliographic, 0.95)
            .returning((0..3).map(|n| strong("pubmed", n)).collect()),
    );
    let europe_pmc = Arc::new(
        ScriptedSource::new("europe_pmc", SourceKind::Bibliographic, 0.9)
            .returning((10..13).map(|n| strong("europe_pmc", n)).collect()),
    );
    let p = pipeline(vec![pubmed.clone(), europe_pmc], config());

    let request = SearchRequest::new("asthma inhaler", 3).with_sources(vec!["europe_pmc".into()]);
    let result = p.search(request).await;

    assert_eq!(pubmed.calls.load(Ordering::SeqCst), 0);
    assert!(!result.results.is_empty());
    assert_eq!(result.insights.source_breakdown.len(), 1);
    assert_eq!(result.insights.source_breakdown["europe_pmc"], result.results.len());
}

#[tokio::test]
async fn test_merge_fields_policy_fills_gaps_from_later_duplicates() {
    let sparse = RawRecord {
        abstract_text: None,
        citation_count: Some(5),
        is_open_access: Some(false),
        ..weak("pubmed", "10.1000/merge")
    };
    let rich = RawRecord {
        abstract_text: Some("Patients with asthma received inhaled therapy.".into()),
        citation_count: Some(40),
        is_open_access: Some(true),
        ..weak("europe_pmc", "10.1000/merge")
    };
    let sources = || -> Vec<Arc<dyn LiteratureSource>> {
        vec![
            Arc::new(
                ScriptedSource::new("pubmed", SourceKind::Bibliographic, 0.95)
                    .returning(vec![sparse.clone()]),
            ),
            Arc::new(
                ScriptedSource::new("europe_pmc", SourceKind::Bibliographic, 0.9)
                    .returning(vec![rich.clone()]),
            ),
        ]
    };

    let mut merging = config();
    merging.pipeline.duplicate_policy = DuplicatePolicy::MergeFields;
    let merged = pipeline(sources(), merging)
        .search(SearchRequest::new("asthma adolescents", 10))
        .await;
    assert_eq!(merged.results.len(), 1);
    let record = &merged.results[0].record;
    assert_eq!(record.source_name, "pubmed");
    assert!(record.abstract_text.contains("inhaled therapy"));
    assert_eq!(record.citation_count, 40);
    assert!(record.is_open_access);

    let kept = pipeline(sources(), config())
        .search(SearchRequest::new("asthma adolescents", 10))
        .await;
    assert_eq!(kept.results.len(), 1);
    assert!(kept.results[0].record.abstract_text.is_empty());
    assert_eq!(kept.results[0].record.citation_count, 5);
}

#[tokio::test]
async fn test_zero_max_results_uses_default() {
    let pubmed = Arc::new(
        ScriptedSource::new("pubmed", SourceKind::Bibliographic, 0.95)
            .returning((0..30).map(|n| strong("pubmed", n)).collect()),
    );
    let p = pipeline(vec![pubmed], config());
    let result = p.search(SearchRequest::new("asthma inhaler", 0)).await;
    assert_eq!(
        result.results.len(),
        MedlitConfig::default().pipeline.default_max_results
    );
}
