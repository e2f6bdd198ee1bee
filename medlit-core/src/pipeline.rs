//! The literature search pipeline.
//!
//! One request runs through a small state machine:
//!
//! ```text
//! PENDING -> RUNNING -> SATISFIED -> DONE
//!                    -> ESCALATE  -> (next tier) ...
//!                                 -> EXHAUSTED -> EMERGENCY -> DONE
//! ```
//!
//! Within a tier every (source x query variant) call is issued at once and
//! the tier waits for all of them. Tiers run strictly one after another.
//! Records from every tier are accumulated and de-duplicated for the final
//! ranking. `search` always returns a result set; internal errors become an
//! empty "Emergency Fallback" set.

use crate::analysis::{MedicalDomain, QueryAnalysis, QueryAnalyzer};
use crate::cache::TermCache;
use crate::config::{MedlitConfig, PipelineConfig};
use crate::error::{MedlitError, PipelineError};
use crate::gateway::{LiteratureSource, SourceGateway};
use crate::ranking::RankingAggregator;
use crate::scoring::{
    AdaptiveWeightEngine, RelevanceScorer, ScoringContext, filter_by_medical_relevance,
};
use crate::strategy::{SearchTier, Strategy, StrategyPlanner};
use crate::types::{
    EMERGENCY_STRATEGY, RankedResultSet, ScoredRecord, SearchRequest, SourceProfile,
    UnifiedRecord,
};
use crate::unify::Unifier;
use crate::vocabulary::Vocabulary;
use chrono::Datelike;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;

/// Fallback controller states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TierState {
    Pending,
    Running,
    Satisfied,
    Escalate,
    Exhausted,
    Emergency,
    Done,
}

/// One recorded state transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierTransition {
    /// 1-based tier index; `None` for request-level states.
    pub tier: Option<usize>,
    pub state: TierState,
    /// Records the tier contributed after filtering.
    #[serde(default)]
    pub records: usize,
    /// Mean score (0-100) of the tier's top records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mean_score: Option<f64>,
}

/// Transition log of one request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchTrace {
    pub request_id: String,
    pub transitions: Vec<TierTransition>,
}

impl SearchTrace {
    fn record(&mut self, tier: Option<usize>, state: TierState) {
        self.transitions.push(TierTransition {
            tier,
            state,
            records: 0,
            mean_score: None,
        });
    }

    fn record_evaluation(
        &mut self,
        tier: usize,
        state: TierState,
        records: usize,
        mean_score: f64,
    ) {
        self.transitions.push(TierTransition {
            tier: Some(tier),
            state,
            records,
            mean_score: Some(mean_score),
        });
    }

    /// States in the order they were entered.
    pub fn states(&self) -> Vec<TierState> {
        self.transitions.iter().map(|t| t.state).collect()
    }

    pub fn reached(&self, state: TierState) -> bool {
        self.transitions.iter().any(|t| t.state == state)
    }
}

/// Result set plus everything that led to it.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub result: RankedResultSet,
    pub analysis: Option<QueryAnalysis>,
    pub strategy: Strategy,
    pub trace: SearchTrace,
}

/// End-to-end literature search over a set of injected sources.
pub struct LiteraturePipeline {
    gateways: Vec<SourceGateway>,
    vocabulary: Arc<Vocabulary>,
    analyzer: QueryAnalyzer,
    planner: StrategyPlanner,
    weights: AdaptiveWeightEngine,
    scorer: RelevanceScorer,
    unifier: Unifier,
    aggregator: RankingAggregator,
    term_cache: Option<Arc<TermCache>>,
    config: MedlitConfig,
}

impl std::fmt::Debug for LiteraturePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiteraturePipeline")
            .field("sources", &self.source_names())
            .field("pipeline", &self.config.pipeline)
            .finish()
    }
}

impl LiteraturePipeline {
    /// Build a pipeline, loading the vocabulary from `config.vocabulary_path`
    /// when one is configured. Fails on an invalid configuration or an empty
    /// source list.
    pub fn new(
        sources: Vec<Arc<dyn LiteratureSource>>,
        config: MedlitConfig,
    ) -> Result<Self, MedlitError> {
        config.validate()?;
        if sources.is_empty() {
            return Err(PipelineError::NoSources.into());
        }
        let vocabulary = match &config.vocabulary_path {
            Some(path) => Vocabulary::from_path(path)?,
            None => Vocabulary::builtin(),
        };
        Ok(Self::with_vocabulary(sources, config, Arc::new(vocabulary)))
    }

    pub fn with_vocabulary(
        sources: Vec<Arc<dyn LiteratureSource>>,
        config: MedlitConfig,
        vocabulary: Arc<Vocabulary>,
    ) -> Self {
        let timeout = Duration::from_secs(config.sources.request_timeout_secs.max(1));
        let gateways = sources
            .into_iter()
            .map(|s| SourceGateway::new(s, config.retry.clone(), timeout))
            .collect();
        let term_cache = config
            .cache
            .enabled
            .then(|| Arc::new(TermCache::new(config.cache.max_entries)));
        let year = chrono::Utc::now().year();

        let mut pipeline = Self {
            gateways,
            analyzer: QueryAnalyzer::new(vocabulary.clone()),
            planner: StrategyPlanner::new(vocabulary.clone()),
            weights: AdaptiveWeightEngine::new(config.preferences.clone()),
            scorer: RelevanceScorer::new(vocabulary.clone(), config.scoring.clone()),
            unifier: Unifier::new(config.pipeline.duplicate_policy, year),
            aggregator: RankingAggregator::new(config.scoring.clone(), year),
            vocabulary,
            term_cache,
            config,
        };
        pipeline.set_reference_year(year);
        pipeline
    }

    /// Pin the year used for recency scoring and year validation.
    pub fn with_reference_year(mut self, year: i32) -> Self {
        self.set_reference_year(year);
        self
    }

    fn set_reference_year(&mut self, year: i32) {
        let mut scorer = RelevanceScorer::new(self.vocabulary.clone(), self.config.scoring.clone())
            .with_reference_year(year);
        if let Some(cache) = &self.term_cache {
            scorer = scorer.with_cache(cache.clone());
        }
        self.scorer = scorer;
        self.unifier = Unifier::new(self.config.pipeline.duplicate_policy, year);
        self.aggregator = RankingAggregator::new(self.config.scoring.clone(), year);
    }

    pub fn source_names(&self) -> Vec<&str> {
        self.gateways.iter().map(SourceGateway::name).collect()
    }

    pub fn term_cache(&self) -> Option<&Arc<TermCache>> {
        self.term_cache.as_ref()
    }

    pub fn analyze(&self, query: &str) -> QueryAnalysis {
        self.analyzer.analyze(query)
    }

    /// Analysis and strategy for a request, without searching.
    pub fn plan(&self, request: &SearchRequest) -> (QueryAnalysis, Strategy) {
        let analysis = self.analyzer.analyze(&request.query);
        let profiles: Vec<SourceProfile> = self
            .available(request)
            .iter()
            .map(|g| g.profile().clone())
            .collect();
        let strategy = self.planner.plan(&analysis, &request.query, &profiles);
        (analysis, strategy)
    }

    /// Run a search. Never fails.
    pub async fn search(&self, request: SearchRequest) -> RankedResultSet {
        self.search_traced(request).await.result
    }

    /// Run a search and keep the analysis, strategy and state trace.
    pub async fn search_traced(&self, request: SearchRequest) -> SearchOutcome {
        let request_id = uuid::Uuid::new_v4().to_string();
        let span = tracing::info_span!(
            "literature_search",
            request_id = %request_id,
            query = %request.query,
        );
        async {
            let mut trace = SearchTrace {
                request_id: request_id.clone(),
                transitions: Vec::new(),
            };
            match self.run(&request, &mut trace).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::warn!(error = %e, "Pipeline failed; returning empty fallback result");
                    trace.record(None, TierState::Emergency);
                    trace.record(None, TierState::Done);
                    SearchOutcome {
                        result: RankedResultSet::empty_emergency(1),
                        analysis: None,
                        strategy: Strategy::default(),
                        trace,
                    }
                }
            }
        }
        .instrument(span)
        .await
    }

    fn available(&self, request: &SearchRequest) -> Vec<&SourceGateway> {
        self.gateways
            .iter()
            .filter(|g| {
                request
                    .sources
                    .as_ref()
                    .is_none_or(|names| names.iter().any(|n| n == g.name()))
            })
            .collect()
    }

    fn pipeline_config(&self) -> &PipelineConfig {
        &self.config.pipeline
    }

    async fn run(
        &self,
        request: &SearchRequest,
        trace: &mut SearchTrace,
    ) -> Result<SearchOutcome, PipelineError> {
        let query = request.query.trim();
        if query.is_empty() {
            return Err(PipelineError::MalformedAnalysis {
                message: "query is empty".to_string(),
            });
        }
        let cfg = self.pipeline_config();
        let max_results = if request.max_results == 0 {
            cfg.default_max_results
        } else {
            request.max_results
        };
        let limit = max_results.clamp(1, cfg.max_results_per_call.max(1));

        let available = self.available(request);
        if available.is_empty() {
            return Err(PipelineError::NoSources);
        }
        let profiles: Vec<SourceProfile> =
            available.iter().map(|g| g.profile().clone()).collect();

        let analysis = self.analyzer.analyze(query);
        if analysis.domain != MedicalDomain::GeneralMedicine
            && !analysis.matched_domains.contains(&analysis.domain)
        {
            return Err(PipelineError::MalformedAnalysis {
                message: format!("domain {} has no keyword hits", analysis.domain),
            });
        }
        let strategy = self.planner.plan(&analysis, query, &profiles);
        if strategy.is_empty() {
            return Err(PipelineError::EmptyStrategy);
        }

        let weights = self.weights.weights_for(&analysis);
        let ctx = self.scorer.context(query, &analysis, weights);
        let needed = cfg.min_satisfying_results.min(max_results).max(1);

        tracing::info!(
            query_type = %analysis.query_type,
            domain = %analysis.domain,
            tiers = strategy.len(),
            sources = profiles.len(),
            "Starting tiered search"
        );

        let mut accumulated: Vec<UnifiedRecord> = Vec::new();
        for (i, tier) in strategy.tiers.iter().enumerate() {
            let index = i + 1;
            trace.record(Some(index), TierState::Pending);
            trace.record(Some(index), TierState::Running);

            let span = tracing::info_span!("tier", index, name = %tier.name);
            let unified = self
                .execute_tier(tier, &available, limit)
                .instrument(span)
                .await;

            let scored = filter_by_medical_relevance(
                self.scorer.score_all(unified.clone(), &ctx),
                cfg.min_medical_relevance,
            );
            let top = self.aggregator.rank(scored, max_results);
            let mean = mean_score(&top);
            accumulated.extend(unified);

            if top.len() >= needed && mean >= tier.relevance_threshold {
                trace.record_evaluation(index, TierState::Satisfied, top.len(), mean);
                tracing::info!(
                    tier = %tier.name,
                    records = top.len(),
                    mean_score = mean,
                    threshold = tier.relevance_threshold,
                    "Tier satisfied"
                );
                let records = self.finalize(accumulated, &ctx);
                let result =
                    self.aggregator
                        .aggregate(records, max_results, tier.name.clone(), index);
                trace.record(None, TierState::Done);
                return Ok(SearchOutcome {
                    result,
                    analysis: Some(analysis),
                    strategy,
                    trace: std::mem::take(trace),
                });
            }

            trace.record_evaluation(index, TierState::Escalate, top.len(), mean);
            tracing::info!(
                tier = %tier.name,
                records = top.len(),
                needed,
                mean_score = mean,
                threshold = tier.relevance_threshold,
                "Tier insufficient, escalating"
            );
        }

        trace.record(None, TierState::Exhausted);
        trace.record(None, TierState::Emergency);
        let emergency_tier = strategy.len() + 1;

        let mut records = self.finalize(accumulated, &ctx);
        let mut seen: HashSet<String> = records.iter().map(|r| r.record.dedup_key()).collect();
        if let Some(gateway) = self.emergency_gateway(&available) {
            let emergency_query = self.planner.emergency_query(query);
            tracing::warn!(
                source = gateway.name(),
                query = %emergency_query,
                "All tiers exhausted; running emergency query"
            );
            let raw = gateway.search(&emergency_query, limit).await;
            for mut scored in self
                .scorer
                .score_all(self.unifier.unify(raw), &ctx)
            {
                if seen.insert(scored.record.dedup_key()) {
                    scored.emergency = true;
                    records.push(scored);
                }
            }
        }

        let result = self
            .aggregator
            .aggregate(records, max_results, EMERGENCY_STRATEGY, emergency_tier);
        trace.record(None, TierState::Done);
        Ok(SearchOutcome {
            result,
            analysis: Some(analysis),
            strategy,
            trace: std::mem::take(trace),
        })
    }

    /// Issue every (source x variant) call of a tier concurrently and wait
    /// for all of them. Results keep plan order.
    async fn execute_tier(
        &self,
        tier: &SearchTier,
        available: &[&SourceGateway],
        limit: usize,
    ) -> Vec<UnifiedRecord> {
        let calls: Vec<_> = tier
            .sources
            .iter()
            .filter_map(|name| available.iter().find(|g| g.name() == name.as_str()))
            .flat_map(|gateway| {
                tier.query_variants
                    .iter()
                    .map(move |variant| gateway.search(variant, limit))
            })
            .collect();
        let issued = calls.len();
        let raw: Vec<_> = join_all(calls).await.into_iter().flatten().collect();
        tracing::debug!(calls = issued, raw_records = raw.len(), "Tier calls settled");
        self.unifier.unify(raw)
    }

    /// De-duplicate accumulated records, score and filter them.
    fn finalize(&self, accumulated: Vec<UnifiedRecord>, ctx: &ScoringContext) -> Vec<ScoredRecord> {
        let unique = self.unifier.dedup(accumulated);
        filter_by_medical_relevance(
            self.scorer.score_all(unique, ctx),
            self.pipeline_config().min_medical_relevance,
        )
    }

    /// The configured emergency source if available, else the most reliable one.
    fn emergency_gateway<'a>(&self, available: &[&'a SourceGateway]) -> Option<&'a SourceGateway> {
        if let Some(name) = &self.pipeline_config().emergency_source
            && let Some(gateway) = available
                .iter()
                .copied()
                .find(|g| g.name() == name.as_str())
        {
            return Some(gateway);
        }
        available.iter().copied().max_by(|a, b| {
            a.profile()
                .reliability
                .partial_cmp(&b.profile().reliability)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.name().cmp(a.name()))
        })
    }
}

/// Mean score on the 0-100 scale; zero for an empty tier.
fn mean_score(records: &[ScoredRecord]) -> f64 {
    if records.is_empty() {
        return 0.0;
    }
    records.iter().map(|r| r.score * 100.0).sum::<f64>() / records.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SourceError;
    use crate::types::{RawRecord, SourceKind};
    use async_trait::async_trait;

    struct EmptySource(&'static str, SourceKind, f64);

    #[async_trait]
    impl LiteratureSource for EmptySource {
        fn profile(&self) -> SourceProfile {
            SourceProfile::new(self.0, self.1, self.2)
        }

        async fn search(&self, _query: &str, _limit: usize) -> Result<Vec<RawRecord>, SourceError> {
            Ok(Vec::new())
        }
    }

    fn pipeline(sources: Vec<Arc<dyn LiteratureSource>>) -> LiteraturePipeline {
        LiteraturePipeline::with_vocabulary(
            sources,
            MedlitConfig::default(),
            Arc::new(Vocabulary::builtin()),
        )
        .with_reference_year(2026)
    }

    #[tokio::test]
    async fn test_blank_query_returns_empty_emergency_set() {
        let p = pipeline(vec![Arc::new(EmptySource(
            "pubmed",
            SourceKind::Bibliographic,
            0.9,
        ))]);
        let outcome = p.search_traced(SearchRequest::new("   ", 10)).await;
        assert!(outcome.result.is_empty());
        assert_eq!(outcome.result.strategy_used, EMERGENCY_STRATEGY);
        assert!(outcome.trace.reached(TierState::Done));
    }

    #[tokio::test]
    async fn test_no_sources_returns_empty_emergency_set() {
        let p = pipeline(vec![]);
        let result = p.search(SearchRequest::new("asthma", 10)).await;
        assert!(result.is_empty());
        assert_eq!(result.strategy_used, EMERGENCY_STRATEGY);
    }

    #[tokio::test]
    async fn test_unknown_source_filter_is_no_sources() {
        let p = pipeline(vec![Arc::new(EmptySource(
            "pubmed",
            SourceKind::Bibliographic,
            0.9,
        ))]);
        let request = SearchRequest::new("asthma", 10).with_sources(vec!["nowhere".into()]);
        let outcome = p.search_traced(request).await;
        assert!(outcome.analysis.is_none());
        assert!(outcome.result.is_empty());
    }

    #[tokio::test]
    async fn test_empty_sources_walk_every_state() {
        let p = pipeline(vec![
            Arc::new(EmptySource("pubmed", SourceKind::Bibliographic, 0.9)),
            Arc::new(EmptySource("crossref", SourceKind::Aggregator, 0.7)),
        ]);
        let outcome = p.search_traced(SearchRequest::new("asthma inhaler", 10)).await;
        let tiers = outcome.strategy.len();
        assert_eq!(outcome.result.fallback_tier_reached, tiers + 1);
        assert_eq!(outcome.result.strategy_used, EMERGENCY_STRATEGY);
        let states = outcome.trace.states();
        assert_eq!(states.first(), Some(&TierState::Pending));
        assert_eq!(
            &states[states.len() - 3..],
            &[TierState::Exhausted, TierState::Emergency, TierState::Done]
        );
        assert_eq!(
            states.iter().filter(|s| **s == TierState::Escalate).count(),
            tiers
        );
    }

    #[test]
    fn test_new_requires_sources() {
        let err = LiteraturePipeline::new(vec![], MedlitConfig::default()).err();
        assert!(matches!(
            err,
            Some(MedlitError::Pipeline(PipelineError::NoSources))
        ));
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let mut config = MedlitConfig::default();
        config.pipeline.max_results_per_call = 0;
        let source: Arc<dyn LiteratureSource> =
            Arc::new(EmptySource("pubmed", SourceKind::Bibliographic, 0.9));
        let err = LiteraturePipeline::new(vec![source], config).err();
        assert!(matches!(err, Some(MedlitError::Config(_))));
    }

    #[test]
    fn test_new_reports_missing_vocabulary() {
        let config = MedlitConfig {
            vocabulary_path: Some("/nonexistent/medlit-vocabulary.toml".into()),
            ..MedlitConfig::default()
        };
        let source: Arc<dyn LiteratureSource> =
            Arc::new(EmptySource("pubmed", SourceKind::Bibliographic, 0.9));
        let err = LiteraturePipeline::new(vec![source], config).err();
        assert!(matches!(err, Some(MedlitError::Vocabulary(_))));
    }

    #[test]
    fn test_mean_score_scale() {
        assert_eq!(mean_score(&[]), 0.0);
    }
}
