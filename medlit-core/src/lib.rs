//! # MedLit Core
//!
//! Core library for MedLit, a tiered biomedical literature search pipeline.
//! Provides query analysis, search-strategy planning, fan-out with fallback,
//! record unification, relevance and evidence scoring, GRADE assessment,
//! ranking, configuration, and fundamental types.

pub mod analysis;
pub mod cache;
pub mod config;
pub mod error;
pub mod gateway;
pub mod grade;
pub mod pipeline;
pub mod ranking;
pub mod scoring;
pub mod strategy;
pub mod types;
pub mod unify;
pub mod vocabulary;

// Re-export commonly used types at the crate root.
pub use analysis::{Complexity, MedicalDomain, QueryAnalysis, QueryAnalyzer, QueryType};
pub use cache::TermCache;
pub use config::{MedlitConfig, RetryConfig, load_config};
pub use error::{ConfigError, MedlitError, PipelineError, Result, SourceError};
pub use gateway::{LiteratureSource, RewritingSource, SourceGateway};
pub use grade::{Certainty, GradeAssessment, GradeAssessor, GradeEvidence};
pub use pipeline::{LiteraturePipeline, SearchOutcome, SearchTrace, TierState};
pub use ranking::RankingAggregator;
pub use scoring::{AdaptiveWeightEngine, Component, RelevanceScorer, WeightVector};
pub use strategy::{SearchTier, Strategy, StrategyPlanner};
pub use types::{
    EMERGENCY_STRATEGY, Insights, RankedResultSet, RawRecord, ScoredRecord, SearchRequest,
    SourceKind, SourceProfile, StudyDesign, UnifiedRecord,
};
pub use unify::Unifier;
pub use vocabulary::Vocabulary;
