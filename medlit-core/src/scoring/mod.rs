//! Relevance and evidence scoring.
//!
//! - [`components`]: the individual sub-scores (medical relevance, query
//!   alignment, evidence level, recency, citation impact and the optional
//!   diagnostic/mechanistic/methodology densities).
//! - [`weights`]: the adaptive weight engine that picks a weight vector per query.
//! - [`scorer`]: combines the two into a composite score with a rationale.

pub mod components;
pub mod scorer;
pub mod weights;

pub use components::{Component, ScoreComponents, classify_study_design};
pub use scorer::{RelevanceScorer, ScoringContext, filter_by_medical_relevance};
pub use weights::{AdaptiveWeightEngine, WeightVector};
