//! Adaptive weight engine.
//!
//! A base weight vector is picked by query type, nudged by additive
//! per-specialty modifiers, scaled by user preferences, clamped to [0, 1]
//! and renormalized so the weights sum to one.

use super::components::Component;
use crate::analysis::{MedicalDomain, QueryAnalysis, QueryType};
use crate::config::UserPreferences;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Non-negative component weights summing to one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeightVector(BTreeMap<Component, f64>);

impl WeightVector {
    pub fn from_pairs(pairs: &[(Component, f64)]) -> Self {
        Self(pairs.iter().copied().collect())
    }

    pub fn get(&self, component: Component) -> f64 {
        self.0.get(&component).copied().unwrap_or(0.0)
    }

    /// Whether the component carries positive weight.
    pub fn is_active(&self, component: Component) -> bool {
        self.get(component) > 0.0
    }

    pub fn iter(&self) -> impl Iterator<Item = (Component, f64)> + '_ {
        self.0.iter().map(|(c, w)| (*c, *w))
    }

    pub fn sum(&self) -> f64 {
        self.0.values().sum()
    }

    fn add(&mut self, component: Component, delta: f64) {
        *self.0.entry(component).or_insert(0.0) += delta;
    }

    fn scale(&mut self, component: Component, factor: f64) {
        if let Some(w) = self.0.get_mut(&component) {
            *w *= factor;
        }
    }

    /// Clamp every weight to [0, 1] and rescale to sum to one. An all-zero
    /// vector becomes uniform over the core components.
    pub fn normalized(mut self) -> Self {
        for w in self.0.values_mut() {
            *w = if w.is_finite() { w.clamp(0.0, 1.0) } else { 0.0 };
        }
        let total = self.sum();
        if total <= f64::EPSILON {
            let uniform = 1.0 / Component::CORE.len() as f64;
            return Self(Component::CORE.iter().map(|c| (*c, uniform)).collect());
        }
        for w in self.0.values_mut() {
            *w /= total;
        }
        self
    }
}

/// Base weights per query type.
fn base_weights(query_type: QueryType) -> WeightVector {
    use Component::*;
    let pairs: &[(Component, f64)] = match query_type {
        QueryType::Treatment => &[
            (Semantic, 0.30),
            (MedicalRelevance, 0.15),
            (Evidence, 0.30),
            (Recency, 0.10),
            (Citations, 0.15),
        ],
        QueryType::Diagnosis => &[
            (Semantic, 0.25),
            (MedicalRelevance, 0.15),
            (Evidence, 0.20),
            (Recency, 0.10),
            (Citations, 0.10),
            (Diagnostic, 0.20),
        ],
        QueryType::Prognosis => &[
            (Semantic, 0.30),
            (MedicalRelevance, 0.15),
            (Evidence, 0.25),
            (Recency, 0.10),
            (Citations, 0.20),
        ],
        QueryType::Mechanism => &[
            (Semantic, 0.20),
            (MedicalRelevance, 0.10),
            (Evidence, 0.10),
            (Recency, 0.30),
            (Citations, 0.10),
            (Mechanistic, 0.20),
        ],
        QueryType::Epidemiology => &[
            (Semantic, 0.25),
            (MedicalRelevance, 0.15),
            (Evidence, 0.20),
            (Recency, 0.15),
            (Citations, 0.10),
            (Methodology, 0.15),
        ],
        QueryType::General => &[
            (Semantic, 0.35),
            (MedicalRelevance, 0.20),
            (Evidence, 0.20),
            (Recency, 0.10),
            (Citations, 0.15),
        ],
    };
    WeightVector::from_pairs(pairs)
}

/// Additive modifiers per specialty.
fn domain_modifiers(domain: MedicalDomain) -> &'static [(Component, f64)] {
    use Component::*;
    match domain {
        // Trials are scarcer and outcomes softer; lean on the match itself.
        MedicalDomain::Psychiatry => &[(Evidence, -0.05), (Semantic, 0.05)],
        MedicalDomain::Surgery => &[(Evidence, -0.05), (Methodology, 0.10)],
        MedicalDomain::Oncology => &[(Evidence, 0.05), (Recency, 0.05)],
        MedicalDomain::InfectiousDisease => &[(Recency, 0.10)],
        MedicalDomain::Cardiology => &[(Evidence, 0.05)],
        MedicalDomain::Pediatrics => &[(MedicalRelevance, 0.05)],
        _ => &[],
    }
}

/// Produces the weight vector for a query under a set of user preferences.
#[derive(Debug, Clone, Default)]
pub struct AdaptiveWeightEngine {
    preferences: UserPreferences,
}

impl AdaptiveWeightEngine {
    pub fn new(preferences: UserPreferences) -> Self {
        Self { preferences }
    }

    pub fn weights_for(&self, analysis: &QueryAnalysis) -> WeightVector {
        let mut weights = base_weights(analysis.query_type);

        for (component, delta) in domain_modifiers(analysis.domain) {
            weights.add(*component, *delta);
        }

        let prefs = &self.preferences;
        weights.scale(Component::Recency, prefs.recency_priority);
        weights.scale(
            Component::Evidence,
            prefs.evidence_hierarchy.multiplier(),
        );
        if let Some(specialty) = prefs.specialty
            && analysis.domain != MedicalDomain::GeneralMedicine
            && specialty != analysis.domain
        {
            let penalty = prefs.specialty_mismatch_penalty.clamp(0.0, 1.0);
            weights.scale(Component::MedicalRelevance, 1.0 - penalty);
        }

        let weights = weights.normalized();
        tracing::trace!(?weights, query_type = %analysis.query_type, "Weights selected");
        weights
    }
}
