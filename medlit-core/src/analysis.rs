//! Rule-based query classification.
//!
//! Classifies a free-text query into intent, medical specialty, complexity
//! and optional population/evidence hints by testing keyword membership
//! against the vocabulary tables. No I/O, no error path: an unmatched query
//! becomes `{general, general_medicine, simple}`.

use crate::vocabulary::{Vocabulary, any_term, matched_terms};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// Clinical intent of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    Treatment,
    Diagnosis,
    Prognosis,
    Mechanism,
    Epidemiology,
    General,
}

impl QueryType {
    /// Classification order; earlier types win ties.
    pub const RANKED: [QueryType; 5] = [
        QueryType::Treatment,
        QueryType::Diagnosis,
        QueryType::Prognosis,
        QueryType::Mechanism,
        QueryType::Epidemiology,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueryType::Treatment => "treatment",
            QueryType::Diagnosis => "diagnosis",
            QueryType::Prognosis => "prognosis",
            QueryType::Mechanism => "mechanism",
            QueryType::Epidemiology => "epidemiology",
            QueryType::General => "general",
        }
    }
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed set of medical specialties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MedicalDomain {
    Cardiology,
    Oncology,
    Endocrinology,
    Neurology,
    Psychiatry,
    InfectiousDisease,
    Pulmonology,
    Gastroenterology,
    Nephrology,
    Rheumatology,
    Dermatology,
    Pediatrics,
    ObstetricsGynecology,
    Surgery,
    EmergencyMedicine,
    GeneralMedicine,
}

impl MedicalDomain {
    /// Every specialty in tie-break order.
    pub const ALL: [MedicalDomain; 16] = [
        MedicalDomain::Cardiology,
        MedicalDomain::Oncology,
        MedicalDomain::Endocrinology,
        MedicalDomain::Neurology,
        MedicalDomain::Psychiatry,
        MedicalDomain::InfectiousDisease,
        MedicalDomain::Pulmonology,
        MedicalDomain::Gastroenterology,
        MedicalDomain::Nephrology,
        MedicalDomain::Rheumatology,
        MedicalDomain::Dermatology,
        MedicalDomain::Pediatrics,
        MedicalDomain::ObstetricsGynecology,
        MedicalDomain::Surgery,
        MedicalDomain::EmergencyMedicine,
        MedicalDomain::GeneralMedicine,
    ];

    /// Key used in vocabulary tables and configuration.
    pub fn key(&self) -> &'static str {
        match self {
            MedicalDomain::Cardiology => "cardiology",
            MedicalDomain::Oncology => "oncology",
            MedicalDomain::Endocrinology => "endocrinology",
            MedicalDomain::Neurology => "neurology",
            MedicalDomain::Psychiatry => "psychiatry",
            MedicalDomain::InfectiousDisease => "infectious_disease",
            MedicalDomain::Pulmonology => "pulmonology",
            MedicalDomain::Gastroenterology => "gastroenterology",
            MedicalDomain::Nephrology => "nephrology",
            MedicalDomain::Rheumatology => "rheumatology",
            MedicalDomain::Dermatology => "dermatology",
            MedicalDomain::Pediatrics => "pediatrics",
            MedicalDomain::ObstetricsGynecology => "obstetrics_gynecology",
            MedicalDomain::Surgery => "surgery",
            MedicalDomain::EmergencyMedicine => "emergency_medicine",
            MedicalDomain::GeneralMedicine => "general_medicine",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|d| d.key() == key)
    }
}

impl fmt::Display for MedicalDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// How demanding a query is; drives threshold relaxation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Simple,
    Moderate,
    Complex,
    Expert,
}

impl Complexity {
    fn from_points(points: u32) -> Self {
        match points {
            0 => Complexity::Simple,
            1 => Complexity::Moderate,
            2 | 3 => Complexity::Complex,
            _ => Complexity::Expert,
        }
    }
}

/// Population the query is about, when stated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PopulationFocus {
    Pediatric,
    Elderly,
    Pregnancy,
    Women,
}

/// Kind of evidence the query asks for, when stated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceFocus {
    SystematicReview,
    RandomizedTrials,
    Observational,
    Guidelines,
}

/// Immutable classification of one query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryAnalysis {
    pub query_type: QueryType,
    pub domain: MedicalDomain,
    pub complexity: Complexity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub population_focus: Option<PopulationFocus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence_focus: Option<EvidenceFocus>,
    /// Distinct medical concepts detected (vocabulary terms and MeSH headings).
    pub concepts: Vec<String>,
    /// Every specialty with at least one keyword hit.
    pub matched_domains: Vec<MedicalDomain>,
    /// MeSH headings for the query, longest phrase first.
    pub mesh_headings: Vec<String>,
}

impl QueryAnalysis {
    /// The fallback classification for queries nothing matches.
    pub fn general() -> Self {
        Self {
            query_type: QueryType::General,
            domain: MedicalDomain::GeneralMedicine,
            complexity: Complexity::Simple,
            population_focus: None,
            evidence_focus: None,
            concepts: Vec::new(),
            matched_domains: Vec::new(),
            mesh_headings: Vec::new(),
        }
    }
}

/// Classifies queries against a vocabulary.
#[derive(Debug, Clone)]
pub struct QueryAnalyzer {
    vocabulary: Arc<Vocabulary>,
}

impl QueryAnalyzer {
    pub fn new(vocabulary: Arc<Vocabulary>) -> Self {
        Self { vocabulary }
    }

    /// Classify a query.
    pub fn analyze(&self, query: &str) -> QueryAnalysis {
        let text = query.trim().to_lowercase();
        if text.is_empty() {
            return QueryAnalysis::general();
        }

        let query_type = self.classify_type(&text);
        let (domain, matched_domains, domain_terms) = self.classify_domain(&text);
        let mesh = self.vocabulary.mesh_matches(&text);

        let mut concepts: BTreeSet<String> = domain_terms
            .iter()
            .map(|t| t.trim_end_matches('*').to_string())
            .collect();
        for (_, heading) in &mesh {
            concepts.insert(heading.to_lowercase());
        }

        let relational = any_term(&text, &self.vocabulary.relational_cues);
        let comparative = any_term(&text, &self.vocabulary.comparative_cues);

        let mut points = match concepts.len() {
            0 | 1 => 0,
            2 | 3 => 1,
            _ => 2,
        };
        if matched_domains.len() >= 2 {
            points += 1;
        }
        if relational {
            points += 1;
        }
        if comparative {
            points += 1;
        }
        let complexity = Complexity::from_points(points);

        let analysis = QueryAnalysis {
            query_type,
            domain,
            complexity,
            population_focus: self.population_focus(&text),
            evidence_focus: self.evidence_focus(&text),
            concepts: concepts.into_iter().collect(),
            matched_domains,
            mesh_headings: mesh.into_iter().map(|(_, h)| h).collect(),
        };
        tracing::debug!(
            query_type = %analysis.query_type,
            domain = %analysis.domain,
            complexity = ?analysis.complexity,
            concepts = analysis.concepts.len(),
            "Query analyzed"
        );
        analysis
    }

    fn classify_type(&self, text: &str) -> QueryType {
        let terms = &self.vocabulary.query_types;
        let mut best = QueryType::General;
        let mut best_hits = 0;
        for query_type in QueryType::RANKED {
            let list = match query_type {
                QueryType::Treatment => &terms.treatment,
                QueryType::Diagnosis => &terms.diagnosis,
                QueryType::Prognosis => &terms.prognosis,
                QueryType::Mechanism => &terms.mechanism,
                QueryType::Epidemiology => &terms.epidemiology,
                QueryType::General => continue,
            };
            let hits = matched_terms(text, list).len();
            if hits > best_hits {
                best = query_type;
                best_hits = hits;
            }
        }
        best
    }

    fn classify_domain(&self, text: &str) -> (MedicalDomain, Vec<MedicalDomain>, Vec<String>) {
        let mut best = MedicalDomain::GeneralMedicine;
        let mut best_hits = 0;
        let mut matched = Vec::new();
        let mut all_terms = Vec::new();

        for domain in MedicalDomain::ALL {
            let Some(list) = self.vocabulary.domains.get(domain.key()) else {
                continue;
            };
            let hits = matched_terms(text, list);
            if hits.is_empty() {
                continue;
            }
            matched.push(domain);
            if hits.len() > best_hits {
                best = domain;
                best_hits = hits.len();
            }
            all_terms.extend(hits.into_iter().map(str::to_string));
        }
        (best, matched, all_terms)
    }

    fn population_focus(&self, text: &str) -> Option<PopulationFocus> {
        let p = &self.vocabulary.population;
        [
            (PopulationFocus::Pediatric, &p.pediatric),
            (PopulationFocus::Elderly, &p.elderly),
            (PopulationFocus::Pregnancy, &p.pregnancy),
            (PopulationFocus::Women, &p.women),
        ]
        .into_iter()
        .find(|(_, list)| any_term(text, list))
        .map(|(focus, _)| focus)
    }

    fn evidence_focus(&self, text: &str) -> Option<EvidenceFocus> {
        let e = &self.vocabulary.evidence_focus;
        [
            (EvidenceFocus::SystematicReview, &e.systematic_review),
            (EvidenceFocus::RandomizedTrials, &e.randomized_trials),
            (EvidenceFocus::Observational, &e.observational),
            (EvidenceFocus::Guidelines, &e.guidelines),
        ]
        .into_iter()
        .find(|(_, list)| any_term(text, list))
        .map(|(focus, _)| focus)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyzer() -> QueryAnalyzer {
        QueryAnalyzer::new(Arc::new(Vocabulary::builtin()))
    }

    #[test]
    fn test_treatment_query() {
        let analysis = analyzer().analyze("metformin type 2 diabetes treatment");
        assert_eq!(analysis.query_type, QueryType::Treatment);
        assert_eq!(analysis.domain, MedicalDomain::Endocrinology);
        assert!(
            analysis
                .mesh_headings
                .contains(&"Diabetes Mellitus, Type 2".to_string())
        );
    }

    #[test]
    fn test_diagnosis_query() {
        let analysis = analyzer().analyze("diagnostic accuracy of screening for lung cancer");
        assert_eq!(analysis.query_type, QueryType::Diagnosis);
        assert!(analysis.matched_domains.contains(&MedicalDomain::Oncology));
    }

    #[test]
    fn test_mechanism_query() {
        let analysis = analyzer().analyze("molecular pathway of insulin resistance");
        assert_eq!(analysis.query_type, QueryType::Mechanism);
    }

    #[test]
    fn test_unmatched_defaults_to_general() {
        let analysis = analyzer().analyze("hello world");
        assert_eq!(analysis, QueryAnalysis::general());
        assert_eq!(analyzer().analyze("   "), QueryAnalysis::general());
    }

    #[test]
    fn test_complexity_grows_with_relational_and_multi_domain() {
        let simple = analyzer().analyze("asthma");
        assert_eq!(simple.complexity, Complexity::Simple);

        let complex = analyzer().analyze(
            "impact of prior depression on heart failure outcomes in patients with diabetes and chronic kidney disease",
        );
        assert!(complex.complexity >= Complexity::Complex);
        assert!(complex.matched_domains.len() >= 3);
    }

    #[test]
    fn test_population_and_evidence_hints() {
        let analysis = analyzer().analyze("meta-analysis of asthma treatment in children");
        assert_eq!(analysis.population_focus, Some(PopulationFocus::Pediatric));
        assert_eq!(analysis.evidence_focus, Some(EvidenceFocus::SystematicReview));
    }

    #[test]
    fn test_domain_key_roundtrip() {
        for domain in MedicalDomain::ALL {
            assert_eq!(MedicalDomain::from_key(domain.key()), Some(domain));
        }
        assert_eq!(MedicalDomain::from_key("astrology"), None);
    }
}
