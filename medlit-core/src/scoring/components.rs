//! Individual sub-scores, each in [0, 1].

use crate::types::{StudyDesign, UnifiedRecord, normalize_key_text};
use crate::vocabulary::{Vocabulary, any_term, contains_term, count_terms};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Named scoring dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    MedicalRelevance,
    Semantic,
    Evidence,
    Recency,
    Citations,
    Diagnostic,
    Mechanistic,
    Methodology,
}

impl Component {
    /// Components computed for every record.
    pub const CORE: [Component; 5] = [
        Component::MedicalRelevance,
        Component::Semantic,
        Component::Evidence,
        Component::Recency,
        Component::Citations,
    ];

    /// Components computed only when the weight vector asks for them.
    pub const OPTIONAL: [Component; 3] = [
        Component::Diagnostic,
        Component::Mechanistic,
        Component::Methodology,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Component::MedicalRelevance => "medical_relevance",
            Component::Semantic => "semantic",
            Component::Evidence => "evidence",
            Component::Recency => "recency",
            Component::Citations => "citations",
            Component::Diagnostic => "diagnostic",
            Component::Mechanistic => "mechanistic",
            Component::Methodology => "methodology",
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sub-scores for one record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreComponents {
    pub medical_relevance: f64,
    pub semantic: f64,
    pub evidence: f64,
    pub recency: f64,
    pub citations: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mechanistic: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub methodology: Option<f64>,
}

impl ScoreComponents {
    /// Value of a component, `None` if it was not computed.
    pub fn get(&self, component: Component) -> Option<f64> {
        match component {
            Component::MedicalRelevance => Some(self.medical_relevance),
            Component::Semantic => Some(self.semantic),
            Component::Evidence => Some(self.evidence),
            Component::Recency => Some(self.recency),
            Component::Citations => Some(self.citations),
            Component::Diagnostic => self.diagnostic,
            Component::Mechanistic => self.mechanistic,
            Component::Methodology => self.methodology,
        }
    }

    /// Computed components in `Component` order.
    pub fn iter(&self) -> impl Iterator<Item = (Component, f64)> + '_ {
        Component::CORE
            .into_iter()
            .chain(Component::OPTIONAL)
            .filter_map(|c| self.get(c).map(|v| (c, v)))
    }
}

/// Medical-relevance sub-score.
///
/// Base 0.3, +0.4 for a top-tier journal, +0.1 per distinct medical-context
/// term (at most +0.3), -0.4 when non-medical terms appear with no medical
/// context, -0.2 for animal-study indicators. Clamped to [0, 1].
pub fn medical_relevance(journal: &str, text_lower: &str, vocabulary: &Vocabulary) -> f64 {
    let mut score = 0.3;
    if is_top_journal(journal, vocabulary) {
        score += 0.4;
    }
    let context_hits = count_terms(text_lower, &vocabulary.medical_context);
    score += (context_hits as f64 * 0.1).min(0.3);
    if context_hits == 0 && any_term(text_lower, &vocabulary.non_medical) {
        score -= 0.4;
    }
    if any_term(text_lower, &vocabulary.animal_study) {
        score -= 0.2;
    }
    score.clamp(0.0, 1.0)
}

/// Whether the journal is one of the top-tier titles.
///
/// The venue must name a listed title exactly. Case and punctuation are
/// ignored, as are a leading "the" and a trailing parenthetical such as
/// `"Lancet (London, England)"`. "BMJ Open" is not "BMJ".
pub fn is_top_journal(journal: &str, vocabulary: &Vocabulary) -> bool {
    let venue = journal_key(journal);
    !venue.is_empty()
        && vocabulary
            .top_journals
            .iter()
            .any(|title| journal_key(title) == venue)
}

fn journal_key(name: &str) -> String {
    let name = name.trim();
    let name = match name.rfind('(') {
        Some(i) if i > 0 && name.ends_with(')') => &name[..i],
        _ => name,
    };
    let key = normalize_key_text(name);
    match key.strip_prefix("the ") {
        Some(rest) => rest.to_string(),
        None => key,
    }
}

/// Query alignment sub-score.
///
/// Each query term scores 1.0 on an exact word match and 0.5 on a stem
/// match (one word a prefix of the other, four characters or more). The
/// title ratio weighs 0.6, the abstract ratio 0.3, and Jaccard overlap
/// between query and document term sets adds 0.2. Capped at 1.0. A query
/// with no content terms is neutral (0.5).
pub fn query_alignment(
    query_terms: &[String],
    title_terms: &BTreeSet<String>,
    abstract_terms: &BTreeSet<String>,
) -> f64 {
    if query_terms.is_empty() {
        return 0.5;
    }
    let n = query_terms.len() as f64;
    let title = query_terms
        .iter()
        .map(|t| term_match(t, title_terms))
        .sum::<f64>()
        / n;
    let abstract_score = query_terms
        .iter()
        .map(|t| term_match(t, abstract_terms))
        .sum::<f64>()
        / n;

    let query_set: BTreeSet<&str> = query_terms.iter().map(String::as_str).collect();
    let doc_set: BTreeSet<&str> = title_terms
        .iter()
        .chain(abstract_terms.iter())
        .map(String::as_str)
        .collect();
    let union = query_set.union(&doc_set).count();
    let jaccard = if union == 0 {
        0.0
    } else {
        query_set.intersection(&doc_set).count() as f64 / union as f64
    };

    (0.6 * title + 0.3 * abstract_score + 0.2 * jaccard).min(1.0)
}

fn term_match(term: &str, words: &BTreeSet<String>) -> f64 {
    if words.contains(term) {
        return 1.0;
    }
    if term.len() < 4 {
        return 0.0;
    }
    let partial = words
        .iter()
        .any(|w| w.len() >= 4 && (w.starts_with(term) || term.starts_with(w.as_str())));
    if partial { 0.5 } else { 0.0 }
}

/// Lowercase content words of `text`, minus stop words and single characters.
pub fn tokenize(text: &str, vocabulary: &Vocabulary) -> BTreeSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= 2 && !vocabulary.is_stopword(w))
        .map(str::to_string)
        .collect()
}

/// Query terms in order of appearance, deduplicated.
pub fn query_terms(query: &str, vocabulary: &Vocabulary) -> Vec<String> {
    let lower = query.to_lowercase();
    let mut terms: Vec<String> = Vec::new();
    for word in lower.split(|c: char| !c.is_alphanumeric()) {
        if word.chars().count() < 2 || vocabulary.is_stopword(word) {
            continue;
        }
        if !terms.iter().any(|t| t == word) {
            terms.push(word.to_string());
        }
    }
    terms
}

/// Classify a record's design. Designs are tried strongest first; for each,
/// the title, the abstract and the declared study/publication types are
/// checked in that order. The first hit wins.
pub fn classify_study_design(record: &UnifiedRecord, vocabulary: &Vocabulary) -> StudyDesign {
    let title = record.title.to_lowercase();
    let abstract_text = record.abstract_text.to_lowercase();
    let mut declared = record.study_type.clone().unwrap_or_default();
    for pt in &record.publication_types {
        declared.push('\n');
        declared.push_str(pt);
    }
    let declared = declared.to_lowercase();

    for design in StudyDesign::PRIORITY {
        let terms = vocabulary.study_designs.for_design(design);
        if [&title, &abstract_text, &declared]
            .iter()
            .any(|field| terms.iter().any(|t| contains_term(field, t)))
        {
            return design;
        }
    }
    StudyDesign::Unclear
}

/// Recency sub-score by age in years relative to `reference_year`.
pub fn recency(year: Option<i32>, reference_year: i32) -> f64 {
    let Some(year) = year else {
        return 0.3;
    };
    let age = reference_year - year;
    match age {
        // Issue dates up to one year ahead are common for online-first articles.
        -1..=1 => 1.0,
        2 => 0.9,
        3 => 0.8,
        4..=5 => 0.7,
        6..=10 => 0.5,
        11..=15 => 0.3,
        16.. => 0.1,
        _ => 0.3,
    }
}

/// Citation-impact sub-score on a log-like bucket scale.
pub fn citation_impact(count: u64) -> f64 {
    match count {
        0 => 0.1,
        1..=4 => 0.25,
        5..=9 => 0.4,
        10..=19 => 0.5,
        20..=49 => 0.6,
        50..=99 => 0.7,
        100..=249 => 0.8,
        250..=499 => 0.9,
        _ => 1.0,
    }
}

/// Density of distinct `terms` hits, saturating at three.
pub fn term_density(text_lower: &str, terms: &[String]) -> f64 {
    (count_terms(text_lower, terms) as f64 / 3.0).min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vocab() -> Vocabulary {
        Vocabulary::builtin()
    }

    fn record(title: &str, abstract_text: &str) -> UnifiedRecord {
        UnifiedRecord {
            title: title.into(),
            abstract_text: abstract_text.into(),
            authors: vec![],
            journal: "Unknown journal".into(),
            year: None,
            url: String::new(),
            doi: None,
            source_name: "test".into(),
            citation_count: 0,
            is_open_access: false,
            study_type: None,
            publication_types: vec![],
        }
    }

    #[test]
    fn test_medical_relevance_top_journal_with_context() {
        let v = vocab();
        let score = medical_relevance(
            "the lancet",
            "randomized trial in patients with type 2 diabetes receiving treatment",
            &v,
        );
        assert!((score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_top_journal_requires_exact_title() {
        let v = vocab();
        for venue in ["the lancet", "The Lancet", "bmj", "The BMJ", "Lancet (London, England)", "N Engl J Med"] {
            assert!(is_top_journal(venue, &v), "{venue} should be top-tier");
        }
        for venue in [
            "world journal of gastroenterology",
            "bmj open",
            "circulation research",
            "jama network open",
            "gastroenterology research and practice",
            "the lancet regional health - europe",
            "",
        ] {
            assert!(!is_top_journal(venue, &v), "{venue} should not be top-tier");
        }
    }

    #[test]
    fn test_medical_relevance_ignores_near_miss_journal() {
        let v = vocab();
        let text = "a study of patients";
        let listed = medical_relevance("Circulation", text, &v);
        let near_miss = medical_relevance("Circulation Research", text, &v);
        assert!((listed - near_miss - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_medical_relevance_non_medical_only() {
        let v = vocab();
        let score = medical_relevance(
            "journal of business research",
            "a machine learning business model for retail",
            &v,
        );
        assert!(score <= 0.1);
    }

    #[test]
    fn test_medical_relevance_animal_penalty() {
        let v = vocab();
        let human = medical_relevance("", "disease progression in patients", &v);
        let animal = medical_relevance("", "disease progression in mice", &v);
        assert!(animal < human);
    }

    #[test]
    fn test_alignment_exact_beats_partial() {
        let v = vocab();
        let q = query_terms("statin therapy", &v);
        let exact = query_alignment(&q, &tokenize("Statin therapy outcomes", &v), &BTreeSet::new());
        let partial = query_alignment(&q, &tokenize("Statins and therapeutic use", &v), &BTreeSet::new());
        assert!(exact > partial);
        assert!(partial > 0.0);
        assert!(exact <= 1.0);
    }

    #[test]
    fn test_alignment_neutral_without_terms() {
        assert_eq!(query_alignment(&[], &BTreeSet::new(), &BTreeSet::new()), 0.5);
    }

    #[test]
    fn test_classify_study_design_priority() {
        let v = vocab();
        let r = record(
            "Statins after stroke: a systematic review and meta-analysis",
            "We pooled randomized controlled trials.",
        );
        assert_eq!(classify_study_design(&r, &v), StudyDesign::MetaAnalysis);

        let mut r = record("Aspirin in older adults", "");
        r.publication_types = vec!["Randomized Controlled Trial".into()];
        assert_eq!(
            classify_study_design(&r, &v),
            StudyDesign::RandomizedControlledTrial
        );

        let r = record("Thoughts on practice", "An editorial.");
        assert_eq!(classify_study_design(&r, &v), StudyDesign::Unclear);
    }

    #[test]
    fn test_recency_buckets() {
        assert_eq!(recency(Some(2026), 2026), 1.0);
        assert_eq!(recency(Some(2027), 2026), 1.0);
        assert_eq!(recency(Some(2024), 2026), 0.9);
        assert_eq!(recency(Some(2021), 2026), 0.7);
        assert_eq!(recency(Some(2016), 2026), 0.5);
        assert_eq!(recency(Some(2011), 2026), 0.3);
        assert_eq!(recency(Some(1990), 2026), 0.1);
        assert_eq!(recency(None, 2026), 0.3);
        assert_eq!(recency(Some(2040), 2026), 0.3);
    }

    #[test]
    fn test_citation_buckets() {
        assert_eq!(citation_impact(0), 0.1);
        assert_eq!(citation_impact(1), 0.25);
        assert_eq!(citation_impact(10), 0.5);
        assert_eq!(citation_impact(300), 0.9);
        assert_eq!(citation_impact(500), 1.0);
        assert_eq!(citation_impact(u64::MAX), 1.0);
    }

    #[test]
    fn test_components_iter_skips_absent_optionals() {
        let c = ScoreComponents {
            diagnostic: Some(0.4),
            ..Default::default()
        };
        let names: Vec<Component> = c.iter().map(|(n, _)| n).collect();
        assert_eq!(names.len(), 6);
        assert!(names.contains(&Component::Diagnostic));
        assert!(!names.contains(&Component::Methodology));
    }
}
