//! Record normalization and de-duplication.
//!
//! Every `RawRecord` is turned into a `UnifiedRecord` with field defaults,
//! then records sharing an identity key (DOI, else normalized title and
//! journal) collapse to the first one seen. Unifying already-unified output
//! is a no-op.

use crate::config::DuplicatePolicy;
use crate::types::{RawRecord, UnifiedRecord};
use std::collections::HashMap;

pub const UNTITLED: &str = "Untitled";
pub const UNKNOWN_JOURNAL: &str = "Unknown journal";

const EARLIEST_YEAR: i32 = 1800;

const DOI_PREFIXES: &[&str] = &[
    "https://doi.org/",
    "http://doi.org/",
    "https://dx.doi.org/",
    "http://dx.doi.org/",
    "doi:",
];

/// Normalizes and de-duplicates records.
#[derive(Debug, Clone)]
pub struct Unifier {
    policy: DuplicatePolicy,
    reference_year: i32,
}

impl Unifier {
    pub fn new(policy: DuplicatePolicy, reference_year: i32) -> Self {
        Self {
            policy,
            reference_year,
        }
    }

    /// Convert one raw record into the canonical shape.
    pub fn normalize(&self, raw: RawRecord) -> UnifiedRecord {
        let title = clean(raw.title).unwrap_or_else(|| UNTITLED.to_string());
        let journal = clean(raw.venue).unwrap_or_else(|| UNKNOWN_JOURNAL.to_string());
        let doi = raw.doi.as_deref().and_then(normalize_doi);
        let year = raw
            .year
            .filter(|y| (EARLIEST_YEAR..=self.reference_year + 1).contains(y));

        let url = clean(raw.url)
            .or_else(|| doi.as_ref().map(|d| format!("https://doi.org/{d}")))
            .or_else(|| {
                clean(raw.pmid).map(|p| format!("https://pubmed.ncbi.nlm.nih.gov/{p}/"))
            })
            .unwrap_or_default();

        UnifiedRecord {
            title,
            abstract_text: clean(raw.abstract_text).unwrap_or_default(),
            authors: raw
                .authors
                .into_iter()
                .map(|a| a.trim().to_string())
                .filter(|a| !a.is_empty())
                .collect(),
            journal,
            year,
            url,
            doi,
            source_name: raw.source,
            citation_count: raw.citation_count.unwrap_or(0),
            is_open_access: raw.is_open_access.unwrap_or(false),
            study_type: clean(raw.study_type),
            publication_types: raw
                .publication_types
                .into_iter()
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    /// Normalize then de-duplicate, preserving first-seen order.
    pub fn unify(&self, raw: Vec<RawRecord>) -> Vec<UnifiedRecord> {
        let normalized = raw.into_iter().map(|r| self.normalize(r)).collect();
        self.dedup(normalized)
    }

    /// Collapse records sharing a `dedup_key`, keeping the first seen.
    pub fn dedup(&self, records: Vec<UnifiedRecord>) -> Vec<UnifiedRecord> {
        let before = records.len();
        let mut index: HashMap<String, usize> = HashMap::with_capacity(records.len());
        let mut out: Vec<UnifiedRecord> = Vec::with_capacity(records.len());

        for record in records {
            let key = record.dedup_key();
            match index.get(&key) {
                Some(&i) => {
                    if self.policy == DuplicatePolicy::MergeFields {
                        merge_missing(&mut out[i], record);
                    }
                }
                None => {
                    index.insert(key, out.len());
                    out.push(record);
                }
            }
        }

        if out.len() < before {
            tracing::debug!(
                before,
                after = out.len(),
                policy = ?self.policy,
                "De-duplicated records"
            );
        }
        out
    }
}

fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|v| !v.is_empty())
}

/// Lowercase DOI without resolver prefix; `None` when nothing is left.
pub fn normalize_doi(doi: &str) -> Option<String> {
    let trimmed = doi.trim();
    let lower = trimmed.to_lowercase();
    let stripped = DOI_PREFIXES
        .iter()
        .find_map(|p| lower.strip_prefix(p))
        .unwrap_or(&lower)
        .trim();
    (!stripped.is_empty()).then(|| stripped.to_string())
}

/// Fill the empty fields of `first` from `later` without overwriting.
/// The identity fields (title, journal, DOI) are never touched, so the
/// record keeps its key.
fn merge_missing(first: &mut UnifiedRecord, later: UnifiedRecord) {
    if first.abstract_text.is_empty() {
        first.abstract_text = later.abstract_text;
    }
    if first.authors.is_empty() {
        first.authors = later.authors;
    }
    if first.year.is_none() {
        first.year = later.year;
    }
    if first.url.is_empty() {
        first.url = later.url;
    }
    if first.study_type.is_none() {
        first.study_type = later.study_type;
    }
    if first.publication_types.is_empty() {
        first.publication_types = later.publication_types;
    }
    first.citation_count = first.citation_count.max(later.citation_count);
    first.is_open_access |= later.is_open_access;
}
