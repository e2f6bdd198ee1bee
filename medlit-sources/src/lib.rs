//! # MedLit Sources
//!
//! `LiteratureSource` implementations for the public biomedical literature
//! APIs, plus the shared HTTP client (rate limiting and response caching)
//! they are built on.

pub mod clinical_trials;
pub mod crossref;
pub mod europe_pmc;
pub mod http;
pub mod openalex;
pub mod pubmed;
pub mod semantic_scholar;
mod util;

use medlit_core::config::SourcesConfig;
use medlit_core::error::SourceError;
use medlit_core::gateway::{LiteratureSource, RewritingSource};
use std::sync::Arc;

/// Every connector name, in construction order.
pub const ALL_SOURCES: [&str; 6] = [
    pubmed::NAME,
    europe_pmc::NAME,
    semantic_scholar::NAME,
    openalex::NAME,
    crossref::NAME,
    clinical_trials::NAME,
];

/// Build every enabled connector. Sources other than PubMed do not understand
/// MeSH field tags, so they get the plain-keyword rewrite.
pub fn build_sources(
    config: &SourcesConfig,
) -> Result<Vec<Arc<dyn LiteratureSource>>, SourceError> {
    for name in &config.enabled {
        if !ALL_SOURCES.contains(&name.as_str()) {
            tracing::warn!(source = %name, "Unknown source in configuration, ignoring");
        }
    }

    let mut sources: Vec<Arc<dyn LiteratureSource>> = Vec::new();
    for name in ALL_SOURCES.iter().filter(|n| config.is_enabled(n)) {
        let source: Arc<dyn LiteratureSource> = match *name {
            pubmed::NAME => Arc::new(pubmed::PubMedSource::new(config)?),
            europe_pmc::NAME => plain(europe_pmc::EuropePmcSource::new(config)?),
            semantic_scholar::NAME => {
                plain(semantic_scholar::SemanticScholarSource::new(config)?)
            }
            openalex::NAME => plain(openalex::OpenAlexSource::new(config)?),
            crossref::NAME => plain(crossref::CrossrefSource::new(config)?),
            clinical_trials::NAME => plain(clinical_trials::ClinicalTrialsSource::new(config)?),
            _ => continue,
        };
        sources.push(source);
    }
    tracing::debug!(count = sources.len(), "Literature sources built");
    Ok(sources)
}

fn plain(source: impl LiteratureSource + 'static) -> Arc<dyn LiteratureSource> {
    Arc::new(RewritingSource::plain(Arc::new(source)))
}
