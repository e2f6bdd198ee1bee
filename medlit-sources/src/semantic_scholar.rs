//! Semantic Scholar Graph API paper search.

use crate::http::HttpClient;
use crate::util::{str_array, str_at, str_field, u64_field};
use async_trait::async_trait;
use medlit_core::config::SourcesConfig;
use medlit_core::error::SourceError;
use medlit_core::gateway::LiteratureSource;
use medlit_core::types::{RawRecord, SourceKind, SourceProfile};
use serde_json::Value;
use std::time::Duration;

pub const NAME: &str = "semantic_scholar";
const SEMANTIC_SCHOLAR_API: &str = "https://api.semanticscholar.org/graph/v1/paper/search";
const SEMANTIC_SCHOLAR_FIELDS: &str =
    "title,abstract,year,venue,authors,externalIds,citationCount,isOpenAccess,publicationTypes,url";

/// Rate-limited Semantic Scholar client.
pub struct SemanticScholarSource {
    http: HttpClient,
    api_key: Option<String>,
}

impl SemanticScholarSource {
    pub fn new(config: &SourcesConfig) -> Result<Self, SourceError> {
        // One request per second on the shared pool.
        Ok(Self {
            http: HttpClient::new(NAME, config, Duration::from_secs(1))?,
            api_key: config.semantic_scholar_api_key.clone(),
        })
    }
}

#[async_trait]
impl LiteratureSource for SemanticScholarSource {
    fn profile(&self) -> SourceProfile {
        SourceProfile::new(NAME, SourceKind::Aggregator, 0.8)
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<RawRecord>, SourceError> {
        let url = format!(
            "{SEMANTIC_SCHOLAR_API}?query={}&limit={}&fields={SEMANTIC_SCHOLAR_FIELDS}",
            urlencoding::encode(query),
            limit.min(100)
        );
        let headers: Vec<(&str, &str)> = self
            .api_key
            .as_deref()
            .map(|key| vec![("x-api-key", key)])
            .unwrap_or_default();
        let body = self.http.get_json(&url, &headers).await?;
        parse_search(&body).map_err(|m| self.http.parse_error(m))
    }
}

fn parse_search(body: &Value) -> Result<Vec<RawRecord>, String> {
    // An empty result page omits `data` entirely.
    if body.get("total").and_then(Value::as_u64) == Some(0) {
        return Ok(Vec::new());
    }
    let data = body
        .get("data")
        .and_then(Value::as_array)
        .ok_or("missing data array")?;
    Ok(data.iter().map(parse_paper).collect())
}

fn parse_paper(paper: &Value) -> RawRecord {
    let authors = paper
        .get("authors")
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(|a| str_field(a, "name")).collect())
        .unwrap_or_default();
    let publication_types = str_array(paper, "publicationTypes");

    RawRecord {
        title: str_field(paper, "title"),
        authors,
        abstract_text: str_field(paper, "abstract"),
        venue: str_field(paper, "venue"),
        year: paper
            .get("year")
            .and_then(Value::as_i64)
            .and_then(|y| i32::try_from(y).ok()),
        doi: str_at(paper, "/externalIds/DOI"),
        pmid: str_at(paper, "/externalIds/PubMed"),
        url: str_field(paper, "url"),
        citation_count: u64_field(paper, "citationCount"),
        is_open_access: paper.get("isOpenAccess").and_then(Value::as_bool),
        study_type: publication_types
            .iter()
            .find(|t| t.as_str() != "JournalArticle")
            .map(|t| humanize_type(t)),
        publication_types,
        ..RawRecord::new(NAME)
    }
}

/// `MetaAnalysis` -> `Meta Analysis`, `ClinicalTrial` -> `Clinical Trial`.
fn humanize_type(camel: &str) -> String {
    let mut out = String::with_capacity(camel.len() + 4);
    for (i, ch) in camel.chars().enumerate() {
        if i > 0 && ch.is_uppercase() {
            out.push(' ');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_parse_search() {
        let body = json!({
            "total": 1,
            "offset": 0,
            "data": [{
                "paperId": "abc",
                "title": "SGLT2 inhibitors in heart failure: a meta-analysis",
                "abstract": "We pooled 12 trials (n = 21,000).",
                "year": 2022,
                "venue": "European Heart Journal",
                "authors": [{"authorId": "1", "name": "M. Rossi"}],
                "externalIds": {"DOI": "10.1093/eurheartj/ehac001", "PubMed": "35000001"},
                "citationCount": 410,
                "isOpenAccess": false,
                "publicationTypes": ["JournalArticle", "MetaAnalysis"],
                "url": "https://www.semanticscholar.org/paper/abc"
            }]
        });
        let records = parse_search(&body).unwrap();
        let r = &records[0];
        assert_eq!(r.source, "semantic_scholar");
        assert_eq!(r.year, Some(2022));
        assert_eq!(r.doi.as_deref(), Some("10.1093/eurheartj/ehac001"));
        assert_eq!(r.pmid.as_deref(), Some("35000001"));
        assert_eq!(r.citation_count, Some(410));
        assert_eq!(r.is_open_access, Some(false));
        assert_eq!(r.study_type.as_deref(), Some("Meta Analysis"));
        assert_eq!(r.authors, vec!["M. Rossi"]);
    }

    #[test]
    fn test_empty_page_without_data() {
        assert!(parse_search(&json!({"total": 0, "offset": 0})).unwrap().is_empty());
        assert!(parse_search(&json!({"message": "oops"})).is_err());
    }
}
