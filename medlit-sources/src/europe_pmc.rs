//! Europe PMC REST search (`resultType=core` carries abstracts).

use crate::http::HttpClient;
use crate::util::{leading_year, str_at, str_field, u64_field};
use async_trait::async_trait;
use medlit_core::config::SourcesConfig;
use medlit_core::error::SourceError;
use medlit_core::gateway::LiteratureSource;
use medlit_core::types::{RawRecord, SourceKind, SourceProfile};
use serde_json::Value;
use std::time::Duration;

pub const NAME: &str = "europe_pmc";
const EUROPE_PMC_API: &str = "https://www.ebi.ac.uk/europepmc/webservices/rest/search";

pub struct EuropePmcSource {
    http: HttpClient,
}

impl EuropePmcSource {
    pub fn new(config: &SourcesConfig) -> Result<Self, SourceError> {
        Ok(Self {
            http: HttpClient::new(NAME, config, Duration::from_millis(100))?,
        })
    }
}

#[async_trait]
impl LiteratureSource for EuropePmcSource {
    fn profile(&self) -> SourceProfile {
        SourceProfile::new(NAME, SourceKind::Bibliographic, 0.9)
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<RawRecord>, SourceError> {
        let url = format!(
            "{EUROPE_PMC_API}?format=json&resultType=core&pageSize={}&query={}",
            limit.min(1000),
            urlencoding::encode(query)
        );
        let body = self.http.get_json(&url, &[]).await?;
        parse_results(&body).map_err(|m| self.http.parse_error(m))
    }
}

fn parse_results(body: &Value) -> Result<Vec<RawRecord>, String> {
    let results = body
        .pointer("/resultList/result")
        .and_then(Value::as_array)
        .ok_or("missing resultList.result")?;
    Ok(results.iter().map(parse_result).collect())
}

fn parse_result(item: &Value) -> RawRecord {
    let pmid = str_field(item, "pmid");
    let publication_types: Vec<String> = item
        .pointer("/pubTypeList/pubType")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    let authors = str_field(item, "authorString")
        .map(|s| {
            s.trim_end_matches('.')
                .split(',')
                .map(|a| a.trim().to_string())
                .filter(|a| !a.is_empty())
                .collect()
        })
        .unwrap_or_default();

    RawRecord {
        title: str_field(item, "title").map(|t| t.trim_end_matches('.').to_string()),
        authors,
        abstract_text: str_field(item, "abstractText")
            .map(|a| crate::util::strip_markup(&a)),
        venue: str_at(item, "/journalInfo/journal/title")
            .or_else(|| str_field(item, "journalTitle")),
        year: str_field(item, "pubYear").and_then(|y| leading_year(&y)),
        doi: str_field(item, "doi"),
        url: pmid
            .as_ref()
            .map(|p| format!("https://europepmc.org/article/MED/{p}")),
        pmid,
        citation_count: u64_field(item, "citedByCount"),
        is_open_access: str_field(item, "isOpenAccess").map(|v| v == "Y"),
        study_type: publication_types
            .iter()
            .find(|t| !t.eq_ignore_ascii_case("journal article"))
            .cloned(),
        publication_types,
        ..RawRecord::new(NAME)
    }
}
