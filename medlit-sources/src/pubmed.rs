//! PubMed via NCBI E-utilities (`esearch` for ids, `esummary` for metadata).

use crate::http::{HttpClient, push_param};
use crate::util::{leading_year, str_array, str_field};
use async_trait::async_trait;
use medlit_core::config::SourcesConfig;
use medlit_core::error::SourceError;
use medlit_core::gateway::LiteratureSource;
use medlit_core::types::{RawRecord, SourceKind, SourceProfile};
use serde_json::Value;
use std::time::Duration;

pub const NAME: &str = "pubmed";
const EUTILS_API: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";

/// PubMed connector. Accepts MeSH field tags and boolean syntax as-is.
pub struct PubMedSource {
    http: HttpClient,
    api_key: Option<String>,
    email: Option<String>,
}

impl PubMedSource {
    pub fn new(config: &SourcesConfig) -> Result<Self, SourceError> {
        // NCBI allows 3 requests/s anonymously and 10 with a key.
        let interval = if config.ncbi_api_key.is_some() {
            Duration::from_millis(100)
        } else {
            Duration::from_millis(340)
        };
        Ok(Self {
            http: HttpClient::new(NAME, config, interval)?,
            api_key: config.ncbi_api_key.clone(),
            email: config.contact_email.clone(),
        })
    }

    fn url(&self, endpoint: &str, params: &str) -> String {
        let mut url = format!("{EUTILS_API}/{endpoint}.fcgi?db=pubmed&retmode=json&{params}");
        push_param(&mut url, "api_key", self.api_key.as_deref());
        push_param(&mut url, "email", self.email.as_deref());
        push_param(&mut url, "tool", Some("medlit"));
        url
    }
}

#[async_trait]
impl LiteratureSource for PubMedSource {
    fn profile(&self) -> SourceProfile {
        SourceProfile::new(NAME, SourceKind::Bibliographic, 0.95)
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<RawRecord>, SourceError> {
        let search_url = self.url(
            "esearch",
            &format!(
                "sort=relevance&retmax={limit}&term={}",
                urlencoding::encode(query)
            ),
        );
        let ids = parse_id_list(&self.http.get_json(&search_url, &[]).await?)
            .map_err(|m| self.http.parse_error(m))?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let summary_url = self.url("esummary", &format!("id={}", ids.join(",")));
        let body = self.http.get_json(&summary_url, &[]).await?;
        parse_summaries(&body).map_err(|m| self.http.parse_error(m))
    }
}

fn parse_id_list(body: &Value) -> Result<Vec<String>, String> {
    let list = body
        .pointer("/esearchresult/idlist")
        .and_then(Value::as_array)
        .ok_or("missing esearchresult.idlist")?;
    Ok(list
        .iter()
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect())
}

fn parse_summaries(body: &Value) -> Result<Vec<RawRecord>, String> {
    let result = body.get("result").ok_or("missing result")?;
    let uids = str_array(result, "uids");
    Ok(uids
        .iter()
        .filter_map(|uid| result.get(uid))
        .map(parse_summary)
        .collect())
}

fn parse_summary(doc: &Value) -> RawRecord {
    let pmid = str_field(doc, "uid");
    let doi = doc
        .get("articleids")
        .and_then(Value::as_array)
        .and_then(|ids| {
            ids.iter()
                .find(|id| id.get("idtype").and_then(Value::as_str) == Some("doi"))
        })
        .and_then(|id| str_field(id, "value"));
    let authors = doc
        .get("authors")
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(|a| str_field(a, "name")).collect())
        .unwrap_or_default();
    let publication_types = str_array(doc, "pubtype");

    RawRecord {
        title: str_field(doc, "title").map(|t| t.trim_end_matches('.').to_string()),
        authors,
        venue: str_field(doc, "fulljournalname").or_else(|| str_field(doc, "source")),
        year: str_field(doc, "pubdate")
            .or_else(|| str_field(doc, "epubdate"))
            .and_then(|d| leading_year(&d)),
        doi,
        url: pmid
            .as_ref()
            .map(|p| format!("https://pubmed.ncbi.nlm.nih.gov/{p}/")),
        pmid,
        study_type: publication_types.first().cloned(),
        publication_types,
        ..RawRecord::new(NAME)
    }
}
