//! OpenAlex works search.

use crate::http::{HttpClient, push_param};
use crate::util::{str_at, str_field, u64_field};
use async_trait::async_trait;
use medlit_core::config::SourcesConfig;
use medlit_core::error::SourceError;
use medlit_core::gateway::LiteratureSource;
use medlit_core::types::{RawRecord, SourceKind, SourceProfile};
use serde_json::Value;
use std::time::Duration;

pub const NAME: &str = "openalex";
const OPENALEX_API: &str = "https://api.openalex.org/works";

pub struct OpenAlexSource {
    http: HttpClient,
    email: Option<String>,
}

impl OpenAlexSource {
    pub fn new(config: &SourcesConfig) -> Result<Self, SourceError> {
        Ok(Self {
            http: HttpClient::new(NAME, config, Duration::from_millis(100))?,
            email: config.contact_email.clone(),
        })
    }
}

#[async_trait]
impl LiteratureSource for OpenAlexSource {
    fn profile(&self) -> SourceProfile {
        SourceProfile::new(NAME, SourceKind::Aggregator, 0.75)
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<RawRecord>, SourceError> {
        let mut url = format!(
            "{OPENALEX_API}?search={}&per_page={}",
            urlencoding::encode(query),
            limit.clamp(1, 200)
        );
        push_param(&mut url, "mailto", self.email.as_deref());
        let body = self.http.get_json(&url, &[]).await?;
        parse_works(&body).map_err(|m| self.http.parse_error(m))
    }
}

fn parse_works(body: &Value) -> Result<Vec<RawRecord>, String> {
    let results = body
        .get("results")
        .and_then(Value::as_array)
        .ok_or("missing results array")?;
    Ok(results.iter().map(parse_work).collect())
}

fn parse_work(work: &Value) -> RawRecord {
    let authors = work
        .get("authorships")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(|a| str_at(a, "/author/display_name"))
                .collect()
        })
        .unwrap_or_default();
    let pmid = str_at(work, "/ids/pmid").map(|p| {
        p.trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or(&p)
            .to_string()
    });
    let work_type = str_field(work, "type");

    RawRecord {
        title: str_field(work, "display_name").or_else(|| str_field(work, "title")),
        authors,
        abstract_text: work
            .get("abstract_inverted_index")
            .and_then(rebuild_abstract),
        venue: str_at(work, "/primary_location/source/display_name"),
        year: work
            .get("publication_year")
            .and_then(Value::as_i64)
            .and_then(|y| i32::try_from(y).ok()),
        doi: str_field(work, "doi"),
        pmid,
        url: str_at(work, "/primary_location/landing_page_url")
            .or_else(|| str_field(work, "id")),
        citation_count: u64_field(work, "cited_by_count"),
        is_open_access: work.pointer("/open_access/is_oa").and_then(Value::as_bool),
        publication_types: work_type.iter().cloned().collect(),
        study_type: work_type.filter(|t| t == "review").map(|_| "Review".to_string()),
        ..RawRecord::new(NAME)
    }
}

/// OpenAlex ships abstracts as `{word: [positions]}`; put the words back in order.
fn rebuild_abstract(index: &Value) -> Option<String> {
    let map = index.as_object()?;
    let mut positioned: Vec<(u64, &str)> = map
        .iter()
        .flat_map(|(word, positions)| {
            positions
                .as_array()
                .into_iter()
                .flatten()
                .filter_map(Value::as_u64)
                .map(move |p| (p, word.as_str()))
        })
        .collect();
    if positioned.is_empty() {
        return None;
    }
    positioned.sort_unstable_by_key(|(p, _)| *p);
    Some(
        positioned
            .into_iter()
            .map(|(_, w)| w)
            .collect::<Vec<_>>()
            .join(" "),
    )
}
