//! Crossref REST works search.

use crate::http::{HttpClient, push_param};
use crate::util::{str_field, strip_markup, u64_field};
use async_trait::async_trait;
use medlit_core::config::SourcesConfig;
use medlit_core::error::SourceError;
use medlit_core::gateway::LiteratureSource;
use medlit_core::types::{RawRecord, SourceKind, SourceProfile};
use serde_json::Value;
use std::time::Duration;

pub const NAME: &str = "crossref";
const CROSSREF_API: &str = "https://api.crossref.org/works";

pub struct CrossrefSource {
    http: HttpClient,
    email: Option<String>,
}

impl CrossrefSource {
    pub fn new(config: &SourcesConfig) -> Result<Self, SourceError> {
        Ok(Self {
            http: HttpClient::new(NAME, config, Duration::from_millis(200))?,
            email: config.contact_email.clone(),
        })
    }
}

#[async_trait]
impl LiteratureSource for CrossrefSource {
    fn profile(&self) -> SourceProfile {
        SourceProfile::new(NAME, SourceKind::Aggregator, 0.7)
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<RawRecord>, SourceError> {
        let mut url = format!(
            "{CROSSREF_API}?query.bibliographic={}&rows={}&select=DOI,title,author,container-title,\
             issued,published-print,published-online,abstract,is-referenced-by-count,URL,type,license",
            urlencoding::encode(query),
            limit.min(1000)
        );
        push_param(&mut url, "mailto", self.email.as_deref());
        let body = self.http.get_json(&url, &[]).await?;
        parse_items(&body).map_err(|m| self.http.parse_error(m))
    }
}

fn parse_items(body: &Value) -> Result<Vec<RawRecord>, String> {
    let items = body
        .pointer("/message/items")
        .and_then(Value::as_array)
        .ok_or("missing message.items")?;
    Ok(items.iter().map(parse_item).collect())
}

fn parse_item(item: &Value) -> RawRecord {
    let authors = item
        .get("author")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(|a| {
                    match (str_field(a, "given"), str_field(a, "family")) {
                        (Some(g), Some(f)) => Some(format!("{g} {f}")),
                        (None, Some(f)) => Some(f),
                        _ => str_field(a, "name"),
                    }
                })
                .collect()
        })
        .unwrap_or_default();

    RawRecord {
        title: first_string(item, "title"),
        authors,
        abstract_text: str_field(item, "abstract").map(|a| strip_markup(&a)),
        venue: first_string(item, "container-title"),
        year: ["issued", "published-print", "published-online"]
            .iter()
            .find_map(|key| date_year(item.get(*key)?)),
        doi: str_field(item, "DOI"),
        url: str_field(item, "URL"),
        citation_count: u64_field(item, "is-referenced-by-count"),
        // A Creative Commons license is the only open-access signal Crossref carries.
        is_open_access: item.get("license").and_then(Value::as_array).map(|ls| {
            ls.iter().any(|l| {
                str_field(l, "URL").is_some_and(|u| u.contains("creativecommons.org"))
            })
        }),
        publication_types: str_field(item, "type").into_iter().collect(),
        ..RawRecord::new(NAME)
    }
}

fn first_string(item: &Value, key: &str) -> Option<String> {
    item.get(key)
        .and_then(Value::as_array)
        .and_then(|arr| arr.iter().filter_map(Value::as_str).next())
        .map(strip_markup)
        .filter(|s| !s.is_empty())
}

/// Year from a Crossref date object (`{"date-parts": [[2021, 3, 4]]}`).
fn date_year(date: &Value) -> Option<i32> {
    date.pointer("/date-parts/0/0")
        .and_then(Value::as_i64)
        .and_then(|y| i32::try_from(y).ok())
}
