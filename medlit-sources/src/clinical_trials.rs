//! ClinicalTrials.gov v2 study search.

use crate::http::HttpClient;
use crate::util::{leading_year, str_at};
use async_trait::async_trait;
use medlit_core::config::SourcesConfig;
use medlit_core::error::SourceError;
use medlit_core::gateway::LiteratureSource;
use medlit_core::types::{RawRecord, SourceKind, SourceProfile};
use serde_json::Value;
use std::time::Duration;

pub const NAME: &str = "clinical_trials";
const CLINICAL_TRIALS_API: &str = "https://clinicaltrials.gov/api/v2/studies";
const REGISTRY: &str = "ClinicalTrials.gov";

pub struct ClinicalTrialsSource {
    http: HttpClient,
}

impl ClinicalTrialsSource {
    pub fn new(config: &SourcesConfig) -> Result<Self, SourceError> {
        Ok(Self {
            http: HttpClient::new(NAME, config, Duration::from_millis(200))?,
        })
    }
}

#[async_trait]
impl LiteratureSource for ClinicalTrialsSource {
    fn profile(&self) -> SourceProfile {
        SourceProfile::new(NAME, SourceKind::TrialRegistry, 0.85)
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<RawRecord>, SourceError> {
        let url = format!(
            "{CLINICAL_TRIALS_API}?format=json&query.term={}&pageSize={}",
            urlencoding::encode(query),
            limit.clamp(1, 1000)
        );
        let body = self.http.get_json(&url, &[]).await?;
        parse_studies(&body).map_err(|m| self.http.parse_error(m))
    }
}

fn parse_studies(body: &Value) -> Result<Vec<RawRecord>, String> {
    let studies = body
        .get("studies")
        .and_then(Value::as_array)
        .ok_or("missing studies array")?;
    Ok(studies.iter().map(parse_study).collect())
}

fn parse_study(study: &Value) -> RawRecord {
    let Some(protocol) = study.get("protocolSection") else {
        return RawRecord::new(NAME);
    };
    let nct_id = str_at(protocol, "/identificationModule/nctId");
    let study_type = str_at(protocol, "/designModule/studyType");
    let allocation = str_at(protocol, "/designModule/designInfo/allocation");
    let randomized = allocation.as_deref() == Some("RANDOMIZED");

    let declared = if randomized {
        Some("Randomized Controlled Trial".to_string())
    } else {
        study_type.as_deref().map(humanize)
    };
    let phases: Vec<String> = protocol
        .pointer("/designModule/phases")
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(Value::as_str).map(humanize).collect())
        .unwrap_or_default();

    RawRecord {
        title: str_at(protocol, "/identificationModule/officialTitle")
            .or_else(|| str_at(protocol, "/identificationModule/briefTitle")),
        authors: str_at(protocol, "/sponsorCollaboratorsModule/leadSponsor/name")
            .into_iter()
            .collect(),
        abstract_text: str_at(protocol, "/descriptionModule/briefSummary"),
        venue: Some(REGISTRY.to_string()),
        year: str_at(protocol, "/statusModule/startDateStruct/date")
            .or_else(|| str_at(protocol, "/statusModule/studyFirstSubmitDate"))
            .and_then(|d| leading_year(&d)),
        url: nct_id
            .as_ref()
            .map(|id| format!("https://clinicaltrials.gov/study/{id}")),
        citation_count: None,
        is_open_access: Some(true),
        study_type: declared,
        publication_types: study_type.into_iter().map(|t| humanize(&t)).chain(phases).collect(),
        ..RawRecord::new(NAME)
    }
}

/// `INTERVENTIONAL` -> `Interventional`, `PHASE3` -> `Phase3`.
fn humanize(raw: &str) -> String {
    raw.split('_')
        .map(|word| {
            let lower = word.to_lowercase();
            let mut chars = lower.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
