//! GRADE certainty-of-evidence assessment for evidence syntheses.
//!
//! Two steps, kept separate so the rating itself stays a pure function:
//! [`GradeEvidence::from_text`] extracts the documented inputs (design basis,
//! risk-of-bias tool, I², participant count, publication-bias signals,
//! indirectness and upgrade cues) from a record's text, and
//! [`GradeAssessor::assess`] turns those inputs into a rating. The same
//! evidence always yields the same assessment.

use crate::vocabulary::{Vocabulary, any_term, contains_term};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

static I_SQUARED: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:\bi(?:²|\^2|2)|\bi-squared|\bi squared)\s*(?:statistic\s*)?(?:(?:of|was|were)\b\s*)?(>=|≥|>|greater than|more than|<=|≤|<|less than|=|:|,)?\s*(\d{1,3}(?:\.\d+)?)\s*%?",
    )
    .ok()
});

/// Offset applied to a strict bound so `I² > 75%` reads as exceeding 75.
const STRICT_BOUND_OFFSET: f64 = 0.1;

static PARTICIPANTS: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(\d{1,3}(?:,\d{3})+|\d+)\s+(?:participants|patients|subjects|individuals|adults|children|women|men|people|persons)\b",
    )
    .ok()
});

static N_EQUALS: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)\bn\s*=\s*(\d{1,3}(?:,\d{3})+|\d+)\b").ok());

const NEGATIONS: &[&str] = &["no", "not", "without", "absence", "neither", "nor", "none"];

/// Overall certainty, weakest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Certainty {
    VeryLow,
    Low,
    Moderate,
    High,
}

impl Certainty {
    fn level(self) -> u32 {
        match self {
            Certainty::VeryLow => 0,
            Certainty::Low => 1,
            Certainty::Moderate => 2,
            Certainty::High => 3,
        }
    }

    fn from_level(level: u32) -> Self {
        match level {
            0 => Certainty::VeryLow,
            1 => Certainty::Low,
            2 => Certainty::Moderate,
            _ => Certainty::High,
        }
    }
}

impl fmt::Display for Certainty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Certainty::VeryLow => "very low",
            Certainty::Low => "low",
            Certainty::Moderate => "moderate",
            Certainty::High => "high",
        };
        f.write_str(label)
    }
}

/// Rating of a single downgrade domain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DomainRating {
    #[default]
    NotSerious,
    Serious,
    VerySerious,
}

impl DomainRating {
    /// Levels removed by this rating.
    pub fn downgrade(self) -> u32 {
        match self {
            DomainRating::NotSerious => 0,
            DomainRating::Serious => 1,
            DomainRating::VerySerious => 2,
        }
    }
}

/// Publication-bias judgement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PublicationBias {
    /// A statistical test or a registered protocol is reported and no bias was found.
    Undetected,
    /// Nothing is reported either way. Not counted as a downgrade.
    #[default]
    Suspected,
    /// The text reports publication bias.
    Detected,
}

impl PublicationBias {
    pub fn downgrade(self) -> u32 {
        match self {
            PublicationBias::Detected => 1,
            PublicationBias::Undetected | PublicationBias::Suspected => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpgradeFlags {
    pub large_effect: bool,
    pub dose_response: bool,
    pub plausible_confounding: bool,
}

impl UpgradeFlags {
    pub fn any(&self) -> bool {
        self.large_effect || self.dose_response || self.plausible_confounding
    }
}

/// The documented inputs of a GRADE rating.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeEvidence {
    /// The synthesized studies are randomized trials.
    pub rct_based: bool,
    /// Name of the standardized risk-of-bias tool, if one is named.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_of_bias_tool: Option<String>,
    /// Heterogeneity I², in percent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub i_squared: Option<f64>,
    /// Total participants across the pooled studies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participants: Option<u64>,
    pub publication_bias: PublicationBias,
    pub indirect: bool,
    pub upgrades: UpgradeFlags,
}

impl GradeEvidence {
    /// Extract evidence from free text (title and abstract).
    pub fn from_text(text: &str, vocabulary: &Vocabulary) -> Self {
        let lower = text.to_lowercase();
        let g = &vocabulary.grade;

        let randomized = any_term(&lower, &g.randomized_basis);
        let observational = any_term(&lower, &g.observational_basis);

        let risk_of_bias_tool = g
            .risk_of_bias_tools
            .iter()
            .find(|t| contains_term(&lower, t))
            .map(|t| t.trim_end_matches('*').to_string());

        let publication_bias = if unnegated_hit(&lower, &g.publication_bias_detected) {
            PublicationBias::Detected
        } else if any_term(&lower, &g.publication_bias_tests) {
            PublicationBias::Undetected
        } else {
            PublicationBias::Suspected
        };

        Self {
            rct_based: randomized && !observational,
            risk_of_bias_tool,
            i_squared: extract_i_squared(text),
            participants: extract_participants(text),
            publication_bias,
            indirect: any_term(&lower, &g.indirectness),
            upgrades: UpgradeFlags {
                large_effect: unnegated_hit(&lower, &g.large_effect),
                dose_response: unnegated_hit(&lower, &g.dose_response),
                plausible_confounding: unnegated_hit(&lower, &g.plausible_confounding),
            },
        }
    }
}

/// Whether some sentence contains a term from `terms` and no negation word.
fn unnegated_hit(lower: &str, terms: &[String]) -> bool {
    lower
        .split(['.', ';', '\n'])
        .filter(|sentence| any_term(sentence, terms))
        .any(|sentence| {
            !sentence
                .split(|c: char| !c.is_alphanumeric())
                .any(|w| NEGATIONS.contains(&w))
        })
}

fn parse_count(raw: &str) -> Option<u64> {
    raw.replace(',', "").parse().ok()
}

/// Largest I² value (0-100) reported in the text.
///
/// A reported bound stands in for the value: `I² ≥ 80%` reads as 80, and a
/// strict bound is nudged past itself (`I² > 75%` exceeds 75, `I² < 25%`
/// falls below 25).
pub fn extract_i_squared(text: &str) -> Option<f64> {
    let re = I_SQUARED.as_ref()?;
    re.captures_iter(text)
        .filter_map(|c| {
            let value = c.get(2)?.as_str().parse::<f64>().ok()?;
            if !(0.0..=100.0).contains(&value) {
                return None;
            }
            let op = c.get(1).map(|m| m.as_str().to_lowercase());
            let value = match op.as_deref() {
                Some(">" | "greater than" | "more than") => value + STRICT_BOUND_OFFSET,
                Some("<" | "less than") => value - STRICT_BOUND_OFFSET,
                _ => value,
            };
            Some(value.clamp(0.0, 100.0))
        })
        .reduce(f64::max)
}

/// Largest participant count reported in the text.
pub fn extract_participants(text: &str) -> Option<u64> {
    [PARTICIPANTS.as_ref(), N_EQUALS.as_ref()]
        .into_iter()
        .flatten()
        .flat_map(|re| re.captures_iter(text))
        .filter_map(|c| parse_count(c.get(1)?.as_str()))
        .max()
}

/// A completed GRADE rating.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeAssessment {
    pub starting_level: Certainty,
    pub risk_of_bias: DomainRating,
    pub inconsistency: DomainRating,
    pub indirectness: DomainRating,
    pub imprecision: DomainRating,
    pub publication_bias: PublicationBias,
    pub upgrades: UpgradeFlags,
    /// Levels removed after upgrades.
    pub net_downgrade: u32,
    pub overall: Certainty,
}

/// Participant count below which imprecision is serious.
const OPTIMAL_INFORMATION_SIZE: u64 = 300;

/// Stateless GRADE rater.
#[derive(Debug, Clone, Copy, Default)]
pub struct GradeAssessor;

impl GradeAssessor {
    pub fn new() -> Self {
        Self
    }

    pub fn assess(&self, evidence: &GradeEvidence) -> GradeAssessment {
        let starting_level = if evidence.rct_based {
            Certainty::High
        } else {
            Certainty::Low
        };

        let risk_of_bias = if evidence.risk_of_bias_tool.is_some() {
            DomainRating::NotSerious
        } else {
            DomainRating::Serious
        };

        let inconsistency = match evidence.i_squared {
            Some(i2) if i2 > 75.0 => DomainRating::VerySerious,
            Some(i2) if i2 > 50.0 => DomainRating::Serious,
            _ => DomainRating::NotSerious,
        };

        let imprecision = if evidence
            .participants
            .is_none_or(|n| n < OPTIMAL_INFORMATION_SIZE)
        {
            DomainRating::Serious
        } else {
            DomainRating::NotSerious
        };

        let indirectness = if evidence.indirect {
            DomainRating::Serious
        } else {
            DomainRating::NotSerious
        };

        let mut net_downgrade = risk_of_bias.downgrade()
            + inconsistency.downgrade()
            + indirectness.downgrade()
            + imprecision.downgrade()
            + evidence.publication_bias.downgrade();
        if evidence.upgrades.any() {
            net_downgrade = net_downgrade.saturating_sub(1);
        }

        let overall = Certainty::from_level(starting_level.level().saturating_sub(net_downgrade));

        GradeAssessment {
            starting_level,
            risk_of_bias,
            inconsistency,
            indirectness,
            imprecision,
            publication_bias: evidence.publication_bias,
            upgrades: evidence.upgrades,
            net_downgrade,
            overall,
        }
    }
}
