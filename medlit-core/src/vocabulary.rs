//! Keyword vocabularies used by the analyzer, planner, scorer and GRADE assessor.
//!
//! All tables are plain data so they can be tuned without code changes:
//! `Vocabulary::builtin()` ships the defaults, and `Vocabulary::from_path()`
//! loads a TOML or JSON file whose sections override the defaults one by one.
//!
//! Term syntax: a term ending in `*` matches any word starting with the stem
//! (`diagnos*` matches "diagnosis" and "diagnostic"); any other term must match
//! on word boundaries, tolerating a trailing plural `s`. Terms may span words.

use crate::error::VocabularyError;
use crate::types::StudyDesign;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Highest vocabulary format version this build understands.
pub const VOCABULARY_VERSION: u32 = 1;

/// Complete set of keyword tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Vocabulary {
    pub version: u32,
    pub query_types: QueryTypeTerms,
    /// Specialty key (see `MedicalDomain::key`) to keywords.
    pub domains: BTreeMap<String, Vec<String>>,
    /// Phrases signalling relational questions ("impact of X on Y").
    pub relational_cues: Vec<String>,
    /// Historical or comparative qualifiers ("prior", "versus").
    pub comparative_cues: Vec<String>,
    pub population: PopulationTerms,
    pub evidence_focus: EvidenceFocusTerms,
    /// Lay or free-text phrase to MeSH heading.
    pub mesh: BTreeMap<String, String>,
    pub stopwords: Vec<String>,
    pub top_journals: Vec<String>,
    pub medical_context: Vec<String>,
    pub non_medical: Vec<String>,
    pub animal_study: Vec<String>,
    pub study_designs: StudyDesignTerms,
    pub diagnostic_terms: Vec<String>,
    pub mechanistic_terms: Vec<String>,
    pub methodology_terms: Vec<String>,
    pub grade: GradeTerms,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryTypeTerms {
    pub treatment: Vec<String>,
    pub diagnosis: Vec<String>,
    pub prognosis: Vec<String>,
    pub mechanism: Vec<String>,
    pub epidemiology: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PopulationTerms {
    pub pediatric: Vec<String>,
    pub elderly: Vec<String>,
    pub pregnancy: Vec<String>,
    pub women: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvidenceFocusTerms {
    pub systematic_review: Vec<String>,
    pub randomized_trials: Vec<String>,
    pub observational: Vec<String>,
    pub guidelines: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StudyDesignTerms {
    pub meta_analysis: Vec<String>,
    pub systematic_review: Vec<String>,
    pub rct: Vec<String>,
    pub cohort: Vec<String>,
    pub case_control: Vec<String>,
    pub cross_sectional: Vec<String>,
    pub case_series: Vec<String>,
    pub case_report: Vec<String>,
}

impl StudyDesignTerms {
    /// Keyword list for a design; `Unclear` has none.
    pub fn for_design(&self, design: StudyDesign) -> &[String] {
        match design {
            StudyDesign::MetaAnalysis => &self.meta_analysis,
            StudyDesign::SystematicReview => &self.systematic_review,
            StudyDesign::RandomizedControlledTrial => &self.rct,
            StudyDesign::Cohort => &self.cohort,
            StudyDesign::CaseControl => &self.case_control,
            StudyDesign::CrossSectional => &self.cross_sectional,
            StudyDesign::CaseSeries => &self.case_series,
            StudyDesign::CaseReport => &self.case_report,
            StudyDesign::Unclear => &[],
        }
    }
}

/// Textual cues read by the GRADE assessor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GradeTerms {
    pub randomized_basis: Vec<String>,
    pub observational_basis: Vec<String>,
    pub risk_of_bias_tools: Vec<String>,
    pub publication_bias_tests: Vec<String>,
    pub publication_bias_detected: Vec<String>,
    pub indirectness: Vec<String>,
    pub large_effect: Vec<String>,
    pub dose_response: Vec<String>,
    pub plausible_confounding: Vec<String>,
}

fn terms(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self::builtin()
    }
}

impl Vocabulary {
    /// The built-in tables.
    pub fn builtin() -> Self {
        let mut domains = BTreeMap::new();
        let domain_table: &[(&str, &[&str])] = &[
            (
                "cardiology",
                &[
                    "heart", "cardiac", "cardio*", "coronary", "myocardial", "hypertension",
                    "arrhythmi*", "atrial fibrillation", "heart failure", "statin*",
                ],
            ),
            (
                "oncology",
                &[
                    "cancer*", "tumor*", "tumour*", "oncolog*", "carcinoma*", "lymphoma*",
                    "leukemia*", "leukaemia*", "metasta*", "chemotherap*", "neoplasm*",
                ],
            ),
            (
                "endocrinology",
                &[
                    "diabet*", "insulin", "thyroid*", "metformin", "obesity", "glucose",
                    "endocrin*", "hba1c", "glycemic", "glycaemic",
                ],
            ),
            (
                "neurology",
                &[
                    "neuro*", "brain", "alzheimer*", "parkinson*", "epilep*", "stroke",
                    "dementia", "multiple sclerosis", "migraine*",
                ],
            ),
            (
                "psychiatry",
                &[
                    "depress*", "anxiety", "schizophreni*", "bipolar", "psychiatr*",
                    "mental health", "ptsd", "suicid*", "antidepressant*", "psychosis",
                ],
            ),
            (
                "infectious_disease",
                &[
                    "infection*", "infectious", "viral", "virus*", "bacteri*", "covid*",
                    "sars-cov-2", "hiv", "antibiotic*", "sepsis", "tuberculosis", "vaccin*",
                    "influenza",
                ],
            ),
            (
                "pulmonology",
                &[
                    "lung*", "pulmonary", "asthma", "copd", "respiratory", "pneumonia",
                ],
            ),
            (
                "gastroenterology",
                &[
                    "gastro*", "liver", "hepat*", "crohn*", "colitis", "inflammatory bowel",
                    "cirrhosis", "pancrea*",
                ],
            ),
            ("nephrology", &["kidney*", "renal", "nephro*", "dialysis"]),
            (
                "rheumatology",
                &["arthritis", "rheumat*", "lupus", "gout", "autoimmun*"],
            ),
            (
                "dermatology",
                &["skin", "dermat*", "psoriasis", "eczema", "melanoma*"],
            ),
            (
                "pediatrics",
                &[
                    "child*", "pediatric*", "paediatric*", "infant*", "neonat*", "adolescen*",
                ],
            ),
            (
                "obstetrics_gynecology",
                &[
                    "pregnan*", "obstetric*", "gynecolog*", "gynaecolog*", "maternal",
                    "preeclampsia", "ivf", "fertility", "menopaus*",
                ],
            ),
            (
                "surgery",
                &[
                    "surg*", "operative", "postoperative", "laparoscop*", "resection",
                    "transplant*", "arthroplasty",
                ],
            ),
            (
                "emergency_medicine",
                &[
                    "emergency", "trauma", "resuscitation", "cardiac arrest", "intensive care",
                    "icu", "triage",
                ],
            ),
        ];
        for (key, words) in domain_table {
            domains.insert(key.to_string(), terms(words));
        }

        let mut mesh = BTreeMap::new();
        let mesh_table: &[(&str, &str)] = &[
            ("type 2 diabetes", "Diabetes Mellitus, Type 2"),
            ("type ii diabetes", "Diabetes Mellitus, Type 2"),
            ("type 1 diabetes", "Diabetes Mellitus, Type 1"),
            ("diabetes", "Diabetes Mellitus"),
            ("heart attack", "Myocardial Infarction"),
            ("myocardial infarction", "Myocardial Infarction"),
            ("high blood pressure", "Hypertension"),
            ("hypertension", "Hypertension"),
            ("heart failure", "Heart Failure"),
            ("atrial fibrillation", "Atrial Fibrillation"),
            ("stroke", "Stroke"),
            ("breast cancer", "Breast Neoplasms"),
            ("lung cancer", "Lung Neoplasms"),
            ("colorectal cancer", "Colorectal Neoplasms"),
            ("cancer", "Neoplasms"),
            ("depression", "Depressive Disorder"),
            ("alzheimer", "Alzheimer Disease"),
            ("parkinson", "Parkinson Disease"),
            ("covid-19", "COVID-19"),
            ("covid", "COVID-19"),
            ("asthma", "Asthma"),
            ("copd", "Pulmonary Disease, Chronic Obstructive"),
            ("obesity", "Obesity"),
            ("chronic kidney disease", "Renal Insufficiency, Chronic"),
            ("rheumatoid arthritis", "Arthritis, Rheumatoid"),
            ("sepsis", "Sepsis"),
            ("metformin", "Metformin"),
            ("statin", "Hydroxymethylglutaryl-CoA Reductase Inhibitors"),
            ("aspirin", "Aspirin"),
            ("hiv", "HIV Infections"),
            ("schizophrenia", "Schizophrenia"),
            ("migraine", "Migraine Disorders"),
            ("pneumonia", "Pneumonia"),
        ];
        for (phrase, heading) in mesh_table {
            mesh.insert(phrase.to_string(), heading.to_string());
        }

        Self {
            version: VOCABULARY_VERSION,
            query_types: QueryTypeTerms {
                treatment: terms(&[
                    "treat*", "therap*", "drug*", "medication*", "intervention*", "manag*",
                    "efficacy", "effectiveness", "dose", "dosing", "prescri*", "first-line",
                ]),
                diagnosis: terms(&[
                    "diagnos*", "screen*", "detect*", "biomarker*", "sensitivity",
                    "specificity", "imaging", "test accuracy",
                ]),
                prognosis: terms(&[
                    "prognos*", "survival", "outcome*", "mortality", "risk of", "predict*",
                    "recurrence", "life expectancy",
                ]),
                mechanism: terms(&[
                    "mechanism*", "pathway*", "pathophysiolog*", "molecular", "signaling",
                    "signalling", "etiolog*", "aetiolog*", "pathogenesis", "receptor*",
                ]),
                epidemiology: terms(&[
                    "prevalence", "incidence", "epidemiolog*", "burden", "trend*",
                    "risk factor*", "population-based",
                ]),
            },
            domains,
            relational_cues: terms(&[
                "impact of", "effect of", "effects of", "interaction between",
                "interactions between", "relationship between", "association between",
                "associated with", "influence of", "role of", "correlation between",
                "mediated by",
            ]),
            comparative_cues: terms(&[
                "prior", "previous*", "history of", "compared to", "compared with", "versus",
                "vs", "comparison", "comparative", "than",
            ]),
            population: PopulationTerms {
                pediatric: terms(&[
                    "child*", "pediatric*", "paediatric*", "infant*", "neonat*", "adolescen*",
                    "newborn*",
                ]),
                elderly: terms(&[
                    "elderly", "older adult*", "geriatric*", "older patient*", "aged 65",
                ]),
                pregnancy: terms(&["pregnan*", "prenatal", "postpartum", "maternal"]),
                women: terms(&["women", "woman", "female*"]),
            },
            evidence_focus: EvidenceFocusTerms {
                systematic_review: terms(&["meta-analy*", "meta analy*", "systematic review*"]),
                randomized_trials: terms(&["randomi*", "rct*", "clinical trial*"]),
                observational: terms(&["cohort*", "observational", "case-control", "registry"]),
                guidelines: terms(&["guideline*", "consensus", "recommendation*"]),
            },
            mesh,
            stopwords: terms(&[
                "a", "an", "the", "of", "in", "on", "for", "to", "and", "or", "with", "without",
                "by", "from", "at", "as", "is", "are", "was", "were", "be", "been", "do", "does",
                "did", "what", "which", "who", "how", "why", "when", "where", "whether", "can",
                "could", "should", "would", "will", "there", "their", "this", "that", "these",
                "those", "it", "its", "into", "than", "vs", "versus", "between", "about",
                "among", "any", "best", "latest", "recent", "new", "evidence", "research",
                "study", "studies", "role", "use", "using", "effect", "effects", "impact",
            ]),
            top_journals: terms(&[
                "new england journal of medicine", "n engl j med", "lancet", "jama", "bmj",
                "british medical journal", "nature medicine", "annals of internal medicine",
                "cochrane database of systematic reviews", "circulation",
                "journal of clinical oncology", "diabetes care", "gastroenterology",
                "plos medicine", "science translational medicine",
                "european heart journal", "journal of the american college of cardiology",
            ]),
            medical_context: terms(&[
                "patient*", "clinic*", "disease*", "therap*", "treatment*",
                "diagnos*", "hospital*", "mortality", "morbidity", "symptom*", "trial*",
                "physician*", "medical", "medicine", "health", "healthcare", "placebo",
                "drug*", "dose*", "cohort*", "prevalence", "incidence", "diabet*", "cancer*",
                "infection*", "syndrome*", "disorder*", "surg*", "pharmacolog*",
                "randomi*", "epidemiolog*", "adverse event*",
            ]),
            non_medical: terms(&[
                "machine learning", "business model*", "marketing", "stock market",
                "supply chain", "blockchain", "cryptocurrenc*", "e-commerce",
                "software engineering", "consumer behavio*", "financial", "retail",
                "customer*", "profit*", "startup*", "revenue",
            ]),
            animal_study: terms(&[
                "mice", "mouse", "murine", "rat", "rodent*", "animal model*", "canine",
                "porcine", "bovine", "zebrafish", "non-human primate*",
            ]),
            study_designs: StudyDesignTerms {
                meta_analysis: terms(&["meta-analy*", "meta analy*", "metaanaly*", "pooled analys*"]),
                systematic_review: terms(&[
                    "systematic review*", "systematic literature review*", "umbrella review*",
                ]),
                rct: terms(&[
                    "randomized controlled trial*", "randomised controlled trial*",
                    "randomized clinical trial*", "randomised clinical trial*",
                    "randomized trial*", "randomised trial*", "rct", "double-blind*",
                    "placebo-controlled",
                ]),
                cohort: terms(&[
                    "cohort*", "prospective study", "longitudinal study", "follow-up study",
                ]),
                case_control: terms(&["case-control*", "case control*"]),
                cross_sectional: terms(&["cross-sectional", "cross sectional", "prevalence survey"]),
                case_series: terms(&["case series"]),
                case_report: terms(&["case report*", "case study"]),
            },
            diagnostic_terms: terms(&[
                "sensitivity", "specificity", "area under the curve", "auc", "roc",
                "receiver operating", "positive predictive value", "negative predictive value",
                "diagnostic accuracy", "likelihood ratio*", "gold standard", "reference standard",
            ]),
            mechanistic_terms: terms(&[
                "pathway*", "signaling", "signalling", "molecular", "mechanism*", "receptor*",
                "gene expression", "in vitro", "transcription*", "protein*", "inflammat*",
                "oxidative stress", "mitochondri*",
            ]),
            methodology_terms: terms(&[
                "randomi*", "blind*", "masked", "prospective*", "multicent*", "multi-cent*",
                "intention-to-treat", "intention to treat", "power calculation", "sample size",
                "preregistered", "registered", "protocol", "per-protocol", "allocation",
            ]),
            grade: GradeTerms {
                randomized_basis: terms(&["randomi*", "rct", "controlled trial*"]),
                observational_basis: terms(&[
                    "observational", "cohort*", "case-control*", "non-randomi*",
                ]),
                risk_of_bias_tools: terms(&[
                    "cochrane risk of bias", "cochrane collaboration", "cochrane tool",
                    "rob 2", "rob2", "risk of bias 2", "robins*", "newcastle-ottawa",
                    "newcastle ottawa", "quadas*", "jbi critical appraisal",
                ]),
                publication_bias_tests: terms(&[
                    "egger*", "begg*", "funnel plot*", "trim and fill", "prospero",
                    "registered protocol", "protocol was registered", "prospectively registered",
                ]),
                publication_bias_detected: terms(&[
                    "significant publication bias", "publication bias was detected",
                    "publication bias was present", "funnel plot asymmetry",
                    "asymmetric funnel", "asymmetrical funnel", "small-study effect*",
                ]),
                indirectness: terms(&[
                    "surrogate outcome*", "surrogate endpoint*", "surrogate marker*",
                    "indirect comparison*", "indirect evidence",
                ]),
                large_effect: terms(&[
                    "large effect*", "very large effect*", "large magnitude",
                    "strong association*",
                ]),
                dose_response: terms(&[
                    "dose-response", "dose response", "dose-dependent", "dose dependent",
                    "biological gradient",
                ]),
                plausible_confounding: terms(&[
                    "plausible confounding", "residual confounding would",
                    "confounding would reduce", "confounders would reduce",
                ]),
            },
        }
    }

    /// Load a vocabulary from a `.toml` or `.json` file. Sections absent from
    /// the file keep their built-in values.
    pub fn from_path(path: &Path) -> Result<Self, VocabularyError> {
        let raw = std::fs::read_to_string(path).map_err(|e| VocabularyError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        let vocabulary: Vocabulary = match extension.as_deref() {
            Some("toml") => toml::from_str(&raw).map_err(|e| VocabularyError::Parse {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?,
            Some("json") => serde_json::from_str(&raw).map_err(|e| VocabularyError::Parse {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?,
            _ => {
                return Err(VocabularyError::UnsupportedFormat {
                    path: path.to_path_buf(),
                });
            }
        };
        let vocabulary = vocabulary.normalized();
        vocabulary.validate()?;
        tracing::info!(
            path = %path.display(),
            version = vocabulary.version,
            "Loaded vocabulary tables"
        );
        Ok(vocabulary)
    }

    /// Lowercase and trim every term so matching can assume lowercase input.
    pub fn normalized(mut self) -> Self {
        fn norm(list: &mut Vec<String>) {
            for term in list.iter_mut() {
                *term = term.trim().to_lowercase();
            }
            list.retain(|t| !t.is_empty() && t != "*");
        }
        let q = &mut self.query_types;
        for list in [
            &mut q.treatment,
            &mut q.diagnosis,
            &mut q.prognosis,
            &mut q.mechanism,
            &mut q.epidemiology,
        ] {
            norm(list);
        }
        for list in self.domains.values_mut() {
            norm(list);
        }
        let p = &mut self.population;
        for list in [&mut p.pediatric, &mut p.elderly, &mut p.pregnancy, &mut p.women] {
            norm(list);
        }
        let e = &mut self.evidence_focus;
        for list in [
            &mut e.systematic_review,
            &mut e.randomized_trials,
            &mut e.observational,
            &mut e.guidelines,
        ] {
            norm(list);
        }
        let s = &mut self.study_designs;
        for list in [
            &mut s.meta_analysis,
            &mut s.systematic_review,
            &mut s.rct,
            &mut s.cohort,
            &mut s.case_control,
            &mut s.cross_sectional,
            &mut s.case_series,
            &mut s.case_report,
        ] {
            norm(list);
        }
        let g = &mut self.grade;
        for list in [
            &mut g.randomized_basis,
            &mut g.observational_basis,
            &mut g.risk_of_bias_tools,
            &mut g.publication_bias_tests,
            &mut g.publication_bias_detected,
            &mut g.indirectness,
            &mut g.large_effect,
            &mut g.dose_response,
            &mut g.plausible_confounding,
        ] {
            norm(list);
        }
        for list in [
            &mut self.relational_cues,
            &mut self.comparative_cues,
            &mut self.stopwords,
            &mut self.top_journals,
            &mut self.medical_context,
            &mut self.non_medical,
            &mut self.animal_study,
            &mut self.diagnostic_terms,
            &mut self.mechanistic_terms,
            &mut self.methodology_terms,
        ] {
            norm(list);
        }
        self.mesh = self
            .mesh
            .into_iter()
            .map(|(k, v)| (k.trim().to_lowercase(), v.trim().to_string()))
            .filter(|(k, v)| !k.is_empty() && !v.is_empty())
            .collect();
        self
    }

    /// Reject tables the scorer cannot work without.
    pub fn validate(&self) -> Result<(), VocabularyError> {
        if self.version > VOCABULARY_VERSION {
            return Err(VocabularyError::UnsupportedVersion {
                found: self.version,
                supported: VOCABULARY_VERSION,
            });
        }
        let required: [(&str, &[String]); 6] = [
            ("medical_context", &self.medical_context),
            ("stopwords", &self.stopwords),
            ("top_journals", &self.top_journals),
            ("query_types.treatment", &self.query_types.treatment),
            ("study_designs.meta_analysis", &self.study_designs.meta_analysis),
            ("study_designs.rct", &self.study_designs.rct),
        ];
        for (section, list) in required {
            if list.is_empty() {
                return Err(VocabularyError::EmptySection {
                    section: section.to_string(),
                });
            }
        }
        if self.domains.is_empty() {
            return Err(VocabularyError::EmptySection {
                section: "domains".to_string(),
            });
        }
        Ok(())
    }

    /// Whether `word` (lowercase) is a stop word.
    pub fn is_stopword(&self, word: &str) -> bool {
        self.stopwords.iter().any(|s| s == word)
    }

    /// MeSH headings found in `text_lower`, longest phrase first, skipping
    /// phrases nested inside an already matched longer phrase.
    pub fn mesh_matches(&self, text_lower: &str) -> Vec<(String, String)> {
        let mut phrases: Vec<(&String, &String)> = self.mesh.iter().collect();
        phrases.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(b.0)));

        let mut matched: Vec<(String, String)> = Vec::new();
        for (phrase, heading) in phrases {
            if !contains_term(text_lower, phrase) {
                continue;
            }
            if matched.iter().any(|(p, _)| p.contains(phrase.as_str())) {
                continue;
            }
            if matched.iter().any(|(_, h)| h == heading) {
                continue;
            }
            matched.push((phrase.clone(), heading.clone()));
        }
        matched
    }
}

/// Whether `haystack` (lowercase) contains `term` under the term syntax
/// described in the module docs.
pub fn contains_term(haystack: &str, term: &str) -> bool {
    let (needle, prefix) = match term.strip_suffix('*') {
        Some(stem) => (stem, true),
        None => (term, false),
    };
    if needle.is_empty() {
        return false;
    }
    let step = needle.chars().next().map_or(1, char::len_utf8);
    let mut start = 0;
    while let Some(pos) = haystack[start..].find(needle) {
        let begin = start + pos;
        let end = begin + needle.len();
        let before_ok = haystack[..begin]
            .chars()
            .next_back()
            .is_none_or(|c| !c.is_alphanumeric());
        let after_ok = prefix || {
            let mut rest = haystack[end..].chars();
            match rest.next() {
                None => true,
                Some('s') => rest.next().is_none_or(|c| !c.is_alphanumeric()),
                Some(c) => !c.is_alphanumeric(),
            }
        };
        if before_ok && after_ok {
            return true;
        }
        start = begin + step;
    }
    false
}

/// Number of distinct terms from `list` present in `haystack`.
pub fn count_terms(haystack: &str, list: &[String]) -> usize {
    list.iter().filter(|t| contains_term(haystack, t)).count()
}

/// Terms from `list` present in `haystack`.
pub fn matched_terms<'a>(haystack: &str, list: &'a [String]) -> Vec<&'a str> {
    list.iter()
        .filter(|t| contains_term(haystack, t))
        .map(String::as_str)
        .collect()
}

/// Whether any term from `list` is present in `haystack`.
pub fn any_term(haystack: &str, list: &[String]) -> bool {
    list.iter().any(|t| contains_term(haystack, t))
}
