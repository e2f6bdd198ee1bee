//! Error types for the MedLit core library.
//!
//! Uses `thiserror` for public API error types with structured variants
//! covering source calls, configuration, vocabulary tables, and the pipeline.
//! `MedlitError` is only returned while building a pipeline; none of these
//! escape `LiteraturePipeline::search`, which always returns a result set.

use std::path::PathBuf;

/// Top-level error type for the MedLit core library.
#[derive(Debug, thiserror::Error)]
pub enum MedlitError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Vocabulary error: {0}")]
    Vocabulary(#[from] VocabularyError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

/// Errors raised by a single external literature source.
///
/// The gateway swallows these after retrying; they are only visible to
/// connector implementations and to the logs.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SourceError {
    #[error("{source_name}: HTTP request failed: {message}")]
    Http {
        source_name: String,
        message: String,
    },

    #[error("{source_name}: unexpected status {status}")]
    Status { source_name: String, status: u16 },

    #[error("{source_name}: rate limited, retry after {retry_after_secs}s")]
    RateLimited {
        source_name: String,
        retry_after_secs: u64,
    },

    #[error("{source_name}: request timed out after {timeout_secs}s")]
    Timeout {
        source_name: String,
        timeout_secs: u64,
    },

    #[error("{source_name}: failed to parse response: {message}")]
    Parse {
        source_name: String,
        message: String,
    },

    #[error("{source_name}: client setup failed: {message}")]
    Client {
        source_name: String,
        message: String,
    },
}

impl SourceError {
    /// Whether a retry has a chance of succeeding.
    pub fn is_retryable(&self) -> bool {
        match self {
            SourceError::Http { .. } | SourceError::RateLimited { .. } => true,
            SourceError::Timeout { .. } => true,
            SourceError::Status { status, .. } => *status >= 500,
            SourceError::Parse { .. } | SourceError::Client { .. } => false,
        }
    }

    /// Name of the source that produced the error.
    pub fn source_name(&self) -> &str {
        match self {
            SourceError::Http { source_name, .. }
            | SourceError::Status { source_name, .. }
            | SourceError::RateLimited { source_name, .. }
            | SourceError::Timeout { source_name, .. }
            | SourceError::Parse { source_name, .. }
            | SourceError::Client { source_name, .. } => source_name,
        }
    }
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {field} {message}")]
    Invalid { field: String, message: String },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },
}

/// Errors from loading or validating keyword vocabularies.
#[derive(Debug, thiserror::Error)]
pub enum VocabularyError {
    #[error("Unsupported vocabulary format: {path}")]
    UnsupportedFormat { path: PathBuf },

    #[error("Failed to parse vocabulary {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Vocabulary section '{section}' is empty")]
    EmptySection { section: String },

    #[error("Unsupported vocabulary version {found} (expected <= {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },
}

/// Programming errors inside the pipeline. Converted into an emergency
/// result set at the boundary.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("No literature sources are available for this request")]
    NoSources,

    #[error("Strategy planner produced no tiers")]
    EmptyStrategy,

    #[error("Malformed query analysis: {message}")]
    MalformedAnalysis { message: String },
}

/// A type alias for results using the top-level `MedlitError`.
pub type Result<T> = std::result::Result<T, MedlitError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_config() {
        let err = MedlitError::Config(ConfigError::Invalid {
            field: "pipeline.default_max_results".into(),
            message: "must be at least 1".into(),
        });
        assert_eq!(
            err.to_string(),
            "Configuration error: Invalid configuration: pipeline.default_max_results must be at least 1"
        );
    }

    #[test]
    fn test_error_display_pipeline() {
        let err = MedlitError::Pipeline(PipelineError::NoSources);
        assert_eq!(
            err.to_string(),
            "Pipeline error: No literature sources are available for this request"
        );
    }

    #[test]
    fn test_error_display_vocabulary() {
        let err = VocabularyError::UnsupportedVersion {
            found: 9,
            supported: 1,
        };
        assert_eq!(
            err.to_string(),
            "Unsupported vocabulary version 9 (expected <= 1)"
        );
    }

    #[test]
    fn test_retryable_classification() {
        let transient = SourceError::Timeout {
            source_name: "crossref".into(),
            timeout_secs: 30,
        };
        assert!(transient.is_retryable());

        let server = SourceError::Status {
            source_name: "crossref".into(),
            status: 502,
        };
        assert!(server.is_retryable());

        let client = SourceError::Status {
            source_name: "crossref".into(),
            status: 404,
        };
        assert!(!client.is_retryable());

        let parse = SourceError::Parse {
            source_name: "crossref".into(),
            message: "bad json".into(),
        };
        assert!(!parse.is_retryable());
        assert_eq!(parse.source_name(), "crossref");
    }
}
