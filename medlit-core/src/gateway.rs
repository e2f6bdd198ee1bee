//! Source gateway: the single capability every literature source implements,
//! plus the retry/timeout wrapper the pipeline talks to.
//!
//! Connectors implement [`LiteratureSource`] and may fail. The pipeline never
//! calls them directly; it goes through [`SourceGateway`], which applies the
//! configured [`RetryConfig`] and a per-call timeout and turns every failure
//! into an empty result plus a log line.

use crate::config::RetryConfig;
use crate::error::SourceError;
use crate::types::{RawRecord, SourceProfile};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// A searchable literature source.
#[async_trait]
pub trait LiteratureSource: Send + Sync {
    /// Static description used for planning.
    fn profile(&self) -> SourceProfile;

    /// Search for at most `limit` records.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<RawRecord>, SourceError>;
}

/// Execute `operation` with exponential backoff on retryable errors.
///
/// Rate-limit errors wait at least the server's `retry_after`. Permanent
/// errors (bad status, parse) return immediately.
pub async fn with_retry<F, Fut, T>(config: &RetryConfig, operation: F) -> Result<T, SourceError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, SourceError>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(val) => return Ok(val),
            Err(e) => {
                attempt += 1;
                if !e.is_retryable() || attempt >= max_attempts {
                    return Err(e);
                }
                let backoff_ms = compute_backoff(config, attempt - 1, &e);
                tracing::warn!(
                    source = e.source_name(),
                    attempt,
                    max = max_attempts,
                    backoff_ms,
                    error = %e,
                    "Retrying after transient error"
                );
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
            }
        }
    }
}

fn compute_backoff(config: &RetryConfig, attempt: u32, err: &SourceError) -> u64 {
    let computed = compute_exponential_backoff(config, attempt);
    if let SourceError::RateLimited {
        retry_after_secs, ..
    } = err
    {
        return retry_after_secs.saturating_mul(1000).max(computed);
    }
    computed
}

/// Pure exponential backoff with optional jitter.
fn compute_exponential_backoff(config: &RetryConfig, attempt: u32) -> u64 {
    let base = config.initial_backoff_ms as f64 * config.backoff_multiplier.powi(attempt as i32);
    let capped = base.min(config.max_backoff_ms as f64).max(0.0) as u64;
    if config.jitter {
        // Up to 25%
        let jitter = (capped as f64 * 0.25 * jitter_fraction()) as u64;
        capped + jitter
    } else {
        capped
    }
}

fn jitter_fraction() -> f64 {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    (nanos % 1000) as f64 / 1000.0
}

/// Fault-isolating wrapper around one source.
#[derive(Clone)]
pub struct SourceGateway {
    source: Arc<dyn LiteratureSource>,
    profile: SourceProfile,
    retry: RetryConfig,
    timeout: Duration,
}

impl std::fmt::Debug for SourceGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceGateway")
            .field("profile", &self.profile)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl SourceGateway {
    pub fn new(source: Arc<dyn LiteratureSource>, retry: RetryConfig, timeout: Duration) -> Self {
        let profile = source.profile();
        Self {
            source,
            profile,
            retry,
            timeout,
        }
    }

    pub fn profile(&self) -> &SourceProfile {
        &self.profile
    }

    pub fn name(&self) -> &str {
        &self.profile.name
    }

    /// Search, never failing. Errors and timeouts are logged and yield no records.
    pub async fn search(&self, query: &str, limit: usize) -> Vec<RawRecord> {
        let name = self.profile.name.clone();
        let timeout = self.timeout;
        let result = with_retry(&self.retry, || {
            let name = name.clone();
            async move {
                match tokio::time::timeout(timeout, self.source.search(query, limit)).await {
                    Ok(result) => result,
                    Err(_) => Err(SourceError::Timeout {
                        source_name: name,
                        timeout_secs: timeout.as_secs(),
                    }),
                }
            }
        })
        .await;

        match result {
            Ok(mut records) => {
                records.truncate(limit);
                tracing::debug!(source = %name, query, records = records.len(), "Source search completed");
                records
            }
            Err(e) => {
                tracing::warn!(source = %name, query, error = %e, "Source search failed");
                Vec::new()
            }
        }
    }
}

/// Query-rewriting function applied before delegating to a source.
pub type QueryRewriter = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Decorator that rewrites the query before delegating, so sources without
/// controlled-vocabulary syntax can share the same plan.
pub struct RewritingSource {
    inner: Arc<dyn LiteratureSource>,
    rewrite: QueryRewriter,
}

impl RewritingSource {
    pub fn new(inner: Arc<dyn LiteratureSource>, rewrite: QueryRewriter) -> Self {
        Self { inner, rewrite }
    }

    /// Strip field tags and boolean syntax before searching.
    pub fn plain(inner: Arc<dyn LiteratureSource>) -> Self {
        Self::new(inner, Arc::new(crate::strategy::plain_query))
    }
}

#[async_trait]
impl LiteratureSource for RewritingSource {
    fn profile(&self) -> SourceProfile {
        self.inner.profile()
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<RawRecord>, SourceError> {
        let rewritten = (self.rewrite)(query);
        if rewritten.trim().is_empty() {
            return self.inner.search(query, limit).await;
        }
        self.inner.search(&rewritten, limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SourceKind;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakySource {
        failures_before_success: u32,
        error: SourceError,
        calls: AtomicU32,
        seen_queries: Mutex<Vec<String>>,
    }

    impl FlakySource {
        fn new(failures_before_success: u32, error: SourceError) -> Self {
            Self {
                failures_before_success,
                error,
                calls: AtomicU32::new(0),
                seen_queries: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl LiteratureSource for FlakySource {
        fn profile(&self) -> SourceProfile {
            SourceProfile::new("flaky", SourceKind::Aggregator, 0.5)
        }

        async fn search(&self, query: &str, limit: usize) -> Result<Vec<RawRecord>, SourceError> {
            self.seen_queries.lock().unwrap().push(query.to_string());
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures_before_success {
                return Err(self.error.clone());
            }
            Ok((0..limit + 3).map(|_| RawRecord::new("flaky")).collect())
        }
    }

    struct SlowSource;

    #[async_trait]
    impl LiteratureSource for SlowSource {
        fn profile(&self) -> SourceProfile {
            SourceProfile::new("slow", SourceKind::Aggregator, 0.5)
        }

        async fn search(&self, _query: &str, _limit: usize) -> Result<Vec<RawRecord>, SourceError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(vec![RawRecord::new("slow")])
        }
    }

    fn fast_retry(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_backoff_ms: 1,
            backoff_multiplier: 1.0,
            max_backoff_ms: 1,
            jitter: false,
        }
    }

    fn http_error() -> SourceError {
        SourceError::Http {
            source_name: "flaky".into(),
            message: "connection reset".into(),
        }
    }

    #[tokio::test]
    async fn test_retries_transient_errors_then_succeeds() {
        let source = Arc::new(FlakySource::new(2, http_error()));
        let gateway = SourceGateway::new(source.clone(), fast_retry(3), Duration::from_secs(5));
        let records = gateway.search("q", 2).await;
        assert_eq!(records.len(), 2);
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let source = Arc::new(FlakySource::new(10, http_error()));
        let gateway = SourceGateway::new(source.clone(), fast_retry(2), Duration::from_secs(5));
        assert!(gateway.search("q", 5).await.is_empty());
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_permanent_errors_are_not_retried() {
        let error = SourceError::Status {
            source_name: "flaky".into(),
            status: 400,
        };
        let source = Arc::new(FlakySource::new(10, error));
        let gateway = SourceGateway::new(source.clone(), fast_retry(5), Duration::from_secs(5));
        assert!(gateway.search("q", 5).await.is_empty());
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_yields_empty() {
        let gateway = SourceGateway::new(
            Arc::new(SlowSource),
            RetryConfig::none(),
            Duration::from_secs(1),
        );
        assert!(gateway.search("q", 5).await.is_empty());
    }

    #[tokio::test]
    async fn test_rewriting_source_applies_function() {
        let inner = Arc::new(FlakySource::new(0, http_error()));
        let source = RewritingSource::plain(inner.clone());
        source
            .search("\"Metformin\"[MeSH Terms] AND therapy", 1)
            .await
            .unwrap();
        assert_eq!(
            inner.seen_queries.lock().unwrap().as_slice(),
            ["Metformin therapy".to_string()]
        );
        assert_eq!(source.profile().name, "flaky");
    }

    #[test]
    fn test_backoff_respects_rate_limit_and_cap() {
        let config = RetryConfig {
            jitter: false,
            ..RetryConfig::default()
        };
        assert_eq!(compute_exponential_backoff(&config, 0), 500);
        assert_eq!(compute_exponential_backoff(&config, 1), 1000);
        assert_eq!(compute_exponential_backoff(&config, 10), 8000);
        let limited = SourceError::RateLimited {
            source_name: "x".into(),
            retry_after_secs: 20,
        };
        assert_eq!(compute_backoff(&config, 0, &limited), 20_000);
    }
}
