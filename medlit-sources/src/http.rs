//! Shared HTTP plumbing for the connectors: a configured `reqwest` client,
//! a minimum-interval rate limiter and a TTL response cache.

use medlit_core::config::SourcesConfig;
use medlit_core::error::SourceError;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

const USER_AGENT: &str = concat!("MedLit/", env!("CARGO_PKG_VERSION"));

// ── Response Cache ────────────────────────────────────────────

struct CacheEntry {
    data: serde_json::Value,
    cached_at: Instant,
}

/// In-memory response cache with TTL and oldest-first eviction.
pub struct ResponseCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    ttl: Duration,
    max_entries: usize,
}

impl ResponseCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            max_entries,
        }
    }

    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = entries.get(key)
            && entry.cached_at.elapsed() < self.ttl
        {
            return Some(entry.data.clone());
        }
        None
    }

    pub fn insert(&self, key: String, data: serde_json::Value) {
        if self.max_entries == 0 || self.ttl.is_zero() {
            return;
        }
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());

        let ttl = self.ttl;
        entries.retain(|_, v| v.cached_at.elapsed() < ttl);

        if entries.len() >= self.max_entries
            && !entries.contains_key(&key)
            && let Some(oldest_key) = entries
                .iter()
                .min_by_key(|(_, v)| v.cached_at)
                .map(|(k, _)| k.clone())
        {
            entries.remove(&oldest_key);
        }

        entries.insert(
            key,
            CacheEntry {
                data,
                cached_at: Instant::now(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ── HTTP Client ───────────────────────────────────────────────

/// Rate-limited, caching JSON client bound to one source.
pub struct HttpClient {
    source_name: &'static str,
    client: reqwest::Client,
    timeout: Duration,
    min_interval: Duration,
    last_request: tokio::sync::Mutex<Option<Instant>>,
    cache: ResponseCache,
}

impl HttpClient {
    pub fn new(
        source_name: &'static str,
        config: &SourcesConfig,
        min_interval: Duration,
    ) -> Result<Self, SourceError> {
        let timeout = Duration::from_secs(config.request_timeout_secs.max(1));
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs.max(1)))
            .user_agent(user_agent(config.contact_email.as_deref()))
            .build()
            .map_err(|e| SourceError::Client {
                source_name: source_name.to_string(),
                message: e.to_string(),
            })?;
        Ok(Self {
            source_name,
            client,
            timeout,
            min_interval,
            last_request: tokio::sync::Mutex::new(None),
            cache: ResponseCache::new(
                Duration::from_secs(config.response_cache_ttl_secs),
                config.response_cache_max_entries,
            ),
        })
    }

    pub fn source_name(&self) -> &'static str {
        self.source_name
    }

    /// Wait until at least `min_interval` has passed since the previous request.
    async fn rate_limit(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(instant) = *last {
            let elapsed = instant.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    /// GET `url` and decode the body as JSON, serving repeats from the cache.
    pub async fn get_json(
        &self,
        url: &str,
        headers: &[(&str, &str)],
    ) -> Result<serde_json::Value, SourceError> {
        if let Some(cached) = self.cache.get(url) {
            tracing::trace!(source = self.source_name, url, "Response cache hit");
            return Ok(cached);
        }

        self.rate_limit().await;

        let mut request = self.client.get(url);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        let response = request.send().await.map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(1);
            return Err(SourceError::RateLimited {
                source_name: self.source_name.to_string(),
                retry_after_secs,
            });
        }
        if !status.is_success() {
            return Err(SourceError::Status {
                source_name: self.source_name.to_string(),
                status: status.as_u16(),
            });
        }

        let body: serde_json::Value = response.json().await.map_err(|e| SourceError::Parse {
            source_name: self.source_name.to_string(),
            message: e.to_string(),
        })?;

        self.cache.insert(url.to_string(), body.clone());
        Ok(body)
    }

    fn transport_error(&self, e: reqwest::Error) -> SourceError {
        if e.is_timeout() {
            SourceError::Timeout {
                source_name: self.source_name.to_string(),
                timeout_secs: self.timeout.as_secs(),
            }
        } else {
            SourceError::Http {
                source_name: self.source_name.to_string(),
                message: e.to_string(),
            }
        }
    }

    pub fn parse_error(&self, message: impl Into<String>) -> SourceError {
        SourceError::Parse {
            source_name: self.source_name.to_string(),
            message: message.into(),
        }
    }
}

/// Polite-pool user agent; APIs such as Crossref route identified clients
/// to better-provisioned servers.
fn user_agent(contact_email: Option<&str>) -> String {
    match contact_email {
        Some(email) if !email.trim().is_empty() => {
            format!("{USER_AGENT} (mailto:{})", email.trim())
        }
        _ => USER_AGENT.to_string(),
    }
}

/// Append `&name=value` (URL-encoded) when `value` is present.
pub fn push_param(url: &mut String, name: &str, value: Option<&str>) {
    if let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) {
        url.push('&');
        url.push_str(name);
        url.push('=');
        url.push_str(&urlencoding::encode(value));
    }
}
