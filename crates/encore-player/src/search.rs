//! Track search: provider contract, HTTP implementation, cached front.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use encore_core::cache::RequestCache;
use encore_core::track::{RawSearchItem, Track};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SearchError {
    /// The provider is out of quota or rate limiting. Callers treat this
    /// as "no results right now", not a hard failure.
    #[error("search quota exhausted or rate limited")]
    RateLimited,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Default)]
pub struct SearchPage {
    pub results: Vec<Track>,
    pub next_page_token: Option<String>,
}

pub trait SearchProvider: Send + Sync + 'static {
    fn search(
        &self,
        query: &str,
        page_token: Option<&str>,
    ) -> impl Future<Output = Result<SearchPage, SearchError>> + Send;
}

// ── HTTP provider ─────────────────────────────────────────────────────────────

/// Raw shape of the hosting app's search endpoint response.
#[derive(Debug, Deserialize)]
struct RawSearchResponse {
    #[serde(default)]
    results: Vec<RawSearchItem>,
    #[serde(default, rename = "nextPageToken")]
    next_page_token: Option<String>,
    /// Some deployments report quota exhaustion in-band with HTTP 200.
    #[serde(default, rename = "quotaExceeded")]
    quota_exceeded: bool,
    #[serde(default)]
    error: Option<String>,
}

pub struct HttpSearchProvider {
    client: reqwest::Client,
    endpoint: String,
    page_size: usize,
}

impl HttpSearchProvider {
    pub fn new(endpoint: impl Into<String>, page_size: usize) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            page_size,
        }
    }
}

impl SearchProvider for HttpSearchProvider {
    async fn search(&self, query: &str, page_token: Option<&str>) -> Result<SearchPage, SearchError> {
        let mut request = self.client.get(&self.endpoint).query(&[("q", query)]);
        if let Some(token) = page_token {
            request = request.query(&[("pageToken", token)]);
        }

        let response = request.send().await.context("search request failed")?;
        let status = response.status();
        if status == reqwest::StatusCode::FORBIDDEN
            || status == reqwest::StatusCode::TOO_MANY_REQUESTS
        {
            return Err(SearchError::RateLimited);
        }
        if !status.is_success() {
            return Err(SearchError::Other(anyhow::anyhow!(
                "search endpoint returned {status}"
            )));
        }

        let body = response
            .text()
            .await
            .context("failed to read search response")?;
        parse_search_response(&body, self.page_size)
    }
}

/// Parse a raw search payload into domain tracks: ingest each item through
/// the track boundary, drop id-less entries, dedup by id, cap at `limit`.
pub fn parse_search_response(body: &str, limit: usize) -> Result<SearchPage, SearchError> {
    let raw: RawSearchResponse =
        serde_json::from_str(body).context("malformed search response")?;
    if raw.quota_exceeded {
        return Err(SearchError::RateLimited);
    }
    if let Some(message) = raw.error {
        return Err(SearchError::Other(anyhow::anyhow!("search failed: {message}")));
    }

    let mut results = Vec::new();
    let mut seen = HashSet::new();
    for item in raw.results {
        if results.len() >= limit {
            break;
        }
        if let Some(track) = Track::from_raw(item) {
            if seen.insert(track.id.clone()) {
                results.push(track);
            }
        }
    }
    Ok(SearchPage {
        results,
        next_page_token: raw.next_page_token,
    })
}

// ── cached front ──────────────────────────────────────────────────────────────

/// Deterministic cache key from the request's semantic parameters, so two
/// logically identical searches always collide regardless of call order.
pub fn search_cache_key(query: &str, page_token: Option<&str>) -> String {
    let normalized = query
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    format!("search:{}:{}", normalized, page_token.unwrap_or(""))
}

/// The search front callers actually use: TTL cache plus single-flight
/// deduplication on top of any provider.
pub struct CachedSearch<P: SearchProvider> {
    provider: Arc<P>,
    cache: RequestCache<SearchPage>,
    ttl: Duration,
}

impl<P: SearchProvider> CachedSearch<P> {
    pub fn new(provider: P, ttl: Duration) -> Self {
        Self {
            provider: Arc::new(provider),
            cache: RequestCache::new(),
            ttl,
        }
    }

    /// Spawn the cache sweeper. Optional — a memory bound, not a
    /// correctness requirement.
    pub fn spawn_sweeper(&self, every: Duration) -> tokio::task::JoinHandle<()> {
        self.cache.spawn_sweeper(every)
    }

    pub async fn search(
        &self,
        query: &str,
        page_token: Option<&str>,
    ) -> Result<SearchPage, SearchError> {
        let key = search_cache_key(query, page_token);
        let provider = Arc::clone(&self.provider);
        let owned_query = query.to_string();
        let owned_token = page_token.map(str::to_string);

        let result = self
            .cache
            .get_or_fetch(&key, self.ttl, move || async move {
                provider
                    .search(&owned_query, owned_token.as_deref())
                    .await
                    .map_err(anyhow::Error::from)
            })
            .await;

        result.map_err(|err| match err.downcast_ref::<SearchError>() {
            Some(SearchError::RateLimited) => SearchError::RateLimited,
            _ => SearchError::Other(anyhow::anyhow!("{err:#}")),
        })
    }
}
