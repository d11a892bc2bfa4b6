// Copyright: Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Removal of the attribution is not allowed, as covered under the AGPL license

//! Memoised request/response store used for detail endpoints.
//!
//! Concurrent requests for the same key that start before the first one
//! resolves are not coalesced, so the endpoint may be hit more than once.

pub mod backend;

pub use backend::{FileBackend, KvBackend, SessionBackend};

use crate::errors::FetchError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

static ENTRY_GENERATION: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackendKind {
    /// Survives restarts.
    Persistent,
    Session,
    /// Never stored, always refetched.
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PayloadFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "format", content = "body", rename_all = "snake_case")]
pub enum Payload {
    Text(String),
    Json(Value),
}

impl Payload {
    /// What a failed request hands back to its caller.
    pub fn empty(format: PayloadFormat) -> Self {
        match format {
            PayloadFormat::Text => Payload::Text(String::new()),
            PayloadFormat::Json => Payload::Json(Value::Array(Vec::new())),
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Payload::Json(v) => Some(v),
            Payload::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Text(s) => Some(s),
            Payload::Json(_) => None,
        }
    }

    /// Records of a JSON array payload. Anything else yields nothing.
    pub fn records(&self) -> Vec<Value> {
        match self {
            Payload::Json(Value::Array(items)) => items.clone(),
            _ => Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Payload::Text(s) => s.is_empty(),
            Payload::Json(Value::Array(items)) => items.is_empty(),
            Payload::Json(Value::Null) => true,
            Payload::Json(_) => false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub payload: Payload,
    pub expires_at_ms: Option<u64>,
    generation: u64,
}

impl CacheEntry {
    fn is_expired(&self, now_ms: u64) -> bool {
        self.expires_at_ms.is_some_and(|at| now_ms >= at)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FetchOptions {
    pub backend: BackendKind,
    pub format: PayloadFormat,
    pub ttl: Option<Duration>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            backend: BackendKind::Session,
            format: PayloadFormat::Json,
            ttl: None,
        }
    }
}

impl FetchOptions {
    pub fn json(backend: BackendKind) -> Self {
        Self {
            backend,
            format: PayloadFormat::Json,
            ttl: None,
        }
    }

    pub fn text(backend: BackendKind) -> Self {
        Self {
            backend,
            format: PayloadFormat::Text,
            ttl: None,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }
}

/// Builds the cache key for a request: the URL with its query parameters
/// appended in sorted order so equivalent requests share an entry.
pub fn request_key(base: &str, params: &[(&str, &str)]) -> Result<String, url::ParseError> {
    let mut url = url::Url::parse(base)?;
    let mut sorted: Vec<(&str, &str)> = params.to_vec();
    sorted.sort();
    if !sorted.is_empty() {
        url.query_pairs_mut().extend_pairs(sorted);
    }
    Ok(url.to_string())
}

/// GETs a URL as text, treating any non-success status as a failure.
pub async fn fetch_text(client: &reqwest::Client, url: &str) -> Result<String, FetchError> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|source| FetchError::Transport {
            url: url.to_string(),
            source,
        })?;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    response.text().await.map_err(|source| FetchError::Transport {
        url: url.to_string(),
        source,
    })
}

#[derive(Clone)]
pub struct KvCache {
    session: Arc<dyn KvBackend>,
    persistent: Arc<dyn KvBackend>,
}

impl KvCache {
    pub fn new(session: Arc<dyn KvBackend>, persistent: Arc<dyn KvBackend>) -> Self {
        Self {
            session,
            persistent,
        }
    }

    /// Both stores in memory. Used when no cache directory is configured.
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(SessionBackend::new()),
            Arc::new(SessionBackend::new()),
        )
    }

    fn store(&self, kind: BackendKind) -> Option<&Arc<dyn KvBackend>> {
        match kind {
            BackendKind::Persistent => Some(&self.persistent),
            BackendKind::Session => Some(&self.session),
            BackendKind::None => None,
        }
    }

    /// Cached entry for `key`, if present and not past its expiry.
    pub fn lookup(&self, key: &str, kind: BackendKind) -> Option<Payload> {
        let store = self.store(kind)?;
        let raw = store.get(key)?;

        let entry: CacheEntry = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                warn!("discarding unreadable cache entry {}: {}", key, e);
                store.remove(key);
                return None;
            }
        };

        if entry.is_expired(crate::duration_since_unix_epoch().as_millis() as u64) {
            store.remove(key);
            return None;
        }

        Some(entry.payload)
    }

    /// Returns the cached payload for `key`, or runs `fetch` and stores its
    /// decoded result. Failures are logged and yield an empty payload.
    pub async fn fetch_cached<F, Fut>(&self, key: &str, fetch: F, options: FetchOptions) -> Payload
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, FetchError>>,
    {
        self.fetch_cached_or_else(key, fetch, options, |e| {
            warn!("fetch for {} failed: {}", key, e);
            Payload::empty(options.format)
        })
        .await
    }

    /// Like [`KvCache::fetch_cached`] with a caller supplied failure handler.
    /// The cache is never written on failure.
    pub async fn fetch_cached_or_else<F, Fut, E>(
        &self,
        key: &str,
        fetch: F,
        options: FetchOptions,
        on_error: E,
    ) -> Payload
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, FetchError>>,
        E: FnOnce(&FetchError) -> Payload,
    {
        if let Some(hit) = self.lookup(key, options.backend) {
            debug!("cache hit {}", key);
            return hit;
        }

        let decoded = match fetch().await {
            Ok(body) => decode(body, options.format),
            Err(e) => Err(e),
        };

        let payload = match decoded {
            Ok(payload) => payload,
            Err(e) => return on_error(&e),
        };

        if let Some(store) = self.store(options.backend) {
            let generation = ENTRY_GENERATION.fetch_add(1, Ordering::Relaxed);
            let expires_at_ms = options
                .ttl
                .map(|ttl| crate::duration_since_unix_epoch().as_millis() as u64 + ttl.as_millis() as u64);

            let entry = CacheEntry {
                key: key.to_string(),
                payload: payload.clone(),
                expires_at_ms,
                generation,
            };

            match serde_json::to_string(&entry) {
                Ok(raw) => {
                    store.set(key, raw);
                    if let Some(ttl) = options.ttl {
                        schedule_eviction(store.clone(), key.to_string(), generation, ttl);
                    }
                }
                Err(e) => warn!("could not serialise cache entry {}: {}", key, e),
            }
        }

        payload
    }

    /// GET through the cache with [`fetch_text`].
    pub async fn fetch_url(
        &self,
        client: &reqwest::Client,
        base: &str,
        params: &[(&str, &str)],
        options: FetchOptions,
    ) -> Payload {
        let key = match request_key(base, params) {
            Ok(key) => key,
            Err(e) => {
                warn!("invalid detail url {}: {}", base, e);
                return Payload::empty(options.format);
            }
        };

        self.fetch_cached(&key, || fetch_text(client, &key), options)
            .await
    }
}

fn decode(body: String, format: PayloadFormat) -> Result<Payload, FetchError> {
    match format {
        PayloadFormat::Text => Ok(Payload::Text(body)),
        PayloadFormat::Json => Ok(Payload::Json(serde_json::from_str(&body)?)),
    }
}

/// Removes the entry once its ttl runs out, unless it has been rewritten in
/// the meantime.
fn schedule_eviction(store: Arc<dyn KvBackend>, key: String, generation: u64, ttl: Duration) {
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
        // no timer available, expiry is still enforced on read
        return;
    };

    runtime.spawn(async move {
        tokio::time::sleep(ttl).await;

        let still_same = store
            .get(&key)
            .and_then(|raw| serde_json::from_str::<CacheEntry>(&raw).ok())
            .is_some_and(|entry| entry.generation == generation);

        if still_same {
            debug!("evicting {}", key);
            store.remove(&key);
        }
    });
}
