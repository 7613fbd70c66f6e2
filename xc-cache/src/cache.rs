//! # Response Cache
//!
//! Purpose: Serve repeated requests from the store and fall back to the next
//! handler on a miss, storing what it returns for `cache_expiry` seconds.
//!
//! ## Design Principles
//! 1. **Store Is Optional**: Any store failure degrades to a miss; the live
//!    response is always returned.
//! 2. **Self-Healing**: An entry that no longer decodes is deleted.
//! 3. **Shared Client**: One pooled `StoreClient` serves every request.
//!
//! ## Notes
//! - The cache key is the request path alone. Method, query string and
//!   headers are not part of it.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};
use xc_client::{Deadline, StoreClient};

use crate::config::CacheConfig;
use crate::entry::{EntrySerializer, JsonSerializer};
use crate::http::{Handler, Request, Response};

/// Budget for each store call made while serving a request.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(1);

/// Caching wrapper around the next handler.
pub struct ResponseCache<H, S = JsonSerializer> {
    next: H,
    store: Arc<StoreClient>,
    serializer: S,
    expiry: Duration,
    store_timeout: Duration,
}

impl<H: Handler> ResponseCache<H> {
    /// Creates a cache that stores JSON entries.
    pub fn new(next: H, store: Arc<StoreClient>, config: &CacheConfig) -> Self {
        Self::with_serializer(next, store, config, JsonSerializer)
    }
}

impl<H: Handler, S: EntrySerializer> ResponseCache<H, S> {
    pub fn with_serializer(next: H, store: Arc<StoreClient>, config: &CacheConfig, serializer: S) -> Self {
        ResponseCache {
            next,
            store,
            serializer,
            expiry: config.expiry(),
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    /// Overrides the per-call store budget.
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    /// Key under which the response to `req` is stored.
    pub fn cache_key(req: &Request) -> &str {
        &req.path
    }

    /// Answers from the cache when possible, otherwise from the next handler.
    pub async fn serve(&self, req: &Request) -> Response {
        let key = Self::cache_key(req);
        if let Some(response) = self.lookup(key).await {
            info!(key, status = response.status, "cache hit");
            return response;
        }

        debug!(key, "cache miss");
        let response = self.next.call(req).await;
        self.remember(key, &response).await;
        response
    }

    async fn lookup(&self, key: &str) -> Option<Response> {
        let blob = match self.store.get(self.deadline(), key.as_bytes()).await {
            Ok(Some(blob)) if !blob.is_empty() => blob,
            Ok(_) => return None,
            Err(err) => {
                warn!(key, error = %err, "cache read failed, serving live response");
                return None;
            }
        };

        match self.serializer.decode(&blob) {
            Ok(response) => Some(response),
            Err(err) => {
                warn!(key, error = %err, "purging undecodable cache entry");
                if let Err(err) = self.store.delete(self.deadline(), key.as_bytes()).await {
                    warn!(key, error = %err, "failed to purge cache entry");
                }
                None
            }
        }
    }

    async fn remember(&self, key: &str, response: &Response) {
        let blob = match self.serializer.encode(response) {
            Ok(blob) => blob,
            Err(err) => {
                warn!(key, error = %err, "failed to serialize response for caching");
                return;
            }
        };

        match self
            .store
            .set_with_ttl(self.deadline(), key.as_bytes(), &blob, self.expiry)
            .await
        {
            Ok(()) => debug!(key, ttl = self.expiry.as_secs(), "cached response"),
            Err(err) => warn!(key, error = %err, "failed to cache response"),
        }
    }

    fn deadline(&self) -> Deadline {
        Deadline::after(self.store_timeout)
    }
}
