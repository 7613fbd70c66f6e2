//! # xc-cache
//!
//! Purpose: HTTP response caching on top of the pooled store client. Responses
//! are keyed by request path, stored as serialized blobs with a TTL, and
//! replayed on later requests.
//!
//! ## Design Principles
//! 1. **Decorator Pattern**: `ResponseCache` wraps the next `Handler`.
//! 2. **Explicit Wiring**: Serializer and store client are passed in, never global.
//! 3. **Degrade, Don't Fail**: The store being down only means more misses.

pub mod cache;
pub mod config;
pub mod entry;
pub mod http;

pub use cache::{ResponseCache, DEFAULT_STORE_TIMEOUT};
pub use config::{CacheConfig, ConfigError, DEFAULT_CACHE_EXPIRY};
pub use entry::{EntryError, EntrySerializer, JsonSerializer};
pub use http::{Handler, HeaderMap, Request, Response};
