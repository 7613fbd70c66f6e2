//! # Cache Entries
//!
//! Purpose: Turn a captured response into the opaque blob stored under its
//! cache key, and back. The serializer is passed to the cache explicitly so
//! several caches with different formats can live in one process.

use crate::http::Response;

/// Failure to encode or decode a cache entry.
#[derive(Debug, thiserror::Error)]
pub enum EntryError {
    #[error("encode cache entry: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("decode cache entry: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Serialization format for stored responses.
pub trait EntrySerializer: Send + Sync {
    fn encode(&self, response: &Response) -> Result<Vec<u8>, EntryError>;
    fn decode(&self, blob: &[u8]) -> Result<Response, EntryError>;
}

/// JSON entries: `{"status":200,"headers":{...},"body":[...]}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl EntrySerializer for JsonSerializer {
    fn encode(&self, response: &Response) -> Result<Vec<u8>, EntryError> {
        serde_json::to_vec(response).map_err(EntryError::Encode)
    }

    fn decode(&self, blob: &[u8]) -> Result<Response, EntryError> {
        serde_json::from_slice(blob).map_err(EntryError::Decode)
    }
}
