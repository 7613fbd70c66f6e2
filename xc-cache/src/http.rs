//! Minimal HTTP request/response model seen by the cache layer.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Header multimap. Values under one name keep their insertion order.
pub type HeaderMap = BTreeMap<String, Vec<String>>;

/// The parts of an incoming request the cache looks at.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Request {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
}

impl Request {
    pub fn get(path: impl Into<String>) -> Self {
        Request {
            method: "GET".to_string(),
            path: path.into(),
            ..Request::default()
        }
    }
}

/// A complete response: status, headers and body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(status: u16) -> Self {
        Response {
            status,
            headers: HeaderMap::new(),
            body: Vec::new(),
        }
    }

    /// Appends a header value.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.entry(name.into()).or_default().push(value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }
}

/// The next handler in the chain, called on a cache miss.
pub trait Handler: Send + Sync {
    fn call(&self, req: &Request) -> impl Future<Output = Response> + Send;
}

impl<T: Handler> Handler for Arc<T> {
    fn call(&self, req: &Request) -> impl Future<Output = Response> + Send {
        (**self).call(req)
    }
}
