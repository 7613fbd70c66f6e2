//! # xc-client
//!
//! Purpose: Provide the async, pooled RESP2 store client behind the response
//! cache: a byte-exact codec, deadline-bound connections, and a pool that
//! hands connections to concurrent callers and reclaims them safely.
//!
//! ## Design Principles
//! 1. **Object Pool Pattern**: Reuse authenticated TCP connections.
//! 2. **Cancellation by Drop**: A caller deadline drops the in-flight round
//!    trip instead of leaving a background task behind.
//! 3. **Minimal Allocation**: Reuse per-connection buffers for framing.
//! 4. **Protocol Clarity**: Encode/parse RESP2 explicitly for correctness.

mod client;
mod config;
mod conn;
mod deadline;
mod error;
mod pool;
pub mod resp;

#[cfg(feature = "test-util")]
pub mod test_util;

pub use client::StoreClient;
pub use config::{ClientConfig, DEFAULT_CONNECT_TIMEOUT, DEFAULT_IO_TIMEOUT, DEFAULT_POOL_SIZE};
pub use conn::Connection;
pub use deadline::Deadline;
pub use error::{ClientError, ClientResult};
pub use pool::{ConnectionPool, PooledConnection};
pub use resp::{Command, Reply};
