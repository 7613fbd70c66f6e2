//! # Client Errors
//!
//! One error type for the codec, connection, pool and facade. Each layer
//! returns it unchanged so callers can tell a dead store from a bad reply.

use std::io;

use crate::resp::Reply;

/// Result type for the store client.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors surfaced by the store client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Dialing the store failed or timed out.
    #[error("connect to {addr} failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// The AUTH handshake was rejected.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Network failure while reading or writing an established connection.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// Reply framing was malformed or of an unsupported shape.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The store answered with an error reply.
    #[error("server error: {0}")]
    Server(String),

    /// The caller's deadline elapsed before the round trip finished.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// A well-formed reply of the wrong shape for the command.
    #[error("unexpected reply: {0:?}")]
    UnexpectedReply(Reply),

    /// A call argument the store would reject, caught before any I/O.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The pool was closed at shutdown.
    #[error("connection pool is closed")]
    PoolClosed,

    /// Not a single connection could be opened while filling the pool.
    #[error("no connection to {addr} after {attempts} attempts: {source}")]
    PoolInit {
        addr: String,
        attempts: usize,
        #[source]
        source: Box<ClientError>,
    },
}

impl ClientError {
    /// True for deadline expiry, including deadlines hit mid-I/O.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ClientError::DeadlineExceeded)
    }

    /// True when the failure happened while establishing a connection.
    pub fn is_connect(&self) -> bool {
        matches!(
            self,
            ClientError::Connect { .. } | ClientError::Auth(_) | ClientError::PoolInit { .. }
        )
    }
}
