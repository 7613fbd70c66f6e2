//! # Store Client API
//!
//! Purpose: Expose the typed cache operations (get, set, set-with-TTL,
//! delete, incr, expire, ping) over pooled RESP2 connections.
//!
//! ## Design Principles
//! 1. **Facade Pattern**: `StoreClient` hides pooling and protocol details.
//! 2. **One Deadline per Call**: Acquire, send and receive all race the same
//!    caller deadline; when it fires the round trip is dropped and the
//!    connection is closed rather than recycled.
//! 3. **No Retries**: A failed round trip is returned to the caller as is.
//! 4. **Borrow-Friendly API**: Keys and values are accepted as `&[u8]`.

use std::time::Duration;

use crate::config::ClientConfig;
use crate::deadline::Deadline;
use crate::error::{ClientError, ClientResult};
use crate::pool::ConnectionPool;
use crate::resp::{Command, Reply};

/// Pooled store client, shared by concurrent callers for the process lifetime.
pub struct StoreClient {
    pool: ConnectionPool,
}

impl StoreClient {
    /// Creates a client with default configuration.
    pub async fn connect(addr: impl Into<String>) -> ClientResult<Self> {
        Self::with_config(ClientConfig::new(addr)).await
    }

    /// Creates a client and fills its pool.
    ///
    /// Fails only when no connection at all could be established.
    pub async fn with_config(config: ClientConfig) -> ClientResult<Self> {
        let pool = ConnectionPool::connect(config).await?;
        Ok(StoreClient { pool })
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    /// Runs one command/reply exchange on a pooled connection.
    ///
    /// The connection goes back to the pool when this returns, whatever the
    /// outcome. Error replies from the store become `ClientError::Server`.
    pub async fn execute(&self, deadline: Deadline, cmd: &Command) -> ClientResult<Reply> {
        if deadline.is_expired() {
            return Err(ClientError::DeadlineExceeded);
        }
        let reply = deadline
            .run(async {
                let mut conn = self.pool.acquire(deadline).await?;
                conn.exec(deadline, cmd).await
            })
            .await?;

        match reply {
            Reply::Error(message) => Err(ClientError::Server(message)),
            reply => Ok(reply),
        }
    }

    /// Pings the store. Expects `+PONG`.
    pub async fn ping(&self, deadline: Deadline) -> ClientResult<()> {
        match self.execute(deadline, &Command::ping()).await? {
            Reply::Status(status) if status == "PONG" => Ok(()),
            other => Err(ClientError::UnexpectedReply(other)),
        }
    }

    /// Fetches a value by key.
    ///
    /// Returns `Ok(None)` when the key is missing, which is distinct from a
    /// stored empty value.
    pub async fn get(&self, deadline: Deadline, key: &[u8]) -> ClientResult<Option<Vec<u8>>> {
        match self.execute(deadline, &Command::get(key)).await? {
            Reply::Bulk(data) => Ok(Some(data)),
            Reply::Nil => Ok(None),
            other => Err(ClientError::UnexpectedReply(other)),
        }
    }

    /// Sets a value for a key without expiration.
    pub async fn set(&self, deadline: Deadline, key: &[u8], value: &[u8]) -> ClientResult<()> {
        expect_ok(self.execute(deadline, &Command::set(key, value)).await?)
    }

    /// Sets a value that expires after `ttl`.
    ///
    /// The store counts whole seconds, so a fractional `ttl` is rounded up.
    /// A zero `ttl` is rejected before any I/O.
    pub async fn set_with_ttl(
        &self,
        deadline: Deadline,
        key: &[u8],
        value: &[u8],
        ttl: Duration,
    ) -> ClientResult<()> {
        let cmd = Command::set_with_ttl(key, value, ttl_secs(ttl)?);
        expect_ok(self.execute(deadline, &cmd).await?)
    }

    /// Deletes a key. Returns true when a key was removed.
    pub async fn delete(&self, deadline: Deadline, key: &[u8]) -> ClientResult<bool> {
        expect_flag(self.execute(deadline, &Command::del(key)).await?)
    }

    /// Increments a counter and returns its new value.
    pub async fn incr(&self, deadline: Deadline, key: &[u8]) -> ClientResult<i64> {
        match self.execute(deadline, &Command::incr(key)).await? {
            Reply::Integer(value) => Ok(value),
            other => Err(ClientError::UnexpectedReply(other)),
        }
    }

    /// Sets a time-to-live on a key. Returns true when the key existed.
    ///
    /// `ttl` is rounded up to whole seconds; zero is rejected before any I/O.
    pub async fn expire(&self, deadline: Deadline, key: &[u8], ttl: Duration) -> ClientResult<bool> {
        let cmd = Command::expire(key, ttl_secs(ttl)?);
        expect_flag(self.execute(deadline, &cmd).await?)
    }

    /// Closes idle connections. Calls made afterwards fail with `PoolClosed`.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Whole seconds for an expiry argument, never zero.
fn ttl_secs(ttl: Duration) -> ClientResult<u64> {
    if ttl.is_zero() {
        return Err(ClientError::InvalidArgument("ttl must be positive".to_string()));
    }
    let partial = u64::from(ttl.subsec_nanos() > 0);
    Ok(ttl.as_secs().saturating_add(partial))
}

fn expect_ok(reply: Reply) -> ClientResult<()> {
    match reply {
        Reply::Status(status) if status == "OK" => Ok(()),
        other => Err(ClientError::UnexpectedReply(other)),
    }
}

fn expect_flag(reply: Reply) -> ClientResult<bool> {
    match reply {
        Reply::Integer(1) => Ok(true),
        Reply::Integer(0) => Ok(false),
        other => Err(ClientError::UnexpectedReply(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ttl_rounds_up_to_whole_seconds() {
        assert_eq!(ttl_secs(Duration::from_millis(1)).unwrap(), 1);
        assert_eq!(ttl_secs(Duration::from_millis(900)).unwrap(), 1);
        assert_eq!(ttl_secs(Duration::from_secs(15)).unwrap(), 15);
        assert_eq!(ttl_secs(Duration::from_millis(1500)).unwrap(), 2);
    }

    #[test]
    fn zero_ttl_is_rejected() {
        let err = ttl_secs(Duration::ZERO).err().expect("zero ttl");
        assert!(matches!(err, ClientError::InvalidArgument(_)));
    }
}
