//! # Connection Pool
//!
//! Purpose: Keep a bounded set of ready, authenticated connections so each
//! store call skips the TCP and AUTH handshake.
//!
//! ## Design Principles
//! 1. **Object Pool Pattern**: Idle connections are reused, oldest first.
//! 2. **Minimal Locking**: The mutex guards only the idle queue; it is never
//!    held across a dial, a close, or any other network I/O.
//! 3. **Bounded Overflow**: An empty pool dials extra connections up to
//!    `pool_size + max_overflow` checked out at once; beyond that, acquire
//!    waits for a release until the caller's deadline.
//! 4. **Drain on Release**: Connections above `pool_size`, poisoned ones, and
//!    anything returned after `close` are closed instead of pooled.

use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::conn::Connection;
use crate::deadline::Deadline;
use crate::error::{ClientError, ClientResult};

struct PoolState {
    idle: VecDeque<Connection>,
    closed: bool,
}

struct PoolInner {
    config: ClientConfig,
    state: Mutex<PoolState>,
    // One permit per connection that may be checked out at once.
    checkout: Arc<Semaphore>,
}

/// Connection pool handle.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl ConnectionPool {
    /// Creates the pool and dials `pool_size` connections up front.
    ///
    /// Dial failures are logged and skipped; the pool only fails when not a
    /// single connection could be opened.
    pub async fn connect(config: ClientConfig) -> ClientResult<Self> {
        let config = config.normalized();
        let mut idle = VecDeque::with_capacity(config.pool_size);
        let mut last_err = None;

        for _ in 0..config.pool_size {
            match Connection::open(&config).await {
                Ok(conn) => idle.push_back(conn),
                Err(err) => {
                    warn!(addr = %config.addr, error = %err, "failed to open pooled connection");
                    last_err = Some(err);
                }
            }
        }

        if idle.is_empty() {
            if let Some(err) = last_err {
                return Err(ClientError::PoolInit {
                    addr: config.addr.clone(),
                    attempts: config.pool_size,
                    source: Box::new(err),
                });
            }
        }
        debug!(addr = %config.addr, idle = idle.len(), capacity = config.pool_size, "connection pool ready");

        let permits = config.checkout_limit();
        Ok(ConnectionPool {
            inner: Arc::new(PoolInner {
                config,
                state: Mutex::new(PoolState {
                    idle,
                    closed: false,
                }),
                checkout: Arc::new(Semaphore::new(permits)),
            }),
        })
    }

    /// Checks out a connection.
    ///
    /// Takes an idle connection when one exists, otherwise dials a new one.
    /// Waits only when the overflow ceiling is reached, and never past `deadline`.
    pub async fn acquire(&self, deadline: Deadline) -> ClientResult<PooledConnection> {
        let checkout = Arc::clone(&self.inner.checkout);
        let permit = deadline
            .run(async move {
                checkout
                    .acquire_owned()
                    .await
                    .map_err(|_| ClientError::PoolClosed)
            })
            .await?;

        let idle = {
            let mut state = self.inner.lock_state();
            if state.closed {
                return Err(ClientError::PoolClosed);
            }
            state.idle.pop_front()
        };

        let conn = match idle {
            Some(conn) => conn,
            None => {
                debug!(addr = %self.inner.config.addr, "pool empty, dialing overflow connection");
                deadline.run(Connection::open(&self.inner.config)).await?
            }
        };

        Ok(PooledConnection {
            pool: Arc::clone(&self.inner),
            conn: Some(conn),
            _permit: permit,
        })
    }

    /// Closes every idle connection and refuses further checkouts.
    ///
    /// Connections already checked out are closed when they are released.
    pub async fn close(&self) {
        let drained: Vec<Connection> = {
            let mut state = self.inner.lock_state();
            state.closed = true;
            state.idle.drain(..).collect()
        };
        self.inner.checkout.close();

        let count = drained.len();
        for conn in drained {
            conn.close().await;
        }
        info!(addr = %self.inner.config.addr, closed = count, "connection pool closed");
    }

    /// Number of idle connections currently retained.
    pub fn idle_count(&self) -> usize {
        self.inner.lock_state().idle.len()
    }

    /// Maximum number of idle connections retained.
    pub fn capacity(&self) -> usize {
        self.inner.config.pool_size
    }

    /// Most connections checked out at once, overflow included.
    pub fn checkout_limit(&self) -> usize {
        self.inner.config.checkout_limit()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }
}

impl PoolInner {
    fn lock_state(&self) -> MutexGuard<'_, PoolState> {
        // The queue stays consistent even if a holder panicked.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn release(&self, conn: Connection) {
        if conn.is_poisoned() {
            debug!(addr = %self.config.addr, "discarding poisoned connection");
            return;
        }

        let surplus = {
            let mut state = self.lock_state();
            if state.closed || state.idle.len() >= self.config.pool_size {
                Some(conn)
            } else {
                state.idle.push_back(conn);
                None
            }
        };
        if surplus.is_some() {
            debug!(addr = %self.config.addr, "pool full or closed, closing returned connection");
        }
        // Dropping the surplus connection closes its socket outside the lock.
        drop(surplus);
    }
}

/// RAII checkout that returns its connection to the pool on drop.
///
/// A connection that was poisoned while checked out, including one whose
/// round trip was abandoned at a deadline, is closed instead of pooled.
pub struct PooledConnection {
    pool: Arc<PoolInner>,
    conn: Option<Connection>,
    // Released after the connection is back in the idle queue.
    _permit: OwnedSemaphorePermit,
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.conn.as_ref().expect("connection present until drop")
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Connection {
        self.conn.as_mut().expect("connection present until drop")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn);
        }
    }
}
