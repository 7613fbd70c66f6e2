//! Client and pool configuration.

use std::time::Duration;

/// Idle connections kept when no pool size is configured.
pub const DEFAULT_POOL_SIZE: usize = 10;
/// Bound on dialing (and authenticating) one connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Per-frame read/write bound when the caller supplies no deadline.
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for the store client and its pool.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Store address, e.g. "127.0.0.1:6379".
    pub addr: String,
    /// ACL username sent with AUTH. Ignored without a password.
    pub username: Option<String>,
    /// Password for AUTH. `None` or empty skips the handshake.
    pub password: Option<String>,
    /// Idle connections retained, and the number dialed at startup.
    pub pool_size: usize,
    /// Extra connections dialed while the pool is empty. Once `pool_size +
    /// max_overflow` connections are checked out, acquire waits for a release.
    /// `None` allows as many extra connections as `pool_size`.
    pub max_overflow: Option<usize>,
    /// Bound on dialing one connection, AUTH included.
    pub connect_timeout: Duration,
    /// Default per-frame I/O bound.
    pub io_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            addr: "127.0.0.1:6379".to_string(),
            username: None,
            password: None,
            pool_size: DEFAULT_POOL_SIZE,
            max_overflow: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            io_timeout: DEFAULT_IO_TIMEOUT,
        }
    }
}

impl ClientConfig {
    /// Default configuration for `addr`.
    pub fn new(addr: impl Into<String>) -> Self {
        ClientConfig {
            addr: addr.into(),
            ..ClientConfig::default()
        }
    }

    /// Sets the AUTH password.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Sets the pool size; zero selects the default.
    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    /// Most connections checked out at once.
    pub fn checkout_limit(&self) -> usize {
        let overflow = self.max_overflow.unwrap_or(self.pool_size);
        self.pool_size.saturating_add(overflow)
    }

    /// Password to authenticate with, if any.
    pub(crate) fn credentials(&self) -> Option<(Option<&str>, &str)> {
        let password = self.password.as_deref().filter(|p| !p.is_empty())?;
        Some((self.username.as_deref().filter(|u| !u.is_empty()), password))
    }

    /// Applies defaults to zero-valued fields.
    pub(crate) fn normalized(mut self) -> Self {
        if self.pool_size == 0 {
            self.pool_size = DEFAULT_POOL_SIZE;
        }
        if self.connect_timeout.is_zero() {
            self.connect_timeout = DEFAULT_CONNECT_TIMEOUT;
        }
        if self.io_timeout.is_zero() {
            self.io_timeout = DEFAULT_IO_TIMEOUT;
        }
        self
    }
}
