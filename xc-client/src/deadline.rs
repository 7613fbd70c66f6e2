//! # Deadlines
//!
//! Purpose: Carry a caller's time budget through acquire, send and receive.
//! A `Deadline` is the cancellation signal for one round trip: when it fires
//! the in-flight future is dropped and the caller gets control back at once.

use std::future::Future;
use std::time::Duration;

use tokio::time::{timeout_at, Instant};

use crate::error::{ClientError, ClientResult};

/// Optional point in time after which an operation is abandoned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Deadline(Option<Instant>);

impl Deadline {
    /// No caller deadline; per-frame I/O defaults still apply.
    pub const fn none() -> Self {
        Deadline(None)
    }

    /// Deadline `timeout` from now.
    pub fn after(timeout: Duration) -> Self {
        Deadline(Some(Instant::now() + timeout))
    }

    /// Deadline at a fixed instant.
    pub fn at(instant: Instant) -> Self {
        Deadline(Some(instant))
    }

    pub fn instant(&self) -> Option<Instant> {
        self.0
    }

    /// True once the deadline has passed. Never true for `Deadline::none()`.
    pub fn is_expired(&self) -> bool {
        matches!(self.0, Some(at) if Instant::now() >= at)
    }

    /// Time left, or `None` when there is no deadline.
    pub fn remaining(&self) -> Option<Duration> {
        self.0.map(|at| at.saturating_duration_since(Instant::now()))
    }

    /// The instant to enforce, falling back to `now + fallback`.
    pub(crate) fn or_after(&self, fallback: Duration) -> Instant {
        self.0.unwrap_or_else(|| Instant::now() + fallback)
    }

    /// Races `fut` against the deadline. The future is dropped if the deadline wins.
    pub(crate) async fn run<F, T>(&self, fut: F) -> ClientResult<T>
    where
        F: Future<Output = ClientResult<T>>,
    {
        match self.0 {
            Some(at) => timeout_at(at, fut)
                .await
                .unwrap_or(Err(ClientError::DeadlineExceeded)),
            None => fut.await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_never_expires() {
        let deadline = Deadline::none();
        assert!(!deadline.is_expired());
        assert_eq!(deadline.remaining(), None);
    }

    #[tokio::test]
    async fn zero_timeout_is_expired() {
        let deadline = Deadline::after(Duration::ZERO);
        assert!(deadline.is_expired());
        assert_eq!(deadline.remaining(), Some(Duration::ZERO));
    }

    #[tokio::test(start_paused = true)]
    async fn run_returns_deadline_exceeded() {
        let deadline = Deadline::after(Duration::from_millis(10));
        let result: ClientResult<()> = deadline
            .run(async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(ClientError::DeadlineExceeded)));
    }

    #[tokio::test]
    async fn run_passes_through_results() {
        let value = Deadline::after(Duration::from_secs(5))
            .run(async { Ok::<_, ClientError>(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }
}
