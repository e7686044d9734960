//! Async timeout wrappers.
//!
//! Deadlines here are per attempt. A zero duration means "no deadline", matching the
//! zero-value convention of the configuration.

use std::future::Future;
use std::time::Duration;

use crate::error::{ProtocolError, Result};

/// Default timeout for connection establishment
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Delay before retrying a transient accept error
pub const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(5);

/// Await `future` for at most `duration`, mapping an elapsed deadline to
/// [`ProtocolError::Timeout`].
pub async fn with_timeout_error<F, T>(future: F, duration: Duration) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => Err(ProtocolError::Timeout),
    }
}

/// Like [`with_timeout_error`], but a zero `duration` awaits without a deadline.
pub async fn maybe_timeout<F, T>(future: F, duration: Duration) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    if duration.is_zero() {
        future.await
    } else {
        with_timeout_error(future, duration).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn elapsed_deadline_is_timeout_error() {
        let slow = async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok::<_, ProtocolError>(())
        };
        let result = with_timeout_error(slow, Duration::from_millis(10)).await;
        assert!(matches!(result, Err(ProtocolError::Timeout)));
    }

    #[tokio::test]
    async fn zero_duration_disables_deadline() {
        let slow = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok::<_, ProtocolError>(7)
        };
        assert_eq!(maybe_timeout(slow, Duration::ZERO).await.ok(), Some(7));
    }
}
