//! Backend Timeout Management
//!
//! Bounds a backend call so a stalled provider surfaces as
//! `BackendTimeoutError` instead of holding the request open.

use std::future::Future;
use std::time::Duration;
use tokio::time;

use super::BackendError;

/// Backend call timeout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendTimeout {
    duration: Duration,
}

impl Default for BackendTimeout {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

impl BackendTimeout {
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }

    pub fn from_secs(secs: u64) -> Self {
        Self::new(Duration::from_secs(secs))
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Run `future`, failing with [`BackendError::Timeout`] if it does not
    /// finish in time
    pub async fn run<F, T>(&self, future: F) -> Result<T, BackendError>
    where
        F: Future<Output = Result<T, BackendError>>,
    {
        match time::timeout(self.duration, future).await {
            Ok(result) => result,
            Err(_) => Err(BackendError::Timeout(self.duration.as_millis() as u64)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_default() {
        assert_eq!(BackendTimeout::default().duration(), Duration::from_secs(30));
    }

    #[test]
    fn test_timeout_from_secs() {
        assert_eq!(BackendTimeout::from_secs(45).duration(), Duration::from_secs(45));
    }

    #[tokio::test]
    async fn test_timeout_run_returns_value() {
        let result = BackendTimeout::from_secs(1)
            .run(async { Ok::<_, BackendError>("generated".to_string()) })
            .await;
        assert_eq!(result.unwrap(), "generated");
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_run_timeout() {
        let result = BackendTimeout::from_secs(1)
            .run(async {
                tokio::time::sleep(Duration::from_secs(2)).await;
                Ok::<(), BackendError>(())
            })
            .await;

        assert_eq!(result.unwrap_err(), BackendError::Timeout(1000));
    }

    #[tokio::test]
    async fn test_timeout_run_future_error() {
        let result = BackendTimeout::from_secs(1)
            .run(async { Err::<(), _>(BackendError::Unavailable("refused".into())) })
            .await;

        assert!(matches!(result, Err(BackendError::Unavailable(_))));
    }
}
