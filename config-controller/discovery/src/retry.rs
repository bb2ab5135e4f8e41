use crate::api::DiscoveryError;
use std::future::Future;
use tokio::time;

/// Attempts per call before a throttle becomes terminal.
pub(crate) const THROTTLE_RETRY_LIMIT: u32 = 5;

/// Fixed backoff between throttled attempts.
pub(crate) const THROTTLE_BACKOFF: time::Duration = time::Duration::from_millis(500);

/// Runs `op` until it returns something other than `Throttled`, sleeping
/// between attempts, up to the retry limit.
pub(crate) async fn with_throttle_retry<T, F, Fut>(
    name: &str,
    mut op: F,
) -> Result<T, DiscoveryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DiscoveryError>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Err(error) if error.is_throttle() => {
                if attempt >= THROTTLE_RETRY_LIMIT {
                    tracing::warn!(op = name, attempt, "throttled, giving up");
                    return Err(error);
                }
                tracing::debug!(op = name, attempt, "throttled, backing off");
                attempt += 1;
                time::sleep(THROTTLE_BACKOFF).await;
            }
            result => return result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Flaky {
        throttles: Mutex<u32>,
    }

    impl Flaky {
        async fn call(&self) -> Result<u32, DiscoveryError> {
            let mut remaining = self.throttles.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(DiscoveryError::Throttled);
            }
            Ok(42)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retries_through_throttling() {
        let flaky = Flaky {
            throttles: Mutex::new(3),
        };
        let result = with_throttle_retry("test", || flaky.call()).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test(start_paused = true)]
    async fn throttling_is_terminal_after_retry_limit() {
        let flaky = Flaky {
            throttles: Mutex::new(THROTTLE_RETRY_LIMIT + 1),
        };
        let result = with_throttle_retry("test", || flaky.call()).await;
        assert!(matches!(result, Err(DiscoveryError::Throttled)));
    }

    #[tokio::test(start_paused = true)]
    async fn not_found_is_not_retried() {
        let mut calls = 0;
        let result: Result<(), _> = with_throttle_retry("test", || {
            calls += 1;
            async { Err(DiscoveryError::NotFound) }
        })
        .await;
        assert!(matches!(result, Err(DiscoveryError::NotFound)));
        assert_eq!(calls, 1);
    }
}
