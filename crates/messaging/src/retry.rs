//! Start-up connection retry.

use std::future::Future;
use std::time::Duration;

use tracing::{info, warn};

use crate::error::ConnectError;

/// Calls `attempt` until it succeeds, sleeping `backoff` after each failure.
///
/// Never gives up: a service cannot do anything useful before the bus is
/// up, so start-up blocks here until the broker becomes reachable. Each
/// failure is logged and swallowed.
pub async fn connect_with_retry<T, F, Fut>(mut attempt: F, backoff: Duration) -> T
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ConnectError>>,
{
    let mut attempts: u64 = 0;
    loop {
        attempts += 1;
        match attempt().await {
            Ok(connected) => {
                if attempts > 1 {
                    info!(attempts, "connected to broker after retrying");
                }
                return connected;
            }
            Err(e) => {
                warn!(
                    error = %e,
                    attempt = attempts,
                    backoff_ms = backoff.as_millis() as u64,
                    "waiting for broker"
                );
                tokio::time::sleep(backoff).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn retries_at_configured_interval() {
        let calls = Arc::new(AtomicUsize::new(0));
        let started = tokio::time::Instant::now();

        let counter = calls.clone();
        let value = connect_with_retry(
            move || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(ConnectError::Connection("refused".into()))
                    } else {
                        Ok(42)
                    }
                }
            },
            Duration::from_secs(3),
        )
        .await;

        assert_eq!(value, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(started.elapsed(), Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn does_not_return_until_reachable() {
        let reachable = Arc::new(AtomicBool::new(false));

        let flag = reachable.clone();
        let handle = tokio::spawn(connect_with_retry(
            move || {
                let flag = flag.clone();
                async move {
                    if flag.load(Ordering::SeqCst) {
                        Ok("bus")
                    } else {
                        Err(ConnectError::Connection("unreachable".into()))
                    }
                }
            },
            Duration::from_millis(100),
        ));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(!handle.is_finished());

        reachable.store(true, Ordering::SeqCst);
        let bus = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("retry loop should finish once reachable")
            .unwrap();
        assert_eq!(bus, "bus");
    }

    #[tokio::test]
    async fn first_success_returns_immediately() {
        let value =
            connect_with_retry(|| async { Ok::<_, ConnectError>("ok") }, Duration::ZERO).await;
        assert_eq!(value, "ok");
    }
}
