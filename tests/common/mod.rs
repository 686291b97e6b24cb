//! Common test utilities shared across integration tests.

use std::future::Future;
use std::time::Duration;

/// Poll an async condition every 10ms until it holds.
///
/// More reliable than fixed sleeps since dispatch timing depends on
/// the scheduler's polling cadence.
///
/// # Panics
///
/// Panics if the timeout is reached before the condition holds.
pub async fn eventually<F, Fut>(timeout: Duration, what: &str, mut probe: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if probe().await {
            return;
        }
        if tokio::time::Instant::now() > deadline {
            panic!("timeout waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
