//! Test assertion helpers.
//!
//! Provides polling-based assertions for async test scenarios.

use std::time::Duration;

use tokio::time::{Instant, sleep};

/// Default polling interval for [`assert_eventually`].
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Polls a condition until it returns true or the timeout expires.
///
/// Prefer waiting on the detector's applied watermark where one is
/// available; this helper covers conditions that have no explicit signal,
/// such as the phase flipping to ready.
///
/// # Returns
///
/// `true` if the condition became true before timeout, `false` otherwise.
///
/// # Example
///
/// ```no_run
/// use std::sync::{
///     Arc,
///     atomic::{AtomicBool, Ordering},
/// };
/// use std::time::Duration;
/// use inferadb_issues_test_utils::assert_eventually;
///
/// # async fn example() {
/// let ready = Arc::new(AtomicBool::new(false));
/// let flag = Arc::clone(&ready);
/// tokio::spawn(async move { flag.store(true, Ordering::SeqCst) });
///
/// let became_ready =
///     assert_eventually(Duration::from_secs(1), || ready.load(Ordering::SeqCst)).await;
/// assert!(became_ready, "flag should be set");
/// # }
/// ```
pub async fn assert_eventually<F>(timeout: Duration, condition: F) -> bool
where
    F: Fn() -> bool,
{
    let start = Instant::now();

    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        sleep(DEFAULT_POLL_INTERVAL).await;
    }

    // Final check after timeout
    condition()
}
