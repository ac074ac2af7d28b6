pub mod fake_liveness;
pub mod workers;

use std::sync::Once;
use std::time::{Duration, Instant};

use tracing_subscriber::{fmt, EnvFilter};

static INIT: Once = Once::new();

/// Filter used when `RUST_LOG` is unset: supervisor internals at debug,
/// everything else at info.
const DEFAULT_TEST_FILTER: &str = "info,jobwarden=debug";

/// Install a test-writer subscriber once per test binary.
///
/// Output is captured by the harness and only shown for failing tests
/// (or with `-- --nocapture`). Override with e.g. `RUST_LOG=trace`.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_TEST_FILTER));

        fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_thread_names(true)
            .init();
    });
}

/// Upper bound for async tests that drive real workers.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Run `f`, panicking if it takes longer than [`TEST_TIMEOUT`].
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    match tokio::time::timeout(TEST_TIMEOUT, f).await {
        Ok(value) => value,
        Err(_) => panic!("test timed out after {TEST_TIMEOUT:?}"),
    }
}

/// Poll `cond` every 20ms until it holds or `timeout` elapses.
/// Returns whether it held.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if cond() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
}
