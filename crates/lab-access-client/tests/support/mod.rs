#![allow(dead_code)]

pub mod mock_backend;
pub mod mock_hub;

use std::time::Duration;

pub const STEP_TIMEOUT: Duration = Duration::from_secs(3);

/// Poll `check` until it holds or [`STEP_TIMEOUT`] elapses.
pub async fn eventually(mut check: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + STEP_TIMEOUT;
    while !check() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for condition"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
