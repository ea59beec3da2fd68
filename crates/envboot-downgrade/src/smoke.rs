//! Smoke test executors.
//!
//! A smoke test is a single command run against a candidate profile. The
//! engine only needs a pass/fail verdict; every failure mode (non-zero exit,
//! spawn error, timeout) is a fail.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use envboot_core::SmokeTestConfig;
use tracing::{debug, warn};

/// Runs a validation command and reports whether it passed.
pub trait SmokeTestExecutor {
    fn run(&self, command: &str) -> bool;
}

/// Runs the command through `sh -c` with a wall-clock limit.
#[derive(Debug, Clone)]
pub struct ShellSmokeTest {
    timeout: Duration,
}

impl ShellSmokeTest {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn from_config(config: &SmokeTestConfig) -> Self {
        Self::new(Duration::from_secs(config.timeout_secs))
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl SmokeTestExecutor for ShellSmokeTest {
    fn run(&self, command: &str) -> bool {
        let rt = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(rt) => rt,
            Err(e) => {
                warn!(error = %e, "failed to start smoke test runtime");
                return false;
            }
        };

        let outcome = rt.block_on(async {
            let mut cmd = tokio::process::Command::new("sh");
            cmd.args(["-c", command]).kill_on_drop(true);
            tokio::time::timeout(self.timeout, cmd.status()).await
        });

        match outcome {
            Ok(Ok(status)) => {
                debug!(command, code = ?status.code(), "smoke test finished");
                status.success()
            }
            Ok(Err(e)) => {
                warn!(command, error = %e, "smoke test could not be spawned");
                false
            }
            Err(_) => {
                warn!(command, timeout_secs = self.timeout.as_secs(), "smoke test timed out");
                false
            }
        }
    }
}

/// Returns a fixed verdict without running anything.
#[derive(Debug, Default)]
pub struct StaticSmokeTest {
    verdict: bool,
    calls: AtomicUsize,
}

impl StaticSmokeTest {
    pub fn passing() -> Self {
        Self {
            verdict: true,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            verdict: false,
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of times `run` has been called.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

impl SmokeTestExecutor for StaticSmokeTest {
    fn run(&self, command: &str) -> bool {
        self.calls.fetch_add(1, Ordering::Relaxed);
        debug!(command, verdict = self.verdict, "static smoke test");
        self.verdict
    }
}
