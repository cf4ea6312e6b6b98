// SPDX-License-Identifier: MIT
//! Observability utilities — tracing init and sweep latency tracking.

use std::time::Instant;

use tracing::{debug, info};

/// Initialize the global tracing subscriber. `RUST_LOG` controls the
/// filter; defaults to `info` for this crate. Call once from the embedding
/// service's startup.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("geopilot=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Track latency of an async operation and emit a structured log event.
pub struct LatencyTracker {
    operation: &'static str,
    start: Instant,
}

impl LatencyTracker {
    pub fn start(operation: &'static str) -> Self {
        Self {
            operation,
            start: Instant::now(),
        }
    }

    /// Finish tracking and emit a log event with the elapsed time.
    pub fn finish(self) {
        let elapsed_ms = self.start.elapsed().as_millis();
        if elapsed_ms > 1000 {
            info!(operation = self.operation, elapsed_ms, "slow operation");
        } else {
            debug!(operation = self.operation, elapsed_ms, "operation complete");
        }
    }
}
