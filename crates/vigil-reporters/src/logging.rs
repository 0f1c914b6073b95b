//! Reporter that turns statuses into `tracing` events.

use async_trait::async_trait;
use tracing::{info, warn};
use vigil_core::{Context, Reporter, Status};

#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

#[async_trait]
impl Reporter for TracingReporter {
    fn name(&self) -> &str {
        "tracing"
    }

    async fn report(&self, _ctx: &Context, status: &Status) -> anyhow::Result<()> {
        let duration_ms = u64::try_from(status.duration().as_millis()).unwrap_or(u64::MAX);
        match status.as_error() {
            None => info!(
                probes = status.outcomes().len(),
                duration_ms,
                "health check passed"
            ),
            Some(err) => warn!(
                probes = status.outcomes().len(),
                failing = ?status.failing_probes().collect::<Vec<_>>(),
                duration_ms,
                error = %err,
                "health check failed"
            ),
        }
        Ok(())
    }
}
