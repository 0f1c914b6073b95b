//! Reporter capability and dispatch.
//!
//! Every emitted status is offered to all reporters concurrently. Each
//! reporter gets its own retry loop with exponential backoff, bounded by
//! an elapsed-time budget. A reporter that never succeeds is logged and
//! skipped; it cannot hold up other reporters or the checker.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::join_all;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::context::Context;
use crate::status::Status;
use crate::watch::Watcher;

/// A sink that receives emitted statuses.
#[async_trait]
pub trait Reporter: Send + Sync + 'static {
    /// Identity used in logs.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    async fn report(&self, ctx: &Context, status: &Status) -> anyhow::Result<()>;
}

#[async_trait]
impl<R: Reporter + ?Sized> Reporter for Arc<R> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn report(&self, ctx: &Context, status: &Status) -> anyhow::Result<()> {
        (**self).report(ctx, status).await
    }
}

/// Doubling retry delay, capped per step and by total elapsed time.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    current: Duration,
    max_interval: Duration,
    max_elapsed: Duration,
    started: Instant,
}

impl ExponentialBackoff {
    pub const INITIAL_INTERVAL: Duration = Duration::from_millis(100);
    pub const MAX_INTERVAL: Duration = Duration::from_secs(5);

    pub fn new(max_elapsed: Duration) -> Self {
        Self::with_intervals(Self::INITIAL_INTERVAL, Self::MAX_INTERVAL, max_elapsed)
    }

    pub fn with_intervals(initial: Duration, max_interval: Duration, max_elapsed: Duration) -> Self {
        Self {
            current: initial,
            max_interval: max_interval.max(initial),
            max_elapsed,
            started: Instant::now(),
        }
    }

    /// Delay before the next attempt, or `None` once the budget is spent.
    pub fn next_delay(&mut self) -> Option<Duration> {
        let elapsed = self.started.elapsed();
        if elapsed >= self.max_elapsed {
            return None;
        }
        let delay = self.current.min(self.max_elapsed - elapsed);
        self.current = self.current.saturating_mul(2).min(self.max_interval);
        Some(delay)
    }
}

/// What happened to one reporter for one status.
#[derive(Debug, Clone)]
pub enum ReportOutcome {
    Delivered { attempts: u32 },
    GaveUp { attempts: u32, error: Arc<anyhow::Error> },
    Cancelled { attempts: u32 },
}

impl ReportOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            Self::Delivered { attempts }
            | Self::GaveUp { attempts, .. }
            | Self::Cancelled { attempts } => *attempts,
        }
    }
}

/// Per-reporter outcomes of one dispatch, in registration order.
#[derive(Debug, Clone, Default)]
pub struct DispatchReport {
    pub outcomes: Vec<(String, ReportOutcome)>,
}

impl DispatchReport {
    pub fn delivered(&self) -> usize {
        self.outcomes.iter().filter(|(_, o)| o.is_delivered()).count()
    }
}

/// Ordered set of registered reporters.
#[derive(Default)]
pub struct ReporterSet {
    reporters: RwLock<Vec<Arc<dyn Reporter>>>,
}

impl ReporterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add(&self, reporter: Arc<dyn Reporter>) {
        self.reporters.write().await.push(reporter);
    }

    pub async fn snapshot(&self) -> Vec<Arc<dyn Reporter>> {
        self.reporters.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.reporters.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Offer `status` to every reporter concurrently and wait for all of them.
pub async fn dispatch(
    reporters: &[Arc<dyn Reporter>],
    status: &Status,
    ctx: &Context,
    budget: Duration,
) -> DispatchReport {
    let deliveries = reporters
        .iter()
        .map(|reporter| deliver(reporter.as_ref(), status, ctx, budget));
    let outcomes = join_all(deliveries).await;

    DispatchReport {
        outcomes: reporters
            .iter()
            .map(|r| r.name().to_string())
            .zip(outcomes)
            .collect(),
    }
}

/// One reporter's retry loop.
async fn deliver(
    reporter: &dyn Reporter,
    status: &Status,
    parent: &Context,
    budget: Duration,
) -> ReportOutcome {
    let ctx = parent.child_with_timeout(budget);
    let mut backoff = ExponentialBackoff::new(budget);
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        let remaining = ctx.remaining().unwrap_or(budget);
        let attempt = AssertUnwindSafe(reporter.report(&ctx, status)).catch_unwind();

        let result = tokio::select! {
            r = tokio::time::timeout(remaining, attempt) => r,
            _ = ctx.cancelled() => return ReportOutcome::Cancelled { attempts },
        };

        let err = match result {
            Ok(Ok(Ok(()))) => {
                if attempts > 1 {
                    debug!(reporter = reporter.name(), attempts, "status delivered after retries");
                }
                return ReportOutcome::Delivered { attempts };
            }
            Ok(Ok(Err(err))) => err,
            Ok(Err(_)) => anyhow::anyhow!("reporter panicked"),
            Err(_) => anyhow::anyhow!("report attempt timed out after {remaining:?}"),
        };

        let delay = match backoff.next_delay() {
            Some(delay) if !delay.is_zero() => delay,
            _ => {
                warn!(
                    reporter = reporter.name(),
                    attempts,
                    error = %format_args!("{err:#}"),
                    "reporter failed, giving up on this status"
                );
                return ReportOutcome::GaveUp {
                    attempts,
                    error: Arc::new(err),
                };
            }
        };

        debug!(
            reporter = reporter.name(),
            attempts,
            retry_in_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            error = %format_args!("{err:#}"),
            "report failed, retrying"
        );

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = ctx.cancelled() => return ReportOutcome::Cancelled { attempts },
        }
    }
}

/// The reporter consumption path: pull statuses off `watcher` and dispatch
/// each one until the stream ends or `ctx` is cancelled.
pub async fn run_dispatch_loop(
    mut watcher: Watcher,
    reporters: Arc<ReporterSet>,
    ctx: Context,
    budget: Duration,
) {
    debug!("reporter dispatch loop starting");

    loop {
        let status = tokio::select! {
            next = watcher.recv() => match next {
                Some(status) => status,
                None => break,
            },
            _ = ctx.cancelled() => break,
        };

        let snapshot = reporters.snapshot().await;
        if snapshot.is_empty() {
            continue;
        }

        let report = dispatch(&snapshot, &status, &ctx, budget).await;
        debug!(
            reporters = snapshot.len(),
            delivered = report.delivered(),
            "status dispatched"
        );
    }

    info!("reporter dispatch loop stopped");
}
