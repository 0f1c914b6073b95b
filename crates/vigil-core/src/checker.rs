//! Checker: owns the probes, reporters and watchers, and drives rounds.
//!
//! `start()` spawns two background tasks: the round scheduler and the
//! reporter dispatch loop. Both stop when the cancellation token fires;
//! the scheduler then closes every watcher.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::{CheckerConfig, CheckerOptions};
use crate::context::Context;
use crate::error::{CheckerError, CheckerResult};
use crate::hysteresis::Hysteresis;
use crate::probe::{Probe, ProbeRegistry};
use crate::reporter::{Reporter, ReporterSet, run_dispatch_loop};
use crate::round::run_round;
use crate::status::Status;
use crate::watch::{Broadcaster, Watcher};

struct Inner {
    config: CheckerConfig,
    probes: ProbeRegistry,
    reporters: Arc<ReporterSet>,
    watchers: Broadcaster,
    started: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// Periodic health checker.
///
/// Cloning yields another handle to the same checker.
#[derive(Clone)]
pub struct Checker {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Checker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Checker")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl Checker {
    pub fn new(config: CheckerConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                probes: ProbeRegistry::new(),
                reporters: Arc::new(ReporterSet::new()),
                watchers: Broadcaster::new(),
                started: AtomicBool::new(false),
                tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Build a checker from raw options, rejecting unparseable values.
    pub fn from_options(opts: CheckerOptions) -> CheckerResult<Self> {
        Ok(Self::new(CheckerConfig::try_from(opts)?))
    }

    pub fn config(&self) -> &CheckerConfig {
        &self.inner.config
    }

    /// Register `probe` under `name` with the configured default timeout.
    pub async fn add_probe(&self, name: impl Into<String>, probe: impl Probe) {
        let timeout = self.inner.config.probe_timeout();
        self.add_probe_with_timeout(name, timeout, probe).await;
    }

    /// Register `probe` under `name`. A zero timeout means the default.
    /// Re-registering a name replaces the previous probe.
    pub async fn add_probe_with_timeout(
        &self,
        name: impl Into<String>,
        timeout: Duration,
        probe: impl Probe,
    ) {
        let timeout = if timeout.is_zero() {
            self.inner.config.probe_timeout()
        } else {
            timeout
        };
        let name = name.into();
        debug!(probe = %name, ?timeout, "probe registered");
        self.inner
            .probes
            .register(name, timeout, Arc::new(probe))
            .await;
    }

    pub async fn add_reporter(&self, reporter: impl Reporter) {
        debug!(reporter = reporter.name(), "reporter registered");
        self.inner.reporters.add(Arc::new(reporter)).await;
    }

    /// A new independent stream of emitted statuses.
    pub async fn watch(&self) -> Watcher {
        self.inner
            .watchers
            .subscribe(self.inner.config.buffer_size())
            .await
    }

    /// Start the scheduler and reporter tasks, driven by `token`.
    ///
    /// Returns a status stream equivalent to `watch()`. A checker can be
    /// started once; later calls fail with `AlreadyStarted`.
    pub async fn start(&self, token: CancellationToken) -> CheckerResult<Watcher> {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return Err(CheckerError::AlreadyStarted);
        }

        let config = &self.inner.config;
        let stream = self.watch().await;
        let reporter_feed = self.watch().await;
        let ctx = Context::new(token);

        let dispatch = tokio::spawn(run_dispatch_loop(
            reporter_feed,
            self.inner.reporters.clone(),
            ctx.child(),
            config.reporter_timeout(),
        ));
        let scheduler = tokio::spawn(run_scheduler(self.inner.clone(), ctx));

        self.inner.tasks.lock().await.extend([scheduler, dispatch]);

        info!(
            period = ?config.period(),
            initial_delay = ?config.initial_delay(),
            success_threshold = config.success_threshold(),
            failure_threshold = config.failure_threshold(),
            probes = self.inner.probes.len().await,
            reporters = self.inner.reporters.len().await,
            "checker started"
        );

        Ok(stream)
    }

    /// Wait for the background tasks to finish after cancellation.
    pub async fn wait(&self) {
        let tasks: Vec<_> = self.inner.tasks.lock().await.drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                error!(error = %e, "checker task failed");
            }
        }
    }

    /// Run a single round right now, outside the schedule and the
    /// hysteresis gate.
    pub async fn check_once(&self) -> Status {
        let probes = self.inner.probes.snapshot().await;
        run_round(&probes, &Context::background())
            .await
            .unwrap_or_default()
    }

    pub fn is_started(&self) -> bool {
        self.inner.started.load(Ordering::SeqCst)
    }
}

/// The round loop: optional initial delay, then one round per period.
async fn run_scheduler(inner: Arc<Inner>, ctx: Context) {
    let config = &inner.config;

    if !config.initial_delay().is_zero() {
        tokio::select! {
            biased;
            _ = ctx.cancelled() => {
                shutdown(&inner).await;
                return;
            }
            _ = tokio::time::sleep(config.initial_delay()) => {}
        }
    }

    let mut ticker = tokio::time::interval(config.period());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut gate = Hysteresis::new(config.success_threshold(), config.failure_threshold());

    loop {
        tokio::select! {
            biased;
            _ = ctx.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let probes = inner.probes.snapshot().await;
        let Some(status) = run_round(&probes, &ctx).await else {
            break;
        };

        let emit = gate.observe(&status);
        debug!(
            probes = probes.len(),
            failures = status.failures().len(),
            duration_ms = u64::try_from(status.duration().as_millis()).unwrap_or(u64::MAX),
            consecutive_successes = gate.consecutive_successes(),
            consecutive_failures = gate.consecutive_failures(),
            emitted = emit,
            "round complete"
        );

        if emit {
            inner.watchers.publish(&status).await;
        }
    }

    shutdown(&inner).await;
}

async fn shutdown(inner: &Inner) {
    inner.watchers.close().await;
    info!("checker stopped");
}
