//! End-to-end checker behaviour: scheduling, thresholds, watchers,
//! reporters and shutdown. Runs on tokio's paused clock, so the one
//! second minimum period costs no wall time.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use vigil_core::*;

#[derive(Debug, thiserror::Error)]
#[error("E")]
struct E;

fn counting_ok(calls: Arc<AtomicUsize>) -> impl Probe {
    ProbeFn::new(move |_| {
        calls.fetch_add(1, Ordering::SeqCst);
        async { Ok(()) }
    })
}

fn counting_err(calls: Arc<AtomicUsize>) -> impl Probe {
    ProbeFn::new(move |_| {
        calls.fetch_add(1, Ordering::SeqCst);
        async { Err(anyhow::Error::new(E)) }
    })
}

fn config() -> CheckerConfig {
    CheckerConfig::default().with_period(Duration::from_secs(1))
}

async fn stop(checker: &Checker, token: &CancellationToken) {
    token.cancel();
    checker.wait().await;
}

#[tokio::test(start_paused = true)]
async fn success_threshold_emits_once_after_three_rounds() {
    let checker = Checker::new(config().with_success_threshold(3));
    let calls = Arc::new(AtomicUsize::new(0));
    checker
        .add_probe_with_timeout("success", Duration::from_millis(50), counting_ok(calls.clone()))
        .await;

    let mut watcher = checker.watch().await;
    let token = CancellationToken::new();
    checker.start(token.clone()).await.unwrap();

    let status = watcher.recv().await.unwrap();
    assert!(status.as_error().is_none());
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert!(watcher.try_recv().is_err());

    stop(&checker, &token).await;
}

#[tokio::test(start_paused = true)]
async fn failure_threshold_emits_wrapped_error() {
    let checker = Checker::new(config().with_failure_threshold(2));
    let calls = Arc::new(AtomicUsize::new(0));
    checker
        .add_probe_with_timeout("fail", Duration::from_millis(50), counting_err(calls.clone()))
        .await;

    let token = CancellationToken::new();
    let mut stream = checker.start(token.clone()).await.unwrap();

    let status = stream.recv().await.unwrap();
    let err = status.as_error().unwrap();
    assert!(err.is::<E>());
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    stop(&checker, &token).await;
}

#[tokio::test(start_paused = true)]
async fn nothing_is_emitted_before_failure_threshold() {
    let checker = Checker::new(config().with_failure_threshold(3));
    let calls = Arc::new(AtomicUsize::new(0));
    checker.add_probe("fail", counting_err(calls.clone())).await;

    let token = CancellationToken::new();
    let mut stream = checker.start(token.clone()).await.unwrap();

    // Rounds run at t=0s and t=1s; neither reaches the threshold.
    let early = tokio::time::timeout(Duration::from_millis(1500), stream.recv()).await;
    assert!(early.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    // Threshold round and every failing round after it are emitted.
    assert!(stream.recv().await.unwrap().as_error().is_some());
    assert!(stream.recv().await.unwrap().as_error().is_some());
    assert_eq!(calls.load(Ordering::SeqCst), 4);

    stop(&checker, &token).await;
}

#[tokio::test(start_paused = true)]
async fn mixed_probes_in_one_round() {
    let checker = Checker::new(config().with_failure_threshold(1));
    checker
        .add_probe("a", ProbeFn::new(|_| async { Ok(()) }))
        .await;
    checker
        .add_probe("b", ProbeFn::new(|_| async { Err(anyhow::anyhow!("F")) }))
        .await;

    let token = CancellationToken::new();
    let mut stream = checker.start(token.clone()).await.unwrap();
    let status = stream.recv().await.unwrap();

    assert_eq!(status.outcome("a"), Some(None));
    assert_eq!(status.outcome("b").unwrap().unwrap().to_string(), "F");
    assert_eq!(status.failures().len(), 1);
    assert_eq!(status.failures()[0].to_string(), "F");

    stop(&checker, &token).await;
}

#[tokio::test(start_paused = true)]
async fn watchers_receive_identical_statuses() {
    let checker = Checker::new(config());
    checker
        .add_probe("multi", ProbeFn::new(|_| async { Ok(()) }))
        .await;

    let mut first = checker.watch().await;
    let mut second = checker.watch().await;
    let token = CancellationToken::new();
    checker.start(token.clone()).await.unwrap();

    let a = first.recv().await.unwrap();
    let b = second.recv().await.unwrap();
    assert_eq!(a, b);
    assert!(a.is_healthy());

    stop(&checker, &token).await;
}

#[tokio::test(start_paused = true)]
async fn stalled_watcher_does_not_hold_back_others() {
    let checker = Checker::new(config().with_buffer_size(1));
    checker
        .add_probe("ok", ProbeFn::new(|_| async { Ok(()) }))
        .await;
    let reporter = Arc::new(Recording::default());
    checker.add_reporter(reporter.clone()).await;

    let _stalled = checker.watch().await;
    let mut live = checker.watch().await;
    let token = CancellationToken::new();
    checker.start(token.clone()).await.unwrap();

    for _ in 0..5 {
        assert!(live.recv().await.is_some());
    }
    wait_for(|| reporter.calls.load(Ordering::SeqCst) >= 5).await;

    stop(&checker, &token).await;
}

#[tokio::test(start_paused = true)]
async fn cancellation_closes_watchers_and_stops_probing() {
    let checker = Checker::new(config());
    let calls = Arc::new(AtomicUsize::new(0));
    checker.add_probe("p", counting_ok(calls.clone())).await;

    let mut early = checker.watch().await;
    let token = CancellationToken::new();
    let mut stream = checker.start(token.clone()).await.unwrap();

    assert!(stream.recv().await.is_some());
    assert!(stream.recv().await.is_some());
    token.cancel();
    checker.wait().await;

    while stream.recv().await.is_some() {}
    while early.recv().await.is_some() {}

    let after_stop = calls.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(calls.load(Ordering::SeqCst), after_stop);

    let mut late = checker.watch().await;
    assert!(late.recv().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn initial_delay_postpones_first_round() {
    let checker = Checker::new(config().with_initial_delay(Duration::from_secs(2)));
    checker
        .add_probe("delayed", ProbeFn::new(|_| async { Ok(()) }))
        .await;

    let started = Instant::now();
    let token = CancellationToken::new();
    let mut stream = checker.start(token.clone()).await.unwrap();

    assert!(stream.recv().await.unwrap().is_healthy());
    assert!(started.elapsed() >= Duration::from_secs(2));

    stop(&checker, &token).await;
}

#[tokio::test(start_paused = true)]
async fn cancel_during_initial_delay_runs_no_round() {
    let checker = Checker::new(config().with_initial_delay(Duration::from_secs(30)));
    let calls = Arc::new(AtomicUsize::new(0));
    checker.add_probe("p", counting_ok(calls.clone())).await;

    let token = CancellationToken::new();
    let mut stream = checker.start(token.clone()).await.unwrap();

    tokio::time::sleep(Duration::from_secs(1)).await;
    token.cancel();

    assert!(stream.recv().await.is_none());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn hung_probe_is_reported_as_timeout() {
    let checker = Checker::new(config().with_failure_threshold(1));
    checker
        .add_probe_with_timeout(
            "hung",
            Duration::from_millis(100),
            ProbeFn::new(|_| async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            }),
        )
        .await;

    let started = Instant::now();
    let token = CancellationToken::new();
    let mut stream = checker.start(token.clone()).await.unwrap();

    let status = stream.recv().await.unwrap();
    assert!(status.outcome("hung").unwrap().unwrap().is_timeout());
    assert!(started.elapsed() < Duration::from_millis(200));

    stop(&checker, &token).await;
}

#[tokio::test(start_paused = true)]
async fn probes_added_while_running_join_later_rounds() {
    let checker = Checker::new(config());
    checker
        .add_probe("first", ProbeFn::new(|_| async { Ok(()) }))
        .await;

    let token = CancellationToken::new();
    let mut stream = checker.start(token.clone()).await.unwrap();
    let round_one = stream.recv().await.unwrap();
    assert_eq!(round_one.outcomes().len(), 1);

    checker
        .add_probe("second", ProbeFn::new(|_| async { Ok(()) }))
        .await;
    let round_two = stream.recv().await.unwrap();
    assert_eq!(round_two.outcomes().len(), 2);

    stop(&checker, &token).await;
}

#[tokio::test(start_paused = true)]
async fn flaky_reporter_is_retried_without_surfacing_errors() {
    let checker = Checker::new(config());
    checker
        .add_probe("ok", ProbeFn::new(|_| async { Ok(()) }))
        .await;
    let reporter = Arc::new(Recording::failing_first(2));
    checker.add_reporter(reporter.clone()).await;

    let token = CancellationToken::new();
    let mut stream = checker.start(token.clone()).await.unwrap();

    wait_for(|| reporter.delivered.load(Ordering::SeqCst) >= 1).await;
    assert_eq!(reporter.calls.load(Ordering::SeqCst), 3);
    assert!(stream.recv().await.unwrap().is_healthy());

    stop(&checker, &token).await;
}

#[tokio::test(start_paused = true)]
async fn unbounded_check_timeout_keeps_scheduler_alive() {
    let checker = Checker::new(config());
    checker
        .add_probe_with_timeout("forever", Duration::MAX, ProbeFn::new(|_| async { Ok(()) }))
        .await;

    let token = CancellationToken::new();
    let mut stream = checker.start(token.clone()).await.unwrap();
    assert!(stream.recv().await.unwrap().is_healthy());

    token.cancel();
    checker.wait().await;
    while stream.recv().await.is_some() {}
}

#[tokio::test(start_paused = true)]
async fn unbounded_reporter_budget_still_dispatches() {
    let opts = CheckerOptions {
        period: Some("1s".into()),
        reporter_timeout: Some("18446744073709551615s".into()),
        ..Default::default()
    };
    let checker = Checker::from_options(opts).unwrap();
    checker
        .add_probe("ok", ProbeFn::new(|_| async { Ok(()) }))
        .await;
    let reporter = Arc::new(Recording::failing_first(1));
    checker.add_reporter(reporter.clone()).await;

    let token = CancellationToken::new();
    let mut stream = checker.start(token.clone()).await.unwrap();

    wait_for(|| reporter.delivered.load(Ordering::SeqCst) >= 1).await;
    assert!(stream.recv().await.is_some());

    token.cancel();
    checker.wait().await;
    while stream.recv().await.is_some() {}
}

#[tokio::test(start_paused = true)]
async fn panicking_check_is_contained_every_round() {
    let checker = Checker::new(config().with_failure_threshold(1));
    checker.add_probe("boom", Panics).await;
    checker
        .add_probe("ok", ProbeFn::new(|_| async { Ok(()) }))
        .await;

    let token = CancellationToken::new();
    let mut stream = checker.start(token.clone()).await.unwrap();

    for _ in 0..3 {
        let status = stream.recv().await.unwrap();
        assert!(status.outcome("boom").unwrap().unwrap().is_panic());
        assert_eq!(status.outcome("ok"), Some(None));
        assert_eq!(status.failures().len(), 1);
    }

    stop(&checker, &token).await;
}

struct Panics;

#[async_trait]
impl Probe for Panics {
    async fn check(&self, _ctx: &Context) -> anyhow::Result<()> {
        panic!("exploded")
    }
}

#[derive(Default)]
struct Recording {
    fail_first: usize,
    calls: AtomicUsize,
    delivered: AtomicUsize,
}

impl Recording {
    fn failing_first(n: usize) -> Self {
        Self {
            fail_first: n,
            ..Default::default()
        }
    }
}

#[async_trait]
impl Reporter for Recording {
    fn name(&self) -> &str {
        "recording"
    }

    async fn report(&self, _ctx: &Context, _status: &Status) -> anyhow::Result<()> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.fail_first {
            anyhow::bail!("attempt {call} rejected");
        }
        self.delivered.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

async fn wait_for(cond: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(60);
    while !cond() {
        assert!(Instant::now() < deadline, "condition not met in time");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
