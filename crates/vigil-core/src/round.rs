//! Round runner: executes one snapshot of probes concurrently.
//!
//! Every probe runs on its own task under a derived context bounded by
//! `min(parent deadline, probe timeout)`. A probe that overruns is
//! abandoned and recorded as a timeout; a probe that panics is recorded
//! as a panic. Outcomes are written into a shared builder as each probe
//! finishes, and the status is frozen once all tasks have been joined.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, error};

use crate::context::Context;
use crate::probe::ProbeDescriptor;
use crate::status::{ProbeError, Status, StatusBuilder};

/// Run every probe in `probes` and return the round's status.
///
/// Returns `None` when `ctx` is cancelled before all probes finish; the
/// remaining probe tasks are aborted and nothing is salvaged.
pub async fn run_round(probes: &[ProbeDescriptor], ctx: &Context) -> Option<Status> {
    let started = Instant::now();
    let builder = Arc::new(Mutex::new(StatusBuilder::default()));
    let mut tasks = JoinSet::new();

    for descriptor in probes {
        let descriptor = descriptor.clone();
        let probe_ctx = ctx.child_with_timeout(descriptor.timeout);
        let builder = builder.clone();
        tasks.spawn(async move {
            let outcome = invoke(&descriptor, &probe_ctx).await;
            match &outcome {
                None => debug!(probe = %descriptor.name, "probe passed"),
                Some(err) => debug!(probe = %descriptor.name, error = %err, "probe failed"),
            }
            builder.lock().await.record(descriptor.name, outcome);
        });
    }

    let join_all = async {
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "probe task aborted unexpectedly");
            }
        }
    };

    tokio::select! {
        _ = join_all => {}
        _ = ctx.cancelled() => {
            debug!("round cancelled before all probes finished");
            return None;
        }
    }

    if ctx.is_cancelled() {
        return None;
    }

    let builder = std::mem::take(&mut *builder.lock().await);
    Some(builder.finish(started.elapsed()))
}

/// Invoke a single probe with its deadline and panic boundary.
async fn invoke(descriptor: &ProbeDescriptor, ctx: &Context) -> Option<ProbeError> {
    let budget = ctx.remaining().unwrap_or(descriptor.timeout);
    let check = AssertUnwindSafe(descriptor.probe.check(ctx)).catch_unwind();

    let outcome = match tokio::time::timeout(budget, check).await {
        Ok(Ok(Ok(()))) => None,
        Ok(Ok(Err(err))) => Some(ProbeError::check(err)),
        Ok(Err(payload)) => Some(ProbeError::Panic(panic_message(payload.as_ref()))),
        Err(_) => Some(ProbeError::Timeout(budget)),
    };

    // Release anything the probe left waiting on its token.
    ctx.cancel();
    outcome
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
