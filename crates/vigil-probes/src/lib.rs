//! vigil-probes — ready-made probes for `vigil-core`.
//!
//! - [`HttpProbe`]: one HTTP/1.1 request, checked against an expected
//!   status code and optionally a body substring.
//! - [`TcpProbe`]: a plain TCP connect.
//! - [`GrpcProbe`]: a call to the standard gRPC health service.
//!
//! All of them honour the deadline and cancellation of the `Context` they are
//! handed, so they stop on their own before the runner abandons them.

pub mod error;
pub mod grpc;
pub mod http;
pub mod tcp;

use std::future::Future;

use anyhow::bail;
use vigil_core::Context;

pub use crate::error::{ProbeConfigError, ProbeConfigResult};
pub use crate::grpc::GrpcProbe;
pub use crate::http::{HttpProbe, HttpProbeConfig};
pub use crate::tcp::TcpProbe;

/// Run `fut` until it finishes, `ctx` is cancelled, or its deadline passes.
pub(crate) async fn bounded<T>(
    ctx: &Context,
    fut: impl Future<Output = anyhow::Result<T>>,
) -> anyhow::Result<T> {
    if ctx.is_cancelled() {
        bail!("probe cancelled before it started");
    }
    let remaining = ctx.remaining();
    tokio::select! {
        biased;
        _ = ctx.cancelled() => bail!("probe cancelled"),
        res = async {
            match remaining {
                Some(budget) => match tokio::time::timeout(budget, fut).await {
                    Ok(res) => res,
                    Err(_) => bail!("deadline of {budget:?} exceeded"),
                },
                None => fut.await,
            }
        } => res,
    }
}
