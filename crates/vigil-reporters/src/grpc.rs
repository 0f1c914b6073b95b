//! Bridge to the standard gRPC health-checking service.
//!
//! Each emitted status sets SERVING or NOT_SERVING on the configured
//! service names, or on the overall server (`""`) when none are given.

use async_trait::async_trait;
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;
use tonic_health::ServingStatus;
use tonic_health::pb::health_server::{Health, HealthServer};
use tonic_health::server::HealthReporter;
use tracing::info;
use vigil_core::{CancellationToken, Context, Reporter, Status};

pub const DEFAULT_ADDR: &str = "0.0.0.0:50051";

#[derive(Clone)]
pub struct GrpcHealthReporter {
    health: HealthReporter,
    services: Vec<String>,
}

impl GrpcHealthReporter {
    /// Report into an existing health service, e.g. one already mounted
    /// on an application's own tonic server.
    pub fn new(health: HealthReporter) -> Self {
        Self {
            health,
            services: Vec::new(),
        }
    }

    /// Service names to update. An empty string names the whole server.
    pub fn with_service_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.services = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn service_names(&self) -> &[String] {
        &self.services
    }
}

/// A fresh health service together with a reporter feeding it.
pub fn health_service() -> (GrpcHealthReporter, HealthServer<impl Health>) {
    let (health, service) = tonic_health::server::health_reporter();
    (GrpcHealthReporter::new(health), service)
}

/// Serve `service` on `listener` until `token` is cancelled.
pub async fn serve<S: Health>(
    service: HealthServer<S>,
    listener: TcpListener,
    token: CancellationToken,
) -> Result<(), tonic::transport::Error> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "gRPC health service listening");
    }
    Server::builder()
        .add_service(service)
        .serve_with_incoming_shutdown(TcpListenerStream::new(listener), token.cancelled_owned())
        .await?;
    info!("gRPC health service stopped");
    Ok(())
}

#[async_trait]
impl Reporter for GrpcHealthReporter {
    fn name(&self) -> &str {
        "grpc-health"
    }

    async fn report(&self, _ctx: &Context, status: &Status) -> anyhow::Result<()> {
        let serving = if status.is_healthy() {
            ServingStatus::Serving
        } else {
            ServingStatus::NotServing
        };

        let mut health = self.health.clone();
        if self.services.is_empty() {
            health.set_service_status("", serving).await;
        } else {
            for name in &self.services {
                health.set_service_status(name, serving).await;
            }
        }
        Ok(())
    }
}
