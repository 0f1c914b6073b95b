//! gRPC probe: asks a server's standard health service whether it is
//! SERVING.

use anyhow::{Context as _, bail};
use async_trait::async_trait;
use tonic::transport::Endpoint;
use tonic_health::pb::HealthCheckRequest;
use tonic_health::pb::health_check_response::ServingStatus;
use tonic_health::pb::health_client::HealthClient;
use vigil_core::{Context, Probe};

use crate::bounded;
use crate::error::{ProbeConfigError, ProbeConfigResult};

#[derive(Clone)]
pub struct GrpcProbe {
    address: String,
    endpoint: Endpoint,
    service: String,
}

impl GrpcProbe {
    /// Check the overall server status at `address` (`host:port`).
    pub fn new(address: impl Into<String>) -> ProbeConfigResult<Self> {
        let address = address.into();
        if address.trim().is_empty() {
            return Err(ProbeConfigError::EmptyAddress);
        }
        match address.rsplit_once(':') {
            Some((host, port)) if !host.trim().is_empty() && port.parse::<u16>().is_ok() => {}
            _ => return Err(ProbeConfigError::InvalidAddress(address)),
        }

        let endpoint = Endpoint::from_shared(format!("http://{address}")).map_err(|e| {
            ProbeConfigError::InvalidEndpoint {
                address: address.clone(),
                reason: e.to_string(),
            }
        })?;

        Ok(Self {
            address,
            endpoint,
            service: String::new(),
        })
    }

    /// Check one named service instead of the whole server.
    pub fn with_service_name(mut self, name: impl Into<String>) -> Self {
        self.service = name.into();
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    async fn execute(&self) -> anyhow::Result<()> {
        let channel = self
            .endpoint
            .connect()
            .await
            .with_context(|| format!("failed to establish gRPC connection to {}", self.address))?;

        let mut client = HealthClient::new(channel);
        let resp = client
            .check(HealthCheckRequest {
                service: self.service.clone(),
            })
            .await
            .context("gRPC health check failed")?;

        let status = resp.into_inner().status();
        if status != ServingStatus::Serving {
            bail!("gRPC service is not healthy: {}", status.as_str_name());
        }
        Ok(())
    }
}

#[async_trait]
impl Probe for GrpcProbe {
    async fn check(&self, ctx: &Context) -> anyhow::Result<()> {
        bounded(ctx, self.execute()).await
    }
}
