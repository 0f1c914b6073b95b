//! TCP probe: passes when a connection to the address can be opened.

use anyhow::{Context as _, bail};
use async_trait::async_trait;
use tokio::net::TcpStream;
use tracing::trace;
use vigil_core::{Context, Probe};

use crate::bounded;
use crate::error::{ProbeConfigError, ProbeConfigResult};

#[derive(Debug, Clone)]
pub struct TcpProbe {
    address: String,
}

impl TcpProbe {
    /// `address` is anything `TcpStream::connect` resolves, e.g. `db:5432`.
    pub fn new(address: impl Into<String>) -> ProbeConfigResult<Self> {
        let address = address.into();
        if address.trim().is_empty() {
            return Err(ProbeConfigError::EmptyAddress);
        }
        Ok(Self { address })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    async fn connect(&self) -> anyhow::Result<()> {
        let stream = TcpStream::connect(&self.address)
            .await
            .with_context(|| format!("failed to connect to {}", self.address))?;
        match stream.peer_addr() {
            Ok(peer) => trace!(address = %self.address, %peer, "tcp probe connected"),
            Err(e) => bail!("connection to {} dropped: {e}", self.address),
        }
        Ok(())
    }
}

#[async_trait]
impl Probe for TcpProbe {
    async fn check(&self, ctx: &Context) -> anyhow::Result<()> {
        bounded(ctx, self.connect()).await
    }
}
