//! Daemon configuration file.
//!
//! ```toml
//! [checker]
//! period = "10s"
//! failure_threshold = 3
//!
//! [[probe]]
//! name = "api"
//! kind = "http"
//! url = "http://localhost:8080/health"
//! expect_contains = "ok"
//! timeout = "2s"
//!
//! [[probe]]
//! name = "db"
//! kind = "tcp"
//! address = "localhost:5432"
//!
//! [[probe]]
//! name = "billing"
//! kind = "grpc"
//! address = "localhost:50051"
//! service = "billing.v1.Billing"
//!
//! [reporters]
//! stdout = true
//!
//! [reporters.http]
//! addr = "0.0.0.0:8081"
//! path = "/healthz"
//!
//! [reporters.grpc]
//! addr = "0.0.0.0:50051"
//! services = ["", "vigil"]
//! ```

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, bail};
use serde::Deserialize;
use vigil_core::config::parse_duration;
use vigil_core::{Checker, CheckerOptions, Probe};
use vigil_probes::{GrpcProbe, HttpProbe, HttpProbeConfig, TcpProbe};
use vigil_reporters::grpc::DEFAULT_ADDR as DEFAULT_GRPC_ADDR;
use vigil_reporters::server::{DEFAULT_ADDR, DEFAULT_PATH};
use vigil_reporters::{TracingReporter, WriterReporter};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DaemonConfig {
    #[serde(default)]
    pub checker: CheckerOptions,
    #[serde(default, rename = "probe")]
    pub probes: Vec<ProbeSpec>,
    #[serde(default)]
    pub reporters: ReportersConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeKind {
    Http,
    Tcp,
    Grpc,
}

/// One `[[probe]]` entry. Which fields apply depends on `kind`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProbeSpec {
    pub name: String,
    pub kind: ProbeKind,
    #[serde(default)]
    pub timeout: Option<String>,

    // http
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub expected_status: Option<u16>,
    #[serde(default)]
    pub expect_contains: Option<String>,
    #[serde(default)]
    pub body: Option<String>,

    // tcp, grpc
    #[serde(default)]
    pub address: Option<String>,

    // grpc
    #[serde(default)]
    pub service: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReportersConfig {
    /// JSON line per status on stdout.
    #[serde(default)]
    pub stdout: bool,
    /// A log event per status.
    #[serde(default = "default_true")]
    pub log: bool,
    #[serde(default)]
    pub http: Option<HttpEndpointConfig>,
    #[serde(default)]
    pub grpc: Option<GrpcEndpointConfig>,
}

impl Default for ReportersConfig {
    fn default() -> Self {
        Self {
            stdout: false,
            log: true,
            http: None,
            grpc: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpEndpointConfig {
    #[serde(default = "default_addr")]
    pub addr: String,
    #[serde(default = "default_path")]
    pub path: String,
}

/// gRPC health service. With no `services` the overall server status
/// (`""`) is reported.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GrpcEndpointConfig {
    #[serde(default = "default_grpc_addr")]
    pub addr: String,
    #[serde(default)]
    pub services: Vec<String>,
}

fn default_grpc_addr() -> String {
    DEFAULT_GRPC_ADDR.to_string()
}

fn default_true() -> bool {
    true
}

fn default_addr() -> String {
    DEFAULT_ADDR.to_string()
}

fn default_path() -> String {
    DEFAULT_PATH.to_string()
}

impl DaemonConfig {
    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        toml::from_str(s).context("invalid config")
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("failed to parse {}", path.display()))
    }

    /// Checker with every configured probe and the stdout/log reporters.
    /// The HTTP endpoint is left to the caller, which owns its listener.
    pub async fn build_checker(&self) -> anyhow::Result<Checker> {
        let checker = Checker::from_options(self.checker.clone()).context("invalid [checker] table")?;

        for spec in &self.probes {
            let (timeout, probe) = spec
                .build()
                .with_context(|| format!("invalid probe {:?}", spec.name))?;
            checker.add_probe_with_timeout(&spec.name, timeout, probe).await;
        }

        if self.reporters.stdout {
            checker.add_reporter(WriterReporter::stdout()).await;
        }
        if self.reporters.log {
            checker.add_reporter(TracingReporter).await;
        }

        Ok(checker)
    }
}

impl ProbeSpec {
    /// Construct the probe. A zero timeout stands for the checker default.
    pub fn build(&self) -> anyhow::Result<(Duration, Arc<dyn Probe>)> {
        let timeout = match &self.timeout {
            None => Duration::ZERO,
            Some(raw) => match parse_duration(raw) {
                Some(d) => d,
                None => bail!("invalid timeout {raw:?}"),
            },
        };

        let probe: Arc<dyn Probe> = match self.kind {
            ProbeKind::Http => {
                let Some(url) = &self.url else {
                    bail!("http probe needs a url");
                };
                Arc::new(HttpProbe::new(HttpProbeConfig {
                    url: url.clone(),
                    method: self.method.clone(),
                    expected_status: self.expected_status,
                    expect_contains: self.expect_contains.clone(),
                    body: self.body.clone(),
                })?)
            }
            ProbeKind::Tcp => {
                let Some(address) = &self.address else {
                    bail!("tcp probe needs an address");
                };
                Arc::new(TcpProbe::new(address.clone())?)
            }
            ProbeKind::Grpc => {
                let Some(address) = &self.address else {
                    bail!("grpc probe needs an address");
                };
                let probe = GrpcProbe::new(address.clone())?;
                match &self.service {
                    Some(service) => Arc::new(probe.with_service_name(service.clone())),
                    None => Arc::new(probe),
                }
            }
        };

        Ok((timeout, probe))
    }
}
