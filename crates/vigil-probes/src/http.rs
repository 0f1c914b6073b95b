//! HTTP probe: one request per check, judged on status code and
//! optionally on the response body.

use anyhow::{Context as _, bail};
use async_trait::async_trait;
use bytes::Bytes;
use http::header::{HOST, USER_AGENT};
use http::{Method, Request, StatusCode, Uri};
use http_body_util::{BodyExt, Full};
use hyper_util::rt::TokioIo;
use serde::Deserialize;
use tokio::net::TcpStream;
use tracing::debug;
use vigil_core::{Context, Probe};

use crate::bounded;
use crate::error::{ProbeConfigError, ProbeConfigResult};

const USER_AGENT_VALUE: &str = concat!("vigil-probe/", env!("CARGO_PKG_VERSION"));

/// Declarative HTTP probe settings, as read from a config file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpProbeConfig {
    pub url: String,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub expected_status: Option<u16>,
    #[serde(default)]
    pub expect_contains: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
}

impl HttpProbeConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: None,
            expected_status: None,
            expect_contains: None,
            body: None,
        }
    }
}

/// Issues a request to `url` and fails unless the response carries the
/// expected status (200 by default) and, if set, contains a substring.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    url: String,
    address: String,
    host: String,
    path: String,
    method: Method,
    expected_status: StatusCode,
    expect_contains: Option<String>,
    body: Bytes,
}

impl HttpProbe {
    /// `GET url`, expecting 200.
    pub fn get(url: &str) -> ProbeConfigResult<Self> {
        Self::new(HttpProbeConfig::new(url))
    }

    pub fn new(config: HttpProbeConfig) -> ProbeConfigResult<Self> {
        let uri: Uri = config
            .url
            .parse()
            .map_err(|source| ProbeConfigError::InvalidUrl {
                url: config.url.clone(),
                source,
            })?;

        match uri.scheme_str() {
            Some("http") => {}
            Some(other) => return Err(ProbeConfigError::UnsupportedScheme(other.to_string())),
            None => return Err(ProbeConfigError::UnsupportedScheme(String::new())),
        }

        let authority = uri
            .authority()
            .filter(|a| !a.host().is_empty())
            .ok_or_else(|| ProbeConfigError::MissingHost(config.url.clone()))?;
        let host = match authority.port_u16() {
            Some(port) => format!("{}:{port}", authority.host()),
            None => authority.host().to_string(),
        };
        let port = authority.port_u16().unwrap_or(80);
        let address = format!("{}:{port}", authority.host());
        let path = uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| "/".to_string());

        let method = match config.method.as_deref() {
            None => Method::GET,
            Some(m) => Method::from_bytes(m.to_ascii_uppercase().as_bytes())
                .map_err(|_| ProbeConfigError::InvalidMethod(m.to_string()))?,
        };

        let expected_status = match config.expected_status {
            None => StatusCode::OK,
            Some(code) => {
                StatusCode::from_u16(code).map_err(|_| ProbeConfigError::InvalidStatus(code))?
            }
        };

        Ok(Self {
            url: config.url,
            host,
            address,
            path,
            method,
            expected_status,
            expect_contains: config.expect_contains,
            body: config.body.map(Bytes::from).unwrap_or_default(),
        })
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn with_expected_status(mut self, status: StatusCode) -> Self {
        self.expected_status = status;
        self
    }

    pub fn with_expect_contains(mut self, needle: impl Into<String>) -> Self {
        self.expect_contains = Some(needle.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn execute(&self) -> anyhow::Result<()> {
        let stream = TcpStream::connect(&self.address)
            .await
            .with_context(|| format!("failed to connect to {}", self.address))?;

        let io = TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .context("HTTP handshake failed")?;

        let url = self.url.clone();
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!(error = %e, %url, "probe connection closed with error");
            }
        });

        let req = Request::builder()
            .method(self.method.clone())
            .uri(self.path.as_str())
            .header(HOST, self.host.as_str())
            .header(USER_AGENT, USER_AGENT_VALUE)
            .body(Full::new(self.body.clone()))
            .context("failed to build request")?;

        let resp = sender
            .send_request(req)
            .await
            .with_context(|| format!("request to {} failed", self.url))?;

        let status = resp.status();
        if status != self.expected_status {
            bail!(
                "expected status code {}, got {}",
                self.expected_status.as_u16(),
                status.as_u16()
            );
        }

        if let Some(needle) = &self.expect_contains {
            let body = resp
                .into_body()
                .collect()
                .await
                .context("failed to read response body")?
                .to_bytes();
            if !String::from_utf8_lossy(&body).contains(needle.as_str()) {
                bail!("expected string {needle:?} not found in response body");
            }
        }

        Ok(())
    }
}

#[async_trait]
impl Probe for HttpProbe {
    async fn check(&self, ctx: &Context) -> anyhow::Result<()> {
        bounded(ctx, self.execute())
            .await
            .with_context(|| format!("{} {}", self.method, self.url))
    }
}
