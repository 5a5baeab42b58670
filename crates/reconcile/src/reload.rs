//! Live reload of the forwarder over its RPC endpoint.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use fluo_core::{FluoError, OperatorConfig, Result};
use tracing::debug;

/// A reload the daemon acknowledged with a 2xx.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReloadResponse {
    pub status: u16,
    pub body: String,
}

#[async_trait]
pub trait ReloadNotifier: Send + Sync {
    /// Any failure is a [`FluoError::ReloadNotify`].
    async fn reload(&self) -> Result<ReloadResponse>;
}

/// `POST <url>` with an empty body.
pub struct HttpReloader {
    client: reqwest::Client,
    url: String,
}

impl HttpReloader {
    pub fn new(url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        // in-cluster service address; never route it through an egress proxy
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .no_proxy()
            .build()
            .context("building reload http client")?;
        Ok(Self { client, url: url.into() })
    }

    pub fn from_config(cfg: &OperatorConfig) -> anyhow::Result<Self> { Self::new(cfg.reload_url(), cfg.reload_timeout()) }

    pub fn url(&self) -> &str { &self.url }
}

#[async_trait]
impl ReloadNotifier for HttpReloader {
    async fn reload(&self) -> Result<ReloadResponse> {
        let resp = self
            .client
            .post(&self.url)
            .send()
            .await
            .map_err(|e| FluoError::ReloadNotify(format!("POST {}: {}", self.url, e)))?;
        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| FluoError::ReloadNotify(format!("reading reload response: {}", e)))?;
        if !status.is_success() {
            return Err(FluoError::ReloadNotify(format!("POST {} returned {}: {}", self.url, status, body.trim())));
        }
        debug!(status = status.as_u16(), body = %body.trim(), "reload acknowledged");
        Ok(ReloadResponse { status: status.as_u16(), body })
    }
}
