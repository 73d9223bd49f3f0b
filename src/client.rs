use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use tracing::debug;

use crate::types::{OpenPort, ScanRequest, TargetInfo};

pub const DEFAULT_API_URL: &str = "http://localhost:5000";
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// HTTP client for the scan service.
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    http: reqwest::Client,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn endpoint(&self, name: &str) -> String {
        format!("{}/{}", self.base_url, name)
    }

    /// Ask the service to scan `target` with `scan_type` and wait for the open ports.
    pub async fn perform_nmap_scan(
        &self,
        target: &TargetInfo,
        scan_type: &str,
    ) -> Result<Vec<OpenPort>> {
        let url = self.endpoint("perform_nmap_scan");
        let body = ScanRequest {
            info_dict: Some(target.clone()),
            scan_type: Some(scan_type.to_string()),
        };
        debug!(%url, scan_type, "posting scan request");

        let resp = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("request to {url} failed"))?;

        let status = resp.status();
        let bytes = resp
            .bytes()
            .await
            .with_context(|| format!("failed to read response from {url}"))?;

        if !status.is_success() {
            let detail = serde_json::from_slice::<ErrorBody>(&bytes)
                .map(|b| b.error)
                .unwrap_or_else(|_| String::from_utf8_lossy(&bytes).into_owned());
            return Err(anyhow!("{url} returned {status}: {detail}"));
        }

        serde_json::from_slice(&bytes).context("received invalid JSON response")
    }
}
