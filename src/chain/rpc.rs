//! JSON-RPC client with endpoint failover and exponential backoff.

use anyhow::{anyhow, Result};
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::config::RpcConfig;

const INITIAL_BACKOFF_MS: u64 = 100;
const MAX_BACKOFF_MS: u64 = 10_000;

pub struct RpcClient {
    pub primary_url: String,
    pub fallback_urls: Vec<String>,
    pub http: Client,
    pub max_retries: u32,
    next_id: AtomicU64,
}

impl RpcClient {
    pub fn from_config(cfg: &RpcConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .build()?;

        Ok(Self {
            primary_url: cfg.url.clone(),
            fallback_urls: cfg.fallback_urls.clone(),
            http,
            max_retries: cfg.max_retries.max(1),
            next_id: AtomicU64::new(1),
        })
    }

    /// Endpoint for a given attempt, cycling primary then fallbacks.
    fn url_for_attempt(&self, attempt: usize) -> &str {
        let total = 1 + self.fallback_urls.len();
        match attempt % total {
            0 => &self.primary_url,
            n => &self.fallback_urls[n - 1],
        }
    }

    /// Call `method`, retrying transport failures with backoff. A JSON-RPC
    /// error object in the response is returned immediately, not retried.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": self.next_id.fetch_add(1, Ordering::Relaxed),
            "method": method,
            "params": params,
        });

        let max_attempts = self.max_retries as usize;
        let mut backoff_ms = INITIAL_BACKOFF_MS;
        let mut last_error = None;

        for attempt in 0..max_attempts {
            if attempt > 0 {
                tracing::debug!(method, backoff_ms, "Backing off before retry");
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                backoff_ms = (backoff_ms * 2).min(MAX_BACKOFF_MS);
            }

            let url = self.url_for_attempt(attempt);
            match self.http.post(url).json(&body).send().await {
                Ok(resp) => {
                    if !resp.status().is_success() {
                        tracing::warn!(
                            method,
                            url = %url,
                            status = %resp.status(),
                            attempt = attempt + 1,
                            max_attempts,
                            "RPC endpoint returned error status"
                        );
                        last_error = Some(anyhow!("{method}: HTTP {}", resp.status()));
                        continue;
                    }

                    let json: Value = resp.json().await?;

                    if let Some(err) = json.get("error") {
                        if !err.is_null() {
                            tracing::debug!(method, error = %err, "RPC returned error response");
                            return Err(anyhow!("{method}: RPC error: {err}"));
                        }
                    }

                    if attempt > 0 {
                        tracing::info!(
                            method,
                            url = %url,
                            attempt = attempt + 1,
                            "RPC request succeeded after {} retries", attempt
                        );
                    }

                    return Ok(json["result"].clone());
                }
                Err(e) => {
                    tracing::warn!(
                        method,
                        url = %url,
                        error = %e,
                        attempt = attempt + 1,
                        max_attempts,
                        "RPC request failed, will retry with backoff"
                    );
                    last_error = Some(anyhow!("{method}: {e}"));
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow!("{method}: all RPC endpoints exhausted"))
            .context(format!("{method} failed after {max_attempts} attempts")))
    }
}
