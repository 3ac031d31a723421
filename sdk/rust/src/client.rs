//! Client for the podwallet legacy JSON-RPC listener.

use std::sync::atomic::{AtomicU64, Ordering};

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("unexpected response: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Debug, Serialize)]
struct Request<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    params: &'a [Value],
    id: u64,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct Response {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<RpcError>,
}

impl Response {
    fn into_result(self) -> Result<Value, ClientError> {
        match self.error {
            Some(RpcError { code, message }) => Err(ClientError::Rpc { code, message }),
            None => Ok(self.result),
        }
    }
}

/// Wallet status as reported by `walletstatus`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletStatus {
    pub version: String,
    pub wallet_loaded: bool,
    pub wallet_name: Option<String>,
    pub synchronized: bool,
    pub synced_height: u64,
    pub chain_connected: bool,
    pub shutting_down: bool,
    pub uptime_secs: u64,
}

pub struct RpcClient {
    client: Client,
    url: String,
    token: Option<String>,
    next_id: AtomicU64,
}

impl RpcClient {
    /// `url` is the listener root, e.g. `http://127.0.0.1:11046`.
    pub fn new(url: &str) -> Self {
        Self {
            client: Client::new(),
            url: url.trim_end_matches('/').to_string(),
            token: None,
            next_id: AtomicU64::new(1),
        }
    }

    /// Send `Authorization: Bearer <token>` with every call.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Call any method and return its raw result.
    pub async fn call(&self, method: &str, params: &[Value]) -> Result<Value, ClientError> {
        let request = Request {
            jsonrpc: "1.0",
            method,
            params,
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
        };

        let mut builder = self.client.post(format!("{}/", self.url)).json(&request);
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }
        let resp = builder.send().await?;

        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(ClientError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        serde_json::from_str::<Response>(&text)?.into_result()
    }

    pub async fn status(&self) -> Result<WalletStatus, ClientError> {
        let value = self.call("walletstatus", &[]).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Ask the wallet process to shut down.
    pub async fn stop(&self) -> Result<String, ClientError> {
        let value = self.call("stop", &[]).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }
}
