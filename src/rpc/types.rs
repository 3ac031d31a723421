//! JSON-RPC 1.0 envelopes.
//!
//! Used both by the legacy listener and by the chain server client. Responses
//! always carry `result`, `error` and `id`, with the unused one set to null.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Standard error codes used by the wallet RPC surfaces.
pub mod codes {
    pub const MISC: i64 = -1;
    pub const WALLET: i64 = -4;
    pub const WALLET_NOT_LOADED: i64 = -18;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL: i64 = -32603;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jsonrpc: Option<String>,
    pub method: String,
    #[serde(default)]
    pub params: Vec<Value>,
    #[serde(default)]
    pub id: Value,
}

impl RpcRequest {
    pub fn new(id: impl Into<Value>, method: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            jsonrpc: Some("1.0".to_string()),
            method: method.into(),
            params,
            id: id.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
}

impl RpcErrorObject {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    #[serde(default)]
    pub result: Value,
    #[serde(default)]
    pub error: Option<RpcErrorObject>,
    #[serde(default)]
    pub id: Value,
}

impl RpcResponse {
    pub fn ok(id: Value, result: Value) -> Self {
        Self {
            result,
            error: None,
            id,
        }
    }

    pub fn err(id: Value, error: RpcErrorObject) -> Self {
        Self {
            result: Value::Null,
            error: Some(error),
            id,
        }
    }

    /// Split into the usual `Result` shape.
    pub fn into_result(self) -> Result<Value, RpcErrorObject> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.result),
        }
    }
}

/// Snapshot answered by `walletstatus` and `GET /v1/status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub version: String,
    pub wallet_loaded: bool,
    pub wallet_name: Option<String>,
    pub synchronized: bool,
    pub synced_height: u64,
    pub chain_connected: bool,
    pub shutting_down: bool,
    pub uptime_secs: u64,
}
