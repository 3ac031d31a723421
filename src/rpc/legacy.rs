//! Legacy JSON-RPC listener.
//!
//! A single `POST /` endpoint. `stop` and `walletstatus` are answered
//! locally; every other method is forwarded to the live chain client.

use std::time::Duration;

use axum::{
    extract::{rejection::JsonRejection, State},
    middleware,
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};
use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::{limit::RequestBodyLimitLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::chain::ChainCallError;
use crate::config::RpcConfig;
use crate::observability::metrics;
use crate::rpc::auth::{require_bearer, BearerToken};
use crate::rpc::bridge::RpcState;
use crate::rpc::types::{codes, RpcErrorObject, RpcRequest, RpcResponse};

/// Build the legacy router with its middleware stack.
#[allow(deprecated)]
pub fn router(state: RpcState, config: &RpcConfig) -> Router {
    let mut router = Router::new().route("/", post(handle)).with_state(state);

    if let Some(token) = &config.legacy.auth_token {
        router = router.layer(middleware::from_fn_with_state(BearerToken::new(token), require_bearer));
    }

    router
        .layer(RequestBodyLimitLayer::new(config.max_body_size))
        .layer(TimeoutLayer::new(Duration::from_secs(config.request_timeout_secs)))
        .layer(GlobalConcurrencyLimitLayer::new(config.legacy.max_clients))
        .layer(TraceLayer::new_for_http())
}

async fn handle(
    State(state): State<RpcState>,
    request: Result<Json<RpcRequest>, JsonRejection>,
) -> Json<RpcResponse> {
    let Json(request) = match request {
        Ok(request) => request,
        Err(rejection) => {
            return Json(RpcResponse::err(
                Value::Null,
                RpcErrorObject::new(codes::INVALID_REQUEST, rejection.body_text()),
            ));
        }
    };

    let RpcRequest { method, params, id, .. } = request;
    tracing::debug!(%method, "Legacy RPC request");

    let outcome = dispatch(&state, &method, params).await;
    metrics::record_rpc_request("legacy", method_label(&method), outcome.is_ok());

    Json(match outcome {
        Ok(result) => RpcResponse::ok(id, result),
        Err(error) => RpcResponse::err(id, error),
    })
}

/// Metric label for `method`. Anything not answered locally collapses into
/// one label so callers cannot mint new series.
fn method_label(method: &str) -> &'static str {
    match method {
        "stop" => "stop",
        "walletstatus" => "walletstatus",
        _ => "passthrough",
    }
}

async fn dispatch(state: &RpcState, method: &str, params: Vec<Value>) -> Result<Value, RpcErrorObject> {
    match method {
        "stop" => {
            state.request_stop();
            Ok(json!("podwallet stopping."))
        }
        "walletstatus" => serde_json::to_value(state.status())
            .map_err(|e| RpcErrorObject::new(codes::INTERNAL, e.to_string())),
        _ => {
            let client = state
                .chain_client()
                .ok_or_else(|| RpcErrorObject::new(codes::MISC, "chain RPC is inactive"))?;
            client.call(method, params).await.map_err(|e| match e {
                ChainCallError::Rpc { code, message } => RpcErrorObject::new(code, message),
                other => RpcErrorObject::new(codes::MISC, other.to_string()),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::config::RpcConfig;
    use crate::lifecycle::ShutdownCoordinator;
    use crate::rpc::ServiceBridge;
    use crate::wallet::{FileWalletStore, WalletLoader};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn forwarded_methods_share_one_metric_label() {
        assert_eq!(super::method_label("stop"), "stop");
        assert_eq!(super::method_label("walletstatus"), "walletstatus");
        assert_eq!(super::method_label("getblockcount"), "passthrough");
        assert_eq!(super::method_label("x".repeat(64).as_str()), "passthrough");
    }

    async fn bridge(token: Option<&str>) -> (ServiceBridge, ShutdownCoordinator, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let shutdown = ShutdownCoordinator::new();
        let store = Arc::new(FileWalletStore::new(dir.path(), Duration::from_secs(1)));
        let loader = WalletLoader::new(store, &shutdown);

        let mut config = RpcConfig::default();
        config.legacy.bind_address = "127.0.0.1:0".into();
        config.legacy.auth_token = token.map(str::to_string);
        let bridge = ServiceBridge::start(&config, loader, &shutdown).await.unwrap();
        (bridge, shutdown, dir)
    }

    async fn call(bridge: &ServiceBridge, token: Option<&str>, body: Value) -> reqwest::Response {
        let mut request = reqwest::Client::new()
            .post(format!("http://{}/", bridge.legacy_addr()))
            .json(&body);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        request.send().await.unwrap()
    }

    #[tokio::test]
    async fn status_is_served_before_any_wallet_exists() {
        let (bridge, _shutdown, _dir) = bridge(None).await;
        let resp: Value = call(&bridge, None, json!({"method": "walletstatus", "id": 7}))
            .await
            .json()
            .await
            .unwrap();

        assert_eq!(resp["id"], json!(7));
        assert_eq!(resp["error"], Value::Null);
        assert_eq!(resp["result"]["wallet_loaded"], json!(false));
        assert_eq!(resp["result"]["chain_connected"], json!(false));
    }

    #[tokio::test]
    async fn unknown_methods_need_a_chain_client() {
        let (bridge, _shutdown, _dir) = bridge(None).await;
        let resp: Value = call(&bridge, None, json!({"method": "getblockcount", "id": 1}))
            .await
            .json()
            .await
            .unwrap();

        assert_eq!(resp["error"]["code"], json!(-1));
        assert_eq!(resp["error"]["message"], json!("chain RPC is inactive"));
    }

    #[tokio::test]
    async fn token_is_enforced_when_configured() {
        let (bridge, _shutdown, _dir) = bridge(Some("letmein")).await;
        let body = json!({"method": "walletstatus", "id": 1});

        assert_eq!(call(&bridge, None, body.clone()).await.status(), 401);
        assert_eq!(call(&bridge, Some("wrong"), body.clone()).await.status(), 401);
        assert_eq!(call(&bridge, Some("letmein"), body).await.status(), 200);
    }

    #[tokio::test]
    async fn stop_shuts_the_process_down() {
        let (bridge, shutdown, _dir) = bridge(None).await;
        let resp: Value = call(&bridge, None, json!({"method": "stop", "id": 2}))
            .await
            .json()
            .await
            .unwrap();
        assert_eq!(resp["result"], json!("podwallet stopping."));

        tokio::time::timeout(Duration::from_secs(2), shutdown.wait())
            .await
            .unwrap();
        assert!(bridge.join(Duration::from_secs(2)).await);
    }
}
