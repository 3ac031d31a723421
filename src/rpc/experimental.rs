//! Experimental REST listener.
//!
//! Lets an operator load and unload the wallet at runtime, which is the
//! only way to get a wallet when the initial load is skipped. Every route
//! requires the configured API key.

use std::time::Duration;

use axum::{
    extract::State,
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::{limit::RequestBodyLimitLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::RpcConfig;
use crate::observability::metrics;
use crate::rpc::auth::{require_bearer, BearerToken};
use crate::rpc::bridge::RpcState;
use crate::rpc::types::{codes, StatusReport};
use crate::wallet::{Credentials, LoaderError, StoreError};

#[derive(Deserialize)]
pub struct LoadRequest {
    pub passphrase: String,
}

#[derive(Serialize)]
pub struct WalletResponse {
    pub wallet: String,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub code: i64,
    pub error: String,
}

#[allow(deprecated)]
pub fn router(state: RpcState, config: &RpcConfig) -> Router {
    let token = BearerToken::new(&config.experimental.api_key);

    Router::new()
        .route("/v1/status", get(get_status))
        .route("/v1/wallet/load", post(load_wallet))
        .route("/v1/wallet/unload", post(unload_wallet))
        .route("/v1/stop", post(stop))
        .layer(middleware::from_fn_with_state(token, require_bearer))
        .with_state(state)
        .layer(RequestBodyLimitLayer::new(config.max_body_size))
        .layer(TimeoutLayer::new(Duration::from_secs(config.request_timeout_secs)))
        .layer(TraceLayer::new_for_http())
}

fn loader_error(err: LoaderError) -> Response {
    let (status, code) = match &err {
        LoaderError::AlreadyLoaded => (StatusCode::CONFLICT, codes::WALLET),
        LoaderError::NotLoaded => (StatusCode::CONFLICT, codes::WALLET_NOT_LOADED),
        LoaderError::Open(StoreError::InvalidPassphrase) => (StatusCode::UNAUTHORIZED, codes::WALLET),
        LoaderError::Open(StoreError::NotFound(_)) => (StatusCode::NOT_FOUND, codes::WALLET),
        LoaderError::Open(_) => (StatusCode::INTERNAL_SERVER_ERROR, codes::WALLET),
        LoaderError::ShutdownInProgress => (StatusCode::SERVICE_UNAVAILABLE, codes::MISC),
    };
    (status, Json(ErrorResponse { code, error: err.to_string() })).into_response()
}

pub async fn get_status(State(state): State<RpcState>) -> Json<StatusReport> {
    metrics::record_rpc_request("experimental", "status", true);
    Json(state.status())
}

pub async fn load_wallet(State(state): State<RpcState>, Json(request): Json<LoadRequest>) -> Response {
    let result = state.loader.load(&Credentials::new(request.passphrase)).await;
    metrics::record_rpc_request("experimental", "load", result.is_ok());

    match result {
        Ok(wallet) => {
            state.associate(wallet.clone());
            Json(WalletResponse {
                wallet: wallet.name().to_string(),
            })
            .into_response()
        }
        Err(e) => {
            tracing::warn!(error = %e, "Wallet load over RPC failed");
            loader_error(e)
        }
    }
}

pub async fn unload_wallet(State(state): State<RpcState>) -> Response {
    let result = state.loader.unload();
    metrics::record_rpc_request("experimental", "unload", result.is_ok());

    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => loader_error(e),
    }
}

pub async fn stop(State(state): State<RpcState>) -> StatusCode {
    metrics::record_rpc_request("experimental", "stop", true);
    state.request_stop();
    StatusCode::ACCEPTED
}

#[cfg(test)]
mod tests {
    use crate::config::RpcConfig;
    use crate::lifecycle::ShutdownCoordinator;
    use crate::rpc::ServiceBridge;
    use crate::wallet::{Credentials, FileWalletStore, WalletLoader};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use std::time::Duration;

    const KEY: &str = "operator-key";

    async fn bridge() -> (ServiceBridge, String, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = FileWalletStore::new(dir.path(), Duration::from_secs(1));
        store.create("main", &Credentials::new("hunter2")).unwrap();

        let shutdown = ShutdownCoordinator::new();
        let loader = WalletLoader::new(Arc::new(store), &shutdown);

        let mut config = RpcConfig::default();
        config.legacy.bind_address = "127.0.0.1:0".into();
        config.experimental.enabled = true;
        config.experimental.bind_address = "127.0.0.1:0".into();
        config.experimental.api_key = KEY.into();
        let bridge = ServiceBridge::start(&config, loader, &shutdown).await.unwrap();
        let base = format!("http://{}", bridge.experimental_addr().unwrap());
        (bridge, base, dir)
    }

    #[tokio::test]
    async fn requires_the_api_key() {
        let (_bridge, base, _dir) = bridge().await;
        let resp = reqwest::get(format!("{}/v1/status", base)).await.unwrap();
        assert_eq!(resp.status(), 401);
    }

    #[tokio::test]
    async fn load_and_unload_over_rest() {
        let (bridge, base, _dir) = bridge().await;
        let http = reqwest::Client::new();

        let bad = http
            .post(format!("{}/v1/wallet/load", base))
            .bearer_auth(KEY)
            .json(&json!({"passphrase": "wrong"}))
            .send()
            .await
            .unwrap();
        assert_eq!(bad.status(), 401);

        let ok: Value = http
            .post(format!("{}/v1/wallet/load", base))
            .bearer_auth(KEY)
            .json(&json!({"passphrase": "hunter2"}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(ok["wallet"], json!("main"));
        assert!(bridge.state().loader.is_loaded());

        let again = http
            .post(format!("{}/v1/wallet/load", base))
            .bearer_auth(KEY)
            .json(&json!({"passphrase": "hunter2"}))
            .send()
            .await
            .unwrap();
        assert_eq!(again.status(), 409);
        let body: Value = again.json().await.unwrap();
        assert_eq!(body["code"], json!(-4));

        let unload = http
            .post(format!("{}/v1/wallet/unload", base))
            .bearer_auth(KEY)
            .send()
            .await
            .unwrap();
        assert_eq!(unload.status(), 204);

        let status: Value = http
            .get(format!("{}/v1/status", base))
            .bearer_auth(KEY)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(status["wallet_loaded"], json!(false));
    }
}
