//! Axum HTTP handlers for the web server
//!
//! Provides the JSON-RPC endpoint plus health and discovery metadata. Logical
//! failures always travel inside the envelope with status 200.

use axum::{body::Bytes, extract::State, Json};
use futures::{stream, StreamExt};
use serde::Serialize;
use serde_json::Value;

use crate::mcp::rpc::{RpcError, RpcResponse};
use crate::AppState;

/// Upper bound on batch items dispatched at the same time.
pub const MAX_CONCURRENT_BATCH_ITEMS: usize = 4;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct DiscoveryResponse {
    pub name: &'static str,
    pub version: &'static str,
    pub mcp_endpoint: &'static str,
    pub methods: Vec<String>,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

pub async fn discovery(State(state): State<AppState>) -> Json<DiscoveryResponse> {
    Json(DiscoveryResponse {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        mcp_endpoint: "/mcp",
        methods: state
            .dispatcher
            .registry()
            .names()
            .map(str::to_string)
            .collect(),
    })
}

pub async fn mcp_endpoint(State(state): State<AppState>, body: Bytes) -> Json<Value> {
    let payload: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(_) => {
            return Json(
                RpcResponse::error(None, RpcError::invalid_request("body is not valid JSON"))
                    .to_value(),
            )
        }
    };

    let Value::Array(batch) = payload else {
        return Json(state.dispatcher.handle(payload).await.to_value());
    };

    if batch.is_empty() {
        return Json(
            RpcResponse::error(None, RpcError::invalid_request("empty batch")).to_value(),
        );
    }

    let responses: Vec<Value> = stream::iter(batch)
        .map(|item| {
            let dispatcher = state.dispatcher.clone();
            async move { dispatcher.handle(item).await.to_value() }
        })
        .buffered(MAX_CONCURRENT_BATCH_ITEMS)
        .collect()
        .await;
    Json(Value::Array(responses))
}
