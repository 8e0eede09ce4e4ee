//! The JSON-RPC dispatcher
//!
//! Validates the envelope, resolves the method against the registry (with
//! `initialize` always available for capability discovery), checks required
//! parameters and their declared types, runs the action and folds every outcome into a response
//! envelope. Nothing here is mutated per request, so `handle` may run
//! concurrently with itself.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{error, info};

use crate::errors::AppError;
use crate::mcp::registry::{MethodRegistry, INITIALIZE_METHOD};
use crate::mcp::rpc::{
    params_object, ErrorCode, RequestId, RpcError, RpcRequest, RpcResponse,
};

pub const PROTOCOL_VERSION: &str = "2024-11-05";

#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<MethodRegistry>,
}

impl Dispatcher {
    pub fn new(registry: Arc<MethodRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &MethodRegistry {
        &self.registry
    }

    pub async fn handle(&self, payload: Value) -> RpcResponse {
        let request = match RpcRequest::from_value(payload) {
            Ok(request) => request,
            Err(err) => {
                info!(code = err.code, "mcp request rejected");
                return RpcResponse::error(None, err);
            }
        };

        let audit_params = redact_audit_params(request.params.as_ref());
        let method = request.method.clone();
        let response = self.dispatch(request).await;

        info!(
            method = %method,
            params = %audit_params,
            outcome = if response.error_code().is_some() { "failure" } else { "success" },
            code = response.error_code(),
            "mcp method audited"
        );

        response
    }

    async fn dispatch(&self, request: RpcRequest) -> RpcResponse {
        let RpcRequest { method, params, id } = request;

        if method == INITIALIZE_METHOD {
            return RpcResponse::result(id, self.initialize_result());
        }

        let Some(descriptor) = self.registry.get(&method) else {
            return RpcResponse::error(Some(id), RpcError::method_not_found(&method));
        };

        let Some(params) = params_object(params) else {
            return invalid_params(id, "params must be an object".to_string());
        };

        let missing = descriptor.missing_params(&params);
        if !missing.is_empty() {
            return invalid_params(
                id,
                format!("missing required parameter(s): {}", missing.join(", ")),
            );
        }

        let mistyped = descriptor.mistyped_params(&params);
        if !mistyped.is_empty() {
            return invalid_params(
                id,
                format!("invalid type for parameter(s): {}", mistyped.join(", ")),
            );
        }

        match descriptor.action().call(params).await {
            Ok(result) => RpcResponse::result(id, result),
            Err(err) => {
                if let AppError::Internal { message } = &err {
                    error!(method = %method, error = %message, "mcp action failed");
                }
                RpcResponse::error(Some(id), RpcError::from_app_error(err))
            }
        }
    }

    /// Discovery payload describing every registered method.
    pub fn initialize_result(&self) -> Value {
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "serverInfo": {
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION"),
            },
            "methods": self.registry.capabilities(),
        })
    }
}

fn invalid_params(id: RequestId, detail: String) -> RpcResponse {
    RpcResponse::error(
        Some(id),
        RpcError::new(
            ErrorCode::InvalidParams,
            format!("{}: {detail}", ErrorCode::InvalidParams.message()),
        ),
    )
}

pub fn redact_audit_params(params: Option<&Value>) -> Value {
    params.map(redact_audit_value).unwrap_or(Value::Null)
}

pub fn redact_audit_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, item)| {
                    if is_sensitive_key(key) {
                        (key.clone(), Value::String("[REDACTED]".to_string()))
                    } else {
                        (key.clone(), redact_audit_value(item))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact_audit_value).collect()),
        _ => value.clone(),
    }
}

pub fn is_sensitive_key(key: &str) -> bool {
    let normalized = key.trim().to_ascii_lowercase();
    matches!(
        normalized.as_str(),
        "authorization" | "bearer" | "appid" | "api_key" | "apikey" | "body"
    ) || ["token", "secret", "password", "credential"]
        .iter()
        .any(|fragment| normalized.contains(fragment))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use serde_json::{json, Map};

    use super::*;
    use crate::domain::{utils::decode_params, weather::CurrentWeatherParams};
    use crate::mcp::rpc::Outcome;
    use crate::mcp::registry::MethodDescriptor;

    fn weather_payload() -> Value {
        json!({"location": "London", "temperature": 11.5, "description": "light rain"})
    }

    fn registry() -> MethodRegistry {
        MethodRegistry::builder()
            .register_all([
                MethodDescriptor::new(
                    "getCurrentWeather",
                    "Current weather for a location",
                    |_params: Map<String, Value>| async { Ok::<_, AppError>(weather_payload()) },
                )
                .with_schema(
                    json!({"type": "object", "properties": {"location": {"type": "string"}}}),
                    ["location"],
                ),
                MethodDescriptor::new("echo", "Echo params", |params: Map<String, Value>| async move {
                    Ok::<_, AppError>(Value::Object(params))
                }),
                MethodDescriptor::new("fail", "Always fails", |_params: Map<String, Value>| async {
                    Err::<Value, _>(AppError::internal("upstream returned 502"))
                }),
                MethodDescriptor::new("denied", "Structured failure", |_params: Map<String, Value>| async {
                    Err::<Value, _>(AppError::rpc(-32001, "authentication failed"))
                }),
            ])
            .expect("registration")
            .build()
    }

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(Arc::new(registry()))
    }

    #[tokio::test]
    async fn current_weather_returns_stubbed_payload() {
        let response = dispatcher()
            .handle(json!({
                "jsonrpc": "2.0",
                "method": "getCurrentWeather",
                "params": {"location": "London,UK"},
                "id": 1
            }))
            .await;

        assert_eq!(
            response.to_value(),
            json!({"jsonrpc": "2.0", "result": weather_payload(), "id": 1})
        );
    }

    #[tokio::test]
    async fn missing_location_is_invalid_params() {
        let value = dispatcher()
            .handle(json!({
                "jsonrpc": "2.0",
                "method": "getCurrentWeather",
                "params": {},
                "id": 2
            }))
            .await
            .to_value();

        assert_eq!(value["error"]["code"], -32602);
        assert!(value["error"]["message"]
            .as_str()
            .expect("message")
            .contains("location"));
        assert_eq!(value["id"], 2);
    }

    fn typed_weather_dispatcher() -> Dispatcher {
        let registry = MethodRegistry::builder()
            .register(
                MethodDescriptor::new(
                    "getCurrentWeather",
                    "Current weather for a location",
                    |params: Map<String, Value>| async move {
                        let params: CurrentWeatherParams = decode_params(params)?;
                        Ok::<_, AppError>(json!({"location": params.location}))
                    },
                )
                .with_params::<CurrentWeatherParams>(),
            )
            .expect("registration")
            .build();
        Dispatcher::new(Arc::new(registry))
    }

    async fn typed_weather_error(params: Value) -> RpcError {
        let response = typed_weather_dispatcher()
            .handle(json!({
                "jsonrpc": "2.0",
                "method": "getCurrentWeather",
                "params": params,
                "id": 9
            }))
            .await;
        match response.outcome {
            Outcome::Error(err) => err,
            Outcome::Result(result) => panic!("expected error, got {result}"),
        }
    }

    #[tokio::test]
    async fn null_required_param_is_reported_as_missing() {
        let err = typed_weather_error(json!({"location": null})).await;

        assert_eq!(err.code, -32602);
        assert_eq!(
            err.message,
            "Invalid params: missing required parameter(s): location"
        );
    }

    #[tokio::test]
    async fn wrongly_typed_required_param_is_named() {
        let err = typed_weather_error(json!({"location": 42})).await;

        assert_eq!(err.code, -32602);
        assert_eq!(
            err.message,
            "Invalid params: invalid type for parameter(s): location (expected string)"
        );
    }

    #[tokio::test]
    async fn wrongly_typed_optional_param_is_named() {
        let err = typed_weather_error(json!({"location": "London", "units": 3})).await;

        assert_eq!(err.code, -32602);
        assert!(err.message.contains("units (expected string)"));
    }

    #[tokio::test]
    async fn null_optional_param_is_accepted() {
        let response = typed_weather_dispatcher()
            .handle(json!({
                "jsonrpc": "2.0",
                "method": "getCurrentWeather",
                "params": {"location": "London", "units": null},
                "id": 10
            }))
            .await;

        assert_eq!(response.outcome, Outcome::Result(json!({"location": "London"})));
    }

    #[tokio::test]
    async fn absent_params_with_required_fields_is_invalid_params() {
        let response = dispatcher()
            .handle(json!({"jsonrpc": "2.0", "method": "getCurrentWeather", "id": 5}))
            .await;

        assert_eq!(response.error_code(), Some(-32602));
    }

    #[tokio::test]
    async fn non_object_params_are_invalid_params() {
        let response = dispatcher()
            .handle(json!({"jsonrpc": "2.0", "method": "echo", "params": [1, 2], "id": 6}))
            .await;

        assert_eq!(response.error_code(), Some(-32602));
        assert_eq!(response.id, Some(RequestId::from(6)));
    }

    #[tokio::test]
    async fn unknown_method_names_the_method() {
        let value = dispatcher()
            .handle(json!({"jsonrpc": "2.0", "method": "doesNotExist", "id": 3}))
            .await
            .to_value();

        assert_eq!(value["error"]["code"], -32601);
        assert!(value["error"]["message"]
            .as_str()
            .expect("message")
            .contains("doesNotExist"));
        assert_eq!(value["id"], 3);
    }

    #[tokio::test]
    async fn malformed_envelopes_get_null_id() {
        let dispatcher = dispatcher();
        for payload in [
            json!({"method": "echo", "id": 4}),
            json!({"jsonrpc": "2.1", "method": "echo", "id": 4}),
            json!({"jsonrpc": "2.0", "id": 4}),
            json!({"jsonrpc": "2.0", "method": "echo"}),
            json!("not an object"),
        ] {
            let value = dispatcher.handle(payload).await.to_value();
            assert_eq!(value["jsonrpc"], "2.0");
            assert_eq!(value["error"]["code"], -32600);
            assert!(value["id"].is_null());
        }
    }

    #[tokio::test]
    async fn initialize_advertises_exactly_registered_methods() {
        let dispatcher = dispatcher();
        let value = dispatcher
            .handle(json!({"jsonrpc": "2.0", "method": "initialize", "id": "init"}))
            .await
            .to_value();

        assert_eq!(value["id"], "init");
        assert_eq!(value["result"]["protocolVersion"], PROTOCOL_VERSION);
        let advertised = value["result"]["methods"]
            .as_object()
            .expect("methods map")
            .keys()
            .cloned()
            .collect::<BTreeSet<_>>();
        let registered = dispatcher
            .registry()
            .names()
            .map(str::to_string)
            .collect::<BTreeSet<_>>();
        assert_eq!(advertised, registered);
        assert!(!advertised.contains(INITIALIZE_METHOD));
        assert_eq!(
            value["result"]["methods"]["getCurrentWeather"]["required"],
            json!(["location"])
        );
    }

    #[tokio::test]
    async fn same_request_twice_differs_only_by_id() {
        let dispatcher = dispatcher();
        let first = dispatcher
            .handle(json!({"jsonrpc": "2.0", "method": "echo", "params": {"a": 1}, "id": 10}))
            .await;
        let second = dispatcher
            .handle(json!({"jsonrpc": "2.0", "method": "echo", "params": {"a": 1}, "id": "eleven"}))
            .await;

        assert_eq!(first.outcome, second.outcome);
        assert_eq!(first.id, Some(RequestId::from(10)));
        assert_eq!(second.id, Some(RequestId::from("eleven")));
    }

    #[tokio::test]
    async fn unstructured_action_failure_becomes_internal_error() {
        let value = dispatcher()
            .handle(json!({"jsonrpc": "2.0", "method": "fail", "id": 7}))
            .await
            .to_value();

        assert_eq!(value["error"]["code"], -32603);
        assert_eq!(value["id"], 7);
    }

    #[tokio::test]
    async fn structured_action_failure_is_forwarded_verbatim() {
        let value = dispatcher()
            .handle(json!({"jsonrpc": "2.0", "method": "denied", "id": 8}))
            .await
            .to_value();

        assert_eq!(
            value,
            json!({
                "jsonrpc": "2.0",
                "error": {"code": -32001, "message": "authentication failed"},
                "id": 8
            })
        );
    }

    #[tokio::test]
    async fn concurrent_calls_are_independent() {
        let dispatcher = dispatcher();
        let requests = (0..16)
            .map(|index| {
                let dispatcher = dispatcher.clone();
                let method = if index % 2 == 0 { "echo" } else { "fail" };
                tokio::spawn(async move {
                    dispatcher
                        .handle(json!({
                            "jsonrpc": "2.0",
                            "method": method,
                            "params": {"index": index},
                            "id": index
                        }))
                        .await
                })
            })
            .collect::<Vec<_>>();

        for (index, handle) in requests.into_iter().enumerate() {
            let response = handle.await.expect("task join");
            assert_eq!(response.id, Some(RequestId::from(index as i64)));
            if index % 2 == 0 {
                assert_eq!(response.to_value()["result"]["index"], index);
            } else {
                assert_eq!(response.error_code(), Some(-32603));
            }
        }
    }

    #[test]
    fn redacts_sensitive_fields_in_audit_params() {
        let params = json!({
            "userId": "alice",
            "accessToken": "should-not-appear",
            "api_key": "should-not-appear",
            "nested": {"client_secret": "should-not-appear", "city": "Paris"}
        });

        let redacted = redact_audit_params(Some(&params));

        assert_eq!(redacted["userId"], json!("alice"));
        assert_eq!(redacted["accessToken"], json!("[REDACTED]"));
        assert_eq!(redacted["api_key"], json!("[REDACTED]"));
        assert_eq!(redacted["nested"]["client_secret"], json!("[REDACTED]"));
        assert_eq!(redacted["nested"]["city"], json!("Paris"));
    }
}
