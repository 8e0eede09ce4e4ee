use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

pub mod auth;
pub mod config;
pub mod domain;
pub mod errors;
pub mod graph_client;
pub mod http;
pub mod logging;
pub mod mcp;
pub mod token_store;
pub mod weather_client;

use domain::{
    outlook::{outlook_methods, OutlookContext},
    weather::weather_methods,
};
use mcp::{
    dispatcher::Dispatcher,
    registry::{MethodRegistry, RegistryError},
};
use weather_client::WeatherProvider;

#[derive(Clone)]
pub struct AppState {
    pub api_token: Option<Arc<str>>,
    pub dispatcher: Dispatcher,
}

impl AppState {
    pub fn new(api_token: Option<String>, registry: MethodRegistry) -> Self {
        Self {
            api_token: api_token.map(Arc::<str>::from),
            dispatcher: Dispatcher::new(Arc::new(registry)),
        }
    }
}

/// Registers the weather methods (when a provider is configured) and the
/// Outlook methods.
pub fn build_registry(
    weather: Option<Arc<dyn WeatherProvider>>,
    outlook: OutlookContext,
) -> Result<MethodRegistry, RegistryError> {
    let builder = MethodRegistry::builder();
    let builder = match weather {
        Some(provider) => builder.register_all(weather_methods(provider))?,
        None => builder,
    };

    Ok(builder.register_all(outlook_methods(outlook))?.build())
}

pub fn build_app(state: AppState) -> Router {
    let protected = Router::new()
        .route("/mcp", post(http::handlers::mcp_endpoint))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_bearer_token,
        ));

    Router::new()
        .route("/health", get(http::handlers::health))
        .route("/.well-known/mcp", get(http::handlers::discovery))
        .merge(protected)
        .layer(middleware::from_fn(logging::request_logging_middleware))
        .with_state(state)
}
