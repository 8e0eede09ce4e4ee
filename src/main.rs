use std::sync::Arc;

use mcp_tool_gateway::{
    build_app, build_registry,
    config::Config,
    domain::outlook::OutlookContext,
    graph_client::GraphClient,
    logging,
    token_store::{AccessToken, InMemoryTokenStore},
    weather_client::{OpenWeatherClient, WeatherProvider},
    AppState,
};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init_logging();

    let config = Config::from_env()?;
    let http = reqwest::Client::builder()
        .timeout(config.upstream_timeout)
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()?;

    let weather = config.openweather_api_key.as_ref().map(|api_key| {
        Arc::new(OpenWeatherClient::new(
            http.clone(),
            config.openweather_base_url.clone(),
            api_key.clone(),
        )) as Arc<dyn WeatherProvider>
    });
    if weather.is_none() {
        warn!("OPENWEATHER_API_KEY is not set, weather methods are disabled");
    }

    let tokens = Arc::new(InMemoryTokenStore::new());
    if let Some(token) = config.graph_access_token.as_ref() {
        tokens
            .insert(config.graph_user_id.clone(), AccessToken::new(token.clone()))
            .await;
        info!(user_id = %config.graph_user_id, "seeded graph access token");
    }

    let outlook = OutlookContext::new(
        Arc::new(GraphClient::new(http, config.graph_base_url.clone())),
        tokens,
    );
    let registry = build_registry(weather, outlook)?;
    let methods = registry.len();

    let bind_socket = config.bind_socket()?;
    let app = build_app(AppState::new(config.api_token.clone(), registry));
    let listener = tokio::net::TcpListener::bind(bind_socket).await?;

    info!(
        bind_addr = %config.bind_addr,
        bind_port = config.bind_port,
        methods,
        auth = config.api_token.is_some(),
        "server starting"
    );

    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}
