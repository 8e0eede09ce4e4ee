//! Weather methods backed by a `WeatherProvider`
//!
//! Provides `getCurrentWeather` and `getWeatherForecast`, reshaping provider
//! results into compact JSON payloads.

use std::sync::Arc;

use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::domain::utils::{
    decode_params, format_utc, normalize_limit, normalize_units, require_non_empty,
    DEFAULT_FORECAST_PERIODS, MAX_FORECAST_PERIODS,
};
use crate::errors::AppError;
use crate::mcp::registry::MethodDescriptor;
use crate::weather_client::{CurrentConditions, Forecast, WeatherProvider, WeatherQuery};

pub const CURRENT_WEATHER_METHOD: &str = "getCurrentWeather";
pub const FORECAST_METHOD: &str = "getWeatherForecast";

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CurrentWeatherParams {
    /// City name, optionally followed by a country code, e.g. "London,UK".
    pub location: String,
    /// One of "metric" (default), "imperial" or "standard".
    pub units: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ForecastParams {
    /// City name, optionally followed by a country code, e.g. "London,UK".
    pub location: String,
    /// One of "metric" (default), "imperial" or "standard".
    pub units: Option<String>,
    /// Number of 3-hour forecast periods, 1 to 40 (default 8).
    pub periods: Option<u32>,
}

pub fn weather_methods(provider: Arc<dyn WeatherProvider>) -> Vec<MethodDescriptor> {
    let current_provider = Arc::clone(&provider);
    let forecast_provider = provider;

    vec![
        MethodDescriptor::new(
            CURRENT_WEATHER_METHOD,
            "Get the current weather conditions for a location",
            move |params: Map<String, Value>| {
                let provider = Arc::clone(&current_provider);
                async move { current_weather(provider.as_ref(), params).await }
            },
        )
        .with_params::<CurrentWeatherParams>(),
        MethodDescriptor::new(
            FORECAST_METHOD,
            "Get the 3-hourly weather forecast for a location",
            move |params: Map<String, Value>| {
                let provider = Arc::clone(&forecast_provider);
                async move { weather_forecast(provider.as_ref(), params).await }
            },
        )
        .with_params::<ForecastParams>(),
    ]
}

fn build_query(location: String, units: Option<String>) -> Result<WeatherQuery, AppError> {
    Ok(WeatherQuery {
        location: require_non_empty("location", location)?,
        units: normalize_units(units)?,
    })
}

pub async fn current_weather(
    provider: &dyn WeatherProvider,
    params: Map<String, Value>,
) -> Result<Value, AppError> {
    let params: CurrentWeatherParams = decode_params(params)?;
    let query = build_query(params.location, params.units)?;
    let current = provider.current(&query).await?;
    Ok(current_weather_payload(&current, &query))
}

pub async fn weather_forecast(
    provider: &dyn WeatherProvider,
    params: Map<String, Value>,
) -> Result<Value, AppError> {
    let params: ForecastParams = decode_params(params)?;
    let periods = normalize_limit(
        "periods",
        params.periods,
        DEFAULT_FORECAST_PERIODS,
        MAX_FORECAST_PERIODS,
    )?;
    let query = build_query(params.location, params.units)?;
    let forecast = provider.forecast(&query, periods).await?;
    Ok(forecast_payload(&forecast, &query))
}

fn current_weather_payload(current: &CurrentConditions, query: &WeatherQuery) -> Value {
    json!({
        "location": current.location,
        "country": current.country,
        "temperature": current.temperature,
        "feelsLike": current.feels_like,
        "humidity": current.humidity,
        "pressure": current.pressure,
        "description": current.description,
        "windSpeed": current.wind_speed,
        "units": query.units.as_str(),
        "observedAtUtc": format_utc(current.observed_at),
    })
}

fn forecast_payload(forecast: &Forecast, query: &WeatherQuery) -> Value {
    let periods = forecast
        .periods
        .iter()
        .map(|period| {
            json!({
                "timeUtc": format_utc(period.time),
                "temperature": period.temperature,
                "description": period.description,
                "windSpeed": period.wind_speed,
            })
        })
        .collect::<Vec<_>>();

    json!({
        "location": forecast.location,
        "country": forecast.country,
        "units": query.units.as_str(),
        "periods": periods,
    })
}
