use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::Deserialize;

use crate::errors::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Units {
    #[default]
    Metric,
    Imperial,
    Standard,
}

impl Units {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Metric => "metric",
            Self::Imperial => "imperial",
            Self::Standard => "standard",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeatherQuery {
    pub location: String,
    pub units: Units,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CurrentConditions {
    pub location: String,
    pub country: Option<String>,
    pub temperature: f64,
    pub feels_like: f64,
    pub humidity: f64,
    pub pressure: f64,
    pub description: String,
    pub wind_speed: f64,
    pub observed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForecastPeriod {
    pub time: DateTime<Utc>,
    pub temperature: f64,
    pub description: String,
    pub wind_speed: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Forecast {
    pub location: String,
    pub country: Option<String>,
    pub periods: Vec<ForecastPeriod>,
}

#[async_trait]
pub trait WeatherProvider: Send + Sync {
    async fn current(&self, query: &WeatherQuery) -> Result<CurrentConditions, AppError>;

    async fn forecast(&self, query: &WeatherQuery, periods: u32) -> Result<Forecast, AppError>;
}

#[derive(Debug, Deserialize)]
struct RawCondition {
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct RawMain {
    temp: f64,
    #[serde(default)]
    feels_like: f64,
    #[serde(default)]
    humidity: f64,
    #[serde(default)]
    pressure: f64,
}

#[derive(Debug, Default, Deserialize)]
struct RawWind {
    #[serde(default)]
    speed: f64,
}

#[derive(Debug, Default, Deserialize)]
struct RawSys {
    country: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawCurrent {
    name: String,
    dt: i64,
    main: RawMain,
    #[serde(default)]
    weather: Vec<RawCondition>,
    #[serde(default)]
    wind: RawWind,
    #[serde(default)]
    sys: RawSys,
}

#[derive(Debug, Deserialize)]
struct RawForecastEntry {
    dt: i64,
    main: RawMain,
    #[serde(default)]
    weather: Vec<RawCondition>,
    #[serde(default)]
    wind: RawWind,
}

#[derive(Debug, Deserialize)]
struct RawCity {
    name: String,
    country: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawForecast {
    city: RawCity,
    #[serde(default)]
    list: Vec<RawForecastEntry>,
}

#[derive(Debug, Deserialize)]
struct RawApiError {
    message: Option<String>,
}

/// OpenWeatherMap client for the 2.5 current weather and forecast endpoints.
#[derive(Debug, Clone)]
pub struct OpenWeatherClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl OpenWeatherClient {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &WeatherQuery,
        extra: &[(&str, String)],
    ) -> Result<T, AppError> {
        let mut params = vec![
            ("q", query.location.clone()),
            ("appid", self.api_key.clone()),
            ("units", query.units.as_str().to_string()),
        ];
        params.extend(extra.iter().cloned());

        let response = self
            .http
            .get(format!("{}/data/2.5/{endpoint}", self.base_url))
            .query(&params)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<T>().await?);
        }

        let detail = response
            .json::<RawApiError>()
            .await
            .ok()
            .and_then(|error| error.message)
            .unwrap_or_else(|| status.to_string());

        Err(match status {
            StatusCode::NOT_FOUND => {
                AppError::invalid_params(format!("location not found: {}", query.location))
            }
            _ => AppError::internal(format!("weather API returned {status}: {detail}")),
        })
    }
}

#[async_trait]
impl WeatherProvider for OpenWeatherClient {
    async fn current(&self, query: &WeatherQuery) -> Result<CurrentConditions, AppError> {
        let raw: RawCurrent = self.get("weather", query, &[]).await?;
        map_current(raw)
    }

    async fn forecast(&self, query: &WeatherQuery, periods: u32) -> Result<Forecast, AppError> {
        let raw: RawForecast = self
            .get("forecast", query, &[("cnt", periods.to_string())])
            .await?;
        map_forecast(raw)
    }
}

fn timestamp(seconds: i64) -> Result<DateTime<Utc>, AppError> {
    DateTime::<Utc>::from_timestamp(seconds, 0)
        .ok_or_else(|| AppError::internal(format!("weather API returned invalid timestamp {seconds}")))
}

fn describe(conditions: &[RawCondition]) -> String {
    conditions
        .iter()
        .map(|condition| condition.description.trim())
        .filter(|description| !description.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}

fn map_current(raw: RawCurrent) -> Result<CurrentConditions, AppError> {
    Ok(CurrentConditions {
        location: raw.name,
        country: raw.sys.country,
        temperature: raw.main.temp,
        feels_like: raw.main.feels_like,
        humidity: raw.main.humidity,
        pressure: raw.main.pressure,
        description: describe(&raw.weather),
        wind_speed: raw.wind.speed,
        observed_at: timestamp(raw.dt)?,
    })
}

fn map_forecast(raw: RawForecast) -> Result<Forecast, AppError> {
    let periods = raw
        .list
        .into_iter()
        .map(|entry| {
            Ok(ForecastPeriod {
                time: timestamp(entry.dt)?,
                temperature: entry.main.temp,
                description: describe(&entry.weather),
                wind_speed: entry.wind.speed,
            })
        })
        .collect::<Result<Vec<_>, AppError>>()?;

    Ok(Forecast {
        location: raw.city.name,
        country: raw.city.country,
        periods,
    })
}
