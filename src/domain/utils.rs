//! Shared parameter decoding and validation for actions

use std::sync::OnceLock;

use chrono::{DateTime, SecondsFormat, Utc};
use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::{errors::AppError, weather_client::Units};

pub const MAX_PAGE_LIMIT: u32 = 50;
pub const DEFAULT_PAGE_LIMIT: u32 = 10;
pub const MAX_FORECAST_PERIODS: u32 = 40;
pub const DEFAULT_FORECAST_PERIODS: u32 = 8;

/// Decodes the validated params object into a typed parameter struct.
pub fn decode_params<P: DeserializeOwned>(params: Map<String, Value>) -> Result<P, AppError> {
    serde_json::from_value(Value::Object(params))
        .map_err(|err| AppError::invalid_params(format!("invalid params: {err}")))
}

pub fn require_non_empty(name: &str, value: String) -> Result<String, AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::invalid_params(format!("{name} must not be empty")));
    }
    Ok(trimmed.to_string())
}

pub fn normalize_units(units: Option<String>) -> Result<Units, AppError> {
    let Some(value) = units else {
        return Ok(Units::default());
    };

    match value.trim().to_ascii_lowercase().as_str() {
        "" | "metric" => Ok(Units::Metric),
        "imperial" => Ok(Units::Imperial),
        "standard" => Ok(Units::Standard),
        _ => Err(AppError::invalid_params(
            "units must be one of: metric, imperial, standard",
        )),
    }
}

pub fn normalize_limit(
    name: &str,
    value: Option<u32>,
    default: u32,
    max: u32,
) -> Result<u32, AppError> {
    let limit = value.unwrap_or(default);
    if limit == 0 || limit > max {
        return Err(AppError::invalid_params(format!(
            "{name} must be between 1 and {max}"
        )));
    }
    Ok(limit)
}

pub fn normalize_folder(folder: Option<String>) -> Result<String, AppError> {
    let Some(value) = folder else {
        return Ok("inbox".to_string());
    };

    let normalized = value.trim();
    if normalized.is_empty()
        || !normalized
            .chars()
            .all(|character| character.is_ascii_alphanumeric() || "-_=".contains(character))
    {
        return Err(AppError::invalid_params(
            "folder must be a well-known folder name or folder id",
        ));
    }

    Ok(normalized.to_string())
}

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[^\s@<>]+@[^\s@<>]+\.[^\s@<>]+$").expect("email pattern compiles")
    })
}

pub fn validate_recipients(recipients: Vec<String>) -> Result<Vec<String>, AppError> {
    let recipients = recipients
        .into_iter()
        .map(|recipient| recipient.trim().to_string())
        .collect::<Vec<_>>();

    if recipients.is_empty() {
        return Err(AppError::invalid_params("to must list at least one recipient"));
    }

    if let Some(invalid) = recipients
        .iter()
        .find(|recipient| !email_pattern().is_match(recipient))
    {
        return Err(AppError::invalid_params(format!(
            "invalid recipient address: {invalid}"
        )));
    }

    Ok(recipients)
}

pub fn parse_utc(name: &str, value: Option<&str>) -> Result<Option<DateTime<Utc>>, AppError> {
    let Some(value) = value else {
        return Ok(None);
    };

    let invalid = || {
        AppError::invalid_params(format!(
            "{name} must be an RFC3339 UTC timestamp ending with Z"
        ))
    };

    if !value.ends_with('Z') {
        return Err(invalid());
    }

    let parsed = DateTime::parse_from_rfc3339(value).map_err(|_| invalid())?;
    Ok(Some(parsed.with_timezone(&Utc)))
}

pub fn format_utc(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn units_default_to_metric_and_are_case_insensitive() {
        assert_eq!(normalize_units(None).expect("default"), Units::Metric);
        assert_eq!(
            normalize_units(Some(" Imperial ".to_string())).expect("imperial"),
            Units::Imperial
        );
        let error = normalize_units(Some("kelvin".to_string())).expect_err("unknown units");
        assert!(error.to_string().contains("invalid params"));
    }

    #[test]
    fn limit_bounds_are_inclusive() {
        assert_eq!(normalize_limit("limit", None, 10, 50).expect("default"), 10);
        assert_eq!(normalize_limit("limit", Some(50), 10, 50).expect("max"), 50);
        assert!(normalize_limit("limit", Some(0), 10, 50).is_err());
        assert!(normalize_limit("limit", Some(51), 10, 50).is_err());
    }

    #[test]
    fn rejects_folder_with_path_characters() {
        assert_eq!(normalize_folder(None).expect("default"), "inbox");
        assert_eq!(
            normalize_folder(Some(" sentitems ".to_string())).expect("folder"),
            "sentitems"
        );
        assert!(normalize_folder(Some("inbox/../drafts".to_string())).is_err());
    }

    #[test]
    fn validates_recipient_addresses() {
        let recipients =
            validate_recipients(vec![" ana@example.com ".to_string()]).expect("valid address");
        assert_eq!(recipients, vec!["ana@example.com".to_string()]);

        let error = validate_recipients(vec![
            "ana@example.com".to_string(),
            "not-an-address".to_string(),
        ])
        .expect_err("invalid address");
        assert!(error.to_string().contains("not-an-address"));

        assert!(validate_recipients(vec![]).is_err());
    }

    #[test]
    fn rejects_non_utc_time() {
        let error = parse_utc("startUtc", Some("2026-02-27T12:00:00+01:00"))
            .expect_err("offset timestamps are rejected");
        assert!(error.to_string().contains("startUtc"));

        let parsed = parse_utc("startUtc", Some("2026-02-27T12:00:00Z"))
            .expect("utc timestamp")
            .expect("present");
        assert_eq!(format_utc(parsed), "2026-02-27T12:00:00Z");
        assert!(parse_utc("startUtc", None).expect("absent").is_none());
    }
}
