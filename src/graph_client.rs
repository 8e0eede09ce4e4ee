use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use reqwest::{header, StatusCode};
use serde::Deserialize;
use serde_json::json;

use crate::errors::AppError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageQuery {
    pub folder: String,
    pub limit: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    pub id: String,
    pub subject: String,
    pub from: Option<String>,
    pub received_at: Option<DateTime<Utc>>,
    pub preview: String,
    pub is_read: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventQuery {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub limit: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarEvent {
    pub id: String,
    pub subject: String,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub location: Option<String>,
    pub organizer: Option<String>,
}

/// Mail and calendar operations on behalf of the user owning `access_token`.
#[async_trait]
pub trait OutlookProvider: Send + Sync {
    async fn list_messages(
        &self,
        access_token: &str,
        query: &MessageQuery,
    ) -> Result<Vec<MailMessage>, AppError>;

    async fn send_mail(&self, access_token: &str, mail: &OutgoingMail) -> Result<(), AppError>;

    async fn list_events(
        &self,
        access_token: &str,
        query: &EventQuery,
    ) -> Result<Vec<CalendarEvent>, AppError>;
}

#[derive(Debug, Deserialize)]
struct Collection<T> {
    #[serde(default = "Vec::new")]
    value: Vec<T>,
}

#[derive(Debug, Default, Deserialize)]
struct RawEmailAddress {
    name: Option<String>,
    address: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRecipient {
    #[serde(default)]
    email_address: RawEmailAddress,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMessage {
    id: String,
    subject: Option<String>,
    from: Option<RawRecipient>,
    received_date_time: Option<String>,
    #[serde(default)]
    body_preview: String,
    #[serde(default)]
    is_read: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDateTime {
    date_time: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawLocation {
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    id: String,
    subject: Option<String>,
    start: Option<RawDateTime>,
    end: Option<RawDateTime>,
    location: Option<RawLocation>,
    organizer: Option<RawRecipient>,
}

#[derive(Debug, Deserialize)]
struct RawGraphError {
    error: RawGraphErrorBody,
}

#[derive(Debug, Deserialize)]
struct RawGraphErrorBody {
    message: Option<String>,
}

/// Microsoft Graph v1.0 client scoped to the signed-in user (`/me`).
#[derive(Debug, Clone)]
pub struct GraphClient {
    http: reqwest::Client,
    base_url: String,
}

impl GraphClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/me/{path}", self.base_url)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, AppError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let detail = response
            .json::<RawGraphError>()
            .await
            .ok()
            .and_then(|error| error.error.message)
            .unwrap_or_else(|| status.to_string());

        Err(match status {
            StatusCode::UNAUTHORIZED => AppError::unauthorized(
                "graph_unauthorized",
                format!("authentication failed: {detail}"),
            ),
            _ => AppError::internal(format!("Microsoft Graph returned {status}: {detail}")),
        })
    }
}

#[async_trait]
impl OutlookProvider for GraphClient {
    async fn list_messages(
        &self,
        access_token: &str,
        query: &MessageQuery,
    ) -> Result<Vec<MailMessage>, AppError> {
        let response = self
            .http
            .get(self.url(&format!("mailFolders/{}/messages", query.folder)))
            .bearer_auth(access_token)
            .query(&[
                ("$top", query.limit.to_string()),
                (
                    "$select",
                    "id,subject,from,receivedDateTime,bodyPreview,isRead".to_string(),
                ),
                ("$orderby", "receivedDateTime desc".to_string()),
            ])
            .send()
            .await?;

        let collection: Collection<RawMessage> = Self::check(response).await?.json().await?;
        Ok(collection.value.into_iter().map(map_message).collect())
    }

    async fn send_mail(&self, access_token: &str, mail: &OutgoingMail) -> Result<(), AppError> {
        let recipients = mail
            .to
            .iter()
            .map(|address| json!({ "emailAddress": { "address": address } }))
            .collect::<Vec<_>>();

        let response = self
            .http
            .post(self.url("sendMail"))
            .bearer_auth(access_token)
            .json(&json!({
                "message": {
                    "subject": mail.subject,
                    "body": { "contentType": "Text", "content": mail.body },
                    "toRecipients": recipients,
                },
                "saveToSentItems": true,
            }))
            .send()
            .await?;

        Self::check(response).await?;
        Ok(())
    }

    async fn list_events(
        &self,
        access_token: &str,
        query: &EventQuery,
    ) -> Result<Vec<CalendarEvent>, AppError> {
        let response = self
            .http
            .get(self.url("calendarView"))
            .bearer_auth(access_token)
            .header(header::HeaderName::from_static("prefer"), "outlook.timezone=\"UTC\"")
            .query(&[
                (
                    "startDateTime",
                    query.start.to_rfc3339_opts(SecondsFormat::Secs, true),
                ),
                (
                    "endDateTime",
                    query.end.to_rfc3339_opts(SecondsFormat::Secs, true),
                ),
                ("$top", query.limit.to_string()),
                ("$orderby", "start/dateTime".to_string()),
            ])
            .send()
            .await?;

        let collection: Collection<RawEvent> = Self::check(response).await?.json().await?;
        Ok(collection.value.into_iter().map(map_event).collect())
    }
}

fn display_address(recipient: Option<RawRecipient>) -> Option<String> {
    let RawEmailAddress { name, address } = recipient?.email_address;
    match (name.filter(|name| !name.trim().is_empty()), address) {
        (Some(name), Some(address)) => Some(format!("{name} <{address}>")),
        (None, Some(address)) => Some(address),
        (Some(name), None) => Some(name),
        (None, None) => None,
    }
}

fn parse_graph_utc(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }

    // calendarView returns offset-less timestamps in the zone named by the Prefer header
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

fn map_message(raw: RawMessage) -> MailMessage {
    MailMessage {
        id: raw.id,
        subject: raw.subject.unwrap_or_default(),
        from: display_address(raw.from),
        received_at: raw.received_date_time.as_deref().and_then(parse_graph_utc),
        preview: raw.body_preview,
        is_read: raw.is_read,
    }
}

fn map_event(raw: RawEvent) -> CalendarEvent {
    CalendarEvent {
        id: raw.id,
        subject: raw.subject.unwrap_or_default(),
        start: raw
            .start
            .and_then(|start| parse_graph_utc(&start.date_time)),
        end: raw.end.and_then(|end| parse_graph_utc(&end.date_time)),
        location: raw
            .location
            .and_then(|location| location.display_name)
            .filter(|name| !name.trim().is_empty()),
        organizer: display_address(raw.organizer),
    }
}
