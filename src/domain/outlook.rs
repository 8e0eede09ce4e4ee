//! Outlook mail and calendar methods backed by an `OutlookProvider`
//!
//! Every method names the user it acts for; the user's access token is taken
//! from the injected `TokenStore`, never from process-wide state.

use std::{future::Future, sync::Arc};

use chrono::{Duration, Utc};
use schemars::JsonSchema;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Map, Value};

use crate::domain::utils::{
    decode_params, format_utc, normalize_folder, normalize_limit, parse_utc, require_non_empty,
    validate_recipients, DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT,
};
use crate::errors::AppError;
use crate::graph_client::{
    CalendarEvent, EventQuery, MailMessage, MessageQuery, OutgoingMail, OutlookProvider,
};
use crate::mcp::registry::MethodDescriptor;
use crate::token_store::TokenStore;

pub const LIST_MESSAGES_METHOD: &str = "listMessages";
pub const SEND_MAIL_METHOD: &str = "sendMail";
pub const LIST_EVENTS_METHOD: &str = "listEvents";

const DEFAULT_EVENT_WINDOW_DAYS: i64 = 7;

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListMessagesParams {
    /// Identifier of the signed-in user whose mailbox is read.
    pub user_id: String,
    /// Mail folder name or id (default "inbox").
    pub folder: Option<String>,
    /// Maximum number of messages, 1 to 50 (default 10).
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SendMailParams {
    /// Identifier of the signed-in user sending the message.
    pub user_id: String,
    /// Recipient email addresses.
    pub to: Vec<String>,
    pub subject: String,
    /// Plain-text message body.
    pub body: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListEventsParams {
    /// Identifier of the signed-in user whose calendar is read.
    pub user_id: String,
    /// Window start, RFC3339 UTC ending with Z (default now).
    pub start_utc: Option<String>,
    /// Window end, RFC3339 UTC ending with Z (default start plus 7 days).
    pub end_utc: Option<String>,
    /// Maximum number of events, 1 to 50 (default 10).
    pub limit: Option<u32>,
}

#[derive(Clone)]
pub struct OutlookContext {
    provider: Arc<dyn OutlookProvider>,
    tokens: Arc<dyn TokenStore>,
}

impl OutlookContext {
    pub fn new(provider: Arc<dyn OutlookProvider>, tokens: Arc<dyn TokenStore>) -> Self {
        Self { provider, tokens }
    }

    async fn access_token(&self, user_id: &str) -> Result<String, AppError> {
        let unauthenticated = || {
            AppError::unauthorized(
                "authentication_required",
                format!("authentication required for user {user_id}"),
            )
        };

        let token = self
            .tokens
            .access_token(user_id)
            .await
            .ok_or_else(unauthenticated)?;
        if token.is_expired_at(Utc::now()) {
            return Err(unauthenticated());
        }

        Ok(token.token)
    }
}

fn bind<P, F, Fut>(
    context: &OutlookContext,
    name: &str,
    description: &str,
    run: F,
) -> MethodDescriptor
where
    P: DeserializeOwned + JsonSchema + Send + 'static,
    F: Fn(OutlookContext, P) -> Fut + Copy + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, AppError>> + Send + 'static,
{
    let context = context.clone();
    MethodDescriptor::new(name, description, move |params: Map<String, Value>| {
        let context = context.clone();
        async move {
            let params: P = decode_params(params)?;
            run(context, params).await
        }
    })
    .with_params::<P>()
}

pub fn outlook_methods(context: OutlookContext) -> Vec<MethodDescriptor> {
    vec![
        bind(
            &context,
            LIST_MESSAGES_METHOD,
            "List recent messages in a mail folder of the user's mailbox",
            list_messages,
        ),
        bind(
            &context,
            SEND_MAIL_METHOD,
            "Send a plain-text email from the user's mailbox",
            send_mail,
        ),
        bind(
            &context,
            LIST_EVENTS_METHOD,
            "List calendar events of the user within a time window",
            list_events,
        ),
    ]
}

pub async fn list_messages(
    context: OutlookContext,
    params: ListMessagesParams,
) -> Result<Value, AppError> {
    let query = MessageQuery {
        folder: normalize_folder(params.folder)?,
        limit: normalize_limit("limit", params.limit, DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT)?,
    };
    let user_id = require_non_empty("userId", params.user_id)?;
    let token = context.access_token(&user_id).await?;

    let messages = context.provider.list_messages(&token, &query).await?;
    Ok(json!({
        "folder": query.folder,
        "returned": messages.len(),
        "messages": messages.iter().map(message_payload).collect::<Vec<_>>(),
    }))
}

pub async fn send_mail(context: OutlookContext, params: SendMailParams) -> Result<Value, AppError> {
    let mail = OutgoingMail {
        to: validate_recipients(params.to)?,
        subject: require_non_empty("subject", params.subject)?,
        body: params.body,
    };
    let user_id = require_non_empty("userId", params.user_id)?;
    let token = context.access_token(&user_id).await?;

    context.provider.send_mail(&token, &mail).await?;
    Ok(json!({
        "sent": true,
        "recipients": mail.to,
    }))
}

pub async fn list_events(
    context: OutlookContext,
    params: ListEventsParams,
) -> Result<Value, AppError> {
    let start = parse_utc("startUtc", params.start_utc.as_deref())?.unwrap_or_else(Utc::now);
    let end = parse_utc("endUtc", params.end_utc.as_deref())?
        .unwrap_or(start + Duration::days(DEFAULT_EVENT_WINDOW_DAYS));
    if start >= end {
        return Err(AppError::invalid_params(
            "startUtc must be strictly less than endUtc",
        ));
    }

    let query = EventQuery {
        start,
        end,
        limit: normalize_limit("limit", params.limit, DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT)?,
    };
    let user_id = require_non_empty("userId", params.user_id)?;
    let token = context.access_token(&user_id).await?;

    let events = context.provider.list_events(&token, &query).await?;
    Ok(json!({
        "window": {
            "startUtc": format_utc(query.start),
            "endUtc": format_utc(query.end),
        },
        "returned": events.len(),
        "events": events.iter().map(event_payload).collect::<Vec<_>>(),
    }))
}

fn message_payload(message: &MailMessage) -> Value {
    json!({
        "id": message.id,
        "subject": message.subject,
        "from": message.from,
        "receivedUtc": message.received_at.map(format_utc),
        "preview": message.preview,
        "isRead": message.is_read,
    })
}

fn event_payload(event: &CalendarEvent) -> Value {
    json!({
        "id": event.id,
        "subject": event.subject,
        "startUtc": event.start.map(format_utc),
        "endUtc": event.end.map(format_utc),
        "location": event.location,
        "organizer": event.organizer,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::DateTime;

    use super::*;
    use crate::token_store::{AccessToken, InMemoryTokenStore};

    #[derive(Default)]
    struct MockOutlook {
        tokens_seen: Mutex<Vec<String>>,
        sent: Mutex<Vec<OutgoingMail>>,
        event_queries: Mutex<Vec<EventQuery>>,
    }

    #[async_trait]
    impl OutlookProvider for MockOutlook {
        async fn list_messages(
            &self,
            access_token: &str,
            query: &MessageQuery,
        ) -> Result<Vec<MailMessage>, AppError> {
            self.tokens_seen
                .lock()
                .expect("tokens lock")
                .push(access_token.to_string());
            Ok(vec![MailMessage {
                id: "m1".to_string(),
                subject: format!("from {}", query.folder),
                from: Some("dana@example.com".to_string()),
                received_at: DateTime::from_timestamp(1_772_150_400, 0),
                preview: "hello".to_string(),
                is_read: true,
            }])
        }

        async fn send_mail(&self, _access_token: &str, mail: &OutgoingMail) -> Result<(), AppError> {
            self.sent.lock().expect("sent lock").push(mail.clone());
            Ok(())
        }

        async fn list_events(
            &self,
            _access_token: &str,
            query: &EventQuery,
        ) -> Result<Vec<CalendarEvent>, AppError> {
            self.event_queries
                .lock()
                .expect("queries lock")
                .push(query.clone());
            Ok(vec![])
        }
    }

    async fn context_with_token(provider: Arc<MockOutlook>, token: AccessToken) -> OutlookContext {
        let store = InMemoryTokenStore::new();
        store.insert("alice", token).await;
        OutlookContext::new(provider, Arc::new(store))
    }

    #[tokio::test]
    async fn list_messages_uses_the_users_token() {
        let provider = Arc::new(MockOutlook::default());
        let context = context_with_token(provider.clone(), AccessToken::new("alice-token")).await;

        let result = list_messages(
            context,
            ListMessagesParams {
                user_id: "alice".to_string(),
                folder: None,
                limit: None,
            },
        )
        .await
        .expect("messages");

        assert_eq!(result["folder"], "inbox");
        assert_eq!(result["returned"], 1);
        assert_eq!(result["messages"][0]["receivedUtc"], "2026-02-27T00:00:00Z");
        assert_eq!(
            *provider.tokens_seen.lock().expect("tokens lock"),
            vec!["alice-token".to_string()]
        );
    }

    #[tokio::test]
    async fn unknown_user_is_unauthorized() {
        let provider = Arc::new(MockOutlook::default());
        let context = context_with_token(provider.clone(), AccessToken::new("alice-token")).await;

        let error = list_messages(
            context,
            ListMessagesParams {
                user_id: "mallory".to_string(),
                folder: None,
                limit: None,
            },
        )
        .await
        .expect_err("no token for mallory");

        assert!(matches!(error, AppError::Unauthorized { .. }));
        assert!(error.to_string().contains("mallory"));
        assert!(provider.tokens_seen.lock().expect("tokens lock").is_empty());
    }

    #[tokio::test]
    async fn expired_token_is_unauthorized() {
        let provider = Arc::new(MockOutlook::default());
        let expired = AccessToken::new("old").expiring_at(Utc::now() - Duration::minutes(1));
        let context = context_with_token(provider, expired).await;

        let error = send_mail(
            context,
            SendMailParams {
                user_id: "alice".to_string(),
                to: vec!["sam@example.com".to_string()],
                subject: "Hi".to_string(),
                body: "Hello".to_string(),
            },
        )
        .await
        .expect_err("expired token");

        assert!(matches!(error, AppError::Unauthorized { .. }));
    }

    #[tokio::test]
    async fn send_mail_rejects_invalid_recipient_without_sending() {
        let provider = Arc::new(MockOutlook::default());
        let context = context_with_token(provider.clone(), AccessToken::new("t")).await;

        let error = send_mail(
            context,
            SendMailParams {
                user_id: "alice".to_string(),
                to: vec!["sam".to_string()],
                subject: "Hi".to_string(),
                body: "Hello".to_string(),
            },
        )
        .await
        .expect_err("invalid recipient");

        assert!(matches!(error, AppError::InvalidParams { .. }));
        assert!(provider.sent.lock().expect("sent lock").is_empty());
    }

    #[tokio::test]
    async fn list_events_defaults_to_a_week_from_start() {
        let provider = Arc::new(MockOutlook::default());
        let context = context_with_token(provider.clone(), AccessToken::new("t")).await;

        let result = list_events(
            context,
            ListEventsParams {
                user_id: "alice".to_string(),
                start_utc: Some("2026-03-01T00:00:00Z".to_string()),
                end_utc: None,
                limit: Some(5),
            },
        )
        .await
        .expect("events");

        assert_eq!(result["window"]["endUtc"], "2026-03-08T00:00:00Z");
        assert_eq!(result["returned"], 0);
        let queries = provider.event_queries.lock().expect("queries lock");
        assert_eq!(queries[0].limit, 5);
    }

    #[tokio::test]
    async fn list_events_rejects_inverted_window() {
        let provider = Arc::new(MockOutlook::default());
        let context = context_with_token(provider, AccessToken::new("t")).await;

        let error = list_events(
            context,
            ListEventsParams {
                user_id: "alice".to_string(),
                start_utc: Some("2026-03-02T00:00:00Z".to_string()),
                end_utc: Some("2026-03-01T00:00:00Z".to_string()),
                limit: None,
            },
        )
        .await
        .expect_err("inverted window");

        assert!(matches!(error, AppError::InvalidParams { .. }));
    }

    #[tokio::test]
    async fn descriptors_decode_params_through_the_registry_action() {
        let provider = Arc::new(MockOutlook::default());
        let context = context_with_token(provider.clone(), AccessToken::new("t")).await;
        let methods = outlook_methods(context);

        let send = methods
            .iter()
            .find(|method| method.name() == SEND_MAIL_METHOD)
            .expect("sendMail registered");
        assert_eq!(
            send.required().iter().collect::<Vec<_>>(),
            vec!["body", "subject", "to", "userId"]
        );

        let params = json!({
            "userId": "alice",
            "to": ["sam@example.com"],
            "subject": "Status",
            "body": "All green"
        });
        let result = send
            .action()
            .call(params.as_object().cloned().expect("object"))
            .await
            .expect("sent");

        assert_eq!(result["sent"], true);
        assert_eq!(provider.sent.lock().expect("sent lock")[0].subject, "Status");
    }
}
