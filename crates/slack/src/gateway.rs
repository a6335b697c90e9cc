//! Outbound calls to the Slack Web API.
//!
//! [`MessagingGateway`] is the seam the rest of the bot talks to. The
//! production implementation is [`SlackWebGateway`]; [`RecordingGateway`]
//! keeps everything in memory and records each call.

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;
use welcomebot_core::ScheduledMessageSpec;

use crate::blocks::{Block, MessageTemplate};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("{method} request failed: {detail}")]
    Transport { method: &'static str, detail: String },
    #[error("{method} returned error `{error}`")]
    Api { method: &'static str, error: String },
    #[error("{method} response is missing `{field}`")]
    MissingField { method: &'static str, field: &'static str },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OutgoingMessage {
    pub channel: String,
    pub text: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub blocks: Vec<Block>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_ts: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_emoji: Option<String>,
}

impl OutgoingMessage {
    pub fn text(channel: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            text: text.into(),
            blocks: Vec::new(),
            thread_ts: None,
            username: None,
            icon_emoji: None,
        }
    }

    pub fn from_template(channel: impl Into<String>, template: &MessageTemplate) -> Self {
        Self { blocks: template.blocks.clone(), ..Self::text(channel, template.fallback_text.clone()) }
    }

    pub fn in_thread(mut self, thread_ts: impl Into<String>) -> Self {
        self.thread_ts = Some(thread_ts.into());
        self
    }

    pub fn with_persona(mut self, username: impl Into<String>, icon_emoji: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.icon_emoji = Some(icon_emoji.into());
        self
    }
}

/// Identity of a posted message as reported back by Slack.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PostedMessage {
    pub channel: String,
    pub ts: String,
}

#[async_trait]
pub trait MessagingGateway: Send + Sync {
    /// Resolves the bot's own user id.
    async fn auth_test(&self) -> Result<String, GatewayError>;
    async fn post_message(&self, message: &OutgoingMessage) -> Result<PostedMessage, GatewayError>;
    async fn update_message(
        &self,
        channel: &str,
        ts: &str,
        template: &MessageTemplate,
    ) -> Result<PostedMessage, GatewayError>;
    /// Returns the scheduled message id.
    async fn schedule_message(&self, spec: &ScheduledMessageSpec) -> Result<String, GatewayError>;
    async fn list_scheduled_messages(&self, channel: &str) -> Result<Vec<String>, GatewayError>;
    async fn delete_scheduled_message(&self, channel: &str, id: &str) -> Result<(), GatewayError>;
}

pub struct SlackWebGateway {
    http: reqwest::Client,
    base_url: String,
    bot_token: SecretString,
}

impl SlackWebGateway {
    pub fn new(base_url: impl Into<String>, bot_token: SecretString) -> Self {
        Self::with_client(reqwest::Client::new(), base_url, bot_token)
    }

    pub fn with_client(
        http: reqwest::Client,
        base_url: impl Into<String>,
        bot_token: SecretString,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        Self { http, base_url, bot_token }
    }

    async fn call(&self, method: &'static str, body: &Value) -> Result<Value, GatewayError> {
        debug!(event_name = "egress.slack.request", method, "calling slack web api");

        let response = self
            .http
            .post(format!("{}/{method}", self.base_url))
            .bearer_auth(self.bot_token.expose_secret())
            .json(body)
            .send()
            .await
            .map_err(|error| GatewayError::Transport { method, detail: error.to_string() })?;

        let status = response.status();
        let payload: Value = response.json().await.map_err(|error| GatewayError::Transport {
            method,
            detail: format!("http {status}: {error}"),
        })?;

        check_ok(method, payload)
    }
}

#[async_trait]
impl MessagingGateway for SlackWebGateway {
    async fn auth_test(&self) -> Result<String, GatewayError> {
        const METHOD: &str = "auth.test";
        let payload = self.call(METHOD, &json!({})).await?;
        required_str(METHOD, &payload, "user_id")
    }

    async fn post_message(&self, message: &OutgoingMessage) -> Result<PostedMessage, GatewayError> {
        const METHOD: &str = "chat.postMessage";
        let body = serde_json::to_value(message)
            .map_err(|error| GatewayError::Transport { method: METHOD, detail: error.to_string() })?;
        let payload = self.call(METHOD, &body).await?;
        posted_message(METHOD, &payload)
    }

    async fn update_message(
        &self,
        channel: &str,
        ts: &str,
        template: &MessageTemplate,
    ) -> Result<PostedMessage, GatewayError> {
        const METHOD: &str = "chat.update";
        let body = json!({
            "channel": channel,
            "ts": ts,
            "text": template.fallback_text,
            "blocks": template.blocks,
        });
        let payload = self.call(METHOD, &body).await?;
        posted_message(METHOD, &payload)
    }

    async fn schedule_message(&self, spec: &ScheduledMessageSpec) -> Result<String, GatewayError> {
        const METHOD: &str = "chat.scheduleMessage";
        let body = json!({
            "channel": spec.channel_id,
            "text": spec.text,
            "post_at": spec.post_at,
        });
        let payload = self.call(METHOD, &body).await?;
        required_str(METHOD, &payload, "scheduled_message_id")
    }

    async fn list_scheduled_messages(&self, channel: &str) -> Result<Vec<String>, GatewayError> {
        const METHOD: &str = "chat.scheduledMessages.list";
        let mut ids = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut body = json!({ "channel": channel });
            if let Some(cursor) = &cursor {
                body["cursor"] = json!(cursor);
            }

            let payload = self.call(METHOD, &body).await?;
            ids.extend(scheduled_message_ids(METHOD, &payload)?);

            cursor = next_cursor(&payload);
            if cursor.is_none() {
                return Ok(ids);
            }
        }
    }

    async fn delete_scheduled_message(&self, channel: &str, id: &str) -> Result<(), GatewayError> {
        const METHOD: &str = "chat.deleteScheduledMessage";
        let body = json!({ "channel": channel, "scheduled_message_id": id });
        self.call(METHOD, &body).await.map(|_| ())
    }
}

fn check_ok(method: &'static str, payload: Value) -> Result<Value, GatewayError> {
    if payload.get("ok").and_then(Value::as_bool) == Some(true) {
        return Ok(payload);
    }

    let error = payload.get("error").and_then(Value::as_str).unwrap_or("unknown").to_owned();
    Err(GatewayError::Api { method, error })
}

fn required_str(
    method: &'static str,
    payload: &Value,
    field: &'static str,
) -> Result<String, GatewayError> {
    payload
        .get(field)
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
        .map(str::to_owned)
        .ok_or(GatewayError::MissingField { method, field })
}

fn posted_message(method: &'static str, payload: &Value) -> Result<PostedMessage, GatewayError> {
    Ok(PostedMessage {
        channel: required_str(method, payload, "channel")?,
        ts: required_str(method, payload, "ts")?,
    })
}

fn scheduled_message_ids(method: &'static str, payload: &Value) -> Result<Vec<String>, GatewayError> {
    let messages = payload
        .get("scheduled_messages")
        .and_then(Value::as_array)
        .ok_or(GatewayError::MissingField { method, field: "scheduled_messages" })?;

    Ok(messages
        .iter()
        .filter_map(|message| message.get("id").and_then(Value::as_str))
        .map(str::to_owned)
        .collect())
}

fn next_cursor(payload: &Value) -> Option<String> {
    payload
        .pointer("/response_metadata/next_cursor")
        .and_then(Value::as_str)
        .filter(|cursor| !cursor.is_empty())
        .map(str::to_owned)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GatewayCall {
    AuthTest,
    PostMessage(OutgoingMessage),
    UpdateMessage { channel: String, ts: String, template: MessageTemplate },
    ScheduleMessage(ScheduledMessageSpec),
    ListScheduledMessages { channel: String },
    DeleteScheduledMessage { channel: String, id: String },
}

/// In-memory gateway that records every call and keeps its own schedule.
///
/// Message timestamps are handed out from a counter, updates included, so a
/// caller that keeps the handle it was given before an update is detectable.
/// Scheduled messages stay listed until deleted, so listing right after
/// scheduling returns them.
pub struct RecordingGateway {
    bot_user_id: String,
    state: Mutex<RecordingState>,
}

#[derive(Default)]
struct RecordingState {
    calls: Vec<GatewayCall>,
    next_ts: u64,
    next_schedule_id: u64,
    scheduled: BTreeMap<String, ScheduledMessageSpec>,
    failing_methods: HashSet<&'static str>,
    failing_deletes: HashSet<String>,
}

impl Default for RecordingGateway {
    fn default() -> Self {
        Self::new("UBOT")
    }
}

impl RecordingGateway {
    pub fn new(bot_user_id: impl Into<String>) -> Self {
        Self { bot_user_id: bot_user_id.into(), state: Mutex::new(RecordingState::default()) }
    }

    /// Makes every call to `method` (a Slack method name) fail with an api error.
    pub async fn fail_method(&self, method: &'static str) {
        self.state.lock().await.failing_methods.insert(method);
    }

    /// Makes deleting the scheduled message `id` fail.
    pub async fn fail_delete(&self, id: impl Into<String>) {
        self.state.lock().await.failing_deletes.insert(id.into());
    }

    pub async fn calls(&self) -> Vec<GatewayCall> {
        self.state.lock().await.calls.clone()
    }

    pub async fn posted_messages(&self) -> Vec<OutgoingMessage> {
        self.calls()
            .await
            .into_iter()
            .filter_map(|call| match call {
                GatewayCall::PostMessage(message) => Some(message),
                _ => None,
            })
            .collect()
    }

    pub async fn updates(&self) -> Vec<(String, String, MessageTemplate)> {
        self.calls()
            .await
            .into_iter()
            .filter_map(|call| match call {
                GatewayCall::UpdateMessage { channel, ts, template } => Some((channel, ts, template)),
                _ => None,
            })
            .collect()
    }

    /// Messages still waiting for delivery.
    pub async fn pending_scheduled(&self) -> Vec<ScheduledMessageSpec> {
        self.state.lock().await.scheduled.values().cloned().collect()
    }
}

impl RecordingState {
    fn record(&mut self, method: &'static str, call: GatewayCall) -> Result<(), GatewayError> {
        self.calls.push(call);
        if self.failing_methods.contains(method) {
            return Err(GatewayError::Api { method, error: "scripted_failure".to_owned() });
        }
        Ok(())
    }

    fn issue_ts(&mut self) -> String {
        self.next_ts += 1;
        format!("1700000000.{:06}", self.next_ts)
    }
}

#[async_trait]
impl MessagingGateway for RecordingGateway {
    async fn auth_test(&self) -> Result<String, GatewayError> {
        let mut state = self.state.lock().await;
        state.record("auth.test", GatewayCall::AuthTest)?;
        Ok(self.bot_user_id.clone())
    }

    async fn post_message(&self, message: &OutgoingMessage) -> Result<PostedMessage, GatewayError> {
        let mut state = self.state.lock().await;
        state.record("chat.postMessage", GatewayCall::PostMessage(message.clone()))?;
        let ts = state.issue_ts();
        Ok(PostedMessage { channel: message.channel.clone(), ts })
    }

    async fn update_message(
        &self,
        channel: &str,
        ts: &str,
        template: &MessageTemplate,
    ) -> Result<PostedMessage, GatewayError> {
        let mut state = self.state.lock().await;
        state.record(
            "chat.update",
            GatewayCall::UpdateMessage {
                channel: channel.to_owned(),
                ts: ts.to_owned(),
                template: template.clone(),
            },
        )?;
        let ts = state.issue_ts();
        Ok(PostedMessage { channel: channel.to_owned(), ts })
    }

    async fn schedule_message(&self, spec: &ScheduledMessageSpec) -> Result<String, GatewayError> {
        let mut state = self.state.lock().await;
        state.record("chat.scheduleMessage", GatewayCall::ScheduleMessage(spec.clone()))?;
        state.next_schedule_id += 1;
        let id = format!("Q{:04}", state.next_schedule_id);
        state.scheduled.insert(id.clone(), spec.clone());
        Ok(id)
    }

    async fn list_scheduled_messages(&self, channel: &str) -> Result<Vec<String>, GatewayError> {
        let mut state = self.state.lock().await;
        state.record(
            "chat.scheduledMessages.list",
            GatewayCall::ListScheduledMessages { channel: channel.to_owned() },
        )?;
        Ok(state
            .scheduled
            .iter()
            .filter(|(_, spec)| spec.channel_id == channel)
            .map(|(id, _)| id.clone())
            .collect())
    }

    async fn delete_scheduled_message(&self, channel: &str, id: &str) -> Result<(), GatewayError> {
        let mut state = self.state.lock().await;
        state.record(
            "chat.deleteScheduledMessage",
            GatewayCall::DeleteScheduledMessage { channel: channel.to_owned(), id: id.to_owned() },
        )?;
        if state.failing_deletes.contains(id) {
            return Err(GatewayError::Api {
                method: "chat.deleteScheduledMessage",
                error: "invalid_scheduled_message_id".to_owned(),
            });
        }
        match state.scheduled.remove(id) {
            Some(_) => Ok(()),
            None => Err(GatewayError::Api {
                method: "chat.deleteScheduledMessage",
                error: "invalid_scheduled_message_id".to_owned(),
            }),
        }
    }
}
