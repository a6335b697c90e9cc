//! Events API request bodies, validated into typed [`SlackEvent`]s.

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::events::{MessageEvent, ReactionAddedEvent, SlackEnvelope, SlackEvent};

/// Envelope id used when a callback carries no `event_id`.
pub const UNKNOWN_EVENT_ID: &str = "unknown-event-id";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InboundPayload {
    /// Endpoint ownership check sent when the request URL is configured.
    UrlVerification { challenge: String },
    Event(SlackEnvelope),
    /// Envelope types the bot has no use for (`app_rate_limited`, ...).
    Ignored { payload_type: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventParseError {
    #[error("payload is not valid json: {0}")]
    InvalidJson(String),
    #[error("payload is missing `{0}`")]
    MissingField(&'static str),
}

#[derive(Debug, Deserialize)]
struct RawEnvelope {
    #[serde(rename = "type")]
    kind: String,
    challenge: Option<String>,
    event_id: Option<String>,
    event: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    channel: Option<String>,
    user: Option<String>,
    text: Option<String>,
    ts: Option<String>,
    subtype: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawReaction {
    user: Option<String>,
    reaction: Option<String>,
    item: Option<RawReactionItem>,
}

#[derive(Debug, Deserialize)]
struct RawReactionItem {
    #[serde(rename = "type")]
    kind: Option<String>,
    channel: Option<String>,
    ts: Option<String>,
}

pub fn parse_events_api_payload(body: &str) -> Result<InboundPayload, EventParseError> {
    let raw: RawEnvelope =
        serde_json::from_str(body).map_err(|error| EventParseError::InvalidJson(error.to_string()))?;

    match raw.kind.as_str() {
        "url_verification" => {
            let challenge = raw.challenge.ok_or(EventParseError::MissingField("challenge"))?;
            Ok(InboundPayload::UrlVerification { challenge })
        }
        "event_callback" => {
            let event = raw.event.ok_or(EventParseError::MissingField("event"))?;
            let envelope_id = raw.event_id.unwrap_or_else(|| UNKNOWN_EVENT_ID.to_owned());
            Ok(InboundPayload::Event(SlackEnvelope { envelope_id, event: parse_event(event)? }))
        }
        other => Ok(InboundPayload::Ignored { payload_type: other.to_owned() }),
    }
}

fn parse_event(value: Value) -> Result<SlackEvent, EventParseError> {
    let event_type = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(EventParseError::MissingField("event.type"))?
        .to_owned();

    match event_type.as_str() {
        "message" => parse_message(value).map(SlackEvent::Message),
        "reaction_added" => parse_reaction(value),
        _ => Ok(SlackEvent::Unsupported { event_type }),
    }
}

fn parse_message(value: Value) -> Result<MessageEvent, EventParseError> {
    let raw: RawMessage = serde_json::from_value(value)
        .map_err(|error| EventParseError::InvalidJson(error.to_string()))?;

    Ok(MessageEvent {
        channel_id: raw.channel.ok_or(EventParseError::MissingField("event.channel"))?,
        user_id: raw.user.filter(|user| !user.is_empty()),
        text: raw.text.unwrap_or_default(),
        ts: raw.ts.ok_or(EventParseError::MissingField("event.ts"))?,
        subtype: raw.subtype,
    })
}

fn parse_reaction(value: Value) -> Result<SlackEvent, EventParseError> {
    let raw: RawReaction = serde_json::from_value(value)
        .map_err(|error| EventParseError::InvalidJson(error.to_string()))?;
    let item = raw.item.ok_or(EventParseError::MissingField("event.item"))?;

    // Reactions on files carry no channel; only message reactions matter here.
    let item_kind = item.kind.as_deref().unwrap_or("message");
    if item_kind != "message" {
        return Ok(SlackEvent::Unsupported { event_type: format!("reaction_added:{item_kind}") });
    }

    Ok(SlackEvent::ReactionAdded(ReactionAddedEvent {
        channel_id: item.channel.ok_or(EventParseError::MissingField("event.item.channel"))?,
        user_id: raw.user.ok_or(EventParseError::MissingField("event.user"))?,
        reaction: raw.reaction.unwrap_or_default(),
        message_ts: item.ts,
    }))
}
