use std::{
    collections::{HashSet, VecDeque},
    sync::Arc,
};

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
    Form, Json, Router,
};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use welcomebot_slack::{
    commands::{parse_count_query, SlashCommandPayload},
    events::{EventContext, EventDispatcher, HandlerResult, SlackEnvelope, SlackEvent},
    payload::{parse_events_api_payload, InboundPayload, UNKNOWN_EVENT_ID},
};

const SEEN_EVENT_CAPACITY: usize = 4096;
const RETRY_NUM_HEADER: &str = "x-slack-retry-num";

#[derive(Clone)]
pub struct WebhookState {
    pub dispatcher: Arc<EventDispatcher>,
    seen: Arc<Mutex<SeenEvents>>,
}

impl WebhookState {
    pub fn new(dispatcher: Arc<EventDispatcher>) -> Self {
        Self { dispatcher, seen: Arc::new(Mutex::new(SeenEvents::new(SEEN_EVENT_CAPACITY))) }
    }
}

/// Event ids already claimed for dispatch, oldest evicted first.
///
/// Slack redelivers a callback with the same `event_id` when it gets no 2xx
/// in time; a claimed id is acknowledged without running the handlers again.
struct SeenEvents {
    capacity: usize,
    order: VecDeque<String>,
    ids: HashSet<String>,
}

impl SeenEvents {
    fn new(capacity: usize) -> Self {
        Self { capacity: capacity.max(1), order: VecDeque::new(), ids: HashSet::new() }
    }

    /// Returns `false` when `event_id` was already claimed.
    fn claim(&mut self, event_id: &str) -> bool {
        if self.ids.contains(event_id) {
            return false;
        }

        if self.order.len() == self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
        self.order.push_back(event_id.to_owned());
        self.ids.insert(event_id.to_owned());
        true
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum WebhookResponse {
    Challenge { challenge: String },
    Ack { ok: bool },
    Error { error: String },
}

pub fn router(state: WebhookState) -> Router {
    Router::new()
        .route("/slack/events", post(slack_events))
        .route("/message-count", post(message_count))
        .with_state(state)
}

pub async fn slack_events(
    State(state): State<WebhookState>,
    headers: HeaderMap,
    body: String,
) -> (StatusCode, Json<WebhookResponse>) {
    let envelope = match parse_events_api_payload(&body) {
        Ok(InboundPayload::UrlVerification { challenge }) => {
            info!(
                event_name = "ingress.slack.url_verification",
                correlation_id = "url_verification",
                "answering url verification challenge"
            );
            return (StatusCode::OK, Json(WebhookResponse::Challenge { challenge }));
        }
        Ok(InboundPayload::Ignored { payload_type }) => {
            info!(
                event_name = "ingress.slack.ignored",
                correlation_id = "unknown",
                payload_type = %payload_type,
                "ignoring events api payload"
            );
            return (StatusCode::OK, Json(WebhookResponse::Ack { ok: true }));
        }
        Ok(InboundPayload::Event(envelope)) => envelope,
        Err(parse_error) => {
            warn!(
                event_name = "ingress.slack.rejected",
                correlation_id = "unknown",
                error = %parse_error,
                "rejecting malformed events api payload"
            );
            return (
                StatusCode::BAD_REQUEST,
                Json(WebhookResponse::Error { error: parse_error.to_string() }),
            );
        }
    };

    if envelope.envelope_id != UNKNOWN_EVENT_ID
        && !state.seen.lock().await.claim(&envelope.envelope_id)
    {
        let retry_num = headers.get(RETRY_NUM_HEADER).and_then(|value| value.to_str().ok());
        debug!(
            event_name = "ingress.slack.duplicate",
            correlation_id = %envelope.envelope_id,
            retry_num = retry_num.unwrap_or("none"),
            "acknowledging redelivered event without dispatch"
        );
        return (StatusCode::OK, Json(WebhookResponse::Ack { ok: true }));
    }

    let ctx = EventContext { correlation_id: envelope.envelope_id.clone() };
    dispatch_envelope(&state.dispatcher, &envelope, &ctx).await
}

/// Slash command endpoint; the count itself is posted to the channel, so the
/// command response body stays empty.
pub async fn message_count(
    State(state): State<WebhookState>,
    Form(payload): Form<SlashCommandPayload>,
) -> StatusCode {
    let correlation_id = format!("cmd-{}", Uuid::new_v4().simple());
    let command = match parse_count_query(payload) {
        Ok(command) => command,
        Err(parse_error) => {
            warn!(
                event_name = "ingress.slack.command_rejected",
                correlation_id = %correlation_id,
                error = %parse_error,
                "rejecting count query"
            );
            return StatusCode::BAD_REQUEST;
        }
    };

    let envelope = SlackEnvelope {
        envelope_id: correlation_id.clone(),
        event: SlackEvent::CountQuery(command),
    };
    let ctx = EventContext { correlation_id };
    dispatch_envelope(&state.dispatcher, &envelope, &ctx).await.0
}

async fn dispatch_envelope(
    dispatcher: &EventDispatcher,
    envelope: &SlackEnvelope,
    ctx: &EventContext,
) -> (StatusCode, Json<WebhookResponse>) {
    let (channel, user_id) = envelope.event.correlation_fields();
    info!(
        event_name = "ingress.slack.event_received",
        correlation_id = %ctx.correlation_id,
        event_type = ?envelope.event.event_type(),
        channel = channel.unwrap_or("unknown"),
        user_id = user_id.unwrap_or("unknown"),
        "slack event received"
    );

    match dispatcher.dispatch(envelope, ctx).await {
        Ok(HandlerResult::Processed(actions)) => {
            info!(
                event_name = "ingress.slack.event_processed",
                correlation_id = %ctx.correlation_id,
                actions = ?actions,
                "slack event processed"
            );
            (StatusCode::OK, Json(WebhookResponse::Ack { ok: true }))
        }
        Ok(HandlerResult::Ignored) => {
            (StatusCode::OK, Json(WebhookResponse::Ack { ok: true }))
        }
        Err(dispatch_error) => {
            error!(
                event_name = "ingress.slack.event_failed",
                correlation_id = %ctx.correlation_id,
                error = %dispatch_error,
                "slack event handling failed"
            );
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(WebhookResponse::Error { error: dispatch_error.to_string() }),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        extract::State,
        http::{header, HeaderMap, HeaderValue, Request, StatusCode},
        Form, Json,
    };
    use serde_json::json;
    use tower::ServiceExt;
    use welcomebot_slack::{
        bot::{BotRuntime, BotSettings},
        commands::SlashCommandPayload,
        events::bot_dispatcher,
        gateway::RecordingGateway,
    };

    use super::{message_count, router, slack_events, SeenEvents, WebhookResponse, WebhookState};

    fn setup() -> (Arc<RecordingGateway>, Arc<BotRuntime>, WebhookState) {
        let gateway = Arc::new(RecordingGateway::new("UBOT"));
        let runtime = Arc::new(BotRuntime::new(gateway.clone(), "UBOT", BotSettings::default()));
        let state = WebhookState::new(Arc::new(bot_dispatcher(runtime.clone())));
        (gateway, runtime, state)
    }

    fn message_body(user: &str, text: &str, ts: &str) -> String {
        json!({
            "type": "event_callback",
            "event_id": format!("Ev-{ts}"),
            "event": {"type": "message", "channel": "C1", "user": user, "text": text, "ts": ts}
        })
        .to_string()
    }

    #[tokio::test]
    async fn url_verification_echoes_challenge() {
        let (_gateway, _runtime, state) = setup();
        let body = json!({"type": "url_verification", "challenge": "c-123"}).to_string();

        let (status, Json(response)) = slack_events(State(state), HeaderMap::new(), body).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(response, WebhookResponse::Challenge { challenge: "c-123".to_owned() });
        assert_eq!(
            serde_json::to_value(&response).expect("serialize"),
            json!({"challenge": "c-123"})
        );
    }

    #[tokio::test]
    async fn message_events_drive_the_bot() {
        let (gateway, runtime, state) = setup();

        let (status, _) =
            slack_events(State(state.clone()), HeaderMap::new(), message_body("U1", "start", "1.0"))
                .await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) =
            slack_events(State(state), HeaderMap::new(), message_body("U1", "bum", "2.0")).await;
        assert_eq!(status, StatusCode::OK);

        assert_eq!(runtime.message_count("U1").await, 2);
        assert!(runtime.welcome().is_registered("U1").await);
        let posted = gateway.posted_messages().await;
        assert_eq!(posted.len(), 2);
        assert_eq!(posted[1].thread_ts.as_deref(), Some("2.0"));
    }

    #[tokio::test]
    async fn malformed_payload_is_bad_request() {
        let (_gateway, _runtime, state) = setup();

        let (status, Json(response)) =
            slack_events(State(state), HeaderMap::new(), "{".to_owned()).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(matches!(response, WebhookResponse::Error { .. }));
    }

    #[tokio::test]
    async fn gateway_failure_returns_server_error() {
        let (gateway, _runtime, state) = setup();
        gateway.fail_method("chat.postMessage").await;

        let (status, Json(response)) =
            slack_events(State(state), HeaderMap::new(), message_body("U1", "start", "1.0")).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(matches!(response, WebhookResponse::Error { ref error } if error.contains("chat.postMessage")));
    }

    #[tokio::test]
    async fn unknown_event_types_are_acknowledged() {
        let (gateway, _runtime, state) = setup();
        let body = json!({
            "type": "event_callback",
            "event_id": "Ev9",
            "event": {"type": "member_joined_channel", "user": "U1", "channel": "C1"}
        })
        .to_string();

        let (status, Json(response)) = slack_events(State(state), HeaderMap::new(), body).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(response, WebhookResponse::Ack { ok: true });
        assert!(gateway.calls().await.is_empty());
    }

    #[tokio::test]
    async fn message_count_posts_count_and_acks_empty() {
        let (gateway, _runtime, state) = setup();
        slack_events(State(state.clone()), HeaderMap::new(), message_body("U1", "hi", "1.0")).await;

        let status = message_count(
            State(state),
            Form(SlashCommandPayload {
                command: "/message-count".to_owned(),
                user_id: "U1".to_owned(),
                channel_id: "C2".to_owned(),
                ..SlashCommandPayload::default()
            }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let posted = gateway.posted_messages().await;
        assert_eq!(posted.len(), 1);
        assert_eq!(posted[0].channel, "C2");
        assert_eq!(posted[0].text, "Message: 1");
    }

    #[tokio::test]
    async fn message_count_without_user_is_rejected() {
        let (gateway, _runtime, state) = setup();

        let status = message_count(
            State(state),
            Form(SlashCommandPayload { channel_id: "C2".to_owned(), ..SlashCommandPayload::default() }),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(gateway.calls().await.is_empty());
    }

    #[tokio::test]
    async fn redelivered_event_is_counted_once() {
        let (gateway, runtime, state) = setup();
        gateway.fail_method("chat.postMessage").await;
        let body = message_body("U1", "bozo", "1.0");

        let (first, _) = slack_events(State(state.clone()), HeaderMap::new(), body.clone()).await;
        let mut retry_headers = HeaderMap::new();
        retry_headers.insert("x-slack-retry-num", HeaderValue::from_static("1"));
        let (second, _) = slack_events(State(state.clone()), retry_headers, body.clone()).await;
        let (third, _) = slack_events(State(state), HeaderMap::new(), body).await;

        assert_eq!(first, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(second, StatusCode::OK);
        assert_eq!(third, StatusCode::OK);
        assert_eq!(runtime.message_count("U1").await, 1);
        assert_eq!(gateway.posted_messages().await.len(), 1, "warning attempted once");
    }

    #[tokio::test]
    async fn distinct_events_with_same_text_both_count() {
        let (_gateway, runtime, state) = setup();

        slack_events(State(state.clone()), HeaderMap::new(), message_body("U1", "hi", "1.0")).await;
        slack_events(State(state), HeaderMap::new(), message_body("U1", "hi", "2.0")).await;

        assert_eq!(runtime.message_count("U1").await, 2);
    }

    #[tokio::test]
    async fn events_without_id_are_not_deduplicated() {
        let (_gateway, runtime, state) = setup();
        let body = json!({
            "type": "event_callback",
            "event": {"type": "message", "channel": "C1", "user": "U1", "text": "hi", "ts": "1.0"}
        })
        .to_string();

        slack_events(State(state.clone()), HeaderMap::new(), body.clone()).await;
        slack_events(State(state), HeaderMap::new(), body).await;

        assert_eq!(runtime.message_count("U1").await, 2);
    }

    #[test]
    fn seen_events_evict_oldest_past_capacity() {
        let mut seen = SeenEvents::new(2);

        assert!(seen.claim("Ev1"));
        assert!(seen.claim("Ev2"));
        assert!(!seen.claim("Ev1"));
        assert!(seen.claim("Ev3"));

        assert!(seen.claim("Ev1"), "evicted id can be claimed again");
        assert!(!seen.claim("Ev3"));
    }

    #[tokio::test]
    async fn router_accepts_form_encoded_count_query() {
        let (gateway, _runtime, state) = setup();

        let response = router(state)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/message-count")
                    .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(Body::from("command=%2Fmessage-count&user_id=U7&channel_id=C3"))
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        assert!(body.is_empty());
        assert_eq!(gateway.posted_messages().await[0].text, "Message: 0");
    }
}
