use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use thiserror::Error;

use crate::{commands::CountQueryCommand, gateway::GatewayError};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlackEnvelope {
    pub envelope_id: String,
    pub event: SlackEvent,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SlackEvent {
    Message(MessageEvent),
    ReactionAdded(ReactionAddedEvent),
    CountQuery(CountQueryCommand),
    Unsupported { event_type: String },
}

impl SlackEvent {
    pub fn event_type(&self) -> SlackEventType {
        match self {
            Self::Message(_) => SlackEventType::Message,
            Self::ReactionAdded(_) => SlackEventType::ReactionAdded,
            Self::CountQuery(_) => SlackEventType::CountQuery,
            Self::Unsupported { .. } => SlackEventType::Unsupported,
        }
    }

    /// (channel, user) for log correlation.
    pub fn correlation_fields(&self) -> (Option<&str>, Option<&str>) {
        match self {
            Self::Message(event) => (Some(event.channel_id.as_str()), event.user_id.as_deref()),
            Self::ReactionAdded(event) => {
                (Some(event.channel_id.as_str()), Some(event.user_id.as_str()))
            }
            Self::CountQuery(command) => {
                (Some(command.channel_id.as_str()), Some(command.user_id.as_str()))
            }
            Self::Unsupported { .. } => (None, None),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SlackEventType {
    Message,
    ReactionAdded,
    CountQuery,
    Unsupported,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageEvent {
    pub channel_id: String,
    pub user_id: Option<String>,
    pub text: String,
    pub ts: String,
    pub subtype: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReactionAddedEvent {
    /// Channel of the message that was reacted to.
    pub channel_id: String,
    /// The user who reacted.
    pub user_id: String,
    pub reaction: String,
    pub message_ts: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub correlation_id: String,
}

impl Default for EventContext {
    fn default() -> Self {
        Self { correlation_id: "unknown-correlation-id".to_owned() }
    }
}

/// Something the bot did while handling an event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BotAction {
    MessageCounted { user_id: String, count: u64 },
    WelcomeSent { channel: String, ts: String },
    WelcomeAlreadySent,
    WelcomeCompleted { channel: String, ts: String },
    WelcomeAlreadyCompleted,
    WarningPosted { channel: String, thread_ts: String },
    CountReported { channel: String, count: u64 },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    Processed(Vec<BotAction>),
    Ignored,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventHandlerError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error(transparent)]
    Handler(#[from] EventHandlerError),
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn event_type(&self) -> SlackEventType;
    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<SlackEventType, Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&mut self, handler: H)
    where
        H: EventHandler + 'static,
    {
        self.handlers.insert(handler.event_type(), Arc::new(handler));
    }

    pub async fn dispatch(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, DispatchError> {
        let Some(handler) = self.handlers.get(&envelope.event.event_type()) else {
            return Ok(HandlerResult::Ignored);
        };

        handler.handle(envelope, ctx).await.map_err(DispatchError::from)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

/// Dispatcher with message, reaction and count-query handlers all backed by `service`.
pub fn bot_dispatcher<S>(service: Arc<S>) -> EventDispatcher
where
    S: MessageService + ReactionService + CountQueryService + 'static,
{
    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(MessageHandler::new(service.clone()));
    dispatcher.register(ReactionAddedHandler::new(service.clone()));
    dispatcher.register(CountQueryHandler::new(service));
    dispatcher
}

#[async_trait]
pub trait MessageService: Send + Sync {
    async fn handle_message(
        &self,
        event: &MessageEvent,
        ctx: &EventContext,
    ) -> Result<Vec<BotAction>, EventHandlerError>;
}

pub struct MessageHandler<S> {
    service: Arc<S>,
}

impl<S> MessageHandler<S>
where
    S: MessageService,
{
    pub fn new(service: Arc<S>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl<S> EventHandler for MessageHandler<S>
where
    S: MessageService + 'static,
{
    fn event_type(&self) -> SlackEventType {
        SlackEventType::Message
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::Message(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        self.service.handle_message(event, ctx).await.map(HandlerResult::Processed)
    }
}

#[async_trait]
pub trait ReactionService: Send + Sync {
    async fn handle_reaction(
        &self,
        event: &ReactionAddedEvent,
        ctx: &EventContext,
    ) -> Result<Vec<BotAction>, EventHandlerError>;
}

pub struct ReactionAddedHandler<S> {
    service: Arc<S>,
}

impl<S> ReactionAddedHandler<S>
where
    S: ReactionService,
{
    pub fn new(service: Arc<S>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl<S> EventHandler for ReactionAddedHandler<S>
where
    S: ReactionService + 'static,
{
    fn event_type(&self) -> SlackEventType {
        SlackEventType::ReactionAdded
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::ReactionAdded(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        self.service.handle_reaction(event, ctx).await.map(HandlerResult::Processed)
    }
}

#[async_trait]
pub trait CountQueryService: Send + Sync {
    async fn handle_count_query(
        &self,
        command: &CountQueryCommand,
        ctx: &EventContext,
    ) -> Result<Vec<BotAction>, EventHandlerError>;
}

pub struct CountQueryHandler<S> {
    service: Arc<S>,
}

impl<S> CountQueryHandler<S>
where
    S: CountQueryService,
{
    pub fn new(service: Arc<S>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl<S> EventHandler for CountQueryHandler<S>
where
    S: CountQueryService + 'static,
{
    fn event_type(&self) -> SlackEventType {
        SlackEventType::CountQuery
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::CountQuery(command) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        self.service.handle_count_query(command, ctx).await.map(HandlerResult::Processed)
    }
}
