use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info};
use welcomebot_core::{config::AppConfig, welcome_channel_key, MessageCounter, ProfanityFilter};

use crate::{
    blocks::message_count_text,
    commands::CountQueryCommand,
    events::{
        BotAction, CountQueryService, EventContext, EventHandlerError, MessageEvent,
        MessageService, ReactionAddedEvent, ReactionService,
    },
    gateway::{MessagingGateway, OutgoingMessage},
    welcome::{BotPersona, WelcomeOutcome, WelcomeTracker},
};

const START_KEYWORD: &str = "start";

#[derive(Clone, Debug)]
pub struct BotSettings {
    pub persona: BotPersona,
    pub filter: ProfanityFilter,
    pub warning_text: String,
}

impl Default for BotSettings {
    fn default() -> Self {
        Self {
            persona: BotPersona::default(),
            filter: ProfanityFilter::default(),
            warning_text: welcomebot_core::config::DEFAULT_WARNING_TEXT.to_owned(),
        }
    }
}

impl From<&AppConfig> for BotSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            persona: BotPersona {
                username: config.onboarding.username.clone(),
                icon_emoji: config.onboarding.icon_emoji.clone(),
            },
            filter: ProfanityFilter::new(&config.moderation.banned_words),
            warning_text: config.moderation.warning_text.clone(),
        }
    }
}

/// The bot's in-process state: welcome tracker, message counts and moderation.
pub struct BotRuntime {
    bot_user_id: String,
    gateway: Arc<dyn MessagingGateway>,
    welcome: WelcomeTracker,
    counter: Mutex<MessageCounter>,
    filter: ProfanityFilter,
    warning_text: String,
}

impl BotRuntime {
    pub fn new(
        gateway: Arc<dyn MessagingGateway>,
        bot_user_id: impl Into<String>,
        settings: BotSettings,
    ) -> Self {
        Self {
            bot_user_id: bot_user_id.into(),
            welcome: WelcomeTracker::new(gateway.clone(), settings.persona),
            gateway,
            counter: Mutex::new(MessageCounter::new()),
            filter: settings.filter,
            warning_text: settings.warning_text,
        }
    }

    pub fn bot_user_id(&self) -> &str {
        &self.bot_user_id
    }

    pub fn welcome(&self) -> &WelcomeTracker {
        &self.welcome
    }

    pub async fn message_count(&self, user_id: &str) -> u64 {
        self.counter.lock().await.count(user_id)
    }

    pub async fn tracked_users(&self) -> usize {
        self.counter.lock().await.tracked_users()
    }
}

#[async_trait]
impl MessageService for BotRuntime {
    async fn handle_message(
        &self,
        event: &MessageEvent,
        ctx: &EventContext,
    ) -> Result<Vec<BotAction>, EventHandlerError> {
        let Some(count) =
            self.counter.lock().await.record_message(event.user_id.as_deref(), &self.bot_user_id)
        else {
            debug!(
                correlation_id = %ctx.correlation_id,
                channel = %event.channel_id,
                subtype = event.subtype.as_deref().unwrap_or("none"),
                "skipping message from the bot or without a user"
            );
            return Ok(Vec::new());
        };
        let user_id = event.user_id.as_deref().unwrap_or_default();
        let mut actions = vec![BotAction::MessageCounted { user_id: user_id.to_owned(), count }];

        if event.text.to_lowercase() == START_KEYWORD {
            let outcome =
                self.welcome.start_welcome(&welcome_channel_key(user_id), user_id).await?;
            actions.push(match outcome {
                WelcomeOutcome::Sent(posted) => {
                    BotAction::WelcomeSent { channel: posted.channel, ts: posted.ts }
                }
                _ => BotAction::WelcomeAlreadySent,
            });
        } else if self.filter.contains_banned_word(&event.text) {
            let warning = OutgoingMessage::text(&event.channel_id, &self.warning_text)
                .in_thread(&event.ts);
            self.gateway.post_message(&warning).await?;
            info!(
                event_name = "moderation.warning_posted",
                correlation_id = %ctx.correlation_id,
                channel = %event.channel_id,
                user_id,
                thread_ts = %event.ts,
                "posted banned word warning"
            );
            actions.push(BotAction::WarningPosted {
                channel: event.channel_id.clone(),
                thread_ts: event.ts.clone(),
            });
        }

        Ok(actions)
    }
}

#[async_trait]
impl ReactionService for BotRuntime {
    async fn handle_reaction(
        &self,
        event: &ReactionAddedEvent,
        ctx: &EventContext,
    ) -> Result<Vec<BotAction>, EventHandlerError> {
        let outcome = self.welcome.complete_welcome(&event.channel_id, &event.user_id).await?;
        Ok(match outcome {
            WelcomeOutcome::Completed(posted) => {
                vec![BotAction::WelcomeCompleted { channel: posted.channel, ts: posted.ts }]
            }
            WelcomeOutcome::AlreadyCompleted => vec![BotAction::WelcomeAlreadyCompleted],
            _ => {
                debug!(
                    correlation_id = %ctx.correlation_id,
                    user_id = %event.user_id,
                    reaction = %event.reaction,
                    "reaction from user without a welcome message"
                );
                Vec::new()
            }
        })
    }
}

#[async_trait]
impl CountQueryService for BotRuntime {
    async fn handle_count_query(
        &self,
        command: &CountQueryCommand,
        ctx: &EventContext,
    ) -> Result<Vec<BotAction>, EventHandlerError> {
        let count = self.message_count(&command.user_id).await;
        let reply = OutgoingMessage::text(&command.channel_id, message_count_text(count));
        self.gateway.post_message(&reply).await?;

        info!(
            event_name = "count.reported",
            correlation_id = %ctx.correlation_id,
            channel = %command.channel_id,
            user_id = %command.user_id,
            count,
            "reported message count"
        );
        Ok(vec![BotAction::CountReported { channel: command.channel_id.clone(), count }])
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{BotRuntime, BotSettings};
    use crate::{
        blocks::{Block, CHECKED_GLYPH},
        commands::CountQueryCommand,
        events::{
            bot_dispatcher, BotAction, EventContext, EventDispatcher, HandlerResult, MessageEvent,
            ReactionAddedEvent, SlackEnvelope, SlackEvent,
        },
        gateway::{GatewayCall, RecordingGateway},
    };

    const BOT: &str = "UBOT";

    fn setup() -> (Arc<RecordingGateway>, Arc<BotRuntime>, EventDispatcher) {
        let gateway = Arc::new(RecordingGateway::new(BOT));
        let runtime = Arc::new(BotRuntime::new(gateway.clone(), BOT, BotSettings::default()));
        let dispatcher = bot_dispatcher(runtime.clone());
        (gateway, runtime, dispatcher)
    }

    fn message(user: Option<&str>, text: &str, ts: &str) -> SlackEnvelope {
        SlackEnvelope {
            envelope_id: format!("Ev-{ts}"),
            event: SlackEvent::Message(MessageEvent {
                channel_id: "C1".to_owned(),
                user_id: user.map(str::to_owned),
                text: text.to_owned(),
                ts: ts.to_owned(),
                subtype: None,
            }),
        }
    }

    fn reaction(user: &str, channel: &str) -> SlackEnvelope {
        SlackEnvelope {
            envelope_id: "Ev-reaction".to_owned(),
            event: SlackEvent::ReactionAdded(ReactionAddedEvent {
                channel_id: channel.to_owned(),
                user_id: user.to_owned(),
                reaction: "thumbsup".to_owned(),
                message_ts: None,
            }),
        }
    }

    fn count_query(user: &str) -> SlackEnvelope {
        SlackEnvelope {
            envelope_id: "cmd-1".to_owned(),
            event: SlackEvent::CountQuery(CountQueryCommand {
                user_id: user.to_owned(),
                channel_id: "C5".to_owned(),
            }),
        }
    }

    async fn dispatch(dispatcher: &EventDispatcher, envelope: SlackEnvelope) -> HandlerResult {
        dispatcher.dispatch(&envelope, &EventContext::default()).await.expect("dispatch")
    }

    #[tokio::test]
    async fn counts_user_messages_and_skips_bot_and_anonymous() {
        let (gateway, runtime, dispatcher) = setup();

        for n in 0..4 {
            dispatch(&dispatcher, message(Some("U1"), "hello", &format!("{n}.0"))).await;
        }
        let bot = dispatch(&dispatcher, message(Some(BOT), "hello", "9.0")).await;
        let anonymous = dispatch(&dispatcher, message(None, "hello", "9.1")).await;

        assert_eq!(runtime.message_count("U1").await, 4);
        assert_eq!(runtime.message_count(BOT).await, 0);
        assert_eq!(bot, HandlerResult::Processed(Vec::new()));
        assert_eq!(anonymous, HandlerResult::Processed(Vec::new()));
        assert!(gateway.calls().await.is_empty());
    }

    #[tokio::test]
    async fn start_keyword_sends_one_welcome_per_user() {
        let (gateway, runtime, dispatcher) = setup();

        let first = dispatch(&dispatcher, message(Some("U1"), "START", "1.0")).await;
        let second = dispatch(&dispatcher, message(Some("U1"), "start", "2.0")).await;

        assert!(matches!(
            first,
            HandlerResult::Processed(ref actions)
                if matches!(actions.last(), Some(BotAction::WelcomeSent { channel, .. }) if channel == "@U1")
        ));
        assert!(matches!(
            second,
            HandlerResult::Processed(ref actions) if actions.last() == Some(&BotAction::WelcomeAlreadySent)
        ));
        assert_eq!(gateway.posted_messages().await.len(), 1);
        assert_eq!(runtime.message_count("U1").await, 2, "start messages still count");
    }

    #[tokio::test]
    async fn start_must_be_the_whole_message() {
        let (gateway, _runtime, dispatcher) = setup();

        dispatch(&dispatcher, message(Some("U1"), "let's start", "1.0")).await;

        assert!(gateway.posted_messages().await.is_empty());
    }

    #[tokio::test]
    async fn banned_word_gets_threaded_warning() {
        let (gateway, _runtime, dispatcher) = setup();

        let result = dispatch(&dispatcher, message(Some("U1"), "You Bozo!!", "42.0")).await;

        let posted = gateway.posted_messages().await;
        assert_eq!(posted.len(), 1);
        assert_eq!(posted[0].channel, "C1");
        assert_eq!(posted[0].text, "That is a bad word");
        assert_eq!(posted[0].thread_ts.as_deref(), Some("42.0"));
        assert!(matches!(
            result,
            HandlerResult::Processed(ref actions)
                if actions.contains(&BotAction::WarningPosted { channel: "C1".to_owned(), thread_ts: "42.0".to_owned() })
        ));
    }

    #[tokio::test]
    async fn reaction_completes_welcome_in_place() {
        let (gateway, runtime, dispatcher) = setup();
        dispatch(&dispatcher, message(Some("U1"), "start", "1.0")).await;
        let handle = runtime.welcome().state("@U1", "U1").await.expect("registered").message_ts;

        let result = dispatch(&dispatcher, reaction("U1", "D77")).await;

        assert!(matches!(
            result,
            HandlerResult::Processed(ref actions)
                if matches!(actions.as_slice(), [BotAction::WelcomeCompleted { channel, .. }] if channel == "D77")
        ));
        let updates = gateway.updates().await;
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].1, handle);
        assert!(matches!(
            updates[0].2.blocks.last(),
            Some(Block::Section { text, .. }) if text.text().starts_with(CHECKED_GLYPH)
        ));
    }

    #[tokio::test]
    async fn reaction_from_unknown_user_makes_no_calls() {
        let (gateway, _runtime, dispatcher) = setup();

        let result = dispatch(&dispatcher, reaction("U404", "C1")).await;

        assert_eq!(result, HandlerResult::Processed(Vec::new()));
        assert!(gateway.calls().await.is_empty());
    }

    #[tokio::test]
    async fn count_query_posts_count_to_requesting_channel() {
        let (gateway, _runtime, dispatcher) = setup();
        dispatch(&dispatcher, message(Some("U1"), "one", "1.0")).await;
        dispatch(&dispatcher, message(Some("U1"), "two", "2.0")).await;

        dispatch(&dispatcher, count_query("U1")).await;
        dispatch(&dispatcher, count_query("U2")).await;

        let texts = gateway
            .posted_messages()
            .await
            .into_iter()
            .map(|message| (message.channel, message.text))
            .collect::<Vec<_>>();
        assert_eq!(
            texts,
            vec![
                ("C5".to_owned(), "Message: 2".to_owned()),
                ("C5".to_owned(), "Message: 0".to_owned())
            ]
        );
    }

    #[tokio::test]
    async fn failed_warning_post_aborts_only_that_event() {
        let (gateway, runtime, dispatcher) = setup();
        gateway.fail_method("chat.postMessage").await;

        let failed =
            dispatcher.dispatch(&message(Some("U1"), "crap", "1.0"), &EventContext::default()).await;
        assert!(failed.is_err());

        dispatch(&dispatcher, message(Some("U1"), "fine", "2.0")).await;
        assert_eq!(runtime.message_count("U1").await, 2, "count recorded before the failing call");
        assert!(matches!(gateway.calls().await.first(), Some(GatewayCall::PostMessage(_))));
    }
}
