use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};
use welcomebot_core::{welcome_channel_key, WelcomeRegistry, WelcomeState, WelcomeStatus};

use crate::{
    blocks::welcome_message,
    gateway::{GatewayError, MessagingGateway, OutgoingMessage, PostedMessage},
};

/// Username and icon the welcome message is posted under.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BotPersona {
    pub username: String,
    pub icon_emoji: String,
}

impl Default for BotPersona {
    fn default() -> Self {
        Self {
            username: welcomebot_core::config::DEFAULT_WELCOME_USERNAME.to_owned(),
            icon_emoji: welcomebot_core::welcome::WELCOME_ICON_EMOJI.to_owned(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WelcomeOutcome {
    Sent(PostedMessage),
    AlreadyRegistered,
    Completed(PostedMessage),
    AlreadyCompleted,
    NotRegistered,
}

/// Owns every welcome message and keeps Slack in sync with it.
///
/// The registry lock is held across the gateway call, so welcome operations
/// run one at a time: a state is only committed after Slack accepted the
/// matching render, and completions apply in arrival order.
pub struct WelcomeTracker {
    gateway: Arc<dyn MessagingGateway>,
    persona: BotPersona,
    registry: Mutex<WelcomeRegistry>,
}

impl WelcomeTracker {
    pub fn new(gateway: Arc<dyn MessagingGateway>, persona: BotPersona) -> Self {
        Self { gateway, persona, registry: Mutex::new(WelcomeRegistry::new()) }
    }

    pub async fn start_welcome(
        &self,
        channel_key: &str,
        user_id: &str,
    ) -> Result<WelcomeOutcome, GatewayError> {
        let mut registry = self.registry.lock().await;
        if registry.contains(channel_key, user_id) {
            debug!(
                event_name = "welcome.duplicate_start",
                channel = channel_key,
                user_id,
                "welcome already sent; ignoring start"
            );
            return Ok(WelcomeOutcome::AlreadyRegistered);
        }

        let mut state = WelcomeState {
            icon_emoji: self.persona.icon_emoji.clone(),
            ..WelcomeState::new(channel_key, user_id)
        };
        let message = OutgoingMessage::from_template(channel_key, &welcome_message(&state))
            .with_persona(self.persona.username.clone(), state.icon_emoji.clone());
        let posted = self.gateway.post_message(&message).await?;
        state.message_ts = posted.ts.clone();

        if registry.register(channel_key, state).is_err() {
            return Ok(WelcomeOutcome::AlreadyRegistered);
        }

        info!(
            event_name = "welcome.sent",
            channel = channel_key,
            user_id,
            message_ts = %posted.ts,
            "welcome message sent"
        );
        Ok(WelcomeOutcome::Sent(posted))
    }

    /// Ticks the reaction task for `user_id`.
    ///
    /// The state is looked up under the user's registration key; the channel
    /// of the completing event replaces the stored channel and is where the
    /// update is sent. The handle Slack returns for the update is stored.
    pub async fn complete_welcome(
        &self,
        event_channel_id: &str,
        user_id: &str,
    ) -> Result<WelcomeOutcome, GatewayError> {
        let channel_key = welcome_channel_key(user_id);
        let mut registry = self.registry.lock().await;
        let Some(current) = registry.get(&channel_key, user_id) else {
            return Ok(WelcomeOutcome::NotRegistered);
        };
        match current.status() {
            WelcomeStatus::Pending => {}
            WelcomeStatus::Completed => return Ok(WelcomeOutcome::AlreadyCompleted),
            // No message handle to update yet.
            WelcomeStatus::NotStarted => return Ok(WelcomeOutcome::NotRegistered),
        }

        let mut next = current.completed_in(event_channel_id);

        let posted = self
            .gateway
            .update_message(&next.channel_id, &next.message_ts, &welcome_message(&next))
            .await?;
        next.message_ts = posted.ts.clone();
        registry.replace(&channel_key, next);

        info!(
            event_name = "welcome.completed",
            channel = event_channel_id,
            user_id,
            message_ts = %posted.ts,
            "welcome checklist completed"
        );
        Ok(WelcomeOutcome::Completed(posted))
    }

    /// Whether a welcome was ever registered for `user_id`.
    pub async fn is_registered(&self, user_id: &str) -> bool {
        self.registry.lock().await.has_channel(&welcome_channel_key(user_id))
    }

    pub async fn state(&self, channel_key: &str, user_id: &str) -> Option<WelcomeState> {
        self.registry.lock().await.get(channel_key, user_id).cloned()
    }

    /// (registered, completed)
    pub async fn totals(&self) -> (usize, usize) {
        let registry = self.registry.lock().await;
        (registry.len(), registry.completed_count())
    }
}
