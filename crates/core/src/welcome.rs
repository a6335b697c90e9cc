//! Onboarding state for welcome messages.
//!
//! A [`WelcomeState`] moves through `NotStarted -> Pending -> Completed`.
//! The registry holds at most one state per (channel, user) pair and never
//! forgets one for the lifetime of the process.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

pub const WELCOME_ICON_EMOJI: &str = ":robot_face:";

/// Registration key for a user's welcome message.
///
/// Welcome messages are addressed to the user directly rather than to a
/// channel ID, so the key has the `@user` shape Slack accepts as a DM target.
pub fn welcome_channel_key(user_id: &str) -> String {
    format!("@{user_id}")
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WelcomeStatus {
    NotStarted,
    Pending,
    Completed,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WelcomeState {
    pub channel_id: String,
    pub user_id: String,
    pub icon_emoji: String,
    /// Handle of the posted message; empty until the first send succeeds.
    pub message_ts: String,
    pub completed: bool,
}

impl WelcomeState {
    pub fn new(channel_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
            user_id: user_id.into(),
            icon_emoji: WELCOME_ICON_EMOJI.to_string(),
            message_ts: String::new(),
            completed: false,
        }
    }

    pub fn status(&self) -> WelcomeStatus {
        if self.completed {
            WelcomeStatus::Completed
        } else if self.message_ts.is_empty() {
            WelcomeStatus::NotStarted
        } else {
            WelcomeStatus::Pending
        }
    }

    /// Returns the state as it looks once the checklist is done, with the
    /// channel taken from the completing event.
    pub fn completed_in(&self, event_channel_id: &str) -> Self {
        Self { channel_id: event_channel_id.to_string(), completed: true, ..self.clone() }
    }
}

#[derive(Clone, Debug, Default)]
pub struct WelcomeRegistry {
    channels: HashMap<String, HashMap<String, WelcomeState>>,
}

impl WelcomeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, channel_key: &str, user_id: &str) -> bool {
        self.get(channel_key, user_id).is_some()
    }

    pub fn has_channel(&self, channel_key: &str) -> bool {
        self.channels.get(channel_key).is_some_and(|users| !users.is_empty())
    }

    pub fn get(&self, channel_key: &str, user_id: &str) -> Option<&WelcomeState> {
        self.channels.get(channel_key).and_then(|users| users.get(user_id))
    }

    /// Registers a state under `channel_key`. The first registration for a
    /// pair wins; later ones are rejected and returned to the caller.
    pub fn register(&mut self, channel_key: &str, state: WelcomeState) -> Result<(), WelcomeState> {
        let users = self.channels.entry(channel_key.to_string()).or_default();
        if users.contains_key(&state.user_id) {
            return Err(state);
        }

        users.insert(state.user_id.clone(), state);
        Ok(())
    }

    /// Overwrites an existing registration. Returns `false` when the pair was never registered.
    pub fn replace(&mut self, channel_key: &str, state: WelcomeState) -> bool {
        match self.channels.get_mut(channel_key).and_then(|users| users.get_mut(&state.user_id)) {
            Some(slot) => {
                *slot = state;
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.channels.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn completed_count(&self) -> usize {
        self.channels.values().flat_map(HashMap::values).filter(|state| state.completed).count()
    }
}
