use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::config::AppConfig;

/// A message to hand to the messaging service for delivery at `post_at`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ScheduledMessageSpec {
    pub text: String,
    pub channel_id: String,
    /// Unix epoch seconds.
    pub post_at: i64,
}

impl ScheduledMessageSpec {
    pub fn new(text: impl Into<String>, channel_id: impl Into<String>, post_at: DateTime<Utc>) -> Self {
        Self { text: text.into(), channel_id: channel_id.into(), post_at: post_at.timestamp() }
    }
}

/// Resolves the configured startup messages against `now`.
pub fn startup_messages(config: &AppConfig, now: DateTime<Utc>) -> Vec<ScheduledMessageSpec> {
    config
        .schedule
        .messages
        .iter()
        .map(|entry| {
            ScheduledMessageSpec::new(
                entry.text.clone(),
                config.schedule_channel_for(entry),
                now + Duration::seconds(entry.delay_secs),
            )
        })
        .collect()
}
