use std::collections::HashMap;

/// Per-user count of messages seen by the bot. Counts only ever grow.
#[derive(Clone, Debug, Default)]
pub struct MessageCounter {
    counts: HashMap<String, u64>,
}

impl MessageCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts a message from `user_id` unless it is missing or is the bot itself.
    /// Returns the new count when the message was counted.
    pub fn record_message(&mut self, user_id: Option<&str>, bot_user_id: &str) -> Option<u64> {
        let user_id = user_id.filter(|user| !user.is_empty() && *user != bot_user_id)?;
        let count = self.counts.entry(user_id.to_string()).or_insert(0);
        *count += 1;
        Some(*count)
    }

    pub fn count(&self, user_id: &str) -> u64 {
        self.counts.get(user_id).copied().unwrap_or(0)
    }

    pub fn tracked_users(&self) -> usize {
        self.counts.len()
    }
}
