use serde::Deserialize;
use thiserror::Error;

/// Form body Slack posts for a slash command.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct SlashCommandPayload {
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub channel_id: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub trigger_id: String,
}

/// Request for the caller's message count, answered in `channel_id`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CountQueryCommand {
    pub user_id: String,
    pub channel_id: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandParseError {
    #[error("slash command is missing `{0}`")]
    MissingField(&'static str),
}

/// Any slash command posted to the count endpoint is treated as a count query;
/// the command name itself is not checked.
pub fn parse_count_query(payload: SlashCommandPayload) -> Result<CountQueryCommand, CommandParseError> {
    let user_id = payload.user_id.trim().to_owned();
    if user_id.is_empty() {
        return Err(CommandParseError::MissingField("user_id"));
    }

    let channel_id = payload.channel_id.trim().to_owned();
    if channel_id.is_empty() {
        return Err(CommandParseError::MissingField("channel_id"));
    }

    Ok(CountQueryCommand { user_id, channel_id })
}

#[cfg(test)]
mod tests {
    use super::{parse_count_query, CommandParseError, CountQueryCommand, SlashCommandPayload};

    #[test]
    fn parses_user_and_channel() {
        let payload = SlashCommandPayload {
            command: "/message-count".to_owned(),
            channel_id: "C1".to_owned(),
            user_id: " U1 ".to_owned(),
            ..SlashCommandPayload::default()
        };

        assert_eq!(
            parse_count_query(payload),
            Ok(CountQueryCommand { user_id: "U1".to_owned(), channel_id: "C1".to_owned() })
        );
    }

    #[test]
    fn missing_fields_are_reported() {
        let no_user =
            SlashCommandPayload { channel_id: "C1".to_owned(), ..SlashCommandPayload::default() };
        assert_eq!(parse_count_query(no_user), Err(CommandParseError::MissingField("user_id")));

        let no_channel =
            SlashCommandPayload { user_id: "U1".to_owned(), ..SlashCommandPayload::default() };
        assert_eq!(parse_count_query(no_channel), Err(CommandParseError::MissingField("channel_id")));
    }
}
