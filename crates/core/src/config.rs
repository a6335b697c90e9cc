use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::moderation::DEFAULT_BANNED_WORDS;
use crate::welcome::WELCOME_ICON_EMOJI;

pub const DEFAULT_SLACK_API_BASE_URL: &str = "https://slack.com/api";
pub const DEFAULT_WARNING_TEXT: &str = "That is a bad word";
pub const DEFAULT_WELCOME_USERNAME: &str = "Welcome Robot!";
pub const DEFAULT_SCHEDULE_CHANNEL: &str = "C01LLRZ7Z1T";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub slack: SlackConfig,
    pub server: ServerConfig,
    pub onboarding: OnboardingConfig,
    pub moderation: ModerationConfig,
    pub schedule: ScheduleConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct SlackConfig {
    pub bot_token: SecretString,
    pub signing_secret: SecretString,
    pub api_base_url: String,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
}

#[derive(Clone, Debug)]
pub struct OnboardingConfig {
    pub username: String,
    pub icon_emoji: String,
}

#[derive(Clone, Debug)]
pub struct ModerationConfig {
    pub banned_words: Vec<String>,
    pub warning_text: String,
}

#[derive(Clone, Debug)]
pub struct ScheduleConfig {
    pub enabled: bool,
    pub target_channel: String,
    pub messages: Vec<ScheduledMessageConfig>,
}

/// One startup message, posted `delay_secs` after the process starts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledMessageConfig {
    pub text: String,
    pub delay_secs: i64,
    #[serde(default)]
    pub channel: Option<String>,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub slack_bot_token: Option<String>,
    pub slack_signing_secret: Option<String>,
    pub slack_api_base_url: Option<String>,
    pub server_port: Option<u16>,
    pub schedule_enabled: Option<bool>,
    pub log_level: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            slack: SlackConfig {
                bot_token: String::new().into(),
                signing_secret: String::new().into(),
                api_base_url: DEFAULT_SLACK_API_BASE_URL.to_string(),
            },
            server: ServerConfig { bind_address: "127.0.0.1".to_string(), port: 5000 },
            onboarding: OnboardingConfig {
                username: DEFAULT_WELCOME_USERNAME.to_string(),
                icon_emoji: WELCOME_ICON_EMOJI.to_string(),
            },
            moderation: ModerationConfig {
                banned_words: DEFAULT_BANNED_WORDS.iter().map(|word| word.to_string()).collect(),
                warning_text: DEFAULT_WARNING_TEXT.to_string(),
            },
            schedule: ScheduleConfig {
                enabled: true,
                target_channel: DEFAULT_SCHEDULE_CHANNEL.to_string(),
                messages: vec![
                    ScheduledMessageConfig {
                        text: "First message".to_string(),
                        delay_secs: 20,
                        channel: None,
                    },
                    ScheduledMessageConfig {
                        text: "Second message!".to_string(),
                        delay_secs: 30,
                        channel: None,
                    },
                ],
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("welcomebot.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    /// Channel a scheduled entry is posted to; entries without one use the target channel.
    pub fn schedule_channel_for<'a>(&'a self, entry: &'a ScheduledMessageConfig) -> &'a str {
        entry.channel.as_deref().unwrap_or(&self.schedule.target_channel)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(slack) = patch.slack {
            if let Some(bot_token) = slack.bot_token {
                self.slack.bot_token = secret_value(bot_token);
            }
            if let Some(signing_secret) = slack.signing_secret {
                self.slack.signing_secret = secret_value(signing_secret);
            }
            if let Some(api_base_url) = slack.api_base_url {
                self.slack.api_base_url = api_base_url;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
        }

        if let Some(onboarding) = patch.onboarding {
            if let Some(username) = onboarding.username {
                self.onboarding.username = username;
            }
            if let Some(icon_emoji) = onboarding.icon_emoji {
                self.onboarding.icon_emoji = icon_emoji;
            }
        }

        if let Some(moderation) = patch.moderation {
            if let Some(banned_words) = moderation.banned_words {
                self.moderation.banned_words = banned_words;
            }
            if let Some(warning_text) = moderation.warning_text {
                self.moderation.warning_text = warning_text;
            }
        }

        if let Some(schedule) = patch.schedule {
            if let Some(enabled) = schedule.enabled {
                self.schedule.enabled = enabled;
            }
            if let Some(target_channel) = schedule.target_channel {
                self.schedule.target_channel = target_channel;
            }
            if let Some(messages) = schedule.messages {
                self.schedule.messages = messages;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        // SLACK_TOKEN and SIGNING_SECRET are the names the bot's `.env` files have always used.
        let bot_token = read_env("WELCOMEBOT_SLACK_BOT_TOKEN").or_else(|| read_env("SLACK_TOKEN"));
        if let Some(value) = bot_token {
            self.slack.bot_token = secret_value(value);
        }
        let signing_secret =
            read_env("WELCOMEBOT_SLACK_SIGNING_SECRET").or_else(|| read_env("SIGNING_SECRET"));
        if let Some(value) = signing_secret {
            self.slack.signing_secret = secret_value(value);
        }
        if let Some(value) = read_env("WELCOMEBOT_SLACK_API_BASE_URL") {
            self.slack.api_base_url = value;
        }

        if let Some(value) = read_env("WELCOMEBOT_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("WELCOMEBOT_SERVER_PORT") {
            self.server.port = parse_u16("WELCOMEBOT_SERVER_PORT", &value)?;
        }

        if let Some(value) = read_env("WELCOMEBOT_ONBOARDING_USERNAME") {
            self.onboarding.username = value;
        }
        if let Some(value) = read_env("WELCOMEBOT_ONBOARDING_ICON_EMOJI") {
            self.onboarding.icon_emoji = value;
        }

        if let Some(value) = read_env("WELCOMEBOT_MODERATION_BANNED_WORDS") {
            self.moderation.banned_words = parse_list(&value);
        }
        if let Some(value) = read_env("WELCOMEBOT_MODERATION_WARNING_TEXT") {
            self.moderation.warning_text = value;
        }

        if let Some(value) = read_env("WELCOMEBOT_SCHEDULE_ENABLED") {
            self.schedule.enabled = parse_bool("WELCOMEBOT_SCHEDULE_ENABLED", &value)?;
        }
        if let Some(value) = read_env("WELCOMEBOT_SCHEDULE_TARGET_CHANNEL") {
            self.schedule.target_channel = value;
        }

        let log_level =
            read_env("WELCOMEBOT_LOGGING_LEVEL").or_else(|| read_env("WELCOMEBOT_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("WELCOMEBOT_LOGGING_FORMAT").or_else(|| read_env("WELCOMEBOT_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(bot_token) = overrides.slack_bot_token {
            self.slack.bot_token = secret_value(bot_token);
        }
        if let Some(signing_secret) = overrides.slack_signing_secret {
            self.slack.signing_secret = secret_value(signing_secret);
        }
        if let Some(api_base_url) = overrides.slack_api_base_url {
            self.slack.api_base_url = api_base_url;
        }
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
        if let Some(enabled) = overrides.schedule_enabled {
            self.schedule.enabled = enabled;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_slack(&self.slack)?;
        validate_server(&self.server)?;
        validate_moderation(&self.moderation)?;
        validate_schedule(&self.schedule)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("welcomebot.toml"), PathBuf::from("config/welcomebot.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_slack(slack: &SlackConfig) -> Result<(), ConfigError> {
    let bot_token = slack.bot_token.expose_secret();
    if bot_token.is_empty() {
        return Err(ConfigError::Validation(
            "slack.bot_token is required (WELCOMEBOT_SLACK_BOT_TOKEN or SLACK_TOKEN). Get it from https://api.slack.com/apps > Your App > OAuth & Permissions > Bot User OAuth Token".to_string(),
        ));
    }
    if !bot_token.starts_with("xoxb-") {
        let hint = if bot_token.starts_with("xapp-") {
            " (hint: you may have used the app-level token instead of the bot token)"
        } else {
            ""
        };
        return Err(ConfigError::Validation(format!(
            "slack.bot_token must start with `xoxb-`{hint}. Get it from https://api.slack.com/apps"
        )));
    }

    if slack.signing_secret.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "slack.signing_secret is required (WELCOMEBOT_SLACK_SIGNING_SECRET or SIGNING_SECRET). Get it from https://api.slack.com/apps > Your App > Basic Information > App Credentials".to_string(),
        ));
    }

    let base_url = slack.api_base_url.trim();
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "slack.api_base_url must start with http:// or https://".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.bind_address.trim().is_empty() {
        return Err(ConfigError::Validation("server.bind_address must not be empty".to_string()));
    }

    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    Ok(())
}

fn validate_moderation(moderation: &ModerationConfig) -> Result<(), ConfigError> {
    if moderation.banned_words.iter().any(|word| word.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "moderation.banned_words must not contain empty entries".to_string(),
        ));
    }

    if moderation.warning_text.trim().is_empty() {
        return Err(ConfigError::Validation(
            "moderation.warning_text must not be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_schedule(schedule: &ScheduleConfig) -> Result<(), ConfigError> {
    if !schedule.enabled {
        return Ok(());
    }

    if schedule.target_channel.trim().is_empty() {
        return Err(ConfigError::Validation(
            "schedule.target_channel is required when schedule.enabled is true".to_string(),
        ));
    }

    for (index, message) in schedule.messages.iter().enumerate() {
        if message.text.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "schedule.messages[{index}].text must not be empty"
            )));
        }
        if message.delay_secs <= 0 {
            return Err(ConfigError::Validation(format!(
                "schedule.messages[{index}].delay_secs must be greater than zero"
            )));
        }
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_list(value: &str) -> Vec<String> {
    value.split(',').map(str::trim).filter(|item| !item.is_empty()).map(str::to_owned).collect()
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    slack: Option<SlackPatch>,
    server: Option<ServerPatch>,
    onboarding: Option<OnboardingPatch>,
    moderation: Option<ModerationPatch>,
    schedule: Option<SchedulePatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct SlackPatch {
    bot_token: Option<String>,
    signing_secret: Option<String>,
    api_base_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
struct OnboardingPatch {
    username: Option<String>,
    icon_emoji: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ModerationPatch {
    banned_words: Option<Vec<String>>,
    warning_text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SchedulePatch {
    enabled: Option<bool>,
    target_channel: Option<String>,
    messages: Option<Vec<ScheduledMessageConfig>>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
