use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{info, warn};
use welcomebot_core::{
    config::{AppConfig, ConfigError, LoadOptions},
    schedule::startup_messages,
};
use welcomebot_slack::{
    bot::{BotRuntime, BotSettings},
    events::{bot_dispatcher, EventDispatcher},
    gateway::{GatewayError, MessagingGateway, SlackWebGateway},
    schedule::{replace_scheduled_messages, ScheduleBootstrapReport},
};

pub struct Application {
    pub config: AppConfig,
    pub runtime: Arc<BotRuntime>,
    pub dispatcher: Arc<EventDispatcher>,
    pub schedule_report: Option<ScheduleBootstrapReport>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("slack auth.test failed: {0}")]
    Auth(#[source] GatewayError),
    #[error("scheduled message bootstrap failed: {0}")]
    Schedule(#[source] GatewayError),
}

pub fn load_config(options: LoadOptions) -> Result<AppConfig, BootstrapError> {
    Ok(AppConfig::load(options)?)
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    let gateway: Arc<dyn MessagingGateway> = Arc::new(SlackWebGateway::new(
        config.slack.api_base_url.clone(),
        config.slack.bot_token.clone(),
    ));
    bootstrap_with_gateway(config, gateway).await
}

pub async fn bootstrap_with_gateway(
    config: AppConfig,
    gateway: Arc<dyn MessagingGateway>,
) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let bot_user_id = gateway.auth_test().await.map_err(BootstrapError::Auth)?;
    info!(
        event_name = "system.bootstrap.bot_identified",
        correlation_id = "bootstrap",
        bot_user_id = %bot_user_id,
        "resolved bot user id"
    );

    let schedule_report = if config.schedule.enabled {
        let specs = startup_messages(&config, Utc::now());
        let report = replace_scheduled_messages(
            gateway.as_ref(),
            &specs,
            &config.schedule.target_channel,
        )
        .await
        .map_err(BootstrapError::Schedule)?;

        for failure in report.failures() {
            if let Err(error) = &failure.outcome {
                warn!(
                    event_name = "schedule.delete_failed",
                    correlation_id = "bootstrap",
                    scheduled_message_id = %failure.id,
                    error = %error,
                    "scheduled message left in place"
                );
            }
        }
        info!(
            event_name = "system.bootstrap.schedule_replaced",
            correlation_id = "bootstrap",
            channel = %config.schedule.target_channel,
            scheduled = report.scheduled_ids.len(),
            deleted = report.deleted_count(),
            failed = report.failures().count(),
            "scheduled message bootstrap finished"
        );
        Some(report)
    } else {
        info!(
            event_name = "system.bootstrap.schedule_skipped",
            correlation_id = "bootstrap",
            "scheduled messages disabled"
        );
        None
    };

    let runtime = Arc::new(BotRuntime::new(gateway, bot_user_id, BotSettings::from(&config)));
    let dispatcher = Arc::new(bot_dispatcher(runtime.clone()));

    Ok(Application { config, runtime, dispatcher, schedule_report })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use welcomebot_core::config::{AppConfig, ConfigOverrides, LoadOptions};
    use welcomebot_slack::gateway::{GatewayCall, RecordingGateway};

    use super::{bootstrap_with_gateway, load_config, BootstrapError};

    fn test_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.slack.bot_token = "xoxb-test".to_owned().into();
        config.slack.signing_secret = "secret".to_owned().into();
        config
    }

    #[test]
    fn load_config_rejects_app_level_token() {
        let result = load_config(LoadOptions {
            config_path: Some("does-not-exist.toml".into()),
            overrides: ConfigOverrides {
                slack_bot_token: Some("xapp-not-a-bot-token".to_owned()),
                slack_signing_secret: Some("secret".to_owned()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        });

        let error = result.err().expect("config error");
        assert!(matches!(error, BootstrapError::Config(_)));
        assert!(error.to_string().contains("slack.bot_token"));
    }

    #[tokio::test]
    async fn bootstrap_resolves_bot_id_and_replaces_schedule() {
        let gateway = Arc::new(RecordingGateway::new("UBOT42"));

        let app = bootstrap_with_gateway(test_config(), gateway.clone()).await.expect("bootstrap");

        assert_eq!(app.runtime.bot_user_id(), "UBOT42");
        assert_eq!(app.dispatcher.handler_count(), 3);
        let report = app.schedule_report.expect("schedule enabled by default");
        assert_eq!(report.scheduled_ids.len(), 2);
        assert_eq!(report.deleted_count(), 2);
        assert!(gateway.pending_scheduled().await.is_empty());
        assert_eq!(gateway.calls().await.first(), Some(&GatewayCall::AuthTest));
    }

    #[tokio::test]
    async fn disabled_schedule_makes_no_schedule_calls() {
        let gateway = Arc::new(RecordingGateway::default());
        let mut config = test_config();
        config.schedule.enabled = false;

        let app = bootstrap_with_gateway(config, gateway.clone()).await.expect("bootstrap");

        assert!(app.schedule_report.is_none());
        assert_eq!(gateway.calls().await, vec![GatewayCall::AuthTest]);
    }

    #[tokio::test]
    async fn auth_failure_aborts_startup() {
        let gateway = Arc::new(RecordingGateway::default());
        gateway.fail_method("auth.test").await;

        let result = bootstrap_with_gateway(test_config(), gateway).await;

        assert!(matches!(result, Err(BootstrapError::Auth(_))));
    }

    #[tokio::test]
    async fn delete_failures_do_not_abort_startup() {
        let gateway = Arc::new(RecordingGateway::default());
        gateway.fail_delete("Q0002").await;

        let app = bootstrap_with_gateway(test_config(), gateway.clone()).await.expect("bootstrap");

        let report = app.schedule_report.expect("report");
        assert_eq!(report.failures().count(), 1);
        assert_eq!(gateway.pending_scheduled().await.len(), 1);
    }
}
