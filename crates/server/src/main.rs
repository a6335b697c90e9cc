mod bootstrap;
mod health;
mod webhook;

use anyhow::Result;
use tracing::{error, info};
use welcomebot_core::config::{AppConfig, LoadOptions};

fn init_logging(config: &AppConfig) {
    use tracing::Level;
    use welcomebot_core::config::LogFormat::*;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Logging needs the config, so load it before bootstrapping anything else
    let config = bootstrap::load_config(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;

    let router = webhook::router(webhook::WebhookState::new(app.dispatcher.clone()))
        .merge(health::router(health::HealthState { runtime: app.runtime.clone() }));

    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;

    info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        bot_user_id = app.runtime.bot_user_id(),
        schedule_delete_failures =
            app.schedule_report.as_ref().map_or(0, |report| report.failures().count()),
        "welcomebot-server listening"
    );

    if let Err(serve_error) =
        axum::serve(listener, router).with_graceful_shutdown(wait_for_shutdown()).await
    {
        error!(
            event_name = "system.server.error",
            correlation_id = "shutdown",
            error = %serve_error,
            "http server terminated unexpectedly"
        );
        return Err(serve_error.into());
    }

    info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "welcomebot-server stopping"
    );

    Ok(())
}

async fn wait_for_shutdown() {
    if let Err(signal_error) = tokio::signal::ctrl_c().await {
        error!(
            event_name = "system.server.signal_error",
            correlation_id = "shutdown",
            error = %signal_error,
            "failed to listen for ctrl-c"
        );
    }
}
