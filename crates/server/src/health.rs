use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;
use welcomebot_slack::bot::BotRuntime;

#[derive(Clone)]
pub struct HealthState {
    pub runtime: Arc<BotRuntime>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub bot_user_id: String,
    pub welcomes_registered: usize,
    pub welcomes_completed: usize,
    pub tracked_users: usize,
    pub checked_at: String,
}

pub fn router(state: HealthState) -> Router {
    Router::new().route("/health", get(health)).with_state(state)
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let (welcomes_registered, welcomes_completed) = state.runtime.welcome().totals().await;

    let payload = HealthResponse {
        status: "ready",
        service: HealthCheck {
            status: "ready",
            detail: "welcomebot-server runtime initialized".to_string(),
        },
        bot_user_id: state.runtime.bot_user_id().to_owned(),
        welcomes_registered,
        welcomes_completed,
        tracked_users: state.runtime.tracked_users().await,
        checked_at: Utc::now().to_rfc3339(),
    };

    (StatusCode::OK, Json(payload))
}
