use std::env;
use std::sync::{Mutex, OnceLock};

use serde_json::Value;
use welcomebot_cli::commands::{config, doctor};

const VALID_ENV: &[(&str, &str)] = &[
    ("WELCOMEBOT_SLACK_BOT_TOKEN", "xoxb-test-123"),
    ("WELCOMEBOT_SLACK_SIGNING_SECRET", "signing-secret"),
];

#[test]
fn config_reports_effective_values_with_redaction() {
    with_env(VALID_ENV, || {
        let result = config::run();
        assert_eq!(result.exit_code, 0, "expected config to load");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "config");
        assert_eq!(payload["status"], "ok");

        let message = payload["message"].as_str().unwrap_or("");
        assert!(message.contains(
            "- slack.bot_token = xoxb-*** (source: env (WELCOMEBOT_SLACK_BOT_TOKEN))"
        ));
        assert!(message.contains("- slack.signing_secret = <redacted>"));
        assert!(!message.contains("xoxb-test-123"));
        assert!(!message.contains("signing-secret"));
        assert!(message.contains("- server.port = 5000 (source: default)"));
    });
}

#[test]
fn config_attributes_legacy_env_names() {
    with_env(&[("SLACK_TOKEN", "xoxb-legacy"), ("SIGNING_SECRET", "legacy")], || {
        let result = config::run();
        assert_eq!(result.exit_code, 0);

        let payload = parse_payload(&result.output);
        let message = payload["message"].as_str().unwrap_or("");
        assert!(message.contains("(source: env (SLACK_TOKEN))"));
        assert!(message.contains("(source: env (SIGNING_SECRET))"));
    });
}

#[test]
fn config_returns_config_failure_without_tokens() {
    with_env(&[], || {
        let result = config::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "config");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn doctor_skips_remote_checks_when_config_invalid() {
    with_env(&[], || {
        let result = doctor::run(true);
        assert_eq!(result.exit_code, 3, "expected doctor failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["overall_status"], "fail");
        assert_eq!(payload["checks"][0]["name"], "config_validation");
        assert_eq!(payload["checks"][0]["status"], "fail");
        assert_eq!(payload["checks"][1]["name"], "slack_auth");
        assert_eq!(payload["checks"][1]["status"], "skipped");
    });
}

#[test]
fn doctor_reports_unreachable_slack_api() {
    let mut vars = VALID_ENV.to_vec();
    vars.push(("WELCOMEBOT_SLACK_API_BASE_URL", "http://127.0.0.1:9"));

    with_env(&vars, || {
        let result = doctor::run(true);
        assert_eq!(result.exit_code, 3);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["overall_status"], "fail");
        assert_eq!(payload["checks"][0]["status"], "pass");
        assert_eq!(payload["checks"][1]["name"], "slack_auth");
        assert_eq!(payload["checks"][1]["status"], "fail");
        assert_eq!(payload["checks"][2]["name"], "schedule_plan");
        assert_eq!(payload["checks"][2]["status"], "pass");
    });
}

#[test]
fn doctor_human_output_marks_each_check() {
    with_env(&[], || {
        let result = doctor::run(false);

        assert!(result.output.starts_with("doctor: one or more readiness checks failed"));
        assert!(result.output.contains("- [fail] config_validation:"));
        assert!(result.output.contains("- [skip] schedule_plan:"));
    });
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "WELCOMEBOT_SLACK_BOT_TOKEN",
        "WELCOMEBOT_SLACK_SIGNING_SECRET",
        "WELCOMEBOT_SLACK_API_BASE_URL",
        "SLACK_TOKEN",
        "SIGNING_SECRET",
        "WELCOMEBOT_SERVER_BIND_ADDRESS",
        "WELCOMEBOT_SERVER_PORT",
        "WELCOMEBOT_ONBOARDING_USERNAME",
        "WELCOMEBOT_ONBOARDING_ICON_EMOJI",
        "WELCOMEBOT_MODERATION_BANNED_WORDS",
        "WELCOMEBOT_MODERATION_WARNING_TEXT",
        "WELCOMEBOT_SCHEDULE_ENABLED",
        "WELCOMEBOT_SCHEDULE_TARGET_CHANNEL",
        "WELCOMEBOT_LOGGING_LEVEL",
        "WELCOMEBOT_LOGGING_FORMAT",
        "WELCOMEBOT_LOG_LEVEL",
        "WELCOMEBOT_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
