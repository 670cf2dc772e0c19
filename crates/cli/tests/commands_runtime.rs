use std::env;
use std::sync::{Mutex, OnceLock};

use leadflow_cli::commands::{config, doctor, migrate, seed};
use serde_json::{json, Value};

#[test]
fn migrate_returns_success_with_valid_env() {
    with_env(&[("LEADFLOW_DATABASE_URL", "sqlite::memory:")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
        assert_eq!(payload["message"], "applied 1 migration(s)");
        assert_eq!(payload["details"]["applied_versions"], json!([1]));
    });
}

#[test]
fn migrate_reports_connectivity_failures() {
    with_env(&[("LEADFLOW_DATABASE_URL", "sqlite:///nonexistent-dir/leadflow.db")], || {
        let result = migrate::run();
        assert_ne!(result.exit_code, 0, "expected migrate failure");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "db_connectivity");
    });
}

#[test]
fn seed_loads_the_demo_catalog() {
    with_env(&[("LEADFLOW_DATABASE_URL", "sqlite::memory:")], || {
        let result = seed::run();
        assert_eq!(result.exit_code, 0, "expected successful seed run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "seed");
        assert_eq!(payload["status"], "ok");

        let message = payload["message"].as_str().unwrap_or("");
        assert!(message.contains("S-acquisition: WF-first-contact (First contact)"));
        assert!(message.contains("S-negotiation: WF-closing (Closing)"));
    });
}

#[test]
fn seed_is_deterministic_across_runs() {
    with_env(&[("LEADFLOW_DATABASE_URL", "sqlite::memory:")], || {
        let first = seed::run();
        let second = seed::run();
        assert_eq!(first.exit_code, 0);
        assert_eq!(second.exit_code, 0);
        assert_eq!(
            parse_payload(&first.output)["message"],
            parse_payload(&second.output)["message"]
        );
    });
}

#[test]
fn doctor_json_reports_per_check_status() {
    with_env(&[("LEADFLOW_DATABASE_URL", "sqlite::memory:")], || {
        let output = doctor::run(true);
        let report: Value = serde_json::from_str(&output).expect("doctor output is JSON");

        assert_eq!(report["overall_status"], "pass");
        let checks = report["checks"].as_array().expect("checks array");
        assert!(checks.iter().any(|c| c["name"] == "config_validation" && c["status"] == "pass"));
        // Notifications are off by default, so webhook readiness is skipped.
        assert!(checks.iter().any(|c| c["name"] == "webhook_readiness" && c["status"] == "skipped"));
        assert!(checks
            .iter()
            .any(|c| c["name"] == "database_connectivity" && c["status"] == "pass"));
    });
}

#[test]
fn doctor_checks_webhook_readiness_when_notifications_are_enabled() {
    with_env(
        &[
            ("LEADFLOW_DATABASE_URL", "sqlite::memory:"),
            ("LEADFLOW_NOTIFY_ENABLED", "true"),
            ("LEADFLOW_NOTIFY_WEBHOOK_URL", "https://hooks.example.com/leadflow"),
        ],
        || {
            let output = doctor::run(true);
            let report: Value = serde_json::from_str(&output).expect("doctor output is JSON");

            let checks = report["checks"].as_array().expect("checks array");
            assert!(checks
                .iter()
                .any(|c| c["name"] == "webhook_readiness" && c["status"] == "pass"));
        },
    );
}

#[test]
fn config_attributes_env_overrides() {
    with_env(&[("LEADFLOW_DATABASE_URL", "sqlite::memory:")], || {
        let output = config::run();

        assert!(output.contains("- database.url = sqlite::memory: (source: env (LEADFLOW_DATABASE_URL))"));
        assert!(output.contains("- server.port = 8080 (source: default)"));
        assert!(output.contains("- notify.webhook_token = <unset>"));
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
        "LEADFLOW_DATABASE_URL",
        "LEADFLOW_DATABASE_MAX_CONNECTIONS",
        "LEADFLOW_DATABASE_TIMEOUT_SECS",
        "LEADFLOW_SERVER_BIND_ADDRESS",
        "LEADFLOW_SERVER_PORT",
        "LEADFLOW_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "LEADFLOW_NOTIFY_ENABLED",
        "LEADFLOW_NOTIFY_WEBHOOK_URL",
        "LEADFLOW_NOTIFY_WEBHOOK_TOKEN",
        "LEADFLOW_NOTIFY_COUNTER_OFFER_OFFSET",
        "LEADFLOW_LOGGING_LEVEL",
        "LEADFLOW_LOGGING_FORMAT",
        "LEADFLOW_LOG_LEVEL",
        "LEADFLOW_LOG_FORMAT",
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
