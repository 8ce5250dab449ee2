use basketry_cli::commands::{cleanup_stale, config as config_cmd, insights, migrate, prune, run, seed};
use basketry_core::config::AppConfig;
use serde_json::Value;
use tempfile::TempDir;

fn config_for(dir: &TempDir) -> AppConfig {
    let mut config = AppConfig::default();
    let db_path = dir.path().join("basketry-test.db");
    config.database.url = format!("sqlite://{}?mode=rwc", db_path.display());
    config
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be JSON")
}

#[test]
fn migrate_succeeds_against_a_fresh_database() {
    let dir = TempDir::new().expect("tempdir");
    let config = config_for(&dir);

    let result = migrate::run(&config);
    assert_eq!(result.exit_code, 0, "{}", result.output);

    let payload = parse_payload(&result.output);
    assert_eq!(payload["command"], "migrate");
    assert_eq!(payload["status"], "ok");
}

#[test]
fn seed_run_insights_round_trip() {
    let dir = TempDir::new().expect("tempdir");
    let config = config_for(&dir);

    let result = seed::run(&config);
    assert_eq!(result.exit_code, 0, "{}", result.output);
    let payload = parse_payload(&result.output);
    assert_eq!(payload["command"], "seed");
    assert_eq!(payload["data"]["categories"], 6);
    assert_eq!(payload["data"]["products"], 12);
    assert_eq!(payload["data"]["orders"], 14);

    let result = run::run(&config);
    assert_eq!(result.exit_code, 0, "{}", result.output);
    let payload = parse_payload(&result.output);
    assert_eq!(payload["command"], "run");
    assert_eq!(payload["status"], "ok");
    assert_eq!(payload["data"]["strategy"], "direct");
    assert!(payload["data"]["pairs_accepted"].as_u64().expect("pairs_accepted") > 0);
    assert_eq!(payload["data"]["batches_failed"], 0);

    let result = insights::run(&config, 5);
    assert_eq!(result.exit_code, 0, "{}", result.output);
    let payload = parse_payload(&result.output);
    let top_pairs = payload["data"]["top_pairs"].as_array().expect("top_pairs array");
    assert!(!top_pairs.is_empty());
    assert!(top_pairs.len() <= 5);
}

#[test]
fn run_is_idempotent_over_unchanged_history() {
    let dir = TempDir::new().expect("tempdir");
    let config = config_for(&dir);

    seed::run(&config);

    let first = parse_payload(&run::run(&config).output);
    let second = parse_payload(&run::run(&config).output);

    assert_eq!(first["data"]["pairs_accepted"], second["data"]["pairs_accepted"]);
    assert_eq!(first["data"]["pairs_considered"], second["data"]["pairs_considered"]);
}

#[test]
fn maintenance_commands_prune_and_expire() {
    let dir = TempDir::new().expect("tempdir");
    let config = config_for(&dir);

    seed::run(&config);
    run::run(&config);

    let result = prune::run(&config);
    assert_eq!(result.exit_code, 0, "{}", result.output);
    let payload = parse_payload(&result.output);
    assert_eq!(payload["data"]["removed"], 0, "a fresh run leaves nothing below support");

    // Every stored pair's newest supporting order is days old, so a one-day
    // retention window sweeps the whole table.
    let result = cleanup_stale::run(&config, Some(1));
    assert_eq!(result.exit_code, 0, "{}", result.output);
    let payload = parse_payload(&result.output);
    assert_eq!(payload["data"]["max_age_days"], 1);
    assert!(payload["data"]["removed"].as_u64().expect("removed") > 0);

    let result = insights::run(&config, 5);
    let payload = parse_payload(&result.output);
    assert!(payload["data"]["top_pairs"].as_array().expect("top_pairs array").is_empty());
}

#[test]
fn invalid_engine_config_fails_with_config_error_class() {
    let dir = TempDir::new().expect("tempdir");
    let mut config = config_for(&dir);
    config.engine.window_days = 0;

    let result = run::run(&config);
    assert_eq!(result.exit_code, 2);

    let payload = parse_payload(&result.output);
    assert_eq!(payload["status"], "error");
    assert_eq!(payload["error_class"], "config_validation");
}

#[test]
fn config_command_reports_effective_values() {
    let dir = TempDir::new().expect("tempdir");
    let config = config_for(&dir);

    let output = config_cmd::run(&config);
    let payload = parse_payload(&output);

    assert_eq!(payload["engine"]["min_support"], 2);
    assert_eq!(payload["engine"]["window_days"], 365);
    assert_eq!(payload["engine"]["per_product_cap"], 50);
    assert_eq!(payload["logging"]["level"], "info");
}
