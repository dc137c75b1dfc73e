//! Layer precedence across defaults, user file, explicit file and env.

use std::collections::HashMap;

use pulse_config::loader::load_with_env;
use pulse_config::{ConfigError, ConfigLayer};
use pulse_test::{test_dir, test_file, test_file_in_dir};

fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
        .collect()
}

#[test]
fn explicit_file_beats_user_file_beats_defaults() {
    let home = test_dir();
    let _ = test_file_in_dir(
        &home,
        "config.toml",
        "[connection]\nendpoint = \"http://user:4000\"\nchannel = \"cpu\"\n",
    );
    let explicit = test_file("[connection]\nendpoint = \"https://explicit\"\n");

    let resolved =
        load_with_env(Some(explicit.path()), Some(home.path()), &HashMap::new()).unwrap();
    let c = &resolved.config.connection;

    assert_eq!(c.endpoint, "https://explicit");
    assert_eq!(c.channel, "cpu");
    assert_eq!(c.path, "/socket.io");
    assert_eq!(resolved.loaded_files.len(), 2);
    assert_eq!(
        resolved.field_sources["connection.endpoint"],
        ConfigLayer::Explicit
    );
    assert_eq!(resolved.field_sources["connection.channel"], ConfigLayer::User);
    assert_eq!(resolved.field_sources["connection.path"], ConfigLayer::Defaults);
}

#[test]
fn env_fills_only_fields_no_file_set() {
    let home = test_dir();
    let _ = test_file_in_dir(
        &home,
        "config.toml",
        "[connection]\nchannel = \"disk\"\n",
    );
    let vars = env(&[
        ("PULSE_CHANNEL", "ignored"),
        ("PULSE_ENDPOINT", "ws://from-env:9000"),
        ("PULSE_RECONNECT_ATTEMPTS", "9"),
        ("PULSE_WATCHDOG_TIMEOUT_MS", "15000"),
        ("PULSE_LOG_FORMAT", "json"),
    ]);

    let resolved = load_with_env(None, Some(home.path()), &vars).unwrap();
    let config = &resolved.config;

    assert_eq!(config.connection.channel, "disk");
    assert_eq!(config.connection.endpoint, "ws://from-env:9000");
    assert_eq!(config.connection.reconnection_attempts, 9);
    assert_eq!(config.watchdog.timeout_ms, 15_000);
    assert_eq!(config.logging.format, "json");
    assert_eq!(
        resolved.field_sources["logging.format"],
        ConfigLayer::Environment
    );
}

#[test]
fn invalid_merged_value_fails_validation() {
    let home = test_dir();
    let _ = test_file_in_dir(
        &home,
        "config.toml",
        "[connection]\nreconnection_delay_ms = 9000\nreconnection_delay_max_ms = 1000\n",
    );

    let err = load_with_env(None, Some(home.path()), &HashMap::new()).unwrap_err();
    assert!(matches!(err, ConfigError::ValidationError { ref field, .. } if field == "connection.reconnection_delay_ms"));
}

#[test]
fn malformed_file_names_its_path() {
    let home = test_dir();
    let _ = test_file_in_dir(&home, "config.toml", "[connection\n");

    let err = load_with_env(None, Some(home.path()), &HashMap::new()).unwrap_err();
    let ConfigError::ParseError { path, .. } = &err else {
        panic!("expected a parse error, got {err}");
    };
    assert!(path.ends_with("config.toml"));
}

#[test]
fn unparseable_env_number_is_a_parse_error() {
    let home = test_dir();
    let vars = env(&[("PULSE_WATCHDOG_TIMEOUT_MS", "soon")]);

    let err = load_with_env(None, Some(home.path()), &vars).unwrap_err();
    assert!(matches!(err, ConfigError::ParseError { .. }));
}
