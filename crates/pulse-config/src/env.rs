//! Environment variable fallbacks.
//!
//! Env vars are **fallback**, not override: they only fill fields that no
//! config file set.

use std::collections::HashMap;

use tracing::debug;

use crate::merge::{ConfigLayer, FieldSources};

/// Mapping from environment variable name to config field path.
struct EnvMapping {
    var_name: &'static str,
    field_path: &'static str,
}

/// All supported `PULSE_*` env var mappings.
const ENV_MAPPINGS: &[EnvMapping] = &[
    EnvMapping {
        var_name: "PULSE_ENDPOINT",
        field_path: "connection.endpoint",
    },
    EnvMapping {
        var_name: "PULSE_CHANNEL",
        field_path: "connection.channel",
    },
    EnvMapping {
        var_name: "PULSE_PATH",
        field_path: "connection.path",
    },
    EnvMapping {
        var_name: "PULSE_RECONNECT_ATTEMPTS",
        field_path: "connection.reconnection_attempts",
    },
    EnvMapping {
        var_name: "PULSE_WATCHDOG_TIMEOUT_MS",
        field_path: "watchdog.timeout_ms",
    },
    EnvMapping {
        var_name: "PULSE_LOG_LEVEL",
        field_path: "logging.level",
    },
    EnvMapping {
        var_name: "PULSE_LOG_FORMAT",
        field_path: "logging.format",
    },
];

/// Names of every environment variable the loader consults.
#[must_use]
pub fn supported_vars() -> Vec<&'static str> {
    ENV_MAPPINGS.iter().map(|m| m.var_name).collect()
}

/// Each supported environment variable with the config field it fills.
#[must_use]
pub fn fallback_fields() -> Vec<(&'static str, &'static str)> {
    ENV_MAPPINGS
        .iter()
        .map(|m| (m.var_name, m.field_path))
        .collect()
}

/// Apply environment variable fallbacks to fields no config file set.
///
/// Returns the number of env vars applied.
pub fn apply_env_fallbacks<S: ::std::hash::BuildHasher>(
    merged: &mut toml::Value,
    sources: &mut FieldSources,
    env_vars: &HashMap<String, String, S>,
) -> usize {
    let mut count: usize = 0;

    for mapping in ENV_MAPPINGS {
        if sources.get(mapping.field_path).is_some_and(ConfigLayer::is_file) {
            continue;
        }

        if let Some(val) = env_vars.get(mapping.var_name) {
            debug!(
                var = mapping.var_name,
                field = mapping.field_path,
                "applying env var fallback"
            );
            set_field(merged, mapping.field_path, coerce_to_toml_value(mapping.field_path, val));
            sources.insert(mapping.field_path.to_owned(), ConfigLayer::Environment);
            count = count.saturating_add(1);
        }
    }

    count
}

/// Set a dotted `path` in the tree, creating intermediate tables.
fn set_field(root: &mut toml::Value, path: &str, value: toml::Value) {
    let Some((parents, leaf)) = path.rsplit_once('.') else {
        if let Some(table) = root.as_table_mut() {
            table.insert(path.to_owned(), value);
        }
        return;
    };

    let mut current = root;
    for segment in parents.split('.') {
        let Some(table) = current.as_table_mut() else {
            return;
        };
        current = table
            .entry(segment.to_owned())
            .or_insert_with(|| toml::Value::Table(toml::map::Map::new()));
    }
    if let Some(table) = current.as_table_mut() {
        table.insert(leaf.to_owned(), value);
    }
}

/// Coerce a string env var value to the TOML type of the field.
///
/// Values that do not parse stay strings and fail deserialization with a
/// clear error.
fn coerce_to_toml_value(path: &str, val: &str) -> toml::Value {
    if matches!(
        path,
        "connection.reconnection_attempts" | "watchdog.timeout_ms"
    ) && let Ok(i) = val.trim().parse::<i64>()
    {
        return toml::Value::Integer(i);
    }

    toml::Value::String(val.to_owned())
}

/// Collect all current environment variables into a map.
#[must_use]
pub fn collect_env_vars() -> HashMap<String, String> {
    std::env::vars().collect()
}
