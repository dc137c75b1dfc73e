//! CLI handlers for the `pulse config` subcommand.

use std::path::Path;

use anyhow::Result;
use pulse_config::{Config, ShowFormat};

use crate::theme::Theme;

/// Show the resolved configuration with source annotations.
pub(crate) fn show_config(
    explicit: Option<&Path>,
    format: &str,
    section: Option<&str>,
) -> Result<()> {
    let resolved = Config::load(explicit)?;

    let show_format = if format == "json" {
        ShowFormat::Json
    } else {
        ShowFormat::Toml
    };

    let output = resolved
        .show(show_format, section)
        .map_err(|e| anyhow::anyhow!("failed to format config: {e}"))?;

    println!("{output}");
    Ok(())
}

/// Validate the current configuration.
#[allow(clippy::unnecessary_wraps)]
pub(crate) fn validate_config(explicit: Option<&Path>) -> Result<()> {
    match Config::load(explicit) {
        Ok(resolved) => {
            if let Err(e) = crate::config_bridge::to_connection_config(&resolved.config) {
                eprintln!("{}", Theme::error(&format!("Configuration error: {e}")));
                std::process::exit(1);
            }
            println!("{}", Theme::success("Configuration is valid."));
            if !resolved.loaded_files.is_empty() {
                println!("\nLoaded files:");
                for path in &resolved.loaded_files {
                    println!("  - {path}");
                }
            }
            Ok(())
        },
        Err(e) => {
            eprintln!("{}", Theme::error(&format!("Configuration error: {e}")));
            std::process::exit(1);
        },
    }
}

/// Show all config file paths that are checked.
#[allow(clippy::unnecessary_wraps)]
pub(crate) fn show_paths(explicit: Option<&Path>) -> Result<()> {
    let mut paths = Vec::with_capacity(2);
    if let Some(path) = explicit {
        paths.push(path.display().to_string());
    }
    match pulse_config::loader::user_config_path() {
        Ok(path) => paths.push(path.display().to_string()),
        Err(e) => eprintln!("{}", Theme::warning(&format!("No user config: {e}"))),
    }

    println!(
        "{}",
        Theme::header("Configuration files checked (in precedence order):")
    );
    println!();
    for (i, path) in paths.iter().enumerate() {
        let exists = Path::new(path).exists();
        let status = if exists { "found" } else { "not found" };
        println!("  {}. {path}  [{status}]", i.saturating_add(1));
    }

    println!("\n{}", Theme::header("Environment variable fallbacks:"));
    let width = pulse_config::env::fallback_fields()
        .iter()
        .map(|(var, _)| var.len())
        .max()
        .unwrap_or_default();
    for (var, field) in pulse_config::env::fallback_fields() {
        println!("  {var:<width$} -> {field}");
    }

    Ok(())
}
