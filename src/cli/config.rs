//! Config command group
//!
//! The stored configuration lives in a JSON file under the user's home
//! directory; environment variables override it at load time.

use super::ConfigCommands;
use maestro_core::{AppConfig, Error, Result};
use std::path::PathBuf;

/// Path of the stored configuration file
#[must_use]
pub fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var("MAESTRO_CONFIG_PATH") {
        return PathBuf::from(path);
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".into());
    PathBuf::from(home).join(".maestro").join("config.json")
}

/// Load the stored configuration, or defaults when none exists
#[must_use]
pub fn load() -> AppConfig {
    let path = config_path();
    std::fs::read_to_string(&path)
        .ok()
        .and_then(|text| serde_json::from_str(&text).ok())
        .unwrap_or_default()
}

fn save(config: &AppConfig) -> Result<()> {
    let path = config_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| Error::Internal(format!("cannot create config directory: {e}")))?;
    }
    let text = serde_json::to_string_pretty(config)
        .map_err(|e| Error::Internal(format!("config serialization failed: {e}")))?;
    std::fs::write(&path, text)
        .map_err(|e| Error::Internal(format!("cannot write config file: {e}")))?;
    Ok(())
}

fn get_key(config: &AppConfig, key: &str) -> Result<String> {
    Ok(match key {
        "api_url" => config.api_url.clone(),
        "api_key" => config.api_key.clone().unwrap_or_default(),
        "default_mode" => config.default_mode.to_string(),
        "output_format" => format!("{:?}", config.output_format).to_lowercase(),
        "project_path" => config.project_path.clone(),
        "max_workers" => config.max_workers.to_string(),
        "agent_cap" => config.agent_cap.to_string(),
        _ => return Err(Error::Validation(format!("unknown config key: {key}"))),
    })
}

fn set_key(config: &mut AppConfig, key: &str, value: &str) -> Result<()> {
    match key {
        "api_url" => config.api_url = value.to_string(),
        "api_key" => {
            config.api_key = if value.is_empty() {
                None
            } else {
                Some(value.to_string())
            };
        }
        "default_mode" => {
            config.default_mode = value.parse().map_err(Error::Validation)?;
        }
        "output_format" => {
            config.output_format = value.parse().map_err(Error::Validation)?;
        }
        "project_path" => config.project_path = value.to_string(),
        "max_workers" => {
            config.max_workers = value
                .parse()
                .map_err(|_| Error::Validation(format!("not a number: {value}")))?;
        }
        "agent_cap" => {
            config.agent_cap = value
                .parse()
                .map_err(|_| Error::Validation(format!("not a number: {value}")))?;
        }
        _ => return Err(Error::Validation(format!("unknown config key: {key}"))),
    }
    Ok(())
}

pub fn run(cmd: ConfigCommands, effective: &AppConfig) -> Result<()> {
    match cmd {
        ConfigCommands::Show => {
            println!(
                "{}",
                serde_json::to_string_pretty(effective)
                    .map_err(|e| Error::Internal(e.to_string()))?
            );
            Ok(())
        }
        ConfigCommands::Get { key } => {
            println!("{}", get_key(effective, &key)?);
            Ok(())
        }
        ConfigCommands::Set { key, value } => {
            let mut stored = load();
            set_key(&mut stored, &key, &value)?;
            save(&stored)?;
            println!("{key} = {value}");
            Ok(())
        }
        ConfigCommands::Reset => {
            save(&AppConfig::default())?;
            println!("configuration reset to defaults");
            Ok(())
        }
        ConfigCommands::Path => {
            println!("{}", config_path().display());
            Ok(())
        }
    }
}
