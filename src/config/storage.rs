use crate::config::schema::AppConfig;
use crate::error::{AstaError, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable overriding the config file location
pub const CONFIG_ENV: &str = "ASTA_CONFIG";

/// Directory holding the config file based on platform
fn config_dir() -> PathBuf {
    if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|p| p.join("com.asta.browser"))
            .unwrap_or_else(|| PathBuf::from("."))
    } else {
        dirs::config_dir()
            .map(|p| p.join("asta"))
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

/// Get the configuration file path
pub fn get_config_path() -> PathBuf {
    match std::env::var_os(CONFIG_ENV) {
        Some(path) if !path.is_empty() => PathBuf::from(path),
        _ => config_dir().join("config.toml"),
    }
}

/// Default location of the conversation memory file
pub fn default_memory_path() -> PathBuf {
    dirs::data_dir()
        .map(|p| p.join("asta"))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("memory.json")
}

/// Load configuration from the default path, creating it if missing
pub fn load_config() -> Result<AppConfig> {
    load_config_from(&get_config_path())
}

/// Load configuration from `path`, creating a default file if missing
pub fn load_config_from(config_path: &Path) -> Result<AppConfig> {
    if !config_path.exists() {
        tracing::info!(
            "Config file not found at {:?}, creating default",
            config_path
        );
        let config = AppConfig::default();
        save_config_to(&config, config_path)?;
        return Ok(config);
    }

    let content = fs::read_to_string(config_path).map_err(|e| {
        AstaError::Config(format!(
            "Failed to read config from {:?}: {}",
            config_path, e
        ))
    })?;

    let config: AppConfig = toml::from_str(&content)?;

    tracing::info!("Loaded config from {:?}", config_path);
    Ok(config)
}

/// Save configuration to the default path
pub fn save_config(config: &AppConfig) -> Result<()> {
    save_config_to(config, &get_config_path())
}

/// Save configuration to `config_path`
pub fn save_config_to(config: &AppConfig, config_path: &Path) -> Result<()> {
    // Ensure parent directory exists
    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            AstaError::Config(format!(
                "Failed to create config directory {:?}: {}",
                parent, e
            ))
        })?;
    }

    let content = toml::to_string_pretty(config)?;

    fs::write(config_path, content).map_err(|e| {
        AstaError::Config(format!("Failed to write config to {:?}: {}", config_path, e))
    })?;

    tracing::info!("Saved config to {:?}", config_path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_paths() {
        assert!(default_memory_path().ends_with("memory.json"));
        assert!(config_dir().join("config.toml").ends_with("config.toml"));
    }

    #[test]
    fn test_missing_file_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = load_config_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.memory.max_entries, 50);
    }

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = AppConfig::default();
        config.ai.default_llm = Some("local:llama3".to_string());
        config.agent.wait_timeout_ms = 5000;
        save_config_to(&config, &path).unwrap();

        let loaded = load_config_from(&path).unwrap();
        assert_eq!(loaded.ai.default_llm.as_deref(), Some("local:llama3"));
        assert_eq!(loaded.agent.wait_timeout_ms, 5000);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[agent]\nwait_timeout_ms = 750\n").unwrap();

        let loaded = load_config_from(&path).unwrap();
        assert_eq!(loaded.agent.wait_timeout_ms, 750);
        assert_eq!(loaded.agent.wait_poll_interval_ms, 100);
        assert_eq!(loaded.branding.with, "Asta");
    }
}
