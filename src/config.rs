use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::models::{Priority, Status, TodoPatch};
use crate::utils;

/// Current configuration version
pub const CURRENT_CONFIG_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub defaults: DefaultsConfig,
    #[serde(default)]
    pub statuses: StatusesConfig,
    #[serde(default)]
    pub ui: UiConfig,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_config_version")]
    pub config_version: Option<u32>,
}

/// Where and under which namespace items are persisted.
/// Bumping `version` starts from an empty list without touching older data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default = "default_storage_version")]
    pub version: u32,
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

/// Values applied to new items when the caller leaves them out
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefaultsConfig {
    #[serde(default)]
    pub owner: String,
    #[serde(default = "default_status")]
    pub status: String,
    #[serde(default = "default_priority")]
    pub priority: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusesConfig {
    #[serde(default = "default_enabled_statuses")]
    pub enabled: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiConfig {
    #[serde(default = "default_true")]
    pub show_owner: bool,
    #[serde(default = "default_true")]
    pub confirm_on_delete: bool,
    #[serde(default = "default_date_format")]
    pub date_format: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            defaults: DefaultsConfig::default(),
            statuses: StatusesConfig::default(),
            ui: UiConfig::default(),
            log_level: default_log_level(),
            config_version: Some(CURRENT_CONFIG_VERSION),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            version: default_storage_version(),
            database_path: default_database_path(),
        }
    }
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            owner: String::new(),
            status: default_status(),
            priority: default_priority(),
        }
    }
}

impl Default for StatusesConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled_statuses(),
        }
    }
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            show_owner: true,
            confirm_on_delete: true,
            date_format: default_date_format(),
        }
    }
}

impl DefaultsConfig {
    /// Fill owner, status and priority where `patch` leaves them out.
    pub fn fill(&self, mut patch: TodoPatch) -> TodoPatch {
        if patch.owner.is_none() && !self.owner.is_empty() {
            patch.owner = Some(self.owner.clone());
        }
        if patch.status.is_none() {
            patch.status = Some(self.status.clone());
        }
        if patch.priority.is_none() {
            patch.priority = Some(self.priority.clone());
        }
        patch
    }
}

impl StatusesConfig {
    /// Enabled statuses in configured order; unknown codes are skipped.
    pub fn enabled_statuses(&self) -> Vec<Status> {
        self.enabled
            .iter()
            .filter_map(|code| code.parse().ok())
            .collect()
    }

    pub fn is_enabled(&self, status: Status) -> bool {
        self.enabled.iter().any(|code| code == status.code())
    }
}

// Default value functions
fn default_namespace() -> String {
    "todo".to_string()
}

fn default_storage_version() -> u32 {
    1
}

fn default_database_path() -> String {
    // This is a fallback - actual profile will be determined at load time
    if let Some(data_dir) = utils::get_data_dir(utils::Profile::Prod) {
        data_dir.join("todo.db").to_string_lossy().to_string()
    } else {
        "~/.local/share/todo/todo.db".to_string()
    }
}

fn default_status() -> String {
    Status::NotYetStarted.code().to_string()
}

fn default_priority() -> String {
    Priority::Medium.code().to_string()
}

fn default_enabled_statuses() -> Vec<String> {
    Status::ALL.iter().map(|status| status.code().to_string()).collect()
}

fn default_true() -> bool {
    true
}

fn default_date_format() -> String {
    "%d/%m/%Y %H:%M".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_config_version() -> Option<u32> {
    Some(CURRENT_CONFIG_VERSION)
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config directory: {0}")]
    ConfigDirError(String),
    #[error("Failed to read config file: {0}")]
    ReadError(String),
    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Failed to write config file: {0}")]
    WriteError(String),
    #[error("Invalid default {field} `{value}`")]
    InvalidDefault { field: &'static str, value: String },
}

impl Config {
    /// Parse configuration from TOML text, filling in every missing key
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(contents)?;
        config.check()?;
        Ok(config)
    }

    /// Load configuration from file, or create default if missing
    /// Uses the provided profile to determine config and database paths
    pub fn load_with_profile(profile: utils::Profile) -> Result<Self, ConfigError> {
        let config_path = Self::get_config_path(profile)?;
        Self::load_or_create(&config_path, profile)
    }

    /// Load `config_path`, creating it with profile defaults when missing
    pub fn load_or_create(config_path: &Path, profile: utils::Profile) -> Result<Self, ConfigError> {
        if config_path.exists() {
            let mut config = Self::load_from_path(config_path)?;

            // An unset or stock database path follows the profile; an edited one is kept
            let path = config.storage.database_path.trim();
            if path.is_empty() || path == default_database_path() {
                config.storage.database_path = Self::default_database_path_for_profile(profile);
            }

            Ok(config)
        } else {
            // Create default config and save it
            let mut config = Config::default();
            config.storage.database_path = Self::default_database_path_for_profile(profile);
            config.save_to_path(config_path)?;
            Ok(config)
        }
    }

    /// Load configuration from an explicit file path
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&contents)
    }

    /// Save configuration to an explicit file path
    pub fn save_to_path(&mut self, config_path: &Path) -> Result<(), ConfigError> {
        // Ensure config version is set before saving
        self.config_version = Some(CURRENT_CONFIG_VERSION);

        // Create parent directory if it doesn't exist
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError(e.to_string()))?;
        }

        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::WriteError(format!("Failed to serialize config: {}", e)))?;

        fs::write(config_path, toml_string).map_err(|e| ConfigError::WriteError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the config file
    pub fn get_config_path(profile: utils::Profile) -> Result<PathBuf, ConfigError> {
        let config_dir = utils::get_config_dir(profile).ok_or_else(|| {
            ConfigError::ConfigDirError("Could not determine config directory".to_string())
        })?;
        Ok(config_dir.join("config.toml"))
    }

    /// Get default database path for a specific profile
    fn default_database_path_for_profile(profile: utils::Profile) -> String {
        if let Some(data_dir) = utils::get_data_dir(profile) {
            data_dir.join("todo.db").to_string_lossy().to_string()
        } else {
            // Fallback paths - platform-specific
            #[cfg(target_os = "macos")]
            {
                match profile {
                    utils::Profile::Dev => "~/Library/Application Support/todo-dev/todo.db".to_string(),
                    utils::Profile::Prod => "~/Library/Application Support/todo/todo.db".to_string(),
                }
            }
            #[cfg(not(target_os = "macos"))]
            {
                match profile {
                    utils::Profile::Dev => "~/.local/share/todo-dev/todo.db".to_string(),
                    utils::Profile::Prod => "~/.local/share/todo/todo.db".to_string(),
                }
            }
        }
    }

    /// Get the expanded database path (with ~ expansion)
    pub fn get_database_path(&self) -> PathBuf {
        utils::expand_path(&self.storage.database_path)
    }

    /// Directory for rotated log files, next to the database
    pub fn get_log_dir(&self) -> PathBuf {
        self.get_database_path()
            .parent()
            .map(|dir| dir.join("logs"))
            .unwrap_or_else(|| PathBuf::from("logs"))
    }

    /// Reject defaults that could never produce a valid item
    fn check(&self) -> Result<(), ConfigError> {
        if self.defaults.status.parse::<Status>().is_err() {
            return Err(ConfigError::InvalidDefault {
                field: "status",
                value: self.defaults.status.clone(),
            });
        }
        if self.defaults.priority.parse::<Priority>().is_err() {
            return Err(ConfigError::InvalidDefault {
                field: "priority",
                value: self.defaults.priority.clone(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn empty_file_yields_defaults() {
        let config = Config::from_toml_str("").expect("empty config should parse");
        assert_eq!(config.storage.namespace, "todo");
        assert_eq!(config.storage.version, 1);
        assert_eq!(config.defaults.status, "NYS");
        assert_eq!(config.defaults.priority, "MED");
        assert_eq!(config.statuses.enabled.len(), 7);
        assert!(config.ui.show_owner);
        assert!(config.ui.confirm_on_delete);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn partial_sections_merge_with_defaults() {
        let config = Config::from_toml_str(
            r#"
            [storage]
            namespace = "work"

            [defaults]
            owner = "alex"

            [statuses]
            enabled = ["NYS", "INP", "CMP", "BOGUS"]
            "#,
        )
        .expect("partial config should parse");

        assert_eq!(config.storage.namespace, "work");
        assert_eq!(config.storage.version, 1);
        assert_eq!(config.defaults.owner, "alex");
        assert_eq!(config.defaults.priority, "MED");
        assert_eq!(
            config.statuses.enabled_statuses(),
            vec![Status::NotYetStarted, Status::InProgress, Status::Complete]
        );
        assert!(!config.statuses.is_enabled(Status::Blocked));
    }

    #[test]
    fn invalid_default_status_is_rejected() {
        let err = Config::from_toml_str("[defaults]\nstatus = \"LATER\"").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidDefault { field: "status", .. }));
    }

    #[test]
    fn defaults_fill_only_missing_fields() {
        let defaults = DefaultsConfig {
            owner: "alex".into(),
            status: "INP".into(),
            priority: "HIGH".into(),
        };
        let patch = defaults.fill(TodoPatch::new().detail("x").priority("LOW"));
        assert_eq!(patch.owner.as_deref(), Some("alex"));
        assert_eq!(patch.status.as_deref(), Some("INP"));
        assert_eq!(patch.priority.as_deref(), Some("LOW"));
    }

    #[test]
    fn missing_file_is_created_with_profile_database() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("config.toml");

        let config = Config::load_or_create(&path, utils::Profile::Dev).expect("config should load");
        assert!(path.exists());
        assert_eq!(
            config.storage.database_path,
            Config::default_database_path_for_profile(utils::Profile::Dev)
        );
    }

    #[test]
    fn edited_database_path_is_kept() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "[storage]\ndatabase_path = \"/srv/todo/shared.db\"\n").unwrap();

        let config = Config::load_or_create(&path, utils::Profile::Dev).expect("config should load");
        assert_eq!(config.storage.database_path, "/srv/todo/shared.db");
        assert_eq!(config.get_database_path(), PathBuf::from("/srv/todo/shared.db"));
    }

    #[test]
    fn stock_database_path_follows_profile() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "[storage]\nnamespace = \"work\"\n").unwrap();

        let config = Config::load_or_create(&path, utils::Profile::Dev).expect("config should load");
        assert_eq!(config.storage.namespace, "work");
        assert_eq!(
            config.storage.database_path,
            Config::default_database_path_for_profile(utils::Profile::Dev)
        );
    }

    #[test]
    fn save_and_reload_round_trip() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("config").join("config.toml");
        let mut config = Config::default();
        config.storage.namespace = "home".into();
        config.save_to_path(&path).expect("config should save");

        let loaded = Config::load_from_path(&path).expect("config should load");
        assert_eq!(loaded, config);
    }
}
