//! Configuration surface and domain value types shared by every dropcart crate.

pub mod app_config;
pub mod config;
pub mod profile;
pub mod tasks;

use thiserror::Error;

pub use app_config::{AppConfig, RunMode};
pub use config::{load_app_config, load_app_config_from_env};
pub use profile::{
    load_profile, CustomerProfile, LoginCredentials, NotificationSettings, PaymentProfile,
    ProfileFile, TelegramSettings,
};
pub use tasks::{load_tasks, MatchKeys, Product, Storefront, TasksFile};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("failed to read {path}: {source}")]
    FileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    FileParse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("configuration validation error: {0}")]
    Validation(String),
}

/// Reads a YAML file and deserializes it into `T`.
pub(crate) fn read_yaml<T>(path: &std::path::Path) -> Result<T, ConfigError>
where
    T: serde::de::DeserializeOwned,
{
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileIo {
        path: path.display().to_string(),
        source: e,
    })?;

    serde_yaml::from_str(&content).map_err(|e| ConfigError::FileParse {
        path: path.display().to_string(),
        source: e,
    })
}
