//! Controller settings (directories and environment overrides)
//!
//! Explicit builder values win over environment variables, which win over the
//! platform defaults.

use std::path::PathBuf;

pub const CONFIG_FOLDER_ENV: &str = "BENCHSUITE_CONFIG_FOLDER";
pub const DATA_DIR_ENV: &str = "BENCHSUITE_DATA_DIR";
pub const PROVIDER_ENV: &str = "BENCHSUITE_PROVIDER";
pub const SERVICE_TYPE_ENV: &str = "BENCHSUITE_SERVICE_TYPE";
pub const STORAGE_CONFIG_ENV: &str = "BENCHSUITE_STORAGE_CONFIG";

const APP_DIR_NAME: &str = "benchmarking-suite";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerSettings {
    /// Searched before `default_config_dir`
    pub config_dir: Option<PathBuf>,
    pub default_config_dir: PathBuf,
    /// Holds the session store and failed-command dumps
    pub data_dir: PathBuf,
    /// Inline provider document
    pub provider_config: Option<String>,
    /// Default provider variant when a caller does not pin one
    pub service_type: Option<String>,
    /// Storage document: a path, a logical name or an inline document
    pub storage_config: Option<String>,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            config_dir: None,
            default_config_dir: default_config_dir(),
            data_dir: default_data_dir(),
            provider_config: None,
            service_type: None,
            storage_config: None,
        }
    }
}

impl ControllerSettings {
    /// Platform defaults overlaid with `BENCHSUITE_*` environment variables.
    pub fn from_env() -> Self {
        let mut settings = Self::default();
        if let Some(dir) = env_value(CONFIG_FOLDER_ENV) {
            settings.config_dir = Some(PathBuf::from(dir));
        }
        if let Some(dir) = env_value(DATA_DIR_ENV) {
            settings.data_dir = PathBuf::from(dir);
        }
        settings.provider_config = env_value(PROVIDER_ENV);
        settings.service_type = env_value(SERVICE_TYPE_ENV);
        settings.storage_config = env_value(STORAGE_CONFIG_ENV);
        settings
    }

    pub fn with_config_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config_dir = Some(dir.into());
        self
    }

    pub fn with_default_config_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.default_config_dir = dir.into();
        self
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    pub fn with_provider_config(mut self, config: impl Into<String>) -> Self {
        self.provider_config = Some(config.into());
        self
    }

    pub fn with_service_type(mut self, service_type: impl Into<String>) -> Self {
        self.service_type = Some(service_type.into());
        self
    }

    pub fn with_storage_config(mut self, config: impl Into<String>) -> Self {
        self.storage_config = Some(config.into());
        self
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from(".").join(format!(".{}", APP_DIR_NAME)))
        .join(APP_DIR_NAME)
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from(".").join(format!(".{}", APP_DIR_NAME)))
        .join(APP_DIR_NAME)
}
