use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::dimse::PresentationContext;
use crate::transport::NetworkSettings;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub worklist: WorklistSettings,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Periodic status reporting of the server binary
    #[serde(default)]
    pub status: StatusConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        // Worklist validations
        if self.worklist.data_folder.as_os_str().is_empty() {
            return Err("worklist.data_folder must not be empty".into());
        }
        let prefix = &self.worklist.file_prefix;
        if prefix.is_empty() {
            return Err("worklist.file_prefix must not be empty".into());
        }
        if prefix.contains(['/', '\\']) || prefix.contains("..") {
            return Err("worklist.file_prefix must not contain path separators".into());
        }
        // Network validations
        if self.network.port == 0 {
            return Err("network.port must be > 0".into());
        }
        let ae = self.network.ae_title.trim();
        if ae.is_empty() || ae.len() > 16 {
            return Err("network.ae_title must be 1 to 16 characters".into());
        }
        if self.network.max_receive_pdu_length < 4096 {
            return Err("network.max_receive_pdu_length must be >= 4096".into());
        }
        if self.network.connection_timeout_secs == 0
            || self.network.dimse_timeout_secs == 0
            || self.network.acse_timeout_secs == 0
        {
            return Err("network timeouts must be > 0".into());
        }
        // Logging validation
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        if self.status.report_interval_secs == 0 {
            return Err("status.report_interval_secs must be > 0".into());
        }
        Ok(())
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.status.report_interval_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorklistSettings {
    /// Folder holding one Part-10 file per worklist entry
    #[serde(default = "default_data_folder")]
    pub data_folder: PathBuf,
    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,
    /// Dataset cloned into every newly added entry
    #[serde(default)]
    pub template_file: Option<PathBuf>,
}

impl Default for WorklistSettings {
    fn default() -> Self {
        Self {
            data_folder: default_data_folder(),
            file_prefix: default_file_prefix(),
            template_file: None,
        }
    }
}

fn default_data_folder() -> PathBuf {
    PathBuf::from("./worklist/")
}
fn default_file_prefix() -> String {
    octowl_storage::DEFAULT_PREFIX.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_ae_title")]
    pub ae_title: String,
    #[serde(default = "default_max_pdu")]
    pub max_receive_pdu_length: u32,
    #[serde(default = "default_timeout_secs")]
    pub connection_timeout_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub dimse_timeout_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub acse_timeout_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            ae_title: default_ae_title(),
            max_receive_pdu_length: default_max_pdu(),
            connection_timeout_secs: default_timeout_secs(),
            dimse_timeout_secs: default_timeout_secs(),
            acse_timeout_secs: default_timeout_secs(),
        }
    }
}

impl NetworkConfig {
    pub fn to_settings(&self) -> NetworkSettings {
        NetworkSettings {
            port: self.port,
            ae_title: self.ae_title.trim().to_string(),
            max_receive_pdu_length: self.max_receive_pdu_length,
            connection_timeout: Duration::from_secs(self.connection_timeout_secs),
            dimse_timeout: Duration::from_secs(self.dimse_timeout_secs),
            acse_timeout: Duration::from_secs(self.acse_timeout_secs),
            presentation_contexts: vec![PresentationContext::worklist_find(1)],
        }
    }
}

fn default_port() -> u16 {
    104
}
fn default_ae_title() -> String {
    "WORKLIST_SCP".to_string()
}
fn default_max_pdu() -> u32 {
    16384
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusConfig {
    #[serde(default = "default_report_interval")]
    pub report_interval_secs: u64,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            report_interval_secs: default_report_interval(),
        }
    }
}

fn default_report_interval() -> u64 {
    5
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File};
    use std::path::{Path, PathBuf};

    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let mut builder = Config::builder();
        match path {
            Some(p) => {
                let pathbuf = PathBuf::from(p);
                if pathbuf.exists() {
                    builder = builder.add_source(File::from(pathbuf));
                }
            }
            None => {
                // Try default root-level file
                let default_path = PathBuf::from("octowl.toml");
                if default_path.exists() {
                    builder = builder.add_source(File::from(default_path));
                }
            }
        }
        // Environment variable overrides, e.g., OCTOWL__NETWORK__PORT=11112
        builder = builder.add_source(
            Environment::with_prefix("OCTOWL")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        merged.validate()?;
        Ok(merged)
    }

    pub fn load_config_with_default_path<P: AsRef<Path>>(
        path: Option<P>,
    ) -> Result<AppConfig, String> {
        let p = path
            .as_ref()
            .map(|p| p.as_ref().to_string_lossy().to_string());
        load_config(p.as_deref())
    }
}
