use anyhow::{Context, Result};
use chrono::NaiveTime;
use serde::Deserialize;

/// Path of the TOML config file, if any
pub const CONFIG_PATH_ENV: &str = "TRACKHUB_CONFIG";
/// Overrides `server.bind`
pub const BIND_ENV: &str = "TRACKHUB_BIND";

/// Complete hub configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HubConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub reset: ResetConfig,
    #[serde(default)]
    pub enrichment: EnrichmentConfig,
    #[serde(default)]
    pub channels: ChannelsConfig,
}

/// Listener configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "0.0.0.0:3005".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

/// Daily wipe of the location state
#[derive(Debug, Clone, Deserialize)]
pub struct ResetConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// UTC wall-clock time, `HH:MM:SS`
    #[serde(default = "default_reset_time")]
    pub utc_time: String,
}

fn default_true() -> bool {
    true
}

fn default_reset_time() -> String {
    "18:30:00".to_string()
}

impl Default for ResetConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            utc_time: default_reset_time(),
        }
    }
}

impl ResetConfig {
    pub fn fire_time(&self) -> Result<NaiveTime> {
        NaiveTime::parse_from_str(&self.utc_time, "%H:%M:%S")
            .with_context(|| format!("Invalid reset.utc_time '{}', expected HH:MM:SS", self.utc_time))
    }
}

/// Customer name lookup service
#[derive(Debug, Clone, Deserialize)]
pub struct EnrichmentConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_query_param")]
    pub query_param: String,
}

fn default_endpoint() -> String {
    "http://proogle.ml:4098/customerInfo".to_string()
}

fn default_query_param() -> String {
    "customer_id".to_string()
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            endpoint: default_endpoint(),
            query_param: default_query_param(),
        }
    }
}

/// Channel names
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelsConfig {
    #[serde(default = "default_location_channel")]
    pub location: String,
    #[serde(default = "default_workbench_channel")]
    pub workbench: String,
    #[serde(default = "default_stage_channels")]
    pub stages: Vec<String>,
}

fn default_location_channel() -> String {
    "location".to_string()
}

fn default_workbench_channel() -> String {
    "workbench".to_string()
}

fn default_stage_channels() -> Vec<String> {
    vec![
        "eda".to_string(),
        "supervised".to_string(),
        "unsupervised".to_string(),
    ]
}

impl Default for ChannelsConfig {
    fn default() -> Self {
        Self {
            location: default_location_channel(),
            workbench: default_workbench_channel(),
            stages: default_stage_channels(),
        }
    }
}

impl HubConfig {
    /// Load from `TRACKHUB_CONFIG` (or defaults), then apply env overrides
    pub fn from_env() -> Result<Self> {
        let mut config = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => load_config(&path)?,
            Err(_) => Self::default(),
        };
        if let Ok(bind) = std::env::var(BIND_ENV) {
            config.server.bind = bind;
        }
        Ok(config)
    }
}

/// Load configuration from TOML file
pub fn load_config(path: &str) -> Result<HubConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path))?;
    toml::from_str(&contents).with_context(|| format!("Failed to parse config file {}", path))
}
