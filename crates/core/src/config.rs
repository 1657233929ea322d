use serde::Deserialize;

/// Top-level application configuration, loaded from TOML by the process entry
/// point (see `config/default.toml`).
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub defaults: JobDefaults,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            api: ApiConfig::default(),
            defaults: JobDefaults::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_filter: default_log_filter(),
        }
    }
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_log_filter() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3600
}

/// Fallback job parameters used by `/crawler/create` when the request body
/// omits the optional fields.
#[derive(Debug, Clone, Deserialize)]
pub struct JobDefaults {
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,
    #[serde(default = "default_hit_rate")]
    pub hit_rate: f64,
    #[serde(default = "default_queue_capacity")]
    pub max_queue_capacity: usize,
    #[serde(default)]
    pub max_urls_to_visit: u64,
}

impl Default for JobDefaults {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            hit_rate: default_hit_rate(),
            max_queue_capacity: default_queue_capacity(),
            max_urls_to_visit: 0,
        }
    }
}

fn default_max_depth() -> u32 {
    5
}

fn default_hit_rate() -> f64 {
    1.0
}

fn default_queue_capacity() -> usize {
    1000
}
