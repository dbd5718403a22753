use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub backend: BackendSettings,
    pub collection: CollectionSettings,
    #[serde(default)]
    pub discovery: DiscoverySettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub workers: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendSettings {
    pub endpoint: String,
    pub api_key: String,
    pub project_id: String,
    pub database_id: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 { 30 }

#[derive(Debug, Clone, Deserialize)]
pub struct CollectionSettings {
    pub professionals: String,
    pub connection_requests: String,
    pub connections: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscoverySettings {
    /// TOML service catalog; the built-in catalog is used when unset
    pub catalog_path: Option<String>,
    #[serde(default = "default_location_ttl_secs")]
    pub location_ttl_secs: u64,
    #[serde(default = "default_session_idle_secs")]
    pub session_idle_secs: u64,
    #[serde(default = "default_max_sessions")]
    pub max_sessions: u64,
    #[serde(default = "default_detail_cache_size")]
    pub detail_cache_size: u64,
    #[serde(default = "default_detail_cache_ttl_secs")]
    pub detail_cache_ttl_secs: u64,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            catalog_path: None,
            location_ttl_secs: default_location_ttl_secs(),
            session_idle_secs: default_session_idle_secs(),
            max_sessions: default_max_sessions(),
            detail_cache_size: default_detail_cache_size(),
            detail_cache_ttl_secs: default_detail_cache_ttl_secs(),
        }
    }
}

fn default_location_ttl_secs() -> u64 { 600 }
fn default_session_idle_secs() -> u64 { 1800 }
fn default_max_sessions() -> u64 { 10_000 }
fn default_detail_cache_size() -> u64 { 5_000 }
fn default_detail_cache_ttl_secs() -> u64 { 3600 }

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "json".to_string() }

impl Settings {
    /// Load configuration from file and environment variables
    ///
    /// Configuration is loaded in the following order (later overrides earlier):
    /// 1. Default values in the struct
    /// 2. Configuration file (config/default.toml)
    /// 3. Local overrides (config/local.toml)
    /// 4. Environment variables (prefixed with DISCOVERY__)
    pub fn load() -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // e.g., DISCOVERY__SERVER__PORT -> server.port
            .add_source(environment())
            .build()?;

        let settings = apply_backend_env(settings)?;

        settings.try_deserialize()
    }

    /// Load configuration from a custom path
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(environment())
            .build()?;

        settings.try_deserialize()
    }
}

fn environment() -> Environment {
    Environment::with_prefix("DISCOVERY")
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
}

/// Apply the short backend variables used by deployment scripts
///
/// `BACKEND_ENDPOINT`, `BACKEND_API_KEY`, `BACKEND_PROJECT_ID` and
/// `BACKEND_DATABASE_ID` override the matching `backend.*` keys.
fn apply_backend_env(settings: Config) -> Result<Config, ConfigError> {
    use std::env;

    let overrides = [
        ("BACKEND_ENDPOINT", "backend.endpoint"),
        ("BACKEND_API_KEY", "backend.api_key"),
        ("BACKEND_PROJECT_ID", "backend.project_id"),
        ("BACKEND_DATABASE_ID", "backend.database_id"),
    ];

    let mut builder = Config::builder().add_source(settings);
    for (var, key) in overrides {
        if let Ok(value) = env::var(var) {
            builder = builder.set_override(key, value)?;
        }
    }

    builder.build()
}
