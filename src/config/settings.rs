use serde::Deserialize;

use crate::utils::constants::{
    DEFAULT_CHECK_INTERVAL_HOURS, DEFAULT_REFRESH_WINDOW_HOURS, REFRESH_SAFETY_MARGIN_DAYS,
};

/// ================================
/// Full service configuration
/// ================================
#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    pub provider: ProviderConfig,
    pub store: StoreConfig,
    #[serde(default)]
    pub encryption: EncryptionConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
    pub server: ServerConfig,
    /// Static key guarding the internal endpoints (scheduled refresh,
    /// re-encryption). Compared in constant time.
    pub internal_api_key: String,
    #[serde(default)]
    pub metrics: MetricsConfig,
    pub logging: Option<LoggingConfig>,
}

/// ================================
/// Provider (Graph-style API)
/// ================================
#[derive(Debug, Deserialize, Clone)]
pub struct ProviderConfig {
    pub app_id: String,
    pub app_secret: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    pub redirect_uri: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_consent_url")]
    pub consent_url: String,
    #[serde(default = "default_scopes")]
    pub default_scopes: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    pub path: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct EncryptionConfig {
    /// At-rest encryption secret; falls back to TOKEN_KEEPER_SECRET_KEY env.
    pub secret_key: Option<String>,
}

/// ================================
/// Refresh policy
/// ================================
#[derive(Debug, Deserialize, Clone, Default)]
pub struct RefreshConfig {
    /// Tokens with more remaining life than this are never exchanged.
    pub safety_margin_days: Option<i64>,
    /// How often the background worker scans for expiring tokens.
    pub check_interval_hours: Option<u64>,
    /// Default horizon for scheduled refresh sweeps.
    pub within_hours: Option<u64>,
    pub retry: Option<RetryConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetryConfig {
    /// Refresh-and-retry attempts after an expired-token provider error.
    /// invariant: bounded; there is no retry loop
    pub refresh_attempts: Option<u32>,
}

impl RefreshConfig {
    pub fn safety_margin_days(&self) -> i64 {
        self.safety_margin_days.unwrap_or(REFRESH_SAFETY_MARGIN_DAYS)
    }

    pub fn check_interval_hours(&self) -> u64 {
        self.check_interval_hours.unwrap_or(DEFAULT_CHECK_INTERVAL_HOURS)
    }

    pub fn within_hours(&self) -> u64 {
        self.within_hours.unwrap_or(DEFAULT_REFRESH_WINDOW_HOURS)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_path")]
    pub path: String,
    #[serde(default)]
    pub is_enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            path: default_metrics_path(),
            is_enabled: false,
        }
    }
}

/// ================================
/// Logging
/// ================================
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    pub level: String, // allowed: trace, debug, info, warn, error
    pub format: LogFormat,
}

impl LoggingConfig {
    pub fn new(level: String, format: LogFormat) -> Self {
        Self { level, format }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Compact,
}

impl LogFormat {
    pub fn from_env() -> Self {
        match std::env::var("LOG_FORMAT")
            .unwrap_or_else(|_| "json".to_string())
            .to_lowercase()
            .as_str()
        {
            "compact" | "text" => LogFormat::Compact,
            _ => LogFormat::Json,
        }
    }
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

fn default_api_version() -> String {
    "v22.0".to_string()
}

fn default_base_url() -> String {
    "https://graph.facebook.com".to_string()
}

fn default_consent_url() -> String {
    "https://www.facebook.com".to_string()
}

fn default_scopes() -> Vec<String> {
    vec![
        "public_profile".to_string(),
        "pages_show_list".to_string(),
        "pages_read_engagement".to_string(),
        "ads_read".to_string(),
    ]
}
