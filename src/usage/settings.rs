//! Configuration and credential resolution

use std::env;

use serde::{Deserialize, Serialize};

/// Environment variable consulted when no API key is configured explicitly
pub const AUTH_TOKEN_ENV: &str = "ANTHROPIC_AUTH_TOKEN";

/// Monitor configuration
///
/// Read by the coordinator on every refresh cycle (never cached at startup),
/// so edits take effect on the next tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// Applied to both connection establishment and response read
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub use_mock_data: bool,
}

fn default_api_base_url() -> String {
    "https://open.bigmodel.cn/api/anthropic".to_string()
}

fn default_timeout_ms() -> u64 {
    30000
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base_url: default_api_base_url(),
            timeout_ms: default_timeout_ms(),
            use_mock_data: false,
        }
    }
}

impl Settings {
    /// Resolve the bearer token: explicit key, else `ANTHROPIC_AUTH_TOKEN`
    ///
    /// `None` means "unconfigured", a recognized terminal state of a refresh
    /// cycle, never conflated with a transport failure.
    pub fn resolve_api_key(&self) -> Option<String> {
        if !self.api_key.is_empty() {
            return Some(self.api_key.clone());
        }
        env::var(AUTH_TOKEN_ENV).ok().filter(|v| !v.is_empty())
    }
}

/// Source of the current settings, polled each refresh cycle
pub trait SettingsProvider: Send + Sync {
    fn settings(&self) -> Settings;
}

/// Fixed settings value (tests, embedding into another process)
#[derive(Debug, Clone, Default)]
pub struct StaticSettings(pub Settings);

impl SettingsProvider for StaticSettings {
    fn settings(&self) -> Settings {
        self.0.clone()
    }
}

/// Settings read from `GLM_USAGE_*` environment variables on each call
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvSettings;

impl SettingsProvider for EnvSettings {
    fn settings(&self) -> Settings {
        let defaults = Settings::default();
        Settings {
            api_key: env::var("GLM_USAGE_API_KEY").unwrap_or_default(),
            api_base_url: env::var("GLM_USAGE_BASE_URL")
                .ok()
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.api_base_url),
            timeout_ms: env::var("GLM_USAGE_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.timeout_ms),
            use_mock_data: env::var("GLM_USAGE_MOCK")
                .map(|v| v == "1" || v.to_lowercase() == "true")
                .unwrap_or(false),
        }
    }
}
