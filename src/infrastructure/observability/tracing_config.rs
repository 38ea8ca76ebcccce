use crate::presentation::config::{ENVIRONMENT_VAR, Environment, LoggingSettings};

/// Configuration for tracing initialization.
pub struct TracingConfig {
    pub environment: String,
    pub json_format: bool,
    pub default_directives: String,
}

impl TracingConfig {
    pub fn from_settings(settings: &LoggingSettings, environment: Environment) -> Self {
        Self {
            environment: environment.to_string(),
            json_format: settings.enable_json || Self::json_requested(),
            default_directives: format!(
                "{level},knowbase=debug,tower_http=debug",
                level = settings.level
            ),
        }
    }

    fn json_requested() -> bool {
        std::env::var("LOG_FORMAT")
            .map(|v| v.eq_ignore_ascii_case("json"))
            .unwrap_or(false)
    }
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            environment: std::env::var(ENVIRONMENT_VAR).unwrap_or_else(|_| "local".to_string()),
            json_format: Self::json_requested(),
            default_directives: "info,knowbase=debug,tower_http=debug".to_string(),
        }
    }
}
