use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::core::{MatcherOptions, ProcessedPolicy};
use crate::models::ScoringRules;
use crate::services::store::DEFAULT_UNSCOPED_LIMIT;

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub database: DatabaseSettings,
    #[serde(default)]
    pub matching: MatchingSettings,
    #[serde(default)]
    pub scoring: ScoringRules,
    #[serde(default)]
    pub notification: NotificationSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: Option<u32>,
    pub min_connections: Option<u32>,
    pub acquire_timeout_secs: Option<u64>,
    pub idle_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MatchingSettings {
    /// Applicants pulled per run when no ingestion batch is given
    #[serde(default = "default_limit")]
    pub default_limit: usize,
    #[serde(default = "default_error_cap")]
    pub error_cap: usize,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    pub time_budget_secs: Option<u64>,
    #[serde(default)]
    pub processed_policy: ProcessedPolicy,
}

impl Default for MatchingSettings {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            error_cap: default_error_cap(),
            concurrency: default_concurrency(),
            time_budget_secs: None,
            processed_policy: ProcessedPolicy::default(),
        }
    }
}

fn default_limit() -> usize { DEFAULT_UNSCOPED_LIMIT }
fn default_error_cap() -> usize { 10 }
fn default_concurrency() -> usize { 1 }

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationSettings {
    /// Base URL of the workflow engine; notifications are skipped when unset
    pub webhook_url: Option<String>,
    #[serde(default = "default_notify_timeout")]
    pub timeout_secs: u64,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            webhook_url: None,
            timeout_secs: default_notify_timeout(),
        }
    }
}

fn default_notify_timeout() -> u64 { 30 }

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
    /// 4. Environment variables (prefixed with ELIGIBILITY__)
    pub fn load() -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // e.g., ELIGIBILITY__MATCHING__ERROR_CAP -> matching.error_cap
            .add_source(
                Environment::with_prefix("ELIGIBILITY")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings = apply_env_overrides(settings)?;

        settings.try_deserialize()
    }

    /// Load configuration from a custom path
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(
                Environment::with_prefix("ELIGIBILITY")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings = apply_env_overrides(settings)?;

        settings.try_deserialize()
    }

    /// Options for the batch matcher derived from these settings
    pub fn matcher_options(&self) -> MatcherOptions {
        MatcherOptions {
            scoring: self.scoring.clone(),
            error_cap: self.matching.error_cap,
            concurrency: self.matching.concurrency.max(1),
            time_budget: self.matching.time_budget_secs.map(Duration::from_secs),
            processed_policy: self.matching.processed_policy,
        }
    }
}

/// Conventional variables (`DATABASE_URL`, `N8N_WEBHOOK_URL`) win over files
fn apply_env_overrides(settings: Config) -> Result<Config, ConfigError> {
    use std::env;

    let database_url = env::var("DATABASE_URL").ok();
    let webhook_url = env::var("N8N_WEBHOOK_URL").ok();

    let mut builder = Config::builder().add_source(settings);

    if let Some(url) = database_url {
        builder = builder.set_override("database.url", url)?;
    }
    if let Some(url) = webhook_url {
        builder = builder.set_override("notification.webhook_url", url)?;
    }

    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Serializes tests that read or write process environment variables.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn write_config(contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!(
            "eligibility-config-{}.toml",
            uuid::Uuid::new_v4().simple()
        ));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_defaults_fill_missing_sections() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|p| p.into_inner());
        let path = write_config(
            r#"
            [database]
            url = "postgres://localhost/test"
            "#,
        );

        let settings = Settings::load_from(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(settings.matching.default_limit, 100);
        assert_eq!(settings.matching.error_cap, 10);
        assert_eq!(settings.matching.processed_policy, ProcessedPolicy::Always);
        assert_eq!(settings.scoring, ScoringRules::default());
        assert!(settings.notification.webhook_url.is_none());
        assert_eq!(settings.logging.level, "info");
        assert_eq!(settings.logging.format, "json");
    }

    #[test]
    fn test_matcher_options_from_settings() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|p| p.into_inner());
        let path = write_config(
            r#"
            [database]
            url = "postgres://localhost/test"

            [matching]
            error_cap = 3
            concurrency = 0
            time_budget_secs = 45
            processed_policy = "on_success"

            [scoring]
            income_threshold = 4000.0
            currency_symbol = "$"
            "#,
        );

        let settings = Settings::load_from(&path).unwrap();
        std::fs::remove_file(&path).ok();
        let options = settings.matcher_options();

        assert_eq!(options.error_cap, 3);
        assert_eq!(options.concurrency, 1);
        assert_eq!(options.time_budget, Some(Duration::from_secs(45)));
        assert_eq!(options.processed_policy, ProcessedPolicy::OnSuccess);
        assert_eq!(options.scoring.income_threshold, 4000.0);
        assert_eq!(options.scoring.base, 60);
        assert_eq!(options.scoring.currency_symbol, "$");
    }

    #[test]
    fn test_conventional_env_vars_override_custom_file() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|p| p.into_inner());
        let path = write_config(
            r#"
            [database]
            url = "postgres://file/db"
            "#,
        );

        std::env::set_var("DATABASE_URL", "postgres://env/db");
        std::env::set_var("N8N_WEBHOOK_URL", "http://n8n:5678");
        let settings = Settings::load_from(&path);
        std::env::remove_var("DATABASE_URL");
        std::env::remove_var("N8N_WEBHOOK_URL");
        std::fs::remove_file(&path).ok();

        let settings = settings.unwrap();
        assert_eq!(settings.database.url, "postgres://env/db");
        assert_eq!(
            settings.notification.webhook_url.as_deref(),
            Some("http://n8n:5678")
        );
    }
}
