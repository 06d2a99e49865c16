//! Configuration management for ASF-Guardian
//!
//! Settings are read from a TOML file and then overridden by the
//! environment variables the deployment scripts already export
//! (`DATABASE_URL`, `OPENAI_API_KEY`, `SMTP_*`, ...).

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Failed to write config file: {0}")]
    Write(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Database settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite URL or path, `:memory:` for a throwaway database
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://asf_guardian.db".to_string(),
            max_connections: 5,
        }
    }
}

/// REST API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub bind: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8000".to_string(),
        }
    }
}

/// Recovery simulation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Probability that a simulated action succeeds (0.0-1.0)
    pub success_rate: f64,
    /// Simulated execution time of a single action
    pub action_delay_ms: u64,
    /// Fixed RNG seed, random when absent
    pub seed: Option<u64>,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            success_rate: 0.8,
            action_delay_ms: 500,
            seed: None,
        }
    }
}

impl RecoveryConfig {
    pub fn action_delay(&self) -> Duration {
        Duration::from_millis(self.action_delay_ms)
    }
}

/// Background worker settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub system_health_enabled: bool,
    pub system_health_interval_secs: u64,
    pub services_enabled: bool,
    pub services_interval_secs: u64,
    pub daily_summary_enabled: bool,
    pub daily_summary_interval_secs: u64,
    /// Services whose response time is sampled by the service monitor
    pub services: Vec<String>,
    /// Capacity of the in-process job queue
    pub queue_capacity: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            system_health_enabled: true,
            system_health_interval_secs: 60,
            services_enabled: true,
            services_interval_secs: 120,
            daily_summary_enabled: false,
            daily_summary_interval_secs: 24 * 60 * 60,
            services: vec![
                "web-api".to_string(),
                "database".to_string(),
                "cache-server".to_string(),
                "auth-service".to_string(),
                "payment-service".to_string(),
            ],
            queue_capacity: 256,
        }
    }
}

/// SMTP settings for incident alerts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub alert_email: String,
}

impl Default for SmtpSettings {
    fn default() -> Self {
        Self {
            host: "smtp.gmail.com".to_string(),
            port: 587,
            user: String::new(),
            password: String::new(),
            alert_email: "admin@example.com".to_string(),
        }
    }
}

impl SmtpSettings {
    /// Whether credentials are present
    pub fn has_credentials(&self) -> bool {
        !self.user.is_empty() && !self.password.is_empty()
    }
}

/// AI advisor settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvisorConfig {
    pub api_key: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub endpoint: String,
    pub timeout_secs: u64,
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "gpt-3.5-turbo".to_string(),
            max_tokens: 500,
            temperature: 0.7,
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            timeout_secs: 30,
        }
    }
}

impl AdvisorConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Terminal dashboard settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub refresh_secs: u64,
    pub incident_limit: i64,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            refresh_secs: 5,
            incident_limit: 100,
        }
    }
}

/// Default metric thresholds
pub fn default_thresholds() -> BTreeMap<String, f64> {
    BTreeMap::from([
        ("cpu".to_string(), 80.0),
        ("memory".to_string(), 85.0),
        ("disk".to_string(), 90.0),
        ("response_time".to_string(), 5000.0),
        ("error_rate".to_string(), 5.0),
    ])
}

/// Thresholds from a config file are merged over the defaults
fn merge_thresholds<'de, D>(deserializer: D) -> Result<BTreeMap<String, f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let overrides = BTreeMap::<String, f64>::deserialize(deserializer)?;
    let mut thresholds = default_thresholds();
    thresholds.extend(overrides);
    Ok(thresholds)
}

/// Translate a SQLAlchemy-style SQLite URL into the sqlx form.
///
/// SQLAlchemy treats `sqlite:///db.sqlite` as relative and
/// `sqlite:////var/db.sqlite` as absolute, where sqlx reads the part after
/// `sqlite://` as the path.
pub fn normalize_database_url(url: &str) -> String {
    match url.strip_prefix("sqlite:///") {
        Some(path) if !path.is_empty() => format!("sqlite://{}", path),
        _ => url.to_string(),
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardianConfig {
    pub database: DatabaseConfig,
    pub api: ApiConfig,
    #[serde(deserialize_with = "merge_thresholds")]
    pub thresholds: BTreeMap<String, f64>,
    pub recovery: RecoveryConfig,
    pub worker: WorkerConfig,
    pub smtp: SmtpSettings,
    pub advisor: AdvisorConfig,
    pub dashboard: DashboardConfig,
}

impl Default for GuardianConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            api: ApiConfig::default(),
            thresholds: default_thresholds(),
            recovery: RecoveryConfig::default(),
            worker: WorkerConfig::default(),
            smtp: SmtpSettings::default(),
            advisor: AdvisorConfig::default(),
            dashboard: DashboardConfig::default(),
        }
    }
}

impl GuardianConfig {
    /// Default location of the config file
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("asf-guardian").join("config.toml"))
    }

    /// Load configuration from file, falling back to defaults when the file
    /// does not exist
    pub async fn load_from_file(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            tracing::debug!("Config file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;

        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> ConfigResult<Self> {
        let config: GuardianConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve the effective configuration: file (explicit or default
    /// location) then environment overrides
    pub async fn load(path: Option<&Path>) -> ConfigResult<Self> {
        let path = match path {
            Some(path) => Some(path.to_path_buf()),
            None => Self::default_path(),
        };

        let mut config = match path {
            Some(path) => Self::load_from_file(&path).await?,
            None => Self::default(),
        };

        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from an environment lookup
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("DATABASE_URL") {
            self.database.url = normalize_database_url(&url);
        }
        if let Some(bind) = lookup("ASF_API_BIND") {
            self.api.bind = bind;
        }
        if let Some(key) = lookup("OPENAI_API_KEY") {
            self.advisor.api_key = key;
        }
        if let Some(host) = lookup("SMTP_HOST") {
            self.smtp.host = host;
        }
        if let Some(port) = lookup("SMTP_PORT") {
            match port.parse() {
                Ok(port) => self.smtp.port = port,
                Err(_) => tracing::warn!("Ignoring invalid SMTP_PORT value: {}", port),
            }
        }
        if let Some(user) = lookup("SMTP_USER") {
            self.smtp.user = user;
        }
        if let Some(password) = lookup("SMTP_PASSWORD") {
            self.smtp.password = password;
        }
        if let Some(email) = lookup("ALERT_EMAIL") {
            self.smtp.alert_email = email;
        }
    }

    /// Save configuration to file
    pub async fn save_to_file(&self, path: &Path) -> ConfigResult<()> {
        self.validate()?;
        let content = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    /// Validate configuration settings
    pub fn validate(&self) -> ConfigResult<()> {
        if !(0.0..=1.0).contains(&self.recovery.success_rate) {
            return Err(ConfigError::Invalid(
                "recovery.success_rate must be between 0.0 and 1.0".to_string(),
            ));
        }

        if !(0.0..=2.0).contains(&self.advisor.temperature) {
            return Err(ConfigError::Invalid(
                "advisor.temperature must be between 0.0 and 2.0".to_string(),
            ));
        }

        if self.advisor.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "advisor.timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "database.max_connections must be greater than 0".to_string(),
            ));
        }

        let intervals = [
            ("worker.system_health_interval_secs", self.worker.system_health_interval_secs),
            ("worker.services_interval_secs", self.worker.services_interval_secs),
            ("worker.daily_summary_interval_secs", self.worker.daily_summary_interval_secs),
            ("dashboard.refresh_secs", self.dashboard.refresh_secs),
        ];
        for (name, value) in intervals {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{} must be greater than 0", name)));
            }
        }

        if self.worker.queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "worker.queue_capacity must be greater than 0".to_string(),
            ));
        }

        for (metric, threshold) in &self.thresholds {
            if !threshold.is_finite() || *threshold <= 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "threshold for {} must be a positive number",
                    metric
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = GuardianConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.thresholds.get("cpu"), Some(&80.0));
        assert_eq!(config.thresholds.get("response_time"), Some(&5000.0));
        assert_eq!(config.smtp.port, 587);
        assert_eq!(config.advisor.model, "gpt-3.5-turbo");
        assert_eq!(config.worker.services.len(), 5);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = GuardianConfig::from_toml(
            r#"
            [api]
            bind = "127.0.0.1:9000"

            [thresholds]
            cpu = 70.0
            "#,
        )
        .unwrap();

        assert_eq!(config.api.bind, "127.0.0.1:9000");
        assert_eq!(config.thresholds.get("cpu"), Some(&70.0));
        assert_eq!(config.thresholds.get("memory"), Some(&85.0));
        assert_eq!(config.thresholds.get("disk"), Some(&90.0));
        assert_eq!(config.recovery.success_rate, 0.8);
    }

    #[test]
    fn test_config_validation() {
        let mut config = GuardianConfig::default();

        config.recovery.success_rate = 1.5;
        assert!(config.validate().is_err());
        config.recovery.success_rate = 0.5;
        assert!(config.validate().is_ok());

        config.worker.services_interval_secs = 0;
        assert!(config.validate().is_err());
        config.worker.services_interval_secs = 10;

        config.thresholds.insert("cpu".to_string(), -1.0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("DATABASE_URL", ":memory:"),
            ("OPENAI_API_KEY", "sk-test"),
            ("SMTP_PORT", "2525"),
            ("SMTP_USER", "alerts@example.com"),
            ("SMTP_PASSWORD", "secret"),
        ]);

        let mut config = GuardianConfig::default();
        config.apply_env_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.database.url, ":memory:");
        assert_eq!(config.advisor.api_key, "sk-test");
        assert_eq!(config.smtp.port, 2525);
        assert!(config.smtp.has_credentials());
        assert_eq!(config.smtp.alert_email, "admin@example.com");
    }

    #[test]
    fn test_extra_threshold_is_added() {
        let config = GuardianConfig::from_toml("[thresholds]\nqueue_depth = 1000.0\n").unwrap();
        assert_eq!(config.thresholds.get("queue_depth"), Some(&1000.0));
        assert_eq!(config.thresholds.len(), 6);
    }

    #[test]
    fn test_sqlalchemy_database_url_is_normalized() {
        assert_eq!(
            normalize_database_url("sqlite:///./asf_guardian.db"),
            "sqlite://./asf_guardian.db"
        );
        assert_eq!(
            normalize_database_url("sqlite:////var/lib/guardian.db"),
            "sqlite:///var/lib/guardian.db"
        );
        assert_eq!(
            normalize_database_url("sqlite://asf_guardian.db"),
            "sqlite://asf_guardian.db"
        );
        assert_eq!(normalize_database_url(":memory:"), ":memory:");

        let mut config = GuardianConfig::default();
        config.apply_env_overrides(|key| {
            (key == "DATABASE_URL").then(|| "sqlite:///./asf_guardian.db".to_string())
        });
        assert_eq!(config.database.url, "sqlite://./asf_guardian.db");
    }

    #[test]
    fn test_invalid_port_override_is_ignored() {
        let mut config = GuardianConfig::default();
        config.apply_env_overrides(|key| (key == "SMTP_PORT").then(|| "not-a-port".to_string()));
        assert_eq!(config.smtp.port, 587);
    }

    #[tokio::test]
    async fn test_config_file_operations() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("nested").join("config.toml");

        let mut config = GuardianConfig::default();
        config.recovery.seed = Some(42);
        config.worker.services = vec!["checkout".to_string()];

        config.save_to_file(&config_path).await.unwrap();
        let loaded = GuardianConfig::load_from_file(&config_path).await.unwrap();

        assert_eq!(loaded.recovery.seed, Some(42));
        assert_eq!(loaded.worker.services, vec!["checkout".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_file_uses_defaults() {
        let temp_dir = tempdir().unwrap();
        let loaded = GuardianConfig::load_from_file(&temp_dir.path().join("absent.toml"))
            .await
            .unwrap();
        assert_eq!(loaded.api.bind, "0.0.0.0:8000");
    }
}
