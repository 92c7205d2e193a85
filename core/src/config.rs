use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

/// Environment variable holding the whole YAML document, for container hosts.
pub const CONFIG_ENV_VAR: &str = "INGEST_CONFIG";

/// Fallback for `blameless.auth_token`, so the credential can stay out of files.
pub const AUTH_TOKEN_ENV_VAR: &str = "SLI_INGEST_AUTH_TOKEN";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IngestConfig {
    pub prometheus: PrometheusConfig,
    pub blameless: BlamelessConfig,
    pub ingest: IngestSettings,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PrometheusConfig {
    pub endpoint: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BlamelessConfig {
    pub endpoint: String,
    #[serde(default)]
    pub auth_token: String,
    pub org_id: i64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IngestSettings {
    /// Days of hourly slices a backfill covers, starting 28 days ago.
    pub backfill_days: u32,
    /// Look-back of one regular ingestion.
    pub period_seconds: u32,
    /// Range query step, also the width of every record bucket.
    pub step_seconds: u32,
    /// Backfill slices processed at once; 1 keeps the run sequential.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

fn default_concurrency() -> usize {
    1
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpConfig {
    pub request_timeout_seconds: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout_seconds: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_ms: 5000,
        }
    }
}

/// Loads from `config_path` when given, otherwise from [`CONFIG_ENV_VAR`], then
/// applies environment overrides and validates.
pub fn load_config(config_path: Option<&str>) -> Result<IngestConfig, ConfigError> {
    let config = match config_path {
        Some(path) => IngestConfig::from_file(path)?,
        None => IngestConfig::from_env()?,
    }
    .with_env_overrides();
    config.validate()?;
    Ok(config)
}

impl IngestConfig {
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::LoadFailed {
            origin: path.to_string(),
            error: Box::new(e),
        })?;
        Self::from_yaml(&content, path)
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        let config_str = std::env::var(CONFIG_ENV_VAR).map_err(|_| ConfigError::MissingField {
            field: format!("{CONFIG_ENV_VAR} environment variable"),
        })?;
        Self::from_yaml(&config_str, CONFIG_ENV_VAR)
    }

    fn from_yaml(content: &str, origin: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(content).map_err(|e| ConfigError::LoadFailed {
            origin: origin.to_string(),
            error: Box::new(e),
        })
    }

    /// Fills an empty auth token from [`AUTH_TOKEN_ENV_VAR`].
    pub fn with_env_overrides(mut self) -> Self {
        if self.blameless.auth_token.is_empty() {
            if let Ok(token) = std::env::var(AUTH_TOKEN_ENV_VAR) {
                self.blameless.auth_token = token;
            }
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_endpoint("prometheus.endpoint", &self.prometheus.endpoint)?;
        validate_endpoint("blameless.endpoint", &self.blameless.endpoint)?;

        if self.blameless.auth_token.is_empty() {
            return Err(ConfigError::MissingField {
                field: "blameless.auth_token".to_string(),
            });
        }
        if self.ingest.step_seconds == 0 {
            return Err(invalid("ingest.step_seconds must be greater than zero"));
        }
        if self.ingest.period_seconds == 0 {
            return Err(invalid("ingest.period_seconds must be greater than zero"));
        }
        if self.ingest.period_seconds < self.ingest.step_seconds {
            return Err(invalid(
                "ingest.period_seconds must be at least ingest.step_seconds",
            ));
        }
        if self.ingest.backfill_days == 0 {
            return Err(invalid("ingest.backfill_days must be greater than zero"));
        }
        if self.ingest.concurrency == 0 {
            return Err(invalid("ingest.concurrency must be greater than zero"));
        }
        if self.http.request_timeout_seconds == 0 {
            return Err(invalid("http.request_timeout_seconds must be greater than zero"));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.http.request_timeout_seconds)
    }

    /// One HTTP client for the whole process; clones share its connection pool.
    pub fn build_http_client(&self) -> Result<reqwest::Client, ConfigError> {
        reqwest::Client::builder()
            .timeout(self.request_timeout())
            .build()
            .map_err(|e| ConfigError::Invalid {
                message: format!("cannot build HTTP client: {e}"),
            })
    }
}

fn validate_endpoint(field: &str, endpoint: &str) -> Result<(), ConfigError> {
    if endpoint.is_empty() {
        return Err(ConfigError::MissingField {
            field: field.to_string(),
        });
    }
    if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
        return Err(invalid(&format!("{field} must be an http(s) URL")));
    }
    Ok(())
}

fn invalid(reason: &str) -> ConfigError {
    ConfigError::ValidationFailed {
        reason: reason.to_string(),
    }
}
