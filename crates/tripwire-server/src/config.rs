use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tripwire_alert::{EvaluatorConfig, DEFAULT_CRITICAL_METRICS};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub evaluation: EvaluationConfig,
    #[serde(default)]
    pub escalation: EscalationConfig,
    #[serde(default)]
    pub analytics: AnalyticsConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub id: IdConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
        }
    }
}

impl DatabaseConfig {
    /// The URL with any `user:password@` credentials masked, for logging.
    pub fn redacted_url(&self) -> String {
        let Some((scheme, rest)) = self.url.split_once("://") else {
            return self.url.clone();
        };
        match rest.split_once('@') {
            Some((creds, host)) if creds.contains(':') => {
                let user = creds.split(':').next().unwrap_or_default();
                format!("{scheme}://{user}:***@{host}")
            }
            _ => self.url.clone(),
        }
    }
}

fn default_critical_metrics() -> Vec<String> {
    DEFAULT_CRITICAL_METRICS.iter().map(|m| m.to_string()).collect()
}

fn default_database_url() -> String {
    "sqlite://data/tripwire.db?mode=rwc".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Metric names evaluated on ingest instead of waiting for the cycle.
    /// Setting it replaces the built-in list.
    #[serde(default = "default_critical_metrics")]
    pub critical_metrics: Vec<String>,
    /// Added to `critical_metrics`.
    #[serde(default)]
    pub extra_critical_metrics: Vec<String>,
    #[serde(default = "default_buffer_retention_secs")]
    pub buffer_retention_secs: u64,
    #[serde(default = "default_buffer_max_samples")]
    pub buffer_max_samples: usize,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            batch_size: default_batch_size(),
            critical_metrics: default_critical_metrics(),
            extra_critical_metrics: Vec::new(),
            buffer_retention_secs: default_buffer_retention_secs(),
            buffer_max_samples: default_buffer_max_samples(),
        }
    }
}

impl EvaluationConfig {
    pub fn evaluator_config(&self) -> EvaluatorConfig {
        EvaluatorConfig {
            batch_size: self.batch_size,
            critical_metrics: self
                .critical_metrics
                .iter()
                .chain(&self.extra_critical_metrics)
                .cloned()
                .collect::<HashSet<_>>(),
            buffer_retention_secs: self.buffer_retention_secs,
            buffer_max_samples: self.buffer_max_samples,
        }
    }
}

fn default_interval_secs() -> u64 {
    30
}

fn default_batch_size() -> usize {
    10
}

fn default_buffer_retention_secs() -> u64 {
    600
}

fn default_buffer_max_samples() -> usize {
    1000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Schedule the next policy step after one fires. Off means only the
    /// first step of a policy is ever sent.
    #[serde(default)]
    pub chain_steps: bool,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            chain_steps: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdConfig {
    #[serde(default = "default_id_part")]
    pub machine_id: i32,
    #[serde(default = "default_id_part")]
    pub node_id: i32,
}

impl Default for IdConfig {
    fn default() -> Self {
        Self {
            machine_id: default_id_part(),
            node_id: default_id_part(),
        }
    }
}

fn default_id_part() -> i32 {
    1
}

fn default_true() -> bool {
    true
}

impl ServerConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path, e))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.evaluation.interval_secs == 0 {
            anyhow::bail!("evaluation.interval_secs must be greater than 0");
        }
        if self.evaluation.batch_size == 0 {
            anyhow::bail!("evaluation.batch_size must be greater than 0");
        }
        for (name, value) in [("id.machine_id", self.id.machine_id), ("id.node_id", self.id.node_id)] {
            if !(0..32).contains(&value) {
                anyhow::bail!("{name} must be in 0..32, got {value}");
            }
        }
        Ok(())
    }
}
