use std::{collections::HashSet, fs, path::PathBuf};

use anyhow::{bail, Context};
use serde::Deserialize;

use crate::status::ActivityPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    Postgres,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    pub kind: StoreKind,
    pub uri: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// NDJSON file of captured metering API responses.
    Capture,
    /// CSV export of hourly readings.
    Csv,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub kind: SourceKind,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImporterConfig {
    #[serde(default = "default_window_hours")]
    pub window_hours: u32,
    #[serde(default = "default_cold_start_lookback_hours")]
    pub cold_start_lookback_hours: u32,
    /// No fetch is attempted while the checkpoint is at most this old.
    #[serde(default = "default_gate_hours")]
    pub gate_hours: u32,
    /// Raw readings are divided by this to get kWh.
    #[serde(default = "default_unit_divisor")]
    pub unit_divisor: f64,
    #[serde(default)]
    pub activity_policy: ActivityPolicy,
}

impl Default for ImporterConfig {
    fn default() -> Self {
        Self {
            window_hours: default_window_hours(),
            cold_start_lookback_hours: default_cold_start_lookback_hours(),
            gate_hours: default_gate_hours(),
            unit_divisor: default_unit_divisor(),
            activity_policy: ActivityPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleConfig {
    pub interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub bind_addr: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeriesConfig {
    pub id: String,
    pub label: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub source: SourceConfig,
    #[serde(default)]
    pub importer: ImporterConfig,
    pub schedule: Option<ScheduleConfig>,
    pub metrics: Option<MetricsConfig>,
    #[serde(default)]
    pub series: Vec<SeriesConfig>,
}

fn default_max_connections() -> u32 {
    4
}

fn default_batch_size() -> usize {
    500
}

fn default_window_hours() -> u32 {
    24
}

fn default_cold_start_lookback_hours() -> u32 {
    48
}

fn default_gate_hours() -> u32 {
    24
}

fn default_unit_divisor() -> f64 {
    1000.0
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        use std::env;

        let path = env::var("SMARTMETER_CONFIG").unwrap_or_else(|_| "smartmeter-config.toml".to_string());
        let contents = fs::read_to_string(&path).with_context(|| format!("failed to read config `{path}`"))?;
        Self::from_toml_str(&contents).with_context(|| format!("invalid config `{path}`"))
    }

    pub fn from_toml_str(contents: &str) -> anyhow::Result<Self> {
        let cfg: AppConfig = toml::from_str(contents)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.importer.window_hours == 0 {
            bail!("importer.window_hours must be positive");
        }
        if self.importer.gate_hours == 0 {
            bail!("importer.gate_hours must be positive");
        }
        if !self.importer.unit_divisor.is_finite() || self.importer.unit_divisor <= 0.0 {
            bail!("importer.unit_divisor must be a positive number");
        }
        if self.store.kind == StoreKind::Postgres && self.store.uri.is_none() {
            bail!("store.uri is required for the postgres store");
        }
        if self.series.is_empty() {
            bail!("at least one [[series]] entry is required");
        }

        let mut seen = HashSet::new();
        for s in &self.series {
            if !seen.insert(s.id.as_str()) {
                bail!("series `{}` is configured more than once", s.id);
            }
        }

        Ok(())
    }
}
