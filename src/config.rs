//! Configuration for scoreacquire.
//!
//! All tunable policy (failure thresholds, window sizes, backoff bases,
//! delays, caps) lives here rather than in code. Settings load from a TOML
//! file: `--config`, else `scoreacquire.toml` in the working directory,
//! else defaults.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::acquire::dedup::ValidationConfig;
use crate::acquire::detect::DetectorConfig;
use crate::acquire::fetch::FetchConfig;
use crate::acquire::pool::PoolConfig;
use crate::acquire::retry::RetryConfig;
use crate::acquire::throttle::ThrottleConfig;
use crate::models::EgressCredentials;
use crate::runner::{PartitionSpec, RunnerConfig};

pub const DEFAULT_CONFIG_FILE: &str = "scoreacquire.toml";
pub const STATE_DB_FILE: &str = "scoreacquire.db";

/// Egress pool section: the static credential list plus rotation policy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolSettings {
    pub endpoints: Vec<EgressCredentials>,
    #[serde(flatten)]
    pub policy: PoolConfig,
}

/// One configured partition (league), keyed by id in the settings file.
///
/// The pattern fields configure the built-in regex page model and
/// freshness probe; the acquisition core itself never sees them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionEntry {
    pub index_url: String,
    pub page_url_template: String,
    #[serde(default)]
    pub required_markers: Vec<String>,
    #[serde(default)]
    pub first_season_start: Option<chrono::NaiveDate>,
    /// Regex with named groups (`date`, `home`, `away`, `home_score`,
    /// `away_score`, `venue`, `ref`) matching one record per capture.
    #[serde(default)]
    pub record_pattern: Option<String>,
    /// Regex with a `date` group extracting the newest record date from
    /// the partition's index page.
    #[serde(default)]
    pub latest_date_pattern: Option<String>,
    /// chrono format string for dates captured by the patterns.
    #[serde(default = "default_date_format")]
    pub date_format: String,
}

fn default_date_format() -> String {
    "%Y-%m-%d".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub pool: PoolSettings,
    pub fetch: FetchConfig,
    pub detector: DetectorConfig,
    pub retry: RetryConfig,
    pub throttle: ThrottleConfig,
    pub run: RunnerConfig,
    pub validation: ValidationConfig,
    pub partitions: BTreeMap<String, PartitionEntry>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            pool: PoolSettings::default(),
            fetch: FetchConfig::default(),
            detector: DetectorConfig::default(),
            retry: RetryConfig::default(),
            throttle: ThrottleConfig::default(),
            run: RunnerConfig::default(),
            validation: ValidationConfig::default(),
            partitions: BTreeMap::new(),
        }
    }
}

impl Settings {
    /// Load settings from an explicit path, the default file, or defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let candidate = match path {
            Some(p) => Some(p.to_path_buf()),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                default.exists().then_some(default)
            }
        };

        match candidate {
            Some(file) => {
                let raw = fs::read_to_string(&file)
                    .map_err(|e| anyhow::anyhow!("reading {}: {e}", file.display()))?;
                let settings: Settings = toml::from_str(&raw)
                    .map_err(|e| anyhow::anyhow!("parsing {}: {e}", file.display()))?;
                Ok(settings)
            }
            None => Ok(Settings::default()),
        }
    }

    /// Path of the operational state database.
    pub fn state_db_path(&self) -> PathBuf {
        self.data_dir.join(STATE_DB_FILE)
    }

    /// Build the runtime spec for a configured partition.
    pub fn partition_spec(&self, id: &str) -> Option<PartitionSpec> {
        self.partitions.get(id).map(|entry| PartitionSpec {
            id: id.to_string(),
            index_url: entry.index_url.clone(),
            page_url_template: entry.page_url_template.clone(),
            required_markers: entry.required_markers.clone(),
            first_season_start: entry.first_season_start,
        })
    }

    pub fn partition_ids(&self) -> Vec<String> {
        self.partitions.keys().cloned().collect()
    }

    /// Write a commented starter configuration.
    pub fn write_template(path: &Path) -> anyhow::Result<()> {
        fs::write(path, CONFIG_TEMPLATE)
            .map_err(|e| anyhow::anyhow!("writing {}: {e}", path.display()))?;
        Ok(())
    }
}

const CONFIG_TEMPLATE: &str = r#"# scoreacquire configuration

data_dir = "."

[pool]
rotate_every = 15
usage_cap = 120
session_duration_limit_secs = 1800
min_usable_fraction = 0.3
recovery_interval = 25

# One entry per egress point.
# [[pool.endpoints]]
# host = "proxy-1.example.net"
# port = 1080
# scheme = "socks5"
# username = "user"
# password = "secret"

[pool.health]
failure_threshold = 3
degraded_threshold = 0.5
window_size = 20
min_samples = 5

[fetch]
timeout_secs = 35
floor_delay_min_ms = 2000
floor_delay_max_ms = 6000
referer_probability = 0.8
extra_referers = []

[detector]
min_content_length = 600

[retry]
max_attempts = 3
base_delay_ms = 1000
jitter_min_ms = 1000
jitter_max_ms = 5000
probe_url = "https://www.gstatic.com/generate_204"

[throttle]
window_size = 20
window_secs = 3600
min_samples = 5

[run]
checkpoint_every = 5
session_restart_every = 10

[validation]
max_score = 200
earliest_date = "1950-01-01"

# [partitions.league-1]
# index_url = "https://results.example.com/league-1"
# page_url_template = "https://results.example.com/league-1/day/{date}"
# required_markers = ["class=\"results\""]
# first_season_start = "2020-08-01"
"#;
