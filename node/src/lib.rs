//! Process driver for a linkchain application.
//!
//! Loads a YAML [Config], opens the journal-backed store inside a
//! `commonware-runtime` executor and replays blocks through
//! [linkchain_execution::App] (see [driver]).

use linkchain_execution::{AppConfig, ComputeUnit};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, str::FromStr};
use thiserror::Error;
use tracing::Level;

pub mod defaults;
pub mod driver;
pub mod metrics;

fn default_log_level() -> String {
    defaults::DEFAULT_LOG_LEVEL.to_string()
}

fn default_json_logs() -> bool {
    defaults::DEFAULT_JSON_LOGS
}

fn default_worker_threads() -> usize {
    defaults::DEFAULT_WORKER_THREADS
}

fn default_directory() -> PathBuf {
    PathBuf::from(defaults::DEFAULT_DIRECTORY)
}

fn default_partition() -> String {
    defaults::DEFAULT_PARTITION.to_string()
}

fn default_inv_check_period() -> u64 {
    defaults::DEFAULT_INV_CHECK_PERIOD
}

fn default_allow_search() -> bool {
    defaults::DEFAULT_ALLOW_SEARCH
}

fn default_compute_unit() -> String {
    defaults::DEFAULT_COMPUTE_UNIT.to_string()
}

fn default_check_before_deliver() -> bool {
    defaults::DEFAULT_CHECK_BEFORE_DELIVER
}

fn default_search_limit() -> usize {
    defaults::DEFAULT_SEARCH_LIMIT
}

/// Node configuration, read from YAML.
///
/// `genesis` and `blocks` may also be given on the command line, which wins.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Config {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_json_logs")]
    pub json_logs: bool,
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,

    /// Storage root handed to the runtime.
    #[serde(default = "default_directory")]
    pub directory: PathBuf,
    /// Journal partition inside `directory`.
    #[serde(default = "default_partition")]
    pub partition: String,
    #[serde(default)]
    pub genesis: Option<PathBuf>,
    #[serde(default)]
    pub blocks: Option<PathBuf>,
    #[serde(default)]
    pub metrics_file: Option<PathBuf>,

    /// Verify ledger invariants every N blocks (0 disables).
    #[serde(default = "default_inv_check_period")]
    pub inv_check_period: u64,
    #[serde(default = "default_allow_search")]
    pub allow_search: bool,
    #[serde(default = "default_compute_unit")]
    pub compute_unit: String,
    #[serde(default = "default_check_before_deliver")]
    pub check_before_deliver: bool,
    /// Results printed per `--search` query.
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: default_json_logs(),
            worker_threads: default_worker_threads(),
            directory: default_directory(),
            partition: default_partition(),
            genesis: None,
            blocks: None,
            metrics_file: None,
            inv_check_period: default_inv_check_period(),
            allow_search: default_allow_search(),
            compute_unit: default_compute_unit(),
            check_before_deliver: default_check_before_deliver(),
            search_limit: default_search_limit(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid log level: {value}")]
    InvalidLogLevel { value: String },
    #[error("invalid compute unit: {value}")]
    InvalidComputeUnit {
        value: String,
        #[source]
        source: linkchain_execution::rank::UnknownComputeUnit,
    },
    #[error("compute unit {unit} is not available in this build")]
    UnavailableComputeUnit { unit: ComputeUnit },
    #[error("{field} must not be empty")]
    Empty { field: &'static str },
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },
    #[error("{field} is required")]
    Missing { field: &'static str },
}

#[derive(Clone, Debug)]
pub struct ValidatedConfig {
    pub log_level: Level,
    pub json_logs: bool,
    pub worker_threads: usize,

    pub directory: PathBuf,
    pub partition: String,
    pub genesis: PathBuf,
    pub blocks: Option<PathBuf>,
    pub metrics_file: Option<PathBuf>,

    pub inv_check_period: u64,
    pub allow_search: bool,
    pub compute_unit: ComputeUnit,
    pub check_before_deliver: bool,
    pub search_limit: usize,
}

impl ValidatedConfig {
    pub fn app_config(&self) -> AppConfig {
        AppConfig {
            inv_check_period: self.inv_check_period,
            allow_search: self.allow_search,
            compute_unit: self.compute_unit,
        }
    }
}

fn ensure_path(field: &'static str, value: &std::path::Path) -> Result<(), ConfigError> {
    if value.as_os_str().is_empty() {
        return Err(ConfigError::Empty { field });
    }
    Ok(())
}

fn ensure_nonzero(field: &'static str, value: usize) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::Zero { field });
    }
    Ok(())
}

impl Config {
    pub fn parse_log_level(&self) -> Result<Level, ConfigError> {
        Level::from_str(self.log_level.trim()).map_err(|_| ConfigError::InvalidLogLevel {
            value: self.log_level.clone(),
        })
    }

    pub fn parse_compute_unit(&self) -> Result<ComputeUnit, ConfigError> {
        let unit = ComputeUnit::from_str(self.compute_unit.trim()).map_err(|source| {
            ConfigError::InvalidComputeUnit {
                value: self.compute_unit.clone(),
                source,
            }
        })?;
        if !unit.available() {
            return Err(ConfigError::UnavailableComputeUnit { unit });
        }
        Ok(unit)
    }

    pub fn validate(self) -> Result<ValidatedConfig, ConfigError> {
        let log_level = self.parse_log_level()?;
        let compute_unit = self.parse_compute_unit()?;
        ensure_nonzero("worker_threads", self.worker_threads)?;
        ensure_nonzero("search_limit", self.search_limit)?;
        ensure_path("directory", &self.directory)?;
        if self.partition.trim().is_empty() {
            return Err(ConfigError::Empty { field: "partition" });
        }
        let genesis = self.genesis.ok_or(ConfigError::Missing { field: "genesis" })?;
        ensure_path("genesis", &genesis)?;
        if let Some(blocks) = &self.blocks {
            ensure_path("blocks", blocks)?;
        }
        if let Some(metrics_file) = &self.metrics_file {
            ensure_path("metrics_file", metrics_file)?;
        }

        Ok(ValidatedConfig {
            log_level,
            json_logs: self.json_logs,
            worker_threads: self.worker_threads,
            directory: self.directory,
            partition: self.partition,
            genesis,
            blocks: self.blocks,
            metrics_file: self.metrics_file,
            inv_check_period: self.inv_check_period,
            allow_search: self.allow_search,
            compute_unit,
            check_before_deliver: self.check_before_deliver,
            search_limit: self.search_limit,
        })
    }
}
