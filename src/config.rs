use std::path::PathBuf;
use std::sync::Arc;

use crate::error::{LedgerError, Result};
use crate::ingest::Ingestor;
use crate::snapshot::SnapshotStore;
use crate::transform::{CommandTransformer, ModelTransformer, Transformer};

pub const DEFAULT_DATASET: &str = "financial_transactions";

pub const ENV_WAREHOUSE_DIR: &str = "LEDGER_WAREHOUSE_DIR";
pub const ENV_RAW_DIR: &str = "LEDGER_RAW_DIR";
pub const ENV_MARTS_DIR: &str = "LEDGER_MARTS_DIR";
pub const ENV_DATASET: &str = "LEDGER_DATASET";
pub const ENV_TRANSFORM_COMMAND: &str = "LEDGER_TRANSFORM_COMMAND";
pub const ENV_LOG: &str = "LEDGER_LOG";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Snapshot directory.
    pub warehouse_dir: PathBuf,
    /// Where source exports are dropped.
    pub raw_dir: PathBuf,
    pub marts_dir: PathBuf,
    pub dataset: String,
    /// External transformation command; the built-in models when unset.
    pub transform_command: Option<String>,
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            warehouse_dir: PathBuf::from("data/warehouse"),
            raw_dir: PathBuf::from("data/raw"),
            marts_dir: PathBuf::from("data/marts"),
            dataset: DEFAULT_DATASET.to_string(),
            transform_command: None,
            log_filter: "info".to_string(),
        }
    }
}

impl Config {
    /// Defaults overridden by `LEDGER_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        let get = |key: &str| get(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get(ENV_WAREHOUSE_DIR) {
            config.warehouse_dir = v.into();
        }
        if let Some(v) = get(ENV_RAW_DIR) {
            config.raw_dir = v.into();
        }
        if let Some(v) = get(ENV_MARTS_DIR) {
            config.marts_dir = v.into();
        }
        if let Some(v) = get(ENV_DATASET) {
            config.dataset = v.trim().to_string();
        }
        config.transform_command = get(ENV_TRANSFORM_COMMAND);
        if let Some(v) = get(ENV_LOG) {
            config.log_filter = v;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.dataset.trim().is_empty() {
            return Err(LedgerError::Config("dataset name is empty".into()));
        }
        if self.dataset.contains(['/', '\\', '.']) {
            return Err(LedgerError::Config(format!(
                "dataset name '{}' must not contain path separators or dots",
                self.dataset
            )));
        }
        Ok(())
    }

    pub fn store(&self) -> SnapshotStore {
        SnapshotStore::new(&self.warehouse_dir, &self.dataset)
    }

    pub fn ingestor(&self) -> Ingestor {
        Ingestor::new(self.store(), &self.raw_dir)
    }

    pub fn transformer(&self) -> Result<Arc<dyn Transformer>> {
        Ok(match &self.transform_command {
            Some(line) => Arc::new(CommandTransformer::from_command_line(line, &self.marts_dir)?),
            None => Arc::new(ModelTransformer::standard(self.store(), &self.marts_dir)?),
        })
    }
}
