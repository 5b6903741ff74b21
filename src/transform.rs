//! Transformation layer: turns a selected snapshot into mart tables.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, Instant};

use chrono::{Local, NaiveDateTime};
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::error::{LedgerError, Result};
use crate::io;
use crate::models::ModelSet;
use crate::snapshot::{SnapshotInfo, SnapshotStore};

/// Records which snapshot the persisted marts were built from.
pub const STATE_FILE: &str = "_marts_state.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableStats {
    pub name: String,
    pub rows: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MartsState {
    pub snapshot_id: String,
    pub built_at: NaiveDateTime,
    pub tables: Vec<TableStats>,
}

#[derive(Debug, Clone)]
pub struct TransformRun {
    pub snapshot_id: String,
    pub tables: Vec<TableStats>,
    pub duration: Duration,
}

/// Anything that can build the marts for a snapshot and read them back.
pub trait Transformer: Send + Sync {
    /// Build every table for `snapshot`. A failed run is
    /// `TransformationFailure` and leaves earlier tables in place.
    fn run(&self, snapshot: &SnapshotInfo) -> Result<TransformRun>;

    /// Read a table produced by the last successful run.
    fn read_table(&self, name: &str) -> Result<DataFrame>;
}

fn table_path(marts_dir: &Path, name: &str) -> PathBuf {
    marts_dir.join(format!("{name}.parquet"))
}

fn read_mart(marts_dir: &Path, name: &str) -> Result<DataFrame> {
    let path = table_path(marts_dir, name);
    if !path.is_file() {
        return Err(LedgerError::NotFound(format!(
            "table '{name}' in {}",
            marts_dir.display()
        )));
    }
    io::read_parquet(&path).map_err(|err| LedgerError::recoverable(&path, err))
}

/// The state file next to the marts, if a run has completed.
pub fn read_state(marts_dir: &Path) -> Result<Option<MartsState>> {
    let path = marts_dir.join(STATE_FILE);
    if !path.exists() {
        return Ok(None);
    }
    let text = fs::read_to_string(&path)?;
    serde_json::from_str(&text)
        .map(Some)
        .map_err(|e| LedgerError::InvalidData(format!("{}: {e}", path.display())))
}

fn write_state(marts_dir: &Path, state: &MartsState) -> Result<()> {
    let text = serde_json::to_string_pretty(state)
        .map_err(|e| LedgerError::InvalidData(format!("marts state: {e}")))?;
    fs::write(marts_dir.join(STATE_FILE), text)?;
    Ok(())
}

// ── In-process models ───────────────────────────────────────────────────────

pub struct ModelTransformer {
    store: SnapshotStore,
    models: ModelSet,
    marts_dir: PathBuf,
}

impl ModelTransformer {
    pub fn new(store: SnapshotStore, models: ModelSet, marts_dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            models,
            marts_dir: marts_dir.into(),
        }
    }

    pub fn standard(store: SnapshotStore, marts_dir: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self::new(store, ModelSet::standard()?, marts_dir))
    }

    pub fn models(&self) -> &ModelSet {
        &self.models
    }

    pub fn marts_dir(&self) -> &Path {
        &self.marts_dir
    }

    /// Build every model for `snapshot` without touching the marts directory.
    pub fn materialize(&self, snapshot: &SnapshotInfo) -> Result<Vec<(String, DataFrame)>> {
        let df = self.store.load(snapshot)?;
        self.models.run(df)
    }
}

impl Transformer for ModelTransformer {
    fn run(&self, snapshot: &SnapshotInfo) -> Result<TransformRun> {
        let started = Instant::now();
        let outputs = self.materialize(snapshot)?;

        let mut tables = Vec::with_capacity(outputs.len());
        for (name, mut df) in outputs {
            io::replace_parquet(&mut df, &table_path(&self.marts_dir, &name))?;
            tables.push(TableStats {
                name,
                rows: df.height(),
            });
        }
        write_state(
            &self.marts_dir,
            &MartsState {
                snapshot_id: snapshot.id.clone(),
                built_at: Local::now().naive_local(),
                tables: tables.clone(),
            },
        )?;

        let duration = started.elapsed();
        info!(snapshot = %snapshot.id, tables = tables.len(), ?duration, "marts built");
        Ok(TransformRun {
            snapshot_id: snapshot.id.clone(),
            tables,
            duration,
        })
    }

    fn read_table(&self, name: &str) -> Result<DataFrame> {
        read_mart(&self.marts_dir, name)
    }
}

// ── External tool ───────────────────────────────────────────────────────────

/// Runs an external modeling tool. The snapshot is passed through the
/// `LEDGER_SNAPSHOT_ID` and `LEDGER_SNAPSHOT_PATH` environment variables; the
/// tool is expected to leave `<table>.parquet` files in the marts directory.
pub struct CommandTransformer {
    program: String,
    args: Vec<String>,
    marts_dir: PathBuf,
}

impl CommandTransformer {
    pub fn new(program: impl Into<String>, args: Vec<String>, marts_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args,
            marts_dir: marts_dir.into(),
        }
    }

    /// Split a whitespace-separated command line. Empty input is a config error.
    pub fn from_command_line(line: &str, marts_dir: impl Into<PathBuf>) -> Result<Self> {
        let mut parts = line.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| LedgerError::Config("empty transform command".into()))?;
        Ok(Self::new(program, parts.collect(), marts_dir))
    }

    fn list_tables(&self) -> Result<Vec<TableStats>> {
        let mut tables = Vec::new();
        if !self.marts_dir.exists() {
            return Ok(tables);
        }
        for entry in fs::read_dir(&self.marts_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("parquet") {
                continue;
            }
            if let Some(name) = path.file_stem().and_then(|s| s.to_str()) {
                let rows = io::parquet_row_count(&path).unwrap_or(0);
                tables.push(TableStats {
                    name: name.to_string(),
                    rows,
                });
            }
        }
        tables.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tables)
    }
}

impl Transformer for CommandTransformer {
    fn run(&self, snapshot: &SnapshotInfo) -> Result<TransformRun> {
        let started = Instant::now();
        fs::create_dir_all(&self.marts_dir)?;

        let output = Command::new(&self.program)
            .args(&self.args)
            .env("LEDGER_SNAPSHOT_ID", &snapshot.id)
            .env("LEDGER_SNAPSHOT_PATH", &snapshot.path)
            .env("LEDGER_MARTS_DIR", &self.marts_dir)
            .output()
            .map_err(|e| LedgerError::TransformationFailure(format!("could not start '{}': {e}", self.program)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            error!(program = %self.program, status = %output.status, "transformation failed");
            return Err(LedgerError::TransformationFailure(stderr));
        }

        let tables = self.list_tables()?;
        write_state(
            &self.marts_dir,
            &MartsState {
                snapshot_id: snapshot.id.clone(),
                built_at: Local::now().naive_local(),
                tables: tables.clone(),
            },
        )?;
        info!(program = %self.program, snapshot = %snapshot.id, tables = tables.len(), "external transformation done");
        Ok(TransformRun {
            snapshot_id: snapshot.id.clone(),
            tables,
            duration: started.elapsed(),
        })
    }

    fn read_table(&self, name: &str) -> Result<DataFrame> {
        read_mart(&self.marts_dir, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_line_splits_program_and_args() {
        let t = CommandTransformer::from_command_line("dbt run --profiles-dir .", "marts").unwrap();
        assert_eq!(t.program, "dbt");
        assert_eq!(t.args, ["run", "--profiles-dir", "."]);
        assert!(matches!(
            CommandTransformer::from_command_line("   ", "marts"),
            Err(LedgerError::Config(_))
        ));
    }

    #[test]
    fn missing_table_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_mart(dir.path(), "mart_account_summary").unwrap_err();
        assert!(matches!(err, LedgerError::NotFound(_)));
        assert!(read_state(dir.path()).unwrap().is_none());
    }
}
