use std::fs::{self, File};
use std::path::{Path, PathBuf};

use polars::prelude::*;

use crate::error::{LedgerError, Result};

pub fn read_parquet(path: &Path) -> Result<DataFrame> {
    let file = File::open(path)?;
    Ok(ParquetReader::new(file).finish()?)
}

/// Row count from the parquet footer, without decoding any pages.
pub fn parquet_row_count(path: &Path) -> Result<usize> {
    let file = File::open(path)?;
    Ok(ParquetReader::new(file).num_rows()?)
}

fn temp_path_for(target: &Path) -> Result<PathBuf> {
    let dir = target
        .parent()
        .ok_or_else(|| LedgerError::InvalidData(format!("{} has no parent", target.display())))?;
    let name = target
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| LedgerError::InvalidData(format!("{} has no file name", target.display())))?;
    Ok(dir.join(format!(".{name}.{}.tmp", uuid::Uuid::new_v4().simple())))
}

/// Write `df` to `target` only if nothing exists there yet.
///
/// The frame is written to a hidden temp file first and then hard-linked into
/// place, so readers never see a partially written file and an existing file
/// is never touched.
pub fn publish_parquet(df: &mut DataFrame, target: &Path) -> Result<()> {
    if let Some(dir) = target.parent() {
        fs::create_dir_all(dir)?;
    }
    let tmp = temp_path_for(target)?;

    let written = File::create(&tmp)
        .map_err(LedgerError::from)
        .and_then(|file| ParquetWriter::new(file).finish(df).map_err(LedgerError::from));
    if let Err(err) = written {
        let _ = fs::remove_file(&tmp);
        return Err(err);
    }

    let linked = fs::hard_link(&tmp, target);
    let _ = fs::remove_file(&tmp);
    match linked {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
            Err(LedgerError::AlreadyExists(target.to_path_buf()))
        }
        Err(err) => Err(err.into()),
    }
}

/// Write `df` to `target`, replacing whatever was there.
///
/// Used for derived tables, which are recomputed on every run.
pub fn replace_parquet(df: &mut DataFrame, target: &Path) -> Result<()> {
    if let Some(dir) = target.parent() {
        fs::create_dir_all(dir)?;
    }
    let tmp = temp_path_for(target)?;
    {
        let file = File::create(&tmp)?;
        if let Err(err) = ParquetWriter::new(file).finish(df) {
            let _ = fs::remove_file(&tmp);
            return Err(err.into());
        }
    }
    fs::rename(&tmp, target)?;
    Ok(())
}
