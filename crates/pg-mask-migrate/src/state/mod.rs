//! File-based watermark state for incremental loads.
//!
//! The file is a flat JSON object mapping source table name to the highest
//! cursor value already loaded. It is rewritten after each table whose load
//! succeeded, so a crash mid-run only reprocesses the remaining tables.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{MigrateError, Result};

/// Highest processed cursor value per table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatermarkState {
    values: BTreeMap<String, i64>,
}

impl WatermarkState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load state from a file. A missing file is an empty state.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::new());
        }
        let content = std::fs::read_to_string(path)?;
        let values: BTreeMap<String, i64> = serde_json::from_str(&content).map_err(|e| {
            MigrateError::State(format!("{} is not a watermark file: {}", path.display(), e))
        })?;
        Ok(Self { values })
    }

    /// Save state to a file (atomic write).
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = serde_json::to_string_pretty(&self.values)?;
        write_atomic(path, &content)
    }

    /// Watermark for a table, 0 if it was never loaded.
    pub fn get(&self, table: &str) -> i64 {
        self.values.get(table).copied().unwrap_or(0)
    }

    /// Raise a table's watermark. Lower values are ignored.
    pub fn advance(&mut self, table: &str, value: i64) -> i64 {
        let entry = self.values.entry(table.to_string()).or_insert(0);
        *entry = (*entry).max(value);
        *entry
    }

    /// Reset a table to 0, ahead of a full reload.
    pub fn reset(&mut self, table: &str) {
        self.values.insert(table.to_string(), 0);
    }
}

/// Write to a sibling temp file, then rename over `path`.
pub(crate) fn write_atomic(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let temp_path: PathBuf = path.with_extension("tmp");
    std::fs::write(&temp_path, content)?;
    std::fs::rename(&temp_path, path)?;
    Ok(())
}
