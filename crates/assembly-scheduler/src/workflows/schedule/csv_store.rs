use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use tracing::{debug, warn};

use super::grid::{apply_range, pad_row, Column, ScheduleStore, SheetRow, StoreError};

#[derive(Debug, Default)]
struct SheetState {
    rows: Vec<SheetRow>,
    dirty: bool,
}

/// Schedule stored as a CSV file with a header row.
///
/// Writes stay in memory until `flush`, which replaces the file through a
/// temporary sibling so readers never see a half-written schedule. A failed
/// flush drops the pending writes and falls back to the file on disk. Reads
/// reload the file whenever no writes are pending, picking up edits made by
/// an operator between runs.
#[derive(Debug)]
pub struct CsvSheet {
    path: PathBuf,
    state: Mutex<SheetState>,
}

impl CsvSheet {
    /// Opens the schedule at `path`. A missing file is treated as an empty
    /// schedule and created on the first flush.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let rows = load_rows(&path)?;
        Ok(Self {
            path,
            state: Mutex::new(SheetState { rows, dirty: false }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<MutexGuard<'_, SheetState>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Unavailable("csv sheet lock poisoned".to_string()))
    }
}

impl ScheduleStore for CsvSheet {
    fn read_rows(&self) -> Result<Vec<SheetRow>, StoreError> {
        let mut state = self.lock()?;
        if !state.dirty {
            state.rows = load_rows(&self.path)?;
        }
        Ok(state.rows.clone())
    }

    fn write_range(
        &self,
        first_row: usize,
        first_column: Column,
        values: &[SheetRow],
    ) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        apply_range(&mut state.rows, first_row, first_column, values)?;
        state.dirty = true;
        Ok(())
    }

    fn append_rows(&self, rows: &[SheetRow]) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        state.rows.extend(rows.iter().cloned().map(pad_row));
        state.dirty = true;
        Ok(())
    }

    fn flush(&self) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        if !state.dirty {
            return Ok(());
        }
        if let Err(err) = write_rows(&self.path, &state.rows) {
            warn!(path = %self.path.display(), %err, "flush failed; pending writes discarded");
            state.dirty = false;
            state.rows = load_rows(&self.path).unwrap_or_default();
            return Err(err);
        }
        state.dirty = false;
        debug!(path = %self.path.display(), rows = state.rows.len(), "schedule flushed");
        Ok(())
    }
}

fn load_rows(path: &Path) -> Result<Vec<SheetRow>, StoreError> {
    let mut contents = String::new();
    match File::open(path) {
        Ok(mut file) => {
            file.read_to_string(&mut contents)?;
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err.into()),
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(contents.as_bytes());

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(pad_row(record.iter().map(str::to_string).collect()));
    }
    Ok(rows)
}

fn write_rows(path: &Path, rows: &[SheetRow]) -> Result<(), StoreError> {
    let mut staging = path.as_os_str().to_owned();
    staging.push(".tmp");
    let staging = PathBuf::from(staging);

    {
        let mut writer = csv::WriterBuilder::new()
            .flexible(true)
            .from_path(&staging)?;
        writer.write_record(Column::headers())?;
        for row in rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
    }

    fs::rename(&staging, path)?;
    Ok(())
}
