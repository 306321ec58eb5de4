use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, NaiveDate, Utc};
use tracing::debug;

use super::domain::{Activity, BookingId, BookingRequest, LedgerFlag, Requester};
use super::slot::{parse_slot, SlotTime};

/// One raw schedule row, one string per column.
pub type SheetRow = Vec<String>;

/// Column layout of the schedule table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    Date,
    TimeSlot,
    Duration,
    Activity,
    Name,
    Group,
    Phone,
    Subject,
    Attachment,
    Contact,
    DurationRequested,
    ConfirmationSent,
    ReminderSent,
    BookingId,
    SubmittedAt,
}

impl Column {
    pub const WIDTH: usize = 15;

    pub const fn ordered() -> [Self; Self::WIDTH] {
        [
            Self::Date,
            Self::TimeSlot,
            Self::Duration,
            Self::Activity,
            Self::Name,
            Self::Group,
            Self::Phone,
            Self::Subject,
            Self::Attachment,
            Self::Contact,
            Self::DurationRequested,
            Self::ConfirmationSent,
            Self::ReminderSent,
            Self::BookingId,
            Self::SubmittedAt,
        ]
    }

    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn header(self) -> &'static str {
        match self {
            Self::Date => "Date",
            Self::TimeSlot => "Time Slot",
            Self::Duration => "Duration",
            Self::Activity => "Activity",
            Self::Name => "Name",
            Self::Group => "Group",
            Self::Phone => "Phone",
            Self::Subject => "Subject",
            Self::Attachment => "Attachment",
            Self::Contact => "Contact",
            Self::DurationRequested => "Duration Requested",
            Self::ConfirmationSent => "Confirmation Sent",
            Self::ReminderSent => "Reminder Sent",
            Self::BookingId => "Booking Id",
            Self::SubmittedAt => "Submitted At",
        }
    }

    pub fn headers() -> SheetRow {
        Self::ordered()
            .iter()
            .map(|column| column.header().to_string())
            .collect()
    }
}

/// Width of the booking columns, `Activity` through `SubmittedAt`.
const BOOKING_SPAN: usize = Column::WIDTH - Column::Activity.index();

/// Error enumeration for schedule store failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("schedule store unavailable: {0}")]
    Unavailable(String),
    #[error("write to rows {first}..{end} falls outside the schedule ({len} rows)")]
    OutOfBounds { first: usize, end: usize, len: usize },
    #[error("failed to access schedule file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid schedule CSV data: {0}")]
    Csv(#[from] csv::Error),
}

/// Range-addressed tabular storage backing the schedule.
///
/// Row indices are zero-based data rows; any header is the store's concern.
pub trait ScheduleStore: Send + Sync {
    fn read_rows(&self) -> Result<Vec<SheetRow>, StoreError>;
    /// Writes a rectangle of cells starting at `first_row`/`first_column`.
    fn write_range(
        &self,
        first_row: usize,
        first_column: Column,
        values: &[SheetRow],
    ) -> Result<(), StoreError>;
    fn append_rows(&self, rows: &[SheetRow]) -> Result<(), StoreError>;
    fn flush(&self) -> Result<(), StoreError>;
}

pub(crate) fn pad_row(mut row: SheetRow) -> SheetRow {
    if row.len() < Column::WIDTH {
        row.resize(Column::WIDTH, String::new());
    }
    row
}

pub(crate) fn apply_range(
    rows: &mut [SheetRow],
    first_row: usize,
    first_column: Column,
    values: &[SheetRow],
) -> Result<(), StoreError> {
    let end = first_row + values.len();
    if end > rows.len() {
        return Err(StoreError::OutOfBounds {
            first: first_row,
            end,
            len: rows.len(),
        });
    }

    for (target, source) in rows[first_row..end].iter_mut().zip(values) {
        let width = first_column.index() + source.len();
        if target.len() < width {
            target.resize(width, String::new());
        }
        target[first_column.index()..width].clone_from_slice(source);
    }
    Ok(())
}

/// In-memory store. Clones share the same rows, so a test can keep a handle
/// to inspect or edit the schedule out-of-band.
#[derive(Debug, Default, Clone)]
pub struct MemorySheet {
    rows: Arc<Mutex<Vec<SheetRow>>>,
    writes: Arc<AtomicUsize>,
}

impl MemorySheet {
    pub fn with_rows(rows: Vec<SheetRow>) -> Self {
        Self {
            rows: Arc::new(Mutex::new(rows.into_iter().map(pad_row).collect())),
            writes: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn rows(&self) -> Vec<SheetRow> {
        self.rows.lock().map(|rows| rows.clone()).unwrap_or_default()
    }

    pub fn cell(&self, row: usize, column: Column) -> Option<String> {
        let rows = self.rows.lock().ok()?;
        rows.get(row)?.get(column.index()).cloned()
    }

    /// Edits a cell directly, bypassing the write counter, the way an
    /// operator editing the sheet would.
    pub fn set_cell(&self, row: usize, column: Column, value: &str) {
        if let Ok(mut rows) = self.rows.lock() {
            if let Some(cell) = rows
                .get_mut(row)
                .and_then(|target| target.get_mut(column.index()))
            {
                *cell = value.to_string();
            }
        }
    }

    /// Number of range writes and appends issued through the store trait.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<SheetRow>>, StoreError> {
        self.rows
            .lock()
            .map_err(|_| StoreError::Unavailable("memory sheet lock poisoned".to_string()))
    }
}

impl ScheduleStore for MemorySheet {
    fn read_rows(&self) -> Result<Vec<SheetRow>, StoreError> {
        Ok(self.lock()?.clone())
    }

    fn write_range(
        &self,
        first_row: usize,
        first_column: Column,
        values: &[SheetRow],
    ) -> Result<(), StoreError> {
        let mut rows = self.lock()?;
        apply_range(&mut rows, first_row, first_column, values)?;
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn append_rows(&self, new_rows: &[SheetRow]) -> Result<(), StoreError> {
        let mut rows = self.lock()?;
        rows.extend(new_rows.iter().cloned().map(pad_row));
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn flush(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Parsed view of one schedule row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub row: usize,
    pub date: Option<NaiveDate>,
    pub slot: Option<SlotTime>,
    pub activity: Option<Activity>,
    pub booking_id: Option<BookingId>,
    pub requester: Requester,
    pub duration_requested: Option<u32>,
    pub confirmation: LedgerFlag,
    pub reminder: LedgerFlag,
    pub submitted_at: Option<DateTime<Utc>>,
}

impl Block {
    fn from_row(row: usize, cells: &[String], booking_label: &str) -> Self {
        let cell = |column: Column| cells.get(column.index()).map(String::as_str).unwrap_or("");

        let date = NaiveDate::parse_from_str(cell(Column::Date).trim(), "%Y-%m-%d").ok();
        let slot = date.and_then(|anchor| match parse_slot(cell(Column::TimeSlot), anchor) {
            Ok(slot) => Some(slot),
            Err(err) => {
                debug!(row, %err, "schedule row has no usable time slot");
                None
            }
        });
        let booking_id = Some(cell(Column::BookingId).trim())
            .filter(|id| !id.is_empty())
            .map(|id| BookingId(id.to_string()));

        Self {
            row,
            date,
            slot,
            activity: Activity::from_cell(cell(Column::Activity), booking_label),
            booking_id,
            requester: Requester {
                contact: cell(Column::Contact).trim().to_string(),
                name: cell(Column::Name).trim().to_string(),
                group: cell(Column::Group).trim().to_string(),
                phone: cell(Column::Phone).trim().to_string(),
                subject: cell(Column::Subject).trim().to_string(),
                attachment: cell(Column::Attachment).trim().to_string(),
            },
            duration_requested: cell(Column::DurationRequested).trim().parse().ok(),
            confirmation: LedgerFlag::from_cell(cell(Column::ConfirmationSent)),
            reminder: LedgerFlag::from_cell(cell(Column::ReminderSent)),
            submitted_at: DateTime::parse_from_rfc3339(cell(Column::SubmittedAt).trim())
                .ok()
                .map(|at| at.with_timezone(&Utc)),
        }
    }

    /// Rows without a date, a parseable slot, or an activity take no part in
    /// allocation or reconciliation.
    pub fn is_schedulable(&self) -> bool {
        self.date.is_some() && self.slot.is_some() && self.activity.is_some()
    }

    pub fn is_empty_block(&self) -> bool {
        matches!(self.activity, Some(Activity::Empty))
    }

    pub fn is_booked(&self) -> bool {
        matches!(self.activity, Some(Activity::Booked))
    }
}

/// Rows of each booking id, in first-seen order.
#[derive(Debug, Default, Clone)]
pub struct BookingIndex {
    entries: Vec<(BookingId, Vec<usize>)>,
    positions: HashMap<BookingId, usize>,
}

impl BookingIndex {
    fn insert(&mut self, id: &BookingId, row: usize) {
        match self.positions.get(id) {
            Some(&position) => self.entries[position].1.push(row),
            None => {
                self.positions.insert(id.clone(), self.entries.len());
                self.entries.push((id.clone(), vec![row]));
            }
        }
    }

    pub fn rows(&self, id: &BookingId) -> &[usize] {
        self.positions
            .get(id)
            .map(|&position| self.entries[position].1.as_slice())
            .unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&BookingId, &[usize])> {
        self.entries.iter().map(|(id, rows)| (id, rows.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Every row parsed from a single consistent read.
#[derive(Debug, Clone)]
pub struct GridSnapshot {
    blocks: Vec<Block>,
}

impl GridSnapshot {
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn block(&self, row: usize) -> Option<&Block> {
        self.blocks.get(row)
    }

    /// Rebuilds the booking id to row positions map from schedulable rows.
    pub fn booking_index(&self) -> BookingIndex {
        let mut index = BookingIndex::default();
        for block in self.blocks.iter().filter(|block| block.is_schedulable()) {
            if let Some(id) = &block.booking_id {
                index.insert(id, block.row);
            }
        }
        index
    }
}

/// The schedule as the engine sees it: parsed reads and batched writes over
/// an external store.
#[derive(Debug)]
pub struct ScheduleGrid<S> {
    store: S,
    booking_label: String,
}

impl<S: ScheduleStore> ScheduleGrid<S> {
    pub fn new(store: S, booking_label: impl Into<String>) -> Self {
        Self {
            store,
            booking_label: booking_label.into(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn booking_label(&self) -> &str {
        &self.booking_label
    }

    pub fn snapshot(&self) -> Result<GridSnapshot, StoreError> {
        let rows = self.store.read_rows()?;
        let blocks = rows
            .iter()
            .enumerate()
            .map(|(row, cells)| Block::from_row(row, cells, &self.booking_label))
            .collect();
        Ok(GridSnapshot { blocks })
    }

    /// Writes the booking onto consecutive rows starting at `first_row` in
    /// one batched write and flushes it.
    pub fn assign(
        &self,
        first_row: usize,
        row_count: usize,
        id: &BookingId,
        request: &BookingRequest,
    ) -> Result<(), StoreError> {
        let requester = &request.requester;
        let mut values = Vec::with_capacity(BOOKING_SPAN);
        values.push(Activity::Booked.to_cell(&self.booking_label));
        values.push(requester.name.clone());
        values.push(requester.group.clone());
        values.push(requester.phone.clone());
        values.push(requester.subject.clone());
        values.push(requester.attachment.clone());
        values.push(requester.contact.clone());
        values.push(request.duration_minutes.to_string());
        values.push(LedgerFlag::Pending.as_cell().to_string());
        values.push(LedgerFlag::Pending.as_cell().to_string());
        values.push(id.to_string());
        values.push(
            request
                .submitted_at
                .map(|at| at.to_rfc3339())
                .unwrap_or_default(),
        );

        let rows = vec![values; row_count];
        self.store.write_range(first_row, Column::Activity, &rows)?;
        self.store.flush()
    }

    /// Strips booking data from the given rows. A row still marked booked
    /// becomes empty; any other activity is written back unchanged.
    pub fn clear(&self, blocks: &[&Block]) -> Result<(), StoreError> {
        let mut sorted: Vec<&Block> = blocks.to_vec();
        sorted.sort_by_key(|block| block.row);
        sorted.dedup_by_key(|block| block.row);

        for run in contiguous_runs(&sorted) {
            let values: Vec<SheetRow> = run
                .iter()
                .map(|block| {
                    let activity = match &block.activity {
                        Some(Activity::Booked) | None => Activity::Empty,
                        Some(other) => other.clone(),
                    };
                    let mut row = vec![String::new(); BOOKING_SPAN];
                    row[0] = activity.to_cell(&self.booking_label);
                    row
                })
                .collect();
            self.store
                .write_range(run[0].row, Column::Activity, &values)?;
        }

        self.store.flush()
    }

    /// Writes `value` into one column for each listed row, batching
    /// consecutive rows together.
    pub fn write_column(&self, rows: &[usize], column: Column, value: &str) -> Result<(), StoreError> {
        let mut sorted = rows.to_vec();
        sorted.sort_unstable();
        sorted.dedup();

        let mut start = 0;
        while start < sorted.len() {
            let mut end = start + 1;
            while end < sorted.len() && sorted[end] == sorted[end - 1] + 1 {
                end += 1;
            }
            let values = vec![vec![value.to_string()]; end - start];
            self.store.write_range(sorted[start], column, &values)?;
            start = end;
        }

        self.store.flush()
    }

    /// Row positions currently carrying `id`, read fresh from the store.
    pub fn rows_for(&self, id: &BookingId) -> Result<Vec<usize>, StoreError> {
        let rows = self.store.read_rows()?;
        Ok(rows
            .iter()
            .enumerate()
            .filter(|(_, cells)| {
                cells
                    .get(Column::BookingId.index())
                    .is_some_and(|cell| cell.trim() == id.as_str())
            })
            .map(|(row, _)| row)
            .collect())
    }

    pub fn append(&self, rows: &[SheetRow]) -> Result<(), StoreError> {
        if rows.is_empty() {
            return Ok(());
        }
        self.store.append_rows(rows)?;
        self.store.flush()
    }
}

fn contiguous_runs<'a, 'b>(sorted: &'b [&'a Block]) -> Vec<&'b [&'a Block]> {
    let mut runs = Vec::new();
    let mut start = 0;
    for index in 1..=sorted.len() {
        if index == sorted.len() || sorted[index].row != sorted[index - 1].row + 1 {
            runs.push(&sorted[start..index]);
            start = index;
        }
    }
    runs
}
