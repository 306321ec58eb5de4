use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::NaiveDate;
use serde_json::Value;

use crate::config::ScheduleConfig;
use crate::workflows::schedule::grid::{Column, MemorySheet, ScheduleStore, SheetRow, StoreError};
use crate::workflows::schedule::notices::{Notice, Notifier, NotifyError};
use crate::workflows::schedule::populate::empty_rows;
use crate::workflows::schedule::service::{BookingService, BookingSubmission};

pub(super) const OPERATOR: &str = "ops@example.org";

pub(super) fn date(month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, month, day).expect("valid date")
}

/// Monday 2 March 2026.
pub(super) fn monday() -> NaiveDate {
    date(3, 2)
}

/// Tuesday 3 March 2026.
pub(super) fn tuesday() -> NaiveDate {
    date(3, 3)
}

pub(super) fn config() -> ScheduleConfig {
    ScheduleConfig {
        admin_contact: OPERATOR.to_string(),
        ..ScheduleConfig::default()
    }
}

pub(super) fn row(date: &str, slot: &str, activity: &str) -> SheetRow {
    let mut row = vec![String::new(); Column::WIDTH];
    row[Column::Date.index()] = date.to_string();
    row[Column::TimeSlot.index()] = slot.to_string();
    row[Column::Duration.index()] = "5".to_string();
    row[Column::Activity.index()] = activity.to_string();
    row
}

/// Default-window empty rows for every weekday in `[from, to]`.
pub(super) fn week(from: NaiveDate, to: NaiveDate) -> Vec<SheetRow> {
    empty_rows(&config(), from, to)
}

pub(super) fn submission(contact: &str, name: &str, minutes: u32) -> BookingSubmission {
    BookingSubmission {
        contact: Some(contact.to_string()),
        name: name.to_string(),
        group: "4B".to_string(),
        subject: format!("{name}'s sharing"),
        duration_minutes: Some(minutes),
        ..BookingSubmission::default()
    }
}

pub(super) fn cell(sheet: &MemorySheet, row: usize, column: Column) -> String {
    sheet.cell(row, column).unwrap_or_default()
}

/// Captures every notice and always reports success.
#[derive(Debug, Default, Clone)]
pub(super) struct RecordingNotifier {
    sent: Arc<Mutex<Vec<Notice>>>,
}

impl RecordingNotifier {
    pub(super) fn sent(&self) -> Vec<Notice> {
        self.sent.lock().expect("notifier mutex poisoned").clone()
    }

    pub(super) fn sent_to(&self, contact: &str) -> Vec<Notice> {
        self.sent()
            .into_iter()
            .filter(|notice| notice.to.iter().any(|to| to == contact))
            .collect()
    }
}

impl Notifier for RecordingNotifier {
    fn send(&self, notice: &Notice) -> Result<(), NotifyError> {
        self.sent
            .lock()
            .expect("notifier mutex poisoned")
            .push(notice.clone());
        Ok(())
    }
}

/// Rejects every notice.
#[derive(Debug, Default, Clone, Copy)]
pub(super) struct FailingNotifier;

impl Notifier for FailingNotifier {
    fn send(&self, _notice: &Notice) -> Result<(), NotifyError> {
        Err(NotifyError::Transport("smtp offline".to_string()))
    }
}

/// Wraps a memory sheet and fails reads, writes, or flushes on demand.
#[derive(Debug, Default, Clone)]
pub(super) struct FailingStore {
    pub(super) inner: MemorySheet,
    pub(super) fail_reads: bool,
    pub(super) fail_writes: bool,
    pub(super) fail_flushes: bool,
}

impl FailingStore {
    pub(super) fn failing_writes(rows: Vec<SheetRow>) -> Self {
        Self {
            inner: MemorySheet::with_rows(rows),
            fail_writes: true,
            ..Self::default()
        }
    }

    /// Writes land in the sheet, but persisting them always fails.
    pub(super) fn failing_flushes(rows: Vec<SheetRow>) -> Self {
        Self {
            inner: MemorySheet::with_rows(rows),
            fail_flushes: true,
            ..Self::default()
        }
    }

    pub(super) fn failing_reads() -> Self {
        Self {
            fail_reads: true,
            ..Self::default()
        }
    }
}

impl ScheduleStore for FailingStore {
    fn read_rows(&self) -> Result<Vec<SheetRow>, StoreError> {
        if self.fail_reads {
            return Err(StoreError::Unavailable("sheet offline".to_string()));
        }
        self.inner.read_rows()
    }

    fn write_range(
        &self,
        first_row: usize,
        first_column: Column,
        values: &[SheetRow],
    ) -> Result<(), StoreError> {
        if self.fail_writes {
            return Err(StoreError::Unavailable("sheet is read-only".to_string()));
        }
        self.inner.write_range(first_row, first_column, values)
    }

    fn append_rows(&self, rows: &[SheetRow]) -> Result<(), StoreError> {
        if self.fail_writes {
            return Err(StoreError::Unavailable("sheet is read-only".to_string()));
        }
        self.inner.append_rows(rows)
    }

    fn flush(&self) -> Result<(), StoreError> {
        if self.fail_flushes {
            return Err(StoreError::Unavailable("sheet could not be saved".to_string()));
        }
        self.inner.flush()
    }
}

pub(super) fn build_service(
    rows: Vec<SheetRow>,
) -> (
    Arc<BookingService<MemorySheet, RecordingNotifier>>,
    MemorySheet,
    Arc<RecordingNotifier>,
) {
    let sheet = MemorySheet::with_rows(rows);
    let notifier = Arc::new(RecordingNotifier::default());
    let service = Arc::new(BookingService::new(
        sheet.clone(),
        notifier.clone(),
        config(),
    ));
    (service, sheet, notifier)
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
