use serde::Serialize;
use tracing::{info, warn};

use super::domain::{BookingId, LedgerFlag};
use super::grid::{Column, ScheduleGrid, ScheduleStore, StoreError};
use super::notices::{Notice, Notifier};

/// Which notification flag of a booking to update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerField {
    Confirmation,
    Reminder,
}

impl LedgerField {
    pub const fn column(self) -> Column {
        match self {
            Self::Confirmation => Column::ConfirmationSent,
            Self::Reminder => Column::ReminderSent,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Confirmation => "confirmation",
            Self::Reminder => "reminder",
        }
    }
}

/// Per-booking notification flags stored on every row of the booking.
pub struct NotificationLedger<'a, S> {
    grid: &'a ScheduleGrid<S>,
}

impl<'a, S: ScheduleStore> NotificationLedger<'a, S> {
    pub fn new(grid: &'a ScheduleGrid<S>) -> Self {
        Self { grid }
    }

    /// Sets `field` on every row carrying `id`, returning how many rows changed.
    pub fn record(
        &self,
        id: &BookingId,
        field: LedgerField,
        flag: LedgerFlag,
    ) -> Result<usize, StoreError> {
        let rows = self.grid.rows_for(id)?;
        if rows.is_empty() {
            warn!(booking_id = %id, field = field.label(), "no rows carry this booking id");
            return Ok(0);
        }
        self.grid
            .write_column(&rows, field.column(), flag.as_cell())?;
        Ok(rows.len())
    }

    /// Sends `notice` and records the outcome. Delivery and ledger failures
    /// are logged, never propagated.
    pub fn deliver<N: Notifier + ?Sized>(
        &self,
        notifier: &N,
        notice: &Notice,
        id: &BookingId,
        field: LedgerField,
    ) -> LedgerFlag {
        let flag = match notifier.send(notice) {
            Ok(()) => {
                info!(booking_id = %id, field = field.label(), "notification sent");
                LedgerFlag::Sent
            }
            Err(err) => {
                warn!(booking_id = %id, field = field.label(), %err, "notification failed");
                LedgerFlag::Error
            }
        };
        self.record_or_log(id, field, flag);
        flag
    }

    pub fn record_or_log(&self, id: &BookingId, field: LedgerField, flag: LedgerFlag) {
        if let Err(err) = self.record(id, field, flag) {
            warn!(
                booking_id = %id,
                field = field.label(),
                flag = flag.as_cell(),
                %err,
                "failed to record notification status"
            );
        }
    }
}
