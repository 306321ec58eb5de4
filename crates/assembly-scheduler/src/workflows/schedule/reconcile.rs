use std::collections::HashSet;

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use tracing::{error, info, warn};

use super::allocator::{AllocationError, Allocator, SearchScope};
use super::domain::{Activity, Booking, BookingId, BookingRequest, IdOrigin, LedgerFlag};
use super::grid::{Block, GridSnapshot, ScheduleGrid, ScheduleStore, StoreError};
use super::ledger::{LedgerField, NotificationLedger};
use super::notices::{NoticeComposer, Notifier};

/// A booking whose rows were overwritten by another activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplacedBooking {
    pub id: BookingId,
    pub request: BookingRequest,
    pub original_date: NaiveDate,
    pub original_start: NaiveDateTime,
    /// Every row still carrying the id, displaced or not.
    pub rows: Vec<usize>,
}

/// What happened to one displaced booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DisplacementOutcome {
    Rebooked {
        old_id: BookingId,
        new_id: BookingId,
        date: NaiveDate,
        start: NaiveDateTime,
        end: NaiveDateTime,
        same_day: bool,
        notification: LedgerFlag,
    },
    Cancelled {
        old_id: BookingId,
        notified: bool,
    },
    /// Captured rows lacked contact or name; only the operator was alerted.
    MissingCriticalData { old_id: BookingId },
    /// The store failed while rebooking; the operator was alerted.
    StoreFailure { old_id: BookingId, reason: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconciliationReport {
    pub displaced: Vec<DisplacementOutcome>,
    pub reminders_sent: usize,
    pub reminder_errors: usize,
}

impl ReconciliationReport {
    pub fn rebooked(&self) -> usize {
        self.count(|outcome| matches!(outcome, DisplacementOutcome::Rebooked { .. }))
    }

    pub fn cancelled(&self) -> usize {
        self.count(|outcome| matches!(outcome, DisplacementOutcome::Cancelled { .. }))
    }

    pub fn operator_only(&self) -> usize {
        self.count(|outcome| {
            matches!(
                outcome,
                DisplacementOutcome::MissingCriticalData { .. }
                    | DisplacementOutcome::StoreFailure { .. }
            )
        })
    }

    fn count(&self, predicate: impl Fn(&DisplacementOutcome) -> bool) -> usize {
        self.displaced.iter().filter(|outcome| predicate(outcome)).count()
    }
}

/// Finds bookings with at least one row whose activity is no longer booked.
///
/// The requester payload comes from the first displaced row seen for each id;
/// the original date and start come from the booking's earliest row.
pub fn detect_displaced(snapshot: &GridSnapshot, quantum_minutes: u32) -> Vec<DisplacedBooking> {
    let index = snapshot.booking_index();
    let mut seen = HashSet::new();
    let mut displaced = Vec::new();

    for block in snapshot.blocks().iter().filter(|block| block.is_schedulable()) {
        let Some(id) = &block.booking_id else {
            continue;
        };
        if block.is_booked() || !seen.insert(id.clone()) {
            continue;
        }

        let rows = index.rows(id).to_vec();
        let Some((original_date, original_start)) = rows
            .first()
            .and_then(|&row| snapshot.block(row))
            .and_then(|first| Some((first.date?, first.slot?.start)))
        else {
            continue;
        };

        info!(
            booking_id = %id,
            row = block.row,
            activity = ?block.activity,
            "displaced booking detected"
        );

        displaced.push(DisplacedBooking {
            id: id.clone(),
            request: BookingRequest {
                requester: block.requester.clone(),
                duration_minutes: block
                    .duration_requested
                    .filter(|minutes| *minutes > 0)
                    .unwrap_or(quantum_minutes),
                submitted_at: block.submitted_at,
            },
            original_date,
            original_start,
            rows,
        });
    }

    displaced
}

/// Daily pass: repair displaced bookings, then send tomorrow's reminders.
pub struct Reconciler<'a, S, N: ?Sized> {
    grid: &'a ScheduleGrid<S>,
    allocator: Allocator,
    notifier: &'a N,
    composer: NoticeComposer,
    quantum_minutes: u32,
}

impl<'a, S, N> Reconciler<'a, S, N>
where
    S: ScheduleStore,
    N: Notifier + ?Sized,
{
    pub fn new(
        grid: &'a ScheduleGrid<S>,
        allocator: Allocator,
        notifier: &'a N,
        composer: NoticeComposer,
        quantum_minutes: u32,
    ) -> Self {
        Self {
            grid,
            allocator,
            notifier,
            composer,
            quantum_minutes,
        }
    }

    pub fn run(&self, today: NaiveDate) -> Result<ReconciliationReport, StoreError> {
        let mut report = ReconciliationReport::default();

        let snapshot = self.grid.snapshot()?;
        let displaced = detect_displaced(&snapshot, self.quantum_minutes);
        info!(count = displaced.len(), "reconciliation found displaced bookings");

        if !displaced.is_empty() {
            match self.clear_displaced(&snapshot, &displaced) {
                Ok(()) => {
                    for booking in &displaced {
                        report.displaced.push(self.rebook(booking, today));
                    }
                }
                Err(err) => {
                    error!(%err, "failed to clear displaced rows; rebooking skipped");
                    self.alert(
                        "clearing displaced bookings failed",
                        format!(
                            "{} displaced booking(s) could not be cleared: {err}",
                            displaced.len()
                        ),
                    );
                    report
                        .displaced
                        .extend(displaced.iter().map(|booking| DisplacementOutcome::StoreFailure {
                            old_id: booking.id.clone(),
                            reason: err.to_string(),
                        }));
                }
            }
        }

        match self.send_reminders(today) {
            Ok((sent, errors)) => {
                report.reminders_sent = sent;
                report.reminder_errors = errors;
            }
            Err(err) => {
                error!(%err, "failed to read schedule for reminders");
                self.alert("reminder pass failed", format!("Reminders were not sent: {err}"));
            }
        }

        Ok(report)
    }

    fn clear_displaced(
        &self,
        snapshot: &GridSnapshot,
        displaced: &[DisplacedBooking],
    ) -> Result<(), StoreError> {
        let blocks: Vec<&Block> = displaced
            .iter()
            .flat_map(|booking| booking.rows.iter())
            .filter_map(|&row| snapshot.block(row))
            .collect();
        self.grid.clear(&blocks)
    }

    fn rebook(&self, displaced: &DisplacedBooking, today: NaiveDate) -> DisplacementOutcome {
        let requester = &displaced.request.requester;
        if !requester.has_critical_data() {
            warn!(booking_id = %displaced.id, "displaced booking lacks contact or name");
            self.send_operator(self.composer.missing_critical_data(
                &displaced.id,
                displaced.original_date,
                displaced.original_start,
            ));
            return DisplacementOutcome::MissingCriticalData {
                old_id: displaced.id.clone(),
            };
        }

        match self.place(displaced, today) {
            Ok((booking, same_day)) => {
                info!(
                    old_id = %displaced.id,
                    new_id = %booking.id,
                    same_day,
                    "displaced booking rebooked"
                );
                let notice = self.composer.reschedule(
                    requester,
                    displaced.original_date,
                    displaced.original_start,
                    &booking,
                );
                let notification = NotificationLedger::new(self.grid).deliver(
                    self.notifier,
                    &notice,
                    &booking.id,
                    LedgerField::Confirmation,
                );
                DisplacementOutcome::Rebooked {
                    old_id: displaced.id.clone(),
                    new_id: booking.id,
                    date: booking.date,
                    start: booking.start,
                    end: booking.end,
                    same_day,
                    notification,
                }
            }
            Err(AllocationError::NotFound { blocks_needed }) => {
                info!(
                    booking_id = %displaced.id,
                    blocks_needed,
                    "no replacement slot; cancelling displaced booking"
                );
                let notice = self.composer.cancellation(
                    requester,
                    displaced.original_date,
                    displaced.original_start,
                );
                let notified = match self.notifier.send(&notice) {
                    Ok(()) => true,
                    Err(err) => {
                        warn!(booking_id = %displaced.id, %err, "cancellation notice failed");
                        false
                    }
                };
                DisplacementOutcome::Cancelled {
                    old_id: displaced.id.clone(),
                    notified,
                }
            }
            Err(AllocationError::Unpersisted { id, source }) => {
                error!(old_id = %displaced.id, new_id = %id, %source, "rebooking was not saved");
                NotificationLedger::new(self.grid).record_or_log(
                    &id,
                    LedgerField::Confirmation,
                    LedgerFlag::Error,
                );
                self.alert(
                    "rebooking failed",
                    format!(
                        "Booking {} could not be rebooked as {id}: {source}",
                        displaced.id
                    ),
                );
                DisplacementOutcome::StoreFailure {
                    old_id: displaced.id.clone(),
                    reason: source.to_string(),
                }
            }
            Err(AllocationError::Store(err)) => {
                error!(booking_id = %displaced.id, %err, "rebooking failed on store error");
                self.alert(
                    "rebooking failed",
                    format!("Booking {} could not be rebooked: {err}", displaced.id),
                );
                DisplacementOutcome::StoreFailure {
                    old_id: displaced.id.clone(),
                    reason: err.to_string(),
                }
            }
        }
    }

    /// Same date first, then anywhere. A booking dated before today is not
    /// offered its old date again.
    fn place(
        &self,
        displaced: &DisplacedBooking,
        today: NaiveDate,
    ) -> Result<(Booking, bool), AllocationError> {
        if displaced.original_date >= today {
            match self.allocator.find_slot(
                self.grid,
                &displaced.request,
                SearchScope::on(displaced.original_date),
                today,
                IdOrigin::Rebooking,
            ) {
                Ok(booking) => return Ok((booking, true)),
                Err(AllocationError::NotFound { .. }) => {}
                Err(err) => return Err(err),
            }
        }

        let booking = self.allocator.find_slot(
            self.grid,
            &displaced.request,
            SearchScope::anywhere(),
            today,
            IdOrigin::Rebooking,
        )?;
        let same_day = booking.date == displaced.original_date;
        Ok((booking, same_day))
    }

    /// One reminder per booking starting tomorrow whose reminder flag is still pending.
    fn send_reminders(&self, today: NaiveDate) -> Result<(usize, usize), StoreError> {
        let Some(tomorrow) = today.succ_opt() else {
            return Ok((0, 0));
        };
        let snapshot = self.grid.snapshot()?;
        let ledger = NotificationLedger::new(self.grid);
        let mut processed = HashSet::new();
        let (mut sent, mut errors) = (0, 0);

        for block in snapshot.blocks().iter().filter(|block| block.is_schedulable()) {
            let Some(id) = &block.booking_id else {
                continue;
            };
            if block.activity != Some(Activity::Booked)
                || block.date != Some(tomorrow)
                || block.reminder.is_settled()
                || !processed.insert(id.clone())
            {
                continue;
            }
            let Some(slot) = block.slot else {
                continue;
            };

            let flag = if block.requester.has_critical_data() {
                let notice = self.composer.reminder(&block.requester, tomorrow, slot.start);
                ledger.deliver(self.notifier, &notice, id, LedgerField::Reminder)
            } else {
                warn!(booking_id = %id, "reminder skipped: missing contact or name");
                ledger.record_or_log(id, LedgerField::Reminder, LedgerFlag::Error);
                LedgerFlag::Error
            };

            match flag {
                LedgerFlag::Sent => sent += 1,
                _ => errors += 1,
            }
        }

        Ok((sent, errors))
    }

    fn alert(&self, subject: &str, body: String) {
        self.send_operator(self.composer.operator_alert(subject, body));
    }

    fn send_operator(&self, notice: super::notices::Notice) {
        if let Err(err) = self.notifier.send(&notice) {
            warn!(%err, subject = %notice.subject, "operator alert failed");
        }
    }
}
