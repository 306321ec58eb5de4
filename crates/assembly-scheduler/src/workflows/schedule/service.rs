use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{error, info, warn};

use super::allocator::{AllocationError, Allocator, SearchScope};
use super::domain::{Booking, BookingId, BookingRequest, IdOrigin, LedgerFlag, Requester};
use super::grid::{ScheduleGrid, ScheduleStore, StoreError};
use super::ledger::{LedgerField, NotificationLedger};
use super::notices::{NoticeComposer, Notifier};
use super::populate::empty_rows;
use super::reconcile::{ReconciliationReport, Reconciler};
use crate::config::ScheduleConfig;

/// Raw intake payload, as received from a form or the HTTP API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingSubmission {
    #[serde(default)]
    pub contact: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub attachment: String,
    /// Requested minutes, either a number or free text such as `"10 min"`.
    #[serde(default, deserialize_with = "deserialize_minutes")]
    pub duration_minutes: Option<u32>,
    #[serde(default)]
    pub submitted_at: Option<DateTime<Utc>>,
}

impl BookingSubmission {
    /// Validates the payload. A missing or zero duration becomes one quantum;
    /// a missing timestamp becomes now.
    pub fn into_request(self, quantum_minutes: u32) -> Result<BookingRequest, ValidationError> {
        let contact = self
            .contact
            .map(|contact| contact.trim().to_string())
            .filter(|contact| !contact.is_empty())
            .ok_or(ValidationError::MissingContact)?;

        Ok(BookingRequest {
            requester: Requester {
                contact,
                name: self.name.trim().to_string(),
                group: self.group.trim().to_string(),
                phone: self.phone.trim().to_string(),
                subject: self.subject.trim().to_string(),
                attachment: self.attachment.trim().to_string(),
            },
            duration_minutes: self
                .duration_minutes
                .filter(|minutes| *minutes > 0)
                .unwrap_or(quantum_minutes),
            submitted_at: Some(self.submitted_at.unwrap_or_else(Utc::now)),
        })
    }
}

/// First run of ASCII digits in `raw`, e.g. `"about 10 minutes"` -> 10.
/// Values too large for `u32` saturate so they can never fit a schedule.
pub fn parse_minutes(raw: &str) -> Option<u32> {
    let digits: String = raw
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(char::is_ascii_digit)
        .collect();
    if digits.is_empty() {
        return None;
    }
    Some(digits.parse().unwrap_or(u32::MAX))
}

fn deserialize_minutes<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawMinutes {
        Number(u64),
        Text(String),
    }

    Ok(match Option::<RawMinutes>::deserialize(deserializer)? {
        Some(RawMinutes::Number(minutes)) => Some(u32::try_from(minutes).unwrap_or(u32::MAX)),
        Some(RawMinutes::Text(text)) => parse_minutes(&text),
        None => None,
    })
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("submission has no contact address")]
    MissingContact,
}

/// Error raised by the booking service.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Public shape of a confirmed booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookingView {
    pub booking_id: BookingId,
    pub date: NaiveDate,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub blocks: usize,
    pub contact: String,
}

impl From<&Booking> for BookingView {
    fn from(booking: &Booking) -> Self {
        Self {
            booking_id: booking.id.clone(),
            date: booking.date,
            start: booking.start,
            end: booking.end,
            blocks: booking.rows.len(),
            contact: booking.request.requester.contact.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionOutcome {
    Scheduled {
        booking: Booking,
        confirmation: LedgerFlag,
    },
    /// No run was free; the requester and the operator were told.
    Unscheduled { blocks_needed: usize, notified: bool },
}

/// Serializes intake, reconciliation and population over one schedule.
pub struct BookingService<S, N> {
    grid: ScheduleGrid<S>,
    notifier: Arc<N>,
    config: ScheduleConfig,
    allocator: Allocator,
    composer: NoticeComposer,
    run_lock: Mutex<()>,
}

impl<S, N> BookingService<S, N>
where
    S: ScheduleStore + 'static,
    N: Notifier + 'static,
{
    pub fn new(store: S, notifier: Arc<N>, config: ScheduleConfig) -> Self {
        let grid = ScheduleGrid::new(store, config.booking_label.clone());
        let allocator = Allocator::new(config.policy(), config.quantum_minutes);
        let composer = NoticeComposer::new(&config);
        Self {
            grid,
            notifier,
            config,
            allocator,
            composer,
            run_lock: Mutex::new(()),
        }
    }

    pub fn grid(&self) -> &ScheduleGrid<S> {
        &self.grid
    }

    pub fn config(&self) -> &ScheduleConfig {
        &self.config
    }

    /// Books the earliest free run for a submission and confirms it.
    pub fn submit(
        &self,
        submission: BookingSubmission,
        today: NaiveDate,
    ) -> Result<SubmissionOutcome, ServiceError> {
        let _guard = self.lock()?;

        let summary = format!(
            "name: {}, subject: {}, duration: {:?}",
            submission.name, submission.subject, submission.duration_minutes
        );
        let request = match submission.into_request(self.config.quantum_minutes) {
            Ok(request) => request,
            Err(err) => {
                warn!(%err, "rejected submission");
                self.alert(
                    "submission rejected",
                    format!("A submission could not be scheduled ({err}). {summary}"),
                );
                return Err(err.into());
            }
        };

        info!(
            contact = %request.requester.contact,
            duration_minutes = request.duration_minutes,
            "processing submission"
        );

        match self.allocator.find_slot(
            &self.grid,
            &request,
            SearchScope::anywhere(),
            today,
            IdOrigin::Submission,
        ) {
            Ok(booking) => {
                let notice = self.composer.confirmation(&booking);
                let confirmation = NotificationLedger::new(&self.grid).deliver(
                    self.notifier.as_ref(),
                    &notice,
                    &booking.id,
                    LedgerField::Confirmation,
                );
                Ok(SubmissionOutcome::Scheduled {
                    booking,
                    confirmation,
                })
            }
            Err(AllocationError::NotFound { blocks_needed }) => {
                info!(
                    contact = %request.requester.contact,
                    blocks_needed,
                    "no free run for submission"
                );
                let notice = self
                    .composer
                    .unschedulable(&request.requester, request.duration_minutes);
                let notified = match self.notifier.send(&notice) {
                    Ok(()) => true,
                    Err(err) => {
                        warn!(%err, "unschedulable notice failed");
                        false
                    }
                };
                Ok(SubmissionOutcome::Unscheduled {
                    blocks_needed,
                    notified,
                })
            }
            Err(AllocationError::Unpersisted { id, source }) => {
                error!(booking_id = %id, %source, "booking was not saved");
                NotificationLedger::new(&self.grid).record_or_log(
                    &id,
                    LedgerField::Confirmation,
                    LedgerFlag::Error,
                );
                self.alert(
                    "booking not saved",
                    format!(
                        "Booking {id} for {} could not be saved ({source}). The requester was not notified.",
                        request.requester.contact
                    ),
                );
                Err(source.into())
            }
            Err(AllocationError::Store(err)) => {
                error!(%err, "schedule unavailable for submission");
                self.alert(
                    "submission failed",
                    format!(
                        "A submission from {} could not be processed ({err}). The requester was not notified.",
                        request.requester.contact
                    ),
                );
                Err(err.into())
            }
        }
    }

    /// Runs one reconciliation cycle: displacement recovery, then reminders.
    pub fn reconcile(&self, today: NaiveDate) -> Result<ReconciliationReport, ServiceError> {
        let _guard = self.lock()?;
        let report = Reconciler::new(
            &self.grid,
            self.allocator,
            self.notifier.as_ref(),
            self.composer.clone(),
            self.config.quantum_minutes,
        )
        .run(today)?;

        info!(
            displaced = report.displaced.len(),
            rebooked = report.rebooked(),
            cancelled = report.cancelled(),
            reminders_sent = report.reminders_sent,
            "reconciliation finished"
        );
        Ok(report)
    }

    /// Appends empty rows for `[from, to]` and returns how many were added.
    pub fn populate(&self, from: NaiveDate, to: NaiveDate) -> Result<usize, ServiceError> {
        let _guard = self.lock()?;
        let rows = empty_rows(&self.config, from, to);
        self.grid.append(&rows)?;
        info!(rows = rows.len(), %from, %to, "schedule populated");
        Ok(rows.len())
    }

    fn alert(&self, subject: &str, body: String) {
        let notice = self.composer.operator_alert(subject, body);
        if let Err(err) = self.notifier.send(&notice) {
            warn!(%err, subject, "operator alert failed");
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, ()>, StoreError> {
        self.run_lock
            .lock()
            .map_err(|_| StoreError::Unavailable("booking service lock poisoned".to_string()))
    }
}
