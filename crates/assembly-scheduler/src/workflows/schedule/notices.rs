use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::domain::{Booking, BookingId, Requester};
use super::window::{clock_from_minutes, TimeWindowPolicy};
use crate::config::ScheduleConfig;

/// One outbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub to: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bcc: Vec<String>,
    pub subject: String,
    pub body: String,
}

/// Delivery error reported by a notifier.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
    #[error("failed to write notification outbox: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode notification: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Outbound message hook (e-mail gateway, outbox file, test recorder).
pub trait Notifier: Send + Sync {
    fn send(&self, notice: &Notice) -> Result<(), NotifyError>;
}

/// Writes every notice to the log and reports success.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send(&self, notice: &Notice) -> Result<(), NotifyError> {
        info!(
            to = ?notice.to,
            bcc = ?notice.bcc,
            subject = %notice.subject,
            "notification dispatched"
        );
        Ok(())
    }
}

/// Appends notices as JSON lines for an external mailer to pick up.
#[derive(Debug)]
pub struct OutboxNotifier {
    path: PathBuf,
    lock: Mutex<()>,
}

impl OutboxNotifier {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }
}

impl Notifier for OutboxNotifier {
    fn send(&self, notice: &Notice) -> Result<(), NotifyError> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| NotifyError::Transport("outbox lock poisoned".to_string()))?;
        let mut line = serde_json::to_vec(notice)?;
        line.push(b'\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(&line)?;
        Ok(())
    }
}

fn format_date(date: NaiveDate) -> String {
    date.format("%A, %B %d, %Y").to_string()
}

fn format_time(at: NaiveDateTime) -> String {
    at.format("%I:%M %p").to_string()
}

/// Builds the messages the engine sends.
#[derive(Debug, Clone)]
pub struct NoticeComposer {
    admin_contact: String,
    policy: TimeWindowPolicy,
    report_lead_minutes: u32,
}

impl NoticeComposer {
    pub fn new(config: &ScheduleConfig) -> Self {
        Self {
            admin_contact: config.admin_contact.clone(),
            policy: config.policy(),
            report_lead_minutes: config.report_lead_minutes,
        }
    }

    pub fn admin_contact(&self) -> &str {
        &self.admin_contact
    }

    pub fn confirmation(&self, booking: &Booking) -> Notice {
        let requester = &booking.request.requester;
        Notice {
            to: vec![requester.contact.clone()],
            bcc: Vec::new(),
            subject: "Confirmation: your assembly slot".to_string(),
            body: format!(
                "Hi {},\n\nYour slot for \"{}\" has been scheduled.\n\nDate: {}\nTime: {} - {}\n\nA reminder with reporting details will follow the day before.\n",
                requester.display_name(),
                requester.display_subject(),
                format_date(booking.date),
                format_time(booking.start),
                format_time(booking.end),
            ),
        }
    }

    /// Reporting time is the window opening for that weekday minus the lead time.
    pub fn reporting_time(&self, date: NaiveDate) -> Option<String> {
        let window = self.policy.window_for(date.weekday())?;
        let minutes = window
            .start_minute()
            .checked_sub(self.report_lead_minutes)?;
        let clock = clock_from_minutes(minutes)?;
        Some(clock.format("%I:%M %p").to_string())
    }

    pub fn reminder(&self, requester: &Requester, date: NaiveDate, start: NaiveDateTime) -> Notice {
        let reporting = match self.reporting_time(date) {
            Some(time) => format!("Please report by {time} to set up.\n"),
            None => String::new(),
        };
        Notice {
            to: vec![requester.contact.clone()],
            bcc: Vec::new(),
            subject: format!("Reminder: your assembly slot tomorrow ({})", format_date(date)),
            body: format!(
                "Hi {},\n\nThis is a reminder about your slot tomorrow, {}, starting at {}.\n{}",
                requester.display_name(),
                format_date(date),
                format_time(start),
                reporting,
            ),
        }
    }

    pub fn reschedule(
        &self,
        requester: &Requester,
        old_date: NaiveDate,
        old_start: NaiveDateTime,
        booking: &Booking,
    ) -> Notice {
        Notice {
            to: vec![requester.contact.clone()],
            bcc: vec![self.admin_contact.clone()],
            subject: "Update: your assembly slot has been rescheduled".to_string(),
            body: format!(
                "Hi {},\n\nYour slot for \"{}\" on {} at {} was moved because of a programme change.\n\nNew date: {}\nNew time: {} - {}\n",
                requester.display_name(),
                requester.display_subject(),
                format_date(old_date),
                format_time(old_start),
                format_date(booking.date),
                format_time(booking.start),
                format_time(booking.end),
            ),
        }
    }

    pub fn unschedulable(&self, requester: &Requester, duration_minutes: u32) -> Notice {
        Notice {
            to: vec![requester.contact.clone(), self.admin_contact.clone()],
            bcc: Vec::new(),
            subject: "Unable to schedule your assembly slot".to_string(),
            body: format!(
                "Hi {},\n\nWe could not find a free {}-minute slot for \"{}\" in the upcoming schedule. Please contact the assembly coordinator to arrange one manually.\n",
                requester.display_name(),
                duration_minutes,
                requester.display_subject(),
            ),
        }
    }

    pub fn cancellation(
        &self,
        requester: &Requester,
        old_date: NaiveDate,
        old_start: NaiveDateTime,
    ) -> Notice {
        Notice {
            to: vec![requester.contact.clone(), self.admin_contact.clone()],
            bcc: Vec::new(),
            subject: "Update: your assembly slot has been cancelled".to_string(),
            body: format!(
                "Hi {},\n\nYour slot for \"{}\" on {} at {} was removed because of a programme change, and no replacement slot is free. Please contact the assembly coordinator if you still wish to present.\n",
                requester.display_name(),
                requester.display_subject(),
                format_date(old_date),
                format_time(old_start),
            ),
        }
    }

    pub fn operator_alert(&self, subject: &str, body: String) -> Notice {
        Notice {
            to: vec![self.admin_contact.clone()],
            bcc: Vec::new(),
            subject: format!("Scheduler alert: {subject}"),
            body,
        }
    }

    pub fn missing_critical_data(
        &self,
        id: &BookingId,
        old_date: NaiveDate,
        old_start: NaiveDateTime,
    ) -> Notice {
        self.operator_alert(
            "rebooking failed",
            format!(
                "Booking {id} ({} {}) was displaced but its rows lack a contact or name, so the requester cannot be notified.",
                old_date.format("%Y-%m-%d"),
                old_start.format("%H:%M"),
            ),
        )
    }
}
