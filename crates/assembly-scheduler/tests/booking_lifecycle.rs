//! End-to-end scenarios through the public booking service: intake, displacement
//! by an operator edit, rebooking, and reminders, over both schedule stores.

mod common {
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};

    use assembly_scheduler::config::ScheduleConfig;
    use assembly_scheduler::workflows::schedule::{
        BookingSubmission, Notice, Notifier, NotifyError,
    };
    use chrono::NaiveDate;

    #[derive(Debug, Default)]
    pub(super) struct Inbox {
        notices: Mutex<Vec<Notice>>,
    }

    impl Inbox {
        pub(super) fn subjects_for(&self, contact: &str) -> Vec<String> {
            self.notices
                .lock()
                .expect("inbox mutex poisoned")
                .iter()
                .filter(|notice| notice.to.iter().any(|to| to == contact))
                .map(|notice| notice.subject.clone())
                .collect()
        }
    }

    impl Notifier for Inbox {
        fn send(&self, notice: &Notice) -> Result<(), NotifyError> {
            self.notices
                .lock()
                .expect("inbox mutex poisoned")
                .push(notice.clone());
            Ok(())
        }
    }

    pub(super) fn inbox() -> Arc<Inbox> {
        Arc::new(Inbox::default())
    }

    pub(super) fn config() -> ScheduleConfig {
        ScheduleConfig {
            admin_contact: "ops@example.org".to_string(),
            ..ScheduleConfig::default()
        }
    }

    pub(super) fn day(month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, month, day).expect("valid date")
    }

    pub(super) fn request(contact: &str, name: &str, minutes: &str) -> BookingSubmission {
        serde_json::from_value(serde_json::json!({
            "contact": contact,
            "name": name,
            "group": "5A",
            "subject": "Sharing",
            "duration_minutes": minutes,
        }))
        .expect("valid submission")
    }

    pub(super) fn temp_csv(label: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "assembly-lifecycle-{label}-{}-{}.csv",
            std::process::id(),
            chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
        ))
    }
}

use common::*;

use assembly_scheduler::workflows::schedule::{
    Booking, BookingService, Column, CsvSheet, DisplacementOutcome, MemorySheet, ScheduleStore,
    SubmissionOutcome,
};

fn scheduled(outcome: SubmissionOutcome) -> Booking {
    match outcome {
        SubmissionOutcome::Scheduled { booking, .. } => booking,
        other => panic!("expected a booking, got {other:?}"),
    }
}

#[test]
fn displaced_booking_moves_and_is_reminded() {
    let sheet = MemorySheet::default();
    let inbox = inbox();
    let service = BookingService::new(sheet.clone(), inbox.clone(), config());

    let added = service
        .populate(day(3, 2), day(3, 6))
        .expect("populate succeeds");
    assert_eq!(added, 7 + 4 * 3);

    let booking = scheduled(
        service
            .submit(request("ada@example.org", "Ada", "10 minutes"), day(3, 2))
            .expect("submission processed"),
    );
    assert_eq!(booking.date, day(3, 2));
    assert_eq!(booking.rows, vec![0, 1]);

    sheet.set_cell(0, Column::Activity, "Assembly");
    let report = service.reconcile(day(3, 2)).expect("reconciliation runs");

    assert_eq!(report.rebooked(), 1);
    let DisplacementOutcome::Rebooked { new_id, date, .. } = &report.displaced[0] else {
        panic!("expected a rebooking, got {:?}", report.displaced);
    };
    assert_eq!(*date, day(3, 2));
    assert_eq!(
        sheet.cell(1, Column::BookingId).as_deref(),
        Some(new_id.as_str())
    );
    assert_eq!(sheet.cell(0, Column::Activity).as_deref(), Some("Assembly"));

    let subjects = inbox.subjects_for("ada@example.org");
    assert_eq!(subjects.len(), 2);
    assert!(subjects[1].contains("rescheduled"));

    let bo = scheduled(
        service
            .submit(request("bo@example.org", "Bo", "5"), day(3, 2))
            .expect("submission processed"),
    );
    assert_eq!(bo.rows, vec![3]);

    let second = service.reconcile(day(3, 2)).expect("second cycle");
    assert!(second.displaced.is_empty());
    assert_eq!(second.reminders_sent, 0, "no bookings on Tuesday");
}

#[test]
fn csv_schedule_survives_reopening() {
    let path = temp_csv("reopen");
    {
        let store = CsvSheet::open(&path).expect("open succeeds");
        let service = BookingService::new(store, inbox(), config());
        service
            .populate(day(3, 3), day(3, 3))
            .expect("populate succeeds");
        service
            .submit(request("ada@example.org", "Ada", "15"), day(3, 2))
            .expect("submission processed");
    }

    let reopened = CsvSheet::open(&path).expect("reopen succeeds");
    let rows = reopened.read_rows().expect("read succeeds");
    assert_eq!(rows.len(), 3);
    for row in &rows {
        assert_eq!(row[Column::Activity.index()], "Booking");
        assert_eq!(row[Column::Contact.index()], "ada@example.org");
        assert_eq!(row[Column::ConfirmationSent.index()], "Yes");
    }

    let inbox = inbox();
    let service = BookingService::new(reopened, inbox.clone(), config());
    let report = service.reconcile(day(3, 2)).expect("reconciliation runs");
    assert_eq!(report.reminders_sent, 1);
    assert_eq!(inbox.subjects_for("ada@example.org").len(), 1);

    let rows = CsvSheet::open(&path)
        .expect("reopen succeeds")
        .read_rows()
        .expect("read succeeds");
    assert!(rows
        .iter()
        .all(|row| row[Column::ReminderSent.index()] == "Yes"));
    std::fs::remove_file(&path).ok();
}

#[test]
fn unsaved_csv_booking_never_reaches_the_file() {
    let path = temp_csv("blocked");
    let inbox = inbox();
    let service = BookingService::new(
        CsvSheet::open(&path).expect("open succeeds"),
        inbox.clone(),
        config(),
    );
    service
        .populate(day(3, 3), day(3, 3))
        .expect("populate succeeds");

    let mut staging = path.as_os_str().to_owned();
    staging.push(".tmp");
    let staging = std::path::PathBuf::from(staging);
    std::fs::create_dir(&staging).expect("blocker created");

    let failed = service.submit(request("first@example.org", "First", "5"), day(3, 2));
    assert!(failed.is_err());
    assert!(inbox.subjects_for("first@example.org").is_empty());
    let alerts = inbox.subjects_for("ops@example.org");
    assert_eq!(alerts.len(), 1);
    assert!(alerts[0].starts_with("Scheduler alert"));

    std::fs::remove_dir(&staging).expect("blocker removed");
    let second = scheduled(
        service
            .submit(request("second@example.org", "Second", "5"), day(3, 2))
            .expect("submission processed"),
    );
    assert_eq!(second.rows, vec![0]);

    let rows = CsvSheet::open(&path)
        .expect("reopen succeeds")
        .read_rows()
        .expect("read succeeds");
    assert!(rows
        .iter()
        .all(|row| row[Column::Contact.index()] != "first@example.org"));
    assert_eq!(rows[0][Column::Contact.index()], "second@example.org");
    std::fs::remove_file(&path).ok();
}
