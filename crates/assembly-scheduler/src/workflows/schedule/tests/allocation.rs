use super::common::*;

use chrono::{Duration, NaiveDate, NaiveTime};

use crate::workflows::schedule::allocator::{Allocator, SearchScope};
use crate::workflows::schedule::domain::{Activity, LedgerFlag};
use crate::workflows::schedule::grid::{Block, Column, MemorySheet, ScheduleGrid, SheetRow};
use crate::workflows::schedule::service::SubmissionOutcome;
use crate::workflows::schedule::slot::format_slot;
use crate::workflows::schedule::window::TimeWindowPolicy;

fn scheduled(outcome: SubmissionOutcome) -> (crate::workflows::schedule::Booking, LedgerFlag) {
    match outcome {
        SubmissionOutcome::Scheduled {
            booking,
            confirmation,
        } => (booking, confirmation),
        other => panic!("expected a booking, got {other:?}"),
    }
}

#[test]
fn ten_minutes_do_not_fit_a_single_free_monday_row() {
    let mut rows: Vec<SheetRow> = ["0905", "0910", "0915", "0920", "0925", "0930"]
        .iter()
        .zip(["0910", "0915", "0920", "0925", "0930", "0935"])
        .map(|(start, end)| row("2026-03-02", &format!("{start}-{end}"), "Announcement"))
        .collect();
    rows.push(row("2026-03-02", "0935-0940", "Empty"));
    let (service, sheet, notifier) = build_service(rows);

    let outcome = service
        .submit(submission("ada@example.org", "Ada", 10), monday())
        .expect("submission processed");

    assert_eq!(
        outcome,
        SubmissionOutcome::Unscheduled {
            blocks_needed: 2,
            notified: true
        }
    );
    assert_eq!(sheet.write_count(), 0, "no partial assignment");
    let notices = notifier.sent();
    assert_eq!(notices.len(), 1);
    assert_eq!(
        notices[0].to,
        vec!["ada@example.org".to_string(), OPERATOR.to_string()]
    );
}

#[test]
fn assigned_run_is_contiguous_and_rescans_as_booked() {
    let (service, sheet, notifier) = build_service(week(monday(), tuesday()));

    let (booking, confirmation) = scheduled(
        service
            .submit(submission("ada@example.org", "Ada", 12), monday())
            .expect("submission processed"),
    );

    assert_eq!(booking.rows, vec![0, 1, 2]);
    assert_eq!(booking.date, monday());
    assert_eq!(booking.start.format("%H:%M").to_string(), "09:05");
    assert_eq!(booking.end.format("%H:%M").to_string(), "09:20");
    assert_eq!(confirmation, LedgerFlag::Sent);

    let snapshot = service.grid().snapshot().expect("snapshot reads");
    assert_eq!(snapshot.booking_index().rows(&booking.id), &[0, 1, 2]);
    for row in &booking.rows {
        let block = snapshot.block(*row).expect("row exists");
        assert_eq!(block.activity, Some(Activity::Booked));
        assert_eq!(block.booking_id.as_ref(), Some(&booking.id));
        assert_eq!(block.confirmation, LedgerFlag::Sent);
        assert_eq!(block.reminder, LedgerFlag::Pending);
        assert_eq!(block.duration_requested, Some(12));
    }
    assert_eq!(cell(&sheet, 3, Column::Activity), "Empty");
    assert_eq!(cell(&sheet, 0, Column::ReminderSent), "No");
    assert_eq!(sheet.write_count(), 2, "one assignment write and one ledger write");

    let confirmations = notifier.sent_to("ada@example.org");
    assert_eq!(confirmations.len(), 1);
    assert!(confirmations[0].body.contains("09:05 AM - 09:20 AM"));
}

#[test]
fn first_fit_takes_the_earliest_run_not_the_tightest() {
    let (service, _, _) = build_service(vec![
        row("2026-03-02", "0905-0910", "Empty"),
        row("2026-03-02", "0910-0915", "Empty"),
        row("2026-03-02", "0915-0920", "Announcement"),
        row("2026-03-02", "0920-0925", "Empty"),
    ]);

    let (booking, _) = scheduled(
        service
            .submit(submission("ada@example.org", "Ada", 5), monday())
            .expect("submission processed"),
    );
    assert_eq!(booking.rows, vec![0]);
}

#[test]
fn identical_payloads_receive_distinct_ids() {
    let (service, _, _) = build_service(week(monday(), monday()));

    let (first, _) = scheduled(
        service
            .submit(submission("ada@example.org", "Ada", 5), monday())
            .expect("first submission"),
    );
    let (second, _) = scheduled(
        service
            .submit(submission("ada@example.org", "Ada", 5), monday())
            .expect("second submission"),
    );

    assert_ne!(first.id, second.id);
    assert_eq!(second.rows, vec![1]);
}

#[test]
fn past_dates_and_weekends_are_never_booked() {
    let mut rows = week(monday(), tuesday());
    rows.insert(0, row("2026-02-27", "0805-0810", "Empty"));
    rows.push(row("2026-03-07", "0805-0810", "Empty"));
    let (service, _, _) = build_service(rows);

    let (booking, _) = scheduled(
        service
            .submit(submission("ada@example.org", "Ada", 5), tuesday())
            .expect("submission processed"),
    );
    assert_eq!(booking.date, tuesday());

    for _ in 0..2 {
        service
            .submit(submission("bo@example.org", "Bo", 5), tuesday())
            .expect("submission processed");
    }
    let outcome = service
        .submit(submission("cy@example.org", "Cy", 5), tuesday())
        .expect("submission processed");
    assert!(matches!(outcome, SubmissionOutcome::Unscheduled { .. }));
}

#[test]
fn every_assigned_block_starts_inside_its_window() {
    let mut rows = Vec::new();
    for day in [monday(), tuesday()] {
        let mut clock = NaiveTime::from_hms_opt(7, 50, 0).expect("valid time");
        let end = NaiveTime::from_hms_opt(9, 50, 0).expect("valid time");
        while clock < end {
            let next = clock + Duration::minutes(5);
            rows.push(row(
                &day.format("%Y-%m-%d").to_string(),
                &format_slot(clock, next),
                "Empty",
            ));
            clock = next;
        }
    }
    let (service, _, _) = build_service(rows);
    let policy = config().policy();

    for (index, minutes) in [10, 5, 15, 20, 5, 10, 30, 5].into_iter().enumerate() {
        let contact = format!("req{index}@example.org");
        let outcome = service
            .submit(submission(&contact, "Req", minutes), monday())
            .expect("submission processed");
        if let SubmissionOutcome::Scheduled { booking, .. } = outcome {
            assert_eq!(booking.rows.len(), (minutes as usize).div_ceil(5));
        }
    }

    let snapshot = service.grid().snapshot().expect("snapshot reads");
    let booked: Vec<&Block> = snapshot
        .blocks()
        .iter()
        .filter(|block| block.is_booked())
        .collect();
    assert!(!booked.is_empty());
    for block in booked {
        let slot = block.slot.expect("booked rows parse");
        assert!(policy.admits(slot.start), "row {} outside window", block.row);
    }
}

/// Reference scan that tries every row as a start.
fn exhaustive_first_fit(
    blocks: &[Block],
    policy: &TimeWindowPolicy,
    needed: usize,
    today: NaiveDate,
) -> Option<usize> {
    (0..blocks.len()).find(|&start| {
        let first = &blocks[start];
        if first.date.map_or(true, |date| date < today) {
            return false;
        }
        let mut previous_end = None;
        let mut count = 0;
        for block in &blocks[start..] {
            if count == needed {
                break;
            }
            let Some(slot) = block.slot.filter(|_| block.is_schedulable()) else {
                break;
            };
            if block.date != first.date || !block.is_empty_block() || !policy.admits(slot.start) {
                break;
            }
            if previous_end.is_some_and(|end| end != slot.start) {
                break;
            }
            previous_end = Some(slot.end);
            count += 1;
        }
        count == needed
    })
}

struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.0 >> 33
    }
}

fn generated_grid(seed: u64) -> Vec<SheetRow> {
    let mut rng = Lcg(seed);
    let mut rows = Vec::new();
    for day in [date(3, 2), date(3, 3), date(3, 4)] {
        let stamp = day.format("%Y-%m-%d").to_string();
        let mut clock = NaiveTime::from_hms_opt(7, 55, 0).expect("valid time");
        let end = NaiveTime::from_hms_opt(9, 45, 0).expect("valid time");
        while clock < end {
            let next = clock + Duration::minutes(5);
            let roll = rng.next() % 20;
            if roll == 0 {
                clock = next;
                continue;
            }
            let slot = if roll == 1 {
                "bad-slot".to_string()
            } else {
                format_slot(clock, next)
            };
            let activity = match rng.next() % 10 {
                0 | 1 => "Announcement",
                2 => "Booking",
                3 => "",
                _ => "Empty",
            };
            rows.push(row(&stamp, &slot, activity));
            clock = next;
        }
    }
    rows
}

#[test]
fn skip_ahead_scan_matches_exhaustive_scan() {
    let allocator = Allocator::new(config().policy(), 5);
    let policy = config().policy();

    for seed in 0..300 {
        let grid = ScheduleGrid::new(MemorySheet::with_rows(generated_grid(seed)), "Booking");
        let snapshot = grid.snapshot().expect("snapshot reads");
        for needed in 1..=5 {
            for today in [date(3, 2), date(3, 3)] {
                let fast = allocator
                    .find_run(&snapshot, needed, SearchScope::anywhere(), today)
                    .map(|run| run.first_row);
                let slow = exhaustive_first_fit(snapshot.blocks(), &policy, needed, today);
                assert_eq!(fast, slow, "seed {seed}, needed {needed}, today {today}");
            }
        }
    }
}
