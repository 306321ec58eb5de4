use chrono::{Datelike, NaiveDate};

use super::domain::EMPTY_ACTIVITY;
use super::grid::{Column, SheetRow};
use super::slot::format_slot;
use super::window::clock_from_minutes;
use crate::config::ScheduleConfig;

/// Empty rows for every weekday in `[from, to]`, one per quantum while the
/// block start is inside that day's window.
pub fn empty_rows(config: &ScheduleConfig, from: NaiveDate, to: NaiveDate) -> Vec<SheetRow> {
    let policy = config.policy();
    let quantum = config.quantum_minutes.max(1);
    let mut rows = Vec::new();

    for date in from.iter_days().take_while(|date| *date <= to) {
        let Some(window) = policy.window_for(date.weekday()) else {
            continue;
        };

        let mut minute = window.start_minute();
        while minute < window.end_minute() {
            let (Some(start), Some(end)) = (
                clock_from_minutes(minute),
                clock_from_minutes((minute + quantum) % (24 * 60)),
            ) else {
                break;
            };

            let mut row = vec![String::new(); Column::WIDTH];
            row[Column::Date.index()] = date.format("%Y-%m-%d").to_string();
            row[Column::TimeSlot.index()] = format_slot(start, end);
            row[Column::Duration.index()] = quantum.to_string();
            row[Column::Activity.index()] = EMPTY_ACTIVITY.to_string();
            rows.push(row);

            minute += quantum;
        }
    }

    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, day).expect("valid date")
    }

    #[test]
    fn monday_and_tuesday_follow_their_windows() {
        let rows = empty_rows(&ScheduleConfig::default(), date(2), date(3));
        let slots: Vec<&str> = rows
            .iter()
            .map(|row| row[Column::TimeSlot.index()].as_str())
            .collect();

        assert_eq!(rows.len(), 7 + 3);
        assert_eq!(slots[0], "0905-0910");
        assert_eq!(slots[6], "0935-0940");
        assert_eq!(&slots[7..], &["0805-0810", "0810-0815", "0815-0820"]);
        assert!(rows
            .iter()
            .all(|row| row[Column::Activity.index()] == EMPTY_ACTIVITY));
    }

    #[test]
    fn weekends_produce_no_rows() {
        assert!(empty_rows(&ScheduleConfig::default(), date(7), date(8)).is_empty());
    }

    #[test]
    fn inverted_range_is_empty() {
        assert!(empty_rows(&ScheduleConfig::default(), date(3), date(2)).is_empty());
    }
}
