use chrono::{Datelike, NaiveDateTime, NaiveTime, Weekday};

use super::slot::{minute_of_day, parse_clock_pair, SlotParseError};

/// Half-open clock range `[start, end)` within a single day, in minutes after midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockWindow {
    start_minute: u32,
    end_minute: u32,
}

impl ClockWindow {
    pub const fn from_minutes(start_minute: u32, end_minute: u32) -> Self {
        Self {
            start_minute,
            end_minute,
        }
    }

    /// Parses a window written in the slot token format, e.g. `0905-0940`.
    pub fn parse(token: &str) -> Result<Self, SlotParseError> {
        let (start, end) = parse_clock_pair(token)?;
        let (start_minute, end_minute) = (minute_of_day(start), minute_of_day(end));
        if end_minute <= start_minute {
            return Err(SlotParseError::NonPositiveDuration(token.trim().to_string()));
        }
        Ok(Self::from_minutes(start_minute, end_minute))
    }

    pub fn contains(&self, clock: NaiveTime) -> bool {
        let minute = minute_of_day(clock);
        minute >= self.start_minute && minute < self.end_minute
    }

    pub fn start(&self) -> Option<NaiveTime> {
        clock_from_minutes(self.start_minute)
    }

    pub fn end(&self) -> Option<NaiveTime> {
        clock_from_minutes(self.end_minute)
    }

    pub const fn start_minute(&self) -> u32 {
        self.start_minute
    }

    pub const fn end_minute(&self) -> u32 {
        self.end_minute
    }
}

pub(crate) fn clock_from_minutes(minutes: u32) -> Option<NaiveTime> {
    NaiveTime::from_hms_opt(minutes / 60, minutes % 60, 0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeekdayClass {
    Monday,
    TuesdayToFriday,
    Weekend,
}

impl WeekdayClass {
    pub const fn of(weekday: Weekday) -> Self {
        match weekday {
            Weekday::Mon => Self::Monday,
            Weekday::Tue | Weekday::Wed | Weekday::Thu | Weekday::Fri => Self::TuesdayToFriday,
            Weekday::Sat | Weekday::Sun => Self::Weekend,
        }
    }
}

/// Answers whether a block may start at a given weekday and clock time.
///
/// Only block starts are checked; a block that starts inside the window may
/// end after it closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindowPolicy {
    monday: ClockWindow,
    tuesday_to_friday: ClockWindow,
}

impl TimeWindowPolicy {
    pub const fn new(monday: ClockWindow, tuesday_to_friday: ClockWindow) -> Self {
        Self {
            monday,
            tuesday_to_friday,
        }
    }

    pub fn window_for(&self, weekday: Weekday) -> Option<ClockWindow> {
        match WeekdayClass::of(weekday) {
            WeekdayClass::Monday => Some(self.monday),
            WeekdayClass::TuesdayToFriday => Some(self.tuesday_to_friday),
            WeekdayClass::Weekend => None,
        }
    }

    pub fn is_within_window(&self, weekday: Weekday, clock: NaiveTime) -> bool {
        self.window_for(weekday)
            .is_some_and(|window| window.contains(clock))
    }

    /// Whether a block starting at `start` may be booked.
    pub fn admits(&self, start: NaiveDateTime) -> bool {
        self.is_within_window(start.date().weekday(), start.time())
    }
}
