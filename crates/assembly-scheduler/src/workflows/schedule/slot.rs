use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::Serialize;

/// Start and end instants of one block, anchored to the block's calendar date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SlotTime {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl SlotTime {
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SlotParseError {
    #[error("time slot '{0}' is not in HHMM-HHMM format")]
    Format(String),
    #[error("time slot '{0}' contains an invalid hour or minute")]
    InvalidDigits(String),
    #[error("time slot '{0}' does not end after it starts")]
    NonPositiveDuration(String),
}

/// Parses the `HHMM-HHMM` clock pair without anchoring it to a date.
pub(crate) fn parse_clock_pair(token: &str) -> Result<(NaiveTime, NaiveTime), SlotParseError> {
    let trimmed = token.trim();
    let (start, end) = trimmed
        .split_once('-')
        .filter(|(start, end)| is_four_digits(start) && is_four_digits(end))
        .ok_or_else(|| SlotParseError::Format(trimmed.to_string()))?;

    let start = parse_clock(start).ok_or_else(|| SlotParseError::InvalidDigits(trimmed.to_string()))?;
    let end = parse_clock(end).ok_or_else(|| SlotParseError::InvalidDigits(trimmed.to_string()))?;
    Ok((start, end))
}

/// Parses a time slot token such as `0905-0910` into instants on `anchor`.
///
/// A token whose end clock is earlier than its start clock wraps overnight and
/// ends on the following day. Equal clocks are rejected.
pub fn parse_slot(token: &str, anchor: NaiveDate) -> Result<SlotTime, SlotParseError> {
    let (start_clock, end_clock) = parse_clock_pair(token)?;

    let start = anchor.and_time(start_clock);
    let mut end = anchor.and_time(end_clock);

    if end <= start {
        if minute_of_day(end_clock) < minute_of_day(start_clock) {
            end += Duration::days(1);
        } else {
            return Err(SlotParseError::NonPositiveDuration(token.trim().to_string()));
        }
    }

    Ok(SlotTime { start, end })
}

/// Renders a clock pair back into the token format stored in the schedule.
pub fn format_slot(start: NaiveTime, end: NaiveTime) -> String {
    format!("{}-{}", start.format("%H%M"), end.format("%H%M"))
}

pub(crate) fn minute_of_day(clock: NaiveTime) -> u32 {
    clock.hour() * 60 + clock.minute()
}

fn is_four_digits(raw: &str) -> bool {
    raw.len() == 4 && raw.bytes().all(|b| b.is_ascii_digit())
}

fn parse_clock(raw: &str) -> Option<NaiveTime> {
    let hour = raw.get(0..2)?.parse::<u32>().ok()?;
    let minute = raw.get(2..4)?.parse::<u32>().ok()?;
    if hour > 23 || minute > 59 {
        return None;
    }
    NaiveTime::from_hms_opt(hour, minute, 0)
}
