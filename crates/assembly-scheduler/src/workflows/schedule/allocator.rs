use chrono::{NaiveDate, NaiveDateTime};
use tracing::{debug, info, warn};

use super::domain::{Booking, BookingId, BookingRequest, IdOrigin};
use super::grid::{Block, GridSnapshot, ScheduleGrid, ScheduleStore, StoreError};
use super::window::TimeWindowPolicy;

/// Rows the allocator may consider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchScope {
    /// Restrict the search to one date. Without it, dates before today are skipped.
    pub date: Option<NaiveDate>,
}

impl SearchScope {
    pub const fn anywhere() -> Self {
        Self { date: None }
    }

    pub const fn on(date: NaiveDate) -> Self {
        Self { date: Some(date) }
    }
}

/// A run of consecutive free rows long enough for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Run {
    pub first_row: usize,
    pub len: usize,
    pub date: NaiveDate,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

#[derive(Debug, thiserror::Error)]
pub enum AllocationError {
    #[error("no run of {blocks_needed} contiguous free blocks is available")]
    NotFound { blocks_needed: usize },
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Rows may hold the booking in the store, but it was not persisted.
    #[error("booking {id} could not be saved: {source}")]
    Unpersisted { id: BookingId, source: StoreError },
}

/// First-fit search for consecutive free blocks.
#[derive(Debug, Clone, Copy)]
pub struct Allocator {
    policy: TimeWindowPolicy,
    quantum_minutes: u32,
}

impl Allocator {
    pub fn new(policy: TimeWindowPolicy, quantum_minutes: u32) -> Self {
        Self {
            policy,
            quantum_minutes: quantum_minutes.max(1),
        }
    }

    /// Whole quanta needed to cover `duration_minutes`, never fewer than one.
    pub fn blocks_needed(&self, duration_minutes: u32) -> usize {
        duration_minutes.div_ceil(self.quantum_minutes).max(1) as usize
    }

    /// Finds the earliest run of `needed` blocks in row order.
    pub fn find_run(
        &self,
        snapshot: &GridSnapshot,
        needed: usize,
        scope: SearchScope,
        today: NaiveDate,
    ) -> Option<Run> {
        let blocks = snapshot.blocks();
        let mut index = 0;

        while index < blocks.len() {
            if !self.can_start_run(&blocks[index], scope, today) {
                index += 1;
                continue;
            }

            let run_len = self.extend_run(blocks, index, needed);
            if run_len >= needed {
                let first = &blocks[index];
                let last = &blocks[index + needed - 1];
                let (Some(date), Some(first_slot), Some(last_slot)) =
                    (first.date, first.slot, last.slot)
                else {
                    index += 1;
                    continue;
                };
                return Some(Run {
                    first_row: first.row,
                    len: needed,
                    date,
                    start: first_slot.start,
                    end: last_slot.end,
                });
            }

            // Every later start inside this run ends at the same breaking row,
            // so none of them can reach `needed` either.
            index += run_len.max(1);
        }

        None
    }

    /// Finds a run for the request and books it under a fresh id.
    pub fn find_slot<S: ScheduleStore>(
        &self,
        grid: &ScheduleGrid<S>,
        request: &BookingRequest,
        scope: SearchScope,
        today: NaiveDate,
        origin: IdOrigin,
    ) -> Result<Booking, AllocationError> {
        let blocks_needed = self.blocks_needed(request.duration_minutes);
        debug!(
            contact = %request.requester.contact,
            blocks_needed,
            date = ?scope.date,
            "searching for consecutive free blocks"
        );

        let snapshot = grid.snapshot()?;
        let run = self
            .find_run(&snapshot, blocks_needed, scope, today)
            .ok_or(AllocationError::NotFound { blocks_needed })?;

        let id = BookingId::generate(&request.requester.contact, origin);
        if let Err(source) = grid.assign(run.first_row, run.len, &id, request) {
            warn!(booking_id = %id, first_row = run.first_row, %source, "booking assignment failed");
            return Err(AllocationError::Unpersisted { id, source });
        }

        info!(
            booking_id = %id,
            first_row = run.first_row,
            blocks = run.len,
            date = %run.date,
            "booking assigned"
        );

        Ok(Booking {
            id,
            date: run.date,
            start: run.start,
            end: run.end,
            rows: (run.first_row..run.first_row + run.len).collect(),
            request: request.clone(),
        })
    }

    fn can_start_run(&self, block: &Block, scope: SearchScope, today: NaiveDate) -> bool {
        let (Some(date), Some(slot)) = (block.date, block.slot) else {
            return false;
        };
        if block.activity.is_none() {
            return false;
        }
        let in_scope = match scope.date {
            Some(filter) => date == filter,
            None => date >= today,
        };
        in_scope && block.is_empty_block() && self.policy.admits(slot.start)
    }

    /// Counts consecutive usable rows from `first`, stopping at `needed`.
    fn extend_run(&self, blocks: &[Block], first: usize, needed: usize) -> usize {
        let run_date = blocks[first].date;
        let mut previous_end: Option<NaiveDateTime> = None;
        let mut count = 0;

        for block in blocks.iter().skip(first).take(needed) {
            let Some(slot) = block.slot.filter(|_| block.is_schedulable()) else {
                break;
            };
            if block.date != run_date || !block.is_empty_block() || !self.policy.admits(slot.start)
            {
                break;
            }
            if previous_end.is_some_and(|end| end != slot.start) {
                break;
            }
            previous_end = Some(slot.end);
            count += 1;
        }

        count
    }
}
