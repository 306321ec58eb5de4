//! Slot allocation over a date/time block schedule, displacement recovery,
//! and the per-booking notification ledger.

pub mod allocator;
pub mod csv_store;
pub mod domain;
pub mod grid;
pub mod ledger;
pub mod notices;
pub mod populate;
pub mod reconcile;
pub mod router;
pub mod service;
pub mod slot;
pub mod window;

#[cfg(test)]
mod tests;

pub use allocator::{AllocationError, Allocator, Run, SearchScope};
pub use csv_store::CsvSheet;
pub use domain::{
    Activity, Booking, BookingId, BookingRequest, IdOrigin, LedgerFlag, Requester, EMPTY_ACTIVITY,
};
pub use grid::{
    Block, BookingIndex, Column, GridSnapshot, MemorySheet, ScheduleGrid, ScheduleStore,
    SheetRow, StoreError,
};
pub use ledger::{LedgerField, NotificationLedger};
pub use notices::{LogNotifier, Notice, NoticeComposer, Notifier, NotifyError, OutboxNotifier};
pub use populate::empty_rows;
pub use reconcile::{
    detect_displaced, DisplacedBooking, DisplacementOutcome, ReconciliationReport, Reconciler,
};
pub use router::{booking_router, ReconcileRequest};
pub use service::{
    parse_minutes, BookingService, BookingSubmission, BookingView, ServiceError,
    SubmissionOutcome, ValidationError,
};
pub use slot::{format_slot, parse_slot, SlotParseError, SlotTime};
pub use window::{ClockWindow, TimeWindowPolicy, WeekdayClass};
