use crate::infra::{parse_date, scheduler_service};
use assembly_scheduler::config::AppConfig;
use assembly_scheduler::error::AppError;
use assembly_scheduler::telemetry;
use assembly_scheduler::workflows::schedule::{
    parse_minutes, BookingSubmission, BookingView, SubmissionOutcome,
};
use chrono::{Local, NaiveDate};
use clap::Args;
use serde::Serialize;
use serde_json::json;

#[derive(Args, Debug, Default)]
pub(crate) struct SubmitArgs {
    /// Requester contact address (required)
    #[arg(long)]
    pub(crate) contact: Option<String>,
    #[arg(long, default_value = "")]
    pub(crate) name: String,
    /// Class or group the requester belongs to
    #[arg(long, default_value = "")]
    pub(crate) group: String,
    #[arg(long, default_value = "")]
    pub(crate) phone: String,
    /// What the slot will be used for
    #[arg(long, default_value = "")]
    pub(crate) subject: String,
    /// Link or note for supporting material
    #[arg(long, default_value = "")]
    pub(crate) attachment: String,
    /// Requested length, e.g. "10" or "10 minutes". Defaults to one block.
    #[arg(long)]
    pub(crate) duration: Option<String>,
    /// Booking date floor (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = parse_date)]
    pub(crate) today: Option<NaiveDate>,
}

#[derive(Args, Debug, Default)]
pub(crate) struct ReconcileArgs {
    /// Reference date for the cycle (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = parse_date)]
    pub(crate) today: Option<NaiveDate>,
}

#[derive(Args, Debug)]
pub(crate) struct PopulateArgs {
    /// First date to add (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date)]
    pub(crate) from: NaiveDate,
    /// Last date to add, inclusive (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date)]
    pub(crate) to: NaiveDate,
}

impl SubmitArgs {
    fn into_submission(self) -> BookingSubmission {
        BookingSubmission {
            contact: self.contact,
            name: self.name,
            group: self.group,
            phone: self.phone,
            subject: self.subject,
            attachment: self.attachment,
            duration_minutes: self.duration.as_deref().and_then(parse_minutes),
            submitted_at: None,
        }
    }
}

fn load_config() -> Result<AppConfig, AppError> {
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;
    Ok(config)
}

fn today_or_local(today: Option<NaiveDate>) -> NaiveDate {
    today.unwrap_or_else(|| Local::now().date_naive())
}

fn print_json<T: Serialize>(value: &T) -> Result<(), AppError> {
    let rendered = serde_json::to_string_pretty(value).map_err(std::io::Error::from)?;
    println!("{rendered}");
    Ok(())
}

pub(crate) fn run_submit(args: SubmitArgs) -> Result<(), AppError> {
    let config = load_config()?;
    let service = scheduler_service(&config.schedule)?;
    let today = today_or_local(args.today);

    let payload = match service.submit(args.into_submission(), today)? {
        SubmissionOutcome::Scheduled {
            booking,
            confirmation,
        } => json!({
            "status": "scheduled",
            "booking": BookingView::from(&booking),
            "confirmation": confirmation,
        }),
        SubmissionOutcome::Unscheduled {
            blocks_needed,
            notified,
        } => json!({
            "status": "unscheduled",
            "blocks_needed": blocks_needed,
            "notified": notified,
        }),
    };
    print_json(&payload)
}

pub(crate) fn run_reconcile(args: ReconcileArgs) -> Result<(), AppError> {
    let config = load_config()?;
    let service = scheduler_service(&config.schedule)?;
    let today = today_or_local(args.today);

    let report = service.reconcile(today)?;
    println!(
        "Reconciled {} displaced booking(s) on {today}: {} rebooked, {} cancelled, {} operator-only; {} reminder(s) sent",
        report.displaced.len(),
        report.rebooked(),
        report.cancelled(),
        report.operator_only(),
        report.reminders_sent,
    );
    print_json(&report)
}

pub(crate) fn run_populate(args: PopulateArgs) -> Result<(), AppError> {
    let config = load_config()?;
    let service = scheduler_service(&config.schedule)?;

    let added = service.populate(args.from, args.to)?;
    println!(
        "Added {added} empty block(s) for {} to {} in {}",
        args.from,
        args.to,
        config.schedule.grid_path.display()
    );
    Ok(())
}
