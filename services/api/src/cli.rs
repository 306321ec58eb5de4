use crate::commands::{run_populate, run_reconcile, run_submit, PopulateArgs, ReconcileArgs, SubmitArgs};
use crate::server;
use assembly_scheduler::error::AppError;
use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "Assembly Scheduler",
    about = "Book, reconcile, and maintain the assembly block schedule",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Book the earliest free run for a single request
    Submit(SubmitArgs),
    /// Recover displaced bookings and send tomorrow's reminders
    Reconcile(ReconcileArgs),
    /// Append empty blocks for every weekday in a date range
    Populate(PopulateArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Submit(args) => run_submit(args),
        Command::Reconcile(args) => run_reconcile(args),
        Command::Populate(args) => run_populate(args),
    }
}
