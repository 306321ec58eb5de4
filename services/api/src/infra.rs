use assembly_scheduler::config::ScheduleConfig;
use assembly_scheduler::workflows::schedule::{
    BookingService, CsvSheet, LogNotifier, Notice, Notifier, NotifyError, OutboxNotifier,
    StoreError,
};
use chrono::NaiveDate;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Notifier chosen from configuration: an outbox file when one is set,
/// otherwise the log.
#[derive(Debug)]
pub(crate) enum ConfiguredNotifier {
    Log(LogNotifier),
    Outbox(OutboxNotifier),
}

impl ConfiguredNotifier {
    pub(crate) fn from_config(config: &ScheduleConfig) -> Self {
        match &config.outbox_path {
            Some(path) => {
                info!(path = %path.display(), "notifications written to outbox");
                Self::Outbox(OutboxNotifier::new(path.clone()))
            }
            None => Self::Log(LogNotifier),
        }
    }
}

impl Notifier for ConfiguredNotifier {
    fn send(&self, notice: &Notice) -> Result<(), NotifyError> {
        match self {
            Self::Log(notifier) => notifier.send(notice),
            Self::Outbox(notifier) => notifier.send(notice),
        }
    }
}

pub(crate) type SchedulerService = BookingService<CsvSheet, ConfiguredNotifier>;

/// Opens the configured schedule file and notifier.
pub(crate) fn scheduler_service(config: &ScheduleConfig) -> Result<SchedulerService, StoreError> {
    let store = CsvSheet::open(&config.grid_path)?;
    info!(path = %store.path().display(), "schedule opened");
    let notifier = Arc::new(ConfiguredNotifier::from_config(config));
    Ok(BookingService::new(store, notifier, config.clone()))
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_date_accepts_iso_dates_only() {
        assert_eq!(
            parse_date(" 2026-03-02 "),
            Ok(NaiveDate::from_ymd_opt(2026, 3, 2).expect("valid date"))
        );
        assert!(parse_date("02/03/2026").is_err());
    }

    #[test]
    fn outbox_is_used_when_configured() {
        let config = ScheduleConfig {
            outbox_path: Some(std::env::temp_dir().join("assembly-api-outbox.jsonl")),
            ..ScheduleConfig::default()
        };
        assert!(matches!(
            ConfiguredNotifier::from_config(&config),
            ConfiguredNotifier::Outbox(_)
        ));
        assert!(matches!(
            ConfiguredNotifier::from_config(&ScheduleConfig::default()),
            ConfiguredNotifier::Log(_)
        ));
    }
}
