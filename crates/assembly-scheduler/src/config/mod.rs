use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use crate::workflows::schedule::slot::SlotParseError;
use crate::workflows::schedule::window::{ClockWindow, TimeWindowPolicy};

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub schedule: ScheduleConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            schedule: ScheduleConfig::from_env()?,
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Booking rules and collaborator locations for the schedule engine.
///
/// Every engine component receives this value (or the pieces it needs) at
/// construction; nothing reads the environment after startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleConfig {
    /// Length of one schedule block in minutes.
    pub quantum_minutes: u32,
    pub monday_window: ClockWindow,
    pub weekday_window: ClockWindow,
    /// Minutes before the window opens that a requester should report.
    pub report_lead_minutes: u32,
    pub admin_contact: String,
    /// Activity cell text that marks a block as booked.
    pub booking_label: String,
    pub grid_path: PathBuf,
    pub outbox_path: Option<PathBuf>,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            quantum_minutes: 5,
            monday_window: ClockWindow::from_minutes(9 * 60 + 5, 9 * 60 + 40),
            weekday_window: ClockWindow::from_minutes(8 * 60 + 5, 8 * 60 + 20),
            report_lead_minutes: 20,
            admin_contact: "operator@localhost".to_string(),
            booking_label: "Booking".to_string(),
            grid_path: PathBuf::from("schedule.csv"),
            outbox_path: None,
        }
    }
}

impl ScheduleConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let quantum_minutes = match env::var("SCHEDULE_QUANTUM_MINUTES") {
            Ok(raw) => raw
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|minutes| *minutes > 0)
                .ok_or(ConfigError::InvalidQuantum)?,
            Err(_) => defaults.quantum_minutes,
        };

        let monday_window = window_from_env("SCHEDULE_MONDAY_WINDOW", defaults.monday_window)?;
        let weekday_window = window_from_env("SCHEDULE_WEEKDAY_WINDOW", defaults.weekday_window)?;

        let report_lead_minutes = match env::var("SCHEDULE_REPORT_LEAD_MINUTES") {
            Ok(raw) => raw
                .trim()
                .parse::<u32>()
                .map_err(|_| ConfigError::InvalidLeadMinutes)?,
            Err(_) => defaults.report_lead_minutes,
        };

        let admin_contact = env::var("SCHEDULE_ADMIN_EMAIL")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or(defaults.admin_contact);
        let booking_label = env::var("SCHEDULE_BOOKING_LABEL")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or(defaults.booking_label);
        let grid_path = env::var("SCHEDULE_GRID_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.grid_path);
        let outbox_path = env::var("SCHEDULE_OUTBOX_PATH")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from);

        Ok(Self {
            quantum_minutes,
            monday_window,
            weekday_window,
            report_lead_minutes,
            admin_contact,
            booking_label,
            grid_path,
            outbox_path,
        })
    }

    pub fn policy(&self) -> TimeWindowPolicy {
        TimeWindowPolicy::new(self.monday_window, self.weekday_window)
    }
}

fn window_from_env(key: &'static str, default: ClockWindow) -> Result<ClockWindow, ConfigError> {
    match env::var(key) {
        Ok(raw) => ClockWindow::parse(&raw).map_err(|source| ConfigError::InvalidWindow { key, source }),
        Err(_) => Ok(default),
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost {
        source: std::net::AddrParseError,
    },
    InvalidQuantum,
    InvalidLeadMinutes,
    InvalidWindow {
        key: &'static str,
        source: SlotParseError,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidQuantum => {
                write!(f, "SCHEDULE_QUANTUM_MINUTES must be a positive number of minutes")
            }
            ConfigError::InvalidLeadMinutes => {
                write!(f, "SCHEDULE_REPORT_LEAD_MINUTES must be a number of minutes")
            }
            ConfigError::InvalidWindow { key, .. } => {
                write!(f, "{key} must be a same-day HHMM-HHMM range")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidWindow { source, .. } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidQuantum
            | ConfigError::InvalidLeadMinutes => None,
        }
    }
}
