//! Edge configuration.
//!
//! Read from `KIOSK_*` environment variables (or a `.env` file) by [`EdgeConfig::from_env_or_default`]. Bad values are
//! logged and replaced with defaults: the edge must keep taking cash even with a half-broken config.
use std::{env, fmt::Display, path::PathBuf, str::FromStr, time::Duration};

use kiosk_common::{
    helpers::{env_millis, env_parse, env_secs, parse_boolean_flag},
    Secret,
};
use log::*;
use url::Url;

use crate::errors::EdgeError;

const DEFAULT_CLOUD_URL: &str = "http://127.0.0.1:8360/";
const DEFAULT_SERIAL_PORT: &str = "/dev/ttyUSB0";
const DEFAULT_BAUD_RATE: u32 = 9600;
const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);
const DEFAULT_SERIAL_SETTLE: Duration = Duration::from_millis(2000);
const DEFAULT_SILENCE_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);
const DEFAULT_SESSION_POLL: Duration = Duration::from_secs(5);
const DEFAULT_PRINT_POLL: Duration = Duration::from_secs(2);
const DEFAULT_PRINTER_BAUD: u32 = 9600;
const DEFAULT_PRINTER_FILE: &str = "receipts.txt";
const DEFAULT_PRINT_LINE_DELAY: Duration = Duration::from_millis(300);
const DEFAULT_RESTART_DELAY: Duration = Duration::from_secs(5);

/// Where the pulse decoder is attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcceptorPort {
    Device(String),
    /// An in-process simulated acceptor. Selected with `KIOSK_SERIAL_PORT=virtual`.
    Virtual,
}

impl AcceptorPort {
    pub fn parse(s: &str) -> Self {
        match s.trim() {
            v if v.eq_ignore_ascii_case("virtual") => Self::Virtual,
            v => Self::Device(v.to_string()),
        }
    }
}

impl Display for AcceptorPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Device(path) => f.write_str(path),
            Self::Virtual => f.write_str("virtual acceptor"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrinterKind {
    /// Append receipts to a text file.
    File,
    /// A thermal printer on its own serial port.
    Serial,
    /// The printer wired to the acceptor's microcontroller, driven with `PRINT:*` commands.
    Bridge,
}

impl FromStr for PrinterKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(Self::File),
            "serial" => Ok(Self::Serial),
            "bridge" | "arduino" => Ok(Self::Bridge),
            other => Err(format!("'{other}' is not a printer type. Use file, serial or bridge.")),
        }
    }
}

impl Display for PrinterKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File => f.write_str("file"),
            Self::Serial => f.write_str("serial"),
            Self::Bridge => f.write_str("bridge"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EdgeConfig {
    pub cloud_url: Url,
    pub api_key: Option<Secret<String>>,
    pub serial_port: AcceptorPort,
    pub baud_rate: u32,
    pub reconnect_delay: Duration,
    /// The acceptor resets when the port opens. Nothing is sent to it before this much time has passed.
    pub serial_settle: Duration,
    /// Silence on the link for this long triggers a warning and a `PING`.
    pub silence_timeout: Duration,
    pub http_timeout: Duration,
    pub retry_attempts: u32,
    pub retry_delay: Duration,
    pub session_poll_interval: Duration,
    pub print_poll_interval: Duration,
    pub printer: PrinterKind,
    pub printer_port: String,
    pub printer_baud: u32,
    pub printer_file: PathBuf,
    pub print_line_delay: Duration,
    pub enable_cash_reader: bool,
    pub enable_printer: bool,
    pub restart_delay: Duration,
}

impl EdgeConfig {
    /// The field defaults for everything but the cloud's address.
    pub fn new(cloud_url: Url) -> Self {
        Self {
            cloud_url,
            api_key: None,
            serial_port: AcceptorPort::Device(DEFAULT_SERIAL_PORT.to_string()),
            baud_rate: DEFAULT_BAUD_RATE,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            serial_settle: DEFAULT_SERIAL_SETTLE,
            silence_timeout: DEFAULT_SILENCE_TIMEOUT,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
            session_poll_interval: DEFAULT_SESSION_POLL,
            print_poll_interval: DEFAULT_PRINT_POLL,
            printer: PrinterKind::Bridge,
            printer_port: DEFAULT_SERIAL_PORT.to_string(),
            printer_baud: DEFAULT_PRINTER_BAUD,
            printer_file: PathBuf::from(DEFAULT_PRINTER_FILE),
            print_line_delay: DEFAULT_PRINT_LINE_DELAY,
            enable_cash_reader: true,
            enable_printer: true,
            restart_delay: DEFAULT_RESTART_DELAY,
        }
    }

    pub fn from_env_or_default() -> Result<Self, EdgeError> {
        let cloud_url = match env::var("KIOSK_CLOUD_URL") {
            Ok(s) => match Url::parse(s.trim()) {
                Ok(url) => url,
                Err(e) => {
                    error!("🪛️ {s} is not a valid URL for KIOSK_CLOUD_URL. {e} Using the default, {DEFAULT_CLOUD_URL}.");
                    default_cloud_url()?
                },
            },
            Err(_) => {
                warn!("🪛️ KIOSK_CLOUD_URL is not set. Using the default, {DEFAULT_CLOUD_URL}.");
                default_cloud_url()?
            },
        };
        let defaults = Self::new(cloud_url);
        let api_key = match env::var("KIOSK_API_KEY") {
            Ok(key) if !key.trim().is_empty() => Some(Secret::new(key.trim().to_string())),
            _ => {
                warn!("🪛️ KIOSK_API_KEY is not set. Requests to the cloud will not be authenticated.");
                None
            },
        };
        let serial_port = env::var("KIOSK_SERIAL_PORT").map(|s| AcceptorPort::parse(&s)).unwrap_or(defaults.serial_port);
        let printer = value_or("KIOSK_PRINTER", env_parse::<PrinterKind>("KIOSK_PRINTER"), defaults.printer);
        Ok(Self {
            cloud_url: defaults.cloud_url,
            api_key,
            serial_port,
            baud_rate: value_or("KIOSK_BAUD_RATE", env_parse("KIOSK_BAUD_RATE"), defaults.baud_rate),
            reconnect_delay: secs_or("KIOSK_RECONNECT_DELAY_SECS", defaults.reconnect_delay),
            serial_settle: millis_or("KIOSK_SERIAL_SETTLE_MS", defaults.serial_settle),
            silence_timeout: secs_or("KIOSK_SILENCE_TIMEOUT_SECS", defaults.silence_timeout),
            http_timeout: secs_or("KIOSK_HTTP_TIMEOUT_SECS", defaults.http_timeout),
            retry_attempts: value_or("KIOSK_RETRY_ATTEMPTS", env_parse("KIOSK_RETRY_ATTEMPTS"), defaults.retry_attempts)
                .max(1),
            retry_delay: secs_or("KIOSK_RETRY_DELAY_SECS", defaults.retry_delay),
            session_poll_interval: secs_or("KIOSK_SESSION_POLL_SECS", defaults.session_poll_interval),
            print_poll_interval: secs_or("KIOSK_PRINT_POLL_SECS", defaults.print_poll_interval),
            printer,
            printer_port: env::var("KIOSK_PRINTER_PORT").unwrap_or(defaults.printer_port),
            printer_baud: value_or("KIOSK_PRINTER_BAUD", env_parse("KIOSK_PRINTER_BAUD"), defaults.printer_baud),
            printer_file: env::var("KIOSK_PRINTER_FILE").map(PathBuf::from).unwrap_or(defaults.printer_file),
            print_line_delay: millis_or("KIOSK_PRINT_LINE_DELAY_MS", defaults.print_line_delay),
            enable_cash_reader: parse_boolean_flag(env::var("KIOSK_ENABLE_CASH_READER").ok(), true),
            enable_printer: parse_boolean_flag(env::var("KIOSK_ENABLE_PRINTER").ok(), true),
            restart_delay: secs_or("KIOSK_RESTART_DELAY_SECS", defaults.restart_delay),
        })
    }

    /// Logs the effective configuration, without secrets.
    pub fn log_summary(&self) {
        info!("🪛️ Cloud: {} (API key {})", self.cloud_url, if self.api_key.is_some() { "set" } else { "NOT set" });
        if self.enable_cash_reader {
            info!(
                "🪛️ Cash reader: {} at {} baud. Polling sessions every {}s",
                self.serial_port,
                self.baud_rate,
                self.session_poll_interval.as_secs()
            );
        } else {
            info!("🪛️ Cash reader: disabled");
        }
        if self.enable_printer {
            let target = match self.printer {
                PrinterKind::File => self.printer_file.display().to_string(),
                PrinterKind::Serial => format!("{} at {} baud", self.printer_port, self.printer_baud),
                PrinterKind::Bridge => format!("via {}", self.serial_port),
            };
            info!(
                "🪛️ Printer: {} ({target}). Polling print jobs every {}s",
                self.printer,
                self.print_poll_interval.as_secs()
            );
        } else {
            info!("🪛️ Printer: disabled");
        }
    }
}

/// `http://127.0.0.1:8360/`, where a cloud on the same machine listens.
pub fn default_cloud_url() -> Result<Url, EdgeError> {
    Url::parse(DEFAULT_CLOUD_URL)
        .map_err(|e| EdgeError::Configuration(format!("The default cloud URL {DEFAULT_CLOUD_URL} is invalid. {e}")))
}

fn value_or<T: Display, E: Display>(name: &str, value: Result<Option<T>, (String, E)>, default: T) -> T {
    match value {
        Ok(Some(v)) => v,
        Ok(None) => default,
        Err((raw, e)) => {
            error!("🪛️ {raw} is not a valid value for {name}. {e} Using the default, {default}, instead.");
            default
        },
    }
}

fn secs_or(name: &str, default: Duration) -> Duration {
    match env_secs(name) {
        Ok(Some(v)) => v,
        Ok(None) => default,
        Err((raw, e)) => {
            error!("🪛️ {raw} is not a valid number of seconds for {name}. {e} Using {}s.", default.as_secs());
            default
        },
    }
}

fn millis_or(name: &str, default: Duration) -> Duration {
    match env_millis(name) {
        Ok(Some(v)) => v,
        Ok(None) => default,
        Err((raw, e)) => {
            error!("🪛️ {raw} is not a valid number of milliseconds for {name}. {e} Using {}ms.", default.as_millis());
            default
        },
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn acceptor_ports() {
        assert_eq!(AcceptorPort::parse("virtual"), AcceptorPort::Virtual);
        assert_eq!(AcceptorPort::parse(" VIRTUAL "), AcceptorPort::Virtual);
        assert_eq!(AcceptorPort::parse("/dev/ttyACM0"), AcceptorPort::Device("/dev/ttyACM0".into()));
    }

    #[test]
    fn printer_kinds() {
        assert_eq!("File".parse::<PrinterKind>(), Ok(PrinterKind::File));
        assert_eq!("arduino".parse::<PrinterKind>(), Ok(PrinterKind::Bridge));
        assert!("laser".parse::<PrinterKind>().is_err());
    }

    #[test]
    fn bad_values_fall_back() {
        let _ = env_logger::try_init();
        env::set_var("KIOSK_TEST_EDGE_SECS", "soon");
        assert_eq!(secs_or("KIOSK_TEST_EDGE_SECS", Duration::from_secs(7)), Duration::from_secs(7));
        env::set_var("KIOSK_TEST_EDGE_SECS", "12");
        assert_eq!(secs_or("KIOSK_TEST_EDGE_SECS", Duration::from_secs(7)), Duration::from_secs(12));
        env::remove_var("KIOSK_TEST_EDGE_SECS");
    }

    #[test]
    fn a_bad_cloud_url_falls_back_to_the_default() {
        let _ = env_logger::try_init();
        env::set_var("KIOSK_CLOUD_URL", "not a url");
        let config = EdgeConfig::from_env_or_default().unwrap();
        env::remove_var("KIOSK_CLOUD_URL");
        assert_eq!(config.cloud_url, default_cloud_url().unwrap());
    }

    #[test]
    fn defaults_match_the_field_hardware() {
        let config = EdgeConfig::new(default_cloud_url().unwrap());
        assert_eq!(config.baud_rate, 9600);
        assert_eq!(config.retry_attempts, 3);
        assert_eq!(config.session_poll_interval, Duration::from_secs(5));
        assert_eq!(config.print_poll_interval, Duration::from_secs(2));
        assert_eq!(config.cloud_url.as_str(), "http://127.0.0.1:8360/");
    }
}
