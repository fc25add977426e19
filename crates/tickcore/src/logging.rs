//! Process-wide logging state.
//!
//! `init_logging` installs a `tracing` subscriber once; the level can be
//! changed afterwards through `set_log_level`. When `TICK_LOG_LEVEL` is set it
//! overrides any level requested in code.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::OnceLock;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, reload, Layer, Registry};

/// Environment variable that overrides programmatic log levels
pub const LOG_LEVEL_ENV: &str = "TICK_LOG_LEVEL";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Off,
}

impl LogLevel {
    fn to_filter(self) -> LevelFilter {
        match self {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Off => LevelFilter::OFF,
        }
    }

    fn to_u8(self) -> u8 {
        self as u8
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => LogLevel::Trace,
            1 => LogLevel::Debug,
            2 => LogLevel::Info,
            3 => LogLevel::Warn,
            4 => LogLevel::Error,
            _ => LogLevel::Off,
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" | "critical" => Ok(LogLevel::Error),
            "off" => Ok(LogLevel::Off),
            other => Err(format!("unknown log level '{}'", other)),
        }
    }
}

/// Output layout of the fmt layer, fixed at `init_logging`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Full,
    Compact,
    Pretty,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub format: LogFormat,
    pub with_target: bool,
    pub with_thread_ids: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Full,
            with_target: true,
            with_thread_ids: false,
        }
    }
}

type FilterHandle = reload::Handle<LevelFilter, Registry>;

static FILTER_HANDLE: OnceLock<FilterHandle> = OnceLock::new();
static CURRENT_LEVEL: AtomicU8 = AtomicU8::new(2);

/// Install the global subscriber. Returns `false` when a subscriber was
/// already installed, in which case only the level bookkeeping is updated.
pub fn init_logging(config: &LoggingConfig) -> bool {
    let level = env_level().unwrap_or(config.level);
    let (filter, handle) = reload::Layer::new(level.to_filter());

    let fmt_layer = match config.format {
        LogFormat::Full => fmt::layer()
            .with_target(config.with_target)
            .with_thread_ids(config.with_thread_ids)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_target(config.with_target)
            .with_thread_ids(config.with_thread_ids)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .pretty()
            .with_target(config.with_target)
            .with_thread_ids(config.with_thread_ids)
            .boxed(),
    };

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .is_ok();

    if installed {
        let _ = FILTER_HANDLE.set(handle);
    }
    CURRENT_LEVEL.store(level.to_u8(), Ordering::SeqCst);
    installed
}

/// Change the active level. `TICK_LOG_LEVEL` takes precedence when set.
pub fn set_log_level(level: LogLevel) {
    let effective = env_level().unwrap_or(level);
    CURRENT_LEVEL.store(effective.to_u8(), Ordering::SeqCst);

    if let Some(handle) = FILTER_HANDLE.get() {
        if let Err(e) = handle.modify(|filter| *filter = effective.to_filter()) {
            tracing::warn!("Failed to update log level: {}", e);
        }
    }
}

pub fn log_level() -> LogLevel {
    LogLevel::from_u8(CURRENT_LEVEL.load(Ordering::SeqCst))
}

fn env_level() -> Option<LogLevel> {
    let raw = std::env::var(LOG_LEVEL_ENV).ok()?;
    match raw.parse() {
        Ok(level) => Some(level),
        Err(e) => {
            tracing::warn!("Ignoring {}: {}", LOG_LEVEL_ENV, e);
            None
        }
    }
}
