//! Flagpost Logging
//!
//! Lightweight logging used by every Flagpost crate. Lines go to stderr.
//! The initial setup comes from `FLAGPOST_*` environment variables; the
//! `log` section of a loaded configuration can then override it through
//! [`configure`].
//!
//! # Usage
//!
//! ```rust
//! use flagpost_log::{debug, info, warn};
//!
//! debug!("loading viewer state");
//! info!("flag {} published", "new-checkout");
//! warn!(target: "flagpost::store", "store read timed out after {}ms", 250);
//! ```
//!
//! # Environment Variables
//!
//! - `FLAGPOST_DEBUG=1` - Shorthand for `FLAGPOST_LOG_LEVEL=debug`
//! - `FLAGPOST_LOG_LEVEL=trace|debug|info|warn|error|off` - Set log level
//! - `FLAGPOST_LOG_FORMAT=pretty|json|compact` - Set output format
//! - `FLAGPOST_LOG_COLOR=1|0` - Enable/disable colors (pretty format only)
//! - `FLAGPOST_LOG_TIMESTAMPS=1|0` - Include timestamps

use once_cell::sync::Lazy;
use std::env;
use std::io::{IsTerminal, Write};
use std::sync::RwLock;
use std::sync::atomic::{AtomicU8, Ordering};

// ============================================================================
// Levels and formats
// ============================================================================

/// Log level, ordered from most to least verbose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Level {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
    /// Nothing is written.
    Off = 5,
}

const LEVELS: [Level; 6] = [
    Level::Trace,
    Level::Debug,
    Level::Info,
    Level::Warn,
    Level::Error,
    Level::Off,
];

impl Level {
    /// Parse a level name, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "warning" => Some(Level::Warn),
            "none" => Some(Level::Off),
            name => LEVELS
                .into_iter()
                .find(|level| level.as_str().eq_ignore_ascii_case(name)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "TRACE",
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
            Level::Off => "OFF",
        }
    }

    #[cfg(feature = "color")]
    fn painted(&self) -> colored::ColoredString {
        use colored::Colorize;
        match self {
            Level::Trace => self.as_str().magenta(),
            Level::Debug => self.as_str().blue(),
            Level::Info => self.as_str().green(),
            Level::Warn => self.as_str().yellow(),
            Level::Error => self.as_str().red().bold(),
            Level::Off => self.as_str().normal(),
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<log::Level> for Level {
    fn from(level: log::Level) -> Self {
        match level {
            log::Level::Trace => Level::Trace,
            log::Level::Debug => Level::Debug,
            log::Level::Info => Level::Info,
            log::Level::Warn => Level::Warn,
            log::Level::Error => Level::Error,
        }
    }
}

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Human readable, optionally colored
    Pretty,
    /// Single short line per record
    Compact,
    /// One JSON object per line
    Json,
}

impl Format {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Some(Format::Pretty),
            "compact" => Some(Format::Compact),
            "json" => Some(Format::Json),
            _ => None,
        }
    }
}

// ============================================================================
// Configuration
// ============================================================================

// Mirrors `CONFIG.level` so the macros can filter without taking the lock.
static MAX_LEVEL: AtomicU8 = AtomicU8::new(Level::Info as u8);

static CONFIG: Lazy<RwLock<LogConfig>> = Lazy::new(|| {
    let config = LogConfig::from_env();
    MAX_LEVEL.store(config.level as u8, Ordering::Relaxed);
    RwLock::new(config)
});

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: Level,
    pub format: Format,
    pub color: bool,
    pub timestamps: bool,
    /// Print the record target next to the level
    pub target: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::Info,
            format: Format::Json,
            color: false,
            timestamps: true,
            target: true,
        }
    }
}

fn env_flag(name: &str) -> Option<bool> {
    env::var(name)
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

impl LogConfig {
    /// Build a configuration from `FLAGPOST_*` environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let level = env::var("FLAGPOST_LOG_LEVEL")
            .ok()
            .and_then(|s| Level::parse(&s))
            .or_else(|| env_flag("FLAGPOST_DEBUG").filter(|on| *on).map(|_| Level::Debug))
            .unwrap_or(defaults.level);

        let format = env::var("FLAGPOST_LOG_FORMAT")
            .ok()
            .and_then(|s| Format::parse(&s))
            .unwrap_or(defaults.format);

        let color = env_flag("FLAGPOST_LOG_COLOR")
            .unwrap_or_else(|| env::var("NO_COLOR").is_err() && std::io::stderr().is_terminal());

        Self {
            level,
            format,
            color,
            timestamps: env_flag("FLAGPOST_LOG_TIMESTAMPS").unwrap_or(defaults.timestamps),
            target: defaults.target,
        }
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn with_format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }

    /// Apply textual overrides, as found in a configuration file. Names that
    /// do not parse leave the current value in place.
    pub fn with_overrides(mut self, level: Option<&str>, format: Option<&str>) -> Self {
        if let Some(level) = level.and_then(Level::parse) {
            self.level = level;
        }
        if let Some(format) = format.and_then(Format::parse) {
            self.format = format;
        }
        self
    }
}

/// Replace the active configuration.
pub fn configure(config: LogConfig) {
    let level = config.level;
    if let Ok(mut current) = CONFIG.write() {
        *current = config;
    }
    MAX_LEVEL.store(level as u8, Ordering::Relaxed);
}

/// Snapshot of the active configuration.
pub fn config() -> LogConfig {
    CONFIG.read().map(|c| c.clone()).unwrap_or_default()
}

/// Set log level at runtime.
pub fn set_level(level: Level) {
    configure(config().with_level(level));
}

pub fn current_level() -> Level {
    Lazy::force(&CONFIG);
    LEVELS[MAX_LEVEL.load(Ordering::Relaxed).min(Level::Off as u8) as usize]
}

#[inline]
pub fn is_level_enabled(level: Level) -> bool {
    level != Level::Off && level >= current_level()
}

// ============================================================================
// Output
// ============================================================================

#[doc(hidden)]
pub fn log(level: Level, target: &str, message: &str) {
    if !is_level_enabled(level) {
        return;
    }

    let line = render(level, target, message, &config());
    let mut stderr = std::io::stderr().lock();
    let _ = writeln!(stderr, "{}", line);
}

fn render(level: Level, target: &str, message: &str, config: &LogConfig) -> String {
    if config.format == Format::Json {
        return render_json(level, target, message);
    }

    let compact = config.format == Format::Compact;
    let mut line = String::new();

    if config.timestamps {
        let pattern = if compact { "%H:%M:%S " } else { "%Y-%m-%d %H:%M:%S%.3f " };
        line.push_str(&chrono::Local::now().format(pattern).to_string());
    }

    if compact {
        line.push_str(&level.as_str()[..1]);
    } else {
        line.push_str(&level_label(level, config.color));
    }
    line.push(' ');

    if config.target && !target.is_empty() {
        if compact {
            line.push_str(target);
            line.push_str(": ");
        } else {
            line.push_str(&format!("[{}] ", target));
        }
    }

    line.push_str(message);
    line
}

#[cfg(feature = "color")]
fn level_label(level: Level, color: bool) -> String {
    if color {
        format!("{:5}", level.painted())
    } else {
        format!("{:5}", level.as_str())
    }
}

#[cfg(not(feature = "color"))]
fn level_label(level: Level, _color: bool) -> String {
    format!("{:5}", level.as_str())
}

#[cfg(feature = "json")]
fn render_json(level: Level, target: &str, message: &str) -> String {
    serde_json::json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "level": level.as_str(),
        "target": target,
        "message": message,
    })
    .to_string()
}

#[cfg(not(feature = "json"))]
fn render_json(level: Level, target: &str, message: &str) -> String {
    format!(
        r#"{{"timestamp":"{}","level":"{}","target":{:?},"message":{:?}}}"#,
        chrono::Utc::now().to_rfc3339(),
        level.as_str(),
        target,
        message
    )
}

// ============================================================================
// `log` crate bridge
// ============================================================================

struct Bridge;

impl log::Log for Bridge {
    fn enabled(&self, metadata: &log::Metadata<'_>) -> bool {
        is_level_enabled(metadata.level().into())
    }

    fn log(&self, record: &log::Record<'_>) {
        if self.enabled(record.metadata()) {
            log(record.level().into(), record.target(), &record.args().to_string());
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

static BRIDGE: Bridge = Bridge;

/// Route records emitted through the `log` facade (for example by the redis
/// client) into Flagpost output.
///
/// Returns `false` if another logger was already installed.
pub fn install_log_bridge() -> bool {
    if log::set_logger(&BRIDGE).is_err() {
        return false;
    }
    log::set_max_level(log::LevelFilter::Trace);
    true
}

// ============================================================================
// Macros
// ============================================================================

#[doc(hidden)]
#[macro_export]
macro_rules! __emit {
    ($level:expr, target: $target:expr, $($arg:tt)+) => {
        if $crate::is_level_enabled($level) {
            $crate::log($level, $target, &format!($($arg)+));
        }
    };
    ($level:expr, $($arg:tt)+) => {
        $crate::__emit!($level, target: module_path!(), $($arg)+)
    };
}

/// Log a trace message.
#[macro_export]
macro_rules! trace {
    ($($arg:tt)+) => { $crate::__emit!($crate::Level::Trace, $($arg)+) };
}

/// Log a debug message.
#[macro_export]
macro_rules! debug {
    ($($arg:tt)+) => { $crate::__emit!($crate::Level::Debug, $($arg)+) };
}

/// Log an info message.
#[macro_export]
macro_rules! info {
    ($($arg:tt)+) => { $crate::__emit!($crate::Level::Info, $($arg)+) };
}

/// Log a warning message.
#[macro_export]
macro_rules! warn {
    ($($arg:tt)+) => { $crate::__emit!($crate::Level::Warn, $($arg)+) };
}

/// Log an error message.
#[macro_export]
macro_rules! error {
    ($($arg:tt)+) => { $crate::__emit!($crate::Level::Error, $($arg)+) };
}

// ============================================================================
// Tracing Integration
// ============================================================================

#[cfg(feature = "tracing")]
pub mod tracing_compat {
    //! A `tracing` subscriber that honors the Flagpost log level, for
    //! applications that already collect spans.

    use super::config;

    pub fn subscriber() -> impl tracing::Subscriber {
        use tracing_subscriber::prelude::*;
        use tracing_subscriber::{EnvFilter, fmt};

        let config = config();
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.level.as_str().to_ascii_lowercase()));

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_ansi(config.color))
    }
}
