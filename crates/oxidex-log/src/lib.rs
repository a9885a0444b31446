//! Leveled logging for the `OxideX` workspace.
//!
//! The logger is a process-wide singleton created on first use. Its level is
//! taken from the `OXIDEX_LOG` environment variable when present and can be
//! changed at any time afterwards. Records are written to stderr so that
//! library diagnostics never interleave with a host program's stdout.
//!
//! # Example
//!
//! ```
//! use oxidex_log::{debug, info, trace, Level};
//!
//! oxidex_log::set_level(Level::Debug);
//!
//! info!("registered {} types", 12);
//! debug!(target: "oxidex_meta::registry", "lookup for {:?}", "Base");
//! trace!("not shown at debug level");
//! ```

use std::fmt::Arguments;
use std::io::Write;
use std::str::FromStr;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU8, Ordering};

/// Environment variable consulted when the global logger is created.
pub const LEVEL_ENV: &str = "OXIDEX_LOG";

/// Severity of a log record, most severe first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Level {
    /// Failures the caller has to act on.
    Error = 0,
    /// Rejected or suspicious operations that were recovered from.
    Warn = 1,
    /// Coarse lifecycle events.
    Info = 2,
    /// Per-operation detail.
    Debug = 3,
    /// Everything, including validation rejections on hot paths.
    Trace = 4,
}

impl Level {
    /// Level used when none is configured or a stored value is out of range.
    pub const DEFAULT: Level = Level::Warn;

    const ALL: [Level; 5] = [
        Level::Error,
        Level::Warn,
        Level::Info,
        Level::Debug,
        Level::Trace,
    ];

    /// Upper-case label used in rendered records.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Level::Error => "ERROR",
            Level::Warn => "WARN",
            Level::Info => "INFO",
            Level::Debug => "DEBUG",
            Level::Trace => "TRACE",
        }
    }

    const fn ansi(self) -> &'static str {
        match self {
            Level::Error => "\x1b[1;31m",
            Level::Warn => "\x1b[33m",
            Level::Info => "\x1b[32m",
            Level::Debug => "\x1b[34m",
            Level::Trace => "\x1b[2m",
        }
    }

    fn from_u8(raw: u8) -> Level {
        Self::ALL
            .get(usize::from(raw))
            .copied()
            .unwrap_or(Level::DEFAULT)
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// Error returned when a level name cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseLevelError {
    input: String,
}

impl std::fmt::Display for ParseLevelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "unknown log level '{}' (expected error, warn, info, debug or trace)",
            self.input
        )
    }
}

impl std::error::Error for ParseLevelError {}

impl FromStr for Level {
    type Err = ParseLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Self::ALL
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(trimmed))
            .or_else(|| trimmed.eq_ignore_ascii_case("warning").then_some(Level::Warn))
            .ok_or_else(|| ParseLevelError {
                input: s.to_string(),
            })
    }
}

/// Process-wide log filter and sink settings.
pub struct Logger {
    level: AtomicU8,
    color: bool,
}

impl Logger {
    const fn new(level: Level, color: bool) -> Self {
        Logger {
            level: AtomicU8::new(level as u8),
            color,
        }
    }

    /// Builds a logger from `OXIDEX_LOG` and `NO_COLOR`.
    ///
    /// An unset or unparsable `OXIDEX_LOG` falls back to [`Level::DEFAULT`].
    fn from_env() -> Self {
        let level = std::env::var(LEVEL_ENV)
            .ok()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(Level::DEFAULT);
        let color = std::env::var_os("NO_COLOR").is_none();
        Logger::new(level, color)
    }

    /// Changes the most verbose level that is still emitted.
    pub fn set_level(&self, level: Level) {
        self.level.store(level as u8, Ordering::Release);
    }

    /// Current filter level.
    #[must_use]
    pub fn level(&self) -> Level {
        Level::from_u8(self.level.load(Ordering::Acquire))
    }

    /// Returns `true` when a record at `level` passes the filter.
    #[inline]
    #[must_use]
    pub fn enabled(&self, level: Level) -> bool {
        level as u8 <= self.level.load(Ordering::Relaxed)
    }

    fn render(&self, level: Level, target: &str, args: Arguments<'_>) -> String {
        if self.color {
            format!("{}{:<5}\x1b[0m {target}: {args}", level.ansi(), level)
        } else {
            format!("{level:<5} {target}: {args}")
        }
    }
}

static LOGGER: OnceLock<Logger> = OnceLock::new();

/// Returns the global logger, creating it from the environment on first use.
pub fn get_logger() -> &'static Logger {
    LOGGER.get_or_init(Logger::from_env)
}

/// Sets the level of the global logger.
pub fn set_level(level: Level) {
    get_logger().set_level(level);
}

/// Parses `s` and sets the level of the global logger.
///
/// # Errors
///
/// Returns [`ParseLevelError`] when `s` is not a level name; the current
/// level is left unchanged.
pub fn set_level_from_str(s: &str) -> Result<(), ParseLevelError> {
    set_level(s.parse()?);
    Ok(())
}

#[doc(hidden)]
pub fn __emit(level: Level, target: &str, args: Arguments<'_>) {
    let logger = get_logger();
    if !logger.enabled(level) {
        return;
    }
    let line = logger.render(level, target, args);
    // A closed stderr must not take the host program down with it.
    let _ = writeln!(std::io::stderr().lock(), "{line}");
}

/// Returns `true` when a record at the given level would be emitted.
#[macro_export]
macro_rules! log_enabled {
    ($level:expr) => {
        $crate::get_logger().enabled($level)
    };
}

/// Emits a record at an explicit level.
///
/// The target defaults to the calling module path.
#[macro_export]
macro_rules! log {
    (target: $target:expr, level: $level:expr, $($arg:tt)+) => {{
        let level = $level;
        if $crate::get_logger().enabled(level) {
            $crate::__emit(level, $target, format_args!($($arg)+));
        }
    }};
    (level: $level:expr, $($arg:tt)+) => {
        $crate::log!(target: module_path!(), level: $level, $($arg)+)
    };
}

/// Emits a record at [`Level::Error`].
#[macro_export]
macro_rules! error {
    (target: $target:expr, $($arg:tt)+) => {
        $crate::log!(target: $target, level: $crate::Level::Error, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::log!(level: $crate::Level::Error, $($arg)+)
    };
}

/// Emits a record at [`Level::Warn`].
#[macro_export]
macro_rules! warn {
    (target: $target:expr, $($arg:tt)+) => {
        $crate::log!(target: $target, level: $crate::Level::Warn, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::log!(level: $crate::Level::Warn, $($arg)+)
    };
}

/// Emits a record at [`Level::Info`].
#[macro_export]
macro_rules! info {
    (target: $target:expr, $($arg:tt)+) => {
        $crate::log!(target: $target, level: $crate::Level::Info, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::log!(level: $crate::Level::Info, $($arg)+)
    };
}

/// Emits a record at [`Level::Debug`].
#[macro_export]
macro_rules! debug {
    (target: $target:expr, $($arg:tt)+) => {
        $crate::log!(target: $target, level: $crate::Level::Debug, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::log!(level: $crate::Level::Debug, $($arg)+)
    };
}

/// Emits a record at [`Level::Trace`].
#[macro_export]
macro_rules! trace {
    (target: $target:expr, $($arg:tt)+) => {
        $crate::log!(target: $target, level: $crate::Level::Trace, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::log!(level: $crate::Level::Trace, $($arg)+)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_ordering() {
        assert!(Level::Error < Level::Warn);
        assert!(Level::Debug < Level::Trace);
        assert_eq!(Level::from_u8(3), Level::Debug);
        assert_eq!(Level::from_u8(200), Level::Info);
    }

    #[test]
    fn test_level_parse() {
        assert_eq!("error".parse::<Level>(), Ok(Level::Error));
        assert_eq!(" Trace ".parse::<Level>(), Ok(Level::Trace));
        assert_eq!("warning".parse::<Level>(), Ok(Level::Warn));

        let err = "loud".parse::<Level>().unwrap_err();
        assert!(err.to_string().contains("'loud'"));
    }

    #[test]
    fn test_out_of_range_level_uses_default() {
        assert_eq!(Level::from_u8(Level::Trace as u8), Level::Trace);
        assert_eq!(Level::from_u8(200), Level::DEFAULT);
        assert_eq!(Level::DEFAULT, Level::Warn);

        let logger = Logger::new(Level::Info, false);
        logger.level.store(99, Ordering::Release);
        assert_eq!(logger.level(), Level::DEFAULT);
    }

    #[test]
    fn test_filtering() {
        let logger = Logger::new(Level::Warn, false);
        assert!(logger.enabled(Level::Error));
        assert!(logger.enabled(Level::Warn));
        assert!(!logger.enabled(Level::Info));

        logger.set_level(Level::Trace);
        assert!(logger.enabled(Level::Trace));
        assert_eq!(logger.level(), Level::Trace);
    }

    #[test]
    fn test_render_without_color() {
        let logger = Logger::new(Level::Info, false);
        let line = logger.render(Level::Info, "oxidex_meta::registry", format_args!("x = {}", 1));
        assert_eq!(line, "INFO  oxidex_meta::registry: x = 1");
    }

    #[test]
    fn test_render_with_color_resets() {
        let logger = Logger::new(Level::Info, true);
        let line = logger.render(Level::Error, "t", format_args!("boom"));
        assert!(line.starts_with("\x1b[1;31m"));
        assert!(line.contains("\x1b[0m t: boom"));
    }

    // The global level is shared by every test in this binary, so all the
    // assertions that mutate it live in one test.
    #[test]
    fn test_global_level_controls() {
        set_level(Level::Info);
        assert!(set_level_from_str("nonsense").is_err());
        assert_eq!(get_logger().level(), Level::Info);

        set_level_from_str("debug").unwrap();
        assert_eq!(get_logger().level(), Level::Debug);

        set_level(Level::Error);
        info!("suppressed {}", 1);
        debug!(target: "custom", "suppressed {}", 2);
        assert!(log_enabled!(Level::Error));
        assert!(!log_enabled!(Level::Debug));
        error!(target: "custom", "emitted from a test");
        set_level(Level::Warn);
    }
}
