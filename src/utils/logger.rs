use std::str::FromStr;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use anyhow::Context;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};

/// Log output for an acquisition host process.
///
/// With `file_dir` unset, log lines go to stdout. With it set, they go to a
/// rolling file appender in that directory; `init` then returns the
/// non-blocking worker guard, which the host must keep alive for as long as
/// it wants log lines flushed.
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
pub struct LoggerConfig {
    /// Maximum level: `trace` / `debug` / `info` / `warn` / `error`.
    pub level: String,
    /// Directory for rolling log files (`None` = stdout).
    pub file_dir: Option<String>,
    /// Filename prefix for rolling log files.
    pub file_prefix: Option<String>,
    /// Rotation period: `minutely`, `hourly`, or anything else for daily.
    pub rolling: Option<String>,
    /// Rolled files kept on disk (minimum 1).
    #[serde(default)]
    pub max_files: usize,
}

impl LoggerConfig {
    /// Read the configuration from ACQ_LOG_LEVEL, ACQ_LOG_FILE_DIR,
    /// ACQ_LOG_FILE_PREFIX and ACQ_LOG_ROLLING, defaulting anything unset.
    pub fn from_env() -> Self {
        Self {
            level: std::env::var("ACQ_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            file_dir: std::env::var("ACQ_LOG_FILE_DIR").ok(),
            file_prefix: std::env::var("ACQ_LOG_FILE_PREFIX").ok(),
            rolling: std::env::var("ACQ_LOG_ROLLING").ok(),
            max_files: 2,
        }
    }

    /// Install the global tracing subscriber. A no-op if one is already set.
    pub fn init(&self) -> anyhow::Result<Option<WorkerGuard>> {
        let level = Level::from_str(&self.level).unwrap_or(Level::INFO);

        let Some(dir) = self.file_dir.as_deref() else {
            let _ = tracing_subscriber::fmt().with_max_level(level).try_init();
            return Ok(None);
        };

        let appender: RollingFileAppender = RollingFileAppender::builder()
            .rotation(self.rotation())
            .max_log_files(self.max_files.max(1))
            .filename_prefix(self.file_prefix.as_deref().unwrap_or(""))
            .build(dir)
            .with_context(|| format!("failed to create rolling appender in {dir}"))?;
        let (writer, guard) = tracing_appender::non_blocking(appender);

        let _ = tracing_subscriber::fmt()
            .with_max_level(level)
            .with_writer(writer)
            .try_init();
        Ok(Some(guard))
    }

    fn rotation(&self) -> Rotation {
        match self.rolling.as_deref() {
            Some("minutely") => Rotation::MINUTELY,
            Some("hourly") => Rotation::HOURLY,
            _ => Rotation::DAILY,
        }
    }
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file_dir: None,
            file_prefix: None,
            rolling: None,
            max_files: 2,
        }
    }
}

/// Rate limiter for repeated log messages.
///
/// Suppresses messages emitted within `interval` of the previous one; the
/// next message that passes also reports how many were suppressed. Used by
/// consumer workers so a sink failing on every frame does not emit one log
/// line per frame.
pub struct Throttle {
    last: Mutex<Instant>,
    suppressed: AtomicU64,
    interval: Duration,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        // Backdate so the first message always passes.
        let start = Instant::now()
            .checked_sub(interval)
            .unwrap_or_else(Instant::now);
        Self {
            last: Mutex::new(start),
            suppressed: AtomicU64::new(0),
            interval,
        }
    }

    /// Returns `Some(suppressed_count)` when a message may be emitted,
    /// `None` when it should be swallowed.
    #[inline]
    pub fn poll(&self) -> Option<u64> {
        if self.interval.as_nanos() > 0 {
            if let Ok(guard) = self.last.try_lock() {
                if guard.elapsed() < self.interval {
                    self.suppressed.fetch_add(1, Ordering::Relaxed);
                    return None;
                }
                drop(guard);
            }
        }

        let mut last = self.last.lock().unwrap();
        if last.elapsed() >= self.interval {
            *last = Instant::now();
            let skipped = self.suppressed.swap(0, Ordering::Relaxed);
            Some(skipped)
        } else {
            self.suppressed.fetch_add(1, Ordering::Relaxed);
            None
        }
    }
}

/// Emit a tracing event at `level`, at most once per `interval` per call
/// site. When messages were suppressed, the next one carries the count.
#[macro_export]
macro_rules! log_throttled {
    ($level:ident, $interval:expr, $($arg:tt)*) => {{
        static _THROTTLE: std::sync::OnceLock<$crate::Throttle> = std::sync::OnceLock::new();
        let t = _THROTTLE.get_or_init(|| $crate::Throttle::new($interval));
        if let Some(_suppressed) = t.poll() {
            if _suppressed > 0 {
                tracing::$level!(suppressed = _suppressed, $($arg)*);
            } else {
                tracing::$level!($($arg)*);
            }
        }
    }};
}

#[macro_export]
macro_rules! error_throttled { ($interval:expr, $($arg:tt)*) => { $crate::log_throttled!(error, $interval, $($arg)*); } }
#[macro_export]
macro_rules! warn_throttled  { ($interval:expr, $($arg:tt)*) => { $crate::log_throttled!(warn,  $interval, $($arg)*); } }
