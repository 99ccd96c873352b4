use std::sync::{Arc, OnceLock};

/// Receives the log output of `CardKit` on the host side.
///
/// Implemented in Swift, Kotlin or JavaScript and registered once with [`set_logger`].
///
/// ```rust
/// use cardkit_core::logger::{LogLevel, Logger};
///
/// struct StderrLogger;
///
/// impl Logger for StderrLogger {
///     fn log(&self, level: LogLevel, message: String) {
///         eprintln!("[{level:?}] {message}");
///     }
/// }
/// ```
///
/// ## Swift
///
/// ```swift
/// final class CardKitLogBridge: CardKit.Logger {
///     func log(level: CardKit.LogLevel, message: String) {
///         os_log("%{public}@", message)
///     }
/// }
///
/// CardKit.setLogger(logger: CardKitLogBridge()) // once, at launch
/// ```
#[uniffi::export(with_foreign)]
pub trait Logger: Sync + Send {
    /// Records a single message.
    fn log(&self, level: LogLevel, message: String);
}

/// Severity of a forwarded log message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum LogLevel {
    /// Very detailed tracing output.
    Trace,
    /// Debugging information.
    Debug,
    /// Progress of a provisioning flow.
    Info,
    /// Recoverable problems, such as an unreadable credential cache.
    Warn,
    /// Failed operations.
    Error,
}

impl From<log::Level> for LogLevel {
    fn from(level: log::Level) -> Self {
        match level {
            log::Level::Error => Self::Error,
            log::Level::Warn => Self::Warn,
            log::Level::Info => Self::Info,
            log::Level::Debug => Self::Debug,
            log::Level::Trace => Self::Trace,
        }
    }
}

static LOGGER_INSTANCE: OnceLock<Arc<dyn Logger>> = OnceLock::new();

/// `log::Log` implementation that hands records to the registered [`Logger`].
struct ForeignLogger;

impl ForeignLogger {
    /// Debug and trace output of dependencies (`reqwest`, `hyper`, ...) is dropped.
    fn accepts(record: &log::Record) -> bool {
        let from_cardkit = record
            .module_path()
            .is_some_and(|module_path| module_path.starts_with("cardkit"));
        from_cardkit || record.level() <= log::Level::Info
    }
}

impl log::Log for ForeignLogger {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        if !Self::accepts(record) {
            return;
        }

        if let Some(logger) = LOGGER_INSTANCE.get() {
            logger.log(record.level().into(), format!("{}", record.args()));
        } else {
            eprintln!("Logger not set: {}", record.args());
        }
    }

    fn flush(&self) {}
}

/// Registers the host logger and installs the forwarding `log` backend.
///
/// Only the first call has an effect.
#[uniffi::export]
pub fn set_logger(logger: Arc<dyn Logger>) {
    if LOGGER_INSTANCE.set(logger).is_err() {
        println!("Logger already set");
        return;
    }

    if let Err(e) = init_logger() {
        eprintln!("Failed to set logger: {e}");
    }
}

fn init_logger() -> Result<(), log::SetLoggerError> {
    static LOGGER: ForeignLogger = ForeignLogger;
    log::set_logger(&LOGGER)?;
    log::set_max_level(log::LevelFilter::Trace);
    Ok(())
}
