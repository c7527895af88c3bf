//! # Structured Logging
//!
//! The [`Logger`] capability receives every wrapped error, plus the
//! subscriber setup used by binaries that embed this crate.
//!
//! Logs always carry the full error text, regardless of the environment
//! policy applied to HTTP responses.

use std::collections::HashMap;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing_appender::non_blocking::NonBlocking;
use tracing_appender::rolling::RollingFileAppender;
use tracing_subscriber::layer::{Layered, SubscriberExt};
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

use crate::config::optional;
use crate::details::Details;
use crate::envelope::Failure;
use crate::types::{Error, Result};

// Flag to track if logging has been initialized
static LOGGING_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Sink for wrapped errors.
///
/// Called synchronously on the wrapping thread. Implementations must not
/// panic or block for long, and must swallow their own I/O failures.
pub trait Logger: Send + Sync {
    /// Records a wrapped error.
    ///
    /// `details` is a copy of the caller's metadata with a `timestamp`
    /// entry added. The stack trace is passed separately and is empty when
    /// capture is disabled.
    fn error(
        &self,
        error_id: &str,
        error: &Failure,
        context: &str,
        details: &Details,
        stack_trace: &str,
    );

    /// Records an informational message
    fn info(&self, msg: &str);
}

/// Default logger: emits structured `tracing` events
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn error(
        &self,
        error_id: &str,
        error: &Failure,
        context: &str,
        details: &Details,
        stack_trace: &str,
    ) {
        if stack_trace.is_empty() {
            tracing::error!(
                error_id = %error_id,
                context = %context,
                error = %error,
                details = %details,
                "Error wrapped"
            );
        } else {
            tracing::error!(
                error_id = %error_id,
                context = %context,
                error = %error,
                details = %details,
                stack_trace = %stack_trace,
                "Error wrapped"
            );
        }
    }

    fn info(&self, msg: &str) {
        tracing::info!(target: "error_id", "{}", msg);
    }
}

/// Line-oriented logger writing to any `Write` sink (stdout, a file, a buffer)
pub struct WriterLogger<W: Write + Send> {
    out: Mutex<W>,
}

impl<W: Write + Send> WriterLogger<W> {
    pub fn new(out: W) -> Self {
        Self { out: Mutex::new(out) }
    }

    /// Consumes the logger and returns the sink
    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_line(&self, line: &str) {
        let mut out = self.out.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let _ = writeln!(
            out,
            "[ERROR-ID] {} {}",
            chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ"),
            line
        );
        let _ = out.flush();
    }
}

impl WriterLogger<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl WriterLogger<std::io::Stderr> {
    pub fn stderr() -> Self {
        Self::new(std::io::stderr())
    }
}

impl<W: Write + Send> std::fmt::Debug for WriterLogger<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriterLogger").finish_non_exhaustive()
    }
}

impl<W: Write + Send> Logger for WriterLogger<W> {
    fn error(
        &self,
        error_id: &str,
        error: &Failure,
        context: &str,
        details: &Details,
        stack_trace: &str,
    ) {
        let mut line = format!(
            "ID={} | Context={} | Error={} | Details={}",
            error_id, context, error, details
        );
        if !stack_trace.is_empty() {
            line.push('\n');
            line.push_str(stack_trace.trim_end());
        }
        self.write_line(&line);
    }

    fn info(&self, msg: &str) {
        self.write_line(&format!("INFO: {}", msg));
    }
}

/// Configuration for the logging system
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// The log level to use (trace, debug, info, warn, error)
    pub level: String,
    /// The service name for identification
    pub service_name: String,
    /// Whether to output logs to a file
    pub file_output: bool,
    /// The directory to store log files in
    pub log_dir: Option<String>,
    /// Whether to use JSON formatting
    pub json_format: bool,
    /// Custom fields logged once at startup
    pub custom_fields: HashMap<String, serde_json::Value>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            service_name: "error-id".to_string(),
            file_output: false,
            log_dir: None,
            json_format: true,
            custom_fields: HashMap::new(),
        }
    }
}

impl TryFrom<config::Config> for LoggingConfig {
    type Error = config::ConfigError;

    fn try_from(cfg: config::Config) -> std::result::Result<Self, Self::Error> {
        LoggingConfig::from_config(&cfg)
    }
}

impl LoggingConfig {
    /// Reads `logging.*` keys, keeping defaults for anything missing.
    /// A key that is present with the wrong type is an error.
    pub fn from_config(cfg: &config::Config) -> std::result::Result<Self, config::ConfigError> {
        let mut base = LoggingConfig::default();

        if let Some(level) = optional::<String>(cfg, "logging.level")? {
            base.level = level;
        }
        if let Some(service_name) = optional::<String>(cfg, "logging.service_name")? {
            base.service_name = service_name;
        }
        if let Some(file_output) = optional::<bool>(cfg, "logging.file_output")? {
            base.file_output = file_output;
        }
        if let Some(log_dir) = optional::<String>(cfg, "logging.log_dir")? {
            base.log_dir = Some(log_dir);
        }
        if let Some(json_format) = optional::<bool>(cfg, "logging.json_format")? {
            base.json_format = json_format;
        }
        if let Some(custom) =
            optional::<HashMap<String, serde_json::Value>>(cfg, "logging.custom_fields")?
        {
            base.custom_fields = custom;
        }

        Ok(base)
    }
}

/// Initializes the global tracing subscriber.
///
/// Repeat calls are no-ops.
pub fn init_logging(config: Option<LoggingConfig>) -> Result<()> {
    if LOGGING_INITIALIZED.load(Ordering::SeqCst) {
        return Ok(());
    }

    let config = config.unwrap_or_default();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str()));

    let subscriber = Registry::default().with(filter);

    // JSON and text layers have distinct types, so each branch boxes its own.
    let console_layer: Box<dyn Layer<Layered<EnvFilter, Registry>> + Send + Sync> = if config.json_format {
        Box::new(
            fmt::layer()
                .json()
                .flatten_event(true)
                .with_current_span(true)
                .with_target(true),
        )
    } else {
        Box::new(fmt::layer().with_target(true).with_thread_names(true))
    };
    let subscriber = subscriber.with(console_layer);

    let file_layer = match (config.file_output, config.log_dir.as_deref()) {
        (true, Some(log_dir)) => {
            std::fs::create_dir_all(log_dir)?;
            let file_appender = RollingFileAppender::new(
                tracing_appender::rolling::Rotation::DAILY,
                log_dir,
                format!("{}.log", config.service_name),
            );
            let (non_blocking, guard) = NonBlocking::new(file_appender);

            // Keep the guard alive for the lifetime of the program
            Box::leak(Box::new(guard));

            Some(fmt::layer().with_writer(non_blocking).with_ansi(false))
        }
        _ => None,
    };
    let subscriber = subscriber.with(file_layer);

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| Error::Logging(e.to_string()))?;

    LOGGING_INITIALIZED.store(true, Ordering::SeqCst);

    tracing::info!(
        service = %config.service_name,
        level = %config.level,
        json = %config.json_format,
        custom_fields = ?config.custom_fields,
        "Structured logging initialized"
    );

    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io;
    use std::sync::Arc;

    /// Logger that records every call, shared by the crate's tests
    #[derive(Default)]
    pub(crate) struct RecordingLogger {
        pub(crate) errors: Mutex<Vec<LoggedError>>,
        pub(crate) infos: Mutex<Vec<String>>,
    }

    #[derive(Debug, Clone)]
    pub(crate) struct LoggedError {
        pub(crate) error_id: String,
        pub(crate) error: Failure,
        pub(crate) context: String,
        pub(crate) details: Details,
        pub(crate) stack_trace: String,
    }

    impl RecordingLogger {
        pub(crate) fn shared() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub(crate) fn errors(&self) -> Vec<LoggedError> {
            self.errors.lock().unwrap().clone()
        }

        pub(crate) fn infos(&self) -> Vec<String> {
            self.infos.lock().unwrap().clone()
        }
    }

    impl Logger for RecordingLogger {
        fn error(
            &self,
            error_id: &str,
            error: &Failure,
            context: &str,
            details: &Details,
            stack_trace: &str,
        ) {
            self.errors.lock().unwrap().push(LoggedError {
                error_id: error_id.to_string(),
                error: error.clone(),
                context: context.to_string(),
                details: details.clone(),
                stack_trace: stack_trace.to_string(),
            });
        }

        fn info(&self, msg: &str) {
            self.infos.lock().unwrap().push(msg.to_string());
        }
    }

    #[test]
    fn test_writer_logger_format() {
        let logger = WriterLogger::new(Vec::new());
        let failure = Failure::new(io::Error::new(io::ErrorKind::Other, "disk full"));
        let details = Details::new().add("timestamp", 42);

        logger.error("ERR-20260101-abcdef", &failure, "saving upload", &details, "");
        logger.info("callback finished");

        let output = String::from_utf8(logger.into_inner()).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("[ERROR-ID] "));
        assert!(lines[0].ends_with(
            "ID=ERR-20260101-abcdef | Context=saving upload | Error=disk full | Details={timestamp: 42}"
        ));
        assert!(lines[1].ends_with("INFO: callback finished"));
    }

    #[test]
    fn test_writer_logger_appends_stack() {
        let logger = WriterLogger::new(Vec::new());
        let failure = Failure::new(io::Error::new(io::ErrorKind::Other, "boom"));

        logger.error("ID", &failure, "ctx", &Details::new(), "frame_a\n    at a.rs:1\n");

        let output = String::from_utf8(logger.into_inner()).unwrap();
        assert!(output.contains("Error=boom"));
        assert!(output.contains("\nframe_a\n    at a.rs:1\n"));
    }

    #[test]
    fn test_logging_config_from_config() {
        let cfg = config::Config::builder()
            .set_override("logging.level", "debug")
            .unwrap()
            .set_override("logging.json_format", false)
            .unwrap()
            .build()
            .unwrap();

        let logging: LoggingConfig = cfg.try_into().unwrap();
        assert_eq!(logging.level, "debug");
        assert!(!logging.json_format);
        assert_eq!(logging.service_name, "error-id");
    }
}
