//! # Logging
//!
//! `tracing-subscriber` setup for the worker crates plus helpers for keeping
//! request credentials out of log output.
//!
//! Every crate in the workspace logs through `tracing` macros. [`init_logging`]
//! installs a registry with an [`EnvFilter`], one formatting layer chosen by
//! [`LogFormat`], and optionally a layer that mirrors each event into a host
//! [`LoggerSink`] (a browser console, `os_log`, a log file).
//!
//! ```ignore
//! use bridge_traits::time::{ConsoleLogger, LogLevel};
//! use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};
//! use std::sync::Arc;
//!
//! init_logging(
//!     LoggingConfig::default()
//!         .with_format(LogFormat::Compact)
//!         .with_level(LogLevel::Debug)
//!         .with_logger_sink(Arc::new(ConsoleLogger::default())),
//! )?;
//!
//! tracing::warn!(target: "core_worker", url = "/calculator/", "Refresh failed");
//! ```
//!
//! URLs and store names are logged as-is. Header values whose name marks them
//! as a credential are replaced with `[REDACTED]` before reaching a sink.

use crate::error::{Error, Result};
use bridge_traits::time::{LogEntry, LogLevel, LoggerSink};
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::{
    filter::EnvFilter,
    fmt::format::FmtSpan,
    layer::{Context, SubscriberExt},
    registry::LookupSpan,
    util::SubscriberInitExt,
    Layer,
};

/// Replacement text for redacted values.
pub const REDACTED: &str = "[REDACTED]";

/// Crates whose output follows the configured level. Everything else is held
/// at `warn` unless a custom filter says otherwise.
const WORKSPACE_TARGETS: &[&str] = &[
    "offline_worker_workspace",
    "core_runtime",
    "core_worker",
    "bridge_traits",
    "bridge_desktop",
];

/// Chatty dependencies of the desktop bridges.
const QUIET_TARGETS: &[&str] = &["h2", "hyper", "reqwest", "rustls", "sqlx"];

/// Field names that carry credentials when a request is forwarded.
const CREDENTIAL_FIELDS: &[&str] = &[
    "authorization",
    "cookie",
    "token",
    "secret",
    "password",
    "api_key",
    "apikey",
];

/// Output format of the stdout layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Multi-line, human-readable
    Pretty,
    /// One JSON object per event
    Json,
    /// Single line per event
    Compact,
}

impl Default for LogFormat {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            Self::Pretty
        } else {
            Self::Json
        }
    }
}

#[derive(Clone)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// Level applied to the workspace crates
    pub level: LogLevel,
    /// Replace credential values before they reach the logger sink
    pub redact_credentials: bool,
    /// Full `EnvFilter` directive, replaces the generated one
    pub filter: Option<String>,
    pub logger_sink: Option<Arc<dyn LoggerSink>>,
    /// Log span enter/exit (pretty) or the span list (JSON)
    pub enable_spans: bool,
    pub display_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            level: LogLevel::Info,
            redact_credentials: true,
            filter: None,
            logger_sink: None,
            enable_spans: false,
            display_target: true,
        }
    }
}

impl LoggingConfig {
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_redaction(mut self, redact: bool) -> Self {
        self.redact_credentials = redact;
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Mirror every event that passes the filter into `sink`.
    pub fn with_logger_sink(mut self, sink: Arc<dyn LoggerSink>) -> Self {
        self.logger_sink = Some(sink);
        self
    }

    pub fn with_spans(mut self, enable: bool) -> Self {
        self.enable_spans = enable;
        self
    }

    pub fn with_target(mut self, display: bool) -> Self {
        self.display_target = display;
        self
    }
}

/// Installs the global subscriber.
///
/// # Errors
///
/// Returns [`Error::Config`] when the filter directive does not parse or a
/// global subscriber is already installed.
pub fn init_logging(config: LoggingConfig) -> Result<()> {
    let filter = build_filter(&config)?;

    let registry = tracing_subscriber::registry().with(filter).with(LoggerSinkLayer::new(
        config.logger_sink.clone(),
        config.redact_credentials,
    ));

    let stdout = tracing_subscriber::fmt::layer()
        .with_target(config.display_target)
        .with_writer(io::stdout);

    let installed = match config.format {
        LogFormat::Pretty => {
            let span_events = if config.enable_spans {
                FmtSpan::ACTIVE
            } else {
                FmtSpan::NONE
            };
            registry
                .with(stdout.pretty().with_span_events(span_events))
                .try_init()
        }
        LogFormat::Json => registry
            .with(
                stdout
                    .json()
                    .flatten_event(true)
                    .with_current_span(config.enable_spans)
                    .with_span_list(config.enable_spans),
            )
            .try_init(),
        LogFormat::Compact => registry.with(stdout.compact()).try_init(),
    };

    installed.map_err(|e| Error::Config(format!("Failed to initialize logging: {}", e)))
}

fn build_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    let directive = match &config.filter {
        Some(custom) => custom.clone(),
        None => default_directive(config.level),
    };

    EnvFilter::try_new(&directive)
        .map_err(|e| Error::Config(format!("Invalid log filter '{}': {}", directive, e)))
}

fn default_directive(level: LogLevel) -> String {
    let level = level_name(level);
    WORKSPACE_TARGETS
        .iter()
        .map(|target| format!("{}={}", target, level))
        .chain(QUIET_TARGETS.iter().map(|target| format!("{}=warn", target)))
        .collect::<Vec<_>>()
        .join(",")
}

fn level_name(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Trace => "trace",
        LogLevel::Debug => "debug",
        LogLevel::Info => "info",
        LogLevel::Warn => "warn",
        LogLevel::Error => "error",
    }
}

fn log_level(level: &tracing::Level) -> LogLevel {
    match *level {
        tracing::Level::TRACE => LogLevel::Trace,
        tracing::Level::DEBUG => LogLevel::Debug,
        tracing::Level::INFO => LogLevel::Info,
        tracing::Level::WARN => LogLevel::Warn,
        tracing::Level::ERROR => LogLevel::Error,
    }
}

/// Mirrors events into a [`LoggerSink`].
struct LoggerSinkLayer {
    sink: Option<Arc<dyn LoggerSink>>,
    redact: bool,
}

impl LoggerSinkLayer {
    fn new(sink: Option<Arc<dyn LoggerSink>>, redact: bool) -> Self {
        Self { sink, redact }
    }

    fn entry(&self, event: &Event<'_>, span: Option<String>) -> LogEntry {
        let metadata = event.metadata();
        let mut fields = FieldCollector::default();
        event.record(&mut fields);

        let message = fields
            .values
            .remove("message")
            .unwrap_or_else(|| metadata.name().to_string());
        
        let mut entry = LogEntry::new(log_level(metadata.level()), metadata.target(), message);
        for (name, value) in fields.values {
            let value = if self.redact {
                redact_if_sensitive(&name, &value)
            } else {
                value
            };
            entry = entry.with_field(name, value);
        }
        if let Some(span) = span {
            entry = entry.with_span_id(span);
        }
        entry
    }
}

impl<S> Layer<S> for LoggerSinkLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let Some(sink) = self.sink.as_ref() else {
            return;
        };
        if log_level(event.metadata().level()) < sink.min_level() {
            return;
        }

        let span = ctx.lookup_current().map(|span| span.name().to_string());
        let entry = self.entry(event, span);
        let sink = Arc::clone(sink);

        // Sinks are async; outside a runtime the entry is delivered inline.
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(err) = sink.log(entry).await {
                        eprintln!("LoggerSink error: {}", err);
                    }
                });
            }
            Err(_) => {
                if let Err(err) = futures::executor::block_on(sink.log(entry)) {
                    eprintln!("LoggerSink error: {}", err);
                }
            }
        }
    }
}

/// Collects an event's fields as strings, `message` included.
#[derive(Default)]
struct FieldCollector {
    values: HashMap<String, String>,
}

impl Visit for FieldCollector {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.values.insert(field.name().to_string(), value.to_string());
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.values.insert(field.name().to_string(), value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.values
            .insert(field.name().to_string(), format!("{:?}", value));
    }
}

/// Returns `value`, or [`REDACTED`] when it is a credential.
///
/// A value is a credential when the field name contains one of the
/// credential markers (`authorization`, `cookie`, `token`, ...) or when the
/// value itself is an HTTP `Bearer`/`Basic` authorization.
///
/// ```
/// use core_runtime::logging::redact_if_sensitive;
///
/// assert_eq!(redact_if_sensitive("cookie", "session=abc"), "[REDACTED]");
/// assert_eq!(redact_if_sensitive("url", "/calculator/"), "/calculator/");
/// ```
pub fn redact_if_sensitive(field_name: &str, value: &str) -> String {
    let name = field_name.to_ascii_lowercase().replace('-', "_");
    let marked = CREDENTIAL_FIELDS.iter().any(|marker| name.contains(marker));

    if marked || is_authorization_value(value) {
        REDACTED.to_string()
    } else {
        value.to_string()
    }
}

fn is_authorization_value(value: &str) -> bool {
    let value = value.trim_start();
    ["bearer ", "basic "].iter().any(|scheme| {
        value
            .get(..scheme.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(scheme))
    })
}

/// Basename of a filesystem path, for logging storage locations without the
/// user's directory layout.
pub fn strip_path(path: &str) -> &str {
    path.rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or(path)
}
