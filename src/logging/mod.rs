//! Leveled logging for transports.
//!
//! The transport only ever logs through [`Logger`]. Hosts pick a sink:
//! [`QueueLogger`] (colored lines on stderr, written off-thread),
//! [`FacadeLogger`] (the `log` crate) or [`NullLogger`].

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::thread::JoinHandle;

use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::{Mutex, RwLock};

/// Severity of a log line. Ordered from most to least verbose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Error => "ERROR",
        }
    }

    fn ansi(&self) -> &'static str {
        match self {
            Self::Debug => "\x1b[36m",
            Self::Info => "\x1b[32m",
            Self::Error => "\x1b[31m",
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "error" => Ok(Self::Error),
            other => Err(format!("unknown log level {other:?}")),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Leveled, fire-and-forget logger handed to every transport.
///
/// Implementations must return quickly: transports log while holding
/// their registry lock.
pub trait Logger: Send + Sync {
    fn log(&self, level: LogLevel, message: &str);

    fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }

    fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    fn error(&self, message: &str) {
        self.log(LogLevel::Error, message);
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullLogger;

impl Logger for NullLogger {
    fn log(&self, _level: LogLevel, _message: &str) {}
}

/// Forwards to the `log` facade so the host's logger backend decides where lines go.
#[derive(Debug, Clone)]
pub struct FacadeLogger {
    target: String,
}

impl FacadeLogger {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
        }
    }
}

impl Default for FacadeLogger {
    fn default() -> Self {
        Self::new("relayhub")
    }
}

impl Logger for FacadeLogger {
    fn log(&self, level: LogLevel, message: &str) {
        let target = self.target.as_str();
        match level {
            LogLevel::Debug => log::debug!(target: target, "{}", message),
            LogLevel::Info => log::info!(target: target, "{}", message),
            LogLevel::Error => log::error!(target: target, "{}", message),
        }
    }
}

/// One queued line.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub at: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    pub target: Option<String>,
}

impl LogEntry {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            at: Utc::now(),
            level,
            message: message.into(),
            target: None,
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// `<rfc3339 micros> <LEVEL> [target] message`, with ANSI colors.
    fn render(&self) -> String {
        const RESET: &str = "\x1b[0m";
        const DIM: &str = "\x1b[2m";

        let at = self.at.to_rfc3339_opts(chrono::SecondsFormat::Micros, false);
        let mut line = format!(
            "{DIM}{at}{RESET} {}{:<5}{RESET}",
            self.level.ansi(),
            self.level.as_str()
        );
        if let Some(target) = &self.target {
            line.push_str(&format!(" {DIM}{target}{RESET}"));
        }
        line.push(' ');
        line.push_str(&self.message);
        line
    }
}

/// Configuration for [`QueueLogger`].
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Lines below this level are dropped before they are queued.
    pub level: LogLevel,
    pub queue_size: usize,
    /// Printed next to every line.
    pub target: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            queue_size: 10_000,
            target: Some("relayhub".to_string()),
        }
    }
}

impl LogConfig {
    pub fn verbose() -> Self {
        Self {
            level: LogLevel::Debug,
            ..Self::default()
        }
    }

    pub fn errors_only() -> Self {
        Self {
            level: LogLevel::Error,
            ..Self::default()
        }
    }
}

/// Logger backed by a bounded queue and a writer thread on stderr.
///
/// `log` never blocks: when the queue is full the entry is dropped.
pub struct QueueLogger {
    sender: Mutex<Option<Sender<LogEntry>>>,
    config: RwLock<LogConfig>,
    writer: Mutex<Option<JoinHandle<()>>>,
}

impl QueueLogger {
    pub fn start(config: LogConfig) -> std::io::Result<Self> {
        let (sender, receiver) = bounded::<LogEntry>(config.queue_size.max(1));
        let writer = std::thread::Builder::new()
            .name("relayhub-logger".into())
            .spawn(move || write_lines(receiver))?;

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            config: RwLock::new(config),
            writer: Mutex::new(Some(writer)),
        })
    }

    /// Swaps the config; applies to lines logged from now on.
    pub fn update_config(&self, config: LogConfig) {
        *self.config.write() = config;
    }

    pub fn config(&self) -> LogConfig {
        self.config.read().clone()
    }

    /// Disconnects the queue and waits until every queued line is written.
    pub fn shutdown(&self) {
        self.sender.lock().take();
        if let Some(handle) = self.writer.lock().take() {
            let _ = handle.join();
        }
    }
}

impl Logger for QueueLogger {
    fn log(&self, level: LogLevel, message: &str) {
        let entry = {
            let cfg = self.config.read();
            if level < cfg.level {
                return;
            }
            match &cfg.target {
                Some(target) => LogEntry::new(level, message).with_target(target.as_str()),
                None => LogEntry::new(level, message),
            }
        };
        if let Some(sender) = self.sender.lock().as_ref() {
            let _ = sender.try_send(entry);
        }
    }
}

impl Drop for QueueLogger {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Runs until every sender is gone.
fn write_lines(receiver: Receiver<LogEntry>) {
    use std::io::Write;

    for entry in receiver.iter() {
        let mut stderr = std::io::stderr().lock();
        let _ = writeln!(stderr, "{}", entry.render());
    }
}
