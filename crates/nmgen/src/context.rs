//! Diagnostic context shared by all build stages
//!
//! Messages are kept in order up to a fixed capacity and mirrored to the
//! `log` facade. Stage timings are recorded for profiling.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use web_time::Instant;

use crate::BuildState;

/// Maximum number of messages kept by a [`BuildContext`]
pub const MAX_MESSAGES: usize = 1000;

/// Severity of a build message
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MessageLevel {
    Info,
    Warning,
    Error,
}

impl fmt::Display for MessageLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MessageLevel::Info => "INFO",
            MessageLevel::Warning => "WARNING",
            MessageLevel::Error => "ERROR",
        })
    }
}

/// A single build message
#[derive(Debug, Clone, PartialEq)]
pub struct BuildMessage {
    pub level: MessageLevel,
    pub text: String,
    /// Name of the object that produced the message
    pub source: Option<String>,
}

impl fmt::Display for BuildMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some(source) => write!(f, "{}: {} ({})", self.level, self.text, source),
            None => write!(f, "{}: {}", self.level, self.text),
        }
    }
}

/// Accumulates diagnostic messages and timings for one build
#[derive(Debug)]
pub struct BuildContext {
    messages: Vec<BuildMessage>,
    logging_enabled: bool,
    active_timers: HashMap<BuildState, Instant>,
    timings: HashMap<BuildState, Duration>,
}

impl Default for BuildContext {
    fn default() -> Self {
        Self::new()
    }
}

impl BuildContext {
    pub fn new() -> Self {
        Self {
            messages: Vec::new(),
            logging_enabled: true,
            active_timers: HashMap::new(),
            timings: HashMap::new(),
        }
    }

    /// Enables or disables message recording
    pub fn set_logging_enabled(&mut self, enabled: bool) {
        self.logging_enabled = enabled;
    }

    pub fn logging_enabled(&self) -> bool {
        self.logging_enabled
    }

    /// Logs an informational message
    pub fn log(&mut self, message: impl Into<String>, source: Option<&str>) {
        self.push(MessageLevel::Info, message.into(), source);
    }

    /// Logs a warning
    pub fn log_warning(&mut self, message: impl Into<String>, source: Option<&str>) {
        self.push(MessageLevel::Warning, message.into(), source);
    }

    /// Logs an error
    pub fn log_error(&mut self, message: impl Into<String>, source: Option<&str>) {
        self.push(MessageLevel::Error, message.into(), source);
    }

    fn push(&mut self, level: MessageLevel, text: String, source: Option<&str>) {
        match level {
            MessageLevel::Info => log::debug!("{}", text),
            MessageLevel::Warning => log::warn!("{}", text),
            MessageLevel::Error => log::error!("{}", text),
        }

        if !self.logging_enabled || self.messages.len() >= MAX_MESSAGES {
            return;
        }

        self.messages.push(BuildMessage {
            level,
            text,
            source: source.map(str::to_owned),
        });
    }

    /// Formatted messages in the order they were logged
    pub fn messages(&self) -> Vec<String> {
        self.messages.iter().map(ToString::to_string).collect()
    }

    pub fn entries(&self) -> &[BuildMessage] {
        &self.messages
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    pub fn has_errors(&self) -> bool {
        self.messages.iter().any(|m| m.level == MessageLevel::Error)
    }

    pub fn clear_messages(&mut self) {
        self.messages.clear();
    }

    /// Starts timing a stage
    pub fn start_timer(&mut self, stage: BuildState) {
        self.active_timers.insert(stage, Instant::now());
    }

    /// Stops timing a stage and accumulates its duration
    pub fn stop_timer(&mut self, stage: BuildState) {
        if let Some(start) = self.active_timers.remove(&stage) {
            *self.timings.entry(stage).or_default() += start.elapsed();
        }
    }

    /// Accumulated time spent in a stage
    pub fn stage_time(&self, stage: BuildState) -> Option<Duration> {
        self.timings.get(&stage).copied()
    }

    /// Total time over all timed stages
    pub fn total_time(&self) -> Duration {
        self.timings.values().sum()
    }
}
