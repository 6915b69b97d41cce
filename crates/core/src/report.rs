//! Reporting sink for pipeline status. The core never prints; it hands every
//! status line to a [`Reporter`] supplied by the caller.

use std::fmt;
use std::sync::Mutex;

use serde::Serialize;

/// Pipeline stage a message belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Manifest,
    Rename,
    Rewrite,
    Encryption,
    Toc,
    Audit,
    Output,
}

impl Stage {
    /// Stages in execution order, excluding output.
    pub const ALL: [Stage; 6] = [
        Stage::Manifest,
        Stage::Rename,
        Stage::Rewrite,
        Stage::Encryption,
        Stage::Toc,
        Stage::Audit,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Stage::Manifest => "file parsing",
            Stage::Rename => "file renaming",
            Stage::Rewrite => "reference rewriting",
            Stage::Encryption => "encryption info removal",
            Stage::Toc => "TOC self-check",
            Stage::Audit => "integrity audit",
            Stage::Output => "output",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    Start,
    Success,
    Info,
    Warning,
    Error,
}

/// Receives status messages. Implement this for console output, GUI status
/// displays, or test capture.
pub trait Reporter: Send + Sync {
    fn report(&self, stage: Stage, level: Level, message: &str);
}

/// Discards everything.
pub struct NoopReporter;

impl Reporter for NoopReporter {
    fn report(&self, _stage: Stage, _level: Level, _message: &str) {}
}

/// Forwards messages to `tracing`.
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn report(&self, stage: Stage, level: Level, message: &str) {
        match level {
            Level::Start | Level::Success | Level::Info => {
                tracing::info!(stage = %stage, "{}", message)
            }
            Level::Warning => tracing::warn!(stage = %stage, "{}", message),
            Level::Error => tracing::error!(stage = %stage, "{}", message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportEvent {
    pub stage: Stage,
    pub level: Level,
    pub message: String,
}

/// Keeps every message in memory.
#[derive(Default)]
pub struct MemoryReporter {
    events: Mutex<Vec<ReportEvent>>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ReportEvent> {
        self.events
            .lock()
            .map(|e| e.clone())
            .unwrap_or_default()
    }

    /// Messages of one stage at one level.
    pub fn messages(&self, stage: Stage, level: Level) -> Vec<String> {
        self.events()
            .into_iter()
            .filter(|e| e.stage == stage && e.level == level)
            .map(|e| e.message)
            .collect()
    }
}

impl Reporter for MemoryReporter {
    fn report(&self, stage: Stage, level: Level, message: &str) {
        if let Ok(mut events) = self.events.lock() {
            events.push(ReportEvent {
                stage,
                level,
                message: message.to_string(),
            });
        }
    }
}
