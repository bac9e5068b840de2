use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Success,
    Warn,
    Error,
    Stdout,
    Stderr,
    Command,
}

/// One console history entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogEntry {
    pub level: LogLevel,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl LogEntry {
    pub fn now(level: LogLevel, text: impl Into<String>) -> Self {
        Self {
            level,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationLevel {
    Info,
    Success,
    Warn,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Announcement {
    pub id: u64,
    pub text: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub time: DateTime<Utc>,
}
