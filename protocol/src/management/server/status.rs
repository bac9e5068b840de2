use serde::{Deserialize, Serialize};

/// Lifecycle state of the supervised server process.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ServerStatus {
    #[default]
    Offline,
    Starting,
    Online,
    Stopping,
}

impl ServerStatus {
    /// A process handle exists in every state except `Offline`.
    pub fn is_running(&self) -> bool {
        !matches!(self, ServerStatus::Offline)
    }
}
