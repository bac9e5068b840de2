use super::data::{Announcement, LogEntry, NotificationLevel};
use crate::management::server::{PlayerStats, Position, ServerStatus, StatsCause};
use crate::status::SystemInfo;
use serde::Serialize;
use std::collections::BTreeMap;

/// Roster view shared by `init` and `player_update`.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct PlayerSnapshot {
    pub players: Vec<String>,
    pub positions: BTreeMap<String, Position>,
    pub stats: BTreeMap<String, PlayerStats>,
}

/// Full state sent to a subscriber right after it authenticates.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct InitData {
    pub server_name: String,
    pub work_dir: String,
    pub dynmap_url: String,
    pub system: SystemInfo,
    pub server_running: bool,
    pub status: ServerStatus,
    #[serde(flatten)]
    pub players: PlayerSnapshot,
    pub announcements: Vec<Announcement>,
}

/// Outbound message, discriminated by `type`.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Envelope {
    AuthRequired {},
    AuthSuccess {},
    AuthFailed {},
    Init(Box<InitData>),
    Status {
        running: bool,
        status: ServerStatus,
    },
    System {
        data: SystemInfo,
    },
    Log(LogEntry),
    Clear {},
    PlayerUpdate(PlayerSnapshot),
    PositionUpdate {
        player: String,
        position: Position,
    },
    PlayerStats {
        player: String,
        stats: PlayerStats,
    },
    PlayerStatsUpdate {
        player: String,
        stats: PlayerStats,
        event: StatsCause,
    },
    Notification {
        level: NotificationLevel,
        message: String,
    },
    AnnouncementsUpdate {
        announcements: Vec<Announcement>,
    },
    DynmapInfo {
        url: String,
    },
    Error {
        action: String,
        message: String,
    },
}

impl Envelope {
    pub fn to_text(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
