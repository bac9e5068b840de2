use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_WORLD: &str = "overworld";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Position {
    pub x: i64,
    pub y: i64,
    pub z: i64,
    pub world: String,
}

impl Default for Position {
    fn default() -> Self {
        Self {
            x: 0,
            y: 64,
            z: 0,
            world: DEFAULT_WORLD.to_string(),
        }
    }
}

/// Cumulative per-player statistics, kept for the whole uptime of the panel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerStats {
    pub deaths: u32,
    pub kills: u32,
    /// seconds
    pub play_time: u64,
    pub first_join: Option<DateTime<Utc>>,
    pub last_join: Option<DateTime<Utc>>,
    pub join_count: u32,
    pub achievements: Vec<String>,
    pub commands_used: u32,
}

impl PlayerStats {
    pub fn first_seen(at: DateTime<Utc>) -> Self {
        Self {
            first_join: Some(at),
            last_join: Some(at),
            join_count: 1,
            ..Self::empty()
        }
    }

    /// Stats reported for a player the panel has never seen.
    pub fn empty() -> Self {
        Self {
            deaths: 0,
            kills: 0,
            play_time: 0,
            first_join: None,
            last_join: None,
            join_count: 0,
            achievements: vec![],
            commands_used: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StatsCause {
    Death,
    Kill,
    Achievement,
}
