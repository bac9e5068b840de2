use crate::management::server::ServerStatus;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CpuInfo {
    pub model: String,
    pub cores: u32,
    /// percent, rounded
    pub usage: u32,
}

/// Memory figures are in bytes.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MemInfo {
    pub total: u64,
    pub used: u64,
    pub free: u64,
    pub percent: u32,
}

/// Host-level figures sampled by the metrics tick.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HostInfo {
    pub cpu: CpuInfo,
    pub memory: MemInfo,
    pub uptime: u64,
    pub platform: String,
    pub hostname: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SystemInfo {
    #[serde(flatten)]
    pub host: HostInfo,
    /// seconds since the current launch, 0 when offline
    pub server_uptime: u64,
    pub server_running: bool,
    pub status: ServerStatus,
    pub players: Vec<String>,
    /// last player count reported by the server itself
    pub online_players: Option<u32>,
    pub max_players: u32,
    pub dynmap_url: String,
}
