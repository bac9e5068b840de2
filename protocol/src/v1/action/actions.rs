use serde::Deserialize;
use thiserror::Error;

fn default_amount() -> u32 {
    1
}

#[derive(Debug, Error)]
pub enum ActionParseError {
    #[error("malformed action: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Inbound subscriber request. The `action` field selects the variant, the
/// remaining fields are variant specific. Anything that does not fit one of
/// these shapes is rejected by [`ActionRequest::from_text`].
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ActionRequest {
    Auth {
        password: String,
    },

    // lifecycle
    Start {},
    Stop {},
    Restart {},
    Kill {},
    Command {
        command: String,
    },
    Clear {},

    // informational
    GetSystem {},
    GetPositions {},
    GetPlayerStats {
        player: Option<String>,
    },
    GetDynmapInfo {},

    // players, announcements, items
    TeleportPlayer {
        #[serde(alias = "fromPlayer")]
        from_player: String,
        #[serde(alias = "toPlayer")]
        to_player: String,
    },
    BroadcastMsg {
        message: String,
    },
    AddAnnouncement {
        text: String,
        #[serde(rename = "type")]
        kind: Option<String>,
    },
    RemoveAnnouncement {
        id: u64,
    },
    GiveItem {
        player: String,
        item: String,
        #[serde(default = "default_amount")]
        amount: u32,
    },

    // file browser and upload collaborators
    GetFiles {
        #[serde(default)]
        path: String,
    },
    ReadFile {
        path: String,
    },
    WriteFile {
        path: String,
        content: String,
    },
    DeleteFile {
        path: String,
    },
    CreateFolder {
        path: String,
    },
    UploadFile {
        #[serde(rename = "type")]
        kind: String,
        filename: String,
        data: String,
    },
    ListUploads {
        #[serde(rename = "type")]
        kind: Option<String>,
    },
    DeleteUpload {
        #[serde(rename = "type")]
        kind: String,
        filename: String,
    },
    GetUploadInfo {},
}

impl ActionRequest {
    pub fn from_text(raw: &str) -> Result<Self, ActionParseError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Wire name of the action.
    pub fn name(&self) -> &'static str {
        match self {
            ActionRequest::Auth { .. } => "auth",
            ActionRequest::Start {} => "start",
            ActionRequest::Stop {} => "stop",
            ActionRequest::Restart {} => "restart",
            ActionRequest::Kill {} => "kill",
            ActionRequest::Command { .. } => "command",
            ActionRequest::Clear {} => "clear",
            ActionRequest::GetSystem {} => "get_system",
            ActionRequest::GetPositions {} => "get_positions",
            ActionRequest::GetPlayerStats { .. } => "get_player_stats",
            ActionRequest::GetDynmapInfo {} => "get_dynmap_info",
            ActionRequest::TeleportPlayer { .. } => "teleport_player",
            ActionRequest::BroadcastMsg { .. } => "broadcast_msg",
            ActionRequest::AddAnnouncement { .. } => "add_announcement",
            ActionRequest::RemoveAnnouncement { .. } => "remove_announcement",
            ActionRequest::GiveItem { .. } => "give_item",
            ActionRequest::GetFiles { .. } => "get_files",
            ActionRequest::ReadFile { .. } => "read_file",
            ActionRequest::WriteFile { .. } => "write_file",
            ActionRequest::DeleteFile { .. } => "delete_file",
            ActionRequest::CreateFolder { .. } => "create_folder",
            ActionRequest::UploadFile { .. } => "upload_file",
            ActionRequest::ListUploads { .. } => "list_uploads",
            ActionRequest::DeleteUpload { .. } => "delete_upload",
            ActionRequest::GetUploadInfo {} => "get_upload_info",
        }
    }

    /// Actions served by the file browser and upload utility rather than the
    /// panel core.
    pub fn is_collaborator(&self) -> bool {
        matches!(
            self,
            ActionRequest::GetFiles { .. }
                | ActionRequest::ReadFile { .. }
                | ActionRequest::WriteFile { .. }
                | ActionRequest::DeleteFile { .. }
                | ActionRequest::CreateFolder { .. }
                | ActionRequest::UploadFile { .. }
                | ActionRequest::ListUploads { .. }
                | ActionRequest::DeleteUpload { .. }
                | ActionRequest::GetUploadInfo {}
        )
    }
}
