use log::{debug, info};
use mcpanel_protocol::management::server::{PlayerStats, ServerStatus};
use mcpanel_protocol::v1::action::ActionRequest;
use mcpanel_protocol::v1::event::{Envelope, NotificationLevel};

use super::{Panel, PanelEvent};
use crate::management::supervisor::SupervisorError;
use crate::protocols::v1::{
    announcement_text, broadcast_commands, console_command, give_command, teleport_command,
};

impl Panel {
    pub(super) fn on_action(&mut self, id: usize, action: ActionRequest) {
        if let ActionRequest::Auth { password } = &action {
            self.authenticate(id, password);
            return;
        }
        if !self.hub.is_authenticated(id) {
            debug!("dropped {} from unauthenticated subscriber {}", action.name(), id);
            return;
        }
        if action.is_collaborator() {
            self.reply_error(id, action.name(), "not available on this daemon");
            return;
        }

        let name = action.name();
        match action {
            ActionRequest::Start {} => {
                let _ = self.supervisor.start();
            }
            ActionRequest::Stop {} => {
                let _ = self.supervisor.stop();
            }
            ActionRequest::Restart {} => {
                let _ = self.supervisor.restart();
            }
            ActionRequest::Kill {} => {
                let _ = self.supervisor.kill();
            }
            ActionRequest::Command { command } => match console_command(&command) {
                Ok(command) => {
                    let _ = self.supervisor.send_command(command);
                }
                Err(err) => self.reply_error(id, name, err),
            },
            ActionRequest::Clear {} => {
                self.history.clear();
                self.emit(PanelEvent::HistoryCleared);
            }

            ActionRequest::GetSystem {} => {
                let data = self.system_info();
                self.hub.send_to(id, &Envelope::System { data });
            }
            ActionRequest::GetPositions {} => {
                if self.supervisor.status() == ServerStatus::Online {
                    self.poll_positions();
                }
            }
            ActionRequest::GetPlayerStats { player } => {
                if let Some(player) = player {
                    let stats = self
                        .players
                        .stats(&player)
                        .cloned()
                        .unwrap_or_else(PlayerStats::empty);
                    self.hub
                        .send_to(id, &Envelope::PlayerStats { player, stats });
                }
            }
            ActionRequest::GetDynmapInfo {} => {
                let url = self.config.dynmap.url.clone();
                self.hub.send_to(id, &Envelope::DynmapInfo { url });
            }

            ActionRequest::TeleportPlayer {
                from_player,
                to_player,
            } => match teleport_command(&from_player, &to_player) {
                Ok(command) => {
                    if let Err(err) = self.supervisor.send_command(&command) {
                        self.reply_error(id, name, err);
                    }
                }
                Err(err) => self.reply_error(id, name, err),
            },
            ActionRequest::BroadcastMsg { message } => match broadcast_commands(&message) {
                Ok(commands) => {
                    if !self.supervisor.is_running() {
                        self.reply_error(id, name, SupervisorError::NotRunning);
                    } else {
                        for command in &commands {
                            self.supervisor.send_silent(command);
                        }
                        info!("broadcast sent: {}", message.trim());
                        self.notify(NotificationLevel::Success, "Broadcast sent");
                    }
                }
                Err(err) => self.reply_error(id, name, err),
            },
            ActionRequest::AddAnnouncement { text, kind } => match announcement_text(&text) {
                Ok(text) => {
                    self.announcements.add(text, kind.as_deref());
                    self.emit(PanelEvent::AnnouncementsChanged(self.announcements.to_vec()));
                }
                Err(err) => self.reply_error(id, name, err),
            },
            ActionRequest::RemoveAnnouncement { id: announcement } => {
                if self.announcements.remove(announcement) {
                    self.emit(PanelEvent::AnnouncementsChanged(self.announcements.to_vec()));
                } else {
                    debug!("announcement {} does not exist", announcement);
                }
            }
            ActionRequest::GiveItem {
                player,
                item,
                amount,
            } => match give_command(&player, &item, amount) {
                Ok(command) => match self.supervisor.send_command(&command) {
                    Ok(()) => self.notify(
                        NotificationLevel::Success,
                        format!("Gave {} x{} to {}", item, amount, player),
                    ),
                    Err(err) => self.reply_error(id, name, err),
                },
                Err(err) => self.reply_error(id, name, err),
            },

            // handled above
            ActionRequest::Auth { .. }
            | ActionRequest::GetFiles { .. }
            | ActionRequest::ReadFile { .. }
            | ActionRequest::WriteFile { .. }
            | ActionRequest::DeleteFile { .. }
            | ActionRequest::CreateFolder { .. }
            | ActionRequest::UploadFile { .. }
            | ActionRequest::ListUploads { .. }
            | ActionRequest::DeleteUpload { .. }
            | ActionRequest::GetUploadInfo {} => {}
        }
        self.apply_supervisor();
    }

    fn authenticate(&mut self, id: usize, password: &str) {
        if !self.config.auth.verify(password) {
            info!("subscriber {} failed to authenticate", id);
            self.hub.send_to(id, &Envelope::AuthFailed {});
            return;
        }
        if !self.hub.authenticate(id) {
            debug!("auth from unknown subscriber {}", id);
            return;
        }

        info!(
            "subscriber {} authenticated ({} authenticated)",
            id,
            self.hub.authenticated_count()
        );
        self.hub.send_to(id, &Envelope::AuthSuccess {});
        self.hub
            .send_to(id, &Envelope::Init(Box::new(self.init_data())));
        for entry in self.history.tail(self.config.console.max_display_lines) {
            self.hub.send_to(id, &Envelope::Log(entry.clone()));
        }
        if self.supervisor.is_running() {
            self.supervisor.schedule_roster_refresh();
        }
    }

    fn reply_error(&self, id: usize, action: &str, err: impl ToString) {
        let message = err.to_string();
        debug!("{} rejected for subscriber {}: {}", action, id, message);
        self.hub.send_to(
            id,
            &Envelope::Error {
                action: action.to_string(),
                message,
            },
        );
    }
}
