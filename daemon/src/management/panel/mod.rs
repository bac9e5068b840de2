mod actions;

use axum::extract::ws::Message;
use chrono::Utc;
use log::{debug, info};
use mcpanel_protocol::management::server::{PlayerStats, Position, ServerStatus, StatsCause};
use mcpanel_protocol::status::{HostInfo, SystemInfo};
use mcpanel_protocol::v1::event::{
    Announcement, Envelope, InitData, LogEntry, LogLevel, NotificationLevel, PlayerSnapshot,
};
use std::ops::ControlFlow;
use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;

use super::announcements::Announcements;
use super::comm::{OutputStream, ProcessEvent, ProcessMessage};
use super::minecraft::{LogEvent, LogEventExtractor, PlayerStateStore, TeleportTarget};
use super::scheduler::{Tick, Timer};
use super::supervisor::{ProcessSupervisor, SupervisorOutput};
use crate::config::AppConfig;
use crate::drivers::websocket::BroadcastHub;
use crate::protocols::v1::{parse_action, position_query};
use crate::utils::status::HostSampler;
use crate::utils::{BoundedFifo, Event, ListenerId, TListener};

/// Everything the panel loop reacts to, in arrival order.
pub enum PanelInput {
    Process(ProcessMessage),
    Timer(Timer),
    Tick(Tick),
    Connect {
        id: usize,
        sender: UnboundedSender<Message>,
    },
    Inbound {
        id: usize,
        text: String,
    },
    Disconnect {
        id: usize,
    },
    /// Stop the server gracefully, then end the loop and signal `done`.
    Shutdown {
        done: oneshot::Sender<()>,
    },
}

impl From<ProcessMessage> for PanelInput {
    fn from(message: ProcessMessage) -> Self {
        PanelInput::Process(message)
    }
}

/// State changes published by the panel.
#[derive(Debug, Clone, PartialEq)]
pub enum PanelEvent {
    StatusChanged(ServerStatus),
    Log(LogEntry),
    HistoryCleared,
    PlayersChanged(PlayerSnapshot),
    PositionChanged {
        player: String,
        position: Position,
    },
    StatsChanged {
        player: String,
        stats: PlayerStats,
        cause: StatsCause,
    },
    Notification {
        level: NotificationLevel,
        message: String,
    },
    AnnouncementsChanged(Vec<Announcement>),
    System(SystemInfo),
}

impl From<&PanelEvent> for Envelope {
    fn from(event: &PanelEvent) -> Self {
        match event.clone() {
            PanelEvent::StatusChanged(status) => Envelope::Status {
                running: status.is_running(),
                status,
            },
            PanelEvent::Log(entry) => Envelope::Log(entry),
            PanelEvent::HistoryCleared => Envelope::Clear {},
            PanelEvent::PlayersChanged(snapshot) => Envelope::PlayerUpdate(snapshot),
            PanelEvent::PositionChanged { player, position } => {
                Envelope::PositionUpdate { player, position }
            }
            PanelEvent::StatsChanged {
                player,
                stats,
                cause,
            } => Envelope::PlayerStatsUpdate {
                player,
                stats,
                event: cause,
            },
            PanelEvent::Notification { level, message } => {
                Envelope::Notification { level, message }
            }
            PanelEvent::AnnouncementsChanged(announcements) => {
                Envelope::AnnouncementsUpdate { announcements }
            }
            PanelEvent::System(data) => Envelope::System { data },
        }
    }
}

/// The single control timeline: owns the supervisor, the player store,
/// the extractor, the console history and the announcements, and handles
/// one [`PanelInput`] at a time.
pub struct Panel {
    config: Arc<AppConfig>,
    hub: Arc<BroadcastHub>,
    tx: UnboundedSender<PanelInput>,
    rx: UnboundedReceiver<PanelInput>,

    supervisor: ProcessSupervisor,
    players: PlayerStateStore,
    extractor: LogEventExtractor,
    history: BoundedFifo<LogEntry>,
    announcements: Announcements,
    events: Event<PanelEvent>,

    host: HostInfo,
    /// latest "There are N of a max of M" reply
    reported_count: Option<(u32, u32)>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl Panel {
    pub fn new(config: Arc<AppConfig>, hub: Arc<BroadcastHub>) -> Self {
        let (tx, rx) = unbounded_channel();
        Self {
            supervisor: ProcessSupervisor::new(config.minecraft.clone(), tx.clone()),
            history: BoundedFifo::new(config.console.max_history),
            config,
            hub,
            tx,
            rx,
            players: PlayerStateStore::new(),
            extractor: LogEventExtractor::new(),
            announcements: Announcements::new(),
            events: Event::new(),
            host: HostSampler::new().sample(),
            reported_count: None,
            shutdown: None,
        }
    }

    pub fn sender(&self) -> UnboundedSender<PanelInput> {
        self.tx.clone()
    }

    pub fn events(&self) -> &Event<PanelEvent> {
        &self.events
    }

    /// Forwards every panel event to the authenticated subscribers.
    pub fn attach_hub(&self) -> Option<ListenerId> {
        let hub = self.hub.clone();
        self.events.add_listener(
            move |event: &PanelEvent| hub.broadcast(&Envelope::from(event)),
            TListener::Simple,
        )
    }

    pub async fn run(mut self) {
        info!("panel loop started");
        while let Some(input) = self.rx.recv().await {
            if self.handle(input).is_break() {
                break;
            }
        }
        info!("panel loop stopped");
    }

    fn handle(&mut self, input: PanelInput) -> ControlFlow<()> {
        match input {
            PanelInput::Process(ProcessMessage { generation, event }) => match event {
                ProcessEvent::Output { stream, line } => self.on_output(generation, stream, line),
                ProcessEvent::Exited { code } => {
                    self.supervisor.on_exit(generation, code);
                    self.apply_supervisor();
                    return self.finish_shutdown_if_idle();
                }
                ProcessEvent::Failed { message } => {
                    self.supervisor.on_process_error(generation, &message);
                    self.apply_supervisor();
                    return self.finish_shutdown_if_idle();
                }
            },
            PanelInput::Timer(timer) => {
                self.supervisor.on_timer(timer);
                self.apply_supervisor();
            }
            PanelInput::Tick(tick) => self.on_tick(tick),
            PanelInput::Connect { id, sender } => {
                self.hub.insert(id, sender);
                debug!("subscriber {} connected ({} open)", id, self.hub.len());
                self.hub.send_to(id, &Envelope::AuthRequired {});
            }
            PanelInput::Inbound { id, text } => {
                if let Some(action) = parse_action(&text) {
                    self.on_action(id, action);
                }
            }
            PanelInput::Disconnect { id } => {
                debug!("subscriber {} disconnected", id);
                self.hub.remove(id);
            }
            PanelInput::Shutdown { done } => {
                self.shutdown = Some(done);
                if self.supervisor.is_running() {
                    info!("stopping the server before exit");
                    let _ = self.supervisor.stop();
                    self.apply_supervisor();
                }
                return self.finish_shutdown_if_idle();
            }
        }
        ControlFlow::Continue(())
    }

    fn finish_shutdown_if_idle(&mut self) -> ControlFlow<()> {
        if self.supervisor.is_running() {
            return ControlFlow::Continue(());
        }
        match self.shutdown.take() {
            Some(done) => {
                let _ = done.send(());
                ControlFlow::Break(())
            }
            None => ControlFlow::Continue(()),
        }
    }

    fn on_output(&mut self, generation: u64, stream: OutputStream, line: String) {
        let events = self.extractor.parse_line(&line);
        // replies to the silent position polls stay out of the console
        let poll_reply = events
            .iter()
            .any(|e| matches!(e, LogEvent::Position { .. } | LogEvent::Dimension { .. }));
        if !poll_reply {
            let level = match stream {
                OutputStream::Stdout => LogLevel::Stdout,
                OutputStream::Stderr => LogLevel::Stderr,
            };
            self.push_log(level, line);
        }

        if generation != self.supervisor.generation() {
            debug!("output of stale generation {} not interpreted", generation);
            return;
        }
        for event in events {
            self.apply_log_event(event);
        }
    }

    fn apply_log_event(&mut self, event: LogEvent) {
        match event {
            LogEvent::PlayerJoin { player } => {
                if self.players.add_player(&player) {
                    self.notify(NotificationLevel::Info, format!("{} joined the server", player));
                    self.players_changed();
                }
            }
            LogEvent::PlayerLeave { player } => {
                if self.players.remove_player(&player) {
                    self.notify(NotificationLevel::Warn, format!("{} left the server", player));
                    self.players_changed();
                }
            }
            LogEvent::PlayerCount { online, max } => self.reported_count = Some((online, max)),
            LogEvent::PlayerList { players } => {
                if self.players.sync_player_list(&players) {
                    self.players_changed();
                }
            }
            LogEvent::Position { player, x, y, z } => {
                if self.players.update_position(&player, x, y, z, None) {
                    self.position_changed(&player);
                }
            }
            LogEvent::Teleport { player, target } => match target {
                TeleportTarget::Player(to) => {
                    self.notify(
                        NotificationLevel::Info,
                        format!("{} teleported to {}", player, to),
                    );
                }
                TeleportTarget::Coords { x, y, z } => {
                    self.notify(
                        NotificationLevel::Info,
                        format!("{} teleported to {}, {}, {}", player, x, y, z),
                    );
                    if self.players.update_position(&player, x, y, z, None) {
                        self.position_changed(&player);
                    }
                }
            },
            LogEvent::Dimension { player, world } => {
                if self.players.update_world(&player, &world) {
                    self.position_changed(&player);
                }
            }
            LogEvent::Death { player, message } => {
                if self.players.record_death(&player) {
                    self.stats_changed(&player, StatsCause::Death);
                }
                self.notify(NotificationLevel::Warn, format!("💀 {}", message));
            }
            LogEvent::Kill { killer, .. } => {
                if self.players.record_kill(&killer) {
                    self.stats_changed(&killer, StatsCause::Kill);
                }
            }
            LogEvent::Achievement {
                player,
                achievement,
            } => {
                if self.players.record_achievement(&player, &achievement) {
                    self.stats_changed(&player, StatsCause::Achievement);
                }
                self.notify(
                    NotificationLevel::Success,
                    format!("🏆 {} earned: {}", player, achievement),
                );
            }
            LogEvent::Command { player } => {
                self.players.record_command(&player);
            }
            LogEvent::ServerOverload => {
                self.notify(NotificationLevel::Error, "Server is overloaded!");
            }
            LogEvent::ServerReady => {
                self.supervisor.mark_online();
                self.apply_supervisor();
            }
            LogEvent::ServerStopping => {
                self.supervisor.on_server_stopping();
                self.apply_supervisor();
            }
            LogEvent::Line { .. } => {}
        }
    }

    fn on_tick(&mut self, tick: Tick) {
        match tick {
            Tick::System(host) => {
                self.host = host;
                self.emit(PanelEvent::System(self.system_info()));
            }
            Tick::Positions => {
                if self.supervisor.status() == ServerStatus::Online {
                    self.poll_positions();
                }
            }
            Tick::PlayTime => self.players.update_play_times(),
        }
    }

    fn poll_positions(&mut self) {
        let queries: Vec<String> = self
            .players
            .players()
            .iter()
            .map(|player| position_query(player))
            .collect();
        for query in queries {
            self.supervisor.send_silent(&query);
        }
    }

    /// Applies the side effects queued by the last supervisor calls.
    fn apply_supervisor(&mut self) {
        for output in self.supervisor.take_outputs() {
            match output {
                SupervisorOutput::Log(level, text) => self.push_log(level, text),
                SupervisorOutput::Status(status) => self.emit(PanelEvent::StatusChanged(status)),
                SupervisorOutput::Notify(level, message) => self.notify(level, message),
                SupervisorOutput::RosterReset => {
                    self.players.reset();
                    self.reported_count = None;
                    self.players_changed();
                }
            }
        }
    }

    fn system_info(&self) -> SystemInfo {
        let minecraft = &self.config.minecraft;
        SystemInfo {
            host: self.host.clone(),
            server_uptime: self.supervisor.uptime_secs(Utc::now()),
            server_running: self.supervisor.is_running(),
            status: self.supervisor.status(),
            players: self.players.players().to_vec(),
            online_players: self.reported_count.map(|(online, _)| online),
            max_players: self
                .reported_count
                .map(|(_, max)| max)
                .unwrap_or(minecraft.max_players),
            dynmap_url: self.config.dynmap.url.clone(),
        }
    }

    fn init_data(&self) -> InitData {
        InitData {
            server_name: self.config.minecraft.server_name.clone(),
            work_dir: self.config.minecraft.work_dir.display().to_string(),
            dynmap_url: self.config.dynmap.url.clone(),
            system: self.system_info(),
            server_running: self.supervisor.is_running(),
            status: self.supervisor.status(),
            players: self.players.snapshot(),
            announcements: self.announcements.to_vec(),
        }
    }

    fn push_log(&mut self, level: LogLevel, text: String) {
        let entry = LogEntry::now(level, text);
        self.history.push(entry.clone());
        self.emit(PanelEvent::Log(entry));
    }

    fn notify(&mut self, level: NotificationLevel, message: impl Into<String>) {
        self.emit(PanelEvent::Notification {
            level,
            message: message.into(),
        });
    }

    fn players_changed(&mut self) {
        self.emit(PanelEvent::PlayersChanged(self.players.snapshot()));
    }

    fn position_changed(&mut self, player: &str) {
        if let Some(position) = self.players.position(player) {
            self.emit(PanelEvent::PositionChanged {
                player: player.to_string(),
                position: position.clone(),
            });
        }
    }

    fn stats_changed(&mut self, player: &str, cause: StatsCause) {
        if let Some(stats) = self.players.stats(player) {
            self.emit(PanelEvent::StatsChanged {
                player: player.to_string(),
                stats: stats.clone(),
                cause,
            });
        }
    }

    fn emit(&self, event: PanelEvent) {
        self.events.invoke(&event);
    }
}

#[cfg(test)]
mod tests;
