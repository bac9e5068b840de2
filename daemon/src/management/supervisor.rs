use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use mcpanel_protocol::management::server::ServerStatus;
use mcpanel_protocol::v1::event::{LogLevel, NotificationLevel};
use std::io;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;

use super::comm::ProcessHandle;
use super::config::{LaunchError, MinecraftConfig};
use super::panel::PanelInput;
use super::scheduler::{Timer, TimerKind, Timers};
use crate::utils::{Event, TListener};

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("server is already running")]
    AlreadyRunning,
    #[error("server is not running")]
    NotRunning,
    #[error(transparent)]
    Precondition(#[from] LaunchError),
    #[error("could not spawn server process: {0}")]
    Spawn(#[source] io::Error),
    #[error("commands must fit on a single line")]
    InvalidCommand,
}

/// Side effects of a supervisor call, drained and applied by the panel.
#[derive(Debug, Clone, PartialEq)]
pub enum SupervisorOutput {
    Log(LogLevel, String),
    Status(ServerStatus),
    Notify(NotificationLevel, String),
    /// roster and positions must be cleared, stats stay
    RosterReset,
}

/// Lifecycle state machine of the server process.
///
/// `handle` is present exactly when `status` is not offline. Every launch
/// bumps `generation`; timers and process signals of older launches are
/// ignored.
pub struct ProcessSupervisor {
    config: MinecraftConfig,
    timers: Timers,
    process_tx: UnboundedSender<PanelInput>,

    status: ServerStatus,
    handle: Option<ProcessHandle>,
    started_at: Option<DateTime<Utc>>,
    last_exit_code: Option<i32>,
    generation: u64,

    exited: Event<Option<i32>>,
    outputs: Vec<SupervisorOutput>,
}

impl ProcessSupervisor {
    pub fn new(config: MinecraftConfig, process_tx: UnboundedSender<PanelInput>) -> Self {
        Self {
            config,
            timers: Timers::new(process_tx.clone()),
            process_tx,
            status: ServerStatus::Offline,
            handle: None,
            started_at: None,
            last_exit_code: None,
            generation: 0,
            exited: Event::new(),
            outputs: vec![],
        }
    }

    pub fn status(&self) -> ServerStatus {
        self.status
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Whole seconds since the current launch, 0 when offline.
    pub fn uptime_secs(&self, now: DateTime<Utc>) -> u64 {
        self.started_at
            .map(|started| (now - started).num_seconds().max(0) as u64)
            .unwrap_or(0)
    }

    pub fn last_exit_code(&self) -> Option<i32> {
        self.last_exit_code
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Fired once per launch with the exit code, after the transition to
    /// offline.
    pub fn exited(&self) -> &Event<Option<i32>> {
        &self.exited
    }

    pub fn take_outputs(&mut self) -> Vec<SupervisorOutput> {
        std::mem::take(&mut self.outputs)
    }

    pub fn start(&mut self) -> Result<(), SupervisorError> {
        if self.handle.is_some() {
            self.log(LogLevel::Warn, "Server is already running");
            return Err(SupervisorError::AlreadyRunning);
        }

        let info = match self.config.start_info() {
            Ok(info) => info,
            Err(err) => return self.fail(err.into()),
        };

        let generation = self.generation + 1;
        let handle = match ProcessHandle::spawn(&info, generation, self.process_tx.clone()) {
            Ok(handle) => handle,
            Err(err) => return self.fail(SupervisorError::Spawn(err)),
        };

        info!(
            "launched server (pid={:?}, generation={}): {}",
            handle.pid(),
            generation,
            info.command_line()
        );
        self.log(LogLevel::Info, format!("Starting: {}", info.command_line()));
        self.on_launched(handle);
        Ok(())
    }

    fn on_launched(&mut self, handle: ProcessHandle) {
        self.generation = handle.generation();
        self.handle = Some(handle);
        self.started_at = Some(Utc::now());
        self.outputs.push(SupervisorOutput::RosterReset);
        self.set_status(ServerStatus::Starting);
        self.notify(NotificationLevel::Info, "Server is starting...");

        self.timers.defer(
            self.config.startup_delay(),
            Timer::new(TimerKind::StartupFallback, self.generation),
        );
    }

    /// `starting -> online`, from the ready line or the startup fallback.
    /// Returns `false` when the server was not starting.
    pub fn mark_online(&mut self) -> bool {
        if self.status != ServerStatus::Starting || self.handle.is_none() {
            debug!("ignored online transition while {:?}", self.status);
            return false;
        }

        self.set_status(ServerStatus::Online);
        self.log(LogLevel::Success, "Server is ready");
        self.notify(NotificationLevel::Success, "Server is ready!");
        self.timers.defer(
            self.config.roster_refresh_delay(),
            Timer::new(TimerKind::RosterRefresh, self.generation),
        );
        true
    }

    /// Asks for a fresh `list` reply, only acted upon while online.
    pub fn schedule_roster_refresh(&self) {
        self.timers.defer(
            self.config.roster_refresh_delay(),
            Timer::new(TimerKind::RosterRefresh, self.generation),
        );
    }

    /// The server announced its own shutdown.
    pub fn on_server_stopping(&mut self) {
        if matches!(self.status, ServerStatus::Starting | ServerStatus::Online) {
            self.set_status(ServerStatus::Stopping);
            self.log(LogLevel::Warn, "Server is shutting down");
        }
    }

    pub fn stop(&mut self) -> Result<(), SupervisorError> {
        match self.status {
            ServerStatus::Offline => {
                self.log(LogLevel::Warn, "Server is not running");
                Err(SupervisorError::NotRunning)
            }
            ServerStatus::Stopping => {
                debug!("stop requested while already stopping");
                Ok(())
            }
            ServerStatus::Starting | ServerStatus::Online => {
                self.log(LogLevel::Warn, "Stopping server...");
                self.set_status(ServerStatus::Stopping);
                self.notify(NotificationLevel::Warn, "Server is stopping...");

                self.write("save-all");
                self.timers.defer(
                    self.config.stop_command_delay(),
                    Timer::new(TimerKind::GracefulStop, self.generation),
                );
                self.timers.defer(
                    self.config.shutdown_timeout(),
                    Timer::new(TimerKind::ForceKill, self.generation),
                );
                Ok(())
            }
        }
    }

    /// Hard kill, bypassing the graceful path.
    pub fn kill(&mut self) -> Result<(), SupervisorError> {
        let Some(handle) = &self.handle else {
            self.log(LogLevel::Warn, "Server is not running");
            return Err(SupervisorError::NotRunning);
        };
        warn!("killing server (pid={:?})", handle.pid());
        handle.kill();
        self.log(LogLevel::Error, "Server killed!");
        self.notify(NotificationLevel::Error, "Server killed!");
        Ok(())
    }

    /// Stops a running server and launches it again `restart_delay` after
    /// it exited; starts an offline one right away.
    pub fn restart(&mut self) -> Result<(), SupervisorError> {
        self.log(LogLevel::Info, "Restarting server...");
        self.notify(NotificationLevel::Info, "Restarting server...");

        if self.handle.is_none() {
            return self.start();
        }

        let timers = self.timers.clone();
        let delay = self.config.restart_delay();
        let generation = self.generation;
        self.exited.add_listener(
            move |_| timers.defer(delay, Timer::new(TimerKind::RestartStart, generation)),
            TListener::once(),
        );
        self.stop()
    }

    /// Writes one command line to the server, recorded in the console.
    pub fn send_command(&mut self, command: &str) -> Result<(), SupervisorError> {
        if command.contains(['\n', '\r']) {
            return Err(SupervisorError::InvalidCommand);
        }
        if self.handle.is_none() {
            self.log(LogLevel::Warn, "Server is not running");
            return Err(SupervisorError::NotRunning);
        }
        self.log(LogLevel::Command, format!("> {}", command));
        self.write(command);
        Ok(())
    }

    /// Writes a command without recording it, for periodic polls.
    pub fn send_silent(&mut self, command: &str) -> bool {
        if command.contains(['\n', '\r']) {
            return false;
        }
        self.write(command)
    }

    pub fn on_timer(&mut self, timer: Timer) {
        if timer.generation != self.generation {
            debug!(
                "stale {:?} for generation {} (current {})",
                timer.kind, timer.generation, self.generation
            );
            return;
        }

        match timer.kind {
            TimerKind::StartupFallback => {
                if self.status == ServerStatus::Starting {
                    info!("no ready line within the startup delay, assuming online");
                    self.mark_online();
                }
            }
            TimerKind::RosterRefresh => {
                if self.status == ServerStatus::Online {
                    self.write("list");
                }
            }
            TimerKind::GracefulStop => {
                if self.status == ServerStatus::Stopping {
                    self.write("stop");
                }
            }
            TimerKind::ForceKill => {
                if let Some(handle) = &self.handle {
                    warn!(
                        "server did not exit within {:?}, terminating",
                        self.config.shutdown_timeout()
                    );
                    handle.terminate();
                    self.log(LogLevel::Warn, "Server did not stop in time, terminating");
                }
            }
            TimerKind::RestartStart => {
                if self.handle.is_none() {
                    // failures are already logged and notified
                    let _ = self.start();
                }
            }
        }
    }

    /// Natural exit of the launch `generation`.
    pub fn on_exit(&mut self, generation: u64, code: Option<i32>) {
        if !self.owns(generation) {
            debug!("exit of stale generation {} ignored", generation);
            return;
        }
        let was = self.status;
        self.clear_process();
        self.last_exit_code = code;

        match code {
            Some(0) => {
                info!("server exited normally");
                self.log(LogLevel::Success, "Server stopped (code: 0)");
                self.notify(NotificationLevel::Success, "Server stopped (code: 0)");
            }
            Some(code) => {
                warn!("server exited with code {} while {:?}", code, was);
                self.log(LogLevel::Error, format!("Server stopped (code: {})", code));
                self.notify(
                    NotificationLevel::Error,
                    format!("Server stopped (code: {})", code),
                );
            }
            None => {
                warn!("server was terminated by a signal while {:?}", was);
                let level = if was == ServerStatus::Stopping {
                    NotificationLevel::Warn
                } else {
                    NotificationLevel::Error
                };
                self.log(LogLevel::Warn, "Server terminated by signal");
                self.notify(level, "Server terminated by signal");
            }
        }

        self.exited.invoke(&code);
    }

    /// The OS failed the launch `generation` after spawning.
    pub fn on_process_error(&mut self, generation: u64, message: &str) {
        if !self.owns(generation) {
            debug!("error of stale generation {} ignored: {}", generation, message);
            return;
        }
        error!("server process failed: {}", message);
        self.clear_process();
        self.log(LogLevel::Error, format!("Process error: {}", message));
        self.notify(NotificationLevel::Error, format!("Process error: {}", message));
        self.exited.invoke(&None);
    }

    fn owns(&self, generation: u64) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| handle.generation() == generation)
    }

    fn clear_process(&mut self) {
        self.handle = None;
        self.started_at = None;
        self.outputs.push(SupervisorOutput::RosterReset);
        self.set_status(ServerStatus::Offline);
    }

    fn write(&self, command: &str) -> bool {
        match &self.handle {
            Some(handle) => handle.write_line(command),
            None => false,
        }
    }

    fn fail(&mut self, err: SupervisorError) -> Result<(), SupervisorError> {
        error!("could not start server: {}", err);
        self.log(LogLevel::Error, err.to_string());
        self.notify(NotificationLevel::Error, format!("Could not start: {}", err));
        Err(err)
    }

    fn set_status(&mut self, status: ServerStatus) {
        if self.status != status {
            info!("server status: {:?} -> {:?}", self.status, status);
            self.status = status;
            self.outputs.push(SupervisorOutput::Status(status));
        }
    }

    fn log(&mut self, level: LogLevel, text: impl Into<String>) {
        self.outputs.push(SupervisorOutput::Log(level, text.into()));
    }

    fn notify(&mut self, level: NotificationLevel, message: impl Into<String>) {
        self.outputs
            .push(SupervisorOutput::Notify(level, message.into()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    struct Fixture {
        supervisor: ProcessSupervisor,
        rx: UnboundedReceiver<PanelInput>,
    }

    impl Fixture {
        fn new() -> Self {
            let (tx, rx) = mpsc::unbounded_channel();
            let config = MinecraftConfig {
                work_dir: "/definitely/not/here".into(),
                ..Default::default()
            };
            Self {
                supervisor: ProcessSupervisor::new(config, tx),
                rx,
            }
        }

        /// Launches a detached process and returns its stdin.
        fn launch(&mut self) -> UnboundedReceiver<String> {
            let (handle, stdin) = ProcessHandle::detached(self.supervisor.generation() + 1);
            self.supervisor.on_launched(handle);
            stdin
        }

        /// Waits for the next timer and feeds it to the supervisor.
        async fn fire_next(&mut self) -> Timer {
            loop {
                if let Some(PanelInput::Timer(timer)) = self.rx.recv().await {
                    self.supervisor.on_timer(timer);
                    self.check_invariant();
                    return timer;
                }
            }
        }

        fn check_invariant(&self) {
            assert_eq!(
                self.supervisor.is_running(),
                self.supervisor.status() != ServerStatus::Offline
            );
            assert_eq!(
                self.supervisor.started_at().is_some(),
                self.supervisor.is_running()
            );
        }

        fn statuses(&mut self) -> Vec<ServerStatus> {
            self.supervisor
                .take_outputs()
                .into_iter()
                .filter_map(|o| match o {
                    SupervisorOutput::Status(s) => Some(s),
                    _ => None,
                })
                .collect()
        }
    }

    fn drain(stdin: &mut UnboundedReceiver<String>) -> Vec<String> {
        let mut lines = vec![];
        while let Ok(line) = stdin.try_recv() {
            lines.push(line);
        }
        lines
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_precondition_stays_offline() {
        let mut f = Fixture::new();
        let err = f.supervisor.start().unwrap_err();
        assert!(matches!(
            err,
            SupervisorError::Precondition(LaunchError::MissingDirectory(_))
        ));
        assert_eq!(f.supervisor.status(), ServerStatus::Offline);
        f.check_invariant();

        let outputs = f.supervisor.take_outputs();
        assert!(outputs
            .iter()
            .any(|o| matches!(o, SupervisorOutput::Notify(NotificationLevel::Error, _))));
        assert!(!outputs
            .iter()
            .any(|o| matches!(o, SupervisorOutput::Status(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_startup_fallback_then_roster_refresh() {
        let mut f = Fixture::new();
        let mut stdin = f.launch();
        f.check_invariant();
        assert_eq!(f.statuses(), [ServerStatus::Starting]);

        let timer = f.fire_next().await;
        assert_eq!(timer.kind, TimerKind::StartupFallback);
        assert_eq!(f.supervisor.status(), ServerStatus::Online);

        // ready line after the fallback is a no-op
        assert!(!f.supervisor.mark_online());
        assert_eq!(f.statuses(), [ServerStatus::Online]);

        assert_eq!(f.fire_next().await.kind, TimerKind::RosterRefresh);
        assert_eq!(drain(&mut stdin), ["list"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_line_wins_over_fallback() {
        let mut f = Fixture::new();
        let _stdin = f.launch();
        assert!(f.supervisor.mark_online());
        assert!(!f.supervisor.mark_online());

        // roster refresh (1s) fires before the fallback (10s), which is then a no-op
        assert_eq!(f.fire_next().await.kind, TimerKind::RosterRefresh);
        assert_eq!(f.fire_next().await.kind, TimerKind::StartupFallback);
        assert_eq!(f.supervisor.status(), ServerStatus::Online);
        assert_eq!(
            f.statuses(),
            [ServerStatus::Starting, ServerStatus::Online]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_graceful_stop_sequence() {
        let mut f = Fixture::new();
        let mut stdin = f.launch();
        f.supervisor.mark_online();
        drain(&mut stdin);

        f.supervisor.stop().unwrap();
        assert_eq!(f.supervisor.status(), ServerStatus::Stopping);
        assert_eq!(drain(&mut stdin), ["save-all"]);

        // roster refresh is pending too, it is skipped while stopping
        loop {
            let timer = f.fire_next().await;
            if timer.kind == TimerKind::GracefulStop {
                break;
            }
        }
        assert_eq!(drain(&mut stdin), ["stop"]);

        let generation = f.supervisor.generation();
        f.supervisor.on_exit(generation, Some(0));
        f.check_invariant();
        assert_eq!(f.supervisor.last_exit_code(), Some(0));
        let outputs = f.supervisor.take_outputs();
        assert!(outputs.contains(&SupervisorOutput::RosterReset));
        assert!(outputs.contains(&SupervisorOutput::Status(ServerStatus::Offline)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_force_kill_is_noop() {
        let mut f = Fixture::new();
        let _first = f.launch();
        f.supervisor.stop().unwrap();
        let first_generation = f.supervisor.generation();
        f.supervisor.on_exit(first_generation, Some(0));

        // next launch is running when the first launch's timers fire
        let _second = f.launch();
        assert_eq!(f.supervisor.generation(), first_generation + 1);
        f.supervisor.take_outputs();

        tokio::time::sleep(Duration::from_secs(25)).await;
        while let Ok(input) = f.rx.try_recv() {
            if let PanelInput::Timer(timer) = input {
                f.supervisor.on_timer(timer);
                f.check_invariant();
            }
        }
        // only the second launch's fallback acted
        assert_eq!(f.supervisor.status(), ServerStatus::Online);
        assert!(f.supervisor.is_running());
        assert!(!f
            .supervisor
            .take_outputs()
            .iter()
            .any(|o| matches!(o, SupervisorOutput::Log(_, text) if text.contains("terminating"))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exit_of_other_generation_is_ignored() {
        let mut f = Fixture::new();
        let _stdin = f.launch();
        let generation = f.supervisor.generation();

        f.supervisor.on_exit(generation + 1, Some(1));
        f.supervisor.on_process_error(generation - 1, "boom");
        assert!(f.supervisor.is_running());

        f.supervisor.on_exit(generation, None);
        f.check_invariant();
        f.supervisor.on_exit(generation, Some(0));
        assert_eq!(f.supervisor.last_exit_code(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_waits_for_exit() {
        let mut f = Fixture::new();
        let _stdin = f.launch();
        f.supervisor.mark_online();
        let generation = f.supervisor.generation();

        f.supervisor.restart().unwrap();
        assert_eq!(f.supervisor.status(), ServerStatus::Stopping);
        assert_eq!(f.supervisor.exited().listener_count(), 1);

        f.supervisor.on_exit(generation, Some(0));
        assert_eq!(f.supervisor.exited().listener_count(), 0);

        let timer = loop {
            let timer = f.fire_next().await;
            if timer.kind == TimerKind::RestartStart {
                break timer;
            }
        };
        assert_eq!(timer.generation, generation);
        // the relaunch fails on the missing work directory and stays offline
        assert_eq!(f.supervisor.status(), ServerStatus::Offline);
        assert!(f
            .supervisor
            .take_outputs()
            .iter()
            .any(|o| matches!(o, SupervisorOutput::Log(LogLevel::Error, text) if text.contains("does not exist"))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_start_skipped_when_started_meanwhile() {
        let mut f = Fixture::new();
        let _first = f.launch();
        f.supervisor.restart().unwrap();
        let generation = f.supervisor.generation();
        f.supervisor.on_exit(generation, Some(0));

        let _second = f.launch();
        tokio::time::sleep(Duration::from_secs(30)).await;
        while let Ok(input) = f.rx.try_recv() {
            if let PanelInput::Timer(timer) = input {
                f.supervisor.on_timer(timer);
            }
        }
        assert_eq!(f.supervisor.generation(), generation + 1);
        assert!(f.supervisor.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_commands_require_running_server() {
        let mut f = Fixture::new();
        assert!(matches!(
            f.supervisor.send_command("list"),
            Err(SupervisorError::NotRunning)
        ));
        assert!(matches!(f.supervisor.kill(), Err(SupervisorError::NotRunning)));
        assert!(matches!(f.supervisor.stop(), Err(SupervisorError::NotRunning)));

        let mut stdin = f.launch();
        assert!(matches!(
            f.supervisor.send_command("say hi\nop Bob"),
            Err(SupervisorError::InvalidCommand)
        ));
        f.supervisor.take_outputs();
        f.supervisor.send_command("say hi").unwrap();
        assert!(f.supervisor.send_silent("data get entity Bob Pos"));
        assert_eq!(drain(&mut stdin), ["say hi", "data get entity Bob Pos"]);
        assert_eq!(
            f.supervisor.take_outputs(),
            [SupervisorOutput::Log(LogLevel::Command, "> say hi".into())]
        );
        assert!(matches!(f.supervisor.start(), Err(SupervisorError::AlreadyRunning)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_announced_stop() {
        let mut f = Fixture::new();
        let _stdin = f.launch();
        f.supervisor.mark_online();
        f.supervisor.on_server_stopping();
        assert_eq!(f.supervisor.status(), ServerStatus::Stopping);
        f.check_invariant();
        f.supervisor.on_server_stopping();
        assert_eq!(
            f.statuses(),
            [
                ServerStatus::Starting,
                ServerStatus::Online,
                ServerStatus::Stopping
            ]
        );
    }
}
