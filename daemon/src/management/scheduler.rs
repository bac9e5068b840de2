use log::debug;
use mcpanel_protocol::status::HostInfo;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, MissedTickBehavior};

use super::panel::PanelInput;
use crate::config::MonitoringConfig;
use crate::utils::status::HostSampler;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// forces `starting -> online` when no ready line showed up
    StartupFallback,
    /// `list` after the server came online
    RosterRefresh,
    /// `stop` after `save-all`
    GracefulStop,
    /// terminate a server that ignored `stop`
    ForceKill,
    /// launch after the exit of a restart
    RestartStart,
}

/// A deferred action for the launch `generation`. Timers are never
/// cancelled, the receiver checks that the launch is still current.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timer {
    pub kind: TimerKind,
    pub generation: u64,
}

impl Timer {
    pub fn new(kind: TimerKind, generation: u64) -> Self {
        Self { kind, generation }
    }
}

/// Posts one-shot timers back into the panel loop.
#[derive(Clone)]
pub struct Timers {
    tx: UnboundedSender<PanelInput>,
}

impl Timers {
    pub fn new(tx: UnboundedSender<PanelInput>) -> Self {
        Self { tx }
    }

    pub fn defer(&self, delay: Duration, timer: Timer) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            sleep(delay).await;
            if tx.send(PanelInput::Timer(timer)).is_err() {
                debug!("{:?} fired after the panel stopped", timer.kind);
            }
        });
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Tick {
    System(HostInfo),
    Positions,
    PlayTime,
}

/// The three periodic drivers of the panel. They run independently and stop
/// when the panel's channel closes or the scheduler is dropped.
pub struct Scheduler {
    tasks: Vec<JoinHandle<()>>,
}

impl Scheduler {
    pub fn start(config: &MonitoringConfig, tx: UnboundedSender<PanelInput>) -> Self {
        let system = {
            let tx = tx.clone();
            let period = config.system_update_interval();
            tokio::spawn(async move {
                let mut sampler = HostSampler::new();
                let mut ticker = interval(period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    if tx.send(PanelInput::Tick(Tick::System(sampler.sample()))).is_err() {
                        break;
                    }
                }
            })
        };

        let positions = Self::every(config.position_update_interval(), tx.clone(), || {
            Tick::Positions
        });
        let play_time = Self::every(config.play_time_update_interval(), tx, || Tick::PlayTime);

        Self {
            tasks: vec![system, positions, play_time],
        }
    }

    fn every<F>(period: Duration, tx: UnboundedSender<PanelInput>, tick: F) -> JoinHandle<()>
    where
        F: Fn() -> Tick + Send + 'static,
    {
        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if tx.send(PanelInput::Tick(tick())).is_err() {
                    break;
                }
            }
        })
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}
