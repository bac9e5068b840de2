use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::{oneshot, Mutex, Notify};
use tokio::task::JoinHandle;

use crate::config::{AppConfig, CONFIG_FILE};
use crate::drivers::websocket::BroadcastHub;
use crate::drivers::GracefulShutdown;
use crate::management::{Panel, PanelInput, Scheduler};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Extra time granted to the panel after the server's own shutdown timeout.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

pub struct ApplicationState {
    pub config: Arc<AppConfig>,
    pub hub: Arc<BroadcastHub>,
    pub panel: UnboundedSender<PanelInput>,
    pub stop_notify: Arc<Notify>,
    pub ws_connections: Mutex<Vec<JoinHandle<()>>>,
    pub started: DateTime<Utc>,
}
pub type AppState = Arc<ApplicationState>;

pub async fn run_app() -> anyhow::Result<()> {
    let config = Arc::new(AppConfig::load(CONFIG_FILE)?);
    debug!("config loaded from {}", CONFIG_FILE);
    info!(
        "managing \"{}\" in {} ({:?} mode)",
        config.minecraft.server_name,
        config.minecraft.work_dir.display(),
        config.minecraft.start_mode
    );

    let hub = Arc::new(BroadcastHub::new());
    let panel = Panel::new(config.clone(), hub.clone());
    panel.attach_hub();
    let panel_tx = panel.sender();
    let _scheduler = Scheduler::start(&config.monitoring, panel_tx.clone());
    let panel_task = tokio::spawn(panel.run());

    let state = Arc::new(ApplicationState {
        config: config.clone(),
        hub,
        panel: panel_tx.clone(),
        stop_notify: Arc::new(Notify::new()),
        ws_connections: Mutex::new(vec![]),
        started: Utc::now(),
    });

    let mut gs = GracefulShutdown::new();
    config
        .drivers
        .enabled
        .iter()
        .for_each(|driver_type| gs.add_driver(driver_type.new_driver(state.clone())));
    gs.watch(state.stop_notify.clone()).await;

    let (done, stopped) = oneshot::channel();
    if panel_tx.send(PanelInput::Shutdown { done }).is_ok() {
        let wait = config.minecraft.shutdown_timeout() + SHUTDOWN_GRACE;
        match tokio::time::timeout(wait, stopped).await {
            Ok(_) => debug!("panel stopped"),
            Err(_) => warn!("server did not stop within {:?}, leaving it behind", wait),
        }
    }
    panel_task.abort();

    info!("Bye.");
    Ok(())
}
