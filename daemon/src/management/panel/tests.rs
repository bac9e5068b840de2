use super::*;
use crate::auth::AuthConfig;
use crate::management::config::{MinecraftConfig, StartMode};
use serde_json::Value;
use std::sync::Mutex;
use std::time::Duration;

const PASSWORD: &str = "s3cret";

fn config(minecraft: MinecraftConfig) -> Arc<AppConfig> {
    Arc::new(AppConfig {
        minecraft,
        auth: AuthConfig {
            password: PASSWORD.into(),
        },
        ..Default::default()
    })
}

fn panel() -> Panel {
    let panel = Panel::new(config(MinecraftConfig::default()), Arc::new(BroadcastHub::new()));
    panel.attach_hub();
    panel
}

fn types(rx: &mut UnboundedReceiver<Message>) -> Vec<Value> {
    let mut out = vec![];
    while let Ok(Message::Text(text)) = rx.try_recv() {
        out.push(serde_json::from_str(text.as_str()).unwrap());
    }
    out
}

fn type_names(values: &[Value]) -> Vec<String> {
    values
        .iter()
        .map(|v| v["type"].as_str().unwrap().to_string())
        .collect()
}

fn connect(panel: &mut Panel) -> (usize, UnboundedReceiver<Message>) {
    let (tx, rx) = unbounded_channel();
    let id = panel.hub.next_id();
    let _ = panel.handle(PanelInput::Connect { id, sender: tx });
    (id, rx)
}

fn send(panel: &mut Panel, id: usize, text: &str) {
    let _ = panel.handle(PanelInput::Inbound {
        id,
        text: text.to_string(),
    });
}

fn output(panel: &mut Panel, line: &str) {
    let generation = panel.supervisor.generation();
    panel.on_output(generation, OutputStream::Stdout, line.to_string());
}

fn recorded(panel: &Panel) -> Arc<Mutex<Vec<PanelEvent>>> {
    let seen = Arc::new(Mutex::new(vec![]));
    let sink = seen.clone();
    panel.events().add_listener(
        move |event: &PanelEvent| sink.lock().unwrap().push(event.clone()),
        TListener::Simple,
    );
    seen
}

#[tokio::test]
async fn test_unauthenticated_subscriber_gets_nothing() {
    let mut panel = panel();
    let (id, mut rx) = connect(&mut panel);
    assert_eq!(type_names(&types(&mut rx)), ["auth_required"]);

    send(&mut panel, id, r#"{"action":"clear"}"#);
    send(&mut panel, id, r#"{"action":"get_system"}"#);
    output(&mut panel, "hello");
    assert!(types(&mut rx).is_empty());

    send(&mut panel, id, r#"{"action":"auth","password":"wrong"}"#);
    assert_eq!(type_names(&types(&mut rx)), ["auth_failed"]);
    output(&mut panel, "still hidden");
    assert!(types(&mut rx).is_empty());
}

#[tokio::test]
async fn test_auth_sends_init_and_history() {
    let mut panel = panel();
    output(&mut panel, "first line");
    output(&mut panel, "second line");

    let (id, mut rx) = connect(&mut panel);
    types(&mut rx);
    send(&mut panel, id, &format!(r#"{{"action":"auth","password":"{}"}}"#, PASSWORD));

    let received = types(&mut rx);
    assert_eq!(
        type_names(&received),
        ["auth_success", "init", "log", "log"]
    );
    let init = &received[1];
    assert_eq!(init["server_name"], "Minecraft Server");
    assert_eq!(init["status"], "offline");
    assert_eq!(init["server_running"], false);
    assert_eq!(init["players"], serde_json::json!([]));
    assert_eq!(received[3]["text"], "second line");

    output(&mut panel, "live line");
    let live = types(&mut rx);
    assert_eq!(type_names(&live), ["log"]);
    assert_eq!(live[0]["level"], "stdout");
}

#[tokio::test]
async fn test_pvp_line_updates_both_players() {
    let mut panel = panel();
    panel.players.add_player("Alice");
    panel.players.add_player("Bob");
    let seen = recorded(&panel);

    output(
        &mut panel,
        "[12:00:01] [Server thread/INFO]: Bob was slain by Alice",
    );

    assert_eq!(panel.players.stats("Alice").unwrap().kills, 1);
    assert_eq!(panel.players.stats("Alice").unwrap().deaths, 0);
    assert_eq!(panel.players.stats("Bob").unwrap().deaths, 1);
    assert_eq!(panel.players.stats("Bob").unwrap().kills, 0);

    let causes: Vec<_> = seen
        .lock()
        .unwrap()
        .iter()
        .filter_map(|event| match event {
            PanelEvent::StatsChanged { player, cause, .. } => Some((player.clone(), *cause)),
            _ => None,
        })
        .collect();
    assert_eq!(
        causes,
        [
            ("Bob".to_string(), StatsCause::Death),
            ("Alice".to_string(), StatsCause::Kill)
        ]
    );
}

#[tokio::test]
async fn test_repeated_advancement_changes_stats_once() {
    let mut panel = panel();
    panel.players.add_player("Bob");
    let seen = recorded(&panel);

    output(&mut panel, "[Server thread/INFO]: Bob has made the advancement [Stone Age]");
    output(&mut panel, "[Server thread/INFO]: Bob has made the advancement [Stone Age]");

    assert_eq!(panel.players.stats("Bob").unwrap().achievements, ["Stone Age"]);
    let seen = seen.lock().unwrap();
    let stats_changes = seen
        .iter()
        .filter(|event| matches!(event, PanelEvent::StatsChanged { .. }))
        .count();
    let notifications = seen
        .iter()
        .filter(|event| matches!(event, PanelEvent::Notification { .. }))
        .count();
    assert_eq!(stats_changes, 1);
    assert_eq!(notifications, 2);
}

#[tokio::test]
async fn test_join_leave_and_roster_snapshot() {
    let mut panel = panel();
    let seen = recorded(&panel);

    output(&mut panel, "[Server thread/INFO]: Alice joined the game");
    output(&mut panel, "[Server thread/INFO]: Alice joined the game");
    output(&mut panel, "[Server thread/INFO]: Carol joined the game");
    assert_eq!(panel.players.players(), ["Alice", "Carol"]);

    output(
        &mut panel,
        "[Server thread/INFO]: There are 2 of a max of 30 players online: Alice, Bob",
    );
    assert_eq!(panel.players.players(), ["Alice", "Bob"]);
    assert!(panel.players.position("Carol").is_none());
    assert_eq!(panel.players.stats("Alice").unwrap().join_count, 1);

    let info = panel.system_info();
    assert_eq!(info.online_players, Some(2));
    assert_eq!(info.max_players, 30);

    output(&mut panel, "[Server thread/INFO]: Bob left the game");
    assert_eq!(panel.players.players(), ["Alice"]);

    let roster_updates = seen
        .lock()
        .unwrap()
        .iter()
        .filter(|event| matches!(event, PanelEvent::PlayersChanged(_)))
        .count();
    assert_eq!(roster_updates, 4);
}

#[tokio::test]
async fn test_position_replies_stay_out_of_history() {
    let mut panel = panel();
    panel.players.add_player("Bob");

    output(
        &mut panel,
        "[Server thread/INFO]: Bob has the following entity data: [10.6d, 64.0d, -3.4d]",
    );
    assert!(panel.history.is_empty());
    let position = panel.players.position("Bob").unwrap();
    assert_eq!((position.x, position.y, position.z), (11, 64, -3));

    output(&mut panel, "[Server thread/INFO]: Bob issued server command: /home");
    assert_eq!(panel.history.len(), 1);
    assert_eq!(panel.players.stats("Bob").unwrap().commands_used, 1);
}

#[tokio::test]
async fn test_stale_output_is_logged_but_not_interpreted() {
    let mut panel = panel();
    panel.on_output(
        panel.supervisor.generation() + 1,
        OutputStream::Stderr,
        "Alice joined the game".into(),
    );
    assert!(panel.players.is_empty());
    assert_eq!(panel.history.last().unwrap().level, LogLevel::Stderr);
}

#[tokio::test]
async fn test_actions_answer_the_caller() {
    let mut panel = panel();
    panel.players.add_player("Alice");
    let (id, mut rx) = connect(&mut panel);
    send(&mut panel, id, &format!(r#"{{"action":"auth","password":"{}"}}"#, PASSWORD));
    types(&mut rx);

    send(&mut panel, id, r#"{"action":"get_player_stats","player":"Alice"}"#);
    send(&mut panel, id, r#"{"action":"get_player_stats","player":"Nobody"}"#);
    send(&mut panel, id, r#"{"action":"get_player_stats"}"#);
    send(&mut panel, id, r#"{"action":"get_dynmap_info"}"#);
    send(&mut panel, id, r#"{"action":"get_files","path":"/"}"#);
    send(&mut panel, id, r#"{"action":"give_item","player":"Alice","item":"stone"}"#);
    send(&mut panel, id, r#"{"action":"teleport_player","from_player":"Alice","to_player":"Alice"}"#);
    send(&mut panel, id, r#"{"action":"command","command":"op Bob\nstop"}"#);

    let received = types(&mut rx);
    assert_eq!(
        type_names(&received),
        [
            "player_stats",
            "player_stats",
            "dynmap_info",
            "error",
            "error",
            "log",
            "error",
            "error"
        ]
    );
    assert_eq!(received[0]["stats"]["join_count"], 1);
    assert_eq!(received[1]["player"], "Nobody");
    assert_eq!(received[1]["stats"]["join_count"], 0);
    assert_eq!(received[2]["url"], "http://localhost:8123");
    assert_eq!(received[3]["action"], "get_files");
    assert_eq!(received[4]["action"], "give_item");
    assert_eq!(received[4]["message"], "server is not running");
    assert_eq!(received[5]["level"], "warn");
    assert_eq!(received[6]["action"], "teleport_player");
    assert_eq!(received[7]["action"], "command");
}

#[tokio::test]
async fn test_announcements_and_clear_are_broadcast() {
    let mut panel = panel();
    let (id, mut rx) = connect(&mut panel);
    send(&mut panel, id, &format!(r#"{{"action":"auth","password":"{}"}}"#, PASSWORD));
    output(&mut panel, "something");
    types(&mut rx);

    send(&mut panel, id, r#"{"action":"add_announcement","text":"restart at 8pm","type":"warning"}"#);
    let received = types(&mut rx);
    assert_eq!(type_names(&received), ["announcements_update"]);
    let announcement = &received[0]["announcements"][0];
    assert_eq!(announcement["text"], "restart at 8pm");
    assert_eq!(announcement["type"], "warning");

    let remove = format!(
        r#"{{"action":"remove_announcement","id":{}}}"#,
        announcement["id"].as_u64().unwrap()
    );
    send(&mut panel, id, &remove);
    let received = types(&mut rx);
    assert_eq!(received[0]["announcements"], serde_json::json!([]));
    send(&mut panel, id, &remove);
    assert!(types(&mut rx).is_empty());

    send(&mut panel, id, r#"{"action":"clear"}"#);
    assert_eq!(type_names(&types(&mut rx)), ["clear"]);
    assert!(panel.history.is_empty());
}

#[tokio::test]
async fn test_shutdown_while_offline_ends_the_loop() {
    let mut panel = panel();
    let (done, waiter) = oneshot::channel();
    assert!(panel.handle(PanelInput::Shutdown { done }).is_break());
    assert!(waiter.await.is_ok());
}

#[cfg(unix)]
mod process {
    use super::*;
    use tokio::time::timeout;

    const SCRIPT: &str = r#"#!/bin/bash
echo "[Server thread/INFO]: Starting minecraft server version 1.20.4"
echo "[Server thread/INFO]: Done (0.123s)! For help, type \"help\""
while read -r line; do
  case "$line" in
    list) echo "[Server thread/INFO]: There are 1 of a max of 20 players online: Alice" ;;
    stop) echo "[Server thread/INFO]: Stopping the server"; exit 0 ;;
  esac
done
"#;

    async fn pump_until<F: Fn(&Panel) -> bool>(panel: &mut Panel, done: F) {
        while !done(&*panel) {
            let input = timeout(Duration::from_secs(10), panel.rx.recv())
                .await
                .expect("panel input in time")
                .expect("panel channel open");
            let _ = panel.handle(input);
        }
    }

    #[tokio::test]
    async fn test_script_server_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("run.sh"), SCRIPT).unwrap();
        let minecraft = MinecraftConfig {
            work_dir: dir.path().to_path_buf(),
            start_mode: StartMode::Script,
            startup_delay_ms: 60_000,
            roster_refresh_delay_ms: 10,
            stop_command_delay_ms: 10,
            shutdown_timeout_ms: 10_000,
            ..Default::default()
        };
        let mut panel = Panel::new(config(minecraft), Arc::new(BroadcastHub::new()));
        panel.attach_hub();
        let (id, mut rx) = connect(&mut panel);
        send(&mut panel, id, &format!(r#"{{"action":"auth","password":"{}"}}"#, PASSWORD));
        types(&mut rx);

        send(&mut panel, id, r#"{"action":"start"}"#);
        assert_eq!(panel.supervisor.status(), ServerStatus::Starting);

        pump_until(&mut panel, |p| p.supervisor.status() == ServerStatus::Online).await;
        pump_until(&mut panel, |p| p.players.contains("Alice")).await;

        send(&mut panel, id, r#"{"action":"stop"}"#);
        assert_eq!(panel.supervisor.status(), ServerStatus::Stopping);
        pump_until(&mut panel, |p| !p.supervisor.is_running()).await;

        assert_eq!(panel.supervisor.last_exit_code(), Some(0));
        assert!(panel.players.is_empty());
        assert_eq!(panel.players.stats("Alice").unwrap().join_count, 1);

        let statuses: Vec<_> = types(&mut rx)
            .into_iter()
            .filter(|v| v["type"] == "status")
            .map(|v| v["status"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(statuses, ["starting", "online", "stopping", "offline"]);
    }
}
