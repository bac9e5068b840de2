use crate::app::AppState;
use crate::drivers::websocket::WebsocketConnection;
use crate::drivers::{Driver, Drivers};
use axum::body::Body;
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::{
    extract::{
        ws::{WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use log::{debug, error, info, warn};
use serde_json::json;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, CorsLayer};

pub struct WsDriver {
    app_state: AppState,
}

#[async_trait::async_trait]
impl Driver for WsDriver {
    async fn run(&self) {
        let ws_cfg = &self.app_state.config.drivers.websocket;
        let addr = ws_cfg.uni_config.socket_addr();

        let app = Router::new()
            .route("/ws", get(ws_handler))
            .route("/info", get(info_handler))
            .with_state(self.app_state.clone())
            .layer(
                CorsLayer::new()
                    .allow_origin(allow_origin(&ws_cfg.allowed_origins))
                    .allow_methods([Method::GET]),
            )
            .into_make_service_with_connect_info::<SocketAddr>();

        let listener = match TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(err) => {
                error!("could not bind {}: {}", addr, err);
                return;
            }
        };
        info!("WebSocket server listening on {}", addr);

        let stop_token = self.app_state.stop_notify.clone();
        let state = self.app_state.clone();
        let served = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                stop_token.notified().await;
                info!("Shutdown signal received, closing connections...");
                let mut ws_handlers = state.ws_connections.lock().await;
                for handler in ws_handlers.drain(..) {
                    if let Err(err) = handler.await {
                        error!("Error handling websocket connection: {}", err);
                    }
                }
            })
            .await;
        if let Err(err) = served {
            error!("WebSocket server stopped: {}", err);
        }
    }

    fn get_driver_type(&self) -> Drivers {
        Drivers::Websocket
    }
}

/// Any origin when the list is empty, invalid entries are skipped.
fn allow_origin(origins: &[String]) -> AllowOrigin {
    if origins.is_empty() {
        return AllowOrigin::any();
    }
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("ignored invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();
    AllowOrigin::list(origins)
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    info!("WebSocket connection received from {:?}", addr);
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state, addr))
}

async fn handle_ws_connection(socket: WebSocket, state: AppState, addr: SocketAddr) {
    let state_clone = state.clone();
    let join_handle = tokio::spawn(async move {
        match WebsocketConnection::serve(socket, state, addr).await {
            Ok(_) => debug!("WebSocket connection closed: {}", addr),
            Err(e) => error!("WebSocket error: {}: {}", addr, e),
        }
    });
    let mut handlers = state_clone.ws_connections.lock().await;
    handlers.retain(|handle| !handle.is_finished());
    handlers.push(join_handle);
}

async fn info_handler(State(state): State<AppState>) -> impl IntoResponse {
    let body = json!({
        "name": "mcpanel daemon",
        "version": crate::app::VERSION,
        "server_name": state.config.minecraft.server_name,
        "uptime": (chrono::Utc::now() - state.started).num_seconds(),
    })
    .to_string();

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        Body::from(body),
    )
        .into_response()
}

impl WsDriver {
    pub fn new(app_state: AppState) -> Self {
        Self { app_state }
    }
}

