use anyhow::anyhow;
use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket};
use futures::{Sink, SinkExt, Stream, StreamExt};
use log::{debug, info};
use std::net::SocketAddr;
use tokio::select;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::Notify;

use crate::app::AppState;
use crate::management::PanelInput;

/// One subscriber socket. Inbound frames are forwarded to the panel loop,
/// outbound envelopes arrive on the unbounded queue registered with the
/// hub.
pub struct WebsocketConnection {
    id: usize,
    addr: SocketAddr,
    panel: UnboundedSender<PanelInput>,
}

impl WebsocketConnection {
    fn forward(&self, input: PanelInput) -> anyhow::Result<()> {
        self.panel
            .send(input)
            .map_err(|_| anyhow!("panel loop is gone"))
    }

    /// Returns `false` once the peer asked to close.
    fn handle_received(&self, data: Message) -> anyhow::Result<bool> {
        match data {
            Message::Text(text) => {
                self.forward(PanelInput::Inbound {
                    id: self.id,
                    text: text.to_string(),
                })?;
            }
            Message::Binary(bin) => {
                debug!(
                    "dropped {} byte binary frame from {}",
                    bin.len(),
                    self.addr
                );
            }
            Message::Close(close) => {
                self.handle_closing(close.as_ref());
                return Ok(false);
            }
            _ => {}
        }
        Ok(true)
    }

    fn handle_closing(&self, msg: Option<&CloseFrame>) {
        info!(
            "websocket close from client({}), with reason: {}",
            self.addr,
            msg.map(|f| f.reason.to_string()).unwrap_or_default()
        );
    }

    pub async fn serve(ws: WebSocket, app_state: AppState, addr: SocketAddr) -> anyhow::Result<()> {
        let (mut outgoing, mut incoming) = ws.split();
        let (outgoing_tx, mut outgoing_rx) = unbounded_channel();
        let conn = WebsocketConnection {
            id: app_state.hub.next_id(),
            addr,
            panel: app_state.panel.clone(),
        };
        conn.forward(PanelInput::Connect {
            id: conn.id,
            sender: outgoing_tx,
        })?;
        debug!("websocket connection {} from {}", conn.id, addr);

        let rv = conn
            .relay(
                &mut outgoing,
                &mut incoming,
                &mut outgoing_rx,
                &app_state.stop_notify,
            )
            .await;

        // the panel may already be gone during shutdown
        let _ = conn.forward(PanelInput::Disconnect { id: conn.id });
        rv
    }

    /// Moves frames both ways until either side closes or `stop` fires,
    /// in which case the peer gets a normal close frame.
    async fn relay<S, I, E>(
        &self,
        outgoing: &mut S,
        incoming: &mut I,
        outgoing_rx: &mut UnboundedReceiver<Message>,
        stop: &Notify,
    ) -> anyhow::Result<()>
    where
        S: Sink<Message> + Unpin,
        S::Error: std::error::Error + Send + Sync + 'static,
        I: Stream<Item = Result<Message, E>> + Unpin,
    {
        // registered up front, a notice sent while a write is pending is kept
        let cancelled = stop.notified();
        tokio::pin!(cancelled);
        cancelled.as_mut().enable();

        loop {
            select! {
                // read
                msg = incoming.next() => {
                    match msg {
                        Some(Ok(m)) => {
                            if !self.handle_received(m)? {
                                break;
                            }
                        }
                        _ => break,
                    }
                }
                // write
                msg = outgoing_rx.recv() => {
                    match msg {
                        Some(m) => outgoing.send(m).await?,
                        None => break,
                    }
                }
                // cancel
                _ = &mut cancelled => {
                    outgoing.send(Message::Close(Some(CloseFrame {
                        code: close_code::NORMAL,
                        reason: "daemon closed".into(),
                    }))).await?;
                    info!("websocket connection from {} closed", self.addr);
                    break;
                }
            }
        }
        Ok(())
    }
}
