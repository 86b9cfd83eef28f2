use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use uuid::Uuid;

use etra_types::{FeedEvent, GatewayCommand, Table};

use crate::backend::{ChangeFeed, Subscription};
use crate::error::BackendError;

/// Matches the server's Identify window.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Change feed over the backend's WebSocket gateway.
pub struct GatewayFeed {
    url: String,
    token: String,
}

impl GatewayFeed {
    /// `url` is the gateway endpoint, e.g. `ws://host:3000/gateway`.
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: token.into(),
        }
    }
}

#[async_trait]
impl ChangeFeed for GatewayFeed {
    async fn subscribe(&self, self_id: Uuid) -> Result<Subscription, BackendError> {
        let (mut ws, _) = tokio_tungstenite::connect_async(self.url.as_str()).await?;

        let early = tokio::time::timeout(HANDSHAKE_TIMEOUT, handshake(&mut ws, &self.token, self_id))
            .await
            .map_err(|_| BackendError::Protocol("gateway handshake timed out".into()))??;

        let (tx, rx) = mpsc::unbounded_channel();
        for event in early {
            let _ = tx.send(event);
        }

        let task = tokio::spawn(async move {
            while let Some(frame) = ws.next().await {
                match frame {
                    Ok(WsMessage::Text(text)) => match serde_json::from_str::<FeedEvent>(&text) {
                        Ok(event) => {
                            if tx.send(event).is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!("Unreadable gateway event: {}", e),
                    },
                    Ok(WsMessage::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        warn!("Gateway connection lost: {}", e);
                        break;
                    }
                }
            }
            debug!("Gateway feed ended");
        });

        Ok(Subscription::new(rx, Some(task.abort_handle())))
    }
}

/// Identify, subscribe to both tables and track presence.
///
/// Returns once the gateway acknowledges this connection's Track. Commands
/// are handled in order, so the table subscription is in effect by then.
/// Events seen on the way are returned so they can be replayed.
async fn handshake(ws: &mut Socket, token: &str, self_id: Uuid) -> Result<Vec<FeedEvent>, BackendError> {
    send_command(
        ws,
        &GatewayCommand::Identify {
            token: token.to_string(),
        },
    )
    .await?;

    match next_event(ws).await? {
        Some(FeedEvent::Ready { user_id, email }) => {
            info!("Gateway ready for {}", email);
            if user_id != self_id {
                warn!("Gateway identified {} but the session is {}", user_id, self_id);
            }
        }
        other => {
            return Err(BackendError::Protocol(format!("expected Ready, got {other:?}")));
        }
    }

    send_command(
        ws,
        &GatewayCommand::Subscribe {
            tables: vec![Table::Messages, Table::Notes],
        },
    )
    .await?;
    send_command(ws, &GatewayCommand::Track).await?;

    let mut early = Vec::new();
    loop {
        let Some(event) = next_event(ws).await? else {
            return Err(BackendError::Protocol("gateway closed during handshake".into()));
        };
        if event == FeedEvent::Tracked {
            return Ok(early);
        }
        early.push(event);
    }
}

async fn send_command(ws: &mut Socket, command: &GatewayCommand) -> Result<(), BackendError> {
    let text = serde_json::to_string(command).map_err(|e| BackendError::Protocol(e.to_string()))?;
    ws.send(WsMessage::text(text)).await?;
    Ok(())
}

/// Next feed event, skipping control frames. `None` once the socket closes.
async fn next_event(ws: &mut Socket) -> Result<Option<FeedEvent>, BackendError> {
    while let Some(frame) = ws.next().await {
        match frame? {
            WsMessage::Text(text) => {
                return serde_json::from_str(&text)
                    .map(Some)
                    .map_err(|e| BackendError::Protocol(e.to_string()));
            }
            WsMessage::Close(_) => return Ok(None),
            _ => {}
        }
    }
    Ok(None)
}
