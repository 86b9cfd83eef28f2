use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use jsonwebtoken::{DecodingKey, Validation, decode};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use etra_types::api::Claims;
use etra_types::{FeedEvent, GatewayCommand, Table};

use crate::dispatcher::Dispatcher;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// A client has this long to send Identify after connecting.
const IDENTIFY_TIMEOUT: Duration = Duration::from_secs(10);

type Subscriptions = Arc<RwLock<HashSet<Table>>>;

/// Handle a single WebSocket connection: Identify handshake, then the
/// event loop until either side goes away.
pub async fn handle_connection(socket: WebSocket, dispatcher: Dispatcher, jwt_secret: String) {
    let (mut sender, mut receiver) = socket.split();

    let (user_id, email) = match wait_for_identify(&mut receiver, &jwt_secret).await {
        Some(id) => id,
        None => {
            warn!("WebSocket client failed to identify, closing");
            return;
        }
    };

    info!("{} ({}) connected to gateway", email, user_id);

    let ready = FeedEvent::Ready {
        user_id,
        email: email.clone(),
    };
    if send_event(&mut sender, &ready).await.is_err() {
        return;
    }

    let conn_id = Uuid::new_v4();
    run_connection_loop(sender, receiver, dispatcher.clone(), user_id, conn_id, &email).await;

    dispatcher.untrack(user_id, conn_id).await;
    info!("{} ({}) disconnected from gateway", email, user_id);
}

async fn run_connection_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    dispatcher: Dispatcher,
    user_id: Uuid,
    conn_id: Uuid,
    email: &str,
) {
    let mut broadcast_rx = dispatcher.subscribe();
    // Replies meant for this connection alone.
    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<FeedEvent>();

    // Per-connection table subscriptions, shared between send and recv tasks.
    let subscriptions: Subscriptions = Arc::new(RwLock::new(HashSet::new()));
    let send_subscriptions = subscriptions.clone();

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward broadcasts -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = broadcast_rx.recv() => {
                    let event = match result {
                        Ok(event) => event,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            warn!("Broadcast receiver lagged by {} events", n);
                            continue;
                        }
                        Err(_) => break,
                    };

                    if let Some(table) = event.table() {
                        let subscribed = send_subscriptions
                            .read()
                            .map(|subs| subs.contains(&table))
                            .unwrap_or(false);
                        if !subscribed {
                            continue;
                        }
                    }

                    if send_event(&mut sender, &event).await.is_err() {
                        break;
                    }
                }
                Some(reply) = reply_rx.recv() => {
                    if send_event(&mut sender, &reply).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from client
    let recv_dispatcher = dispatcher.clone();
    let recv_email = email.to_string();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(cmd) => {
                        handle_command(
                            &recv_dispatcher,
                            user_id,
                            conn_id,
                            &recv_email,
                            cmd,
                            &subscriptions,
                            &reply_tx,
                        )
                        .await;
                    }
                    Err(e) => {
                        warn!(
                            "{} ({}) bad command: {} -- raw: {}",
                            recv_email,
                            user_id,
                            e,
                            text.chars().take(200).collect::<String>()
                        );
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }
}

async fn send_event(
    sender: &mut SplitSink<WebSocket, Message>,
    event: &FeedEvent,
) -> Result<(), ()> {
    let text = match serde_json::to_string(event) {
        Ok(text) => text,
        Err(e) => {
            warn!("Failed to serialize feed event: {}", e);
            return Ok(());
        }
    };
    sender.send(Message::Text(text.into())).await.map_err(|_| ())
}

async fn wait_for_identify(
    receiver: &mut SplitStream<WebSocket>,
    jwt_secret: &str,
) -> Option<(Uuid, String)> {
    let identify = async {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Text(text) = msg {
                if let Ok(GatewayCommand::Identify { token }) =
                    serde_json::from_str::<GatewayCommand>(&text)
                {
                    let token_data = decode::<Claims>(
                        &token,
                        &DecodingKey::from_secret(jwt_secret.as_bytes()),
                        &Validation::default(),
                    )
                    .ok()?;

                    return Some((token_data.claims.sub, token_data.claims.email));
                }
            }
        }
        None
    };

    tokio::time::timeout(IDENTIFY_TIMEOUT, identify).await.ok().flatten()
}

async fn handle_command(
    dispatcher: &Dispatcher,
    user_id: Uuid,
    conn_id: Uuid,
    email: &str,
    cmd: GatewayCommand,
    subscriptions: &Subscriptions,
    replies: &mpsc::UnboundedSender<FeedEvent>,
) {
    match cmd {
        GatewayCommand::Identify { .. } => {} // Already handled

        GatewayCommand::Subscribe { tables } => {
            info!("{} ({}) subscribing to {:?}", email, user_id, tables);
            match subscriptions.write() {
                Ok(mut subs) => *subs = tables.into_iter().collect(),
                Err(e) => warn!("subscription lock poisoned: {}", e),
            }
        }

        GatewayCommand::Track => {
            debug!("{} ({}) tracking presence on {}", email, user_id, conn_id);
            dispatcher.track(user_id, conn_id).await;
            let _ = replies.send(FeedEvent::Tracked);
        }
    }
}
