//! Two engines talking through a real backend on a local port.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use uuid::Uuid;

use etra_api::auth::{AppState, AppStateInner, hash_password};
use etra_client::feed::GatewayFeed;
use etra_client::http::HttpBackend;
use etra_client::{AuthGate, Engine, EngineContext, LoginError, Notification, Notifier, Prompt, Session, Store};
use etra_db::Database;
use etra_db::models::{UserRow, timestamp};
use etra_gateway::dispatcher::Dispatcher;
use etra_types::api::SendMessageRequest;
use etra_types::{AllowList, FeedEvent, GatewayCommand, Participant, Table};

const ALICE: &str = "alice@example.com";
const BOB: &str = "bob@example.com";
const PASSWORD: &str = "correct horse";

fn allow_list() -> AllowList {
    AllowList::new(Participant::new(ALICE, "Alice"), Participant::new(BOB, "Bob"))
}

/// Start the backend and return its address.
async fn spawn_server() -> String {
    let db = Database::open_in_memory().unwrap();
    for (email, name) in [(ALICE, "Alice"), (BOB, "Bob")] {
        db.create_user(&UserRow {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            name: name.to_string(),
            password: hash_password(PASSWORD).unwrap(),
            created_at: timestamp(chrono::Utc::now()),
        })
        .unwrap();
    }
    let state: AppState = Arc::new(AppStateInner {
        db,
        jwt_secret: "test-secret".into(),
        dispatcher: Dispatcher::new(),
        allow_list: allow_list(),
    });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, etra_api::router(state)).await.unwrap();
    });
    addr.to_string()
}

#[derive(Default)]
struct Recorder {
    shown: Mutex<Vec<Notification>>,
    alerts: Mutex<Vec<String>>,
}

#[async_trait]
impl Notifier for Recorder {
    async fn request_permission(&self) -> bool {
        true
    }

    fn show(&self, notification: Notification) {
        self.shown.lock().unwrap().push(notification);
    }
}

#[async_trait]
impl Prompt for Recorder {
    async fn confirm(&self, _question: &str) -> bool {
        true
    }

    fn alert(&self, message: &str) {
        self.alerts.lock().unwrap().push(message.into());
    }
}

struct Client {
    engine: Engine,
    ui: Arc<Recorder>,
}

async fn sign_in(addr: &str, email: &str) -> (Session, Arc<HttpBackend>) {
    let http = Arc::new(HttpBackend::new(format!("http://{addr}")));
    let gate = AuthGate::new(http.clone(), allow_list());
    let session = gate.login(email, PASSWORD).await.unwrap();
    (session, http)
}

async fn connect(addr: &str, email: &str) -> Client {
    let (session, http) = sign_in(addr, email).await;
    let feed = Arc::new(GatewayFeed::new(format!("ws://{addr}/gateway"), session.token.clone()));
    let ui = Arc::new(Recorder::default());
    let engine = Engine::new(EngineContext {
        session,
        allow_list: allow_list(),
        store: http,
        feed,
        notifier: ui.clone(),
        prompt: ui.clone(),
    });
    engine.start().await.unwrap();
    Client { engine, ui }
}

async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..300 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition never became true");
}

#[tokio::test]
async fn login_goes_through_the_allow_list() {
    let addr = spawn_server().await;
    let http = Arc::new(HttpBackend::new(format!("http://{addr}")));
    let gate = AuthGate::new(http.clone(), allow_list());

    assert!(matches!(gate.login("eve@example.com", PASSWORD).await, Err(LoginError::NotAllowed)));
    assert!(matches!(
        gate.login(ALICE, "wrong").await,
        Err(LoginError::InvalidCredentials)
    ));

    let session = gate.login("Alice@Example.com", PASSWORD).await.unwrap();
    assert_eq!(session.user.email, ALICE);
    assert_eq!(gate.restore().await.unwrap().map(|s| s.user.id), Some(session.user.id));

    // A stored token survives into a fresh client.
    let resumed = HttpBackend::with_token(format!("http://{addr}"), session.token.clone());
    let resumed = AuthGate::new(Arc::new(resumed), allow_list());
    assert!(resumed.restore().await.unwrap().is_some());

    gate.logout().await.unwrap();
    assert!(gate.restore().await.unwrap().is_none());
}

#[tokio::test]
async fn messages_and_notes_flow_between_both_sides() {
    let addr = spawn_server().await;
    let alice = connect(&addr, ALICE).await;
    let bob = connect(&addr, BOB).await;

    eventually(|| alice.engine.snapshot().other_online).await;

    alice.engine.send_text("hi bob").await.unwrap();
    eventually(|| bob.engine.snapshot().messages.len() == 1).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(alice.engine.snapshot().messages.len(), 1);

    let shown = bob.ui.shown.lock().unwrap().clone();
    assert_eq!(shown.len(), 1);
    assert_eq!(shown[0].body, "hi bob");
    assert_eq!(bob.engine.unread_count(), 1);

    bob.engine.open_note_form();
    bob.engine.edit_note_form(|draft| {
        draft.title = "pick up keys".into();
        draft.assigned_to_self = false;
    });
    bob.engine.submit_note_form().await.unwrap();
    eventually(|| alice.engine.snapshot().notes.len() == 1).await;
    eventually(|| alice.ui.shown.lock().unwrap().len() == 1).await;

    let note_id = alice.engine.snapshot().notes[0].id;
    alice.engine.toggle_note_completion(note_id, false).await.unwrap();
    eventually(|| bob.engine.snapshot().note(note_id).is_some_and(|n| n.is_completed)).await;

    alice.engine.clear_all_messages().await.unwrap();
    eventually(|| bob.engine.snapshot().messages.is_empty()).await;

    bob.engine.stop();
    eventually(|| !alice.engine.snapshot().other_online).await;
    assert!(alice.ui.alerts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn track_is_acknowledged_once_the_subscription_holds() {
    let addr = spawn_server().await;
    // Alice is already present from another connection.
    let _alice = connect(&addr, ALICE).await;
    let (session, _) = sign_in(&addr, ALICE).await;
    let (_, bob) = sign_in(&addr, BOB).await;

    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/gateway")).await.unwrap();
    let commands = [
        GatewayCommand::Identify { token: session.token },
        GatewayCommand::Subscribe {
            tables: vec![Table::Messages],
        },
        GatewayCommand::Track,
    ];
    for command in &commands {
        ws.send(WsMessage::text(serde_json::to_string(command).unwrap()))
            .await
            .unwrap();
    }

    let mut events = Vec::new();
    loop {
        let Some(Ok(WsMessage::Text(text))) = ws.next().await else {
            panic!("gateway closed early");
        };
        let event: FeedEvent = serde_json::from_str(&text).unwrap();
        if event == FeedEvent::Tracked {
            break;
        }
        events.push(event);
    }
    assert!(matches!(events[0], FeedEvent::Ready { .. }));

    bob.insert_message(SendMessageRequest {
        content: "right after".into(),
        client_token: None,
    })
    .await
    .unwrap();
    loop {
        let Some(Ok(WsMessage::Text(text))) = ws.next().await else {
            panic!("gateway closed early");
        };
        match serde_json::from_str::<FeedEvent>(&text).unwrap() {
            FeedEvent::MessageInsert { message } => {
                assert_eq!(message.content, "right after");
                break;
            }
            FeedEvent::PresenceSync { .. } => {}
            other => panic!("unexpected event {other:?}"),
        }
    }
}
