
use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    response::Response,
};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::models::{ClientMessage, ServerMessage, SessionBroadcast};
use crate::ws::connstate::ConnState;
use crate::ws::msg_create_handler::handle_create_message;
use crate::ws::msg_join_handler::handle_join_message;
use crate::ws::msg_media_handler::handle_media_message;
use crate::ws::msg_ping_handler::handle_ping_message;
use crate::ws::msg_report_handler::handle_report_message;
use crate::AppState;

/// Shared writer half of one connection's socket. Point-to-point replies
/// and the fan-out forwarder both write through this.
pub type WsSender = Arc<Mutex<SplitSink<WebSocket, Message>>>;

/// WebSocket handler
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    app_state: axum::extract::State<Arc<AppState>>,
) -> Response {
    info!("New WebSocket connection attempt");
    ws.on_upgrade(move |socket| handle_socket(socket, app_state.0))
}

/// Handle WebSocket connection
async fn handle_socket(socket: WebSocket, app_state: Arc<AppState>) {
    // Generate unique connection ID to identify this client
    let conn_id = Uuid::new_v4().to_string();
    app_state.connections.fetch_add(1, Ordering::Relaxed);
    info!("WebSocket connection established with connection_id: {}", conn_id);

    // Split the socket into sender and receiver; the sender is shared
    // between the inbound loop and the fan-out forwarder.
    let (sender, mut receiver) = socket.split();
    let sender: WsSender = Arc::new(Mutex::new(sender));

    let mut conn = ConnState::new(conn_id);

    while let Some(Ok(message)) = receiver.next().await {
        let msg = match message {
            Message::Text(msg) => msg,
            Message::Close(_) => break,
            // Ping/pong and binary frames are not part of the contract
            _ => continue,
        };

        // Parse the incoming message as JSON
        let client_msg: ClientMessage = match serde_json::from_str(&msg) {
            Ok(client_msg) => client_msg,
            Err(e) => {
                error!("Failed to parse message from connection {}: {}", conn.conn_id, e);
                continue;
            }
        };

        // Handle different message types
        match client_msg {
            ClientMessage::CreateSession(create_msg) => {
                handle_create_message(create_msg, &app_state, &mut conn, &sender).await;
            }
            ClientMessage::JoinSession(join_msg) => {
                handle_join_message(join_msg, &app_state, &mut conn, &sender).await;
            }
            ClientMessage::ReportState(report_msg) => {
                handle_report_message(report_msg, &app_state, &conn, &sender).await;
            }
            ClientMessage::UpdateMedia(media_msg) => {
                handle_media_message(media_msg, &app_state, &conn, &sender).await;
            }
            ClientMessage::Ping(ping_msg) => {
                handle_ping_message(&ping_msg, &conn, &sender).await;
            }
        }
    }

    // Transport closed: leave the bound session, if any. Safe to run
    // at any time, including concurrently with in-flight reports.
    if let Some((session_id, participant_id)) = conn.release() {
        leave_session(&app_state, &session_id, &participant_id).await;
    }
    app_state.connections.fetch_sub(1, Ordering::Relaxed);
    info!("WebSocket connection terminated: {}", conn.conn_id);
}

/// Remove a participant from a session and garbage-collect the session
/// once its member set empties.
pub async fn leave_session(app_state: &AppState, session_id: &str, participant_id: &str) {
    if let Some(session) = app_state.registry.get(session_id).await {
        let now_empty = session
            .leave(participant_id, app_state.authority_handoff)
            .await;
        info!("Participant {} left session {}", participant_id, session_id);
        if now_empty {
            app_state.registry.delete_if_empty(session_id).await;
        }
    }
}

/// Point-to-point delivery over one connection's socket. Best-effort: a
/// vanished connection is cleaned up by its own socket loop.
pub async fn send_to_one(sender: &WsSender, message: &ServerMessage) {
    let payload = match serde_json::to_string(message) {
        Ok(payload) => payload,
        Err(e) => {
            error!("Failed to serialize message: {}", e);
            return;
        }
    };
    if sender.lock().await.send(Message::Text(payload)).await.is_err() {
        warn!("Failed to send message, connection gone");
    }
}

/// Forward session fan-out events to this connection, skipping events the
/// connection itself originated to prevent echo.
pub fn spawn_forwarder(
    mut rx: broadcast::Receiver<SessionBroadcast>,
    conn_id: String,
    sender: WsSender,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if event.sender_conn == conn_id {
                        continue;
                    }
                    if sender
                        .lock()
                        .await
                        .send(Message::Text(event.payload))
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    // Best-effort delivery: skip what was missed, keep going
                    warn!(
                        "Connection {} lagged behind fan-out, skipped {} events",
                        conn_id, skipped
                    );
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use futures_util::{SinkExt, StreamExt};
    use tokio::net::TcpStream;
    use tokio::time::timeout;
    use tokio_tungstenite::{connect_async, tungstenite, MaybeTlsStream, WebSocketStream};

    use crate::models::{
        ClientMessage, CreateSessionMessage, JoinSessionMessage, PingMessage, PlaybackState,
        ReportStateMessage, ServerMessage, SessionCreatedMessage, UpdateMediaMessage,
    };
    use crate::routes::api::create_app;
    use crate::AppState;

    type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

    async fn start_server(authority_handoff: bool) -> String {
        let app_state = Arc::new(AppState::new(authority_handoff));
        let app = create_app(app_state);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("ws://{}/ws", addr)
    }

    async fn connect(url: &str) -> WsClient {
        let (ws, _) = connect_async(url).await.unwrap();
        ws
    }

    async fn send(ws: &mut WsClient, msg: &ClientMessage) {
        ws.send(tungstenite::Message::Text(
            serde_json::to_string(msg).unwrap(),
        ))
        .await
        .unwrap();
    }

    async fn recv(ws: &mut WsClient) -> ServerMessage {
        loop {
            let msg = timeout(Duration::from_secs(2), ws.next())
                .await
                .expect("timed out waiting for server message")
                .expect("connection closed")
                .expect("websocket error");
            if let tungstenite::Message::Text(text) = msg {
                return serde_json::from_str(&text).unwrap();
            }
        }
    }

    /// Assert the server sends nothing to this connection for a while.
    async fn assert_silent(ws: &mut WsClient) {
        let res = timeout(Duration::from_millis(200), ws.next()).await;
        assert!(res.is_err(), "expected silence, got {:?}", res);
    }

    /// Give the server a moment to process disconnect cleanup.
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(300)).await;
    }

    async fn create_session(
        ws: &mut WsClient,
        media: &str,
        authority_mode: bool,
        participant_id: &str,
    ) -> SessionCreatedMessage {
        send(
            ws,
            &ClientMessage::CreateSession(CreateSessionMessage {
                media_reference: media.to_string(),
                authority_mode,
                participant_id: Some(participant_id.to_string()),
            }),
        )
        .await;
        match recv(ws).await {
            ServerMessage::SessionCreated(created) => created,
            other => panic!("expected session-created, got {:?}", other),
        }
    }

    async fn join_session(
        ws: &mut WsClient,
        session_id: &str,
        participant_id: &str,
    ) -> PlaybackState {
        send(
            ws,
            &ClientMessage::JoinSession(JoinSessionMessage {
                session_id: session_id.to_string(),
                participant_id: Some(participant_id.to_string()),
            }),
        )
        .await;
        match recv(ws).await {
            ServerMessage::SessionJoined(state) => state,
            other => panic!("expected session-joined, got {:?}", other),
        }
    }

    fn report(session_id: &str, position_seconds: f64, is_playing: bool, media: &str) -> ClientMessage {
        ClientMessage::ReportState(ReportStateMessage {
            session_id: session_id.to_string(),
            playback_state: PlaybackState {
                position_seconds,
                is_playing,
                media_reference: media.to_string(),
            },
        })
    }

    #[tokio::test]
    async fn consensus_session_end_to_end() {
        let url = start_server(false).await;

        let mut creator = connect(&url).await;
        let created = create_session(&mut creator, "A", false, "host").await;
        assert_eq!(created.media_reference, "A");

        // p1 joins and synchronizes off the returned state
        let mut p1 = connect(&url).await;
        let state = join_session(&mut p1, &created.session_id, "p1").await;
        assert_eq!(state.position_seconds, 0.0);
        assert!(!state.is_playing);
        assert_eq!(state.media_reference, "A");
        match recv(&mut creator).await {
            ServerMessage::ParticipantJoined(joined) => assert_eq!(joined.participant_id, "p1"),
            other => panic!("expected participant-joined, got {:?}", other),
        }

        // p2 joins, existing members are notified, p2 is not
        let mut p2 = connect(&url).await;
        join_session(&mut p2, &created.session_id, "p2").await;
        match recv(&mut p1).await {
            ServerMessage::ParticipantJoined(joined) => assert_eq!(joined.participant_id, "p2"),
            other => panic!("expected participant-joined, got {:?}", other),
        }
        match recv(&mut creator).await {
            ServerMessage::ParticipantJoined(_) => {}
            other => panic!("expected participant-joined, got {:?}", other),
        }

        // p2 seeks well past tolerance: accepted, fanned out to the others
        send(&mut p2, &report(&created.session_id, 10.0, true, "A")).await;
        match recv(&mut p1).await {
            ServerMessage::StateReconciled(state) => {
                assert_eq!(state.position_seconds, 10.0);
                assert!(state.is_playing);
                assert_eq!(state.media_reference, "A");
            }
            other => panic!("expected state-reconciled, got {:?}", other),
        }
        match recv(&mut creator).await {
            ServerMessage::StateReconciled(_) => {}
            other => panic!("expected state-reconciled, got {:?}", other),
        }
        assert_silent(&mut p2).await;

        // p1 re-reports within tolerance: dropped, nobody hears anything
        send(&mut p1, &report(&created.session_id, 10.2, true, "A")).await;
        assert_silent(&mut p2).await;
        assert_silent(&mut creator).await;
        assert_silent(&mut p1).await;

        // media updates always propagate, the updater excluded
        send(
            &mut p2,
            &ClientMessage::UpdateMedia(UpdateMediaMessage {
                session_id: created.session_id.clone(),
                media_reference: "B".to_string(),
            }),
        )
        .await;
        match recv(&mut p1).await {
            ServerMessage::MediaUpdated(updated) => assert_eq!(updated.media_reference, "B"),
            other => panic!("expected media-updated, got {:?}", other),
        }
        match recv(&mut creator).await {
            ServerMessage::MediaUpdated(_) => {}
            other => panic!("expected media-updated, got {:?}", other),
        }
        assert_silent(&mut p2).await;
    }

    #[tokio::test]
    async fn joining_unknown_session_reports_not_found() {
        let url = start_server(false).await;
        let mut ws = connect(&url).await;
        send(
            &mut ws,
            &ClientMessage::JoinSession(JoinSessionMessage {
                session_id: "no-such-session".to_string(),
                participant_id: Some("p1".to_string()),
            }),
        )
        .await;
        match recv(&mut ws).await {
            ServerMessage::SessionNotFound => {}
            other => panic!("expected session-not-found, got {:?}", other),
        }

        // reporting against an unknown session fails the same way
        send(&mut ws, &report("no-such-session", 1.0, true, "A")).await;
        match recv(&mut ws).await {
            ServerMessage::SessionNotFound => {}
            other => panic!("expected session-not-found, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn emptied_session_becomes_unreachable() {
        let url = start_server(false).await;

        let mut creator = connect(&url).await;
        let created = create_session(&mut creator, "A", false, "host").await;
        let mut p1 = connect(&url).await;
        join_session(&mut p1, &created.session_id, "p1").await;
        recv(&mut creator).await; // participant-joined

        creator.close(None).await.unwrap();
        p1.close(None).await.unwrap();
        settle().await;

        let mut probe = connect(&url).await;
        send(
            &mut probe,
            &ClientMessage::JoinSession(JoinSessionMessage {
                session_id: created.session_id.clone(),
                participant_id: Some("p2".to_string()),
            }),
        )
        .await;
        match recv(&mut probe).await {
            ServerMessage::SessionNotFound => {}
            other => panic!("expected session-not-found, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn authority_mode_gates_reports() {
        let url = start_server(false).await;

        let mut creator = connect(&url).await;
        let created = create_session(&mut creator, "A", true, "boss").await;
        let mut p1 = connect(&url).await;
        join_session(&mut p1, &created.session_id, "p1").await;
        recv(&mut creator).await; // participant-joined

        // a non-authority report never changes state, never broadcasts
        send(&mut p1, &report(&created.session_id, 42.0, true, "A")).await;
        assert_silent(&mut creator).await;
        assert_silent(&mut p1).await;

        // the authority's report is accepted regardless of position delta
        send(&mut creator, &report(&created.session_id, 0.1, false, "A")).await;
        match recv(&mut p1).await {
            ServerMessage::StateReconciled(state) => assert_eq!(state.position_seconds, 0.1),
            other => panic!("expected state-reconciled, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn authority_loss_freezes_reports_without_handoff() {
        let url = start_server(false).await;

        let mut creator = connect(&url).await;
        let created = create_session(&mut creator, "A", true, "boss").await;
        let mut p1 = connect(&url).await;
        join_session(&mut p1, &created.session_id, "p1").await;
        recv(&mut creator).await;
        let mut p2 = connect(&url).await;
        join_session(&mut p2, &created.session_id, "p2").await;
        recv(&mut creator).await;
        recv(&mut p1).await;

        creator.close(None).await.unwrap();
        settle().await;

        // authority is unassigned, existing members are never promoted
        send(&mut p1, &report(&created.session_id, 50.0, true, "A")).await;
        assert_silent(&mut p2).await;
        assert_silent(&mut p1).await;
    }

    #[tokio::test]
    async fn authority_handoff_promotes_survivor() {
        let url = start_server(true).await;

        let mut creator = connect(&url).await;
        let created = create_session(&mut creator, "A", true, "boss").await;
        let mut p1 = connect(&url).await;
        join_session(&mut p1, &created.session_id, "p1").await;
        recv(&mut creator).await;

        creator.close(None).await.unwrap();
        settle().await;

        // p1 inherited authority; a later joiner does not take it over
        let mut p2 = connect(&url).await;
        join_session(&mut p2, &created.session_id, "p2").await;
        recv(&mut p1).await; // participant-joined

        send(&mut p1, &report(&created.session_id, 5.0, true, "A")).await;
        match recv(&mut p2).await {
            ServerMessage::StateReconciled(state) => assert_eq!(state.position_seconds, 5.0),
            other => panic!("expected state-reconciled, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn second_join_implicitly_leaves_first_session() {
        let url = start_server(false).await;

        let mut c1 = connect(&url).await;
        let session_a = create_session(&mut c1, "A", false, "host-a").await;
        let mut c2 = connect(&url).await;
        let session_b = create_session(&mut c2, "B", false, "host-b").await;

        // c2 switches to session A, emptying and thereby deleting B
        join_session(&mut c2, &session_a.session_id, "p2").await;
        match recv(&mut c1).await {
            ServerMessage::ParticipantJoined(joined) => assert_eq!(joined.participant_id, "p2"),
            other => panic!("expected participant-joined, got {:?}", other),
        }
        settle().await;

        let mut probe = connect(&url).await;
        send(
            &mut probe,
            &ClientMessage::JoinSession(JoinSessionMessage {
                session_id: session_b.session_id.clone(),
                participant_id: Some("p3".to_string()),
            }),
        )
        .await;
        match recv(&mut probe).await {
            ServerMessage::SessionNotFound => {}
            other => panic!("expected session-not-found, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn ping_yields_pong() {
        let url = start_server(false).await;
        let mut ws = connect(&url).await;
        send(&mut ws, &ClientMessage::Ping(PingMessage {})).await;
        match recv(&mut ws).await {
            ServerMessage::Pong(pong) => {
                chrono::DateTime::parse_from_rfc3339(&pong.date).expect("pong date not RFC 3339");
            }
            other => panic!("expected pong, got {:?}", other),
        }
    }
}
