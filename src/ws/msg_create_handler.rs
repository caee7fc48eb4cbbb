use std::sync::Arc;

use tracing::{error, info};
use uuid::Uuid;

use crate::models::{CreateSessionMessage, ServerMessage, SessionCreatedMessage};
use crate::session::reconcile::ReconcileMode;
use crate::ws::connstate::ConnState;
use crate::ws::handler::{leave_session, send_to_one, spawn_forwarder, WsSender};
use crate::AppState;

/// Handle CreateSessionMessage
pub async fn handle_create_message(
    create_msg: CreateSessionMessage,
    app_state: &Arc<AppState>,
    conn: &mut ConnState,
    sender: &WsSender,
) {
    // A connection belongs to at most one session: creating while joined
    // leaves the previous session first.
    if let Some((prev_session, prev_participant)) = conn.release() {
        info!(
            "Connection {} leaves session {} to create a new one",
            conn.conn_id, prev_session
        );
        leave_session(app_state, &prev_session, &prev_participant).await;
    }

    let mode = if create_msg.authority_mode {
        ReconcileMode::Authority
    } else {
        ReconcileMode::Consensus
    };
    let participant_id = create_msg
        .participant_id
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let session = app_state
        .registry
        .create(create_msg.media_reference.clone(), mode)
        .await;

    // The creator is the first member, and in authority mode the
    // authority. Nobody else can have closed a session this new.
    match session.join(&participant_id, &conn.conn_id).await {
        Ok((_, rx)) => {
            let forwarder = spawn_forwarder(rx, conn.conn_id.clone(), sender.clone());
            conn.bind(session.session_id.clone(), participant_id, forwarder);
        }
        Err(e) => {
            error!("Failed to join freshly created session {}: {}", session.session_id, e);
            return;
        }
    }

    let created = ServerMessage::SessionCreated(SessionCreatedMessage {
        session_id: session.session_id.clone(),
        media_reference: create_msg.media_reference,
    });
    send_to_one(sender, &created).await;
    info!(
        "Session {} created by connection {}",
        session.session_id, conn.conn_id
    );
}
