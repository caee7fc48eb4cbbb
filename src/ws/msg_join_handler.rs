use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::models::{JoinSessionMessage, ServerMessage};
use crate::ws::connstate::ConnState;
use crate::ws::handler::{leave_session, send_to_one, spawn_forwarder, WsSender};
use crate::AppState;

/// Handle JoinSessionMessage
pub async fn handle_join_message(
    join_msg: JoinSessionMessage,
    app_state: &Arc<AppState>,
    conn: &mut ConnState,
    sender: &WsSender,
) {
    // A join against an unknown session must leave no trace, so the
    // target is resolved before the implicit leave below.
    let Some(session) = app_state.registry.get(&join_msg.session_id).await else {
        info!("Join rejected, session not found: {}", join_msg.session_id);
        send_to_one(sender, &ServerMessage::SessionNotFound).await;
        return;
    };

    // Implicit leave of any previous session, never a double membership.
    // A rejoin of the same session counts as leave-then-join too.
    if let Some((prev_session, prev_participant)) = conn.release() {
        info!(
            "Connection {} leaves session {} for session {}",
            conn.conn_id, prev_session, join_msg.session_id
        );
        leave_session(app_state, &prev_session, &prev_participant).await;
    }

    let participant_id = join_msg
        .participant_id
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    match session.join(&participant_id, &conn.conn_id).await {
        Ok((playback, rx)) => {
            let forwarder = spawn_forwarder(rx, conn.conn_id.clone(), sender.clone());
            conn.bind(session.session_id.clone(), participant_id.clone(), forwarder);
            send_to_one(sender, &ServerMessage::SessionJoined(playback)).await;
            info!(
                "Participant {} joined session {}",
                participant_id, join_msg.session_id
            );
        }
        Err(_) => {
            // Lost the race against deletion of an emptied session
            send_to_one(sender, &ServerMessage::SessionNotFound).await;
        }
    }
}
