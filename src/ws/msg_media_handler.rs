use std::sync::Arc;

use crate::models::{ServerMessage, UpdateMediaMessage};
use crate::ws::connstate::ConnState;
use crate::ws::handler::{send_to_one, WsSender};
use crate::AppState;

/// Handle UpdateMediaMessage
pub async fn handle_media_message(
    media_msg: UpdateMediaMessage,
    app_state: &Arc<AppState>,
    conn: &ConnState,
    sender: &WsSender,
) {
    let Some(session) = app_state.registry.get(&media_msg.session_id).await else {
        send_to_one(sender, &ServerMessage::SessionNotFound).await;
        return;
    };

    if session
        .update_media(&conn.conn_id, media_msg.media_reference)
        .await
        .is_err()
    {
        send_to_one(sender, &ServerMessage::SessionNotFound).await;
    }
}
