use chrono::Utc;
use tracing::info;

use crate::models::{PingMessage, PongMessage, ServerMessage};
use crate::ws::connstate::ConnState;
use crate::ws::handler::{send_to_one, WsSender};

/// Handle PingMessage
pub async fn handle_ping_message(_ping_msg: &PingMessage, conn: &ConnState, sender: &WsSender) {
    // Handle ping message - send a pong message back.
    info!("Ping message received on connection {}", conn.conn_id);

    let pong = ServerMessage::Pong(PongMessage {
        date: Utc::now().to_rfc3339(),
    });
    send_to_one(sender, &pong).await;
}
