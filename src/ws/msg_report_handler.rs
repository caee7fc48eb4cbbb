use std::sync::Arc;

use crate::models::{ReportStateMessage, ServerMessage};
use crate::ws::connstate::ConnState;
use crate::ws::handler::{send_to_one, WsSender};
use crate::AppState;

/// Handle ReportStateMessage
pub async fn handle_report_message(
    report_msg: ReportStateMessage,
    app_state: &Arc<AppState>,
    conn: &ConnState,
    sender: &WsSender,
) {
    let Some(session) = app_state.registry.get(&report_msg.session_id).await else {
        send_to_one(sender, &ServerMessage::SessionNotFound).await;
        return;
    };

    // The reporter identity is whatever this connection is bound to.
    // Membership is deliberately not re-validated against the report:
    // the reconciliation policy alone decides.
    let reporter = conn.participant_id().unwrap_or(conn.conn_id.as_str());

    // Accepted, converged and unauthorized reports all end here without
    // a reply; only a vanished session is surfaced.
    if session
        .report(reporter, &conn.conn_id, report_msg.playback_state)
        .await
        .is_err()
    {
        send_to_one(sender, &ServerMessage::SessionNotFound).await;
    }
}
