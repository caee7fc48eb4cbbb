
use serde::{Deserialize, Serialize};
use crate::models::PlaybackState;

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionMessage {
    pub media_reference: String,
    /// Reports are gated on a single authority participant when set.
    #[serde(default)]
    pub authority_mode: bool,
    /// Generated when absent.
    pub participant_id: Option<String>,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct JoinSessionMessage {
    pub session_id: String,
    /// Generated when absent.
    pub participant_id: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ReportStateMessage {
    pub session_id: String,
    pub playback_state: PlaybackState,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMediaMessage {
    pub session_id: String,
    pub media_reference: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct PingMessage {}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SessionCreatedMessage {
    pub session_id: String,
    pub media_reference: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantJoinedMessage {
    pub participant_id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct MediaUpdatedMessage {
    pub media_reference: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PongMessage {
    pub date: String,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "create-session")]
    CreateSession(CreateSessionMessage),
    #[serde(rename = "join-session")]
    JoinSession(JoinSessionMessage),
    #[serde(rename = "report-state")]
    ReportState(ReportStateMessage),
    #[serde(rename = "update-media")]
    UpdateMedia(UpdateMediaMessage),
    #[serde(rename = "ping")]
    Ping(PingMessage),
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "session-created")]
    SessionCreated(SessionCreatedMessage),
    #[serde(rename = "session-joined")]
    SessionJoined(PlaybackState),
    #[serde(rename = "participant-joined")]
    ParticipantJoined(ParticipantJoinedMessage),
    #[serde(rename = "state-reconciled")]
    StateReconciled(PlaybackState),
    #[serde(rename = "media-updated")]
    MediaUpdated(MediaUpdatedMessage),
    #[serde(rename = "session-not-found")]
    SessionNotFound,
    #[serde(rename = "pong")]
    Pong(PongMessage),
}

/// Envelope carried on a session's fan-out channel. The payload is
/// serialized once, inside the session's critical section, so every
/// member observes the same event order.
#[derive(Debug, Clone)]
pub struct SessionBroadcast {
    pub sender_conn: String,
    pub payload: String,
}
