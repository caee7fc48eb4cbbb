use std::collections::HashSet;

use tokio::sync::{broadcast, Mutex};
use tracing::{debug, error, info};

use crate::models::{
    MediaUpdatedMessage, ParticipantJoinedMessage, PlaybackState, ServerMessage,
    SessionBroadcast, SyncError,
};
use super::reconcile::{reconcile, ReconcileMode, Verdict};

/// Capacity of the per-session fan-out channel. Slow members fall behind
/// and skip events rather than stall the session.
const FANOUT_CAPACITY: usize = 100;

/// One coordination unit: the participants watching the same video and
/// the playback state they share.
///
/// All mutable state sits behind a single lock, so join/leave/report on
/// the same session are serialized while different sessions never block
/// each other. Fan-out payloads are serialized and enqueued inside the
/// critical section, which fixes one authoritative event order per
/// session; the actual socket writes happen in per-connection tasks.
pub struct Session {
    pub session_id: String,
    pub mode: ReconcileMode,
    state: Mutex<SessionState>,
    events: broadcast::Sender<SessionBroadcast>,
}

struct SessionState {
    playback: PlaybackState,
    members: HashSet<String>,
    authority: Option<String>,
    /// Set under the registry write lock when the session is removed.
    /// Operations racing the removal observe this and report not-found.
    closed: bool,
}

impl Session {
    pub fn new(session_id: String, media_reference: String, mode: ReconcileMode) -> Self {
        let (events, _rx) = broadcast::channel::<SessionBroadcast>(FANOUT_CAPACITY);
        Self {
            session_id,
            mode,
            state: Mutex::new(SessionState {
                playback: PlaybackState::initial(media_reference),
                members: HashSet::new(),
                authority: None,
                closed: false,
            }),
            events,
        }
    }

    /// Add a participant and hand back the current playback state together
    /// with a receiver for everything the session broadcasts from here on.
    ///
    /// Subscribing under the same lock that orders broadcasts means the
    /// snapshot plus the event stream form a gap-free view for the joiner.
    /// Existing members are notified; the joiner's own forwarder filters
    /// the notification out by connection id.
    pub async fn join(
        &self,
        participant_id: &str,
        conn_id: &str,
    ) -> Result<(PlaybackState, broadcast::Receiver<SessionBroadcast>), SyncError> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(SyncError::SessionNotFound);
        }

        state.members.insert(participant_id.to_string());
        if self.mode == ReconcileMode::Authority && state.authority.is_none() {
            state.authority = Some(participant_id.to_string());
            info!(
                "Participant {} took authority for session {}",
                participant_id, self.session_id
            );
        }

        let rx = self.events.subscribe();
        self.fan_out(
            conn_id,
            &ServerMessage::ParticipantJoined(ParticipantJoinedMessage {
                participant_id: participant_id.to_string(),
            }),
        );
        Ok((state.playback.clone(), rx))
    }

    /// Remove a participant. A no-op for unknown participants, disconnect
    /// races are expected. Returns whether the member set is now empty so
    /// the caller can drive registry deletion.
    pub async fn leave(&self, participant_id: &str, authority_handoff: bool) -> bool {
        let mut state = self.state.lock().await;
        if state.closed {
            return false;
        }

        if state.members.remove(participant_id)
            && state.authority.as_deref() == Some(participant_id)
        {
            state.authority = if authority_handoff {
                let promoted = state.members.iter().next().cloned();
                if let Some(ref successor) = promoted {
                    info!(
                        "Authority for session {} handed off to {}",
                        self.session_id, successor
                    );
                }
                promoted
            } else {
                info!("Authority for session {} unassigned", self.session_id);
                None
            };
        }

        state.members.is_empty()
    }

    /// Run a playback-state report through the reconciliation policy,
    /// replacing and broadcasting the state when it wins.
    pub async fn report(
        &self,
        reporter: &str,
        conn_id: &str,
        reported: PlaybackState,
    ) -> Result<Verdict, SyncError> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(SyncError::SessionNotFound);
        }

        let verdict = reconcile(
            self.mode,
            state.authority.as_deref(),
            reporter,
            &state.playback,
            &reported,
        );
        match verdict {
            Verdict::Accept => {
                state.playback = reported;
                self.fan_out(
                    conn_id,
                    &ServerMessage::StateReconciled(state.playback.clone()),
                );
                info!(
                    "State reconciled for session {}: position={:.3}s, playing={}",
                    self.session_id, state.playback.position_seconds, state.playback.is_playing
                );
            }
            Verdict::Converged => {
                debug!(
                    "Report within tolerance for session {}, dropped",
                    self.session_id
                );
            }
            Verdict::NotAuthority => {
                debug!(
                    "Report from non-authority {} for session {}, dropped",
                    reporter, self.session_id
                );
            }
        }
        Ok(verdict)
    }

    /// Swap the media reference. Never subject to the reconciliation
    /// policy: any participant may change it, in either mode, and the
    /// change is broadcast unconditionally.
    pub async fn update_media(
        &self,
        conn_id: &str,
        media_reference: String,
    ) -> Result<(), SyncError> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(SyncError::SessionNotFound);
        }

        state.playback.media_reference = media_reference.clone();
        self.fan_out(
            conn_id,
            &ServerMessage::MediaUpdated(MediaUpdatedMessage { media_reference }),
        );
        info!("Media reference updated for session {}", self.session_id);
        Ok(())
    }

    /// Mark the session closed when empty. Called by the registry under
    /// its write lock; a `true` result means the entry must be removed.
    pub(crate) async fn close_if_empty(&self) -> bool {
        let mut state = self.state.lock().await;
        if state.members.is_empty() && !state.closed {
            state.closed = true;
            true
        } else {
            false
        }
    }

    pub async fn member_count(&self) -> usize {
        self.state.lock().await.members.len()
    }

    /// Serialize once, enqueue for every subscribed member. Send errors
    /// only mean nobody is subscribed, which is normal while a session
    /// empties out.
    fn fan_out(&self, sender_conn: &str, message: &ServerMessage) {
        let payload = match serde_json::to_string(message) {
            Ok(payload) => payload,
            Err(e) => {
                error!(
                    "Failed to serialize fan-out event for session {}: {}",
                    self.session_id, e
                );
                return;
            }
        };
        if self
            .events
            .send(SessionBroadcast {
                sender_conn: sender_conn.to_string(),
                payload,
            })
            .is_err()
        {
            debug!("No members subscribed to session {}", self.session_id);
        }
    }

    #[cfg(test)]
    pub(crate) async fn snapshot(&self) -> PlaybackState {
        self.state.lock().await.playback.clone()
    }

    #[cfg(test)]
    pub(crate) async fn authority(&self) -> Option<String> {
        self.state.lock().await.authority.clone()
    }
}
