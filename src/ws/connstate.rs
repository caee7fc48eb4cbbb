use tokio::task::JoinHandle;

/// Lifecycle phase of one transport connection.
///
/// `Connected` (no session) moves to `Joined` on a successful create or
/// join; the terminal disconnect transition happens when the socket loop
/// ends and the handler releases whatever membership is still bound.
pub enum ConnPhase {
    Connected,
    Joined {
        session_id: String,
        participant_id: String,
        /// Task forwarding session fan-out events to this connection.
        forwarder: JoinHandle<()>,
    },
}

/// Per-connection state driven by the socket loop. A connection is bound
/// to at most one session membership at a time.
pub struct ConnState {
    /// Identifies this connection in fan-out envelopes. Never reused.
    pub conn_id: String,
    pub phase: ConnPhase,
}

impl ConnState {
    pub fn new(conn_id: String) -> Self {
        Self {
            conn_id,
            phase: ConnPhase::Connected,
        }
    }

    /// Bind this connection to a session membership.
    pub fn bind(&mut self, session_id: String, participant_id: String, forwarder: JoinHandle<()>) {
        self.phase = ConnPhase::Joined {
            session_id,
            participant_id,
            forwarder,
        };
    }

    /// Drop the current binding, returning it so the caller can drive the
    /// session leave. Stops the forwarder. Idempotent.
    pub fn release(&mut self) -> Option<(String, String)> {
        match std::mem::replace(&mut self.phase, ConnPhase::Connected) {
            ConnPhase::Joined {
                session_id,
                participant_id,
                forwarder,
            } => {
                forwarder.abort();
                Some((session_id, participant_id))
            }
            ConnPhase::Connected => None,
        }
    }

    /// The participant identity this connection reports as, if joined.
    pub fn participant_id(&self) -> Option<&str> {
        match &self.phase {
            ConnPhase::Joined { participant_id, .. } => Some(participant_id),
            ConnPhase::Connected => None,
        }
    }
}
