/// Errors surfaced to a requesting participant.
///
/// Unauthorized reports and duplicate joins are intentionally absent from
/// this taxonomy: both are expected steady-state occurrences and are
/// absorbed silently (see the reconciliation policy and the connection
/// state machine). Nothing here is fatal to the process.
#[derive(Debug, PartialEq, Eq)]
pub enum SyncError {
    /// The requested session identifier has no live session.
    SessionNotFound,
}

impl std::fmt::Display for SyncError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncError::SessionNotFound => write!(f, "session not found"),
        }
    }
}

impl std::error::Error for SyncError {}
