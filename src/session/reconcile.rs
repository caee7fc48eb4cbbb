use crate::models::PlaybackState;

/// Position delta below which a report is treated as already converged.
///
/// Participants periodically re-report their locally observed position;
/// echoing each of those back would ping-pong state between members
/// forever as their clocks drift. Anything within this band is ordinary
/// drift, anything beyond it is a genuine seek.
pub const POSITION_TOLERANCE_SECS: f64 = 0.5;

/// How a session decides whether an incoming state report wins. Chosen at
/// session creation, fixed for the session's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileMode {
    /// Only reports from the designated authority participant are
    /// accepted. Everyone else's reports are dropped without reply.
    Authority,
    /// No single authority: a report wins when it moves position beyond
    /// the tolerance band, flips play/pause, or changes the media
    /// reference.
    Consensus,
}

/// Outcome of reconciling one report against the current session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The report replaces the session state and is broadcast.
    Accept,
    /// Within tolerance of the current state, dropped without broadcast.
    Converged,
    /// Non-authority report in authority mode, dropped without broadcast.
    NotAuthority,
}

/// Decide whether `reported` supersedes `current`.
///
/// Pure decision logic: no session lookups, no membership checks. The
/// reporter's membership is deliberately not validated here.
pub fn reconcile(
    mode: ReconcileMode,
    authority: Option<&str>,
    reporter: &str,
    current: &PlaybackState,
    reported: &PlaybackState,
) -> Verdict {
    match mode {
        ReconcileMode::Authority => {
            // An unassigned authority slot accepts nothing.
            if authority == Some(reporter) {
                Verdict::Accept
            } else {
                Verdict::NotAuthority
            }
        }
        ReconcileMode::Consensus => {
            // Media changes always propagate, members must never be left
            // watching different content.
            if reported.media_reference != current.media_reference {
                return Verdict::Accept;
            }
            // Play/pause transitions always exceed tolerance.
            if reported.is_playing != current.is_playing {
                return Verdict::Accept;
            }
            if (reported.position_seconds - current.position_seconds).abs()
                > POSITION_TOLERANCE_SECS
            {
                Verdict::Accept
            } else {
                Verdict::Converged
            }
        }
    }
}
