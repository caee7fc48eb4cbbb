use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Shared playback state of a session. Replaced as a whole on every
/// accepted report, never field-by-field.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackState {
    pub position_seconds: f64,
    pub is_playing: bool,
    pub media_reference: String,
}

impl PlaybackState {
    /// State of a freshly created session: paused at the start.
    pub fn initial(media_reference: String) -> Self {
        Self {
            position_seconds: 0.0,
            is_playing: false,
            media_reference,
        }
    }
}
