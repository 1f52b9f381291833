//! Common data types for fan meeting components.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a fan meeting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MeetingId(pub Uuid);

impl MeetingId {
    /// Create a new random meeting ID
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MeetingId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MeetingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Unique identifier for a participant (fan or organizer)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(pub Uuid);

impl ParticipantId {
    /// Create a new random participant ID
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ParticipantId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identifier of a wait room or tele room.
///
/// The same value is used as the media provider's custom session id, so a
/// room and its provider session are always addressed by one string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub String);

impl RoomId {
    /// Create a room id from any string-like value.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Borrow the raw identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Organizer tele room id for a meeting (`tele-{meeting_id}`).
    #[must_use]
    pub fn organizer_tele_room(meeting_id: MeetingId) -> Self {
        Self(format!("tele-{meeting_id}"))
    }

    /// Organizer wait room id for a meeting (`wait-{meeting_id}`).
    #[must_use]
    pub fn organizer_wait_room(meeting_id: MeetingId) -> Self {
        Self(format!("wait-{meeting_id}"))
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_meeting_ids_are_unique() {
        assert_ne!(MeetingId::new(), MeetingId::new());
    }

    #[test]
    fn test_organizer_room_ids() {
        let meeting_id = MeetingId(Uuid::nil());
        assert_eq!(
            RoomId::organizer_tele_room(meeting_id).as_str(),
            "tele-00000000-0000-0000-0000-000000000000"
        );
        assert_eq!(
            RoomId::organizer_wait_room(meeting_id).as_str(),
            "wait-00000000-0000-0000-0000-000000000000"
        );
    }

    #[test]
    fn test_ids_serialize_transparently() {
        let room = RoomId::new("main-room");
        assert_eq!(serde_json::to_string(&room).unwrap(), "\"main-room\"");

        let participant = ParticipantId(Uuid::nil());
        assert_eq!(
            serde_json::to_string(&participant).unwrap(),
            "\"00000000-0000-0000-0000-000000000000\""
        );
    }
}
