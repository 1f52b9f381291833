//! Room progression policy.
//!
//! Moving a fan from wait room N to N+1, or from a wait room into a tele
//! room, is decided by a pluggable [`ProgressionPolicy`]. The orchestrator
//! consults it only from `AdmissionService::advance`, never from `enter`.

use crate::models::{Meeting, ParticipantProgress};

/// What a policy wants to happen to one participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressionDecision {
    /// Keep the current position.
    Hold,
    /// Move to the given indices.
    MoveTo {
        next_wait_room_index: u32,
        next_tele_room_index: u32,
    },
}

/// Decides whether and where a participant advances.
pub trait ProgressionPolicy: Send + Sync {
    fn decide(&self, meeting: &Meeting, progress: &ParticipantProgress) -> ProgressionDecision;
}

/// Default policy: nobody ever moves.
#[derive(Debug, Default, Clone, Copy)]
pub struct HoldPosition;

impl ProgressionPolicy for HoldPosition {
    fn decide(&self, _meeting: &Meeting, _progress: &ParticipantProgress) -> ProgressionDecision {
        ProgressionDecision::Hold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use common::types::{MeetingId, ParticipantId, RoomId};

    #[test]
    fn test_hold_position_never_moves() {
        let now = Utc::now();
        let meeting = Meeting::new(MeetingId::new(), "m", 50, now, now, RoomId::new("main"));
        let progress = ParticipantProgress {
            participant_id: ParticipantId::new(),
            meeting_id: meeting.meeting_id,
            next_wait_room_index: 2,
            next_tele_room_index: 1,
            connection_id: None,
            created_at: now,
            updated_at: now,
        };

        assert_eq!(
            HoldPosition.decide(&meeting, &progress),
            ProgressionDecision::Hold
        );
    }
}
