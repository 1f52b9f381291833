//! Data models for the admission service.

use chrono::{DateTime, Utc};
use common::secret::{ExposeSecret, SecretString};
use common::types::{MeetingId, ParticipantId, RoomId};
use serde::{Deserialize, Serialize, Serializer};

/// Caller role, parsed from the `auth` claim of the caller token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Fan,
    Organizer,
    Admin,
}

impl Role {
    /// Parse a role key (`ROLE_FAN`, `ROLE_IDOL`, `ROLE_ADMIN`).
    ///
    /// Returns `None` for anything else.
    pub fn from_claim(value: &str) -> Option<Self> {
        match value {
            "ROLE_FAN" => Some(Role::Fan),
            "ROLE_IDOL" => Some(Role::Organizer),
            "ROLE_ADMIN" => Some(Role::Admin),
            _ => None,
        }
    }

    /// Bounded label value for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Fan => "fan",
            Role::Organizer => "organizer",
            Role::Admin => "admin",
        }
    }
}

/// Resolved caller identity, threaded through each request explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub participant_id: ParticipantId,
    pub role: Role,
}

/// Kind of room within a meeting's room sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoomKind {
    Wait,
    Tele,
}

impl RoomKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomKind::Wait => "wait",
            RoomKind::Tele => "tele",
        }
    }

    /// Parse the persisted representation.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "wait" => Some(RoomKind::Wait),
            "tele" => Some(RoomKind::Tele),
            _ => None,
        }
    }
}

/// A holding room. `room_id` doubles as the provider session id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitRoom {
    pub room_id: RoomId,
    pub position: u32,
}

/// A live interaction room. `room_id` doubles as the provider session id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeleRoom {
    pub room_id: RoomId,
    pub position: u32,
}

/// Persisted room row, kind-tagged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomRecord {
    pub meeting_id: MeetingId,
    pub kind: RoomKind,
    pub position: u32,
    pub room_id: RoomId,
}

impl RoomRecord {
    pub fn into_wait_room(self) -> WaitRoom {
        WaitRoom {
            room_id: self.room_id,
            position: self.position,
        }
    }

    pub fn into_tele_room(self) -> TeleRoom {
        TeleRoom {
            room_id: self.room_id,
            position: self.position,
        }
    }
}

/// One fan-meeting event with its ordered rooms.
#[derive(Debug, Clone)]
pub struct Meeting {
    pub meeting_id: MeetingId,
    pub name: String,
    pub capacity: u32,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Identifier of the first wait room, fixed at meeting creation.
    pub main_room_id: RoomId,
    pub first_wait_room_created: bool,
    pub wait_rooms: Vec<WaitRoom>,
    pub tele_rooms: Vec<TeleRoom>,
}

impl Meeting {
    /// A freshly created meeting with no rooms provisioned.
    pub fn new(
        meeting_id: MeetingId,
        name: impl Into<String>,
        capacity: u32,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        main_room_id: RoomId,
    ) -> Self {
        Self {
            meeting_id,
            name: name.into(),
            capacity,
            start_time,
            end_time,
            main_room_id,
            first_wait_room_created: false,
            wait_rooms: Vec::new(),
            tele_rooms: Vec::new(),
        }
    }

    pub fn wait_room(&self, index: u32) -> Option<&WaitRoom> {
        self.wait_rooms.get(usize::try_from(index).ok()?)
    }

    pub fn tele_room(&self, index: u32) -> Option<&TeleRoom> {
        self.tele_rooms.get(usize::try_from(index).ok()?)
    }
}

/// Per-(participant, meeting) position record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantProgress {
    pub participant_id: ParticipantId,
    pub meeting_id: MeetingId,
    pub next_wait_room_index: u32,
    pub next_tele_room_index: u32,
    /// Most recent provider connection id issued to this participant.
    pub connection_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Outcome of an atomic create-if-absent on progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressInsert {
    Created(ParticipantProgress),
    /// A row already existed; carries the stored row unchanged.
    Existing(ParticipantProgress),
}

/// Status of a fan's application to attend a meeting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApplyStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApplyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplyStatus::Pending => "PENDING",
            ApplyStatus::Approved => "APPROVED",
            ApplyStatus::Rejected => "REJECTED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "PENDING" => Some(ApplyStatus::Pending),
            "APPROVED" => Some(ApplyStatus::Approved),
            "REJECTED" => Some(ApplyStatus::Rejected),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyRecord {
    pub participant_id: ParticipantId,
    pub meeting_id: MeetingId,
    pub status: ApplyStatus,
}

/// Whether a fan entry restored a previous position or created one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Admission {
    FirstEntry,
    Reconnection,
}

/// Successful outcome of `Enter`.
#[derive(Debug, Serialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum EntryResult {
    Fan {
        #[serde(serialize_with = "expose_token")]
        connection_token: SecretString,
        admission: Admission,
        wait_room_index: u32,
        tele_room_index: u32,
    },
    Organizer {
        tele_room_session_id: RoomId,
        wait_room_session_id: RoomId,
        /// Set when this call created the meeting's first wait room session.
        #[serde(skip_serializing_if = "Option::is_none")]
        main_wait_room_session_id: Option<RoomId>,
        #[serde(serialize_with = "expose_token")]
        connection_token: SecretString,
    },
}

impl EntryResult {
    pub fn connection_token(&self) -> &SecretString {
        match self {
            EntryResult::Fan {
                connection_token, ..
            }
            | EntryResult::Organizer {
                connection_token, ..
            } => connection_token,
        }
    }
}

/// Tokens are handed to the client exactly once, in the response body.
fn expose_token<S: Serializer>(token: &SecretString, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(token.expose_secret())
}

/// Response body for the can-enter check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanEnterResponse {
    pub can_enter: bool,
}

/// Response body for an application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyResponse {
    pub meeting_id: MeetingId,
    pub participant_id: ParticipantId,
    pub status: ApplyStatus,
}

impl From<ApplyRecord> for ApplyResponse {
    fn from(record: ApplyRecord) -> Self {
        Self {
            meeting_id: record.meeting_id,
            participant_id: record.participant_id,
            status: record.status,
        }
    }
}

/// Public view of a meeting, without its rooms.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeetingSummary {
    pub meeting_id: MeetingId,
    pub name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl From<&Meeting> for MeetingSummary {
    fn from(meeting: &Meeting) -> Self {
        Self {
            meeting_id: meeting.meeting_id,
            name: meeting.name.clone(),
            start_time: meeting.start_time,
            end_time: meeting.end_time,
        }
    }
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Service status ("healthy" or "unhealthy").
    pub status: String,

    /// Storage status, omitted when not checked.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
}
