//! Admission Orchestrator.
//!
//! Answers "admit this participant now" by composing the room registry, the
//! progress tracker and the provider gateway.
//!
//! # Flow
//!
//! Fan (serialized per participant and meeting):
//! 1. Load the meeting (`MeetingNotFound` if absent)
//! 2. Progress exists: reconnect into the recorded wait room, indices unchanged
//! 3. No progress: enter wait room 0, then record progress with indices 0
//!
//! Organizer (serialized per meeting):
//! 1. Create the main wait room session once, then set the meeting flag
//! 2. Create the organizer's tele and wait room sessions and record both rooms;
//!    `RoomAlreadyActive` only when both sessions were already live
//! 3. Issue a connection against the tele room
//!
//! A connection id is persisted only after the provider issued it. Every
//! provider call is bounded by the configured timeout.

use crate::errors::EntryError;
use crate::models::{
    Admission, ApplyRecord, ApplyStatus, EntryResult, Meeting, ParticipantProgress,
    ProgressInsert, Role, RoomKind,
};
use crate::observability::metrics;
use crate::repositories::AdmissionRepository;
use crate::services::keyed_lock::KeyedLocks;
use crate::services::progress_tracker::ProgressTracker;
use crate::services::progression::{HoldPosition, ProgressionDecision, ProgressionPolicy};
use crate::services::provider::{
    call_with_timeout, ConnectionOptions, IssuedConnection, ProviderError, ProviderGateway,
    SessionHandle,
};
use crate::services::room_registry::RoomRegistry;
use chrono::Utc;
use common::types::{MeetingId, ParticipantId, RoomId};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

/// Fan-meeting admission service.
pub struct AdmissionService {
    repo: Arc<dyn AdmissionRepository>,
    provider: Arc<dyn ProviderGateway>,
    registry: RoomRegistry,
    tracker: ProgressTracker,
    progression: Arc<dyn ProgressionPolicy>,
    provider_timeout: Duration,
    participant_locks: KeyedLocks<(ParticipantId, MeetingId)>,
    meeting_locks: KeyedLocks<MeetingId>,
}

impl AdmissionService {
    pub fn new(
        repo: Arc<dyn AdmissionRepository>,
        provider: Arc<dyn ProviderGateway>,
        provider_timeout: Duration,
    ) -> Self {
        Self {
            registry: RoomRegistry::new(Arc::clone(&repo)),
            tracker: ProgressTracker::new(Arc::clone(&repo)),
            repo,
            provider,
            progression: Arc::new(HoldPosition),
            provider_timeout,
            participant_locks: KeyedLocks::new(),
            meeting_locks: KeyedLocks::new(),
        }
    }

    /// Replace the default [`HoldPosition`] policy.
    #[must_use]
    pub fn with_progression_policy(mut self, policy: Arc<dyn ProgressionPolicy>) -> Self {
        self.progression = policy;
        self
    }

    /// Admit a participant into a meeting.
    ///
    /// # Errors
    ///
    /// - `MeetingNotFound` - meeting does not exist
    /// - `SessionNotFound` - the room's session is not live yet
    /// - `RoomIndexInvalid` - progress points at a missing room
    /// - `RoomAlreadyActive` - an organizer session was already created
    /// - `UnauthorizedRole` - role may not enter
    /// - `ProviderUnavailable` - provider failed or timed out
    #[instrument(
        skip_all,
        name = "fm.service.admission.enter",
        fields(meeting_id = %meeting_id, participant_id = %participant_id, role = role.as_str())
    )]
    pub async fn enter(
        &self,
        meeting_id: MeetingId,
        participant_id: ParticipantId,
        role: Role,
    ) -> Result<EntryResult, EntryError> {
        let start = Instant::now();

        let result = self.dispatch(meeting_id, participant_id, role).await;

        let outcome = match &result {
            Ok(EntryResult::Fan { admission, .. }) => match admission {
                Admission::FirstEntry => "first_entry",
                Admission::Reconnection => "reconnection",
            },
            Ok(EntryResult::Organizer { .. }) => "organizer_admitted",
            Err(err) => err.code(),
        };
        metrics::record_entry(role.as_str(), outcome, start.elapsed());

        match &result {
            Ok(_) => info!(target: "fm.service.admission", outcome = outcome, "Participant admitted"),
            Err(err) => warn!(
                target: "fm.service.admission",
                outcome = outcome,
                retryable = err.is_retryable(),
                error = %err,
                "Entry refused"
            ),
        }

        result
    }

    async fn dispatch(
        &self,
        meeting_id: MeetingId,
        participant_id: ParticipantId,
        role: Role,
    ) -> Result<EntryResult, EntryError> {
        let meeting = self.load_meeting(meeting_id).await?;

        match role {
            Role::Fan => self.enter_as_fan(&meeting, participant_id).await,
            Role::Organizer => self.enter_as_organizer(meeting_id, participant_id).await,
            Role::Admin => Err(EntryError::UnauthorizedRole),
        }
    }

    /// Whether a fan may enter: the meeting exists and the fan's application
    /// was approved.
    #[instrument(
        skip_all,
        name = "fm.service.admission.can_enter",
        fields(meeting_id = %meeting_id, participant_id = %participant_id)
    )]
    pub async fn can_enter(
        &self,
        meeting_id: MeetingId,
        participant_id: ParticipantId,
    ) -> Result<bool, EntryError> {
        self.load_meeting(meeting_id).await?;

        let approved = self
            .repo
            .find_apply_record(participant_id, meeting_id)
            .await?
            .is_some_and(|record| record.status == ApplyStatus::Approved);

        debug!(
            target: "fm.service.admission",
            approved = approved,
            "Evaluated entry eligibility"
        );

        Ok(approved)
    }

    /// Record a fan's application to a meeting.
    ///
    /// New applications are approved immediately. An existing application is
    /// returned unchanged, so a rejected fan stays rejected.
    ///
    /// # Errors
    ///
    /// - `MeetingNotFound` - meeting does not exist
    #[instrument(
        skip_all,
        name = "fm.service.admission.apply",
        fields(meeting_id = %meeting_id, participant_id = %participant_id)
    )]
    pub async fn apply(
        &self,
        meeting_id: MeetingId,
        participant_id: ParticipantId,
    ) -> Result<ApplyRecord, EntryError> {
        self.load_meeting(meeting_id).await?;

        let (record, inserted) = self
            .repo
            .create_apply_record_if_absent(&ApplyRecord {
                participant_id,
                meeting_id,
                status: ApplyStatus::Approved,
            })
            .await?;

        info!(
            target: "fm.service.admission",
            status = record.status.as_str(),
            new_application = inserted,
            "Application recorded"
        );

        Ok(record)
    }

    /// The earliest upcoming meeting the fan is approved for.
    ///
    /// # Errors
    ///
    /// - `MeetingNotFound` - no approved meeting starts after now
    #[instrument(
        skip_all,
        name = "fm.service.admission.next_meeting",
        fields(participant_id = %participant_id)
    )]
    pub async fn next_meeting(&self, participant_id: ParticipantId) -> Result<Meeting, EntryError> {
        self.repo
            .find_next_approved_meeting(participant_id, Utc::now())
            .await?
            .ok_or(EntryError::MeetingNotFound)
    }

    /// Participants currently placed in a meeting's wait room.
    ///
    /// # Errors
    ///
    /// - `MeetingNotFound` - meeting does not exist
    /// - `RoomIndexInvalid` - the meeting has no wait room at `index`
    pub async fn wait_room_participants(
        &self,
        meeting_id: MeetingId,
        index: u32,
    ) -> Result<Vec<ParticipantProgress>, EntryError> {
        let meeting = self.load_meeting(meeting_id).await?;
        self.registry
            .participants_in_wait_room(&meeting, index)
            .await
    }

    /// Apply the progression policy to one participant.
    ///
    /// Returns the participant's progress after the decision.
    ///
    /// # Errors
    ///
    /// - `MeetingNotFound` - meeting does not exist
    /// - `ParticipantNotEntered` - participant has no progress yet
    /// - `RoomIndexInvalid` - the policy chose a room the meeting does not have
    #[instrument(
        skip_all,
        name = "fm.service.admission.advance",
        fields(meeting_id = %meeting_id, participant_id = %participant_id)
    )]
    pub async fn advance(
        &self,
        meeting_id: MeetingId,
        participant_id: ParticipantId,
    ) -> Result<ParticipantProgress, EntryError> {
        let meeting = self.load_meeting(meeting_id).await?;
        let _guard = self
            .participant_locks
            .lock((participant_id, meeting_id))
            .await;

        let progress = self
            .tracker
            .find(participant_id, meeting_id)
            .await?
            .ok_or(EntryError::ParticipantNotEntered)?;

        match self.progression.decide(&meeting, &progress) {
            ProgressionDecision::Hold => Ok(progress),
            ProgressionDecision::MoveTo {
                next_wait_room_index,
                next_tele_room_index,
            } => {
                if next_wait_room_index != progress.next_wait_room_index {
                    RoomRegistry::wait_room_at(&meeting, next_wait_room_index)?;
                }
                if next_tele_room_index != progress.next_tele_room_index {
                    RoomRegistry::tele_room_at(&meeting, next_tele_room_index)?;
                }

                self.tracker
                    .set_position(&progress, next_wait_room_index, next_tele_room_index)
                    .await?;

                info!(
                    target: "fm.service.admission",
                    from_wait = progress.next_wait_room_index,
                    to_wait = next_wait_room_index,
                    from_tele = progress.next_tele_room_index,
                    to_tele = next_tele_room_index,
                    "Participant advanced"
                );

                self.tracker
                    .find(participant_id, meeting_id)
                    .await?
                    .ok_or(EntryError::ParticipantNotEntered)
            }
        }
    }

    async fn load_meeting(&self, meeting_id: MeetingId) -> Result<Meeting, EntryError> {
        self.repo
            .get_meeting(meeting_id)
            .await?
            .ok_or(EntryError::MeetingNotFound)
    }

    // ------------------------------------------------------------------
    // Fan
    // ------------------------------------------------------------------

    async fn enter_as_fan(
        &self,
        meeting: &Meeting,
        participant_id: ParticipantId,
    ) -> Result<EntryResult, EntryError> {
        let _guard = self
            .participant_locks
            .lock((participant_id, meeting.meeting_id))
            .await;

        match self.tracker.find(participant_id, meeting.meeting_id).await? {
            Some(progress) => self.reconnect_fan(meeting, progress).await,
            None => self.first_entry_fan(meeting, participant_id).await,
        }
    }

    async fn reconnect_fan(
        &self,
        meeting: &Meeting,
        progress: ParticipantProgress,
    ) -> Result<EntryResult, EntryError> {
        let room = RoomRegistry::wait_room_at(meeting, progress.next_wait_room_index)?;
        let session = self.live_session(&room.room_id).await?;
        let issued = self
            .issue_connection(&session, progress.participant_id)
            .await?;

        self.tracker
            .record_connection(&progress, &issued.connection_id)
            .await?;

        Ok(fan_result(issued, Admission::Reconnection, &progress))
    }

    async fn first_entry_fan(
        &self,
        meeting: &Meeting,
        participant_id: ParticipantId,
    ) -> Result<EntryResult, EntryError> {
        // Until the organizer opens the main room there is no wait room 0.
        let Some(room) = meeting.wait_room(0) else {
            return Err(EntryError::SessionNotFound(meeting.main_room_id.clone()));
        };

        let session = self.live_session(&room.room_id).await?;
        let issued = self.issue_connection(&session, participant_id).await?;

        match self
            .tracker
            .create_initial(participant_id, meeting.meeting_id, &issued.connection_id)
            .await?
        {
            ProgressInsert::Created(progress) => {
                Ok(fan_result(issued, Admission::FirstEntry, &progress))
            }
            ProgressInsert::Existing(progress) => {
                // Lost a cross-process race: behave as a reconnection.
                self.tracker
                    .record_connection(&progress, &issued.connection_id)
                    .await?;
                Ok(fan_result(issued, Admission::Reconnection, &progress))
            }
        }
    }

    // ------------------------------------------------------------------
    // Organizer
    // ------------------------------------------------------------------

    async fn enter_as_organizer(
        &self,
        meeting_id: MeetingId,
        participant_id: ParticipantId,
    ) -> Result<EntryResult, EntryError> {
        let _guard = self.meeting_locks.lock(meeting_id).await;

        // Re-read under the lock so the flag reflects any finished organizer entry.
        let mut meeting = self.load_meeting(meeting_id).await?;
        let mut main_wait_room_session_id = None;

        if !meeting.first_wait_room_created {
            let created = self.create_session(&meeting.main_room_id).await;
            if matches!(created, Err(ProviderError::AlreadyExists)) {
                // The session is live already; record that before reporting the conflict.
                self.open_main_wait_room(&meeting).await?;
                return Err(EntryError::RoomAlreadyActive);
            }
            created?;

            self.open_main_wait_room(&meeting).await?;
            main_wait_room_session_id = Some(meeting.main_room_id.clone());
            meeting = self.load_meeting(meeting_id).await?;
        }

        let tele_room_id = RoomId::organizer_tele_room(meeting_id);
        let wait_room_id = RoomId::organizer_wait_room(meeting_id);

        // A previous attempt may have opened one of the rooms before failing.
        let tele_created = self
            .open_organizer_room(&meeting, RoomKind::Tele, &tele_room_id)
            .await?;
        let wait_created = self
            .open_organizer_room(&meeting, RoomKind::Wait, &wait_room_id)
            .await?;
        if !tele_created && !wait_created {
            return Err(EntryError::RoomAlreadyActive);
        }

        let tele_session = self.live_session(&tele_room_id).await?;
        let issued = self.issue_connection(&tele_session, participant_id).await?;

        Ok(EntryResult::Organizer {
            tele_room_session_id: tele_room_id,
            wait_room_session_id: wait_room_id,
            main_wait_room_session_id,
            connection_token: issued.token,
        })
    }

    /// Create and record one organizer room.
    ///
    /// Returns false when the session was already live. The room is recorded
    /// either way.
    async fn open_organizer_room(
        &self,
        meeting: &Meeting,
        kind: RoomKind,
        room_id: &RoomId,
    ) -> Result<bool, EntryError> {
        let created = match self.create_session(room_id).await {
            Ok(_) => true,
            Err(ProviderError::AlreadyExists) => false,
            Err(err) => return Err(err.into()),
        };

        match kind {
            RoomKind::Tele => {
                self.registry.append_tele_room(meeting, room_id).await?;
            }
            RoomKind::Wait => {
                self.registry.append_wait_room(meeting, room_id).await?;
            }
        }

        if !created {
            debug!(
                target: "fm.service.admission",
                room_id = %room_id,
                kind = kind.as_str(),
                "Organizer room already live"
            );
        }
        Ok(created)
    }

    async fn open_main_wait_room(&self, meeting: &Meeting) -> Result<(), EntryError> {
        self.registry.ensure_first_wait_room(meeting).await?;
        self.repo
            .mark_first_wait_room_created(meeting.meeting_id)
            .await?;
        info!(
            target: "fm.service.admission",
            room_id = %meeting.main_room_id,
            "Main wait room opened"
        );
        Ok(())
    }

    // ------------------------------------------------------------------
    // Provider calls
    // ------------------------------------------------------------------

    async fn create_session(&self, room_id: &RoomId) -> Result<SessionHandle, ProviderError> {
        call_with_timeout(
            "create_session",
            self.provider_timeout,
            self.provider.create_session(room_id),
        )
        .await
    }

    async fn live_session(&self, room_id: &RoomId) -> Result<SessionHandle, EntryError> {
        call_with_timeout(
            "get_active_session",
            self.provider_timeout,
            self.provider.get_active_session(room_id),
        )
        .await?
        .ok_or_else(|| EntryError::SessionNotFound(room_id.clone()))
    }

    async fn issue_connection(
        &self,
        session: &SessionHandle,
        participant_id: ParticipantId,
    ) -> Result<IssuedConnection, EntryError> {
        let options = ConnectionOptions::for_participant(participant_id);
        Ok(call_with_timeout(
            "issue_connection",
            self.provider_timeout,
            self.provider.issue_connection(session, &options),
        )
        .await?)
    }
}

fn fan_result(
    issued: IssuedConnection,
    admission: Admission,
    progress: &ParticipantProgress,
) -> EntryResult {
    EntryResult::Fan {
        connection_token: issued.token,
        admission,
        wait_room_index: progress.next_wait_room_index,
        tele_room_index: progress.next_tele_room_index,
    }
}
