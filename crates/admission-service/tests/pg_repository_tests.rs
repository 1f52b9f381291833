//! PostgreSQL repository integration tests.
//!
//! Each test gets a fresh database with the workspace migrations applied.

// Test code is allowed to use expect/unwrap for assertions
#![allow(clippy::unwrap_used, clippy::expect_used)]

use admission_service::models::{ApplyRecord, ApplyStatus, Meeting, ProgressInsert, RoomKind};
use admission_service::repositories::{AdmissionRepository, PgRepository};
use anyhow::Result;
use chrono::Utc;
use common::types::{MeetingId, ParticipantId, RoomId};
use sqlx::PgPool;

async fn seed_meeting(repo: &PgRepository) -> Result<MeetingId> {
    let now = Utc::now();
    let meeting = Meeting::new(
        MeetingId::new(),
        "pg fan meeting",
        50,
        now,
        now + chrono::Duration::hours(1),
        RoomId::new("main-room"),
    );
    repo.insert_meeting(&meeting).await?;
    Ok(meeting.meeting_id)
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_get_meeting_round_trips_rooms(pool: PgPool) -> Result<()> {
    let repo = PgRepository::new(pool);
    let meeting_id = seed_meeting(&repo).await?;

    repo.insert_room_if_absent(meeting_id, RoomKind::Wait, 0, &RoomId::new("main-room"))
        .await?;
    repo.insert_room_if_absent(meeting_id, RoomKind::Tele, 0, &RoomId::new("tele-a"))
        .await?;
    repo.insert_room_if_absent(meeting_id, RoomKind::Wait, 1, &RoomId::new("wait-a"))
        .await?;

    let meeting = repo.get_meeting(meeting_id).await?.expect("meeting exists");
    let wait: Vec<&str> = meeting.wait_rooms.iter().map(|r| r.room_id.as_str()).collect();
    let tele: Vec<&str> = meeting.tele_rooms.iter().map(|r| r.room_id.as_str()).collect();

    assert_eq!(wait, ["main-room", "wait-a"]);
    assert_eq!(tele, ["tele-a"]);
    assert!(!meeting.first_wait_room_created);
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_get_unknown_meeting_is_none(pool: PgPool) -> Result<()> {
    let repo = PgRepository::new(pool);
    assert!(repo.get_meeting(MeetingId::new()).await?.is_none());
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_insert_room_if_absent_keeps_first_writer(pool: PgPool) -> Result<()> {
    let repo = PgRepository::new(pool);
    let meeting_id = seed_meeting(&repo).await?;

    let (first, created) = repo
        .insert_room_if_absent(meeting_id, RoomKind::Wait, 0, &RoomId::new("main-room"))
        .await?;
    assert!(created);

    let (second, created) = repo
        .insert_room_if_absent(meeting_id, RoomKind::Wait, 0, &RoomId::new("other"))
        .await?;
    assert!(!created);
    assert_eq!(second, first);
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_mark_first_wait_room_created(pool: PgPool) -> Result<()> {
    let repo = PgRepository::new(pool);
    let meeting_id = seed_meeting(&repo).await?;

    repo.mark_first_wait_room_created(meeting_id).await?;
    repo.mark_first_wait_room_created(meeting_id).await?;

    let meeting = repo.get_meeting(meeting_id).await?.unwrap();
    assert!(meeting.first_wait_room_created);
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_progress_create_if_absent_is_once(pool: PgPool) -> Result<()> {
    let repo = PgRepository::new(pool);
    let meeting_id = seed_meeting(&repo).await?;
    let fan = ParticipantId::new();

    let first = repo.create_progress_if_absent(fan, meeting_id, "con_1").await?;
    assert!(matches!(first, ProgressInsert::Created(ref p) if p.connection_id.as_deref() == Some("con_1")));

    let second = repo.create_progress_if_absent(fan, meeting_id, "con_2").await?;
    let ProgressInsert::Existing(existing) = second else {
        return Err(anyhow::anyhow!("second insert should find the existing row"));
    };
    assert_eq!(existing.connection_id.as_deref(), Some("con_1"));
    assert_eq!(existing.next_wait_room_index, 0);
    assert_eq!(existing.next_tele_room_index, 0);
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_record_connection_and_update_indices(pool: PgPool) -> Result<()> {
    let repo = PgRepository::new(pool);
    let meeting_id = seed_meeting(&repo).await?;
    let fan = ParticipantId::new();

    assert!(!repo.record_connection(fan, meeting_id, "con_0").await?);

    repo.create_progress_if_absent(fan, meeting_id, "con_1").await?;
    assert!(repo.record_connection(fan, meeting_id, "con_2").await?);
    assert!(repo.update_progress_indices(fan, meeting_id, 1, 2).await?);

    let progress = repo.find_progress(fan, meeting_id).await?.unwrap();
    assert_eq!(progress.connection_id.as_deref(), Some("con_2"));
    assert_eq!(progress.next_wait_room_index, 1);
    assert_eq!(progress.next_tele_room_index, 2);
    assert!(progress.updated_at >= progress.created_at);
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_apply_record_upsert(pool: PgPool) -> Result<()> {
    let repo = PgRepository::new(pool);
    let meeting_id = seed_meeting(&repo).await?;
    let fan = ParticipantId::new();

    assert!(repo.find_apply_record(fan, meeting_id).await?.is_none());

    let mut record = ApplyRecord {
        participant_id: fan,
        meeting_id,
        status: ApplyStatus::Pending,
    };
    repo.upsert_apply_record(&record).await?;
    record.status = ApplyStatus::Approved;
    repo.upsert_apply_record(&record).await?;

    let stored = repo.find_apply_record(fan, meeting_id).await?.unwrap();
    assert_eq!(stored.status, ApplyStatus::Approved);
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_create_apply_record_if_absent_keeps_first(pool: PgPool) -> Result<()> {
    let repo = PgRepository::new(pool);
    let meeting_id = seed_meeting(&repo).await?;
    let fan = ParticipantId::new();

    let rejected = ApplyRecord {
        participant_id: fan,
        meeting_id,
        status: ApplyStatus::Rejected,
    };
    let (stored, created) = repo.create_apply_record_if_absent(&rejected).await?;
    assert!(created);
    assert_eq!(stored.status, ApplyStatus::Rejected);

    let approved = ApplyRecord {
        status: ApplyStatus::Approved,
        ..rejected
    };
    let (stored, created) = repo.create_apply_record_if_absent(&approved).await?;
    assert!(!created);
    assert_eq!(stored.status, ApplyStatus::Rejected);
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_find_next_approved_meeting(pool: PgPool) -> Result<()> {
    let repo = PgRepository::new(pool);
    let fan = ParticipantId::new();
    let now = Utc::now();

    let mut ids = Vec::new();
    for (hours, status) in [
        (-1, ApplyStatus::Approved),
        (5, ApplyStatus::Approved),
        (2, ApplyStatus::Approved),
        (1, ApplyStatus::Pending),
    ] {
        let start = now + chrono::Duration::hours(hours);
        let meeting = Meeting::new(
            MeetingId::new(),
            "scheduled",
            50,
            start,
            start + chrono::Duration::hours(1),
            RoomId::new(format!("main-{hours}")),
        );
        repo.insert_meeting(&meeting).await?;
        repo.upsert_apply_record(&ApplyRecord {
            participant_id: fan,
            meeting_id: meeting.meeting_id,
            status,
        })
        .await?;
        ids.push(meeting.meeting_id);
    }

    let next = repo.find_next_approved_meeting(fan, now).await?.expect("upcoming meeting");
    assert_eq!(Some(&next.meeting_id), ids.get(2));
    assert!(repo
        .find_next_approved_meeting(ParticipantId::new(), now)
        .await?
        .is_none());
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_participants_in_room(pool: PgPool) -> Result<()> {
    let repo = PgRepository::new(pool);
    let meeting_id = seed_meeting(&repo).await?;
    let stays = ParticipantId::new();
    let moves = ParticipantId::new();

    repo.create_progress_if_absent(stays, meeting_id, "con_1").await?;
    repo.create_progress_if_absent(moves, meeting_id, "con_2").await?;
    repo.update_progress_indices(moves, meeting_id, 1, 0).await?;

    let main: Vec<ParticipantId> = repo
        .participants_in_room(meeting_id, RoomKind::Wait, 0)
        .await?
        .iter()
        .map(|p| p.participant_id)
        .collect();
    let tele = repo
        .participants_in_room(meeting_id, RoomKind::Tele, 0)
        .await?;

    assert_eq!(main, [stays]);
    assert_eq!(tele.len(), 2);
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_ping(pool: PgPool) -> Result<()> {
    let repo = PgRepository::new(pool);
    repo.ping().await?;
    Ok(())
}
