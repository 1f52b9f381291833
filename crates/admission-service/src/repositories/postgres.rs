//! PostgreSQL repository.
//!
//! # Security
//!
//! - All queries use parameterized statements
//! - Connection ids are not logged
//! - Create-if-absent uses `INSERT ... ON CONFLICT DO NOTHING` so concurrent
//!   writers across processes never produce duplicate rows

use super::{AdmissionRepository, RepositoryError};
use crate::models::{
    ApplyRecord, ApplyStatus, Meeting, ParticipantProgress, ProgressInsert, RoomKind, RoomRecord,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::types::{MeetingId, ParticipantId, RoomId};
use sqlx::PgPool;
use tracing::instrument;
use uuid::Uuid;

/// Repository backed by a PostgreSQL pool.
#[derive(Clone)]
pub struct PgRepository {
    pool: PgPool,
}

impl PgRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn to_db_index(value: u32) -> Result<i32, RepositoryError> {
    i32::try_from(value).map_err(|_| RepositoryError::Corrupt(format!("index {value} out of range")))
}

fn from_db_index(value: i32) -> Result<u32, RepositoryError> {
    u32::try_from(value).map_err(|_| RepositoryError::Corrupt(format!("negative index {value}")))
}

#[async_trait]
impl AdmissionRepository for PgRepository {
    #[instrument(skip_all, fields(meeting_id = %meeting_id))]
    async fn get_meeting(&self, meeting_id: MeetingId) -> Result<Option<Meeting>, RepositoryError> {
        let row: Option<MeetingRow> = sqlx::query_as(
            r#"
            SELECT meeting_id, name, capacity, start_time, end_time,
                   main_room_id, first_wait_room_created
            FROM fan_meetings
            WHERE meeting_id = $1
            "#,
        )
        .bind(meeting_id.0)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let rooms: Vec<RoomRow> = sqlx::query_as(
            r#"
            SELECT kind, position, room_id
            FROM meeting_rooms
            WHERE meeting_id = $1
            ORDER BY kind, position
            "#,
        )
        .bind(meeting_id.0)
        .fetch_all(&self.pool)
        .await?;

        let mut meeting = Meeting::new(
            MeetingId(row.meeting_id),
            row.name,
            u32::try_from(row.capacity)
                .map_err(|_| RepositoryError::Corrupt("negative capacity".to_string()))?,
            row.start_time,
            row.end_time,
            RoomId::new(row.main_room_id),
        );
        meeting.first_wait_room_created = row.first_wait_room_created;

        for room in rooms {
            let record = room.into_record(meeting.meeting_id)?;
            match record.kind {
                RoomKind::Wait => meeting.wait_rooms.push(record.into_wait_room()),
                RoomKind::Tele => meeting.tele_rooms.push(record.into_tele_room()),
            }
        }

        Ok(Some(meeting))
    }

    #[instrument(skip_all, fields(meeting_id = %meeting.meeting_id))]
    async fn insert_meeting(&self, meeting: &Meeting) -> Result<(), RepositoryError> {
        let capacity = i32::try_from(meeting.capacity)
            .map_err(|_| RepositoryError::Corrupt("capacity out of range".to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO fan_meetings (
                meeting_id, name, capacity, start_time, end_time,
                main_room_id, first_wait_room_created
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(meeting.meeting_id.0)
        .bind(&meeting.name)
        .bind(capacity)
        .bind(meeting.start_time)
        .bind(meeting.end_time)
        .bind(meeting.main_room_id.as_str())
        .bind(meeting.first_wait_room_created)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[instrument(skip_all, fields(meeting_id = %meeting_id, kind = kind.as_str(), position = position))]
    async fn insert_room_if_absent(
        &self,
        meeting_id: MeetingId,
        kind: RoomKind,
        position: u32,
        room_id: &RoomId,
    ) -> Result<(RoomRecord, bool), RepositoryError> {
        let db_position = to_db_index(position)?;

        // Conflicts on either (meeting, kind, position) or (meeting, kind, room_id)
        let inserted: Option<RoomRow> = sqlx::query_as(
            r#"
            INSERT INTO meeting_rooms (meeting_id, kind, position, room_id)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT DO NOTHING
            RETURNING kind, position, room_id
            "#,
        )
        .bind(meeting_id.0)
        .bind(kind.as_str())
        .bind(db_position)
        .bind(room_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = inserted {
            tracing::debug!(target: "fm.repo.postgres", "Room inserted");
            return Ok((row.into_record(meeting_id)?, true));
        }

        let existing: RoomRow = sqlx::query_as(
            r#"
            SELECT kind, position, room_id
            FROM meeting_rooms
            WHERE meeting_id = $1
              AND kind = $2
              AND (position = $3 OR room_id = $4)
            ORDER BY position = $3 DESC
            LIMIT 1
            "#,
        )
        .bind(meeting_id.0)
        .bind(kind.as_str())
        .bind(db_position)
        .bind(room_id.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok((existing.into_record(meeting_id)?, false))
    }

    #[instrument(skip_all, fields(meeting_id = %meeting_id))]
    async fn mark_first_wait_room_created(
        &self,
        meeting_id: MeetingId,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            UPDATE fan_meetings
            SET first_wait_room_created = TRUE
            WHERE meeting_id = $1
            "#,
        )
        .bind(meeting_id.0)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[instrument(skip_all, fields(meeting_id = %meeting_id, participant_id = %participant_id))]
    async fn find_progress(
        &self,
        participant_id: ParticipantId,
        meeting_id: MeetingId,
    ) -> Result<Option<ParticipantProgress>, RepositoryError> {
        let row: Option<ProgressRow> = sqlx::query_as(
            r#"
            SELECT participant_id, meeting_id, next_wait_room_index, next_tele_room_index,
                   connection_id, created_at, updated_at
            FROM participant_progress
            WHERE participant_id = $1 AND meeting_id = $2
            "#,
        )
        .bind(participant_id.0)
        .bind(meeting_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(ProgressRow::into_progress).transpose()
    }

    #[instrument(skip_all, fields(meeting_id = %meeting_id, participant_id = %participant_id))]
    async fn create_progress_if_absent(
        &self,
        participant_id: ParticipantId,
        meeting_id: MeetingId,
        connection_id: &str,
    ) -> Result<ProgressInsert, RepositoryError> {
        let inserted: Option<ProgressRow> = sqlx::query_as(
            r#"
            INSERT INTO participant_progress (
                participant_id, meeting_id, next_wait_room_index, next_tele_room_index,
                connection_id, created_at, updated_at
            )
            VALUES ($1, $2, 0, 0, $3, NOW(), NOW())
            ON CONFLICT (participant_id, meeting_id) DO NOTHING
            RETURNING participant_id, meeting_id, next_wait_room_index, next_tele_room_index,
                      connection_id, created_at, updated_at
            "#,
        )
        .bind(participant_id.0)
        .bind(meeting_id.0)
        .bind(connection_id)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = inserted {
            return Ok(ProgressInsert::Created(row.into_progress()?));
        }

        tracing::debug!(
            target: "fm.repo.postgres",
            "Progress row already exists, returning stored row"
        );

        let existing = self
            .find_progress(participant_id, meeting_id)
            .await?
            .ok_or_else(|| {
                RepositoryError::Database("progress row vanished after conflict".to_string())
            })?;

        Ok(ProgressInsert::Existing(existing))
    }

    #[instrument(skip_all, fields(meeting_id = %meeting_id, participant_id = %participant_id))]
    async fn record_connection(
        &self,
        participant_id: ParticipantId,
        meeting_id: MeetingId,
        connection_id: &str,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE participant_progress
            SET connection_id = $3, updated_at = NOW()
            WHERE participant_id = $1 AND meeting_id = $2
            "#,
        )
        .bind(participant_id.0)
        .bind(meeting_id.0)
        .bind(connection_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip_all, fields(meeting_id = %meeting_id, participant_id = %participant_id))]
    async fn update_progress_indices(
        &self,
        participant_id: ParticipantId,
        meeting_id: MeetingId,
        next_wait_room_index: u32,
        next_tele_room_index: u32,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE participant_progress
            SET next_wait_room_index = $3,
                next_tele_room_index = $4,
                updated_at = NOW()
            WHERE participant_id = $1 AND meeting_id = $2
            "#,
        )
        .bind(participant_id.0)
        .bind(meeting_id.0)
        .bind(to_db_index(next_wait_room_index)?)
        .bind(to_db_index(next_tele_room_index)?)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip_all, fields(meeting_id = %meeting_id, participant_id = %participant_id))]
    async fn find_apply_record(
        &self,
        participant_id: ParticipantId,
        meeting_id: MeetingId,
    ) -> Result<Option<ApplyRecord>, RepositoryError> {
        let row: Option<ApplyRow> = sqlx::query_as(
            r#"
            SELECT participant_id, meeting_id, status
            FROM apply_records
            WHERE participant_id = $1 AND meeting_id = $2
            "#,
        )
        .bind(participant_id.0)
        .bind(meeting_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(ApplyRow::into_record).transpose()
    }

    async fn upsert_apply_record(&self, record: &ApplyRecord) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO apply_records (participant_id, meeting_id, status)
            VALUES ($1, $2, $3)
            ON CONFLICT (participant_id, meeting_id)
            DO UPDATE SET status = EXCLUDED.status
            "#,
        )
        .bind(record.participant_id.0)
        .bind(record.meeting_id.0)
        .bind(record.status.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[instrument(skip_all, fields(meeting_id = %record.meeting_id, participant_id = %record.participant_id))]
    async fn create_apply_record_if_absent(
        &self,
        record: &ApplyRecord,
    ) -> Result<(ApplyRecord, bool), RepositoryError> {
        let inserted: Option<ApplyRow> = sqlx::query_as(
            r#"
            INSERT INTO apply_records (participant_id, meeting_id, status)
            VALUES ($1, $2, $3)
            ON CONFLICT (participant_id, meeting_id) DO NOTHING
            RETURNING participant_id, meeting_id, status
            "#,
        )
        .bind(record.participant_id.0)
        .bind(record.meeting_id.0)
        .bind(record.status.as_str())
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = inserted {
            return Ok((row.into_record()?, true));
        }

        let existing = self
            .find_apply_record(record.participant_id, record.meeting_id)
            .await?
            .ok_or_else(|| {
                RepositoryError::Database("apply record vanished after conflict".to_string())
            })?;

        Ok((existing, false))
    }

    #[instrument(skip_all, fields(participant_id = %participant_id))]
    async fn find_next_approved_meeting(
        &self,
        participant_id: ParticipantId,
        after: DateTime<Utc>,
    ) -> Result<Option<Meeting>, RepositoryError> {
        let meeting_id: Option<Uuid> = sqlx::query_scalar(
            r#"
            SELECT m.meeting_id
            FROM fan_meetings m
            JOIN apply_records a ON a.meeting_id = m.meeting_id
            WHERE a.participant_id = $1
              AND a.status = $2
              AND m.start_time > $3
            ORDER BY m.start_time ASC, m.meeting_id ASC
            LIMIT 1
            "#,
        )
        .bind(participant_id.0)
        .bind(ApplyStatus::Approved.as_str())
        .bind(after)
        .fetch_optional(&self.pool)
        .await?;

        match meeting_id {
            Some(id) => self.get_meeting(MeetingId(id)).await,
            None => Ok(None),
        }
    }

    #[instrument(skip_all, fields(meeting_id = %meeting_id, kind = kind.as_str(), index = index))]
    async fn participants_in_room(
        &self,
        meeting_id: MeetingId,
        kind: RoomKind,
        index: u32,
    ) -> Result<Vec<ParticipantProgress>, RepositoryError> {
        let query = match kind {
            RoomKind::Wait => {
                r#"
                SELECT participant_id, meeting_id, next_wait_room_index, next_tele_room_index,
                       connection_id, created_at, updated_at
                FROM participant_progress
                WHERE meeting_id = $1 AND next_wait_room_index = $2
                ORDER BY created_at ASC, participant_id ASC
                "#
            }
            RoomKind::Tele => {
                r#"
                SELECT participant_id, meeting_id, next_wait_room_index, next_tele_room_index,
                       connection_id, created_at, updated_at
                FROM participant_progress
                WHERE meeting_id = $1 AND next_tele_room_index = $2
                ORDER BY created_at ASC, participant_id ASC
                "#
            }
        };

        let rows: Vec<ProgressRow> = sqlx::query_as(query)
            .bind(meeting_id.0)
            .bind(to_db_index(index)?)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(ProgressRow::into_progress).collect()
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct MeetingRow {
    meeting_id: Uuid,
    name: String,
    capacity: i32,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    main_room_id: String,
    first_wait_room_created: bool,
}

#[derive(sqlx::FromRow)]
struct RoomRow {
    kind: String,
    position: i32,
    room_id: String,
}

impl RoomRow {
    fn into_record(self, meeting_id: MeetingId) -> Result<RoomRecord, RepositoryError> {
        let kind = RoomKind::parse(&self.kind)
            .ok_or_else(|| RepositoryError::Corrupt(format!("room kind {}", self.kind)))?;
        Ok(RoomRecord {
            meeting_id,
            kind,
            position: from_db_index(self.position)?,
            room_id: RoomId::new(self.room_id),
        })
    }
}

#[derive(sqlx::FromRow)]
struct ProgressRow {
    participant_id: Uuid,
    meeting_id: Uuid,
    next_wait_room_index: i32,
    next_tele_room_index: i32,
    connection_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ProgressRow {
    fn into_progress(self) -> Result<ParticipantProgress, RepositoryError> {
        Ok(ParticipantProgress {
            participant_id: ParticipantId(self.participant_id),
            meeting_id: MeetingId(self.meeting_id),
            next_wait_room_index: from_db_index(self.next_wait_room_index)?,
            next_tele_room_index: from_db_index(self.next_tele_room_index)?,
            connection_id: self.connection_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ApplyRow {
    participant_id: Uuid,
    meeting_id: Uuid,
    status: String,
}

impl ApplyRow {
    fn into_record(self) -> Result<ApplyRecord, RepositoryError> {
        let status = ApplyStatus::parse(&self.status)
            .ok_or_else(|| RepositoryError::Corrupt(format!("apply status {}", self.status)))?;
        Ok(ApplyRecord {
            participant_id: ParticipantId(self.participant_id),
            meeting_id: MeetingId(self.meeting_id),
            status,
        })
    }
}
