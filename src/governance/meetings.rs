//! Meeting Registry
//!
//! Schedules meetings, moves them through their lifecycle, records
//! attendance and evaluates quorum against the roster.

use chrono::{NaiveDate, Utc};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use std::collections::HashSet;
use tracing::{info, warn};

use super::boards::BoardRegistry;
use super::quorum::QuorumStatus;
use super::types::*;
use crate::audit::log_event;
use crate::database::{now_timestamp, parse_optional_timestamp, parse_timestamp};
use crate::error::GovernanceError;

const MEETING_COLUMNS: &str =
    "id, board_id, title, scheduled_for, location, status, started_at, ended_at, created_at";

#[derive(Clone)]
pub struct MeetingRegistry {
    pool: SqlitePool,
    boards: BoardRegistry,
}

impl MeetingRegistry {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            boards: BoardRegistry::new(pool.clone()),
            pool,
        }
    }

    pub async fn schedule_meeting(
        &self,
        board_id: i64,
        new_meeting: &NewMeeting,
        actor: &str,
    ) -> Result<BoardMeeting, GovernanceError> {
        let board = self.boards.get_board(board_id).await?;

        let title = new_meeting.title.trim();
        if title.is_empty() {
            return Err(GovernanceError::ValidationError(
                "Meeting title must not be empty".to_string(),
            ));
        }

        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            r#"
            INSERT INTO board_meetings (board_id, title, scheduled_for, location, status, created_at)
            VALUES (?, ?, ?, ?, 'scheduled', ?)
            "#,
        )
        .bind(board_id)
        .bind(title)
        .bind(new_meeting.scheduled_for.to_rfc3339())
        .bind(new_meeting.location.as_deref())
        .bind(now_timestamp())
        .execute(&mut *tx)
        .await?;
        let meeting_id = result.last_insert_rowid();

        log_event(
            &mut *tx,
            Some(board.entity_id),
            "meeting_scheduled",
            Some(actor),
            &serde_json::json!({
                "board_id": board_id,
                "meeting_id": meeting_id,
                "scheduled_for": new_meeting.scheduled_for,
            }),
        )
        .await?;
        tx.commit().await?;

        info!("Scheduled meeting {} (ID: {}) for board {}", title, meeting_id, board_id);
        self.get_meeting(meeting_id).await
    }

    pub async fn get_meeting(&self, meeting_id: i64) -> Result<BoardMeeting, GovernanceError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM board_meetings WHERE id = ?",
            MEETING_COLUMNS
        ))
        .bind(meeting_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| GovernanceError::not_found("Meeting", meeting_id))?;

        meeting_from_row(&row)
    }

    /// Most recently scheduled first
    pub async fn list_meetings(&self, board_id: i64) -> Result<Vec<BoardMeeting>, GovernanceError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM board_meetings WHERE board_id = ? ORDER BY scheduled_for DESC, id DESC",
            MEETING_COLUMNS
        ))
        .bind(board_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(meeting_from_row).collect()
    }

    /// Move a meeting along its lifecycle
    pub async fn transition_meeting(
        &self,
        meeting_id: i64,
        next: MeetingStatus,
        actor: &str,
    ) -> Result<BoardMeeting, GovernanceError> {
        let meeting = self.get_meeting(meeting_id).await?;
        if !meeting.status.can_transition_to(next) {
            return Err(GovernanceError::invalid_transition(
                "meeting",
                meeting.status,
                next,
            ));
        }

        let board = self.boards.get_board(meeting.board_id).await?;
        let mut tx = self.pool.begin().await?;

        if next == MeetingStatus::Adjourned {
            let open_votes: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM motions WHERE meeting_id = ? AND status = 'voting'",
            )
            .bind(meeting_id)
            .fetch_one(&mut *tx)
            .await?;
            if open_votes > 0 {
                return Err(GovernanceError::Conflict(format!(
                    "Meeting {} has {} motion(s) still open for voting",
                    meeting_id, open_votes
                )));
            }
        }

        let now = now_timestamp();
        let (started_at, ended_at) = match next {
            MeetingStatus::InSession => (Some(now.as_str()), None),
            MeetingStatus::Adjourned | MeetingStatus::Cancelled => (None, Some(now.as_str())),
            MeetingStatus::Scheduled => (None, None),
        };

        let result = sqlx::query(
            r#"
            UPDATE board_meetings
            SET status = ?,
                started_at = COALESCE(?, started_at),
                ended_at = COALESCE(?, ended_at)
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(next.as_str())
        .bind(started_at)
        .bind(ended_at)
        .bind(meeting_id)
        .bind(meeting.status.as_str())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            warn!("Meeting {} changed concurrently; {} not applied", meeting_id, next);
            return Err(GovernanceError::invalid_transition(
                "meeting",
                meeting.status,
                next,
            ));
        }

        log_event(
            &mut *tx,
            Some(board.entity_id),
            "meeting_status_changed",
            Some(actor),
            &serde_json::json!({
                "meeting_id": meeting_id,
                "from": meeting.status,
                "to": next,
            }),
        )
        .await?;
        tx.commit().await?;

        info!("Meeting {} moved from {} to {}", meeting_id, meeting.status, next);
        self.get_meeting(meeting_id).await
    }

    /// Mark a member present or absent; the meeting must still be open
    pub async fn record_attendance(
        &self,
        meeting_id: i64,
        member_id: i64,
        present: bool,
        actor: &str,
    ) -> Result<Attendance, GovernanceError> {
        let meeting = self.get_meeting(meeting_id).await?;
        if meeting.status.is_closed() {
            return Err(GovernanceError::Conflict(format!(
                "Meeting {} is {}; attendance is closed",
                meeting_id, meeting.status
            )));
        }

        let member = self.boards.get_member(member_id).await?;
        if member.board_id != meeting.board_id {
            return Err(GovernanceError::ValidationError(format!(
                "Member {} does not sit on board {}",
                member_id, meeting.board_id
            )));
        }

        let board = self.boards.get_board(meeting.board_id).await?;
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO meeting_attendance (meeting_id, member_id, present, recorded_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (meeting_id, member_id) DO UPDATE SET
                present = excluded.present,
                recorded_at = excluded.recorded_at
            "#,
        )
        .bind(meeting_id)
        .bind(member_id)
        .bind(present)
        .bind(now_timestamp())
        .execute(&mut *tx)
        .await?;

        log_event(
            &mut *tx,
            Some(board.entity_id),
            "attendance_recorded",
            Some(actor),
            &serde_json::json!({
                "meeting_id": meeting_id,
                "member_id": member_id,
                "present": present,
            }),
        )
        .await?;
        tx.commit().await?;

        self.list_attendance(meeting_id)
            .await?
            .into_iter()
            .find(|a| a.member_id == member_id)
            .ok_or_else(|| GovernanceError::not_found("Attendance for member", member_id))
    }

    pub async fn list_attendance(&self, meeting_id: i64) -> Result<Vec<Attendance>, GovernanceError> {
        let rows = sqlx::query(
            r#"
            SELECT meeting_id, member_id, present, recorded_at
            FROM meeting_attendance
            WHERE meeting_id = ?
            ORDER BY member_id
            "#,
        )
        .bind(meeting_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(Attendance {
                    meeting_id: row.get::<i64, _>("meeting_id"),
                    member_id: row.get::<i64, _>("member_id"),
                    present: row.get::<bool, _>("present"),
                    recorded_at: parse_timestamp(&row.get::<String, _>("recorded_at"))?,
                })
            })
            .collect()
    }

    /// Quorum for a meeting as of today
    pub async fn check_meeting_quorum(&self, meeting_id: i64) -> Result<QuorumStatus, GovernanceError> {
        self.check_meeting_quorum_on(meeting_id, Utc::now().date_naive())
            .await
    }

    /// Only present members that are active with a current term count.
    pub async fn check_meeting_quorum_on(
        &self,
        meeting_id: i64,
        on: NaiveDate,
    ) -> Result<QuorumStatus, GovernanceError> {
        let meeting = self.get_meeting(meeting_id).await?;
        let board = self.boards.get_board(meeting.board_id).await?;

        let eligible: HashSet<i64> = self
            .boards
            .eligible_members(board.id, on)
            .await?
            .into_iter()
            .map(|member| member.id)
            .collect();

        let present = self
            .list_attendance(meeting_id)
            .await?
            .into_iter()
            .filter(|a| a.present && eligible.contains(&a.member_id))
            .count();

        Ok(QuorumStatus::evaluate(
            eligible.len(),
            present,
            board.quorum_percent,
        ))
    }

    pub(crate) fn boards(&self) -> &BoardRegistry {
        &self.boards
    }
}

fn meeting_from_row(row: &SqliteRow) -> Result<BoardMeeting, GovernanceError> {
    Ok(BoardMeeting {
        id: row.get::<i64, _>("id"),
        board_id: row.get::<i64, _>("board_id"),
        title: row.get::<String, _>("title"),
        scheduled_for: parse_timestamp(&row.get::<String, _>("scheduled_for"))?,
        location: row.get::<Option<String>, _>("location"),
        status: row
            .get::<String, _>("status")
            .parse()
            .map_err(GovernanceError::DatabaseError)?,
        started_at: parse_optional_timestamp(row.get::<Option<String>, _>("started_at"))?,
        ended_at: parse_optional_timestamp(row.get::<Option<String>, _>("ended_at"))?,
        created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
    })
}
