//! Minutes Lifecycle
//!
//! Drafts are freely editable. Finalized minutes are locked: a change is a
//! new draft version that amends the prior one, which is marked `amended`.

use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use tracing::{info, warn};

use super::approvals::{ApprovalLog, ApprovalSignature, ApprovalSubject, GovernanceApproval, NewApproval};
use super::meetings::MeetingRegistry;
use super::types::*;
use crate::audit::{log_event, sha256_prefixed};
use crate::database::{now_timestamp, parse_optional_timestamp, parse_timestamp};
use crate::error::GovernanceError;

const MINUTES_COLUMNS: &str = "id, meeting_id, version, content, status, amends_id, amendment_reason, \
     content_hash, finalized_by, finalized_at, created_at, updated_at";

/// Minutes locked by finalization, with the approval that sealed them.
#[derive(Debug, Clone, serde::Serialize)]
pub struct FinalizedMinutes {
    pub minutes: MeetingMinutes,
    pub approval: GovernanceApproval,
}

#[derive(Clone)]
pub struct MinutesBook {
    pool: SqlitePool,
    meetings: MeetingRegistry,
    approvals: ApprovalLog,
}

impl MinutesBook {
    pub fn new(pool: SqlitePool, approvals: ApprovalLog) -> Self {
        Self {
            meetings: MeetingRegistry::new(pool.clone()),
            pool,
            approvals,
        }
    }

    /// Start version 1 of a meeting's minutes
    pub async fn create_draft(
        &self,
        meeting_id: i64,
        content: &str,
        actor: &str,
    ) -> Result<MeetingMinutes, GovernanceError> {
        let meeting = self.meetings.get_meeting(meeting_id).await?;
        if meeting.status == MeetingStatus::Cancelled {
            return Err(GovernanceError::Conflict(format!(
                "Meeting {} was cancelled; it has no minutes",
                meeting_id
            )));
        }

        let existing: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM meeting_minutes WHERE meeting_id = ?")
                .bind(meeting_id)
                .fetch_one(&self.pool)
                .await?;
        if existing > 0 {
            return Err(GovernanceError::Conflict(format!(
                "Meeting {} already has minutes; edit the draft or amend the finalized version",
                meeting_id
            )));
        }

        let entity_id = self.entity_for_meeting(&meeting).await?;
        let now = now_timestamp();
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            r#"
            INSERT INTO meeting_minutes (meeting_id, version, content, status, created_at, updated_at)
            VALUES (?, 1, ?, 'draft', ?, ?)
            "#,
        )
        .bind(meeting_id)
        .bind(content)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?;
        let minutes_id = result.last_insert_rowid();

        log_event(
            &mut *tx,
            Some(entity_id),
            "minutes_drafted",
            Some(actor),
            &serde_json::json!({
                "meeting_id": meeting_id,
                "minutes_id": minutes_id,
                "version": 1,
            }),
        )
        .await?;
        tx.commit().await?;

        info!("Drafted minutes {} for meeting {}", minutes_id, meeting_id);
        self.get_minutes(minutes_id).await
    }

    pub async fn get_minutes(&self, minutes_id: i64) -> Result<MeetingMinutes, GovernanceError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM meeting_minutes WHERE id = ?",
            MINUTES_COLUMNS
        ))
        .bind(minutes_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| GovernanceError::not_found("Minutes", minutes_id))?;

        minutes_from_row(&row)
    }

    /// Every version, oldest first
    pub async fn list_minutes(&self, meeting_id: i64) -> Result<Vec<MeetingMinutes>, GovernanceError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM meeting_minutes WHERE meeting_id = ? ORDER BY version",
            MINUTES_COLUMNS
        ))
        .bind(meeting_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(minutes_from_row).collect()
    }

    pub async fn update_draft(
        &self,
        minutes_id: i64,
        content: &str,
        actor: &str,
    ) -> Result<MeetingMinutes, GovernanceError> {
        let minutes = self.get_minutes(minutes_id).await?;
        if !minutes.status.is_editable() {
            return Err(GovernanceError::Conflict(format!(
                "Minutes {} are {}; create an amendment instead",
                minutes_id, minutes.status
            )));
        }

        let meeting = self.meetings.get_meeting(minutes.meeting_id).await?;
        let entity_id = self.entity_for_meeting(&meeting).await?;
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "UPDATE meeting_minutes SET content = ?, updated_at = ? WHERE id = ? AND status = 'draft'",
        )
        .bind(content)
        .bind(now_timestamp())
        .bind(minutes_id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            warn!("Minutes {} were finalized while being edited", minutes_id);
            return Err(GovernanceError::Conflict(format!(
                "Minutes {} are no longer a draft",
                minutes_id
            )));
        }

        log_event(
            &mut *tx,
            Some(entity_id),
            "minutes_edited",
            Some(actor),
            &serde_json::json!({
                "minutes_id": minutes_id,
                "version": minutes.version,
            }),
        )
        .await?;
        tx.commit().await?;

        self.get_minutes(minutes_id).await
    }

    /// Lock a draft after its meeting has adjourned and record the approval
    pub async fn finalize(
        &self,
        minutes_id: i64,
        actor: &str,
        signature: Option<ApprovalSignature>,
    ) -> Result<FinalizedMinutes, GovernanceError> {
        let minutes = self.get_minutes(minutes_id).await?;
        if !minutes.status.can_transition_to(MinutesStatus::Finalized) {
            return Err(GovernanceError::invalid_transition(
                "minutes",
                minutes.status,
                MinutesStatus::Finalized,
            ));
        }

        let meeting = self.meetings.get_meeting(minutes.meeting_id).await?;
        if meeting.status != MeetingStatus::Adjourned {
            return Err(GovernanceError::Conflict(format!(
                "Meeting {} is {}; minutes are finalized after adjournment",
                meeting.id, meeting.status
            )));
        }
        let board = self.meetings.boards().get_board(meeting.board_id).await?;

        let content_hash = sha256_prefixed(minutes.content.as_bytes());
        let payload = serde_json::json!({
            "minutes_id": minutes.id,
            "meeting_id": minutes.meeting_id,
            "version": minutes.version,
            "content_hash": content_hash,
            "amends_id": minutes.amends_id,
        });

        let now = now_timestamp();
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE meeting_minutes
            SET status = 'finalized', content_hash = ?, finalized_by = ?, finalized_at = ?, updated_at = ?
            WHERE id = ? AND status = 'draft' AND content = ?
            "#,
        )
        .bind(&content_hash)
        .bind(actor)
        .bind(&now)
        .bind(&now)
        .bind(minutes_id)
        .bind(&minutes.content)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            warn!("Minutes {} changed during finalization", minutes_id);
            return Err(GovernanceError::Conflict(format!(
                "Minutes {} changed during finalization",
                minutes_id
            )));
        }

        // A rejected signature drops the transaction and the draft stays open.
        let approval = self
            .approvals
            .append(
                &mut tx,
                NewApproval {
                    entity_id: board.entity_id,
                    subject_type: ApprovalSubject::Minutes,
                    subject_id: minutes.id,
                    actor_profile_id: actor.to_string(),
                    payload,
                    signature,
                },
            )
            .await?;

        log_event(
            &mut *tx,
            Some(board.entity_id),
            "minutes_finalized",
            Some(actor),
            &serde_json::json!({
                "minutes_id": minutes_id,
                "version": minutes.version,
                "content_hash": content_hash,
                "approval_id": approval.approval_id,
            }),
        )
        .await?;
        tx.commit().await?;

        info!("Finalized minutes {} (version {})", minutes_id, minutes.version);
        Ok(FinalizedMinutes {
            minutes: self.get_minutes(minutes_id).await?,
            approval,
        })
    }

    /// Supersede finalized minutes with a new draft version
    pub async fn amend(
        &self,
        minutes_id: i64,
        content: &str,
        reason: &str,
        actor: &str,
    ) -> Result<MeetingMinutes, GovernanceError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(GovernanceError::ValidationError(
                "An amendment needs a reason".to_string(),
            ));
        }

        let prior = self.get_minutes(minutes_id).await?;
        if !prior.status.can_transition_to(MinutesStatus::Amended) {
            return Err(GovernanceError::invalid_transition(
                "minutes",
                prior.status,
                MinutesStatus::Amended,
            ));
        }

        let meeting = self.meetings.get_meeting(prior.meeting_id).await?;
        let entity_id = self.entity_for_meeting(&meeting).await?;
        let now = now_timestamp();
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "UPDATE meeting_minutes SET status = 'amended', updated_at = ? WHERE id = ? AND status = 'finalized'",
        )
        .bind(&now)
        .bind(minutes_id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(GovernanceError::invalid_transition(
                "minutes",
                prior.status,
                MinutesStatus::Amended,
            ));
        }

        let result = sqlx::query(
            r#"
            INSERT INTO meeting_minutes
            (meeting_id, version, content, status, amends_id, amendment_reason, created_at, updated_at)
            VALUES (?, ?, ?, 'draft', ?, ?, ?, ?)
            "#,
        )
        .bind(prior.meeting_id)
        .bind(prior.version + 1)
        .bind(content)
        .bind(prior.id)
        .bind(reason)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?;
        let amendment_id = result.last_insert_rowid();

        log_event(
            &mut *tx,
            Some(entity_id),
            "minutes_amended",
            Some(actor),
            &serde_json::json!({
                "minutes_id": amendment_id,
                "amends_id": prior.id,
                "version": prior.version + 1,
                "reason": reason,
            }),
        )
        .await?;
        tx.commit().await?;

        info!(
            "Minutes {} amended by version {} (ID: {})",
            prior.id,
            prior.version + 1,
            amendment_id
        );
        self.get_minutes(amendment_id).await
    }

    /// Board that the minutes' meeting belongs to
    pub async fn board_for_minutes(&self, minutes_id: i64) -> Result<Board, GovernanceError> {
        let minutes = self.get_minutes(minutes_id).await?;
        let meeting = self.meetings.get_meeting(minutes.meeting_id).await?;
        self.meetings.boards().get_board(meeting.board_id).await
    }

    async fn entity_for_meeting(&self, meeting: &BoardMeeting) -> Result<i64, GovernanceError> {
        Ok(self.meetings.boards().get_board(meeting.board_id).await?.entity_id)
    }
}

fn minutes_from_row(row: &SqliteRow) -> Result<MeetingMinutes, GovernanceError> {
    Ok(MeetingMinutes {
        id: row.get::<i64, _>("id"),
        meeting_id: row.get::<i64, _>("meeting_id"),
        version: row.get::<i64, _>("version"),
        content: row.get::<String, _>("content"),
        status: row
            .get::<String, _>("status")
            .parse()
            .map_err(GovernanceError::DatabaseError)?,
        amends_id: row.get::<Option<i64>, _>("amends_id"),
        amendment_reason: row.get::<Option<String>, _>("amendment_reason"),
        content_hash: row.get::<Option<String>, _>("content_hash"),
        finalized_by: row.get::<Option<String>, _>("finalized_by"),
        finalized_at: parse_optional_timestamp(row.get::<Option<String>, _>("finalized_at"))?,
        created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
        updated_at: parse_timestamp(&row.get::<String, _>("updated_at"))?,
    })
}
