//! Motion and Vote Ledger
//!
//! Motions belong to a meeting; votes belong to a motion and are accepted
//! only while the motion is open and its meeting is in session.

use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Row, Sqlite, SqlitePool, Transaction};
use tracing::{info, warn};

use super::meetings::MeetingRegistry;
use super::quorum::QuorumStatus;
use super::types::*;
use crate::audit::log_event;
use crate::database::{now_timestamp, parse_optional_timestamp, parse_timestamp};
use crate::error::GovernanceError;

const MOTION_COLUMNS: &str = "id, meeting_id, title, description, moved_by, seconded_by, status, \
     yes_count, no_count, abstain_count, created_at, decided_at";

/// Outcome of closing a vote.
#[derive(Debug, Clone, serde::Serialize)]
pub struct VoteResult {
    pub motion: Motion,
    pub tally: VoteTally,
    pub quorum: QuorumStatus,
}

#[derive(Clone)]
pub struct MotionLedger {
    pool: SqlitePool,
    meetings: MeetingRegistry,
}

impl MotionLedger {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            meetings: MeetingRegistry::new(pool.clone()),
            pool,
        }
    }

    pub async fn create_motion(
        &self,
        meeting_id: i64,
        new_motion: &NewMotion,
        actor: &str,
    ) -> Result<Motion, GovernanceError> {
        let meeting = self.meetings.get_meeting(meeting_id).await?;
        if meeting.status.is_closed() {
            return Err(GovernanceError::Conflict(format!(
                "Meeting {} is {}; no new motions",
                meeting_id, meeting.status
            )));
        }

        let title = new_motion.title.trim();
        if title.is_empty() {
            return Err(GovernanceError::ValidationError(
                "Motion title must not be empty".to_string(),
            ));
        }

        if let (Some(mover), Some(seconder)) = (new_motion.moved_by, new_motion.seconded_by) {
            if mover == seconder {
                return Err(GovernanceError::ValidationError(
                    "A motion cannot be seconded by its mover".to_string(),
                ));
            }
        }
        for member_id in [new_motion.moved_by, new_motion.seconded_by]
            .into_iter()
            .flatten()
        {
            let member = self.meetings.boards().get_member(member_id).await?;
            if member.board_id != meeting.board_id || member.status != MemberStatus::Active {
                return Err(GovernanceError::ValidationError(format!(
                    "Member {} is not an active member of board {}",
                    member_id, meeting.board_id
                )));
            }
        }

        let entity_id = self.entity_for_board(meeting.board_id).await?;
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            r#"
            INSERT INTO motions (meeting_id, title, description, moved_by, seconded_by, status, created_at)
            VALUES (?, ?, ?, ?, ?, 'pending', ?)
            "#,
        )
        .bind(meeting_id)
        .bind(title)
        .bind(&new_motion.description)
        .bind(new_motion.moved_by)
        .bind(new_motion.seconded_by)
        .bind(now_timestamp())
        .execute(&mut *tx)
        .await?;
        let motion_id = result.last_insert_rowid();

        log_event(
            &mut *tx,
            Some(entity_id),
            "motion_created",
            Some(actor),
            &serde_json::json!({
                "meeting_id": meeting_id,
                "motion_id": motion_id,
                "title": title,
            }),
        )
        .await?;
        tx.commit().await?;

        info!("Created motion {} (ID: {}) in meeting {}", title, motion_id, meeting_id);
        self.get_motion(motion_id).await
    }

    pub async fn get_motion(&self, motion_id: i64) -> Result<Motion, GovernanceError> {
        let row = sqlx::query(&format!("SELECT {} FROM motions WHERE id = ?", MOTION_COLUMNS))
            .bind(motion_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| GovernanceError::not_found("Motion", motion_id))?;

        motion_from_row(&row)
    }

    pub async fn list_motions(&self, meeting_id: i64) -> Result<Vec<Motion>, GovernanceError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM motions WHERE meeting_id = ? ORDER BY id",
            MOTION_COLUMNS
        ))
        .bind(meeting_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(motion_from_row).collect()
    }

    /// Open the floor for voting; requires a sitting meeting with quorum
    pub async fn open_voting(&self, motion_id: i64, actor: &str) -> Result<Motion, GovernanceError> {
        let motion = self.get_motion(motion_id).await?;
        let meeting = self.meetings.get_meeting(motion.meeting_id).await?;

        if !motion.status.can_transition_to(MotionStatus::Voting) {
            return Err(GovernanceError::invalid_transition(
                "motion",
                motion.status,
                MotionStatus::Voting,
            ));
        }
        if meeting.status != MeetingStatus::InSession {
            return Err(GovernanceError::Conflict(format!(
                "Meeting {} is {}; voting requires an in-session meeting",
                meeting.id, meeting.status
            )));
        }
        self.meetings
            .check_meeting_quorum(meeting.id)
            .await?
            .ensure_met()?;

        let entity_id = self.entity_for_board(meeting.board_id).await?;
        let mut tx = self.pool.begin().await?;
        apply_status(&mut tx, &motion, MotionStatus::Voting).await?;

        // A reopened motion starts from an empty ballot box.
        let cleared = sqlx::query("DELETE FROM votes WHERE motion_id = ?")
            .bind(motion_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        log_event(
            &mut *tx,
            Some(entity_id),
            "voting_opened",
            Some(actor),
            &serde_json::json!({
                "motion_id": motion_id,
                "cleared_votes": cleared,
            }),
        )
        .await?;
        tx.commit().await?;

        info!("Voting opened on motion {}", motion_id);
        self.get_motion(motion_id).await
    }

    /// Cast the ballot of the seat bound to `profile_id`
    pub async fn cast_vote_as(
        &self,
        motion_id: i64,
        profile_id: &str,
        choice: VoteChoice,
    ) -> Result<Vote, GovernanceError> {
        let motion = self.get_motion(motion_id).await?;
        let meeting = self.meetings.get_meeting(motion.meeting_id).await?;
        let member = self
            .meetings
            .boards()
            .member_for_profile(meeting.board_id, profile_id)
            .await?
            .ok_or_else(|| {
                GovernanceError::Forbidden(format!(
                    "Profile {} holds no active seat on board {}",
                    profile_id, meeting.board_id
                ))
            })?;

        self.cast_vote(motion_id, member.id, choice, profile_id).await
    }

    /// Record a vote; a repeated ballot replaces the member's earlier choice
    pub async fn cast_vote(
        &self,
        motion_id: i64,
        member_id: i64,
        choice: VoteChoice,
        actor: &str,
    ) -> Result<Vote, GovernanceError> {
        let motion = self.get_motion(motion_id).await?;
        let meeting = self.meetings.get_meeting(motion.meeting_id).await?;

        if meeting.status.is_closed() {
            return Err(GovernanceError::Conflict(format!(
                "Meeting {} is {}; votes are closed",
                meeting.id, meeting.status
            )));
        }
        if motion.status != MotionStatus::Voting {
            return Err(GovernanceError::Conflict(format!(
                "Motion {} is {}, not open for voting",
                motion_id, motion.status
            )));
        }

        let member = self.meetings.boards().get_member(member_id).await?;
        if member.board_id != meeting.board_id {
            return Err(GovernanceError::Forbidden(format!(
                "Member {} does not sit on board {}",
                member_id, meeting.board_id
            )));
        }
        if !member.is_eligible_on(Utc::now().date_naive()) {
            return Err(GovernanceError::Forbidden(format!(
                "Member {} is not an active member with a current term",
                member_id
            )));
        }

        let entity_id = self.entity_for_board(meeting.board_id).await?;
        let mut tx = self.pool.begin().await?;

        // The status guard in the subquery keeps a vote from landing after close.
        let result = sqlx::query(
            r#"
            INSERT INTO votes (motion_id, member_id, choice, cast_at)
            SELECT ?, ?, ?, ?
            WHERE EXISTS (SELECT 1 FROM motions WHERE id = ? AND status = 'voting')
            ON CONFLICT (motion_id, member_id) DO UPDATE SET
                choice = excluded.choice,
                cast_at = excluded.cast_at
            "#,
        )
        .bind(motion_id)
        .bind(member_id)
        .bind(choice.as_str())
        .bind(now_timestamp())
        .bind(motion_id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            warn!("Vote on motion {} arrived after voting closed", motion_id);
            return Err(GovernanceError::Conflict(format!(
                "Motion {} closed before the vote was recorded",
                motion_id
            )));
        }

        log_event(
            &mut *tx,
            Some(entity_id),
            "vote_cast",
            Some(actor),
            &serde_json::json!({
                "motion_id": motion_id,
                "member_id": member_id,
                "choice": choice,
            }),
        )
        .await?;
        tx.commit().await?;

        self.list_votes(motion_id)
            .await?
            .into_iter()
            .find(|vote| vote.member_id == member_id)
            .ok_or_else(|| GovernanceError::not_found("Vote for member", member_id))
    }

    pub async fn list_votes(&self, motion_id: i64) -> Result<Vec<Vote>, GovernanceError> {
        let rows = sqlx::query(
            "SELECT id, motion_id, member_id, choice, cast_at FROM votes WHERE motion_id = ? ORDER BY id",
        )
        .bind(motion_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(Vote {
                    id: row.get::<i64, _>("id"),
                    motion_id: row.get::<i64, _>("motion_id"),
                    member_id: row.get::<i64, _>("member_id"),
                    choice: row
                        .get::<String, _>("choice")
                        .parse()
                        .map_err(GovernanceError::DatabaseError)?,
                    cast_at: parse_timestamp(&row.get::<String, _>("cast_at"))?,
                })
            })
            .collect()
    }

    pub async fn tally(&self, motion_id: i64) -> Result<VoteTally, GovernanceError> {
        let row = sqlx::query(TALLY_SQL)
            .bind(motion_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(tally_from_row(&row))
    }

    /// Close voting and decide the motion: passed iff quorum holds and yes > no
    pub async fn close_voting(&self, motion_id: i64, actor: &str) -> Result<VoteResult, GovernanceError> {
        let motion = self.get_motion(motion_id).await?;
        if motion.status != MotionStatus::Voting {
            return Err(GovernanceError::invalid_transition(
                "motion",
                motion.status,
                MotionStatus::Passed,
            ));
        }
        let meeting = self.meetings.get_meeting(motion.meeting_id).await?;
        let quorum = self.meetings.check_meeting_quorum(meeting.id).await?;
        let entity_id = self.entity_for_board(meeting.board_id).await?;

        let mut tx = self.pool.begin().await?;
        let row = sqlx::query(TALLY_SQL)
            .bind(motion_id)
            .fetch_one(&mut *tx)
            .await?;
        let tally = tally_from_row(&row);

        let outcome = if quorum.met && tally.carries() {
            MotionStatus::Passed
        } else {
            MotionStatus::Failed
        };

        let result = sqlx::query(
            r#"
            UPDATE motions
            SET status = ?, yes_count = ?, no_count = ?, abstain_count = ?, decided_at = ?
            WHERE id = ? AND status = 'voting'
            "#,
        )
        .bind(outcome.as_str())
        .bind(tally.yes)
        .bind(tally.no)
        .bind(tally.abstain)
        .bind(now_timestamp())
        .bind(motion_id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(GovernanceError::invalid_transition(
                "motion",
                motion.status,
                outcome,
            ));
        }
        log_event(
            &mut *tx,
            Some(entity_id),
            "voting_closed",
            Some(actor),
            &serde_json::json!({
                "motion_id": motion_id,
                "outcome": outcome,
                "tally": tally,
                "quorum_met": quorum.met,
            }),
        )
        .await?;
        tx.commit().await?;

        info!(
            "Motion {} {} ({} yes, {} no, {} abstain)",
            motion_id, outcome, tally.yes, tally.no, tally.abstain
        );

        Ok(VoteResult {
            motion: self.get_motion(motion_id).await?,
            tally,
            quorum,
        })
    }

    pub async fn table_motion(&self, motion_id: i64, actor: &str) -> Result<Motion, GovernanceError> {
        self.simple_transition(motion_id, MotionStatus::Tabled, "motion_tabled", actor)
            .await
    }

    /// Take a tabled motion back up; its meeting must still be open
    pub async fn resume_motion(&self, motion_id: i64, actor: &str) -> Result<Motion, GovernanceError> {
        let motion = self.get_motion(motion_id).await?;
        let meeting = self.meetings.get_meeting(motion.meeting_id).await?;
        if meeting.status.is_closed() {
            return Err(GovernanceError::Conflict(format!(
                "Meeting {} is {}; tabled motions cannot be resumed",
                meeting.id, meeting.status
            )));
        }
        self.simple_transition(motion_id, MotionStatus::Pending, "motion_resumed", actor)
            .await
    }

    async fn simple_transition(
        &self,
        motion_id: i64,
        next: MotionStatus,
        event_type: &str,
        actor: &str,
    ) -> Result<Motion, GovernanceError> {
        let motion = self.get_motion(motion_id).await?;
        if !motion.status.can_transition_to(next) {
            return Err(GovernanceError::invalid_transition("motion", motion.status, next));
        }
        let meeting = self.meetings.get_meeting(motion.meeting_id).await?;

        let entity_id = self.entity_for_board(meeting.board_id).await?;

        let mut tx = self.pool.begin().await?;
        apply_status(&mut tx, &motion, next).await?;
        log_event(
            &mut *tx,
            Some(entity_id),
            event_type,
            Some(actor),
            &serde_json::json!({
                "motion_id": motion_id,
                "from": motion.status,
                "to": next,
            }),
        )
        .await?;
        tx.commit().await?;

        info!("Motion {} moved from {} to {}", motion_id, motion.status, next);
        self.get_motion(motion_id).await
    }

    async fn entity_for_board(&self, board_id: i64) -> Result<i64, GovernanceError> {
        Ok(self.meetings.boards().get_board(board_id).await?.entity_id)
    }
}

/// Conditional status write; fails if the motion moved since it was read.
async fn apply_status(
    tx: &mut Transaction<'_, Sqlite>,
    motion: &Motion,
    next: MotionStatus,
) -> Result<(), GovernanceError> {
    let result = sqlx::query("UPDATE motions SET status = ? WHERE id = ? AND status = ?")
        .bind(next.as_str())
        .bind(motion.id)
        .bind(motion.status.as_str())
        .execute(&mut **tx)
        .await?;

    if result.rows_affected() == 0 {
        return Err(GovernanceError::invalid_transition("motion", motion.status, next));
    }
    Ok(())
}

const TALLY_SQL: &str = r#"
    SELECT
        COALESCE(SUM(CASE WHEN choice = 'yes' THEN 1 ELSE 0 END), 0) AS yes,
        COALESCE(SUM(CASE WHEN choice = 'no' THEN 1 ELSE 0 END), 0) AS no,
        COALESCE(SUM(CASE WHEN choice = 'abstain' THEN 1 ELSE 0 END), 0) AS abstain
    FROM votes
    WHERE motion_id = ?
"#;

fn tally_from_row(row: &SqliteRow) -> VoteTally {
    VoteTally {
        yes: row.get::<i64, _>("yes"),
        no: row.get::<i64, _>("no"),
        abstain: row.get::<i64, _>("abstain"),
    }
}

fn motion_from_row(row: &SqliteRow) -> Result<Motion, GovernanceError> {
    Ok(Motion {
        id: row.get::<i64, _>("id"),
        meeting_id: row.get::<i64, _>("meeting_id"),
        title: row.get::<String, _>("title"),
        description: row.get::<String, _>("description"),
        moved_by: row.get::<Option<i64>, _>("moved_by"),
        seconded_by: row.get::<Option<i64>, _>("seconded_by"),
        status: row
            .get::<String, _>("status")
            .parse()
            .map_err(GovernanceError::DatabaseError)?,
        yes_count: row.get::<i64, _>("yes_count"),
        no_count: row.get::<i64, _>("no_count"),
        abstain_count: row.get::<i64, _>("abstain_count"),
        created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
        decided_at: parse_optional_timestamp(row.get::<Option<String>, _>("decided_at"))?,
    })
}
