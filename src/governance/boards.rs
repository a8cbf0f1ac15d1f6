//! Board Registry
//!
//! Boards and their member rosters. Member status moves only along the
//! edges of `MemberStatus::can_transition_to`.

use chrono::{NaiveDate, Utc};
use sqlx::{sqlite::SqliteRow, Row, Sqlite, SqlitePool, Transaction};
use tracing::{info, warn};

use super::quorum::validate_quorum_percent;
use super::types::*;
use crate::audit::log_event;
use crate::database::{format_date, now_timestamp, parse_date, parse_timestamp};
use crate::entities::EntityRegistry;
use crate::error::GovernanceError;

const MEMBER_COLUMNS: &str =
    "id, board_id, profile_id, name, role, status, term_start, term_end, created_at";

#[derive(Clone)]
pub struct BoardRegistry {
    pool: SqlitePool,
}

impl BoardRegistry {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a board for a nonprofit entity
    pub async fn create_board(
        &self,
        entity_id: i64,
        new_board: &NewBoard,
        default_quorum_percent: u32,
        actor: &str,
    ) -> Result<Board, GovernanceError> {
        let entity = EntityRegistry::new(self.pool.clone())
            .get_entity(entity_id)
            .await?;
        if !entity.kind.supports_boards() {
            return Err(GovernanceError::ValidationError(format!(
                "Boards are only supported for nonprofits, entity {} is a {}",
                entity_id, entity.kind
            )));
        }

        let name = new_board.name.trim();
        if name.is_empty() {
            return Err(GovernanceError::ValidationError(
                "Board name must not be empty".to_string(),
            ));
        }

        let quorum_percent = new_board.quorum_percent.unwrap_or(default_quorum_percent);
        validate_quorum_percent(quorum_percent)?;

        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            "INSERT INTO boards (entity_id, name, quorum_percent, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(entity_id)
        .bind(name)
        .bind(quorum_percent as i64)
        .bind(now_timestamp())
        .execute(&mut *tx)
        .await?;
        let board_id = result.last_insert_rowid();

        log_event(
            &mut *tx,
            Some(entity_id),
            "board_created",
            Some(actor),
            &serde_json::json!({ "board_id": board_id, "name": name, "quorum_percent": quorum_percent }),
        )
        .await?;
        tx.commit().await?;

        info!("Created board {} (ID: {}) for entity {}", name, board_id, entity_id);
        self.get_board(board_id).await
    }

    pub async fn get_board(&self, board_id: i64) -> Result<Board, GovernanceError> {
        let row = sqlx::query(
            "SELECT id, entity_id, name, quorum_percent, created_at FROM boards WHERE id = ?",
        )
        .bind(board_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| GovernanceError::not_found("Board", board_id))?;

        board_from_row(&row)
    }

    pub async fn list_boards(&self, entity_id: i64) -> Result<Vec<Board>, GovernanceError> {
        let rows = sqlx::query(
            r#"
            SELECT id, entity_id, name, quorum_percent, created_at
            FROM boards
            WHERE entity_id = ?
            ORDER BY id
            "#,
        )
        .bind(entity_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(board_from_row).collect()
    }

    /// Add a member to the roster as active
    pub async fn add_member(
        &self,
        board_id: i64,
        new_member: &NewBoardMember,
        actor: &str,
    ) -> Result<BoardMember, GovernanceError> {
        let board = self.get_board(board_id).await?;

        let name = new_member.name.trim();
        if name.is_empty() {
            return Err(GovernanceError::ValidationError(
                "Member name must not be empty".to_string(),
            ));
        }
        validate_term(new_member.term_start, new_member.term_end)?;
        self.ensure_seat_available(board_id, new_member.role, None)
            .await?;

        if let Some(profile_id) = &new_member.profile_id {
            if self.member_for_profile(board_id, profile_id).await?.is_some() {
                return Err(GovernanceError::Conflict(format!(
                    "Profile {} already holds an active seat on board {}",
                    profile_id, board_id
                )));
            }
        }

        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            r#"
            INSERT INTO board_members (board_id, profile_id, name, role, status, term_start, term_end, created_at)
            VALUES (?, ?, ?, ?, 'active', ?, ?, ?)
            "#,
        )
        .bind(board_id)
        .bind(new_member.profile_id.as_deref())
        .bind(name)
        .bind(new_member.role.as_str())
        .bind(format_date(new_member.term_start))
        .bind(new_member.term_end.map(format_date))
        .bind(now_timestamp())
        .execute(&mut *tx)
        .await?;
        let member_id = result.last_insert_rowid();

        log_event(
            &mut *tx,
            Some(board.entity_id),
            "member_added",
            Some(actor),
            &serde_json::json!({
                "board_id": board_id,
                "member_id": member_id,
                "role": new_member.role,
            }),
        )
        .await?;
        tx.commit().await?;

        info!("Added {} as {} on board {}", name, new_member.role, board_id);
        self.get_member(member_id).await
    }

    pub async fn get_member(&self, member_id: i64) -> Result<BoardMember, GovernanceError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM board_members WHERE id = ?",
            MEMBER_COLUMNS
        ))
        .bind(member_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| GovernanceError::not_found("Board member", member_id))?;

        member_from_row(&row)
    }

    pub async fn list_members(
        &self,
        board_id: i64,
        status: Option<MemberStatus>,
    ) -> Result<Vec<BoardMember>, GovernanceError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {}
            FROM board_members
            WHERE board_id = ? AND (? IS NULL OR status = ?)
            ORDER BY id
            "#,
            MEMBER_COLUMNS
        ))
        .bind(board_id)
        .bind(status.map(|s| s.as_str()))
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(member_from_row).collect()
    }

    /// Active members whose term covers `on`
    pub async fn eligible_members(
        &self,
        board_id: i64,
        on: NaiveDate,
    ) -> Result<Vec<BoardMember>, GovernanceError> {
        Ok(self
            .list_members(board_id, Some(MemberStatus::Active))
            .await?
            .into_iter()
            .filter(|member| member.is_eligible_on(on))
            .collect())
    }

    /// The active seat bound to a profile, if any
    pub async fn member_for_profile(
        &self,
        board_id: i64,
        profile_id: &str,
    ) -> Result<Option<BoardMember>, GovernanceError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM board_members WHERE board_id = ? AND profile_id = ? AND status = 'active'",
            MEMBER_COLUMNS
        ))
        .bind(board_id)
        .bind(profile_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(member_from_row).transpose()
    }

    pub async fn update_member_status(
        &self,
        member_id: i64,
        next: MemberStatus,
        actor: &str,
    ) -> Result<BoardMember, GovernanceError> {
        let member = self.get_member(member_id).await?;
        if !member.status.can_transition_to(next) {
            return Err(GovernanceError::invalid_transition(
                "board member",
                member.status,
                next,
            ));
        }
        if next == MemberStatus::Active {
            self.ensure_seat_available(member.board_id, member.role, Some(member_id))
                .await?;
        }

        let board = self.get_board(member.board_id).await?;
        let mut tx = self.pool.begin().await?;
        apply_member_status(&mut tx, &member, next).await?;
        log_member_event(&mut tx, &board, &member, "member_status_changed", actor, next).await?;
        tx.commit().await?;

        info!(
            "Board member {} moved from {} to {}",
            member_id, member.status, next
        );
        self.get_member(member_id).await
    }

    /// Set a new term end; an expired member is reactivated
    pub async fn renew_member_term(
        &self,
        member_id: i64,
        term_end: Option<NaiveDate>,
        actor: &str,
    ) -> Result<BoardMember, GovernanceError> {
        let member = self.get_member(member_id).await?;
        match member.status {
            MemberStatus::Active => {}
            MemberStatus::Expired => {
                self.ensure_seat_available(member.board_id, member.role, Some(member_id))
                    .await?;
            }
            other => {
                return Err(GovernanceError::invalid_transition(
                    "board member",
                    other,
                    MemberStatus::Active,
                ))
            }
        }

        validate_term(member.term_start, term_end)?;
        if let Some(end) = term_end {
            if end < Utc::now().date_naive() {
                return Err(GovernanceError::ValidationError(format!(
                    "Renewed term end {} is already in the past",
                    end
                )));
            }
        }

        let board = self.get_board(member.board_id).await?;
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            r#"
            UPDATE board_members SET term_end = ?, status = 'active'
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(term_end.map(format_date))
        .bind(member_id)
        .bind(member.status.as_str())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            warn!("Board member {} changed concurrently during renewal", member_id);
            return Err(GovernanceError::invalid_transition(
                "board member",
                member.status,
                MemberStatus::Active,
            ));
        }

        log_member_event(
            &mut tx,
            &board,
            &member,
            "member_term_renewed",
            actor,
            MemberStatus::Active,
        )
        .await?;
        tx.commit().await?;
        self.get_member(member_id).await
    }

    async fn ensure_seat_available(
        &self,
        board_id: i64,
        role: BoardRole,
        excluding_member: Option<i64>,
    ) -> Result<(), GovernanceError> {
        if !role.is_single_seat() {
            return Ok(());
        }

        let holders: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM board_members
            WHERE board_id = ? AND role = ? AND status = 'active' AND id != ?
            "#,
        )
        .bind(board_id)
        .bind(role.as_str())
        .bind(excluding_member.unwrap_or(-1))
        .fetch_one(&self.pool)
        .await?;

        if holders > 0 {
            return Err(GovernanceError::Conflict(format!(
                "Board {} already has an active {}",
                board_id, role
            )));
        }
        Ok(())
    }
}

/// Conditional status write; fails if the row moved since it was read.
async fn apply_member_status(
    tx: &mut Transaction<'_, Sqlite>,
    member: &BoardMember,
    next: MemberStatus,
) -> Result<(), GovernanceError> {
    let result = sqlx::query("UPDATE board_members SET status = ? WHERE id = ? AND status = ?")
        .bind(next.as_str())
        .bind(member.id)
        .bind(member.status.as_str())
        .execute(&mut **tx)
        .await?;

    if result.rows_affected() == 0 {
        return Err(GovernanceError::invalid_transition(
            "board member",
            member.status,
            next,
        ));
    }
    Ok(())
}

async fn log_member_event(
    tx: &mut Transaction<'_, Sqlite>,
    board: &Board,
    member: &BoardMember,
    event_type: &str,
    actor: &str,
    status: MemberStatus,
) -> Result<(), GovernanceError> {
    log_event(
        &mut **tx,
        Some(board.entity_id),
        event_type,
        Some(actor),
        &serde_json::json!({
            "board_id": member.board_id,
            "member_id": member.id,
            "status": status,
        }),
    )
    .await
}

fn validate_term(start: NaiveDate, end: Option<NaiveDate>) -> Result<(), GovernanceError> {
    match end {
        Some(end) if end < start => Err(GovernanceError::ValidationError(format!(
            "Term end {} precedes term start {}",
            end, start
        ))),
        _ => Ok(()),
    }
}

fn board_from_row(row: &SqliteRow) -> Result<Board, GovernanceError> {
    Ok(Board {
        id: row.get::<i64, _>("id"),
        entity_id: row.get::<i64, _>("entity_id"),
        name: row.get::<String, _>("name"),
        quorum_percent: row.get::<i64, _>("quorum_percent") as u32,
        created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
    })
}

pub(crate) fn member_from_row(row: &SqliteRow) -> Result<BoardMember, GovernanceError> {
    Ok(BoardMember {
        id: row.get::<i64, _>("id"),
        board_id: row.get::<i64, _>("board_id"),
        profile_id: row.get::<Option<String>, _>("profile_id"),
        name: row.get::<String, _>("name"),
        role: row
            .get::<String, _>("role")
            .parse()
            .map_err(GovernanceError::DatabaseError)?,
        status: row
            .get::<String, _>("status")
            .parse()
            .map_err(GovernanceError::DatabaseError)?,
        term_start: parse_date(&row.get::<String, _>("term_start"))?,
        term_end: row
            .get::<Option<String>, _>("term_end")
            .as_deref()
            .map(parse_date)
            .transpose()?,
        created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
    })
}
