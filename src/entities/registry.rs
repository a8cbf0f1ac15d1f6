//! Entity Registry
//!
//! Handles entity creation, role grants and the role checks used by the API

use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use tracing::{info, warn};

use super::types::*;
use crate::audit::log_event;
use crate::database::{now_timestamp, parse_timestamp};
use crate::error::GovernanceError;

#[derive(Clone)]
pub struct EntityRegistry {
    pool: SqlitePool,
}

impl EntityRegistry {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create an entity and bind its creator as admin
    pub async fn create_entity(
        &self,
        new_entity: &NewEntity,
        creator_profile_id: &str,
    ) -> Result<Entity, GovernanceError> {
        let name = new_entity.name.trim();
        if name.is_empty() {
            return Err(GovernanceError::ValidationError(
                "Entity name must not be empty".to_string(),
            ));
        }

        let slug = match &new_entity.slug {
            Some(slug) => slugify(slug),
            None => slugify(name),
        };
        if slug.is_empty() {
            return Err(GovernanceError::ValidationError(format!(
                "Cannot derive a slug from {:?}",
                name
            )));
        }

        let created_at = now_timestamp();
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "INSERT INTO entities (kind, name, slug, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(new_entity.kind.as_str())
        .bind(name)
        .bind(&slug)
        .bind(&created_at)
        .execute(&mut *tx)
        .await?;
        let entity_id = result.last_insert_rowid();

        sqlx::query(
            "INSERT INTO entity_users (entity_id, profile_id, role, created_at) VALUES (?, ?, 'admin', ?)",
        )
        .bind(entity_id)
        .bind(creator_profile_id)
        .bind(&created_at)
        .execute(&mut *tx)
        .await?;

        log_event(
            &mut *tx,
            Some(entity_id),
            "entity_created",
            Some(creator_profile_id),
            &serde_json::json!({ "kind": new_entity.kind, "slug": slug }),
        )
        .await?;
        tx.commit().await?;

        info!("Created {} entity {} (ID: {})", new_entity.kind, name, entity_id);
        self.get_entity(entity_id).await
    }

    pub async fn get_entity(&self, entity_id: i64) -> Result<Entity, GovernanceError> {
        let row = sqlx::query("SELECT id, kind, name, slug, created_at FROM entities WHERE id = ?")
            .bind(entity_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| GovernanceError::not_found("Entity", entity_id))?;

        entity_from_row(&row)
    }

    /// Entities on which the profile holds any role
    pub async fn list_entities_for_profile(
        &self,
        profile_id: &str,
    ) -> Result<Vec<Entity>, GovernanceError> {
        let rows = sqlx::query(
            r#"
            SELECT e.id, e.kind, e.name, e.slug, e.created_at
            FROM entities e
            JOIN entity_users eu ON eu.entity_id = e.id
            WHERE eu.profile_id = ?
            ORDER BY e.name
            "#,
        )
        .bind(profile_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(entity_from_row).collect()
    }

    /// Bind a role, replacing any role the profile already holds
    pub async fn grant_role(
        &self,
        entity_id: i64,
        profile_id: &str,
        role: EntityRole,
        granted_by: &str,
    ) -> Result<EntityUser, GovernanceError> {
        self.get_entity(entity_id).await?;

        if role != EntityRole::Admin {
            self.ensure_not_last_admin(entity_id, profile_id).await?;
        }

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO entity_users (entity_id, profile_id, role, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (entity_id, profile_id) DO UPDATE SET role = excluded.role
            "#,
        )
        .bind(entity_id)
        .bind(profile_id)
        .bind(role.as_str())
        .bind(now_timestamp())
        .execute(&mut *tx)
        .await?;

        log_event(
            &mut *tx,
            Some(entity_id),
            "role_granted",
            Some(granted_by),
            &serde_json::json!({ "profile_id": profile_id, "role": role }),
        )
        .await?;
        tx.commit().await?;

        info!("Granted {} on entity {} to {}", role, entity_id, profile_id);
        self.get_entity_user(entity_id, profile_id)
            .await?
            .ok_or_else(|| GovernanceError::not_found("Entity user", profile_id))
    }

    pub async fn revoke_role(
        &self,
        entity_id: i64,
        profile_id: &str,
        revoked_by: &str,
    ) -> Result<(), GovernanceError> {
        self.ensure_not_last_admin(entity_id, profile_id).await?;

        let mut tx = self.pool.begin().await?;
        let result = sqlx::query("DELETE FROM entity_users WHERE entity_id = ? AND profile_id = ?")
            .bind(entity_id)
            .bind(profile_id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(GovernanceError::not_found("Entity user", profile_id));
        }

        log_event(
            &mut *tx,
            Some(entity_id),
            "role_revoked",
            Some(revoked_by),
            &serde_json::json!({ "profile_id": profile_id }),
        )
        .await?;
        tx.commit().await?;

        info!("Revoked role on entity {} from {}", entity_id, profile_id);
        Ok(())
    }

    pub async fn list_entity_users(
        &self,
        entity_id: i64,
    ) -> Result<Vec<EntityUser>, GovernanceError> {
        let rows = sqlx::query(
            r#"
            SELECT id, entity_id, profile_id, role, created_at
            FROM entity_users
            WHERE entity_id = ?
            ORDER BY id
            "#,
        )
        .bind(entity_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(entity_user_from_row).collect()
    }

    pub async fn get_entity_user(
        &self,
        entity_id: i64,
        profile_id: &str,
    ) -> Result<Option<EntityUser>, GovernanceError> {
        let row = sqlx::query(
            r#"
            SELECT id, entity_id, profile_id, role, created_at
            FROM entity_users
            WHERE entity_id = ? AND profile_id = ?
            "#,
        )
        .bind(entity_id)
        .bind(profile_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(entity_user_from_row).transpose()
    }

    pub async fn role_for(
        &self,
        entity_id: i64,
        profile_id: &str,
    ) -> Result<Option<EntityRole>, GovernanceError> {
        Ok(self
            .get_entity_user(entity_id, profile_id)
            .await?
            .map(|user| user.role))
    }

    /// Fail with `Forbidden` unless the profile's role satisfies `allowed`
    pub async fn require_role<F>(
        &self,
        entity_id: i64,
        profile_id: &str,
        allowed: F,
    ) -> Result<EntityRole, GovernanceError>
    where
        F: Fn(EntityRole) -> bool,
    {
        match self.role_for(entity_id, profile_id).await? {
            Some(role) if allowed(role) => Ok(role),
            Some(role) => {
                warn!(
                    "Profile {} with role {} denied on entity {}",
                    profile_id, role, entity_id
                );
                Err(GovernanceError::Forbidden(format!(
                    "Role {} is not permitted to perform this action",
                    role
                )))
            }
            None => Err(GovernanceError::Forbidden(format!(
                "Profile {} has no role on entity {}",
                profile_id, entity_id
            ))),
        }
    }

    async fn ensure_not_last_admin(
        &self,
        entity_id: i64,
        profile_id: &str,
    ) -> Result<(), GovernanceError> {
        if self.role_for(entity_id, profile_id).await? != Some(EntityRole::Admin) {
            return Ok(());
        }

        let admins: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM entity_users WHERE entity_id = ? AND role = 'admin'",
        )
        .bind(entity_id)
        .fetch_one(&self.pool)
        .await?;

        if admins <= 1 {
            return Err(GovernanceError::Conflict(format!(
                "Entity {} must keep at least one admin",
                entity_id
            )));
        }
        Ok(())
    }
}

fn entity_from_row(row: &SqliteRow) -> Result<Entity, GovernanceError> {
    Ok(Entity {
        id: row.get::<i64, _>("id"),
        kind: row
            .get::<String, _>("kind")
            .parse()
            .map_err(GovernanceError::DatabaseError)?,
        name: row.get::<String, _>("name"),
        slug: row.get::<String, _>("slug"),
        created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
    })
}

fn entity_user_from_row(row: &SqliteRow) -> Result<EntityUser, GovernanceError> {
    Ok(EntityUser {
        id: row.get::<i64, _>("id"),
        entity_id: row.get::<i64, _>("entity_id"),
        profile_id: row.get::<String, _>("profile_id"),
        role: row
            .get::<String, _>("role")
            .parse()
            .map_err(GovernanceError::DatabaseError)?,
        created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
    })
}
