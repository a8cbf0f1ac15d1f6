use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use tracing::info;

use super::access::{require_admin, require_reader};
use super::AppState;
use crate::audit::{recent_events, GovernanceEvent};
use crate::auth::AuthUser;
use crate::entities::{Entity, EntityRole, EntityUser, NewEntity};
use crate::error::GovernanceError;

#[derive(Debug, Deserialize)]
pub struct GrantRoleRequest {
    pub profile_id: String,
    pub role: EntityRole,
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    pub limit: Option<i64>,
}

pub async fn create_entity(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<NewEntity>,
) -> Result<(StatusCode, Json<Entity>), GovernanceError> {
    let entity = state
        .services
        .entities
        .create_entity(&request, &user.profile_id)
        .await?;
    Ok((StatusCode::CREATED, Json(entity)))
}

pub async fn list_my_entities(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<Entity>>, GovernanceError> {
    let entities = state
        .services
        .entities
        .list_entities_for_profile(&user.profile_id)
        .await?;
    Ok(Json(entities))
}

pub async fn get_entity(
    State(state): State<AppState>,
    user: AuthUser,
    Path(entity_id): Path<i64>,
) -> Result<Json<Entity>, GovernanceError> {
    let entity = state.services.entities.get_entity(entity_id).await?;
    require_reader(&state, entity_id, &user).await?;
    Ok(Json(entity))
}

pub async fn list_users(
    State(state): State<AppState>,
    user: AuthUser,
    Path(entity_id): Path<i64>,
) -> Result<Json<Vec<EntityUser>>, GovernanceError> {
    require_reader(&state, entity_id, &user).await?;
    let users = state.services.entities.list_entity_users(entity_id).await?;
    Ok(Json(users))
}

pub async fn grant_role(
    State(state): State<AppState>,
    user: AuthUser,
    Path(entity_id): Path<i64>,
    Json(request): Json<GrantRoleRequest>,
) -> Result<Json<EntityUser>, GovernanceError> {
    require_admin(&state, entity_id, &user).await?;
    let binding = state
        .services
        .entities
        .grant_role(entity_id, &request.profile_id, request.role, &user.profile_id)
        .await?;
    Ok(Json(binding))
}

pub async fn revoke_role(
    State(state): State<AppState>,
    user: AuthUser,
    Path((entity_id, profile_id)): Path<(i64, String)>,
) -> Result<StatusCode, GovernanceError> {
    require_admin(&state, entity_id, &user).await?;
    state
        .services
        .entities
        .revoke_role(entity_id, &profile_id, &user.profile_id)
        .await?;
    info!("Profile {} removed from entity {}", profile_id, entity_id);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_events(
    State(state): State<AppState>,
    user: AuthUser,
    Path(entity_id): Path<i64>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<Vec<GovernanceEvent>>, GovernanceError> {
    require_reader(&state, entity_id, &user).await?;
    let limit = query
        .limit
        .unwrap_or(state.config.governance.event_page_size)
        .clamp(1, 500);
    let events = recent_events(state.database.pool(), entity_id, limit).await?;
    Ok(Json(events))
}
