//! HTTP API
//!
//! axum routes over the entity registry and the governance services.

pub mod access;
pub mod approvals;
pub mod boards;
pub mod entities;
pub mod meetings;
pub mod minutes;
pub mod motions;

use axum::{
    extract::State,
    response::Json,
    routing::{get, patch, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;
use crate::database::Database;
use crate::governance::GovernanceServices;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub database: Database,
    pub services: GovernanceServices,
}

impl AppState {
    pub fn new(config: AppConfig, database: Database) -> Self {
        let services = GovernanceServices::new(&database, &config);
        Self {
            config: Arc::new(config),
            database,
            services,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/status", get(status_endpoint))
        .route("/entities", post(entities::create_entity).get(entities::list_my_entities))
        .route("/entities/:entity_id", get(entities::get_entity))
        .route(
            "/entities/:entity_id/users",
            get(entities::list_users).post(entities::grant_role),
        )
        .route(
            "/entities/:entity_id/users/:profile_id",
            axum::routing::delete(entities::revoke_role),
        )
        .route("/entities/:entity_id/events", get(entities::list_events))
        .route(
            "/entities/:entity_id/boards",
            get(boards::list_boards).post(boards::create_board),
        )
        .route(
            "/entities/:entity_id/approvals",
            get(approvals::list_approvals).post(approvals::record_approval),
        )
        .route(
            "/entities/:entity_id/approvals/verify",
            get(approvals::verify_chain),
        )
        .route("/boards/:board_id", get(boards::get_board))
        .route(
            "/boards/:board_id/members",
            get(boards::list_members).post(boards::add_member),
        )
        .route(
            "/boards/:board_id/members/:member_id/status",
            patch(boards::update_member_status),
        )
        .route(
            "/boards/:board_id/members/:member_id/renew",
            post(boards::renew_member_term),
        )
        .route(
            "/boards/:board_id/meetings",
            get(meetings::list_meetings).post(meetings::schedule_meeting),
        )
        .route("/meetings/:meeting_id", get(meetings::get_meeting))
        .route("/meetings/:meeting_id/transition", post(meetings::transition_meeting))
        .route(
            "/meetings/:meeting_id/attendance",
            get(meetings::list_attendance).post(meetings::record_attendance),
        )
        .route("/meetings/:meeting_id/quorum", get(meetings::quorum))
        .route(
            "/meetings/:meeting_id/motions",
            get(motions::list_motions).post(motions::create_motion),
        )
        .route(
            "/meetings/:meeting_id/minutes",
            get(minutes::list_minutes).post(minutes::create_draft),
        )
        .route("/motions/:motion_id", get(motions::get_motion))
        .route("/motions/:motion_id/open", post(motions::open_voting))
        .route("/motions/:motion_id/close", post(motions::close_voting))
        .route("/motions/:motion_id/table", post(motions::table_motion))
        .route("/motions/:motion_id/resume", post(motions::resume_motion))
        .route(
            "/motions/:motion_id/votes",
            get(motions::list_votes).post(motions::cast_vote),
        )
        .route("/motions/:motion_id/tally", get(motions::tally))
        .route(
            "/minutes/:minutes_id",
            get(minutes::get_minutes).put(minutes::update_draft),
        )
        .route("/minutes/:minutes_id/finalize", post(minutes::finalize))
        .route("/minutes/:minutes_id/amend", post(minutes::amend))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .into_inner(),
        )
        .with_state(state)
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "civic-governance",
        "timestamp": chrono::Utc::now()
    }))
}

async fn status_endpoint(State(state): State<AppState>) -> Json<serde_json::Value> {
    let mut status = serde_json::json!({
        "status": "healthy",
        "service": "civic-governance",
        "timestamp": chrono::Utc::now(),
        "features": {
            "require_approval_signatures": state.config.governance.require_approval_signatures,
            "default_quorum_percent": state.config.governance.default_quorum_percent
        }
    });

    if let Ok(stats) = state.database.get_stats().await {
        status["database"] = serde_json::json!({
            "status": "healthy",
            "entities": stats.entities,
            "boards": stats.boards,
            "open_meetings": stats.open_meetings,
            "approvals": stats.approvals
        });
    } else {
        status["database"] = serde_json::json!({
            "status": "error"
        });
    }

    Json(status)
}
