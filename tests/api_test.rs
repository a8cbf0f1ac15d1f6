//! HTTP API tests driven through the router

mod common;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use civic_governance::api::{router, AppState};
use civic_governance::auth::issue_token;
use civic_governance::config::AppConfig;
use common::*;
use serde_json::{json, Value};
use tower::ServiceExt;

struct TestApp {
    app: Router,
    config: AppConfig,
}

impl TestApp {
    async fn new() -> Self {
        let config = AppConfig::for_testing();
        let db = setup_test_db().await;
        let app = router(AppState::new(config.clone(), db));
        Self { app, config }
    }

    fn token(&self, profile_id: &str) -> String {
        issue_token(profile_id, &self.config.jwt_secret, 3600).unwrap()
    }

    async fn send(
        &self,
        method: Method,
        uri: &str,
        profile_id: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(profile_id) = profile_id {
            builder = builder.header(
                header::AUTHORIZATION,
                format!("Bearer {}", self.token(profile_id)),
            );
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn create_nonprofit(&self) -> i64 {
        let (status, entity) = self
            .send(
                Method::POST,
                "/entities",
                Some(ADMIN),
                Some(json!({"kind": "nonprofit", "name": "Harbor Literacy Project"})),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        entity["id"].as_i64().unwrap()
    }
}

#[tokio::test]
async fn test_health_and_status() {
    let app = TestApp::new().await;
    let (status, body) = app.send(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, body) = app.send(Method::GET, "/status", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["database"]["entities"], 0);
}

#[tokio::test]
async fn test_requests_need_a_valid_token() {
    let app = TestApp::new().await;
    let (status, body) = app
        .send(
            Method::POST,
            "/entities",
            None,
            Some(json!({"kind": "nonprofit", "name": "No Token"})),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].as_str().unwrap().contains("Authorization"));

    let request = Request::builder()
        .method(Method::GET)
        .uri("/entities")
        .header(header::AUTHORIZATION, "Bearer not-a-jwt")
        .body(Body::empty())
        .unwrap();
    let response = app.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_creator_is_admin_and_viewers_are_read_only() {
    let app = TestApp::new().await;
    let entity_id = app.create_nonprofit().await;

    let (status, users) = app
        .send(Method::GET, &format!("/entities/{}/users", entity_id), Some(ADMIN), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(users[0]["role"], "admin");

    let (status, _) = app
        .send(
            Method::POST,
            &format!("/entities/{}/users", entity_id),
            Some(ADMIN),
            Some(json!({"profile_id": "viewer", "role": "viewer"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .send(
            Method::POST,
            &format!("/entities/{}/boards", entity_id),
            Some("viewer"),
            Some(json!({"name": "Board of Directors"})),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, boards) = app
        .send(Method::GET, &format!("/entities/{}/boards", entity_id), Some("viewer"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(boards, json!([]));

    let (status, _) = app
        .send(Method::GET, &format!("/entities/{}", entity_id), Some("stranger"), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // The last admin cannot be removed.
    let (status, _) = app
        .send(
            Method::DELETE,
            &format!("/entities/{}/users/{}", entity_id, ADMIN),
            Some(ADMIN),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_unknown_board_is_not_found() {
    let app = TestApp::new().await;
    let (status, _) = app.send(Method::GET, "/boards/999", Some(ADMIN), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_meeting_workflow_over_http() {
    let app = TestApp::new().await;
    let entity_id = app.create_nonprofit().await;

    let (status, board) = app
        .send(
            Method::POST,
            &format!("/entities/{}/boards", entity_id),
            Some(ADMIN),
            Some(json!({"name": "Board of Directors", "quorum_percent": 50})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let board_id = board["id"].as_i64().unwrap();

    let term_start = days_ago(30).to_string();
    let mut member_ids = Vec::new();
    for (i, role) in ["chair", "secretary", "director", "director"].iter().enumerate() {
        let (status, member) = app
            .send(
                Method::POST,
                &format!("/boards/{}/members", board_id),
                Some(ADMIN),
                Some(json!({
                    "profile_id": member_profile(i),
                    "name": format!("Member {}", i),
                    "role": role,
                    "term_start": term_start,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", member);
        member_ids.push(member["id"].as_i64().unwrap());
    }

    let (status, meeting) = app
        .send(
            Method::POST,
            &format!("/boards/{}/meetings", board_id),
            Some(ADMIN),
            Some(json!({
                "title": "Spring meeting",
                "scheduled_for": chrono::Utc::now().to_rfc3339(),
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let meeting_id = meeting["id"].as_i64().unwrap();

    for member_id in &member_ids[..3] {
        let (status, _) = app
            .send(
                Method::POST,
                &format!("/meetings/{}/attendance", meeting_id),
                Some(ADMIN),
                Some(json!({"member_id": member_id, "present": true})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, quorum) = app
        .send(Method::GET, &format!("/meetings/{}/quorum", meeting_id), Some(ADMIN), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(quorum["required"], 2);
    assert_eq!(quorum["met"], true);

    let (status, _) = app
        .send(
            Method::POST,
            &format!("/meetings/{}/transition", meeting_id),
            Some(ADMIN),
            Some(json!({"status": "in_session"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, motion) = app
        .send(
            Method::POST,
            &format!("/meetings/{}/motions", meeting_id),
            Some(ADMIN),
            Some(json!({
                "title": "Approve reading program",
                "moved_by": member_ids[0],
                "seconded_by": member_ids[2],
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let motion_id = motion["id"].as_i64().unwrap();

    let (status, _) = app
        .send(Method::POST, &format!("/motions/{}/open", motion_id), Some(ADMIN), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    for (i, choice) in ["yes", "yes", "no"].iter().enumerate() {
        let (status, vote) = app
            .send(
                Method::POST,
                &format!("/motions/{}/votes", motion_id),
                Some(member_profile(i).as_str()),
                Some(json!({"choice": choice})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(vote["member_id"], member_ids[i]);
    }

    let (status, _) = app
        .send(
            Method::POST,
            &format!("/motions/{}/votes", motion_id),
            Some(ADMIN),
            Some(json!({"choice": "yes"})),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .send(
            Method::POST,
            &format!("/meetings/{}/transition", meeting_id),
            Some(ADMIN),
            Some(json!({"status": "adjourned"})),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, result) = app
        .send(Method::POST, &format!("/motions/{}/close", motion_id), Some(ADMIN), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result["motion"]["status"], "passed");
    assert_eq!(result["tally"], json!({"yes": 2, "no": 1, "abstain": 0}));

    let (status, _) = app
        .send(
            Method::POST,
            &format!("/meetings/{}/transition", meeting_id),
            Some(ADMIN),
            Some(json!({"status": "adjourned"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    // The secretary keeps minutes without an entity role; a director cannot.
    let (status, _) = app
        .send(
            Method::POST,
            &format!("/meetings/{}/minutes", meeting_id),
            Some(member_profile(2).as_str()),
            Some(json!({"content": "Draft by a director"})),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, minutes) = app
        .send(
            Method::POST,
            &format!("/meetings/{}/minutes", meeting_id),
            Some(member_profile(1).as_str()),
            Some(json!({"content": "Motion to approve the reading program passed 2-1."})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let minutes_id = minutes["id"].as_i64().unwrap();

    // A body that does not parse is rejected, not treated as unsigned.
    let (status, _) = app
        .send(
            Method::POST,
            &format!("/minutes/{}/finalize", minutes_id),
            Some(member_profile(1).as_str()),
            Some(json!({"signature": {"signature": "deadbeef"}})),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let (status, still_draft) = app
        .send(Method::GET, &format!("/minutes/{}", minutes_id), Some(ADMIN), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(still_draft["status"], "draft");

    let (status, finalized) = app
        .send(
            Method::POST,
            &format!("/minutes/{}/finalize", minutes_id),
            Some(member_profile(1).as_str()),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(finalized["minutes"]["status"], "finalized");
    assert_eq!(finalized["approval"]["subject_type"], "minutes");

    let (status, _) = app
        .send(
            Method::PUT,
            &format!("/minutes/{}", minutes_id),
            Some(member_profile(1).as_str()),
            Some(json!({"content": "Changed after the fact"})),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, amendment) = app
        .send(
            Method::POST,
            &format!("/minutes/{}/amend", minutes_id),
            Some(ADMIN),
            Some(json!({
                "content": "Motion to approve the reading program passed 2-1, one absent.",
                "reason": "Record the absence",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(amendment["version"], 2);
    assert_eq!(amendment["amends_id"], minutes_id);

    let (status, verification) = app
        .send(
            Method::GET,
            &format!("/entities/{}/approvals/verify", entity_id),
            Some(ADMIN),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(verification["valid"], true);
    assert_eq!(verification["entries"], 1);

    let (status, events) = app
        .send(
            Method::GET,
            &format!("/entities/{}/events?limit=5", entity_id),
            Some(ADMIN),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(events.as_array().unwrap().len(), 5);
    assert_eq!(events[0]["event_type"], "minutes_amended");
}

#[tokio::test]
async fn test_board_member_can_record_approval() {
    let app = TestApp::new().await;
    let entity_id = app.create_nonprofit().await;
    let (_, board) = app
        .send(
            Method::POST,
            &format!("/entities/{}/boards", entity_id),
            Some(ADMIN),
            Some(json!({"name": "Board of Directors"})),
        )
        .await;
    let board_id = board["id"].as_i64().unwrap();
    app.send(
        Method::POST,
        &format!("/boards/{}/members", board_id),
        Some(ADMIN),
        Some(json!({
            "profile_id": "treasurer",
            "name": "Treasurer",
            "role": "treasurer",
            "term_start": days_ago(10).to_string(),
        })),
    )
    .await;

    let request = json!({
        "subject_type": "board",
        "subject_id": board_id,
        "payload": {"resolution": "Open a savings account"},
    });

    let (status, approval) = app
        .send(
            Method::POST,
            &format!("/entities/{}/approvals", entity_id),
            Some("treasurer"),
            Some(request.clone()),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(approval["actor_profile_id"], "treasurer");

    let (status, _) = app
        .send(
            Method::POST,
            &format!("/entities/{}/approvals", entity_id),
            Some("stranger"),
            Some(request),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}
