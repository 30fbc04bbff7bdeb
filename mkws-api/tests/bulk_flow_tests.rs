//! End-to-end bulk review flow over HTTP
//!
//! Bot creates a session with the API key and appends rows; a reviewer
//! approves, corrects, converts a failure, and confirms; the approved
//! results materialize into wars exactly once.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use mkws_api::{build_router, AppState};
use mkws_common::config::Config;
use mkws_common::db::models::MemberStatus;
use mkws_common::db::user_sessions::{self, GuildMembership};
use mkws_common::db::{init_test_database, players};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use std::collections::HashMap;
use tower::util::ServiceExt;

const API_KEY: &str = "test-api-key";
const SIGNING_SECRET: &str = "test-signing-secret";

fn test_config() -> Config {
    Config {
        database_url: "sqlite::memory:".to_string(),
        chat_token: "chat-token".to_string(),
        oauth_client_id: "client-id".to_string(),
        oauth_client_secret: "client-secret".to_string(),
        oauth_redirect_uri: "http://localhost/callback".to_string(),
        signing_secret: SIGNING_SECRET.to_string(),
        api_key: API_KEY.to_string(),
        cors_origins: vec![],
        public_web_url: "http://localhost:3000".to_string(),
        api_base_url: "http://localhost:8720".to_string(),
        api_port: 8720,
        db_pool_max: 1,
    }
}

async fn setup() -> (axum::Router, SqlitePool) {
    let pool = init_test_database().await.unwrap();
    let state = AppState::new(pool.clone(), test_config());
    (build_router(state), pool)
}

async fn reviewer_bearer(pool: &SqlitePool) -> String {
    let mut guilds = HashMap::new();
    guilds.insert(
        1,
        GuildMembership { is_admin: false, can_manage: true, guild_name: "One".to_string() },
    );
    user_sessions::issue_session(pool, SIGNING_SECRET, 77, &guilds, 24).await.unwrap()
}

enum Credential<'a> {
    Key,
    Bearer(&'a str),
    None,
}

fn request(method: &str, uri: &str, credential: Credential, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    match credential {
        Credential::Key => builder = builder.header("x-api-key", API_KEY),
        Credential::Bearer(token) => {
            builder = builder.header("authorization", format!("Bearer {}", token))
        }
        Credential::None => {}
    }
    match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn create_session(app: &axum::Router) -> String {
    let response = app
        .clone()
        .oneshot(request(
            "POST",
            "/bulk/sessions",
            Credential::Key,
            Some(json!({ "guild_id": 1, "created_by_user_id": 9, "total_images": 3 })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    json_body(response).await["session_token"].as_str().unwrap().to_string()
}

fn player(name: &str, score: i64, roster: bool) -> Value {
    json!({ "name": name, "score": score, "is_roster_member": roster, "races_played": 12 })
}

#[tokio::test]
async fn session_creation_requires_the_api_key() {
    let (app, pool) = setup().await;
    let bearer = reviewer_bearer(&pool).await;

    let body = json!({ "guild_id": 1, "created_by_user_id": 9, "total_images": 1 });
    let response = app
        .clone()
        .oneshot(request("POST", "/bulk/sessions", Credential::None, Some(body.clone())))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // A browser session is not enough.
    let response = app
        .clone()
        .oneshot(request("POST", "/bulk/sessions", Credential::Bearer(&bearer), Some(body)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // A wrong key is rejected outright.
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/bulk/sessions")
                .header("x-api-key", "wrong")
                .header("content-type", "application/json")
                .body(Body::from(
                    json!({ "guild_id": 1, "created_by_user_id": 9, "total_images": 1 })
                        .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn session_reads_require_guild_membership() {
    let (app, pool) = setup().await;
    let token = create_session(&app).await;

    // A user from another guild gets 403.
    let mut other = HashMap::new();
    other.insert(
        2,
        GuildMembership { is_admin: false, can_manage: false, guild_name: "Two".to_string() },
    );
    let outsider =
        user_sessions::issue_session(&pool, SIGNING_SECRET, 12, &other, 24).await.unwrap();

    let uri = format!("/bulk/sessions/{}", token);
    let response = app
        .clone()
        .oneshot(request("GET", &uri, Credential::Bearer(&outsider), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // A member (even without manage) may review.
    let mut member = HashMap::new();
    member.insert(
        1,
        GuildMembership { is_admin: false, can_manage: false, guild_name: "One".to_string() },
    );
    let reviewer =
        user_sessions::issue_session(&pool, SIGNING_SECRET, 13, &member, 24).await.unwrap();
    let response =
        app.oneshot(request("GET", &uri, Credential::Bearer(&reviewer), None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn full_review_flow_materializes_approved_results() {
    let (app, pool) = setup().await;
    let bearer = reviewer_bearer(&pool).await;
    players::add_player(&pool, 1, "Alpha", MemberStatus::Member, None).await.unwrap();
    players::add_player(&pool, 1, "Beta", MemberStatus::Member, None).await.unwrap();

    let token = create_session(&app).await;

    // Bot appends two results and one failure.
    let uri_results = format!("/bulk/sessions/{}/results", token);
    let r1 = json_body(
        app.clone()
            .oneshot(request(
                "POST",
                &uri_results,
                Credential::Key,
                Some(json!({
                    "image_filename": "war1.png",
                    "detected_players": [player("Alpha", 90, true), player("Beta", 60, true)],
                    "race_count": 12,
                    "message_timestamp": "2026-01-10T18:00:00+00:00",
                })),
            ))
            .await
            .unwrap(),
    )
    .await["result_id"]
        .as_i64()
        .unwrap();

    let r2 = json_body(
        app.clone()
            .oneshot(request(
                "POST",
                &uri_results,
                Credential::Key,
                Some(json!({
                    "image_filename": "war2.png",
                    "detected_players": [player("Alpha", 10, true)],
                    "race_count": 12,
                })),
            ))
            .await
            .unwrap(),
    )
    .await["result_id"]
        .as_i64()
        .unwrap();

    let failure_id = json_body(
        app.clone()
            .oneshot(request(
                "POST",
                &format!("/bulk/sessions/{}/failures", token),
                Credential::Key,
                Some(json!({
                    "image_filename": "blurry.png",
                    "error_message": "no text detected",
                })),
            ))
            .await
            .unwrap(),
    )
    .await["failure_id"]
        .as_i64()
        .unwrap();

    // Reviewer sees everything.
    let body = json_body(
        app.clone()
            .oneshot(request(
                "GET",
                &format!("/bulk/sessions/{}/results", token),
                Credential::Bearer(&bearer),
                None,
            ))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(body["total"], 2);
    assert_eq!(body["failures"].as_array().unwrap().len(), 1);
    assert_eq!(body["session"]["status"], "open");

    // Approve r1 as detected; reject r2; convert the failure with
    // corrections including a brand-new player.
    let response = app
        .clone()
        .oneshot(request(
            "PUT",
            &format!("/bulk/sessions/{}/results/{}", token, r1),
            Credential::Bearer(&bearer),
            Some(json!({ "review_status": "approved" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(request(
            "PUT",
            &format!("/bulk/sessions/{}/results/{}", token, r2),
            Credential::Bearer(&bearer),
            Some(json!({ "review_status": "rejected" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let converted = json_body(
        app.clone()
            .oneshot(request(
                "POST",
                &format!("/bulk/sessions/{}/failures/{}/convert", token, failure_id),
                Credential::Bearer(&bearer),
                Some(json!({
                    "review_status": "approved",
                    "players": [player("Alpha", 55, true), player("Newcomer", 80, false)],
                })),
            ))
            .await
            .unwrap(),
    )
    .await;
    assert!(converted["result_id"].as_i64().unwrap() > r2);

    // Confirm: two wars (r1 and the converted failure).
    let body = json_body(
        app.clone()
            .oneshot(request(
                "POST",
                &format!("/bulk/sessions/{}/confirm", token),
                Credential::Bearer(&bearer),
                None,
            ))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["wars_created"], 2);
    assert_eq!(body["war_ids"].as_array().unwrap().len(), 2);

    // The auto-created player exists with default status and team.
    let newcomer = players::require_player(&pool, 1, "Newcomer").await.unwrap();
    assert_eq!(newcomer.member_status, MemberStatus::Member);
    assert_eq!(newcomer.team, "Unassigned");

    // A second confirm is a conflict.
    let response = app
        .clone()
        .oneshot(request(
            "POST",
            &format!("/bulk/sessions/{}/confirm", token),
            Credential::Bearer(&bearer),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    // Review state is frozen after confirmation.
    let response = app
        .oneshot(request(
            "PUT",
            &format!("/bulk/sessions/{}/results/{}", token, r1),
            Credential::Bearer(&bearer),
            Some(json!({ "review_status": "pending" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn expired_sessions_answer_410_but_cancel_still_works() {
    let (app, pool) = setup().await;
    let bearer = reviewer_bearer(&pool).await;
    let token = create_session(&app).await;

    sqlx::query(
        "UPDATE bulk_scan_sessions SET expires_at = '2000-01-01T00:00:00+00:00' WHERE session_token = ?",
    )
    .bind(&token)
    .execute(&pool)
    .await
    .unwrap();

    for (method, uri) in [
        ("GET", format!("/bulk/sessions/{}", token)),
        ("GET", format!("/bulk/sessions/{}/results", token)),
        ("POST", format!("/bulk/sessions/{}/confirm", token)),
    ] {
        let response = app
            .clone()
            .oneshot(request(method, &uri, Credential::Bearer(&bearer), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::GONE, "{} {}", method, uri);
    }

    // Appends from the bot are refused too.
    let response = app
        .clone()
        .oneshot(request(
            "POST",
            &format!("/bulk/sessions/{}/results", token),
            Credential::Key,
            Some(json!({ "detected_players": [player("A", 1, false)] })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::GONE);

    // Cancel stays allowed and the terminal state sticks.
    let response = app
        .clone()
        .oneshot(request(
            "POST",
            &format!("/bulk/sessions/{}/cancel", token),
            Credential::Bearer(&bearer),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["session_status"], "expired");
}

#[tokio::test]
async fn unknown_session_is_404_and_zero_approved_confirms_empty() {
    let (app, pool) = setup().await;
    let bearer = reviewer_bearer(&pool).await;

    let response = app
        .clone()
        .oneshot(request(
            "GET",
            "/bulk/sessions/does-not-exist",
            Credential::Bearer(&bearer),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let token = create_session(&app).await;
    let body = json_body(
        app.clone()
            .oneshot(request(
                "POST",
                &format!("/bulk/sessions/{}/confirm", token),
                Credential::Bearer(&bearer),
                None,
            ))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(body["wars_created"], 0);
    assert_eq!(body["war_ids"], json!([]));
    let _ = pool;
}
